//! Per-pixel spawn probabilities.
//!
//! A [`RateMap`] is either one `rows x cols` grid used on every frame or a
//! stack of grids indexed by frame. The `rate_map` generator draws one
//! Bernoulli trial per pixel per frame from it.

use serde::Deserialize;
use transient_types::SurveyShape;

use crate::error::{CallbackError, SurveyError};

/// Spawn probability grid, static or per frame.
///
/// In YAML a nested list of numbers is a static grid and a list of such
/// grids is a per-frame stack:
///
/// ```yaml
/// rates: [[0.0, 0.1], [0.2, 0.0]]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RateMap {
    /// One grid for every frame.
    Static(Vec<Vec<f64>>),
    /// One grid per frame, indexed from frame 0.
    PerFrame(Vec<Vec<Vec<f64>>>),
}

impl RateMap {
    /// Check every grid against `shape` and every probability against
    /// `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::RateMapShape`] for a grid of the wrong size
    /// (or an empty stack), and [`SurveyError::InvalidSpawnRate`] for a
    /// probability that is not finite or lies outside `[0, 1]`.
    pub fn validate(&self, shape: SurveyShape) -> Result<(), SurveyError> {
        match self {
            Self::Static(grid) => check_grid(grid, shape, 0),
            Self::PerFrame(grids) => {
                if grids.is_empty() {
                    return Err(SurveyError::RateMapShape {
                        frame: 0,
                        rows: 0,
                        cols: 0,
                        expected_rows: shape.rows,
                        expected_cols: shape.cols,
                    });
                }
                for (frame, grid) in grids.iter().enumerate() {
                    check_grid(grid, shape, frame)?;
                }
                Ok(())
            }
        }
    }

    /// Number of frames the map covers, `None` for a static grid.
    pub fn frames(&self) -> Option<usize> {
        match self {
            Self::Static(_) => None,
            Self::PerFrame(grids) => Some(grids.len()),
        }
    }

    /// The grid used on `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CallbackError::InvalidArgument`] when a per-frame map has
    /// no grid for `frame`.
    pub fn grid(&self, frame: u64) -> Result<&[Vec<f64>], CallbackError> {
        match self {
            Self::Static(grid) => Ok(grid.as_slice()),
            Self::PerFrame(grids) => usize::try_from(frame)
                .ok()
                .and_then(|index| grids.get(index))
                .map(Vec::as_slice)
                .ok_or_else(|| CallbackError::InvalidArgument {
                    name: "frame",
                    value: frame as f64,
                    reason: format!("rate map covers {} frames", grids.len()),
                }),
        }
    }
}

fn check_grid(grid: &[Vec<f64>], shape: SurveyShape, frame: usize) -> Result<(), SurveyError> {
    let width = |row: &Vec<f64>| u32::try_from(row.len()).unwrap_or(u32::MAX);
    let rows = u32::try_from(grid.len()).unwrap_or(u32::MAX);
    let ragged = grid.iter().find(|row| width(row) != shape.cols);
    if rows != shape.rows || ragged.is_some() {
        return Err(SurveyError::RateMapShape {
            frame,
            rows,
            cols: ragged.or_else(|| grid.first()).map_or(0, width),
            expected_rows: shape.rows,
            expected_cols: shape.cols,
        });
    }
    for (row, values) in grid.iter().enumerate() {
        for (col, &value) in values.iter().enumerate() {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(SurveyError::InvalidSpawnRate {
                    frame,
                    row,
                    col,
                    value,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn yaml_nesting_selects_the_variant() {
        let flat: RateMap = serde_yml::from_str("[[0.0, 0.5], [1.0, 0.25]]").unwrap();
        assert_eq!(flat.frames(), None);
        let stacked: RateMap = serde_yml::from_str("[[[0.0, 0.5]], [[1.0, 0.25]]]").unwrap();
        assert_eq!(stacked.frames(), Some(2));
    }

    #[test]
    fn grids_must_match_the_survey_shape() {
        let shape = SurveyShape::new(2, 2);
        assert!(RateMap::Static(vec![vec![0.1, 0.2], vec![0.3, 0.4]]).validate(shape).is_ok());
        assert!(matches!(
            RateMap::Static(vec![vec![0.1, 0.2], vec![0.3]]).validate(shape),
            Err(SurveyError::RateMapShape { cols: 1, .. })
        ));
        assert!(matches!(
            RateMap::PerFrame(vec![]).validate(shape),
            Err(SurveyError::RateMapShape { .. })
        ));
        assert!(matches!(
            RateMap::PerFrame(vec![vec![vec![0.0; 2]; 2], vec![vec![0.0; 2]; 3]]).validate(shape),
            Err(SurveyError::RateMapShape { frame: 1, rows: 3, .. })
        ));
    }

    #[test]
    fn probabilities_outside_unit_interval_are_rejected() {
        let shape = SurveyShape::new(1, 2);
        assert!(matches!(
            RateMap::Static(vec![vec![0.5, 1.5]]).validate(shape),
            Err(SurveyError::InvalidSpawnRate { row: 0, col: 1, .. })
        ));
        assert!(RateMap::Static(vec![vec![f64::NAN, 0.0]]).validate(shape).is_err());
    }

    #[test]
    fn per_frame_lookup_stops_at_the_last_grid() {
        let map = RateMap::PerFrame(vec![vec![vec![0.0]], vec![vec![1.0]]]);
        assert_eq!(map.grid(1).unwrap(), &[vec![1.0]]);
        assert!(matches!(map.grid(2), Err(CallbackError::InvalidArgument { name: "frame", .. })));
        let fixed = RateMap::Static(vec![vec![0.5]]);
        assert!(fixed.grid(1_000).is_ok());
    }
}
