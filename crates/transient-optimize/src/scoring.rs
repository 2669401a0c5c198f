//! Scores and losses the optimizers evaluate.
//!
//! Path scores are per-frame and higher is better. Losses compare a
//! survey's observed distributions against fixed comparison data and lower
//! is better; the intrinsic extractor maximizes their negation.

use transient_core::{Survey, SurveyError};
use transient_types::{Extent, FramePoint, ParameterSample};

use crate::error::OptimizeError;

/// Number of events inside a circle of `radius` around `(row, col)`.
pub fn circle_count(points: &[FramePoint], row: f64, col: f64, radius: f64) -> usize {
    points
        .iter()
        .filter(|p| (p.x - row).hypot(p.y - col) <= radius)
        .count()
}

/// Per-frame path score: events visible in a circle of fixed `radius`
/// centred on the gene's `(row, col)`.
pub fn circle_path_score(
    radius: f64,
) -> impl Fn(&Survey, u64, &[f64]) -> Result<f64, SurveyError> + Sync {
    move |survey, frame, gene| {
        let (Some(row), Some(col)) = (gene.first().copied(), gene.get(1).copied()) else {
            return Ok(0.0);
        };
        let points = survey.frame_points(frame, &Extent::of_shape(survey.shape()))?;
        Ok(circle_count(&points, row, col, radius) as f64)
    }
}

/// Two-sample Kolmogorov-Smirnov statistic: the largest gap between the
/// empirical CDFs of `a` and `b`.
///
/// Two empty samples are identical (`0`); one empty sample against a
/// non-empty one is maximally different (`1`).
pub fn ks_statistic(a: &[f64], b: &[f64]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 0.0,
        (true, false) | (false, true) => return 1.0,
        (false, false) => {}
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (na, nb) = (a.len() as f64, b.len() as f64);

    let (mut i, mut j) = (0_usize, 0_usize);
    let mut gap = 0.0_f64;
    while let (Some(&x), Some(&y)) = (a.get(i), b.get(j)) {
        let next = x.min(y);
        while a.get(i).is_some_and(|v| *v <= next) {
            i = i.saturating_add(1);
        }
        while b.get(j).is_some_and(|v| *v <= next) {
            j = j.saturating_add(1);
        }
        gap = gap.max((i as f64 / na - j as f64 / nb).abs());
    }
    gap
}

/// Sum of KS distances between the survey's observed sample and the
/// comparison sample of every named parameter.
///
/// # Errors
///
/// Returns [`OptimizeError::UnknownParameter`] if the measurement has no
/// observed sample for a comparison parameter.
pub fn ks_loss(survey: &Survey, comparison: &[ParameterSample]) -> Result<f64, OptimizeError> {
    let measurement = survey.measure()?;
    let mut loss = 0.0;
    for expected in comparison {
        let observed = measurement
            .observed_for(&expected.name)
            .ok_or_else(|| OptimizeError::UnknownParameter {
                name: expected.name.clone(),
            })?;
        loss += ks_statistic(&observed.values, &expected.values);
    }
    Ok(loss)
}

/// Intrinsic-extractor fitness: the negated [`ks_loss`].
pub fn ks_fitness(
    comparison: &[ParameterSample],
) -> impl Fn(&Survey) -> Result<f64, OptimizeError> + Sync + '_ {
    move |survey| ks_loss(survey, comparison).map(|loss| -loss)
}
