//! Core data structs for the transient survey.
//!
//! These are plain values: positions, history rows, detection rows, the
//! replay-log entry, characteristic ranges, measurement output and the
//! serializable event snapshot. Behaviour lives in `transient-core`.

use serde::{Deserialize, Serialize};

use crate::enums::{ArgKind, EventState};
use crate::ids::EventId;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Pixel dimensions of the survey area.
///
/// Positions use matrix convention: `x` runs along rows in `[0, rows)`,
/// `y` runs along columns in `[0, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurveyShape {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub cols: u32,
}

impl SurveyShape {
    /// Create a new shape.
    pub const fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Total number of pixels (saturating).
    pub const fn pixels(self) -> u64 {
        (self.rows as u64).saturating_mul(self.cols as u64)
    }

    /// Whether a position lies inside the survey area.
    pub fn contains(self, x: f64, y: f64) -> bool {
        x >= 0.0 && y >= 0.0 && x < f64::from(self.rows) && y < f64::from(self.cols)
    }
}

/// Axis-aligned 2D extent, inclusive on the low edges and exclusive on the
/// high edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Lowest `x` inside the extent.
    pub x_min: f64,
    /// First `x` past the extent.
    pub x_max: f64,
    /// Lowest `y` inside the extent.
    pub y_min: f64,
    /// First `y` past the extent.
    pub y_max: f64,
}

impl Extent {
    /// Extent covering the whole survey area.
    pub fn of_shape(shape: SurveyShape) -> Self {
        Self {
            x_min: 0.0,
            x_max: f64::from(shape.rows),
            y_min: 0.0,
            y_max: f64::from(shape.cols),
        }
    }

    /// Whether `(x, y)` lies inside the extent.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }
}

// ---------------------------------------------------------------------------
// Characteristic ranges
// ---------------------------------------------------------------------------

/// Legal range of one tunable extra argument.
///
/// Bounds are inclusive on `low` and exclusive on `high`. A degenerate range
/// (`low == high`) pins the argument to a single value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    /// Inclusive lower bound.
    pub low: f64,
    /// Exclusive upper bound.
    pub high: f64,
    /// Value domain.
    pub kind: ArgKind,
}

impl Characteristic {
    /// Create a float range.
    pub const fn float(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            kind: ArgKind::Float,
        }
    }

    /// Create an integer range. Sampling draws whole numbers from
    /// `[ceil(low), ceil(high))`.
    pub const fn int(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            kind: ArgKind::Int,
        }
    }

    /// Midpoint of the range.
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Half the width of the range.
    pub fn half_span(&self) -> f64 {
        (self.high - self.low) / 2.0
    }

    /// Whether the range collapses to a single value.
    pub fn is_degenerate(&self) -> bool {
        self.half_span().abs() <= f64::EPSILON
    }

    /// Whether the bounds are finite and ordered.
    pub fn is_well_formed(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low <= self.high
    }
}

// ---------------------------------------------------------------------------
// Event history
// ---------------------------------------------------------------------------

/// One row of an event's position/luminosity history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Absolute frame this row describes.
    pub time: u64,
    /// Row coordinate.
    pub x: f64,
    /// Column coordinate.
    pub y: f64,
    /// Row velocity (per frame).
    pub xdot: f64,
    /// Column velocity (per frame).
    pub ydot: f64,
    /// Luminosity during this frame.
    pub luminosity: f64,
}

/// One successful per-frame detection of an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Absolute frame of the detection.
    pub time: u64,
    /// Index into the event history that was detected.
    pub history_index: usize,
    /// True luminosity at detection time.
    pub luminosity: f64,
    /// Detector noise drawn for this detection.
    pub noise: f64,
}

impl DetectionRecord {
    /// Luminosity as the detector reported it.
    pub fn observed_luminosity(&self) -> f64 {
        self.luminosity + self.noise
    }
}

/// One entry of a frame's replay-log slot: which event was alive in that
/// frame and which of its history rows describes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameEntry {
    /// Index of the event in the survey's event arena.
    pub event_index: usize,
    /// Index into that event's history.
    pub history_index: usize,
}

/// Position and intensity of one alive event in a rendered frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramePoint {
    /// The event.
    pub event: EventId,
    /// Row coordinate.
    pub x: f64,
    /// Column coordinate.
    pub y: f64,
    /// Luminosity during the frame.
    pub luminosity: f64,
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Values of one named parameter across a set of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSample {
    /// Parameter name (e.g. `lifetime`).
    pub name: String,
    /// Values, one per contributing event.
    pub values: Vec<f64>,
}

impl ParameterSample {
    /// Create a named sample.
    pub fn new(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_owned(),
            values,
        }
    }
}

/// Output of a measurement callback: true and observed distributions.
///
/// Within one parameter the observed values are a subset of the true
/// values. Samples of two different parameters are not index-aligned, so a
/// true value of one parameter cannot be paired with an observed value of
/// another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Samples over every event.
    pub truth: Vec<ParameterSample>,
    /// Samples over holistically detected events.
    pub observed: Vec<ParameterSample>,
}

impl Measurement {
    /// True sample for the named parameter.
    pub fn truth_for(&self, name: &str) -> Option<&ParameterSample> {
        self.truth.iter().find(|s| s.name == name)
    }

    /// Observed sample for the named parameter.
    pub fn observed_for(&self, name: &str) -> Option<&ParameterSample> {
        self.observed.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Serializable copy of an event's full state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Event identity.
    pub id: EventId,
    /// Class label assigned by the generator.
    pub class_id: String,
    /// Frame the event was born in.
    pub birth_frame: u64,
    /// Lifetime in frames.
    pub lifetime: f64,
    /// Lifecycle state.
    pub state: EventState,
    /// Result of the last holistic classification.
    pub holistic_detection: bool,
    /// Position/luminosity history.
    pub history: Vec<HistoryEntry>,
    /// Per-frame detections.
    pub detections: Vec<DetectionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_contains_is_half_open() {
        let shape = SurveyShape::new(10, 5);
        assert!(shape.contains(0.0, 0.0));
        assert!(shape.contains(9.5, 4.9));
        assert!(!shape.contains(10.0, 0.0));
        assert!(!shape.contains(0.0, -0.1));
        assert_eq!(shape.pixels(), 50);
    }

    #[test]
    fn characteristic_midpoint_and_degeneracy() {
        let c = Characteristic::float(2.0, 6.0);
        assert!((c.midpoint() - 4.0).abs() < f64::EPSILON);
        assert!((c.half_span() - 2.0).abs() < f64::EPSILON);
        assert!(!c.is_degenerate());
        assert!(Characteristic::int(3.0, 3.0).is_degenerate());
        assert!(!Characteristic::float(5.0, 1.0).is_well_formed());
    }

    #[test]
    fn characteristic_parses_from_json() {
        let json = r#"{"low": 0.0, "high": 1.5, "kind": "float"}"#;
        let parsed: Result<Characteristic, _> = serde_json::from_str(json);
        assert_eq!(parsed.ok(), Some(Characteristic::float(0.0, 1.5)));
    }

    #[test]
    fn measurement_lookup_by_name() {
        let m = Measurement {
            truth: vec![ParameterSample::new("lifetime", vec![45.0, 23.0, 8.0])],
            observed: vec![ParameterSample::new("lifetime", vec![23.0])],
        };
        assert_eq!(m.truth_for("lifetime").map(|s| s.values.len()), Some(3));
        assert_eq!(m.observed_for("lifetime").map(|s| s.values.len()), Some(1));
        assert!(m.observed_for("luminosity").is_none());
    }

    #[test]
    fn detection_reports_noisy_luminosity() {
        let d = DetectionRecord {
            time: 3,
            history_index: 2,
            luminosity: 1.0,
            noise: 0.25,
        };
        assert!((d.observed_luminosity() - 1.25).abs() < f64::EPSILON);
    }
}
