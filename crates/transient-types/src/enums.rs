//! Enumeration types shared across the survey and optimizer crates.

use serde::{Deserialize, Serialize};

/// Value domain of a tunable extra argument.
///
/// Both kinds are sampled from the half-open range `[low, high)`. `Int`
/// ranges draw from the integers `ceil(low), ..., ceil(high) - 1`, so
/// `high` itself is never drawn; write `{ low: 1, high: 5, kind: int }` for
/// the values 1 to 4. `Float` ranges are sampled uniformly. A degenerate
/// range yields `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgKind {
    /// Integral values, `high` exclusive.
    Int,
    /// Real values.
    Float,
}

/// Lifecycle state of a transient event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventState {
    /// The event is advancing and eligible for detection.
    Alive,
    /// Terminal: age exceeded lifetime, state is frozen.
    Dead,
}

/// Role a pluggable callback plays in the survey pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackRole {
    /// Spawns new events each frame.
    Generator,
    /// Per-event luminosity noise applied on every advance.
    EventNoise,
    /// Geometric field-of-view filter.
    View,
    /// Non-geometric filter (brightness, weather, ...).
    Obstruction,
    /// Whole-history confirmation classifier.
    Holistic,
    /// Detector noise added to each recorded detection.
    SurveyNoise,
    /// Extracts true/observed parameter distributions.
    Measurement,
}

impl CallbackRole {
    /// Lowercase name used in configuration files and log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::EventNoise => "event_noise",
            Self::View => "view",
            Self::Obstruction => "obstruction",
            Self::Holistic => "holistic",
            Self::SurveyNoise => "survey_noise",
            Self::Measurement => "measurement",
        }
    }
}

impl core::fmt::Display for CallbackRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which characteristic ranges of the observing profile to optimize over.
///
/// `Path` ranges bound observing-strategy search; `Bias` ranges bound
/// parameter estimation of the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacteristicSet {
    /// Strategy (path) optimization ranges.
    Path,
    /// Bias extraction ranges.
    Bias,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arg_kind_uses_lowercase_names() {
        let json = serde_json::to_string(&ArgKind::Float).ok();
        assert_eq!(json.as_deref(), Some("\"float\""));
        let parsed: Result<ArgKind, _> = serde_json::from_str("\"int\"");
        assert_eq!(parsed.ok(), Some(ArgKind::Int));
    }

    #[test]
    fn role_display_matches_config_name() {
        assert_eq!(CallbackRole::SurveyNoise.to_string(), "survey_noise");
        assert_eq!(CallbackRole::View.to_string(), "view");
    }
}
