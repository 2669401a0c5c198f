//! Pluggable callback signatures and the slots that hold them.
//!
//! Every stage of the pipeline is a shared closure with a fixed signature.
//! The required arguments of each role are named parameters; everything a
//! callback can be tuned by travels in its [`ExtraArgs`] list, bounded by
//! two parallel characteristic vectors (one for strategy search, one for
//! bias extraction).
//!
//! | Role | Required arguments | Returns |
//! |---|---|---|
//! | generator | frame, shape, survey | newly born events |
//! | event noise | base luminosity, location, lifetime | luminosity noise |
//! | view | time, frame entries, survey | filtered frame entries |
//! | obstruction | time, frame entries, survey | filtered frame entries |
//! | holistic | event, survey | confirmed detection flag |
//! | survey noise | event, survey | detector noise |
//! | measurement | events, survey | true/observed samples |
//!
//! Callbacks that draw randomness receive the survey's injected generator
//! as `&mut dyn RngCore`.

use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use transient_types::{CallbackRole, Characteristic, FrameEntry, Measurement, SurveyShape};

use crate::error::{CallbackError, SurveyError};
use crate::event::TransientEvent;
use crate::survey::SurveyState;

/// Result type returned by every callback.
pub type CallbackResult<T> = Result<T, CallbackError>;

/// Spawns the events born in a frame.
pub type GeneratorFn = Arc<
    dyn Fn(u64, SurveyShape, &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<Vec<TransientEvent>>
        + Send
        + Sync,
>;

/// Luminosity noise applied to an event on construction and every advance.
pub type EventNoiseFn =
    Arc<dyn Fn(f64, (f64, f64), f64, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<f64> + Send + Sync>;

/// Frame filter used for both the view and obstruction stages.
pub type FilterFn = Arc<
    dyn Fn(u64, &[FrameEntry], &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<Vec<FrameEntry>>
        + Send
        + Sync,
>;

/// Whole-history classifier deciding whether an event counts as detected.
pub type HolisticFn =
    Arc<dyn Fn(&TransientEvent, &SurveyState, &ExtraArgs) -> CallbackResult<bool> + Send + Sync>;

/// Detector noise drawn for one detection.
pub type SurveyNoiseFn = Arc<
    dyn Fn(&TransientEvent, &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<f64> + Send + Sync,
>;

/// Extracts true and observed parameter distributions.
pub type MeasurementFn =
    Arc<dyn Fn(&[TransientEvent], &SurveyState) -> CallbackResult<Measurement> + Send + Sync>;

/// Wrap a closure as a [`GeneratorFn`].
pub fn generator_fn<F>(f: F) -> GeneratorFn
where
    F: Fn(u64, SurveyShape, &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<Vec<TransientEvent>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an [`EventNoiseFn`].
pub fn event_noise_fn<F>(f: F) -> EventNoiseFn
where
    F: Fn(f64, (f64, f64), f64, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<f64> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`FilterFn`].
pub fn filter_fn<F>(f: F) -> FilterFn
where
    F: Fn(u64, &[FrameEntry], &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<Vec<FrameEntry>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`HolisticFn`].
pub fn holistic_fn<F>(f: F) -> HolisticFn
where
    F: Fn(&TransientEvent, &SurveyState, &ExtraArgs) -> CallbackResult<bool> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`SurveyNoiseFn`].
pub fn survey_noise_fn<F>(f: F) -> SurveyNoiseFn
where
    F: Fn(&TransientEvent, &SurveyState, &ExtraArgs, &mut dyn RngCore) -> CallbackResult<f64> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`MeasurementFn`].
pub fn measurement_fn<F>(f: F) -> MeasurementFn
where
    F: Fn(&[TransientEvent], &SurveyState) -> CallbackResult<Measurement> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ---------------------------------------------------------------------------
// Extra arguments
// ---------------------------------------------------------------------------

/// Ordered extra-argument list passed to a callback.
///
/// Integer-kind arguments are carried as integral `f64` values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraArgs(Vec<f64>);

impl ExtraArgs {
    /// Wrap a list of values.
    pub const fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// An empty argument list.
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    /// Borrow the values.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fetch argument `index`, reporting `name` if it is missing.
    pub fn get(&self, index: usize, name: &'static str) -> CallbackResult<f64> {
        self.0
            .get(index)
            .copied()
            .ok_or(CallbackError::MissingArgument { index, name })
    }

    /// Fetch a finite, non-negative argument.
    pub fn non_negative(&self, index: usize, name: &'static str) -> CallbackResult<f64> {
        let value = self.get(index, name)?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(CallbackError::InvalidArgument {
                name,
                value,
                reason: "must be finite and non-negative".to_owned(),
            })
        }
    }

    /// Fetch a probability in `[0, 1]`.
    pub fn probability(&self, index: usize, name: &'static str) -> CallbackResult<f64> {
        let value = self.non_negative(index, name)?;
        if value <= 1.0 {
            Ok(value)
        } else {
            Err(CallbackError::InvalidArgument {
                name,
                value,
                reason: "must be a probability in [0, 1]".to_owned(),
            })
        }
    }

    /// Fetch a non-negative count, rounding to the nearest integer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn count(&self, index: usize, name: &'static str) -> CallbackResult<u64> {
        let value = self.non_negative(index, name)?.round();
        if value >= u64::MAX as f64 {
            return Err(CallbackError::InvalidArgument {
                name,
                value,
                reason: "count too large".to_owned(),
            });
        }
        // Finite, non-negative and below u64::MAX: the cast is exact.
        Ok(value as u64)
    }
}

impl From<Vec<f64>> for ExtraArgs {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// A configured callback: the function plus its extra arguments and the
/// characteristic ranges bounding each argument.
#[derive(Clone)]
pub struct CallbackSlot<F> {
    /// Registry name the callback was built from.
    pub name: String,
    /// The callback.
    pub func: F,
    /// Current extra arguments.
    pub args: ExtraArgs,
    /// Strategy-search ranges, one per extra argument.
    pub char_path: Vec<Characteristic>,
    /// Bias-extraction ranges, one per extra argument.
    pub char_bias: Vec<Characteristic>,
}

impl<F> CallbackSlot<F> {
    /// Create a slot with no characteristic ranges.
    pub fn new(name: &str, func: F, args: ExtraArgs) -> Self {
        Self {
            name: name.to_owned(),
            func,
            args,
            char_path: Vec::new(),
            char_bias: Vec::new(),
        }
    }

    /// Attach strategy-search ranges.
    #[must_use]
    pub fn with_path(mut self, chars: Vec<Characteristic>) -> Self {
        self.char_path = chars;
        self
    }

    /// Attach bias-extraction ranges.
    #[must_use]
    pub fn with_bias(mut self, chars: Vec<Characteristic>) -> Self {
        self.char_bias = chars;
        self
    }

    /// Check range well-formedness and that every characteristic vector
    /// matches the argument count. An empty path vector is accepted when
    /// `require_path` is false.
    pub fn validate(&self, role: CallbackRole, require_path: bool) -> Result<(), SurveyError> {
        let args = self.args.len();
        if self.char_bias.len() != args {
            return Err(SurveyError::CharacteristicMismatch {
                role,
                args,
                characteristics: self.char_bias.len(),
            });
        }
        if (require_path || !self.char_path.is_empty()) && self.char_path.len() != args {
            return Err(SurveyError::CharacteristicMismatch {
                role,
                args,
                characteristics: self.char_path.len(),
            });
        }
        validate_ranges(role, &self.char_bias)?;
        validate_ranges(role, &self.char_path)
    }
}

impl<F> core::fmt::Debug for CallbackSlot<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackSlot")
            .field("name", &self.name)
            .field("args", &self.args)
            .field("char_path", &self.char_path)
            .field("char_bias", &self.char_bias)
            .finish_non_exhaustive()
    }
}

/// Reject non-finite or inverted characteristic ranges.
pub fn validate_ranges(role: CallbackRole, chars: &[Characteristic]) -> Result<(), SurveyError> {
    for (index, c) in chars.iter().enumerate() {
        if !c.is_well_formed() {
            return Err(SurveyError::InvalidRange {
                role,
                index,
                low: c.low,
                high: c.high,
            });
        }
    }
    Ok(())
}

/// Split a flat vector into consecutive argument lists of the given lengths.
pub fn split_flat(flat: &[f64], counts: &[usize]) -> Result<Vec<ExtraArgs>, SurveyError> {
    let expected = counts.iter().copied().fold(0_usize, usize::saturating_add);
    if flat.len() != expected {
        return Err(SurveyError::FlatLengthMismatch {
            expected,
            actual: flat.len(),
        });
    }
    let mut rest = flat;
    let mut out = Vec::with_capacity(counts.len());
    for &count in counts {
        let (head, tail) = rest.split_at_checked(count).ok_or(SurveyError::FlatLengthMismatch {
            expected,
            actual: flat.len(),
        })?;
        out.push(ExtraArgs::new(head.to_vec()));
        rest = tail;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_flat_uses_cumulative_lengths() {
        let parts = split_flat(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2, 0, 3]);
        assert!(parts.is_ok());
        let parts = parts.unwrap_or_default();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts.first().map(ExtraArgs::as_slice), Some(&[1.0, 2.0][..]));
        assert!(parts.get(1).is_some_and(ExtraArgs::is_empty));
        assert_eq!(parts.get(2).map(ExtraArgs::len), Some(3));
    }

    #[test]
    fn split_flat_rejects_wrong_length() {
        let result = split_flat(&[1.0, 2.0], &[1, 2]);
        assert!(matches!(
            result,
            Err(SurveyError::FlatLengthMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn extra_args_reports_missing_and_invalid() {
        let args = ExtraArgs::new(vec![0.5, -1.0, 2.0]);
        assert!(args.probability(0, "p").is_ok());
        assert!(matches!(
            args.non_negative(1, "std"),
            Err(CallbackError::InvalidArgument { name: "std", .. })
        ));
        assert!(matches!(
            args.probability(2, "p"),
            Err(CallbackError::InvalidArgument { .. })
        ));
        assert!(matches!(
            args.get(3, "radius"),
            Err(CallbackError::MissingArgument { index: 3, .. })
        ));
        assert_eq!(args.count(2, "n").ok(), Some(2));
    }

    #[test]
    fn slot_validation_checks_lengths_and_ranges() {
        let slot = CallbackSlot::new("x", (), ExtraArgs::new(vec![1.0]))
            .with_bias(vec![Characteristic::float(0.0, 2.0)]);
        assert!(slot.validate(CallbackRole::View, false).is_ok());
        assert!(matches!(
            slot.validate(CallbackRole::View, true),
            Err(SurveyError::CharacteristicMismatch { .. })
        ));

        let inverted = CallbackSlot::new("x", (), ExtraArgs::new(vec![1.0]))
            .with_bias(vec![Characteristic::float(3.0, 2.0)]);
        assert!(matches!(
            inverted.validate(CallbackRole::Obstruction, false),
            Err(SurveyError::InvalidRange { index: 0, .. })
        ));
    }
}
