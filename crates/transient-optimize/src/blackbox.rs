//! A survey seen as a function from `[-1, 1]^N` to a scalar loss.
//!
//! Dimensions are the profile's bias-range arguments (view, obstruction,
//! holistic, noise) followed by the generator's. Each maps affinely onto its
//! raw range: `raw = scaled * (max - min) / 2 + (max + min) / 2`. A
//! degenerate range maps every raw value to scaled `0`.
//!
//! Raw values are applied as the affine map gives them, integer ranges
//! included. Callbacks that read a count round it themselves.
//!
//! Every evaluation reseeds the survey with the same seed, so two
//! parameter vectors are compared on the same random stream.

use tracing::debug;
use transient_core::Survey;
use transient_types::{Characteristic, CharacteristicSet, ParameterSample};

use crate::error::OptimizeError;
use crate::scoring;

/// Loss signature: survey plus comparison data to a scalar, lower is better.
pub type LossFn = fn(&Survey, &[ParameterSample]) -> Result<f64, OptimizeError>;

/// Survey adapter exposing only `evaluate(parameters) -> loss`.
#[derive(Debug, Clone)]
pub struct TransientBlackBox<L = LossFn> {
    survey: Survey,
    time: u64,
    seed: u64,
    comparison: Vec<ParameterSample>,
    loss: L,
    characteristics: Vec<Characteristic>,
    profile_len: usize,
}

impl TransientBlackBox {
    /// A black box scored by the summed KS distance to `comparison`.
    pub fn with_ks_loss(
        survey: Survey,
        time: u64,
        comparison: Vec<ParameterSample>,
    ) -> Result<Self, OptimizeError> {
        Self::new(survey, time, comparison, scoring::ks_loss as LossFn)
    }
}

impl<L> TransientBlackBox<L>
where
    L: Fn(&Survey, &[ParameterSample]) -> Result<f64, OptimizeError>,
{
    /// Wrap `survey`, re-run for `time` frames per evaluation.
    ///
    /// # Errors
    ///
    /// Returns a wrapped survey error if a profile stage lacks bias ranges,
    /// or [`OptimizeError::EmptySearchSpace`] if nothing is tunable.
    pub fn new(
        survey: Survey,
        time: u64,
        comparison: Vec<ParameterSample>,
        loss: L,
    ) -> Result<Self, OptimizeError> {
        let mut characteristics = survey.profile().characteristics(CharacteristicSet::Bias)?;
        let profile_len = characteristics.len();
        characteristics.extend(survey.generator().characteristics());
        if characteristics.is_empty() {
            return Err(OptimizeError::EmptySearchSpace);
        }
        let seed = survey.seed();
        Ok(Self {
            survey,
            time,
            seed,
            comparison,
            loss,
            characteristics,
            profile_len,
        })
    }

    /// Number of dimensions `N`.
    pub fn dimension(&self) -> usize {
        self.characteristics.len()
    }

    /// Raw ranges, profile first, then generator.
    pub fn raw_characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    /// Comparison data the loss is evaluated against.
    pub fn comparison(&self) -> &[ParameterSample] {
        &self.comparison
    }

    /// The wrapped survey, as left by the last evaluation.
    pub const fn survey(&self) -> &Survey {
        &self.survey
    }

    fn check_len(&self, len: usize) -> Result<(), OptimizeError> {
        if len == self.characteristics.len() {
            Ok(())
        } else {
            Err(OptimizeError::DimensionMismatch {
                expected: self.characteristics.len(),
                actual: len,
            })
        }
    }

    /// Map scaled coordinates onto raw argument values.
    pub fn scaled_to_raw(&self, scaled: &[f64]) -> Result<Vec<f64>, OptimizeError> {
        self.check_len(scaled.len())?;
        Ok(self
            .characteristics
            .iter()
            .zip(scaled)
            .map(|(c, s)| s.mul_add(c.half_span(), c.midpoint()))
            .collect())
    }

    /// Map raw argument values onto scaled coordinates. Degenerate
    /// dimensions map to `0`.
    pub fn raw_to_scaled(&self, raw: &[f64]) -> Result<Vec<f64>, OptimizeError> {
        self.check_len(raw.len())?;
        Ok(self
            .characteristics
            .iter()
            .zip(raw)
            .map(|(c, r)| {
                if c.is_degenerate() {
                    0.0
                } else {
                    (r - c.midpoint()) / c.half_span()
                }
            })
            .collect())
    }

    /// Apply `scaled` to the survey, re-run it and return the loss.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::DimensionMismatch`] for a vector of the
    /// wrong length, any survey or loss error, and
    /// [`OptimizeError::NonFiniteScore`] if the loss is NaN or infinite.
    pub fn return_value(&mut self, scaled: &[f64]) -> Result<f64, OptimizeError> {
        let raw = self.scaled_to_raw(scaled)?;
        let (profile, generator) = raw.split_at(self.profile_len.min(raw.len()));
        self.survey.reseed(self.seed);
        self.survey.reconfigure_and_rerun(profile, generator, self.time)?;
        let loss = (self.loss)(&self.survey, &self.comparison)?;
        if !loss.is_finite() {
            return Err(OptimizeError::NonFiniteScore { value: loss });
        }
        debug!(loss, "black box evaluated");
        Ok(loss)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use transient_core::{CallbackRegistry, TransientConfig};

    use super::*;

    const TUNABLE: &str = r"
survey: { rows: 12, cols: 12, seed: 11 }
generator:
  functions:
    - name: uniform
      args: [0.02, 5.0, 1.0, 0.5]
      bias:
        - { low: 0.0, high: 0.04, kind: float }
        - { low: 2.0, high: 8.0, kind: float }
        - { low: 1.0, high: 1.0, kind: float }
        - { low: 0.0, high: 1.0, kind: float }
profile:
  view: { name: circle, args: [6, 6, 4], bias: [{ low: 4, high: 8, kind: float }, { low: 4, high: 8, kind: float }, { low: 2, high: 6, kind: float }] }
  obstruction: { name: random_pass, args: [0.5], bias: [{ low: 0.2, high: 1.0, kind: float }] }
  holistic: { name: detected_at_least, args: [2], bias: [{ low: 1, high: 5, kind: int }] }
  noise: { name: none }
";

    fn black_box() -> TransientBlackBox {
        let config = TransientConfig::parse(TUNABLE).unwrap();
        let survey = CallbackRegistry::with_builtins().build_survey(&config).unwrap();
        TransientBlackBox::with_ks_loss(
            survey,
            10,
            vec![ParameterSample::new("lifetime", vec![3.0, 4.0, 5.0])],
        )
        .unwrap()
    }

    #[test]
    fn dimensions_list_profile_then_generator() {
        let bb = black_box();
        assert_eq!(bb.dimension(), 9);
        let first = bb.raw_characteristics().first().unwrap();
        assert!((first.high - 8.0).abs() < f64::EPSILON);
        let last = bb.raw_characteristics().last().unwrap();
        assert!((last.high - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scaling_round_trips_and_degenerate_maps_to_zero() {
        let bb = black_box();
        let scaled = [-1.0, 1.0, 0.25, -0.5, 0.0, 0.9, 0.3, 0.7, -0.2];
        let back = bb.raw_to_scaled(&bb.scaled_to_raw(&scaled).unwrap()).unwrap();
        for (i, (a, b)) in scaled.iter().zip(&back).enumerate() {
            // Dimension 7 is the degenerate lifetime_std range.
            if i == 7 {
                assert!(b.abs() < f64::EPSILON);
            } else {
                assert!((a - b).abs() < 1e-12, "dimension {i}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn wrong_length_is_rejected() {
        let bb = black_box();
        assert!(matches!(
            bb.scaled_to_raw(&[0.0; 3]),
            Err(OptimizeError::DimensionMismatch { expected: 9, actual: 3 })
        ));
    }

    #[test]
    fn midpoint_applies_range_midpoints() {
        let mut bb = black_box();
        let zeros = vec![0.0; bb.dimension()];
        let _ = bb.return_value(&zeros).unwrap();

        let mut applied = bb.survey().profile().args().to_flat();
        applied.extend(bb.survey().generator().args_flat());
        let expected: Vec<f64> = bb.raw_characteristics().iter().map(Characteristic::midpoint).collect();
        assert_eq!(applied, expected);
    }

    #[test]
    fn odd_span_integer_range_applies_fractional_midpoint() {
        let yaml = TUNABLE.replace("{ low: 1, high: 5, kind: int }", "{ low: 1, high: 4, kind: int }");
        let config = TransientConfig::parse(&yaml).unwrap();
        let survey = CallbackRegistry::with_builtins().build_survey(&config).unwrap();
        let mut bb = TransientBlackBox::with_ks_loss(
            survey,
            10,
            vec![ParameterSample::new("lifetime", vec![3.0, 4.0, 5.0])],
        )
        .unwrap();
        let zeros = vec![0.0; bb.dimension()];
        let _ = bb.return_value(&zeros).unwrap();

        // Holistic threshold is the fifth profile argument.
        let applied = bb.survey().profile().args().to_flat();
        assert!((applied.get(4).unwrap() - 2.5).abs() < f64::EPSILON);
        assert!((bb.scaled_to_raw(&zeros).unwrap().get(4).unwrap() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn evaluations_are_repeatable() {
        let mut bb = black_box();
        let point = [0.2, -0.3, 0.1, 0.4, 0.5, -0.6, 0.0, 0.0, 0.3];
        let first = bb.return_value(&point).unwrap();
        let second = bb.return_value(&point).unwrap();
        assert!((first - second).abs() < f64::EPSILON);
        assert!((0.0..=1.0).contains(&first));
    }
}
