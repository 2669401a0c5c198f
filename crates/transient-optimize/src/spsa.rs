//! Simultaneous perturbation stochastic approximation.
//!
//! Minimizes a loss over `[-1, 1]^N` with two evaluations per iteration,
//! whatever `N` is. Iteration `n` (from zero) uses the gain
//! `a(n) = 1 / (1 + n)^alpha` and perturbation size
//! `delta(n) = 1 / (1 + n)^gamma`, perturbs every coordinate by `±delta/2`
//! with a fair coin, and clamps both probes and the updated estimate back
//! into the box.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};
use transient_core::Survey;
use transient_core::config::SpsaConfig;
use transient_types::ParameterSample;

use crate::blackbox::TransientBlackBox;
use crate::error::OptimizeError;

/// Losses at the two probes of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpsaStep {
    /// Zero-based iteration.
    pub iteration: u32,
    /// Loss at `r + delta * b`.
    pub plus: f64,
    /// Loss at `r - delta * b`.
    pub minus: f64,
}

/// Result of a minimization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpsaOutcome {
    /// Final estimate in scaled coordinates.
    pub scaled: Vec<f64>,
    /// Final estimate as applied raw arguments, when minimizing a black box.
    pub raw: Option<Vec<f64>>,
    /// Loss at the final estimate.
    pub final_loss: f64,
    /// Probe losses of every iteration.
    pub steps: Vec<SpsaStep>,
}

/// SPSA minimizer with a fixed iteration budget.
#[derive(Debug, Clone)]
pub struct TransientSpsa {
    iterations: u32,
    start: Vec<f64>,
    alpha: f64,
    gamma: f64,
    rng: StdRng,
}

impl TransientSpsa {
    /// Create a minimizer starting from `start`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::EmptySearchSpace`] for an empty start and
    /// [`OptimizeError::StartOutOfBounds`] for a coordinate outside
    /// `[-1, 1]`.
    pub fn new(
        start: Vec<f64>,
        iterations: u32,
        alpha: f64,
        gamma: f64,
        seed: u64,
    ) -> Result<Self, OptimizeError> {
        if start.is_empty() {
            return Err(OptimizeError::EmptySearchSpace);
        }
        if let Some((index, value)) = start
            .iter()
            .copied()
            .enumerate()
            .find(|(_, v)| !(-1.0..=1.0).contains(v))
        {
            return Err(OptimizeError::StartOutOfBounds { index, value });
        }
        Ok(Self {
            iterations,
            start,
            alpha,
            gamma,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Minimizer for a `dimension`-dimensional problem from the
    /// `optimizer.spsa` section. Starts at the origin unless the section
    /// names a start vector.
    pub fn from_config(config: &SpsaConfig, dimension: usize, seed: u64) -> Result<Self, OptimizeError> {
        let start = match &config.start {
            Some(start) if start.len() != dimension => {
                return Err(OptimizeError::DimensionMismatch {
                    expected: dimension,
                    actual: start.len(),
                });
            }
            Some(start) => start.clone(),
            None => vec![0.0; dimension],
        };
        Self::new(start, config.iterations, config.alpha, config.gamma, seed)
    }

    /// Gain `a(n)`.
    pub fn gain(&self, n: u32) -> f64 {
        1.0 / (1.0 + f64::from(n)).powf(self.alpha)
    }

    /// Perturbation size `delta(n)`.
    pub fn perturbation(&self, n: u32) -> f64 {
        1.0 / (1.0 + f64::from(n)).powf(self.gamma)
    }

    /// The starting point.
    pub fn start(&self) -> &[f64] {
        &self.start
    }

    fn coin_flips(&mut self) -> Vec<f64> {
        (0..self.start.len())
            .map(|_| if self.rng.random::<bool>() { 0.5 } else { -0.5 })
            .collect()
    }

    /// Minimize `loss` over `[-1, 1]^N`.
    pub fn minimize<F>(&mut self, mut loss: F) -> Result<SpsaOutcome, OptimizeError>
    where
        F: FnMut(&[f64]) -> Result<f64, OptimizeError>,
    {
        let mut r = self.start.clone();
        let mut steps = Vec::with_capacity(usize::try_from(self.iterations).unwrap_or(0));
        for n in 0..self.iterations {
            let bern = self.coin_flips();
            let a = self.gain(n);
            let delta = self.perturbation(n);

            let plus: Vec<f64> = r.iter().zip(&bern).map(|(x, b)| delta.mul_add(*b, *x)).collect();
            let minus: Vec<f64> = r.iter().zip(&bern).map(|(x, b)| (-delta).mul_add(*b, *x)).collect();
            let y_plus = loss(&clamped(plus))?;
            let y_minus = loss(&clamped(minus))?;
            for value in [y_plus, y_minus] {
                if !value.is_finite() {
                    return Err(OptimizeError::NonFiniteScore { value });
                }
            }

            for (x, b) in r.iter_mut().zip(&bern) {
                *x -= a * (y_plus - y_minus) / (2.0 * delta * b);
            }
            r = clamped(r);
            debug!(iteration = n, plus = y_plus, minus = y_minus, "spsa step");
            steps.push(SpsaStep {
                iteration: n,
                plus: y_plus,
                minus: y_minus,
            });
        }

        let final_loss = loss(&r)?;
        info!(iterations = self.iterations, final_loss, "spsa finished");
        Ok(SpsaOutcome {
            scaled: r,
            raw: None,
            final_loss,
            steps,
        })
    }

    /// Minimize a black box's loss and report the raw arguments too.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::DimensionMismatch`] if the start vector does
    /// not match the black box, and any evaluation error.
    pub fn minimize_black_box<L>(
        &mut self,
        black_box: &mut TransientBlackBox<L>,
    ) -> Result<SpsaOutcome, OptimizeError>
    where
        L: Fn(&Survey, &[ParameterSample]) -> Result<f64, OptimizeError>,
    {
        if black_box.dimension() != self.start.len() {
            return Err(OptimizeError::DimensionMismatch {
                expected: black_box.dimension(),
                actual: self.start.len(),
            });
        }
        let mut outcome = self.minimize(|scaled| black_box.return_value(scaled))?;
        outcome.raw = Some(black_box.scaled_to_raw(&outcome.scaled)?);
        Ok(outcome)
    }
}

fn clamped(mut v: Vec<f64>) -> Vec<f64> {
    for x in &mut v {
        *x = x.clamp(-1.0, 1.0);
    }
    v
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn bowl(target: &[f64]) -> impl FnMut(&[f64]) -> Result<f64, OptimizeError> + '_ {
        move |r| Ok(r.iter().zip(target).map(|(a, b)| (a - b).powi(2)).sum())
    }

    #[test]
    fn start_is_validated() {
        assert!(matches!(
            TransientSpsa::new(vec![0.0, 1.5], 10, 1.0, 1.0 / 6.0, 1),
            Err(OptimizeError::StartOutOfBounds { index: 1, .. })
        ));
        assert!(matches!(
            TransientSpsa::new(Vec::new(), 10, 1.0, 1.0 / 6.0, 1),
            Err(OptimizeError::EmptySearchSpace)
        ));
    }

    #[test]
    fn schedules_decay() {
        let spsa = TransientSpsa::new(vec![0.0], 1, 1.0, 0.5, 1).unwrap();
        assert!((spsa.gain(0) - 1.0).abs() < f64::EPSILON);
        assert!((spsa.gain(3) - 0.25).abs() < f64::EPSILON);
        assert!((spsa.perturbation(3) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn one_dimensional_bowl_is_solved_in_two_steps() {
        // a(0) = 1 overshoots to 0.2; a(1) = 1/2 lands on the minimum.
        let mut spsa = TransientSpsa::new(vec![0.0], 2, 1.0, 1.0 / 6.0, 3).unwrap();
        let outcome = spsa.minimize(bowl(&[0.1])).unwrap();
        assert!((outcome.scaled.first().unwrap() - 0.1).abs() < 1e-9);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.raw.is_none());
    }

    #[test]
    fn converges_on_a_quadratic_bowl() {
        let target = [0.3, -0.2, 0.5];
        let mut spsa = TransientSpsa::new(vec![0.0; 3], 200, 1.0, 1.0 / 6.0, 42).unwrap();
        let outcome = spsa.minimize(bowl(&target)).unwrap();
        assert!(outcome.final_loss < 1e-2, "loss {}", outcome.final_loss);
        assert!(outcome.scaled.iter().all(|x| (-1.0..=1.0).contains(x)));
    }

    #[test]
    fn config_start_must_match_dimension() {
        let config = SpsaConfig {
            start: Some(vec![0.0, 0.0]),
            ..SpsaConfig::default()
        };
        assert!(matches!(
            TransientSpsa::from_config(&config, 3, 1),
            Err(OptimizeError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        let spsa = TransientSpsa::from_config(&SpsaConfig::default(), 3, 1).unwrap();
        assert_eq!(spsa.start(), &[0.0, 0.0, 0.0]);
    }
}
