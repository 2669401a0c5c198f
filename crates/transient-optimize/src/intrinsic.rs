//! Flat-genome genetic search over survey arguments.
//!
//! The genome is the concatenated extra-argument vector of either the
//! observing profile (bounded by its path or bias ranges) or the generator
//! (bounded by its bias ranges), one single-scalar gene per argument.
//!
//! Profile targets simulate one realization per generation and re-detect it
//! for every member, since trajectories do not depend on detection
//! arguments. The generator target re-runs the whole survey per member with
//! the generation's realization seed.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;
use transient_core::Survey;
use transient_core::config::GeneticTarget;
use transient_types::{Characteristic, CharacteristicSet};

use crate::breed::{self, Genome, Layout};
use crate::error::OptimizeError;
use crate::genetic::{self, GeneticOutcome, GeneticSettings};

/// Characteristic ranges a flat-genome search over `target` is bounded by.
pub fn target_characteristics(
    survey: &Survey,
    target: GeneticTarget,
) -> Result<Vec<Characteristic>, OptimizeError> {
    match target {
        GeneticTarget::ProfilePath => Ok(survey.profile().characteristics(CharacteristicSet::Path)?),
        GeneticTarget::ProfileBias => Ok(survey.profile().characteristics(CharacteristicSet::Bias)?),
        GeneticTarget::Generator => Ok(survey.generator().characteristics()),
    }
}

/// Genetic search for the survey arguments that best explain the data.
#[derive(Debug, Clone)]
pub struct IntrinsicExtractor {
    target: GeneticTarget,
    layout: Layout,
    settings: GeneticSettings,
    rng: StdRng,
}

impl IntrinsicExtractor {
    /// Create an extractor for `target` using the ranges configured on
    /// `survey`.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::EmptySearchSpace`] if the target has no
    /// arguments, or a wrapped survey error if its ranges are incomplete.
    pub fn new(
        survey: &Survey,
        target: GeneticTarget,
        settings: GeneticSettings,
        seed: u64,
    ) -> Result<Self, OptimizeError> {
        let chars = target_characteristics(survey, target)?;
        if chars.is_empty() {
            return Err(OptimizeError::EmptySearchSpace);
        }
        Ok(Self {
            target,
            layout: breed::flat_layout(&chars),
            settings,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Which arguments are searched.
    pub const fn target(&self) -> GeneticTarget {
        self.target
    }

    /// Number of searched arguments.
    pub fn dimension(&self) -> usize {
        self.layout.len()
    }

    /// Evolve argument vectors, scoring each with `fitness` (higher is
    /// better) on a survey configured with that vector and run for `time`
    /// frames.
    pub fn run<F>(&mut self, base: &Survey, time: u64, fitness: F) -> Result<GeneticOutcome, OptimizeError>
    where
        F: Fn(&Survey) -> Result<f64, OptimizeError> + Sync,
    {
        let target = self.target;
        let parallel = self.settings.parallel;
        debug!(
            ?target,
            dimension = self.layout.len(),
            time,
            "intrinsic search starting"
        );
        match target {
            GeneticTarget::ProfilePath | GeneticTarget::ProfileBias => {
                let mut survey = base.clone();
                genetic::evolve(&self.layout, &self.settings, &mut self.rng, |population, seed| {
                    survey.re_run_with_seed(seed, time)?;
                    let realization = &survey;
                    genetic::score_population(population, parallel, |genome| {
                        score_profile(realization, genome, &fitness)
                    })
                })
            }
            GeneticTarget::Generator => {
                genetic::evolve(&self.layout, &self.settings, &mut self.rng, |population, seed| {
                    genetic::score_population(population, parallel, |genome| {
                        score_generator(base, genome, seed, time, &fitness)
                    })
                })
            }
        }
    }
}

fn score_profile<F>(realization: &Survey, genome: &Genome, fitness: &F) -> Result<f64, OptimizeError>
where
    F: Fn(&Survey) -> Result<f64, OptimizeError>,
{
    let mut survey = realization.clone();
    survey.set_observing_profile_args_flat(&breed::flatten(genome))?;
    fitness(&survey)
}

fn score_generator<F>(
    base: &Survey,
    genome: &Genome,
    seed: u64,
    time: u64,
    fitness: &F,
) -> Result<f64, OptimizeError>
where
    F: Fn(&Survey) -> Result<f64, OptimizeError>,
{
    let mut survey = base.clone();
    survey.set_generator_args_flat(&breed::flatten(genome))?;
    survey.re_run_with_seed(seed, time)?;
    fitness(&survey)
}
