//! Per-frame strategy search.
//!
//! The path optimizer evolves one gene per frame (for example where to
//! point the viewing field). Every generation draws a fresh realization
//! seed, simulates the survey once with it, and scores every genome against
//! that same realization. Scoring within a generation runs on the rayon pool
//! when enabled; the realization is shared read-only, so parallel and
//! sequential runs produce identical results.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};
use transient_core::config::GeneticConfig;
use transient_core::{Survey, SurveyError};
use transient_types::{Characteristic, SurveyShape};

use crate::breed::{self, BreedRates, Genome, Layout};
use crate::error::OptimizeError;

// ---------------------------------------------------------------------------
// Settings and outcomes
// ---------------------------------------------------------------------------

/// Validated genetic search parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneticSettings {
    /// Population size, a positive multiple of four.
    pub population_size: usize,
    /// Generations to run.
    pub generations: usize,
    /// Crossover and mutation rates.
    pub rates: BreedRates,
    /// Score members on the rayon pool.
    pub parallel: bool,
}

impl GeneticSettings {
    /// Validate raw parameters, rounding the population up to a multiple of
    /// four.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::InvalidPopulation`],
    /// [`OptimizeError::NoGenerations`] or [`OptimizeError::InvalidRate`].
    pub fn new(
        population_size: usize,
        generations: usize,
        crossover_rate: f64,
        mutation_rate: f64,
        parallel: bool,
    ) -> Result<Self, OptimizeError> {
        if generations == 0 {
            return Err(OptimizeError::NoGenerations);
        }
        Ok(Self {
            population_size: breed::population_size(population_size)?,
            generations,
            rates: BreedRates::new(crossover_rate, mutation_rate)?,
            parallel,
        })
    }

    /// Settings from the `optimizer.genetic` configuration section.
    pub fn from_config(config: &GeneticConfig) -> Result<Self, OptimizeError> {
        Self::new(
            config.population_size,
            config.generations,
            config.crossover_rate,
            config.mutation_rate,
            config.parallel,
        )
    }
}

/// Best and mean score of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationStats {
    /// Zero-based generation number.
    pub generation: usize,
    /// Realization seed the generation was scored against.
    pub seed: u64,
    /// Highest score.
    pub best: f64,
    /// Mean score.
    pub mean: f64,
}

/// Result of a genetic search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneticOutcome {
    /// Highest-scoring genome seen in any generation.
    pub best: Genome,
    /// Its score.
    pub best_score: f64,
    /// Per-generation statistics, in order.
    pub history: Vec<GenerationStats>,
}

// ---------------------------------------------------------------------------
// Shared evolution loop
// ---------------------------------------------------------------------------

/// Score every genome, in parallel when asked. Rejects non-finite scores.
pub(crate) fn score_population<F>(
    population: &[Genome],
    parallel: bool,
    score: F,
) -> Result<Vec<f64>, OptimizeError>
where
    F: Fn(&Genome) -> Result<f64, OptimizeError> + Sync,
{
    let scores: Vec<f64> = if parallel {
        population.par_iter().map(&score).collect::<Result<_, _>>()?
    } else {
        population.iter().map(&score).collect::<Result<_, _>>()?
    };
    if let Some(value) = scores.iter().copied().find(|s| !s.is_finite()) {
        return Err(OptimizeError::NonFiniteScore { value });
    }
    Ok(scores)
}

/// Run `settings.generations` generations over `layout`.
///
/// `score_generation` receives the population and that generation's
/// realization seed and returns one score per genome.
pub(crate) fn evolve<F>(
    layout: &[Vec<Characteristic>],
    settings: &GeneticSettings,
    rng: &mut StdRng,
    mut score_generation: F,
) -> Result<GeneticOutcome, OptimizeError>
where
    F: FnMut(&[Genome], u64) -> Result<Vec<f64>, OptimizeError>,
{
    if layout.is_empty() {
        return Err(OptimizeError::EmptySearchSpace);
    }
    let mut population = breed::random_population(layout, settings.population_size, rng);
    let mut best: Option<(Genome, f64)> = None;
    let mut history = Vec::with_capacity(settings.generations);

    for generation in 0..settings.generations {
        let seed: u64 = rng.random();
        let scores = score_generation(&population, seed)?;
        if scores.len() != population.len() {
            return Err(OptimizeError::DimensionMismatch {
                expected: population.len(),
                actual: scores.len(),
            });
        }

        let (leader, top) = scores
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or(OptimizeError::NoSelection { candidates: 0 })?;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        if best.as_ref().is_none_or(|(_, score)| top > *score) {
            if let Some(genome) = population.get(leader) {
                best = Some((genome.clone(), top));
            }
        }
        history.push(GenerationStats {
            generation,
            seed,
            best: top,
            mean,
        });
        info!(generation, best = top, mean, "generation scored");

        if generation.saturating_add(1) < settings.generations {
            population = breed::breed_population(&population, &scores, layout, settings.rates, rng)?;
        }
    }

    let (best, best_score) = best.ok_or(OptimizeError::NoGenerations)?;
    Ok(GeneticOutcome {
        best,
        best_score,
        history,
    })
}

// ---------------------------------------------------------------------------
// Path optimizer
// ---------------------------------------------------------------------------

/// One `[row, col]` gene per frame, each bounded by the survey shape.
pub fn path_layout(shape: SurveyShape, frames: u64) -> Layout {
    let gene = vec![
        Characteristic::int(0.0, f64::from(shape.rows)),
        Characteristic::int(0.0, f64::from(shape.cols)),
    ];
    (0..frames).map(|_| gene.clone()).collect()
}

/// Genetic search over time-indexed strategies.
#[derive(Debug, Clone)]
pub struct GeneticOptimizer {
    layout: Layout,
    settings: GeneticSettings,
    rng: StdRng,
}

impl GeneticOptimizer {
    /// Create an optimizer over `layout`, one gene per frame.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::EmptySearchSpace`] for an empty layout.
    pub fn new(layout: Layout, settings: GeneticSettings, seed: u64) -> Result<Self, OptimizeError> {
        if layout.is_empty() {
            return Err(OptimizeError::EmptySearchSpace);
        }
        Ok(Self {
            layout,
            settings,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// The per-frame gene ranges.
    pub fn layout(&self) -> &[Vec<Characteristic>] {
        &self.layout
    }

    /// Number of frames a genome covers.
    pub fn frames(&self) -> u64 {
        u64::try_from(self.layout.len()).unwrap_or(u64::MAX)
    }

    /// Evolve strategies against re-runs of `base`.
    ///
    /// Each generation re-runs a copy of `base` for as many frames as the
    /// layout has genes, with a fresh realization seed. A genome's score is
    /// the sum of `score(survey, frame, gene)` over every frame.
    pub fn run<S>(&mut self, base: &Survey, score: S) -> Result<GeneticOutcome, OptimizeError>
    where
        S: Fn(&Survey, u64, &[f64]) -> Result<f64, SurveyError> + Sync,
    {
        let frames = self.frames();
        let parallel = self.settings.parallel;
        let mut survey = base.clone();
        debug!(
            frames,
            population = self.settings.population_size,
            generations = self.settings.generations,
            "path search starting"
        );
        evolve(&self.layout, &self.settings, &mut self.rng, |population, seed| {
            survey.re_run_with_seed(seed, frames)?;
            let realization = &survey;
            score_population(population, parallel, |genome| {
                path_total(realization, genome, &score)
            })
        })
    }
}

fn path_total<S>(survey: &Survey, genome: &Genome, score: &S) -> Result<f64, OptimizeError>
where
    S: Fn(&Survey, u64, &[f64]) -> Result<f64, SurveyError>,
{
    let mut total = 0.0;
    for (frame, gene) in (0_u64..).zip(genome) {
        total += score(survey, frame, gene.as_slice())?;
    }
    Ok(total)
}
