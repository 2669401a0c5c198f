//! Genome primitives shared by every genetic optimizer.
//!
//! A genome is a list of genes, one per locus; a gene is a short vector of
//! scalars, each bounded by its own [`Characteristic`]. A per-frame viewing
//! path has one multi-scalar gene per frame, while a flat argument vector
//! has one single-scalar gene per argument. Crossover and mutation sites
//! are chosen among loci.
//!
//! Sampling is inclusive-low, exclusive-high for both kinds: `Int` ranges
//! draw from the integers in `[low, high)` and `Float` ranges draw
//! uniformly from `[low, high)`. A degenerate range always yields `low`.

use rand::Rng;
use rand::seq::index;
use rand_distr::{Binomial, Distribution};
use transient_types::{ArgKind, Characteristic};

use crate::error::OptimizeError;

/// One candidate solution: a gene per locus.
pub type Genome = Vec<Vec<f64>>;

/// Characteristic ranges of every scalar, laid out like a [`Genome`].
pub type Layout = Vec<Vec<Characteristic>>;

/// Attempts roulette selection makes to find a father distinct from the
/// mother before giving up.
pub const MAX_SELECTION_ATTEMPTS: usize = 100;

/// Per-locus crossover and mutation probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreedRates {
    crossover: f64,
    mutation: f64,
}

impl BreedRates {
    /// Validate and bundle the two rates.
    ///
    /// # Errors
    ///
    /// Returns [`OptimizeError::InvalidRate`] if either rate is outside
    /// `[0, 1]`.
    pub fn new(crossover: f64, mutation: f64) -> Result<Self, OptimizeError> {
        check_rate("crossover_rate", crossover)?;
        check_rate("mutation_rate", mutation)?;
        Ok(Self {
            crossover,
            mutation,
        })
    }

    /// Per-locus crossover probability.
    pub const fn crossover(&self) -> f64 {
        self.crossover
    }

    /// Per-locus mutation probability.
    pub const fn mutation(&self) -> f64 {
        self.mutation
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), OptimizeError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OptimizeError::InvalidRate { name, value })
    }
}

/// Round a requested population size up to a multiple of four.
///
/// Breeding replaces half the population with children produced in pairs,
/// so the size must divide by four.
pub fn population_size(requested: usize) -> Result<usize, OptimizeError> {
    if requested == 0 {
        return Err(OptimizeError::InvalidPopulation {
            size: requested,
            minimum: 4,
        });
    }
    let remainder = requested.checked_rem(4).unwrap_or(0);
    if remainder == 0 {
        return Ok(requested);
    }
    requested
        .checked_add(4_usize.saturating_sub(remainder))
        .ok_or(OptimizeError::InvalidPopulation {
            size: requested,
            minimum: 4,
        })
}

/// Draw one legal value for a characteristic.
///
/// Integer ranges draw uniformly from `ceil(low)` up to but excluding
/// `ceil(high)`; an empty integer range yields `ceil(low)`.
pub fn sample_value<R: Rng + ?Sized>(c: &Characteristic, rng: &mut R) -> f64 {
    match c.kind {
        ArgKind::Int => {
            let low = c.low.ceil();
            let span = c.high.ceil() - low;
            if span < 1.0 {
                return low;
            }
            low + (rng.random::<f64>() * span).floor().min(span - 1.0)
        }
        ArgKind::Float => {
            if c.high <= c.low {
                c.low
            } else {
                rng.random_range(c.low..c.high)
            }
        }
    }
}

/// A random genome respecting every range in `layout`.
pub fn random_genome<R: Rng + ?Sized>(layout: &[Vec<Characteristic>], rng: &mut R) -> Genome {
    layout
        .iter()
        .map(|gene| gene.iter().map(|c| sample_value(c, rng)).collect())
        .collect()
}

/// `size` random genomes.
pub fn random_population<R: Rng + ?Sized>(
    layout: &[Vec<Characteristic>],
    size: usize,
    rng: &mut R,
) -> Vec<Genome> {
    (0..size).map(|_| random_genome(layout, rng)).collect()
}

/// Number of sites among `loci` to alter at `rate`: `Binomial(loci, rate)`.
pub fn site_count<R: Rng + ?Sized>(loci: usize, rate: f64, rng: &mut R) -> Result<usize, OptimizeError> {
    let trials = u64::try_from(loci).unwrap_or(u64::MAX);
    let dist = Binomial::new(trials, rate).map_err(|_| OptimizeError::InvalidRate {
        name: "rate",
        value: rate,
    })?;
    Ok(usize::try_from(dist.sample(rng)).unwrap_or(loci).min(loci))
}

fn sorted_sites<R: Rng + ?Sized>(loci: usize, count: usize, rng: &mut R) -> Vec<usize> {
    let mut sites = index::sample(rng, loci, count.min(loci)).into_vec();
    sites.sort_unstable();
    sites
}

fn mutate<R: Rng + ?Sized>(
    child: &mut Genome,
    layout: &[Vec<Characteristic>],
    sites: &[usize],
    rng: &mut R,
) {
    for &locus in sites {
        let (Some(gene), Some(chars)) = (child.get_mut(locus), layout.get(locus)) else {
            continue;
        };
        if gene.is_empty() {
            continue;
        }
        let component = rng.random_range(0..gene.len());
        if let (Some(value), Some(c)) = (gene.get_mut(component), chars.get(component)) {
            *value = sample_value(c, rng);
        }
    }
}

/// Produce two children from two parents.
///
/// Crossover sites are drawn as `Binomial(loci, crossover)` distinct loci;
/// at each site, in order, the children swap tails, so successive segments
/// alternate between parents. Each child then receives
/// `Binomial(loci, mutation)` mutations at independently chosen loci, each
/// replacing one scalar of the gene with a fresh legal value.
pub fn breed<R: Rng + ?Sized>(
    mother: &Genome,
    father: &Genome,
    layout: &[Vec<Characteristic>],
    rates: BreedRates,
    rng: &mut R,
) -> Result<(Genome, Genome), OptimizeError> {
    if mother.len() != father.len() || mother.len() != layout.len() {
        return Err(OptimizeError::GenomeLengthMismatch {
            mother: mother.len(),
            father: father.len(),
        });
    }
    let loci = mother.len();
    let crossovers = site_count(loci, rates.crossover, rng)?;
    let mutations = site_count(loci, rates.mutation, rng)?;

    let mut first = mother.clone();
    let mut second = father.clone();
    for locus in sorted_sites(loci, crossovers, rng) {
        if let (Some(a), Some(b)) = (first.get_mut(locus..), second.get_mut(locus..)) {
            a.swap_with_slice(b);
        }
    }

    let sites = sorted_sites(loci, mutations, rng);
    mutate(&mut first, layout, &sites, rng);
    let sites = sorted_sites(loci, mutations, rng);
    mutate(&mut second, layout, &sites, rng);

    Ok((first, second))
}

fn pick<R: Rng + ?Sized>(weights: &[f64], total: f64, rng: &mut R) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    if total <= 0.0 {
        return Some(rng.random_range(0..weights.len()));
    }
    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if cumulative > target {
            return Some(index);
        }
    }
    weights.iter().rposition(|w| *w > 0.0)
}

/// Fitness-proportional selection of two distinct parents.
///
/// Scores are shifted by their minimum so every weight is non-negative;
/// the lowest-scoring genome therefore has zero weight. When every score
/// is equal, selection is uniform.
///
/// # Errors
///
/// Returns [`OptimizeError::PathologicalSelection`] if no father distinct
/// from the mother is drawn within [`MAX_SELECTION_ATTEMPTS`] attempts.
pub fn roulette_select<R: Rng + ?Sized>(scores: &[f64], rng: &mut R) -> Result<(usize, usize), OptimizeError> {
    if scores.len() < 2 {
        return Err(OptimizeError::InvalidPopulation {
            size: scores.len(),
            minimum: 2,
        });
    }
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = scores.iter().map(|s| s - min).collect();
    let total: f64 = weights.iter().sum();
    let none = || OptimizeError::NoSelection {
        candidates: scores.len(),
    };

    let mother = pick(&weights, total, rng).ok_or_else(none)?;
    let mut father = pick(&weights, total, rng).ok_or_else(none)?;
    let mut attempts = 0_usize;
    while father == mother {
        attempts = attempts.saturating_add(1);
        if attempts > MAX_SELECTION_ATTEMPTS {
            return Err(OptimizeError::PathologicalSelection { attempts });
        }
        father = pick(&weights, total, rng).ok_or_else(none)?;
    }
    Ok((mother, father))
}

/// Rank a scored population, keep the better half, and fill the rest with
/// children of roulette-selected parents.
///
/// The population size must be a positive multiple of four. The returned
/// population is ranked: survivors first, best first, then children.
pub fn breed_population<R: Rng + ?Sized>(
    population: &[Genome],
    scores: &[f64],
    layout: &[Vec<Characteristic>],
    rates: BreedRates,
    rng: &mut R,
) -> Result<Vec<Genome>, OptimizeError> {
    if population.len() != scores.len() {
        return Err(OptimizeError::DimensionMismatch {
            expected: population.len(),
            actual: scores.len(),
        });
    }
    let size = population.len();
    if size == 0 || size.checked_rem(4) != Some(0) {
        return Err(OptimizeError::InvalidPopulation { size, minimum: 4 });
    }

    let mut ranked: Vec<(&Genome, f64)> = population.iter().zip(scores.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    let ranked_scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();

    let half = size / 2;
    let mut next: Vec<Genome> = ranked.iter().take(half).map(|(g, _)| (*g).clone()).collect();
    for _ in 0..size / 4 {
        let (m, f) = roulette_select(&ranked_scores, rng)?;
        let (Some((mother, _)), Some((father, _))) = (ranked.get(m), ranked.get(f)) else {
            return Err(OptimizeError::NoSelection { candidates: size });
        };
        let (first, second) = breed(mother, father, layout, rates, rng)?;
        next.push(first);
        next.push(second);
    }
    Ok(next)
}

/// Flatten a genome of single-scalar genes.
pub fn flatten(genome: &Genome) -> Vec<f64> {
    genome.iter().flatten().copied().collect()
}

/// One single-scalar gene per characteristic.
pub fn flat_layout(chars: &[Characteristic]) -> Layout {
    chars.iter().map(|c| vec![*c]).collect()
}
