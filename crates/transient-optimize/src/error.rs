//! Error types for the optimizers.
//!
//! Invalid rates, shapes and starting points are configuration errors
//! raised before any search runs. A roulette selection that cannot find two
//! distinct parents is a pathological-search error: the population has
//! collapsed and the caller must reseed rather than retry.

use transient_core::SurveyError;

/// Errors that can occur while configuring or running an optimizer.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    /// A crossover or mutation rate is outside `[0, 1]`.
    #[error("{name} must be in [0, 1], got {value}")]
    InvalidRate {
        /// Which rate.
        name: &'static str,
        /// The offending value.
        value: f64,
    },

    /// The population is too small to breed.
    #[error("population size {size} is too small (minimum {minimum})")]
    InvalidPopulation {
        /// Requested size.
        size: usize,
        /// Smallest usable size.
        minimum: usize,
    },

    /// A genetic search was configured with zero generations.
    #[error("a genetic search needs at least one generation")]
    NoGenerations,

    /// The search space has no dimensions.
    #[error("nothing to optimize: the characteristic vector is empty")]
    EmptySearchSpace,

    /// Two genomes that should have the same layout do not.
    #[error("genome length mismatch: {mother} vs {father}")]
    GenomeLengthMismatch {
        /// Mother's length.
        mother: usize,
        /// Father's length.
        father: usize,
    },

    /// Roulette selection kept drawing the same parent.
    #[error("could not select two distinct parents after {attempts} attempts")]
    PathologicalSelection {
        /// Attempts made.
        attempts: usize,
    },

    /// Roulette selection found no candidate.
    #[error("roulette selection found no candidate among {candidates} genomes")]
    NoSelection {
        /// Population size.
        candidates: usize,
    },

    /// A vector has the wrong dimensionality.
    #[error("expected a vector of dimension {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// The SPSA starting point lies outside `[-1, 1]^N`.
    #[error("starting coordinate {index} = {value} is outside [-1, 1]")]
    StartOutOfBounds {
        /// Coordinate index.
        index: usize,
        /// The offending value.
        value: f64,
    },

    /// A score or loss evaluated to NaN or infinity.
    #[error("score is not finite: {value}")]
    NonFiniteScore {
        /// The offending value.
        value: f64,
    },

    /// Comparison data names a parameter the measurement does not produce.
    #[error("measurement has no observed parameter {name:?}")]
    UnknownParameter {
        /// Parameter name.
        name: String,
    },

    /// A path code width outside `1..=32`.
    #[error("path code width must be in 1..=32, got {bits}")]
    InvalidBitWidth {
        /// Requested digits per coordinate.
        bits: u32,
    },

    /// A path coordinate does not fit the code width.
    #[error("coordinate {value} does not fit in {bits} bits")]
    PathValueTooWide {
        /// The coordinate.
        value: u32,
        /// Digits per coordinate.
        bits: u32,
    },

    /// A path code is not a whole number of `(row, col)` pairs.
    #[error("path code of length {len} is not a whole number of {bits}-bit pairs")]
    InvalidPathCode {
        /// Code length in characters.
        len: usize,
        /// Digits per coordinate.
        bits: u32,
    },

    /// A path code holds something other than `0` or `1`.
    #[error("path code has {found:?} at position {index}")]
    InvalidPathDigit {
        /// Character position.
        index: usize,
        /// The offending character.
        found: char,
    },

    /// A path gene is not a non-negative whole number.
    #[error("path coordinate {value} is not a pixel index")]
    NonIntegralPathGene {
        /// The offending value.
        value: f64,
    },

    /// The survey failed while being re-run or re-detected.
    #[error("survey error: {source}")]
    Survey {
        /// The underlying survey error.
        #[from]
        source: SurveyError,
    },
}
