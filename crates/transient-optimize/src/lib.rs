//! Optimizers over transient surveys.
//!
//! Two kinds of search share one set of genome primitives. The path
//! optimizer evolves a per-frame strategy scored frame by frame against a
//! shared realization; the intrinsic extractor evolves a flat argument
//! vector for the observing profile or the generator. For gradient-free
//! continuous search, [`TransientBlackBox`] maps a survey onto
//! `[-1, 1]^N -> loss` and [`TransientSpsa`] minimizes it.
//!
//! # Modules
//!
//! - [`blackbox`] -- Scaled-coordinate survey adapter
//! - [`breed`] -- Random genomes, crossover, mutation, roulette selection
//! - [`error`] -- Optimizer error type
//! - [`genetic`] -- Settings, evolution loop and the path optimizer
//! - [`intrinsic`] -- Flat-genome search over survey arguments
//! - [`pathcode`] -- Fixed-width binary encoding of viewing paths
//! - [`scoring`] -- Path scores and distribution losses
//! - [`spsa`] -- Simultaneous perturbation stochastic approximation

pub mod blackbox;
pub mod breed;
pub mod error;
pub mod genetic;
pub mod intrinsic;
pub mod pathcode;
pub mod scoring;
pub mod spsa;

pub use blackbox::TransientBlackBox;
pub use breed::{BreedRates, Genome, Layout};
pub use error::OptimizeError;
pub use genetic::{GeneticOptimizer, GeneticOutcome, GeneticSettings};
pub use intrinsic::IntrinsicExtractor;
pub use spsa::{SpsaOutcome, TransientSpsa};
