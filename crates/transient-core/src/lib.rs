//! Event lifecycle, detection pipeline and survey orchestration.
//!
//! A [`Survey`] owns an arena of [`TransientEvent`]s, a
//! [`TransientGenerator`] that spawns them and an [`ObservingProfile`] that
//! decides which of them are seen. Every stage is a pluggable callback with
//! a fixed signature, resolved by name through a [`CallbackRegistry`].
//!
//! All randomness comes from the survey's seeded generator, so a survey
//! re-run with the same seed and arguments is bit-for-bit reproducible.
//!
//! # Modules
//!
//! - [`callback`] -- Callback signatures, extra arguments, configured slots
//! - [`config`] -- YAML configuration structures and loader
//! - [`error`] -- Callback and survey error types
//! - [`event`] -- The ALIVE -> DEAD event state machine
//! - [`generator`] -- Per-frame event spawning
//! - [`library`] -- Built-in callbacks for every role
//! - [`profile`] -- Per-frame and holistic detection
//! - [`rates`] -- Per-pixel spawn probability grids
//! - [`registry`] -- Name -> callback tables and config builders
//! - [`survey`] -- Advance loop, replay log, re-detection and re-runs

pub mod callback;
pub mod config;
pub mod error;
pub mod event;
pub mod generator;
pub mod library;
pub mod profile;
pub mod rates;
pub mod registry;
pub mod survey;

pub use callback::{CallbackSlot, ExtraArgs};
pub use config::{ConfigError, TransientConfig};
pub use error::{CallbackError, SurveyError};
pub use event::{EventNoise, EventSpec, TransientEvent};
pub use generator::TransientGenerator;
pub use profile::{MeasurementSlot, ObservingProfile, ProfileArgs};
pub use rates::RateMap;
pub use registry::CallbackRegistry;
pub use survey::{Survey, SurveyState};
