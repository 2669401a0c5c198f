//! Shared type definitions for the transient survey simulation.
//!
//! This crate is the single source of truth for the plain data types used
//! across the workspace. It carries no simulation logic.
//!
//! # Modules
//!
//! - [`ids`] -- Event and run identifiers
//! - [`enums`] -- Argument kinds, event states, callback roles
//! - [`structs`] -- Geometry, characteristic ranges, history and detection
//!   rows, replay-log entries, measurements, snapshots

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{ArgKind, CallbackRole, CharacteristicSet, EventState};
pub use ids::{EventId, RunId};
pub use structs::{
    Characteristic, DetectionRecord, EventSnapshot, Extent, FrameEntry, FramePoint, HistoryEntry,
    Measurement, ParameterSample, SurveyShape,
};
