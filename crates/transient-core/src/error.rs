//! Error types for the `transient-core` crate.
//!
//! Configuration errors are raised at construction or validation time and
//! are fatal. Callback errors propagate uncaught, tagged with the role of
//! the callback that failed. Nothing in this crate retries.

use transient_types::{CallbackRole, EventId};

/// Failure reported by a pluggable callback.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CallbackError {
    /// The callback expected an extra argument that was not supplied.
    #[error("missing extra argument {index} ({name})")]
    MissingArgument {
        /// Position in the extra-argument list.
        index: usize,
        /// Name the callback uses for the argument.
        name: &'static str,
    },

    /// An extra argument was supplied but is outside the callback's domain.
    #[error("invalid extra argument {name} = {value}: {reason}")]
    InvalidArgument {
        /// Name the callback uses for the argument.
        name: &'static str,
        /// The offending value.
        value: f64,
        /// Why the value is rejected.
        reason: String,
    },

    /// The callback referenced an event index the survey does not hold.
    #[error("event index {0} is not in the survey")]
    UnknownEvent(usize),

    /// Any other callback failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors that can occur while building or running a survey.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    /// Survey shape has a zero dimension.
    #[error("invalid survey shape {rows}x{cols}: both dimensions must be at least 1")]
    InvalidShape {
        /// Configured rows.
        rows: u32,
        /// Configured columns.
        cols: u32,
    },

    /// A characteristic range is malformed (non-finite or `low > high`).
    #[error("{role} characteristic {index} has invalid range [{low}, {high})")]
    InvalidRange {
        /// Owning callback role.
        role: CallbackRole,
        /// Position in the characteristic vector.
        index: usize,
        /// Configured lower bound.
        low: f64,
        /// Configured upper bound.
        high: f64,
    },

    /// Extra arguments and characteristic vectors disagree in length.
    #[error("{role} has {args} extra args but {characteristics} characteristics")]
    CharacteristicMismatch {
        /// Owning callback role.
        role: CallbackRole,
        /// Number of extra arguments.
        args: usize,
        /// Number of characteristic ranges.
        characteristics: usize,
    },

    /// A callback was configured with the wrong number of extra arguments.
    #[error("{role} callback {name} takes {expected} extra args, got {actual}")]
    ArityMismatch {
        /// Callback role.
        role: CallbackRole,
        /// Registered callback name.
        name: String,
        /// Declared extra-argument count.
        expected: usize,
        /// Supplied extra-argument count.
        actual: usize,
    },

    /// A flat argument vector does not match the total argument count.
    #[error("expected {expected} flattened arguments, got {actual}")]
    FlatLengthMismatch {
        /// Sum of all per-callback argument counts.
        expected: usize,
        /// Supplied vector length.
        actual: usize,
    },

    /// No callback with this name is registered for the role.
    #[error("no {role} callback registered as {name:?}")]
    UnknownCallback {
        /// Callback role.
        role: CallbackRole,
        /// Requested name.
        name: String,
    },

    /// An event was constructed with an empty luminosity series.
    #[error("luminosity series must contain at least one sample")]
    EmptyLuminositySeries,

    /// A replay-log entry points outside an event's history.
    #[error("history index {history_index} out of range for event {event} (len {len})")]
    ReplayOutOfRange {
        /// The event.
        event: EventId,
        /// Requested history index.
        history_index: usize,
        /// Actual history length.
        len: usize,
    },

    /// A frame outside the replay log was requested.
    #[error("frame {frame} is not in the replay log ({frames} frames recorded)")]
    FrameOutOfRange {
        /// Requested frame.
        frame: u64,
        /// Number of recorded frames.
        frames: usize,
    },

    /// Frame counter would overflow.
    #[error("frame counter overflow")]
    FrameOverflow,

    /// A spawn-rate grid does not match the survey shape.
    #[error(
        "rate map frame {frame} is {rows}x{cols}, survey is {expected_rows}x{expected_cols}"
    )]
    RateMapShape {
        /// Index of the offending grid (0 for a static map).
        frame: usize,
        /// Rows in the grid.
        rows: u32,
        /// Columns in the first mismatching row.
        cols: u32,
        /// Survey rows.
        expected_rows: u32,
        /// Survey columns.
        expected_cols: u32,
    },

    /// A spawn probability is not in `[0, 1]`.
    #[error("rate map frame {frame} pixel ({row}, {col}) has probability {value}")]
    InvalidSpawnRate {
        /// Index of the offending grid.
        frame: usize,
        /// Pixel row.
        row: usize,
        /// Pixel column.
        col: usize,
        /// The offending value.
        value: f64,
    },

    /// A generator that spawns from a rate map was configured without one.
    #[error("generator {name} needs a `rates` grid")]
    MissingRateMap {
        /// Registered generator name.
        name: String,
    },

    /// A pluggable callback failed.
    #[error("{role} callback failed: {source}")]
    Callback {
        /// Role of the failing callback.
        role: CallbackRole,
        /// The callback's error.
        source: CallbackError,
    },
}

impl SurveyError {
    /// Wrap a callback failure with the role that produced it.
    pub const fn callback(role: CallbackRole, source: CallbackError) -> Self {
        Self::Callback { role, source }
    }
}
