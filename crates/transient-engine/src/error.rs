//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of a run so `main` can
//! propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: transient_core::ConfigError,
    },

    /// Building or running the survey failed.
    #[error("survey error: {source}")]
    Survey {
        /// The underlying survey error.
        #[from]
        source: transient_core::SurveyError,
    },

    /// An optimizer failed.
    #[error("optimizer error: {source}")]
    Optimize {
        /// The underlying optimizer error.
        #[from]
        source: transient_optimize::OptimizeError,
    },

    /// Writing the report failed.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Serializing the report failed.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
