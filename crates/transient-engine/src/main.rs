//! Survey engine binary.
//!
//! Wires configuration, the callback registry, the survey and the
//! optimizers together for one run, then writes a JSON report.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `transient-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Build the survey from the built-in callback registry
//! 4. Run the configured mode
//! 5. Write the run report

mod error;
mod report;
mod run;

use std::path::Path;

use chrono::Utc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use transient_core::config::OptimizerMode;
use transient_core::{CallbackRegistry, TransientConfig};
use transient_types::RunId;

use crate::error::EngineError;
use crate::report::{RunReport, SurveySummary};

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the survey, the optimizer or
/// writing the report fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging. RUST_LOG wins over the config.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    let run_id = RunId::new();
    let started_at = Utc::now();
    info!(%run_id, "transient-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }
    info!(
        rows = config.survey.rows,
        cols = config.survey.cols,
        seed = config.survey.seed,
        mode = ?config.optimizer.mode,
        "Configuration loaded"
    );

    // 3. Build the survey.
    let registry = CallbackRegistry::with_builtins();
    let survey = registry.build_survey(&config).map_err(EngineError::from)?;
    let [view, obstruction, holistic, noise] = survey.profile().stage_names();
    info!(
        view,
        obstruction,
        holistic,
        noise,
        measurement = survey.profile().measurement_name(),
        generators = survey.generator().functions().len(),
        "Survey built"
    );

    // 4. Run the configured mode.
    let mode = config.optimizer.mode;
    let (survey, optimizer) = match mode {
        OptimizerMode::Survey => run::survey(survey, &config)?,
        OptimizerMode::Path => run::path(survey, &config)?,
        OptimizerMode::Intrinsic => run::intrinsic(survey, &config)?,
        OptimizerMode::Spsa => run::spsa(survey, &config)?,
    };

    // 5. Write the report.
    let summary = SurveySummary::of(&survey).map_err(EngineError::from)?;
    info!(
        frames = summary.frames,
        events = summary.events,
        detections = summary.detections,
        holistic = summary.holistic,
        "Run finished"
    );
    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        mode,
        survey: summary,
        optimizer,
    };
    report::write(&report, config.output.report_path.as_deref())?;
    if let Some(path) = &config.output.report_path {
        info!(path = %path.display(), "Report written");
    }

    Ok(())
}

/// Load configuration from `transient-config.yaml`, falling back to
/// defaults when the file does not exist. The flag tells whether the file
/// was found.
fn load_config() -> Result<(TransientConfig, bool), EngineError> {
    let config_path = Path::new("transient-config.yaml");
    if config_path.exists() {
        Ok((TransientConfig::from_file(config_path)?, true))
    } else {
        Ok((TransientConfig::default(), false))
    }
}
