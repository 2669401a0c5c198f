//! The JSON run report.
//!
//! One report per engine invocation: when it ran, what it ran, the state
//! of the survey it ended with and, for optimizer modes, the search result.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use transient_core::config::{GeneticTarget, OptimizerMode};
use transient_core::{Survey, SurveyError, TransientEvent};
use transient_optimize::{GeneticOutcome, SpsaOutcome};
use transient_types::{EventSnapshot, Measurement, RunId};

use crate::error::EngineError;

/// Counts, measurement and event snapshots of a finished survey.
#[derive(Debug, Clone, Serialize)]
pub struct SurveySummary {
    /// Seed of the survey's last run.
    pub seed: u64,
    /// Frames simulated.
    pub frames: u64,
    /// Events born.
    pub events: usize,
    /// Events still alive.
    pub alive: usize,
    /// Per-frame detection records.
    pub detections: usize,
    /// Events confirmed by the holistic classifier.
    pub holistic: usize,
    /// True and observed distributions.
    pub measurement: Measurement,
    /// Full event states.
    pub snapshots: Vec<EventSnapshot>,
}

impl SurveySummary {
    /// Summarize `survey` as it stands.
    pub fn of(survey: &Survey) -> Result<Self, SurveyError> {
        let state = survey.state();
        Ok(Self {
            seed: survey.seed(),
            frames: u64::try_from(state.frames().len()).unwrap_or(u64::MAX),
            events: state.events().len(),
            alive: state.alive().len(),
            detections: state.detection_count(),
            holistic: state.holistic_count(),
            measurement: survey.measure()?,
            snapshots: survey.events().iter().map(TransientEvent::snapshot).collect(),
        })
    }
}

/// Result of an optimizer mode.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OptimizerOutcome {
    /// Per-frame path search.
    Path {
        /// Search result; the best genome holds one `[row, col]` gene per
        /// frame.
        result: GeneticOutcome,
        /// The best path as a fixed-width binary string.
        code: String,
        /// Digits per coordinate in `code`.
        bits: u32,
    },
    /// Flat-genome search over survey arguments.
    Intrinsic {
        /// Which arguments were searched.
        target: GeneticTarget,
        /// Search result; the best genome holds one argument per gene.
        result: GeneticOutcome,
    },
    /// SPSA minimization of the black-box loss.
    Spsa(SpsaOutcome),
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique, time-ordered run identifier.
    pub run_id: RunId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// What was run.
    pub mode: OptimizerMode,
    /// Final survey state.
    pub survey: SurveySummary,
    /// Search result, for optimizer modes.
    pub optimizer: Option<OptimizerOutcome>,
}

/// Write `report` as pretty JSON to `path`, or to stdout when absent.
pub fn write(report: &RunReport, path: Option<&Path>) -> Result<(), EngineError> {
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, report)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, report)?;
            lock.write_all(b"\n")?;
        }
    }
    Ok(())
}
