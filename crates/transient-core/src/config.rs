//! Configuration loading and typed config structures for the transient
//! survey.
//!
//! The canonical configuration lives in `transient-config.yaml` at the
//! project root. This module defines strongly-typed structs that mirror the
//! YAML structure; every field has a default so partial files are valid.
//! Callback names are resolved against a
//! [`CallbackRegistry`](crate::registry::CallbackRegistry) when the survey is
//! built, not here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use transient_types::{Characteristic, ParameterSample};

use crate::rates::RateMap;

/// Reasons a survey configuration is rejected before any survey is built.
///
/// Callback names are checked against the registry later, when the survey
/// is assembled; these are the problems visible in the document itself.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The survey configuration file could not be opened or read.
    #[error("cannot read survey config {}: {source}", .path.display())]
    Unreadable {
        /// The file that was requested.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not YAML or does not match the survey schema.
    #[error("survey config does not match the schema: {source}")]
    Malformed {
        /// The underlying YAML error.
        #[from]
        source: serde_yml::Error,
    },

    /// The survey field has no pixels to spawn or observe events on.
    #[error("survey field {rows}x{cols} has no pixels")]
    EmptyField {
        /// Configured rows.
        rows: u32,
        /// Configured columns.
        cols: u32,
    },

    /// A stage, event-noise entry or measurement has a blank callback name.
    #[error("{stage} has no callback name")]
    UnnamedStage {
        /// Which stage, e.g. `profile.view` or `generator.functions[1]`.
        stage: String,
    },

    /// A bias or path range cannot bound an argument.
    #[error("{stage} {set} range {index} is [{low}, {high}): bounds must be finite with low <= high")]
    BadRange {
        /// Owning stage.
        stage: String,
        /// `bias` or `path`.
        set: &'static str,
        /// Position in the range vector.
        index: usize,
        /// Configured lower bound.
        low: f64,
        /// Configured upper bound.
        high: f64,
    },

    /// A genetic crossover or mutation rate is not a probability.
    #[error("optimizer.genetic.{name} is {value}, expected a probability in [0, 1]")]
    BadBreedRate {
        /// `crossover_rate` or `mutation_rate`.
        name: &'static str,
        /// The offending value.
        value: f64,
    },
}

/// Top-level configuration.
///
/// Mirrors the structure of `transient-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TransientConfig {
    /// Survey shape, seed and length.
    #[serde(default)]
    pub survey: SurveySection,

    /// Generator functions.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Observing profile stages.
    #[serde(default)]
    pub profile: ProfileConfig,

    /// Optimizer selection and tuning.
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Report output.
    #[serde(default)]
    pub output: OutputConfig,
}

impl TransientConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Unreadable`] if the file cannot be read, or
    /// any error [`TransientConfig::parse`] reports for its content.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse and check configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Malformed`] if the string does not match the
    /// schema, or the first problem [`TransientConfig::validate`] finds.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the survey field, stage names, characteristic ranges and
    /// breeding rates.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found, in document order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let survey = &self.survey;
        if survey.rows == 0 || survey.cols == 0 {
            return Err(ConfigError::EmptyField {
                rows: survey.rows,
                cols: survey.cols,
            });
        }

        for (index, entry) in self.generator.functions.iter().enumerate() {
            let stage = format!("generator.functions[{index}]");
            check_name(&entry.name, &stage)?;
            check_name(&entry.event_noise.name, &format!("{stage}.event_noise"))?;
            check_ranges(&stage, "bias", &entry.bias)?;
        }

        let profile = &self.profile;
        for (stage, callback) in [
            ("profile.view", &profile.view),
            ("profile.obstruction", &profile.obstruction),
            ("profile.holistic", &profile.holistic),
            ("profile.noise", &profile.noise),
        ] {
            check_name(&callback.name, stage)?;
            check_ranges(stage, "bias", &callback.bias)?;
            check_ranges(stage, "path", &callback.path)?;
        }
        check_name(&profile.measurement, "profile.measurement")?;

        let genetic = &self.optimizer.genetic;
        for (name, value) in [
            ("crossover_rate", genetic.crossover_rate),
            ("mutation_rate", genetic.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::BadBreedRate { name, value });
            }
        }
        Ok(())
    }
}

fn check_name(name: &str, stage: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::UnnamedStage {
            stage: stage.to_owned(),
        });
    }
    Ok(())
}

fn check_ranges(stage: &str, set: &'static str, ranges: &[Characteristic]) -> Result<(), ConfigError> {
    for (index, c) in ranges.iter().enumerate() {
        if !c.is_well_formed() {
            return Err(ConfigError::BadRange {
                stage: stage.to_owned(),
                set,
                index,
                low: c.low,
                high: c.high,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Survey
// ---------------------------------------------------------------------------

/// Survey-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SurveySection {
    /// Rows of the survey field.
    #[serde(default = "default_rows")]
    pub rows: u32,

    /// Columns of the survey field.
    #[serde(default = "default_cols")]
    pub cols: u32,

    /// Random seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Frames to simulate.
    #[serde(default = "default_frames")]
    pub frames: u64,
}

impl Default for SurveySection {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            seed: default_seed(),
            frames: default_frames(),
        }
    }
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

/// One configured callback: registry name, extra arguments and the
/// characteristic ranges bounding them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackConfig {
    /// Registry name.
    pub name: String,

    /// Extra arguments.
    #[serde(default)]
    pub args: Vec<f64>,

    /// Strategy-search ranges, one per argument (may be empty).
    #[serde(default)]
    pub path: Vec<Characteristic>,

    /// Bias-extraction ranges, one per argument.
    #[serde(default)]
    pub bias: Vec<Characteristic>,
}

impl CallbackConfig {
    /// A callback with no extra arguments.
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            args: Vec::new(),
            path: Vec::new(),
            bias: Vec::new(),
        }
    }
}

/// Event luminosity noise attached to a generator function.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NoiseConfig {
    /// Registry name.
    #[serde(default = "default_noise_name")]
    pub name: String,

    /// Extra arguments.
    #[serde(default)]
    pub args: Vec<f64>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            name: default_noise_name(),
            args: Vec::new(),
        }
    }
}

/// One generator function with its event noise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorEntry {
    /// Registry name.
    pub name: String,

    /// Extra arguments.
    #[serde(default)]
    pub args: Vec<f64>,

    /// Bias-extraction ranges, one per argument.
    #[serde(default)]
    pub bias: Vec<Characteristic>,

    /// Per-pixel spawn probabilities, for generators that read them.
    #[serde(default)]
    pub rates: Option<RateMap>,

    /// Luminosity noise given to every event the function spawns.
    #[serde(default)]
    pub event_noise: NoiseConfig,
}

/// Generator functions, called in order each frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneratorConfig {
    /// Configured functions.
    #[serde(default = "default_generator_functions")]
    pub functions: Vec<GeneratorEntry>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            functions: default_generator_functions(),
        }
    }
}

/// Observing profile stages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileConfig {
    /// Field-of-view filter.
    #[serde(default = "default_view")]
    pub view: CallbackConfig,

    /// Non-geometric filter.
    #[serde(default = "default_obstruction")]
    pub obstruction: CallbackConfig,

    /// Whole-history classifier.
    #[serde(default = "default_holistic")]
    pub holistic: CallbackConfig,

    /// Detector noise.
    #[serde(default = "default_survey_noise")]
    pub noise: CallbackConfig,

    /// Measurement extractor name.
    #[serde(default = "default_measurement")]
    pub measurement: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            view: default_view(),
            obstruction: default_obstruction(),
            holistic: default_holistic(),
            noise: default_survey_noise(),
            measurement: default_measurement(),
        }
    }
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

/// What the engine runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerMode {
    /// Simulate once and report.
    #[default]
    Survey,
    /// Per-frame viewing path genetic search.
    Path,
    /// Flat-genome genetic search over profile or generator arguments.
    Intrinsic,
    /// SPSA minimization of the black-box loss.
    Spsa,
}

/// Which arguments the flat-genome genetic search tunes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneticTarget {
    /// Profile arguments bounded by the path ranges.
    ProfilePath,
    /// Profile arguments bounded by the bias ranges.
    #[default]
    ProfileBias,
    /// Generator arguments bounded by their bias ranges.
    Generator,
}

/// Genetic search parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeneticConfig {
    /// Population size, rounded up to a multiple of four.
    #[serde(default = "default_population_size")]
    pub population_size: usize,

    /// Generations to run.
    #[serde(default = "default_generations")]
    pub generations: usize,

    /// Per-locus crossover probability.
    #[serde(default = "default_crossover_rate")]
    pub crossover_rate: f64,

    /// Per-locus mutation probability.
    #[serde(default = "default_mutation_rate")]
    pub mutation_rate: f64,

    /// Score population members on the rayon pool.
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Flat-genome target.
    #[serde(default)]
    pub target: GeneticTarget,

    /// Radius of the per-frame scoring circle in path mode.
    #[serde(default = "default_path_radius")]
    pub path_radius: f64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            generations: default_generations(),
            crossover_rate: default_crossover_rate(),
            mutation_rate: default_mutation_rate(),
            parallel: true,
            target: GeneticTarget::default(),
            path_radius: default_path_radius(),
        }
    }
}

/// SPSA parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpsaConfig {
    /// Iteration budget `Q`.
    #[serde(default = "default_spsa_iterations")]
    pub iterations: u32,

    /// Gain decay exponent of `a(n)`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Perturbation decay exponent of `delta(n)`.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Starting point in scaled coordinates; the origin when absent.
    #[serde(default)]
    pub start: Option<Vec<f64>>,
}

impl Default for SpsaConfig {
    fn default() -> Self {
        Self {
            iterations: default_spsa_iterations(),
            alpha: default_alpha(),
            gamma: default_gamma(),
            start: None,
        }
    }
}

/// Optimizer selection and parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptimizerConfig {
    /// What to run.
    #[serde(default)]
    pub mode: OptimizerMode,

    /// Frames each optimizer re-run simulates.
    #[serde(default = "default_survey_time")]
    pub survey_time: u64,

    /// Genetic search parameters.
    #[serde(default)]
    pub genetic: GeneticConfig,

    /// SPSA parameters.
    #[serde(default)]
    pub spsa: SpsaConfig,

    /// Comparison data for loss functions. When empty, the engine measures
    /// a reference run of the configured survey instead.
    #[serde(default)]
    pub comparison: Vec<ParameterSample>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            mode: OptimizerMode::default(),
            survey_time: default_survey_time(),
            genetic: GeneticConfig::default(),
            spsa: SpsaConfig::default(),
            comparison: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging and output
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OutputConfig {
    /// Where to write the JSON run report; stdout when absent.
    #[serde(default)]
    pub report_path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_rows() -> u32 {
    64
}

const fn default_cols() -> u32 {
    64
}

const fn default_seed() -> u64 {
    42
}

const fn default_frames() -> u64 {
    50
}

const fn default_true() -> bool {
    true
}

fn default_noise_name() -> String {
    String::from("none")
}

fn default_generator_functions() -> Vec<GeneratorEntry> {
    vec![GeneratorEntry {
        name: String::from("uniform"),
        args: vec![0.002, 20.0, 5.0, 0.5],
        bias: vec![
            Characteristic::float(0.0005, 0.005),
            Characteristic::float(5.0, 40.0),
            Characteristic::float(1.0, 10.0),
            Characteristic::float(0.0, 1.0),
        ],
        rates: None,
        event_noise: NoiseConfig {
            name: String::from("gauss"),
            args: vec![0.0, 0.05],
        },
    }]
}

fn default_view() -> CallbackConfig {
    CallbackConfig {
        name: String::from("circle"),
        args: vec![32.0, 32.0, 16.0],
        path: vec![
            Characteristic::int(0.0, 64.0),
            Characteristic::int(0.0, 64.0),
            Characteristic::float(4.0, 32.0),
        ],
        bias: vec![
            Characteristic::float(32.0, 32.0),
            Characteristic::float(32.0, 32.0),
            Characteristic::float(8.0, 32.0),
        ],
    }
}

fn default_obstruction() -> CallbackConfig {
    CallbackConfig {
        name: String::from("brightness"),
        args: vec![0.9],
        path: vec![Characteristic::float(0.5, 1.2)],
        bias: vec![Characteristic::float(0.5, 1.2)],
    }
}

fn default_holistic() -> CallbackConfig {
    CallbackConfig {
        name: String::from("detected_at_least"),
        args: vec![2.0],
        path: vec![Characteristic::int(1.0, 5.0)],
        bias: vec![Characteristic::int(1.0, 5.0)],
    }
}

fn default_survey_noise() -> CallbackConfig {
    CallbackConfig {
        name: String::from("gauss"),
        args: vec![0.0, 0.1],
        path: vec![Characteristic::float(0.0, 0.0), Characteristic::float(0.0, 0.5)],
        bias: vec![Characteristic::float(0.0, 0.0), Characteristic::float(0.0, 0.5)],
    }
}

fn default_measurement() -> String {
    String::from("lifetime")
}

const fn default_population_size() -> usize {
    20
}

const fn default_generations() -> usize {
    10
}

const fn default_crossover_rate() -> f64 {
    0.3
}

const fn default_mutation_rate() -> f64 {
    0.1
}

const fn default_path_radius() -> f64 {
    8.0
}

const fn default_spsa_iterations() -> u32 {
    40
}

const fn default_alpha() -> f64 {
    1.0
}

fn default_gamma() -> f64 {
    1.0 / 6.0
}

const fn default_survey_time() -> u64 {
    30
}

fn default_log_level() -> String {
    String::from("info")
}

#[cfg(test)]
mod tests {
    use transient_types::ArgKind;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TransientConfig::default();
        assert_eq!(config.survey.seed, 42);
        assert_eq!(config.survey.rows, 64);
        assert_eq!(config.generator.functions.len(), 1);
        assert_eq!(config.profile.view.name, "circle");
        assert_eq!(config.profile.view.args.len(), config.profile.view.bias.len());
        assert_eq!(config.optimizer.mode, OptimizerMode::Survey);
        assert!((config.optimizer.spsa.gamma - 1.0 / 6.0).abs() < f64::EPSILON);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn repository_config_matches_defaults() {
        let config = TransientConfig::parse(include_str!("../../../transient-config.yaml"));
        assert!(config.is_ok(), "parse failed: {config:?}");
        assert_eq!(config.unwrap_or_default(), TransientConfig::default());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r"
survey:
  rows: 10
  cols: 12
  seed: 7
  frames: 20

generator:
  functions:
    - name: single
      args: [0, 5, 5, 3]
      bias:
        - { low: 0, high: 0, kind: int }
        - { low: 0, high: 10, kind: float }
        - { low: 0, high: 12, kind: float }
        - { low: 1, high: 10, kind: int }

profile:
  view:
    name: identity
  obstruction:
    name: random_pass
    args: [0.5]
    bias:
      - { low: 0.0, high: 1.0, kind: float }
  holistic:
    name: detected_once
  noise:
    name: none
  measurement: lifetime_and_luminosity

optimizer:
  mode: spsa
  survey_time: 15
  spsa:
    iterations: 5
    start: [0.0, 0.5]
  genetic:
    target: generator
  comparison:
    - name: lifetime
      values: [3.0, 4.0]

logging:
  level: debug

output:
  report_path: out/report.json
";
        let config = TransientConfig::parse(yaml);
        assert!(config.is_ok(), "parse failed: {config:?}");
        let config = config.unwrap_or_default();
        assert_eq!(config.survey.cols, 12);
        let single = config.generator.functions.first();
        assert_eq!(single.map(|f| f.name.as_str()), Some("single"));
        assert_eq!(single.map(|f| f.event_noise.name.as_str()), Some("none"));
        assert_eq!(
            single.and_then(|f| f.bias.last()).map(|c| c.kind),
            Some(ArgKind::Int)
        );
        assert_eq!(config.profile.obstruction.args, vec![0.5]);
        assert!(config.profile.view.args.is_empty());
        assert_eq!(config.profile.measurement, "lifetime_and_luminosity");
        assert_eq!(config.optimizer.mode, OptimizerMode::Spsa);
        assert_eq!(config.optimizer.spsa.iterations, 5);
        assert_eq!(config.optimizer.spsa.start, Some(vec![0.0, 0.5]));
        assert_eq!(config.optimizer.genetic.target, GeneticTarget::Generator);
        assert_eq!(config.optimizer.genetic.population_size, 20);
        assert_eq!(config.optimizer.comparison.len(), 1);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.output.report_path,
            Some(PathBuf::from("out/report.json"))
        );
    }

    #[test]
    fn parse_empty_yaml_uses_defaults() {
        let config = TransientConfig::parse("{}");
        assert!(config.is_ok());
        assert_eq!(config.unwrap_or_default(), TransientConfig::default());
    }

    #[test]
    fn invalid_yaml_returns_error() {
        let result = TransientConfig::parse("survey: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Malformed { .. })));
    }

    #[test]
    fn missing_file_names_the_path() {
        let result = TransientConfig::from_file(Path::new("no/such/transient-config.yaml"));
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("no/such/transient-config.yaml"), "{message}");
    }

    #[test]
    fn empty_field_is_rejected() {
        let result = TransientConfig::parse("survey: { rows: 0, cols: 8 }");
        assert!(matches!(result, Err(ConfigError::EmptyField { rows: 0, cols: 8 })));
    }

    #[test]
    fn blank_stage_name_is_reported_by_location() {
        let result = TransientConfig::parse("profile: { holistic: { name: '' } }");
        assert!(
            matches!(&result, Err(ConfigError::UnnamedStage { stage }) if stage == "profile.holistic"),
            "{result:?}"
        );
    }

    #[test]
    fn inverted_bias_range_is_reported_by_location() {
        let yaml = r"
generator:
  functions:
    - name: single
      args: [0, 5, 5, 3]
      bias:
        - { low: 0, high: 0, kind: int }
        - { low: 10, high: 0, kind: float }
        - { low: 0, high: 10, kind: float }
        - { low: 1, high: 10, kind: int }
";
        let result = TransientConfig::parse(yaml);
        assert!(
            matches!(
                &result,
                Err(ConfigError::BadRange { stage, set: "bias", index: 1, .. })
                    if stage == "generator.functions[0]"
            ),
            "{result:?}"
        );
    }

    #[test]
    fn breed_rates_must_be_probabilities() {
        let result = TransientConfig::parse("optimizer: { genetic: { mutation_rate: 1.5 } }");
        assert!(matches!(
            result,
            Err(ConfigError::BadBreedRate { name: "mutation_rate", .. })
        ));
    }
}
