//! One function per engine mode.
//!
//! Each takes the configured survey and returns the survey to summarize
//! plus, for optimizer modes, the search outcome.

use tracing::info;
use transient_core::{Survey, TransientConfig};
use transient_optimize::genetic::path_layout;
use transient_optimize::pathcode;
use transient_optimize::scoring::{circle_path_score, ks_fitness};
use transient_optimize::{
    GeneticOptimizer, GeneticSettings, IntrinsicExtractor, TransientBlackBox, TransientSpsa,
};
use transient_types::ParameterSample;

use crate::error::EngineError;
use crate::report::OptimizerOutcome;

/// Mode result: final survey and optional search outcome.
pub type ModeResult = Result<(Survey, Option<OptimizerOutcome>), EngineError>;

/// Simulate `survey.frames` frames once.
pub fn survey(mut survey: Survey, config: &TransientConfig) -> ModeResult {
    survey.re_run_survey(config.survey.frames)?;
    Ok((survey, None))
}

/// Evolve a per-frame viewing path scored by events inside a circle.
pub fn path(mut survey: Survey, config: &TransientConfig) -> ModeResult {
    let optimizer_config = &config.optimizer;
    let settings = GeneticSettings::from_config(&optimizer_config.genetic)?;
    let layout = path_layout(survey.shape(), optimizer_config.survey_time);
    let mut optimizer = GeneticOptimizer::new(layout, settings, config.survey.seed)?;
    let outcome = optimizer.run(&survey, circle_path_score(optimizer_config.genetic.path_radius))?;
    let bits = pathcode::bit_width(survey.shape());
    let code = pathcode::encode_path(&pathcode::genome_path(&outcome.best)?, bits)?;
    info!(best_score = outcome.best_score, bits, "path search finished");

    survey.re_run_survey(optimizer_config.survey_time)?;
    Ok((
        survey,
        Some(OptimizerOutcome::Path {
            result: outcome,
            code,
            bits,
        }),
    ))
}

/// Evolve profile or generator arguments towards the comparison data.
pub fn intrinsic(mut survey: Survey, config: &TransientConfig) -> ModeResult {
    let optimizer_config = &config.optimizer;
    let time = optimizer_config.survey_time;
    let comparison = comparison(&survey, config)?;
    let target = optimizer_config.genetic.target;
    let settings = GeneticSettings::from_config(&optimizer_config.genetic)?;
    let mut extractor = IntrinsicExtractor::new(&survey, target, settings, config.survey.seed)?;
    let result = extractor.run(&survey, time, ks_fitness(&comparison))?;
    info!(?target, best_score = result.best_score, "intrinsic search finished");

    survey.re_run_survey(time)?;
    Ok((survey, Some(OptimizerOutcome::Intrinsic { target, result })))
}

/// Minimize the black-box KS loss with SPSA. The returned survey is left
/// configured at the final estimate.
pub fn spsa(survey: Survey, config: &TransientConfig) -> ModeResult {
    let optimizer_config = &config.optimizer;
    let comparison = comparison(&survey, config)?;
    let mut black_box =
        TransientBlackBox::with_ks_loss(survey, optimizer_config.survey_time, comparison)?;
    let mut spsa = TransientSpsa::from_config(
        &optimizer_config.spsa,
        black_box.dimension(),
        config.survey.seed,
    )?;
    let outcome = spsa.minimize_black_box(&mut black_box)?;
    info!(final_loss = outcome.final_loss, "spsa search finished");
    Ok((black_box.survey().clone(), Some(OptimizerOutcome::Spsa(outcome))))
}

/// Comparison data from the configuration, or the observed sample of a
/// reference run of the configured survey when none is given.
fn comparison(survey: &Survey, config: &TransientConfig) -> Result<Vec<ParameterSample>, EngineError> {
    if !config.optimizer.comparison.is_empty() {
        return Ok(config.optimizer.comparison.clone());
    }
    let mut reference = survey.clone();
    reference.re_run_survey(config.optimizer.survey_time)?;
    let observed = reference.measure()?.observed;
    info!(
        parameters = observed.len(),
        "no comparison data configured, using a reference run"
    );
    Ok(observed)
}
