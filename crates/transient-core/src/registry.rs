//! Name -> callback registry, populated at startup.
//!
//! Every role keeps its own table. An entry records how many extra
//! arguments the callback reads, and building a generator or profile from
//! configuration checks each configured argument list against it. The set
//! stays open through the `register_*` methods.
//!
//! Generators are registered as factories taking the [`EventNoise`] their
//! events carry, so any registered event-noise callback can be paired with
//! any generator from configuration. Factories also receive the entry's
//! [`RateMap`], if any, already checked against the survey shape.

use std::collections::BTreeMap;
use std::sync::Arc;

use transient_types::{CallbackRole, SurveyShape};

use crate::callback::{
    CallbackSlot, EventNoiseFn, ExtraArgs, FilterFn, GeneratorFn, HolisticFn, MeasurementFn,
    SurveyNoiseFn,
};
use crate::config::{CallbackConfig, GeneratorConfig, NoiseConfig, ProfileConfig, TransientConfig};
use crate::error::SurveyError;
use crate::event::EventNoise;
use crate::generator::TransientGenerator;
use crate::library;
use crate::profile::{MeasurementSlot, ObservingProfile};
use crate::rates::RateMap;
use crate::survey::Survey;

/// Builds a generator function around the event noise its events carry
/// and the configured rate map.
pub type GeneratorFactory =
    Arc<dyn Fn(EventNoise, Option<RateMap>) -> Result<GeneratorFn, SurveyError> + Send + Sync>;

#[derive(Clone)]
struct Registered<F> {
    func: F,
    extra_args: usize,
}

type Table<F> = BTreeMap<String, Registered<F>>;

fn insert<F>(table: &mut Table<F>, name: &str, extra_args: usize, func: F) {
    table.insert(name.to_owned(), Registered { func, extra_args });
}

fn lookup<'a, F>(
    table: &'a Table<F>,
    role: CallbackRole,
    name: &str,
    args: &[f64],
) -> Result<&'a F, SurveyError> {
    let entry = table.get(name).ok_or_else(|| SurveyError::UnknownCallback {
        role,
        name: name.to_owned(),
    })?;
    if entry.extra_args != args.len() {
        return Err(SurveyError::ArityMismatch {
            role,
            name: name.to_owned(),
            expected: entry.extra_args,
            actual: args.len(),
        });
    }
    Ok(&entry.func)
}

/// Registry of named callbacks for every pipeline role.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    generators: Table<GeneratorFactory>,
    event_noise: Table<EventNoiseFn>,
    views: Table<FilterFn>,
    obstructions: Table<FilterFn>,
    holistic: Table<HolisticFn>,
    survey_noise: Table<SurveyNoiseFn>,
    measurements: BTreeMap<String, MeasurementFn>,
}

impl CallbackRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in callback.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_generator(
            "uniform",
            4,
            Arc::new(|noise: EventNoise, _: Option<RateMap>| -> Result<GeneratorFn, SurveyError> {
                Ok(library::uniform_generator(noise))
            }),
        );
        registry.register_generator(
            "single",
            4,
            Arc::new(|noise: EventNoise, _: Option<RateMap>| -> Result<GeneratorFn, SurveyError> {
                Ok(library::single_generator(noise))
            }),
        );
        registry.register_generator("rate_map", 3, Arc::new(rate_map_factory));

        registry.register_event_noise("none", 0, library::silent_event_noise());
        registry.register_event_noise("gauss", 2, library::gauss_event_noise());

        registry.register_view("identity", 0, library::identity_view());
        registry.register_view("circle", 3, library::circle_view());
        registry.register_view("rectangle", 4, library::rectangle_view());

        registry.register_obstruction("pass_all", 0, library::pass_all());
        registry.register_obstruction("reject_all", 0, library::reject_all());
        registry.register_obstruction("random_pass", 1, library::random_pass());
        registry.register_obstruction("brightness", 1, library::brightness());

        registry.register_holistic("detected_once", 0, library::detected_once());
        registry.register_holistic("detected_at_least", 1, library::detected_at_least());

        registry.register_survey_noise("none", 0, library::silent_survey_noise());
        registry.register_survey_noise("gauss", 2, library::gauss_survey_noise());

        registry.register_measurement("lifetime", library::lifetime_measurement());
        registry.register_measurement(
            "lifetime_and_luminosity",
            library::lifetime_and_luminosity_measurement(),
        );
        registry
    }

    /// Register a generator factory reading `extra_args` arguments.
    pub fn register_generator(&mut self, name: &str, extra_args: usize, factory: GeneratorFactory) {
        insert(&mut self.generators, name, extra_args, factory);
    }

    /// Register an event-noise callback.
    pub fn register_event_noise(&mut self, name: &str, extra_args: usize, func: EventNoiseFn) {
        insert(&mut self.event_noise, name, extra_args, func);
    }

    /// Register a view filter.
    pub fn register_view(&mut self, name: &str, extra_args: usize, func: FilterFn) {
        insert(&mut self.views, name, extra_args, func);
    }

    /// Register an obstruction filter.
    pub fn register_obstruction(&mut self, name: &str, extra_args: usize, func: FilterFn) {
        insert(&mut self.obstructions, name, extra_args, func);
    }

    /// Register a holistic classifier.
    pub fn register_holistic(&mut self, name: &str, extra_args: usize, func: HolisticFn) {
        insert(&mut self.holistic, name, extra_args, func);
    }

    /// Register a survey-noise callback.
    pub fn register_survey_noise(&mut self, name: &str, extra_args: usize, func: SurveyNoiseFn) {
        insert(&mut self.survey_noise, name, extra_args, func);
    }

    /// Register a measurement extractor.
    pub fn register_measurement(&mut self, name: &str, func: MeasurementFn) {
        self.measurements.insert(name.to_owned(), func);
    }

    /// Registered names for one role, sorted.
    pub fn names(&self, role: CallbackRole) -> Vec<&str> {
        match role {
            CallbackRole::Generator => self.generators.keys().map(String::as_str).collect(),
            CallbackRole::EventNoise => self.event_noise.keys().map(String::as_str).collect(),
            CallbackRole::View => self.views.keys().map(String::as_str).collect(),
            CallbackRole::Obstruction => self.obstructions.keys().map(String::as_str).collect(),
            CallbackRole::Holistic => self.holistic.keys().map(String::as_str).collect(),
            CallbackRole::SurveyNoise => self.survey_noise.keys().map(String::as_str).collect(),
            CallbackRole::Measurement => self.measurements.keys().map(String::as_str).collect(),
        }
    }

    /// Resolve an event-noise configuration.
    pub fn event_noise(&self, config: &NoiseConfig) -> Result<EventNoise, SurveyError> {
        let func = lookup(&self.event_noise, CallbackRole::EventNoise, &config.name, &config.args)?;
        Ok(EventNoise::new(
            &config.name,
            Arc::clone(func),
            ExtraArgs::new(config.args.clone()),
        ))
    }

    /// Build a generator over `shape` from configuration.
    pub fn build_generator(
        &self,
        config: &GeneratorConfig,
        shape: SurveyShape,
    ) -> Result<TransientGenerator, SurveyError> {
        let mut functions = Vec::with_capacity(config.functions.len());
        for entry in &config.functions {
            let factory = lookup(&self.generators, CallbackRole::Generator, &entry.name, &entry.args)?;
            let noise = self.event_noise(&entry.event_noise)?;
            if let Some(rates) = &entry.rates {
                rates.validate(shape)?;
            }
            let func = factory(noise, entry.rates.clone())?;
            functions.push(
                CallbackSlot::new(&entry.name, func, ExtraArgs::new(entry.args.clone()))
                    .with_bias(entry.bias.clone()),
            );
        }
        TransientGenerator::new(shape, functions)
    }

    /// Build an observing profile from configuration.
    pub fn build_profile(&self, config: &ProfileConfig) -> Result<ObservingProfile, SurveyError> {
        let view = slot(&self.views, CallbackRole::View, &config.view)?;
        let obstruction = slot(&self.obstructions, CallbackRole::Obstruction, &config.obstruction)?;
        let holistic = slot(&self.holistic, CallbackRole::Holistic, &config.holistic)?;
        let noise = slot(&self.survey_noise, CallbackRole::SurveyNoise, &config.noise)?;
        let measurement = self.measurements.get(&config.measurement).ok_or_else(|| {
            SurveyError::UnknownCallback {
                role: CallbackRole::Measurement,
                name: config.measurement.clone(),
            }
        })?;
        ObservingProfile::new(
            view,
            obstruction,
            holistic,
            noise,
            MeasurementSlot::new(&config.measurement, Arc::clone(measurement)),
        )
    }

    /// Build a complete, unstarted survey from configuration.
    pub fn build_survey(&self, config: &TransientConfig) -> Result<Survey, SurveyError> {
        let shape = SurveyShape::new(config.survey.rows, config.survey.cols);
        let generator = self.build_generator(&config.generator, shape)?;
        let profile = self.build_profile(&config.profile)?;
        Ok(Survey::new(generator, profile, config.survey.seed))
    }
}

fn rate_map_factory(noise: EventNoise, rates: Option<RateMap>) -> Result<GeneratorFn, SurveyError> {
    let rates = rates.ok_or_else(|| SurveyError::MissingRateMap {
        name: String::from("rate_map"),
    })?;
    Ok(library::rate_map_generator(rates, noise))
}

fn slot<F: Clone>(
    table: &Table<F>,
    role: CallbackRole,
    config: &CallbackConfig,
) -> Result<CallbackSlot<F>, SurveyError> {
    let func = lookup(table, role, &config.name, &config.args)?;
    Ok(
        CallbackSlot::new(&config.name, func.clone(), ExtraArgs::new(config.args.clone()))
            .with_path(config.path.clone())
            .with_bias(config.bias.clone()),
    )
}

impl core::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("generators", &self.names(CallbackRole::Generator))
            .field("event_noise", &self.names(CallbackRole::EventNoise))
            .field("views", &self.names(CallbackRole::View))
            .field("obstructions", &self.names(CallbackRole::Obstruction))
            .field("holistic", &self.names(CallbackRole::Holistic))
            .field("survey_noise", &self.names(CallbackRole::SurveyNoise))
            .field("measurements", &self.names(CallbackRole::Measurement))
            .finish()
    }
}
