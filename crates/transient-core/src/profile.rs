//! The observing profile: the detection pipeline applied to each frame.
//!
//! Per-frame detection runs `view`, then `obstruction`, then draws one
//! detector-noise value per surviving entry and records the detection on
//! the event. The two filters are meant to be independent criteria, so
//! their order does not change the result set; view first is the
//! convention. Holistic detection is a separate pass over every event's
//! full history and only sets each event's flag.
//!
//! Recording a detection is deduplicated per history row, so replaying a
//! frame without clearing detections first does not double count. It also
//! does not remove stale detections: a re-detection after the profile
//! changes must clear every event first (see `Survey::re_detect_events`).

use rand::RngCore;
use transient_types::{CallbackRole, Characteristic, CharacteristicSet, FrameEntry, Measurement};

use crate::callback::{
    CallbackSlot, ExtraArgs, FilterFn, HolisticFn, MeasurementFn, SurveyNoiseFn, split_flat,
};
use crate::error::{CallbackError, SurveyError};
use crate::event::TransientEvent;
use crate::survey::SurveyState;

/// Named measurement extractor.
#[derive(Clone)]
pub struct MeasurementSlot {
    /// Registry name.
    pub name: String,
    /// The extractor.
    pub func: MeasurementFn,
}

impl MeasurementSlot {
    /// Create a named measurement slot.
    pub fn new(name: &str, func: MeasurementFn) -> Self {
        Self {
            name: name.to_owned(),
            func,
        }
    }
}

impl core::fmt::Debug for MeasurementSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MeasurementSlot")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Extra arguments for the four tunable profile stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileArgs {
    /// View arguments.
    pub view: ExtraArgs,
    /// Obstruction arguments.
    pub obstruction: ExtraArgs,
    /// Holistic classifier arguments.
    pub holistic: ExtraArgs,
    /// Survey noise arguments.
    pub noise: ExtraArgs,
}

impl ProfileArgs {
    /// Concatenate in view, obstruction, holistic, noise order.
    pub fn to_flat(&self) -> Vec<f64> {
        [&self.view, &self.obstruction, &self.holistic, &self.noise]
            .iter()
            .flat_map(|args| args.as_slice().iter().copied())
            .collect()
    }
}

/// The composed detection pipeline.
#[derive(Debug, Clone)]
pub struct ObservingProfile {
    view: CallbackSlot<FilterFn>,
    obstruction: CallbackSlot<FilterFn>,
    holistic: CallbackSlot<HolisticFn>,
    noise: CallbackSlot<SurveyNoiseFn>,
    measurement: MeasurementSlot,
}

impl ObservingProfile {
    /// Assemble a profile, validating every stage's characteristic ranges.
    pub fn new(
        view: CallbackSlot<FilterFn>,
        obstruction: CallbackSlot<FilterFn>,
        holistic: CallbackSlot<HolisticFn>,
        noise: CallbackSlot<SurveyNoiseFn>,
        measurement: MeasurementSlot,
    ) -> Result<Self, SurveyError> {
        view.validate(CallbackRole::View, false)?;
        obstruction.validate(CallbackRole::Obstruction, false)?;
        holistic.validate(CallbackRole::Holistic, false)?;
        noise.validate(CallbackRole::SurveyNoise, false)?;
        Ok(Self {
            view,
            obstruction,
            holistic,
            noise,
            measurement,
        })
    }

    /// Run the per-frame pipeline on `entries` and record detections.
    ///
    /// Returns the number of new detection records.
    pub fn frame_detect(
        &self,
        time: u64,
        entries: &[FrameEntry],
        state: &mut SurveyState,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SurveyError> {
        let viewed = (self.view.func)(time, entries, state, &self.view.args, rng)
            .map_err(|source| SurveyError::callback(CallbackRole::View, source))?;
        let passed = (self.obstruction.func)(time, &viewed, state, &self.obstruction.args, rng)
            .map_err(|source| SurveyError::callback(CallbackRole::Obstruction, source))?;

        let mut noisy = Vec::with_capacity(passed.len());
        for entry in passed {
            let event = state.event(entry.event_index).ok_or_else(|| {
                SurveyError::callback(
                    CallbackRole::Obstruction,
                    CallbackError::UnknownEvent(entry.event_index),
                )
            })?;
            let noise = (self.noise.func)(event, state, &self.noise.args, rng)
                .map_err(|source| SurveyError::callback(CallbackRole::SurveyNoise, source))?;
            noisy.push((entry, noise));
        }

        let mut recorded = 0_usize;
        for (entry, noise) in noisy {
            let Some(event) = state.event_mut(entry.event_index) else {
                continue;
            };
            if event.record_detection(entry.history_index, noise)? {
                recorded = recorded.saturating_add(1);
            }
        }
        Ok(recorded)
    }

    /// Classify every event, alive or dead, from its full history.
    ///
    /// Returns the number of events classified as detected.
    pub fn holistic_detect(&self, state: &mut SurveyState) -> Result<usize, SurveyError> {
        let mut flags = Vec::with_capacity(state.events().len());
        for event in state.events() {
            let detected = (self.holistic.func)(event, state, &self.holistic.args)
                .map_err(|source| SurveyError::callback(CallbackRole::Holistic, source))?;
            flags.push(detected);
        }
        let mut detected = 0_usize;
        for (event, flag) in state.events_mut().iter_mut().zip(flags) {
            event.set_holistic_detection(flag);
            if flag {
                detected = detected.saturating_add(1);
            }
        }
        Ok(detected)
    }

    /// Extract true and observed parameter distributions.
    pub fn measure(
        &self,
        events: &[TransientEvent],
        state: &SurveyState,
    ) -> Result<Measurement, SurveyError> {
        (self.measurement.func)(events, state)
            .map_err(|source| SurveyError::callback(CallbackRole::Measurement, source))
    }

    /// Current extra arguments of the four tunable stages.
    pub fn args(&self) -> ProfileArgs {
        ProfileArgs {
            view: self.view.args.clone(),
            obstruction: self.obstruction.args.clone(),
            holistic: self.holistic.args.clone(),
            noise: self.noise.args.clone(),
        }
    }

    /// Argument counts in view, obstruction, holistic, noise order.
    pub fn arg_counts(&self) -> [usize; 4] {
        [
            self.view.args.len(),
            self.obstruction.args.len(),
            self.holistic.args.len(),
            self.noise.args.len(),
        ]
    }

    /// Characteristic ranges of one set, concatenated in view, obstruction,
    /// holistic, noise order.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::CharacteristicMismatch`] if a stage has
    /// arguments but no ranges in the requested set.
    pub fn characteristics(&self, set: CharacteristicSet) -> Result<Vec<Characteristic>, SurveyError> {
        let stages: [(CallbackRole, usize, &[Characteristic], &[Characteristic]); 4] = [
            (CallbackRole::View, self.view.args.len(), &self.view.char_path, &self.view.char_bias),
            (
                CallbackRole::Obstruction,
                self.obstruction.args.len(),
                &self.obstruction.char_path,
                &self.obstruction.char_bias,
            ),
            (
                CallbackRole::Holistic,
                self.holistic.args.len(),
                &self.holistic.char_path,
                &self.holistic.char_bias,
            ),
            (
                CallbackRole::SurveyNoise,
                self.noise.args.len(),
                &self.noise.char_path,
                &self.noise.char_bias,
            ),
        ];
        let mut out = Vec::new();
        for (role, args, path, bias) in stages {
            let chars = match set {
                CharacteristicSet::Path => path,
                CharacteristicSet::Bias => bias,
            };
            if chars.len() != args {
                return Err(SurveyError::CharacteristicMismatch {
                    role,
                    args,
                    characteristics: chars.len(),
                });
            }
            out.extend_from_slice(chars);
        }
        Ok(out)
    }

    /// Split a flat vector into per-stage arguments without applying it.
    pub fn split_args(&self, flat: &[f64]) -> Result<ProfileArgs, SurveyError> {
        let mut parts = split_flat(flat, &self.arg_counts())?.into_iter();
        Ok(ProfileArgs {
            view: parts.next().unwrap_or_default(),
            obstruction: parts.next().unwrap_or_default(),
            holistic: parts.next().unwrap_or_default(),
            noise: parts.next().unwrap_or_default(),
        })
    }

    /// Replace the extra arguments of the four tunable stages.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::ArityMismatch`] if any stage's argument count
    /// would change; nothing is applied in that case.
    pub fn set_args(&mut self, args: ProfileArgs) -> Result<(), SurveyError> {
        check_arity(CallbackRole::View, &self.view.name, &self.view.args, &args.view)?;
        check_arity(
            CallbackRole::Obstruction,
            &self.obstruction.name,
            &self.obstruction.args,
            &args.obstruction,
        )?;
        check_arity(
            CallbackRole::Holistic,
            &self.holistic.name,
            &self.holistic.args,
            &args.holistic,
        )?;
        check_arity(CallbackRole::SurveyNoise, &self.noise.name, &self.noise.args, &args.noise)?;
        self.view.args = args.view;
        self.obstruction.args = args.obstruction;
        self.holistic.args = args.holistic;
        self.noise.args = args.noise;
        Ok(())
    }

    /// Replace the stage arguments from one flat vector.
    pub fn set_args_flat(&mut self, flat: &[f64]) -> Result<(), SurveyError> {
        let args = self.split_args(flat)?;
        self.set_args(args)
    }

    /// Name of the measurement extractor.
    pub fn measurement_name(&self) -> &str {
        &self.measurement.name
    }

    /// Names of the view, obstruction, holistic and noise callbacks.
    pub fn stage_names(&self) -> [&str; 4] {
        [
            &self.view.name,
            &self.obstruction.name,
            &self.holistic.name,
            &self.noise.name,
        ]
    }
}

fn check_arity(
    role: CallbackRole,
    name: &str,
    current: &ExtraArgs,
    new: &ExtraArgs,
) -> Result<(), SurveyError> {
    if current.len() == new.len() {
        Ok(())
    } else {
        Err(SurveyError::ArityMismatch {
            role,
            name: name.to_owned(),
            expected: current.len(),
            actual: new.len(),
        })
    }
}
