//! Event generation: a survey shape plus an ordered list of generator
//! callbacks.
//!
//! The generator holds no state besides its configuration. Each frame it
//! calls every registered function in order and concatenates the events
//! they return. A failing function aborts the whole call.

use rand::RngCore;
use transient_types::{CallbackRole, Characteristic, SurveyShape};

use crate::callback::{CallbackSlot, ExtraArgs, GeneratorFn, split_flat};
use crate::error::SurveyError;
use crate::event::TransientEvent;
use crate::survey::SurveyState;

/// Spawns new events each frame via pluggable generator functions.
#[derive(Debug, Clone)]
pub struct TransientGenerator {
    shape: SurveyShape,
    functions: Vec<CallbackSlot<GeneratorFn>>,
}

impl TransientGenerator {
    /// Create a generator for the given survey shape.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::InvalidShape`] for a zero dimension and the
    /// slot validation error for mismatched or malformed bias ranges.
    pub fn new(
        shape: SurveyShape,
        functions: Vec<CallbackSlot<GeneratorFn>>,
    ) -> Result<Self, SurveyError> {
        if shape.rows == 0 || shape.cols == 0 {
            return Err(SurveyError::InvalidShape {
                rows: shape.rows,
                cols: shape.cols,
            });
        }
        for slot in &functions {
            slot.validate(CallbackRole::Generator, false)?;
        }
        Ok(Self { shape, functions })
    }

    /// Survey shape events are generated over.
    pub const fn shape(&self) -> SurveyShape {
        self.shape
    }

    /// The configured generator functions, in call order.
    pub fn functions(&self) -> &[CallbackSlot<GeneratorFn>] {
        &self.functions
    }

    /// Run every generator function for `frame` and concatenate the results
    /// in call order.
    pub fn generate(
        &self,
        frame: u64,
        state: &SurveyState,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TransientEvent>, SurveyError> {
        let mut born = Vec::new();
        for slot in &self.functions {
            let events = (slot.func)(frame, self.shape, state, &slot.args, rng)
                .map_err(|source| SurveyError::callback(CallbackRole::Generator, source))?;
            born.extend(events);
        }
        Ok(born)
    }

    /// Bias characteristics of every function, concatenated in call order.
    pub fn characteristics(&self) -> Vec<Characteristic> {
        self.functions
            .iter()
            .flat_map(|slot| slot.char_bias.iter().copied())
            .collect()
    }

    /// Number of extra arguments per function.
    pub fn arg_counts(&self) -> Vec<usize> {
        self.functions.iter().map(|slot| slot.args.len()).collect()
    }

    /// Every function's extra arguments, concatenated in call order.
    pub fn args_flat(&self) -> Vec<f64> {
        self.functions
            .iter()
            .flat_map(|slot| slot.args.as_slice().iter().copied())
            .collect()
    }

    /// Split a flat vector into per-function argument lists without
    /// applying it.
    pub fn split_args(&self, flat: &[f64]) -> Result<Vec<ExtraArgs>, SurveyError> {
        split_flat(flat, &self.arg_counts())
    }

    /// Replace every function's extra arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::FlatLengthMismatch`] if the number of lists
    /// differs from the number of functions, or
    /// [`SurveyError::ArityMismatch`] if a list changes a function's
    /// argument count.
    pub fn set_args(&mut self, args: Vec<ExtraArgs>) -> Result<(), SurveyError> {
        if args.len() != self.functions.len() {
            return Err(SurveyError::FlatLengthMismatch {
                expected: self.functions.len(),
                actual: args.len(),
            });
        }
        for (slot, new) in self.functions.iter().zip(&args) {
            if new.len() != slot.args.len() {
                return Err(SurveyError::ArityMismatch {
                    role: CallbackRole::Generator,
                    name: slot.name.clone(),
                    expected: slot.args.len(),
                    actual: new.len(),
                });
            }
        }
        for (slot, new) in self.functions.iter_mut().zip(args) {
            slot.args = new;
        }
        Ok(())
    }

    /// Replace every function's extra arguments from one flat vector.
    pub fn set_args_flat(&mut self, flat: &[f64]) -> Result<(), SurveyError> {
        let args = self.split_args(flat)?;
        self.set_args(args)
    }
}
