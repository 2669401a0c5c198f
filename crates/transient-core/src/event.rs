//! A single transient event and its ALIVE -> DEAD state machine.
//!
//! An event is born with a birth-frame history row. Each [`advance`] steps
//! the event one frame: if its age (frames since birth) now exceeds its
//! lifetime it is marked for death and frozen; otherwise it moves by its
//! velocity, recomputes luminosity from its luminosity series plus event
//! noise, and appends one history row. Dead events never change again.
//!
//! Detection history is separate from the core history. It is written only
//! by the observing profile and can be cleared for a re-detection pass
//! without touching trajectories.
//!
//! [`advance`]: TransientEvent::advance

use rand::RngCore;
use tracing::trace;
use transient_types::{
    CallbackRole, DetectionRecord, EventId, EventSnapshot, EventState, HistoryEntry,
};

use crate::callback::{EventNoiseFn, ExtraArgs, event_noise_fn};
use crate::error::SurveyError;

/// Event luminosity noise: a named callback with its extra arguments.
#[derive(Clone)]
pub struct EventNoise {
    name: String,
    func: EventNoiseFn,
    args: ExtraArgs,
}

impl EventNoise {
    /// Build a noise term from a callback and its arguments.
    pub fn new(name: &str, func: EventNoiseFn, args: ExtraArgs) -> Self {
        Self {
            name: name.to_owned(),
            func,
            args,
        }
    }

    /// Noise term that always contributes zero.
    pub fn silent() -> Self {
        Self::new(
            "none",
            event_noise_fn(|_, _, _, _, _| Ok(0.0)),
            ExtraArgs::none(),
        )
    }

    /// Registry name of the callback.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Draw one noise value.
    pub fn sample(
        &self,
        luminosity: f64,
        location: (f64, f64),
        lifetime: f64,
        rng: &mut dyn RngCore,
    ) -> Result<f64, SurveyError> {
        (self.func)(luminosity, location, lifetime, &self.args, rng)
            .map_err(|source| SurveyError::callback(CallbackRole::EventNoise, source))
    }
}

impl core::fmt::Debug for EventNoise {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventNoise")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Construction parameters for a [`TransientEvent`].
#[derive(Debug, Clone)]
pub struct EventSpec {
    /// Class label (usually the generator's name).
    pub class_id: String,
    /// Frame the event is born in.
    pub birth_frame: u64,
    /// Starting `(x, y)` position.
    pub position: (f64, f64),
    /// `(xdot, ydot)` velocity per frame.
    pub velocity: (f64, f64),
    /// Lifetime in frames.
    pub lifetime: f64,
    /// Luminosity per frame of age, cycled when shorter than the lifetime.
    pub luminosity_series: Vec<f64>,
    /// Luminosity noise term.
    pub noise: EventNoise,
}

/// A short-lived point phenomenon moving and fading across the survey field.
#[derive(Debug, Clone)]
pub struct TransientEvent {
    id: EventId,
    class_id: String,
    birth_frame: u64,
    current_time: u64,
    position: (f64, f64),
    velocity: (f64, f64),
    lifetime: f64,
    luminosity: f64,
    luminosity_series: Vec<f64>,
    noise: EventNoise,
    history: Vec<HistoryEntry>,
    detections: Vec<DetectionRecord>,
    marked_for_death: bool,
    holistic_detection: bool,
}

impl TransientEvent {
    /// Create an event, drawing its id and initial luminosity noise from `rng`.
    ///
    /// The initial luminosity is the first series sample plus one draw of the
    /// event noise, and it is recorded as the birth-frame history row.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::EmptyLuminositySeries`] for an empty series, or
    /// the noise callback's error.
    pub fn new(spec: EventSpec, rng: &mut dyn RngCore) -> Result<Self, SurveyError> {
        let EventSpec {
            class_id,
            birth_frame,
            position,
            velocity,
            lifetime,
            luminosity_series,
            noise,
        } = spec;
        let first = luminosity_series
            .first()
            .copied()
            .ok_or(SurveyError::EmptyLuminositySeries)?;
        let id = EventId::random(rng);
        let luminosity = first + noise.sample(first, position, lifetime, rng)?;
        let birth_row = HistoryEntry {
            time: birth_frame,
            x: position.0,
            y: position.1,
            xdot: velocity.0,
            ydot: velocity.1,
            luminosity,
        };
        Ok(Self {
            id,
            class_id,
            birth_frame,
            current_time: birth_frame,
            position,
            velocity,
            lifetime,
            luminosity,
            luminosity_series,
            noise,
            history: vec![birth_row],
            detections: Vec::new(),
            marked_for_death: false,
            holistic_detection: false,
        })
    }

    /// Step the event one frame.
    ///
    /// Returns the index of the history row appended for the new frame, or
    /// `None` if the event is (or just became) dead.
    pub fn advance(&mut self, rng: &mut dyn RngCore) -> Result<Option<usize>, SurveyError> {
        if self.marked_for_death {
            return Ok(None);
        }
        let next = self
            .current_time
            .checked_add(1)
            .ok_or(SurveyError::FrameOverflow)?;
        let age = next.saturating_sub(self.birth_frame);
        if age as f64 > self.lifetime {
            self.marked_for_death = true;
            trace!(event = %self.id, frame = next, "event died");
            return Ok(None);
        }

        self.current_time = next;
        self.position.0 += self.velocity.0;
        self.position.1 += self.velocity.1;

        let base = self.series_sample(age);
        self.luminosity = base + self.noise.sample(base, self.position, self.lifetime, rng)?;

        self.history.push(HistoryEntry {
            time: next,
            x: self.position.0,
            y: self.position.1,
            xdot: self.velocity.0,
            ydot: self.velocity.1,
            luminosity: self.luminosity,
        });
        Ok(Some(self.history.len().saturating_sub(1)))
    }

    /// Luminosity series sample for the given age, cycling the series.
    fn series_sample(&self, age: u64) -> f64 {
        let len = u64::try_from(self.luminosity_series.len()).unwrap_or(u64::MAX).max(1);
        let index = usize::try_from(age.checked_rem(len).unwrap_or(0)).unwrap_or(0);
        self.luminosity_series.get(index).copied().unwrap_or(0.0)
    }

    /// Record a detection of the history row `history_index` with detector
    /// noise `noise`.
    ///
    /// A row already carrying a detection is not recorded twice; the call
    /// returns `Ok(false)` in that case.
    ///
    /// # Errors
    ///
    /// Returns [`SurveyError::ReplayOutOfRange`] if the row does not exist.
    pub fn record_detection(&mut self, history_index: usize, noise: f64) -> Result<bool, SurveyError> {
        let row = self
            .history
            .get(history_index)
            .ok_or(SurveyError::ReplayOutOfRange {
                event: self.id,
                history_index,
                len: self.history.len(),
            })?;
        if self.detections.iter().any(|d| d.history_index == history_index) {
            return Ok(false);
        }
        self.detections.push(DetectionRecord {
            time: row.time,
            history_index,
            luminosity: row.luminosity,
            noise,
        });
        Ok(true)
    }

    /// Reset detection history and the holistic flag.
    pub fn clear_detection_history(&mut self) {
        self.detections.clear();
        self.holistic_detection = false;
    }

    /// Set the holistic classification.
    pub const fn set_holistic_detection(&mut self, detected: bool) {
        self.holistic_detection = detected;
    }

    /// Replace detection state wholesale (used to roll back a failed
    /// re-detection).
    pub(crate) fn restore_detections(&mut self, detections: Vec<DetectionRecord>, holistic: bool) {
        self.detections = detections;
        self.holistic_detection = holistic;
    }

    /// Event identity.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Class label.
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    /// Birth frame.
    pub const fn birth_frame(&self) -> u64 {
        self.birth_frame
    }

    /// Last frame the event lived through.
    pub const fn current_time(&self) -> u64 {
        self.current_time
    }

    /// Frames since birth at the current time.
    pub const fn age(&self) -> u64 {
        self.current_time.saturating_sub(self.birth_frame)
    }

    /// Current `(x, y)` position.
    pub const fn position(&self) -> (f64, f64) {
        self.position
    }

    /// `(xdot, ydot)` velocity.
    pub const fn velocity(&self) -> (f64, f64) {
        self.velocity
    }

    /// Lifetime in frames.
    pub const fn lifetime(&self) -> f64 {
        self.lifetime
    }

    /// Current luminosity.
    pub const fn luminosity(&self) -> f64 {
        self.luminosity
    }

    /// Luminosity series.
    pub fn luminosity_series(&self) -> &[f64] {
        &self.luminosity_series
    }

    /// Full position/luminosity history, one row per frame lived.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Detection history.
    pub fn detections(&self) -> &[DetectionRecord] {
        &self.detections
    }

    /// Whether the event has died.
    pub const fn is_dead(&self) -> bool {
        self.marked_for_death
    }

    /// Lifecycle state.
    pub const fn state(&self) -> EventState {
        if self.marked_for_death {
            EventState::Dead
        } else {
            EventState::Alive
        }
    }

    /// Result of the last holistic classification.
    pub const fn holistic_detection(&self) -> bool {
        self.holistic_detection
    }

    /// Serializable copy of the event.
    pub fn snapshot(&self) -> EventSnapshot {
        EventSnapshot {
            id: self.id,
            class_id: self.class_id.clone(),
            birth_frame: self.birth_frame,
            lifetime: self.lifetime,
            state: self.state(),
            holistic_detection: self.holistic_detection,
            history: self.history.clone(),
            detections: self.detections.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn spec(lifetime: f64, series: Vec<f64>) -> EventSpec {
        EventSpec {
            class_id: String::from("test"),
            birth_frame: 0,
            position: (5.0, 5.0),
            velocity: (1.0, -0.5),
            lifetime,
            luminosity_series: series,
            noise: EventNoise::silent(),
        }
    }

    #[test]
    fn event_dies_after_lifetime_and_freezes() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut event = TransientEvent::new(spec(3.0, vec![1.0]), &mut rng).unwrap();

        for _ in 0..3 {
            assert!(event.advance(&mut rng).unwrap().is_some());
        }
        assert!(!event.is_dead());
        assert!(event.advance(&mut rng).unwrap().is_none());
        assert!(event.is_dead());
        assert_eq!(event.state(), EventState::Dead);

        // History covers frames 0-3 and stays fixed once dead.
        let times: Vec<u64> = event.history().iter().map(|h| h.time).collect();
        assert_eq!(times, vec![0, 1, 2, 3]);
        let frozen = event.position();
        for _ in 0..5 {
            assert!(event.advance(&mut rng).unwrap().is_none());
        }
        assert_eq!(event.history().len(), 4);
        assert_eq!(event.position(), frozen);
        assert_eq!(event.current_time(), 3);
    }

    #[test]
    fn advance_applies_velocity() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut event = TransientEvent::new(spec(10.0, vec![1.0]), &mut rng).unwrap();
        let _ = event.advance(&mut rng).unwrap();
        let _ = event.advance(&mut rng).unwrap();
        let (x, y) = event.position();
        assert!((x - 7.0).abs() < 1e-12);
        assert!((y - 4.0).abs() < 1e-12);
        let last = event.history().last().unwrap();
        assert!((last.xdot - 1.0).abs() < 1e-12);
        assert_eq!(last.time, 2);
    }

    #[test]
    fn luminosity_cycles_through_series() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut event = TransientEvent::new(spec(10.0, vec![1.0, 0.5, 0.25]), &mut rng).unwrap();
        assert!((event.luminosity() - 1.0).abs() < 1e-12);
        let mut seen = Vec::new();
        for _ in 0..4 {
            let _ = event.advance(&mut rng).unwrap();
            seen.push(event.luminosity());
        }
        // Ages 1, 2, 3, 4 map to series indices 1, 2, 0, 1.
        assert_eq!(seen, vec![0.5, 0.25, 1.0, 0.5]);
    }

    #[test]
    fn initial_luminosity_uses_noise_contract() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut s = spec(5.0, vec![2.0]);
        s.noise = EventNoise::new(
            "offset",
            event_noise_fn(|lum, _, _, args, _| Ok(lum * args.get(0, "scale")?)),
            ExtraArgs::new(vec![0.5]),
        );
        let event = TransientEvent::new(s, &mut rng).unwrap();
        assert!((event.luminosity() - 3.0).abs() < 1e-12);
        assert!((event.history().first().unwrap().luminosity - 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_series_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(1);
        let result = TransientEvent::new(spec(5.0, Vec::new()), &mut rng);
        assert!(matches!(result, Err(SurveyError::EmptyLuminositySeries)));
    }

    #[test]
    fn detection_does_not_touch_core_history() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut event = TransientEvent::new(spec(5.0, vec![1.0]), &mut rng).unwrap();
        let idx = event.advance(&mut rng).unwrap().unwrap();
        let before = event.history().to_vec();

        assert!(event.record_detection(idx, 0.1).unwrap());
        assert!(!event.record_detection(idx, 0.7).unwrap());
        assert_eq!(event.detections().len(), 1);
        assert_eq!(event.history(), before.as_slice());

        let d = event.detections().first().unwrap();
        assert_eq!(d.time, 1);
        assert!((d.noise - 0.1).abs() < 1e-12);

        assert!(matches!(
            event.record_detection(99, 0.0),
            Err(SurveyError::ReplayOutOfRange { history_index: 99, .. })
        ));
    }

    #[test]
    fn clearing_resets_detections_and_flag() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut event = TransientEvent::new(spec(5.0, vec![1.0]), &mut rng).unwrap();
        let _ = event.record_detection(0, 0.0).unwrap();
        event.set_holistic_detection(true);
        event.clear_detection_history();
        assert!(event.detections().is_empty());
        assert!(!event.holistic_detection());
    }
}
