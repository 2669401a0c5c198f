//! Survey orchestration: the per-frame advance loop, the replay log, and
//! the re-detection and re-run paths.
//!
//! Each [`Survey::advance`] runs three phases:
//!
//! 1. **Age** -- advance every living event one frame and record an
//!    `(event, history index)` entry for each survivor in this frame's slot
//!    of the replay log.
//! 2. **Detect** -- run the observing profile on that slot. Skipped on the
//!    first advance, which has no prior events.
//! 3. **Generate** -- spawn and append the events born in this frame. They
//!    first become eligible for detection in the following frame.
//!
//! Events live in an arena with stable indices and are never removed except
//! by [`Survey::reset_survey`]. The replay log always holds one slot per
//! elapsed frame, so a profile change only needs a re-detection pass over
//! the stored slots, while a generator change needs a full re-run.

use std::mem;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use transient_types::{
    DetectionRecord, Extent, FrameEntry, FramePoint, HistoryEntry, Measurement, SurveyShape,
};

use crate::callback::{CallbackResult, ExtraArgs};
use crate::error::{CallbackError, SurveyError};
use crate::event::TransientEvent;
use crate::generator::TransientGenerator;
use crate::profile::{ObservingProfile, ProfileArgs};

// ---------------------------------------------------------------------------
// Survey state
// ---------------------------------------------------------------------------

/// Everything the callbacks may inspect: shape, clock, event arena and
/// replay log.
#[derive(Debug, Clone)]
pub struct SurveyState {
    shape: SurveyShape,
    current_frame: Option<u64>,
    events: Vec<TransientEvent>,
    alive: Vec<usize>,
    frames: Vec<Vec<FrameEntry>>,
}

impl SurveyState {
    /// An empty survey state before the first frame.
    pub const fn new(shape: SurveyShape) -> Self {
        Self {
            shape,
            current_frame: None,
            events: Vec::new(),
            alive: Vec::new(),
            frames: Vec::new(),
        }
    }

    /// Survey shape.
    pub const fn shape(&self) -> SurveyShape {
        self.shape
    }

    /// Most recent frame, or `None` before the first advance.
    pub const fn current_frame(&self) -> Option<u64> {
        self.current_frame
    }

    /// Frame counter with `-1` meaning no frame has elapsed yet.
    #[allow(clippy::cast_possible_wrap)]
    pub const fn absolute_time(&self) -> i64 {
        match self.current_frame {
            // Frame counts never approach i64::MAX.
            Some(frame) => frame as i64,
            None => -1,
        }
    }

    /// Every event ever generated since the last reset, alive or dead.
    pub fn events(&self) -> &[TransientEvent] {
        &self.events
    }

    /// Event at an arena index.
    pub fn event(&self, index: usize) -> Option<&TransientEvent> {
        self.events.get(index)
    }

    pub(crate) fn event_mut(&mut self, index: usize) -> Option<&mut TransientEvent> {
        self.events.get_mut(index)
    }

    pub(crate) fn events_mut(&mut self) -> &mut [TransientEvent] {
        &mut self.events
    }

    pub(crate) fn push_event(&mut self, event: TransientEvent) {
        let index = self.events.len();
        let dead = event.is_dead();
        self.events.push(event);
        if !dead {
            self.alive.push(index);
        }
    }

    /// Arena indices of events still alive.
    pub fn alive(&self) -> &[usize] {
        &self.alive
    }

    /// The replay log: one slot per elapsed frame.
    pub fn frames(&self) -> &[Vec<FrameEntry>] {
        &self.frames
    }

    /// Replay-log slot of one frame.
    pub fn frame(&self, frame: u64) -> Result<&[FrameEntry], SurveyError> {
        usize::try_from(frame)
            .ok()
            .and_then(|index| self.frames.get(index))
            .map(Vec::as_slice)
            .ok_or(SurveyError::FrameOutOfRange {
                frame,
                frames: self.frames.len(),
            })
    }

    /// Resolve a replay-log entry to its event and history row.
    pub fn resolve(&self, entry: FrameEntry) -> CallbackResult<(&TransientEvent, &HistoryEntry)> {
        let event = self
            .events
            .get(entry.event_index)
            .ok_or(CallbackError::UnknownEvent(entry.event_index))?;
        let row = event.history().get(entry.history_index).ok_or_else(|| {
            CallbackError::Failed(format!(
                "history index {} out of range for event {}",
                entry.history_index,
                event.id()
            ))
        })?;
        Ok((event, row))
    }

    fn lookup(&self, entry: FrameEntry) -> Option<(&TransientEvent, &HistoryEntry)> {
        let event = self.events.get(entry.event_index)?;
        event.history().get(entry.history_index).map(|row| (event, row))
    }

    /// Total number of per-frame detection records across all events.
    pub fn detection_count(&self) -> usize {
        self.events
            .iter()
            .map(|e| e.detections().len())
            .fold(0, usize::saturating_add)
    }

    /// Number of events currently classified as holistically detected.
    pub fn holistic_count(&self) -> usize {
        self.events.iter().filter(|e| e.holistic_detection()).count()
    }

    fn clear(&mut self) {
        self.current_frame = None;
        self.events.clear();
        self.alive.clear();
        self.frames.clear();
    }

    fn backup_detections(&self) -> Vec<(Vec<DetectionRecord>, bool)> {
        self.events
            .iter()
            .map(|e| (e.detections().to_vec(), e.holistic_detection()))
            .collect()
    }

    fn restore_detections(&mut self, backup: Vec<(Vec<DetectionRecord>, bool)>) {
        for (event, (detections, holistic)) in self.events.iter_mut().zip(backup) {
            event.restore_detections(detections, holistic);
        }
    }
}

// ---------------------------------------------------------------------------
// Survey
// ---------------------------------------------------------------------------

/// A simulated survey: state plus the generator, observing profile and
/// random source that drive it.
#[derive(Debug, Clone)]
pub struct Survey {
    state: SurveyState,
    generator: TransientGenerator,
    profile: ObservingProfile,
    rng: StdRng,
    seed: u64,
}

impl Survey {
    /// Create an empty survey seeded with `seed`.
    pub fn new(generator: TransientGenerator, profile: ObservingProfile, seed: u64) -> Self {
        Self {
            state: SurveyState::new(generator.shape()),
            generator,
            profile,
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Read-only view of the survey state.
    pub const fn state(&self) -> &SurveyState {
        &self.state
    }

    /// The generator.
    pub const fn generator(&self) -> &TransientGenerator {
        &self.generator
    }

    /// The observing profile.
    pub const fn profile(&self) -> &ObservingProfile {
        &self.profile
    }

    /// Seed the random source was last seeded with.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Survey shape.
    pub const fn shape(&self) -> SurveyShape {
        self.state.shape
    }

    /// Frame counter, `-1` before the first advance.
    pub const fn absolute_time(&self) -> i64 {
        self.state.absolute_time()
    }

    /// Every event since the last reset.
    pub fn events(&self) -> &[TransientEvent] {
        &self.state.events
    }

    /// Restart the random source from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    /// Advance one frame: age events, detect on this frame's slot, then
    /// generate new events. Returns the new frame number.
    pub fn advance(&mut self) -> Result<u64, SurveyError> {
        let frame = match self.state.current_frame {
            None => 0,
            Some(previous) => previous.checked_add(1).ok_or(SurveyError::FrameOverflow)?,
        };

        let mut slot = Vec::with_capacity(self.state.alive.len());
        let mut survivors = Vec::with_capacity(self.state.alive.len());
        for &index in &self.state.alive {
            let Some(event) = self.state.events.get_mut(index) else {
                continue;
            };
            if let Some(history_index) = event.advance(&mut self.rng)? {
                slot.push(FrameEntry {
                    event_index: index,
                    history_index,
                });
                survivors.push(index);
            }
        }
        let aged = slot.len();
        self.state.alive = survivors;
        self.state.frames.push(slot);
        self.state.current_frame = Some(frame);

        let detected = if frame > 0 {
            self.detect_frame(frame)?
        } else {
            0
        };

        let born = self.generator.generate(frame, &self.state, &mut self.rng)?;
        let born_count = born.len();
        for event in born {
            self.state.push_event(event);
        }

        debug!(frame, aged, detected, born = born_count, "frame advanced");
        Ok(frame)
    }

    fn detect_frame(&mut self, frame: u64) -> Result<usize, SurveyError> {
        let entries = self.state.frame(frame)?.to_vec();
        self.profile
            .frame_detect(frame, &entries, &mut self.state, &mut self.rng)
    }

    /// Clear every event and the replay log; the clock returns to `-1`.
    pub fn reset_survey(&mut self) {
        self.state.clear();
        debug!("survey reset");
    }

    /// Clear all detection state, replay the per-frame pipeline over every
    /// stored slot in order, then classify every event once.
    pub fn re_detect_events(&mut self) -> Result<(), SurveyError> {
        for event in &mut self.state.events {
            event.clear_detection_history();
        }
        let mut detected = 0_usize;
        if let Some(current) = self.state.current_frame {
            for frame in 1..=current {
                detected = detected.saturating_add(self.detect_frame(frame)?);
            }
        }
        let holistic = self.holistic_detect()?;
        debug!(detected, holistic, "events re-detected");
        Ok(())
    }

    /// Run the holistic classifier over every event.
    pub fn holistic_detect(&mut self) -> Result<usize, SurveyError> {
        self.profile.holistic_detect(&mut self.state)
    }

    /// Swap the observing profile and re-detect.
    ///
    /// On failure the old profile and every event's detection state are
    /// restored before the error is returned.
    pub fn set_observing_profile(&mut self, profile: ObservingProfile) -> Result<(), SurveyError> {
        let previous = mem::replace(&mut self.profile, profile);
        let backup = self.state.backup_detections();
        if let Err(err) = self.re_detect_events() {
            self.profile = previous;
            self.state.restore_detections(backup);
            return Err(err);
        }
        Ok(())
    }

    /// Replace the profile's stage arguments and re-detect, atomically.
    pub fn set_observing_profile_args(&mut self, args: ProfileArgs) -> Result<(), SurveyError> {
        let mut profile = self.profile.clone();
        profile.set_args(args)?;
        self.set_observing_profile(profile)
    }

    /// Replace the profile's stage arguments from one flat vector and
    /// re-detect, atomically.
    pub fn set_observing_profile_args_flat(&mut self, flat: &[f64]) -> Result<(), SurveyError> {
        let args = self.profile.split_args(flat)?;
        self.set_observing_profile_args(args)
    }

    /// Swap the generator. Takes effect for frames generated afterwards;
    /// call [`Survey::re_run_survey`] to regenerate history.
    pub fn set_generator(&mut self, generator: TransientGenerator) {
        self.generator = generator;
    }

    /// Replace the generator functions' arguments.
    pub fn set_generator_args(&mut self, args: Vec<ExtraArgs>) -> Result<(), SurveyError> {
        self.generator.set_args(args)
    }

    /// Replace the generator functions' arguments from one flat vector.
    pub fn set_generator_args_flat(&mut self, flat: &[f64]) -> Result<(), SurveyError> {
        self.generator.set_args_flat(flat)
    }

    /// Reset, advance `time` frames, then classify every event.
    pub fn re_run_survey(&mut self, time: u64) -> Result<(), SurveyError> {
        self.reset_survey();
        for _ in 0..time {
            self.advance()?;
        }
        let holistic = self.holistic_detect()?;
        info!(
            frames = time,
            events = self.state.events.len(),
            detections = self.state.detection_count(),
            holistic,
            "survey re-run"
        );
        Ok(())
    }

    /// Reseed, then [`Survey::re_run_survey`]. Two calls with the same seed
    /// and arguments produce identical surveys.
    pub fn re_run_with_seed(&mut self, seed: u64, time: u64) -> Result<(), SurveyError> {
        self.reseed(seed);
        self.re_run_survey(time)
    }

    /// Apply new profile and generator arguments together, then re-run.
    ///
    /// Both vectors are validated before either is applied.
    pub fn reconfigure_and_rerun(
        &mut self,
        profile_flat: &[f64],
        generator_flat: &[f64],
        time: u64,
    ) -> Result<(), SurveyError> {
        let profile_args = self.profile.split_args(profile_flat)?;
        let generator_args = self.generator.split_args(generator_flat)?;
        let mut profile = self.profile.clone();
        profile.set_args(profile_args)?;
        let mut generator = self.generator.clone();
        generator.set_args(generator_args)?;
        self.profile = profile;
        self.generator = generator;
        self.re_run_survey(time)
    }

    /// Run the profile's measurement extractor over every event.
    pub fn measure(&self) -> Result<Measurement, SurveyError> {
        self.profile.measure(&self.state.events, &self.state)
    }

    /// Positions and luminosities of the events present in `frame` that
    /// fall inside `extent`. Includes events born in that frame.
    pub fn frame_points(&self, frame: u64, extent: &Extent) -> Result<Vec<FramePoint>, SurveyError> {
        let slot = self.state.frame(frame)?;
        let mut points = Vec::with_capacity(slot.len());
        for &entry in slot {
            if let Some((event, row)) = self.state.lookup(entry) {
                points.push(point(event, row));
            }
        }
        let newborn = self
            .state
            .events
            .iter()
            .filter(|e| e.birth_frame() == frame)
            .filter_map(|e| e.history().first().map(|row| point(e, row)));
        points.extend(newborn);
        points.retain(|p| extent.contains(p.x, p.y));
        Ok(points)
    }
}

fn point(event: &TransientEvent, row: &HistoryEntry) -> FramePoint {
    FramePoint {
        event: event.id(),
        x: row.x,
        y: row.y,
        luminosity: row.luminosity,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use transient_types::Characteristic;

    use super::*;
    use crate::callback::CallbackSlot;
    use crate::event::EventNoise;
    use crate::library;
    use crate::profile::MeasurementSlot;

    fn survey(obstruction: &str, probability: f64) -> Survey {
        let shape = SurveyShape::new(10, 10);
        let generator = TransientGenerator::new(
            shape,
            vec![
                CallbackSlot::new(
                    "uniform",
                    library::uniform_generator(EventNoise::silent()),
                    ExtraArgs::new(vec![probability, 4.0, 1.0, 0.5]),
                )
                .with_bias(vec![
                    Characteristic::float(0.0, 0.1),
                    Characteristic::float(1.0, 8.0),
                    Characteristic::float(0.0, 2.0),
                    Characteristic::float(0.0, 1.0),
                ]),
            ],
        )
        .unwrap();
        let obstruction = match obstruction {
            "reject_all" => CallbackSlot::new("reject_all", library::reject_all(), ExtraArgs::none()),
            _ => CallbackSlot::new("pass_all", library::pass_all(), ExtraArgs::none()),
        };
        let profile = ObservingProfile::new(
            CallbackSlot::new("identity", library::identity_view(), ExtraArgs::none()),
            obstruction,
            CallbackSlot::new("detected_once", library::detected_once(), ExtraArgs::none()),
            CallbackSlot::new("none", library::silent_survey_noise(), ExtraArgs::none()),
            MeasurementSlot::new("lifetime", library::lifetime_measurement()),
        )
        .unwrap();
        Survey::new(generator, profile, 42)
    }

    #[test]
    fn clock_starts_before_frame_zero() {
        let mut s = survey("pass_all", 0.1);
        assert_eq!(s.absolute_time(), -1);
        assert_eq!(s.advance().unwrap(), 0);
        assert_eq!(s.absolute_time(), 0);
        assert_eq!(s.state().frames().len(), 1);
        assert!(s.state().frames().first().unwrap().is_empty());
    }

    #[test]
    fn replay_log_tracks_clock() {
        let mut s = survey("pass_all", 0.1);
        for _ in 0..12 {
            let _ = s.advance().unwrap();
            let expected = usize::try_from(s.absolute_time() + 1).unwrap();
            assert_eq!(s.state().frames().len(), expected);
        }
    }

    #[test]
    fn newborn_events_skip_their_birth_frame() {
        let mut s = survey("pass_all", 0.1);
        let _ = s.advance().unwrap();
        assert!(!s.events().is_empty());
        assert_eq!(s.state().detection_count(), 0);
        let _ = s.advance().unwrap();
        assert!(
            s.events()
                .iter()
                .flat_map(TransientEvent::detections)
                .all(|d| d.time == 1)
        );
    }

    #[test]
    fn re_detection_reproduces_detections() {
        let mut s = survey("pass_all", 0.1);
        for _ in 0..8 {
            let _ = s.advance().unwrap();
        }
        let _ = s.holistic_detect().unwrap();
        let before = s.state().detection_count();
        let holistic = s.state().holistic_count();
        s.re_detect_events().unwrap();
        assert_eq!(s.state().detection_count(), before);
        assert_eq!(s.state().holistic_count(), holistic);
    }

    #[test]
    fn profile_swap_re_detects_without_resimulating() {
        let mut s = survey("pass_all", 0.1);
        s.re_run_survey(8).unwrap();
        let histories: Vec<usize> = s.events().iter().map(|e| e.history().len()).collect();
        assert!(s.state().detection_count() > 0);

        let blind = survey("reject_all", 0.1).profile().clone();
        s.set_observing_profile(blind).unwrap();
        assert_eq!(s.state().detection_count(), 0);
        assert_eq!(s.state().holistic_count(), 0);
        let after: Vec<usize> = s.events().iter().map(|e| e.history().len()).collect();
        assert_eq!(histories, after);
    }

    #[test]
    fn failed_profile_args_leave_survey_untouched() {
        let mut s = survey("pass_all", 0.1);
        s.re_run_survey(6).unwrap();
        let before = s.state().detection_count();
        let result = s.set_observing_profile_args_flat(&[1.0]);
        assert!(result.is_err());
        assert_eq!(s.state().detection_count(), before);
    }

    #[test]
    fn re_run_with_same_seed_is_reproducible() {
        let mut s = survey("pass_all", 0.1);
        s.re_run_with_seed(9, 10).unwrap();
        let first: Vec<_> = s.events().iter().map(TransientEvent::snapshot).collect();
        s.re_run_with_seed(9, 10).unwrap();
        let second: Vec<_> = s.events().iter().map(TransientEvent::snapshot).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn reset_clears_everything() {
        let mut s = survey("pass_all", 0.1);
        s.re_run_survey(5).unwrap();
        s.reset_survey();
        assert_eq!(s.absolute_time(), -1);
        assert!(s.events().is_empty());
        assert!(s.state().frames().is_empty());
        assert!(s.state().alive().is_empty());
    }

    #[test]
    fn frame_points_respect_extent() {
        let mut s = survey("pass_all", 0.1);
        s.re_run_survey(4).unwrap();
        let all = s.frame_points(2, &Extent::of_shape(s.shape())).unwrap();
        let half = Extent {
            x_min: 0.0,
            x_max: 5.0,
            y_min: 0.0,
            y_max: 10.0,
        };
        let some = s.frame_points(2, &half).unwrap();
        assert!(some.len() <= all.len());
        assert!(some.iter().all(|p| p.x < 5.0));
        assert!(matches!(
            s.frame_points(9, &half),
            Err(SurveyError::FrameOutOfRange { frame: 9, .. })
        ));
    }
}
