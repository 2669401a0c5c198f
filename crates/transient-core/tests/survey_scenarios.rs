//! End-to-end survey scenarios built from YAML configuration and the
//! built-in callback registry.

#![allow(clippy::unwrap_used)]

use transient_core::config::CallbackConfig;
use transient_core::{CallbackRegistry, Survey, SurveyError, TransientConfig, TransientEvent};
use transient_types::{CallbackRole, EventState, Extent};

fn build(yaml: &str) -> Survey {
    let config = TransientConfig::parse(yaml).unwrap();
    CallbackRegistry::with_builtins().build_survey(&config).unwrap()
}

const SINGLE_EVENT: &str = r"
survey:
  rows: 10
  cols: 10
  seed: 1
generator:
  functions:
    - name: single
      args: [0, 5, 5, 3]
      bias:
        - { low: 0, high: 0, kind: int }
        - { low: 0, high: 10, kind: float }
        - { low: 0, high: 10, kind: float }
        - { low: 1, high: 10, kind: int }
profile:
  view: { name: identity }
  obstruction: { name: pass_all }
  holistic: { name: detected_once }
  noise: { name: none }
";

const BLIND: &str = r"
survey:
  rows: 16
  cols: 16
  seed: 3
generator:
  functions:
    - name: uniform
      args: [0.05, 6.0, 1.0, 0.5]
      bias:
        - { low: 0.0, high: 0.1, kind: float }
        - { low: 1.0, high: 10.0, kind: float }
        - { low: 0.0, high: 2.0, kind: float }
        - { low: 0.0, high: 1.0, kind: float }
profile:
  view: { name: identity }
  obstruction: { name: reject_all }
  holistic: { name: detected_once }
  noise: { name: none }
";

/// A lifetime-3 event is dead once it has aged four times. Survey-level
/// advances lag the event by one: generation runs at the end of frame 0,
/// so the event first ages on the second advance and dies on the fifth.
#[test]
fn single_event_dies_after_its_lifetime() {
    let mut survey = build(SINGLE_EVENT);

    // Frame 0 spawns the event; frames 1-3 age it.
    for _ in 0..4 {
        let _ = survey.advance().unwrap();
    }
    let event = survey.events().first().unwrap();
    assert_eq!(survey.events().len(), 1);
    assert_eq!(event.state(), EventState::Alive);
    assert_eq!(event.history().len(), 4);

    // The next advance pushes its age past the lifetime.
    let _ = survey.advance().unwrap();
    let event = survey.events().first().unwrap();
    assert_eq!(event.state(), EventState::Dead);
    let times: Vec<u64> = event.history().iter().map(|h| h.time).collect();
    assert_eq!(times, vec![0, 1, 2, 3]);
    assert_eq!(event.position(), (5.0, 5.0));

    // Dead events persist, frozen, and leave the replay log.
    for _ in 0..3 {
        let _ = survey.advance().unwrap();
    }
    assert_eq!(survey.events().first().unwrap().history().len(), 4);
    assert!(survey.state().frame(4).unwrap().is_empty());
    assert!(survey.state().alive().is_empty());
}

#[test]
fn single_event_is_detected_every_frame_after_birth() {
    let mut survey = build(SINGLE_EVENT);
    survey.re_run_survey(6).unwrap();
    let event = survey.events().first().unwrap();
    let frames: Vec<u64> = event.detections().iter().map(|d| d.time).collect();
    assert_eq!(frames, vec![1, 2, 3]);
    assert!(event.holistic_detection());

    let m = survey.measure().unwrap();
    assert_eq!(m.truth_for("lifetime").unwrap().values, vec![3.0]);
    assert_eq!(m.observed_for("lifetime").unwrap().values, vec![3.0]);
}

#[test]
fn reject_all_obstruction_detects_nothing() {
    let mut survey = build(BLIND);
    survey.re_run_survey(25).unwrap();
    assert!(!survey.events().is_empty());
    assert!(survey.events().iter().all(|e| e.detections().is_empty()));

    let _ = survey.holistic_detect().unwrap();
    assert!(survey.events().iter().all(|e| !e.holistic_detection()));
    assert!(survey.measure().unwrap().observed_for("lifetime").unwrap().values.is_empty());
}

#[test]
fn replay_log_matches_clock_and_histories() {
    let mut survey = build(BLIND);
    for _ in 0..30 {
        let _ = survey.advance().unwrap();
        let frames = survey.state().frames().len();
        assert_eq!(i64::try_from(frames).unwrap(), survey.absolute_time() + 1);
    }
    for (frame, slot) in survey.state().frames().iter().enumerate() {
        for entry in slot {
            let (_, row) = survey.state().resolve(*entry).unwrap();
            assert_eq!(row.time, u64::try_from(frame).unwrap());
        }
    }
}

#[test]
fn opening_the_obstruction_re_detects_without_resimulating() {
    let mut survey = build(BLIND);
    survey.re_run_survey(20).unwrap();
    let snapshot: Vec<_> = survey.events().iter().map(|e| e.history().to_vec()).collect();

    let registry = CallbackRegistry::with_builtins();
    let mut config = TransientConfig::parse(BLIND).unwrap().profile;
    config.obstruction = CallbackConfig::bare("pass_all");
    survey
        .set_observing_profile(registry.build_profile(&config).unwrap())
        .unwrap();

    assert!(survey.state().detection_count() > 0);
    assert!(survey.state().holistic_count() > 0);
    let after: Vec<_> = survey.events().iter().map(|e| e.history().to_vec()).collect();
    assert_eq!(snapshot, after);

    // Events born in the final frame were never eligible.
    let last = u64::try_from(survey.absolute_time()).unwrap();
    assert!(
        survey
            .events()
            .iter()
            .filter(|e| e.birth_frame() == last)
            .all(|e| e.detections().is_empty())
    );
}

#[test]
fn snapshots_serialize_to_json() {
    let mut survey = build(SINGLE_EVENT);
    survey.re_run_survey(3).unwrap();
    let snapshots: Vec<_> = survey.events().iter().map(TransientEvent::snapshot).collect();
    let json = serde_json::to_value(&snapshots).unwrap();
    let first = json.get(0).unwrap();
    assert_eq!(first.get("state").unwrap(), "alive");
    assert_eq!(first.get("history").unwrap().as_array().unwrap().len(), 3);
}

#[test]
fn frame_points_report_positions() {
    let mut survey = build(SINGLE_EVENT);
    survey.re_run_survey(3).unwrap();
    let extent = Extent::of_shape(survey.shape());
    let birth = survey.frame_points(0, &extent).unwrap();
    assert_eq!(birth.len(), 1);
    let later = survey.frame_points(2, &extent).unwrap();
    assert_eq!(later.len(), 1);
    assert_eq!((later.first().unwrap().x, later.first().unwrap().y), (5.0, 5.0));
}

const RATE_MAP: &str = r"
survey: { rows: 2, cols: 2, seed: 8 }
generator:
  functions:
    - name: rate_map
      args: [10.0, 0.0, 0.0]
      bias:
        - { low: 5.0, high: 15.0, kind: float }
        - { low: 0.0, high: 0.0, kind: float }
        - { low: 0.0, high: 0.0, kind: float }
      rates:
        - [[1.0, 0.0], [0.0, 0.0]]
        - [[0.0, 0.0], [0.0, 1.0]]
profile:
  view: { name: identity }
  obstruction: { name: pass_all }
  holistic: { name: detected_once }
  noise: { name: none }
";

#[test]
fn per_frame_rate_map_places_births() {
    let mut survey = build(RATE_MAP);
    let _ = survey.advance().unwrap();
    let _ = survey.advance().unwrap();

    let births: Vec<(u64, (f64, f64))> = survey
        .events()
        .iter()
        .map(|e| (e.birth_frame(), e.position()))
        .collect();
    assert_eq!(births, vec![(0, (0.0, 0.0)), (1, (1.0, 1.0))]);

    // The map covers two frames; the third has no grid.
    assert!(matches!(
        survey.advance(),
        Err(SurveyError::Callback {
            role: CallbackRole::Generator,
            ..
        })
    ));
}
