//! Built-in callbacks for every pipeline role.
//!
//! These are the implementations [`CallbackRegistry::with_builtins`]
//! registers. Each constructor returns a shared closure; the extra
//! arguments each one reads are listed in its doc comment in order.
//!
//! [`CallbackRegistry::with_builtins`]: crate::registry::CallbackRegistry::with_builtins

use rand::{Rng, RngCore};
use rand_distr::{Bernoulli, Binomial, Distribution, Normal, StandardNormal};
use transient_types::{FrameEntry, Measurement, ParameterSample};

use crate::callback::{
    CallbackResult, EventNoiseFn, FilterFn, GeneratorFn, HolisticFn, MeasurementFn,
    SurveyNoiseFn, event_noise_fn, filter_fn, generator_fn, holistic_fn, measurement_fn,
    survey_noise_fn,
};
use crate::error::{CallbackError, SurveyError};
use crate::event::{EventNoise, EventSpec, TransientEvent};
use crate::rates::RateMap;
use crate::survey::SurveyState;

fn failed(err: &SurveyError) -> CallbackError {
    CallbackError::Failed(err.to_string())
}

fn normal(mean: f64, std: f64) -> CallbackResult<Normal<f64>> {
    Normal::new(mean, std).map_err(|e| CallbackError::InvalidArgument {
        name: "std",
        value: std,
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Random projected direction of an isotropic 3D unit vector, as `(x, y)`.
///
/// The sky-plane components are taken from the unit vector in `(y, x)`
/// order, matching the matrix convention of survey positions.
pub fn isotropic_velocity(rng: &mut dyn RngCore) -> (f64, f64) {
    let x: f64 = StandardNormal.sample(rng);
    let y: f64 = StandardNormal.sample(rng);
    let z: f64 = StandardNormal.sample(rng);
    let magnitude = z.mul_add(z, x.mul_add(x, y * y)).sqrt();
    if magnitude <= f64::EPSILON {
        return (0.0, 0.0);
    }
    (y / magnitude, x / magnitude)
}

/// A stationary, constant-luminosity event with no luminosity noise.
pub fn still_event(
    frame: u64,
    position: (f64, f64),
    lifetime: f64,
    rng: &mut dyn RngCore,
) -> Result<TransientEvent, SurveyError> {
    TransientEvent::new(
        EventSpec {
            class_id: String::from("single"),
            birth_frame: frame,
            position,
            velocity: (0.0, 0.0),
            lifetime,
            luminosity_series: vec![1.0],
            noise: EventNoise::silent(),
        },
        rng,
    )
}

/// Uniform spawning over every pixel.
///
/// Extra args: `[spawn_probability, lifetime_mean, lifetime_std, speed]`.
/// The number of births per frame is `Binomial(pixels, spawn_probability)`;
/// each event starts on a uniformly chosen pixel with a normally
/// distributed lifetime (floored at zero), an isotropic projected velocity
/// scaled by `speed`, and unit luminosity perturbed by `noise`.
pub fn uniform_generator(noise: EventNoise) -> GeneratorFn {
    generator_fn(move |frame, shape, _, args, rng| {
        let probability = args.probability(0, "spawn_probability")?;
        let lifetime = normal(
            args.get(1, "lifetime_mean")?,
            args.non_negative(2, "lifetime_std")?,
        )?;
        let speed = args.non_negative(3, "speed")?;
        let count = Binomial::new(shape.pixels(), probability)
            .map_err(|e| CallbackError::InvalidArgument {
                name: "spawn_probability",
                value: probability,
                reason: e.to_string(),
            })?
            .sample(rng);

        let mut born = Vec::new();
        for _ in 0..count {
            let x = f64::from(rng.random_range(0..shape.rows));
            let y = f64::from(rng.random_range(0..shape.cols));
            let (vx, vy) = isotropic_velocity(rng);
            let event = TransientEvent::new(
                EventSpec {
                    class_id: String::from("uniform"),
                    birth_frame: frame,
                    position: (x, y),
                    velocity: (vx * speed, vy * speed),
                    lifetime: lifetime.sample(rng).max(0.0),
                    luminosity_series: vec![1.0],
                    noise: noise.clone(),
                },
                rng,
            )
            .map_err(|e| failed(&e))?;
            born.push(event);
        }
        Ok(born)
    })
}

/// Spawning from a per-pixel probability grid.
///
/// Extra args: `[lifetime_mean, lifetime_std, speed]`. Each pixel of the
/// frame's grid in `rates` runs one Bernoulli trial; a success spawns an
/// event on that pixel with the same lifetime, velocity and luminosity
/// rules as [`uniform_generator`]. A per-frame map fails on frames past its
/// last grid.
pub fn rate_map_generator(rates: RateMap, noise: EventNoise) -> GeneratorFn {
    generator_fn(move |frame, _, _, args, rng| {
        let lifetime = normal(
            args.get(0, "lifetime_mean")?,
            args.non_negative(1, "lifetime_std")?,
        )?;
        let speed = args.non_negative(2, "speed")?;

        let mut born = Vec::new();
        for (row, probabilities) in rates.grid(frame)?.iter().enumerate() {
            for (col, &probability) in probabilities.iter().enumerate() {
                let spawn = Bernoulli::new(probability)
                    .map_err(|e| CallbackError::InvalidArgument {
                        name: "rate",
                        value: probability,
                        reason: e.to_string(),
                    })?
                    .sample(rng);
                if !spawn {
                    continue;
                }
                let (vx, vy) = isotropic_velocity(rng);
                let event = TransientEvent::new(
                    EventSpec {
                        class_id: String::from("rate_map"),
                        birth_frame: frame,
                        position: (row as f64, col as f64),
                        velocity: (vx * speed, vy * speed),
                        lifetime: lifetime.sample(rng).max(0.0),
                        luminosity_series: vec![1.0],
                        noise: noise.clone(),
                    },
                    rng,
                )
                .map_err(|e| failed(&e))?;
                born.push(event);
            }
        }
        Ok(born)
    })
}

/// One event at a fixed frame and position.
///
/// Extra args: `[frame, x, y, lifetime]`. Produces nothing on other frames.
pub fn single_generator(noise: EventNoise) -> GeneratorFn {
    generator_fn(move |frame, _, _, args, rng| {
        if frame != args.count(0, "frame")? {
            return Ok(Vec::new());
        }
        let event = TransientEvent::new(
            EventSpec {
                class_id: String::from("single"),
                birth_frame: frame,
                position: (args.get(1, "x")?, args.get(2, "y")?),
                velocity: (0.0, 0.0),
                lifetime: args.non_negative(3, "lifetime")?,
                luminosity_series: vec![1.0],
                noise: noise.clone(),
            },
            rng,
        )
        .map_err(|e| failed(&e))?;
        Ok(vec![event])
    })
}

// ---------------------------------------------------------------------------
// Event noise
// ---------------------------------------------------------------------------

/// No luminosity noise.
pub fn silent_event_noise() -> EventNoiseFn {
    event_noise_fn(|_, _, _, _, _| Ok(0.0))
}

/// Gaussian luminosity noise. Extra args: `[mean, std]`.
pub fn gauss_event_noise() -> EventNoiseFn {
    event_noise_fn(|_, _, _, args, rng| {
        let dist = normal(args.get(0, "mean")?, args.non_negative(1, "std")?)?;
        Ok(dist.sample(rng))
    })
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

fn keep_where<P>(entries: &[FrameEntry], state: &SurveyState, mut keep: P) -> CallbackResult<Vec<FrameEntry>>
where
    P: FnMut(f64, f64, f64) -> bool,
{
    let mut passed = Vec::with_capacity(entries.len());
    for &entry in entries {
        let (_, row) = state.resolve(entry)?;
        if keep(row.x, row.y, row.luminosity) {
            passed.push(entry);
        }
    }
    Ok(passed)
}

/// Sees the whole field.
pub fn identity_view() -> FilterFn {
    filter_fn(|_, entries, _, _, _| Ok(entries.to_vec()))
}

/// Circular field of view. Extra args: `[center_x, center_y, radius]`.
pub fn circle_view() -> FilterFn {
    filter_fn(|_, entries, state, args, _| {
        let cx = args.get(0, "center_x")?;
        let cy = args.get(1, "center_y")?;
        let radius = args.non_negative(2, "radius")?;
        keep_where(entries, state, |x, y, _| (x - cx).hypot(y - cy) <= radius)
    })
}

/// Rectangular field of view, half-open on the far edges.
/// Extra args: `[x, y, width, height]`.
pub fn rectangle_view() -> FilterFn {
    filter_fn(|_, entries, state, args, _| {
        let x0 = args.get(0, "x")?;
        let y0 = args.get(1, "y")?;
        let x1 = x0 + args.non_negative(2, "width")?;
        let y1 = y0 + args.non_negative(3, "height")?;
        keep_where(entries, state, |x, y, _| x >= x0 && x < x1 && y >= y0 && y < y1)
    })
}

// ---------------------------------------------------------------------------
// Obstructions
// ---------------------------------------------------------------------------

/// Passes everything.
pub fn pass_all() -> FilterFn {
    filter_fn(|_, entries, _, _, _| Ok(entries.to_vec()))
}

/// Passes nothing.
pub fn reject_all() -> FilterFn {
    filter_fn(|_, _, _, _, _| Ok(Vec::new()))
}

/// Passes each entry independently with a fixed probability.
/// Extra args: `[pass_fraction]`.
pub fn random_pass() -> FilterFn {
    filter_fn(|_, entries, _, args, rng| {
        let fraction = args.probability(0, "pass_fraction")?;
        Ok(entries
            .iter()
            .copied()
            .filter(|_| rng.random::<f64>() < fraction)
            .collect())
    })
}

/// Passes entries at least as bright as a threshold.
/// Extra args: `[min_luminosity]`.
pub fn brightness() -> FilterFn {
    filter_fn(|_, entries, state, args, _| {
        let min = args.get(0, "min_luminosity")?;
        keep_where(entries, state, |_, _, luminosity| luminosity >= min)
    })
}

// ---------------------------------------------------------------------------
// Holistic classifiers
// ---------------------------------------------------------------------------

/// Detected if seen in at least one frame.
pub fn detected_once() -> HolisticFn {
    holistic_fn(|event, _, _| Ok(!event.detections().is_empty()))
}

/// Detected if seen in at least `count` frames. Extra args: `[count]`.
pub fn detected_at_least() -> HolisticFn {
    holistic_fn(|event, _, args| {
        let count = args.count(0, "count")?;
        let seen = u64::try_from(event.detections().len()).unwrap_or(u64::MAX);
        Ok(seen >= count)
    })
}

// ---------------------------------------------------------------------------
// Survey noise
// ---------------------------------------------------------------------------

/// No detector noise.
pub fn silent_survey_noise() -> SurveyNoiseFn {
    survey_noise_fn(|_, _, _, _| Ok(0.0))
}

/// Gaussian detector noise. Extra args: `[mean, std]`.
pub fn gauss_survey_noise() -> SurveyNoiseFn {
    survey_noise_fn(|_, _, args, rng| {
        let dist = normal(args.get(0, "mean")?, args.non_negative(1, "std")?)?;
        Ok(dist.sample(rng))
    })
}

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

fn lifetimes(events: &[TransientEvent]) -> (ParameterSample, ParameterSample) {
    let truth = events.iter().map(TransientEvent::lifetime).collect();
    let observed = events
        .iter()
        .filter(|e| e.holistic_detection())
        .map(TransientEvent::lifetime)
        .collect();
    (
        ParameterSample::new("lifetime", truth),
        ParameterSample::new("lifetime", observed),
    )
}

/// Lifetimes of every event against lifetimes of detected events.
pub fn lifetime_measurement() -> MeasurementFn {
    measurement_fn(|events, _| {
        let (truth, observed) = lifetimes(events);
        Ok(Measurement {
            truth: vec![truth],
            observed: vec![observed],
        })
    })
}

/// Lifetimes plus peak luminosity. True peaks come from the full history;
/// observed peaks come from the noisy detection records of detected events.
pub fn lifetime_and_luminosity_measurement() -> MeasurementFn {
    measurement_fn(|events, _| {
        let (truth_life, observed_life) = lifetimes(events);
        let truth_peak = events
            .iter()
            .filter_map(|e| e.history().iter().map(|h| h.luminosity).reduce(f64::max))
            .collect();
        let observed_peak = events
            .iter()
            .filter(|e| e.holistic_detection())
            .filter_map(|e| {
                e.detections()
                    .iter()
                    .map(transient_types::DetectionRecord::observed_luminosity)
                    .reduce(f64::max)
            })
            .collect();
        Ok(Measurement {
            truth: vec![truth_life, ParameterSample::new("peak_luminosity", truth_peak)],
            observed: vec![
                observed_life,
                ParameterSample::new("peak_luminosity", observed_peak),
            ],
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use transient_types::SurveyShape;

    use super::*;
    use crate::callback::ExtraArgs;

    fn args(values: &[f64]) -> ExtraArgs {
        ExtraArgs::new(values.to_vec())
    }

    #[test]
    fn isotropic_velocity_is_sub_unit() {
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..200 {
            let (vx, vy) = isotropic_velocity(&mut rng);
            assert!(vx.hypot(vy) <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn uniform_generator_spawns_inside_field() {
        let shape = SurveyShape::new(20, 30);
        let state = SurveyState::new(shape);
        let generate = uniform_generator(EventNoise::silent());
        let mut rng = SmallRng::seed_from_u64(42);
        let born = generate(3, shape, &state, &args(&[0.1, 10.0, 2.0, 0.5]), &mut rng).unwrap();
        // 600 pixels at p = 0.1.
        assert!(born.len() > 30 && born.len() < 100, "spawned {}", born.len());
        for event in &born {
            let (x, y) = event.position();
            assert!(shape.contains(x, y));
            assert_eq!(event.birth_frame(), 3);
            let (vx, vy) = event.velocity();
            assert!(vx.hypot(vy) <= 0.5 + 1e-12);
        }
    }

    #[test]
    fn rate_map_spawns_only_where_probability_is_certain() {
        let shape = SurveyShape::new(2, 3);
        let state = SurveyState::new(shape);
        let rates = RateMap::Static(vec![vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]]);
        let generate = rate_map_generator(rates, EventNoise::silent());
        let mut rng = SmallRng::seed_from_u64(7);
        let born = generate(0, shape, &state, &args(&[5.0, 0.0, 0.0]), &mut rng).unwrap();
        let mut positions: Vec<(f64, f64)> = born.iter().map(TransientEvent::position).collect();
        positions.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(positions, vec![(0.0, 1.0), (1.0, 0.0)]);
        assert!(born.iter().all(|e| (e.lifetime() - 5.0).abs() < f64::EPSILON));
    }

    #[test]
    fn per_frame_rate_map_follows_the_frame() {
        let shape = SurveyShape::new(1, 2);
        let state = SurveyState::new(shape);
        let rates = RateMap::PerFrame(vec![vec![vec![1.0, 0.0]], vec![vec![0.0, 1.0]]]);
        let generate = rate_map_generator(rates, EventNoise::silent());
        let mut rng = SmallRng::seed_from_u64(7);
        let extra = args(&[3.0, 0.0, 0.0]);

        let first = generate(0, shape, &state, &extra, &mut rng).unwrap();
        let second = generate(1, shape, &state, &extra, &mut rng).unwrap();
        assert_eq!(first.iter().map(TransientEvent::position).collect::<Vec<_>>(), vec![(0.0, 0.0)]);
        assert_eq!(second.iter().map(TransientEvent::position).collect::<Vec<_>>(), vec![(0.0, 1.0)]);
        assert!(matches!(
            generate(2, shape, &state, &extra, &mut rng),
            Err(CallbackError::InvalidArgument { name: "frame", .. })
        ));
    }

    #[test]
    fn uniform_generator_rejects_bad_probability() {
        let shape = SurveyShape::new(4, 4);
        let state = SurveyState::new(shape);
        let generate = uniform_generator(EventNoise::silent());
        let mut rng = SmallRng::seed_from_u64(42);
        let result = generate(0, shape, &state, &args(&[1.5, 10.0, 2.0, 0.5]), &mut rng);
        assert!(matches!(
            result,
            Err(CallbackError::InvalidArgument {
                name: "spawn_probability",
                ..
            })
        ));
    }

    #[test]
    fn single_generator_fires_once() {
        let shape = SurveyShape::new(10, 10);
        let state = SurveyState::new(shape);
        let generate = single_generator(EventNoise::silent());
        let mut rng = SmallRng::seed_from_u64(42);
        let spec = args(&[2.0, 5.0, 5.0, 3.0]);
        assert!(generate(1, shape, &state, &spec, &mut rng).unwrap().is_empty());
        let born = generate(2, shape, &state, &spec, &mut rng).unwrap();
        assert_eq!(born.len(), 1);
        assert_eq!(born.first().unwrap().position(), (5.0, 5.0));
    }

    #[test]
    fn gauss_noise_rejects_negative_std() {
        let noise = gauss_event_noise();
        let mut rng = SmallRng::seed_from_u64(42);
        assert!(noise(1.0, (0.0, 0.0), 5.0, &args(&[0.0, -1.0]), &mut rng).is_err());
        assert!(noise(1.0, (0.0, 0.0), 5.0, &args(&[0.0, 0.0]), &mut rng).is_ok());
    }

    #[test]
    fn random_pass_extremes() {
        let state = SurveyState::new(SurveyShape::new(4, 4));
        let filter = random_pass();
        let mut rng = SmallRng::seed_from_u64(42);
        let entries: Vec<FrameEntry> = (0..50)
            .map(|event_index| FrameEntry {
                event_index,
                history_index: 0,
            })
            .collect();
        assert!(filter(0, &entries, &state, &args(&[0.0]), &mut rng).unwrap().is_empty());
        assert_eq!(filter(0, &entries, &state, &args(&[1.0]), &mut rng).unwrap().len(), 50);
    }

    #[test]
    fn rectangle_view_is_half_open() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut state = SurveyState::new(SurveyShape::new(10, 10));
        for position in [(2.0, 2.0), (4.0, 2.0), (3.9, 5.9)] {
            state.push_event(still_event(0, position, 5.0, &mut rng).unwrap());
        }
        let entries: Vec<FrameEntry> = (0..3)
            .map(|event_index| FrameEntry {
                event_index,
                history_index: 0,
            })
            .collect();
        let view = rectangle_view();
        let seen = view(0, &entries, &state, &args(&[2.0, 2.0, 2.0, 4.0]), &mut rng).unwrap();
        let indices: Vec<usize> = seen.iter().map(|e| e.event_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn detected_at_least_counts_frames() {
        let mut rng = SmallRng::seed_from_u64(42);
        let state = SurveyState::new(SurveyShape::new(10, 10));
        let mut event = still_event(0, (1.0, 1.0), 5.0, &mut rng).unwrap();
        let _ = event.advance(&mut rng).unwrap();
        let classify = detected_at_least();
        let _ = event.record_detection(0, 0.0).unwrap();
        assert!(!classify(&event, &state, &args(&[2.0])).unwrap());
        let _ = event.record_detection(1, 0.0).unwrap();
        assert!(classify(&event, &state, &args(&[2.0])).unwrap());
        assert!(detected_once()(&event, &state, &ExtraArgs::none()).unwrap());
    }
}
