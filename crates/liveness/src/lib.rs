//! Liveness Signal Engine
//!
//! Turns a per-tick stream of face landmark observations into a latched
//! "live subject" verdict:
//! - Eye aspect ratio (EAR) and debounced blink counting
//! - Head movement between consecutive observations
//! - Dominant expression label (advisory only)
//!
//! Face localization and landmark regression happen upstream; the engine
//! only sees the geometry. It is synchronous and owns its state exclusively,
//! so callers serialize ticks and pass monotonic timestamps.

pub mod analysis;
pub mod config;
pub mod emotion;
pub mod landmarks;
pub mod observation;
pub mod state;

pub use analysis::{LivenessCue, LivenessSnapshot};
pub use config::{BlinkPolicy, LivenessConfig};
pub use emotion::{dominant_emotion, NO_EMOTION};
pub use landmarks::{Eye, EyeContour, Point2D};
pub use observation::{Expression, FaceObservation, FrameSample};
pub use state::{EngineState, EyeOpenness};

use crate::landmarks::average_aspect_ratio;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Liveness error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LivenessError {
    /// Malformed detector output; the tick is rejected without state change
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Eye corners too close to compute an aspect ratio
    #[error("Degenerate eye geometry: corner distance {width}")]
    DegenerateGeometry { width: f64 },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Session-scoped liveness engine
#[derive(Debug, Default)]
pub struct LivenessEngine {
    config: LivenessConfig,
    state: EngineState,
}

impl LivenessEngine {
    /// Create a new engine with configuration
    pub fn new(config: LivenessConfig) -> Result<Self, LivenessError> {
        config.validate()?;
        debug!("Creating liveness engine with config: {:?}", config);
        Ok(Self {
            config,
            state: EngineState::default(),
        })
    }

    /// Process one tick. `None` means no face was visible.
    ///
    /// Input is validated before anything is mutated, so an `InvalidInput`
    /// error leaves the state exactly as it was.
    pub fn on_frame(
        &mut self,
        observation: Option<&FaceObservation>,
        now: Instant,
    ) -> Result<LivenessSnapshot, LivenessError> {
        let Some(observation) = observation else {
            return Ok(LivenessSnapshot::from_state(&self.state, false));
        };

        let left = EyeContour::from_points(Eye::Left, &observation.left_eye)?;
        let right = EyeContour::from_points(Eye::Right, &observation.right_eye)?;
        if !observation.nose.is_finite() {
            return Err(LivenessError::InvalidInput(
                "nose position is not finite".into(),
            ));
        }

        let ear = match average_aspect_ratio(&left, &right) {
            Ok(ear) => Some(ear),
            Err(e) => {
                debug!("Skipping blink check this tick: {}", e);
                None
            }
        };

        let (blink_detected, blink_cue) = match ear {
            Some(ear) => self.update_eye_state(ear, now),
            None => (false, None),
        };
        let (head_movement, movement_cue) = self.update_head_position(observation.nose);

        self.state.current_emotion = dominant_emotion(&observation.expressions).map(str::to_owned);

        let mut snapshot = LivenessSnapshot::from_state(&self.state, true);
        snapshot.ear = ear;
        snapshot.blink_detected = blink_detected;
        snapshot.head_movement = head_movement;
        snapshot.confirmed_by = blink_cue.or(movement_cue);
        Ok(snapshot)
    }

    /// Blink debounce. Returns whether a blink was counted and the cue if
    /// it flipped the latch.
    fn update_eye_state(&mut self, ear: f64, now: Instant) -> (bool, Option<LivenessCue>) {
        if ear >= self.config.ear_threshold {
            self.state.eye_openness = EyeOpenness::Open;
            return (false, None);
        }

        let previous = std::mem::replace(&mut self.state.eye_openness, EyeOpenness::Closed);
        if previous != EyeOpenness::Open {
            // Still closed, or first reading of the session
            return (false, None);
        }

        match self.config.blink_policy {
            BlinkPolicy::Debounced => {
                if !self.state.debounce_elapsed(now, self.config.blink_debounce()) {
                    debug!("Eye closed within debounce window, blink not counted");
                    return (false, None);
                }
                self.record_blink(now);
                (true, self.confirm(LivenessCue::Blink))
            }
            BlinkPolicy::Cumulative { min_blinks } => {
                self.record_blink(now);
                let cue = if self.state.blink_count >= min_blinks {
                    self.confirm(LivenessCue::Blink)
                } else {
                    None
                };
                (true, cue)
            }
        }
    }

    fn record_blink(&mut self, now: Instant) {
        self.state.blink_count = self.state.blink_count.saturating_add(1);
        self.state.last_blink_at = Some(now);
        info!("Blink detected (count: {})", self.state.blink_count);
    }

    /// Head movement check. Returns the displacement since the last
    /// observation and the cue if it flipped the latch.
    fn update_head_position(&mut self, nose: Point2D) -> (Option<f64>, Option<LivenessCue>) {
        if !self.config.track_head_movement {
            return (None, None);
        }

        let movement = self
            .state
            .last_head_position
            .map(|last| last.manhattan_distance(&nose));
        self.state.last_head_position = Some(nose);

        match movement {
            Some(m) if m > self.config.movement_threshold => {
                debug!("Head moved {:.2}px", m);
                (movement, self.confirm(LivenessCue::HeadMovement))
            }
            _ => (movement, None),
        }
    }

    /// Set the latch; returns the cue only on the false -> true edge
    fn confirm(&mut self, cue: LivenessCue) -> Option<LivenessCue> {
        if self.state.liveness_confirmed {
            return None;
        }
        self.state.liveness_confirmed = true;
        info!("Liveness confirmed by {:?}", cue);
        Some(cue)
    }

    /// Reset engine state (on session end)
    pub fn reset(&mut self) {
        self.state.reset();
        debug!("Liveness state reset");
    }

    pub fn config(&self) -> &LivenessConfig {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_live(&self) -> bool {
        self.state.liveness_confirmed
    }

    /// Dominant expression label, `none` if unknown
    pub fn current_emotion(&self) -> &str {
        self.state.emotion_label()
    }

    pub fn blink_count(&self) -> u32 {
        self.state.blink_count
    }

    pub fn eye_openness(&self) -> EyeOpenness {
        self.state.eye_openness
    }

    pub fn last_head_position(&self) -> Option<Point2D> {
        self.state.last_head_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Eye contour 10px wide whose EAR is exactly `ear`
    fn eye_with_ear(ear: f64) -> Vec<Point2D> {
        let h = 5.0 * ear;
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(3.0, h),
            Point2D::new(7.0, h),
            Point2D::new(10.0, 0.0),
            Point2D::new(7.0, -h),
            Point2D::new(3.0, -h),
        ]
    }

    fn face(ear: f64, nose: (f64, f64)) -> FaceObservation {
        FaceObservation::new(eye_with_ear(ear), eye_with_ear(ear), Point2D::new(nose.0, nose.1))
    }

    fn at(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn test_contour_helper_ear() {
        let contour = EyeContour::from_points(Eye::Left, &eye_with_ear(0.3)).unwrap();
        assert!((contour.aspect_ratio().unwrap() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_debounced_blink_sequence() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        let nose = (100.0, 100.0);

        let steps = [(0.30, 0), (0.10, 0), (0.30, 50), (0.10, 120), (0.30, 300), (0.10, 305)];
        let mut counted = Vec::new();
        for (ear, ms) in steps {
            let snapshot = engine.on_frame(Some(&face(ear, nose)), at(t0, ms)).unwrap();
            counted.push(snapshot.blink_detected);
        }

        // 120ms is inside the window of the blink at 0ms; 305ms is not
        assert_eq!(counted, [false, true, false, false, false, true]);
        assert_eq!(engine.blink_count(), 2);
        assert!(engine.is_live());
    }

    #[test]
    fn test_close_edges_inside_window_count_once() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), t0).unwrap();
        engine.on_frame(Some(&face(0.1, (0.0, 0.0))), at(t0, 10)).unwrap();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), at(t0, 60)).unwrap();
        engine.on_frame(Some(&face(0.1, (0.0, 0.0))), at(t0, 150)).unwrap();
        assert_eq!(engine.blink_count(), 1);
    }

    #[test]
    fn test_first_closed_reading_gets_no_credit() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();

        let snapshot = engine.on_frame(Some(&face(0.1, (0.0, 0.0))), t0).unwrap();
        assert_eq!(snapshot.eye_openness, EyeOpenness::Closed);
        assert_eq!(snapshot.blink_count, 0);
        assert!(!snapshot.liveness_confirmed);

        // Staying closed does not count either
        engine.on_frame(Some(&face(0.05, (0.0, 0.0))), at(t0, 500)).unwrap();
        assert_eq!(engine.blink_count(), 0);
    }

    #[test]
    fn test_threshold_is_open() {
        let mut engine = LivenessEngine::default();
        engine.on_frame(Some(&face(0.25, (0.0, 0.0))), Instant::now()).unwrap();
        assert_eq!(engine.eye_openness(), EyeOpenness::Open);
    }

    #[test]
    fn test_head_movement_confirms_liveness() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();

        let first = engine.on_frame(Some(&face(0.3, (100.0, 100.0))), t0).unwrap();
        assert_eq!(first.head_movement, None);

        engine.on_frame(Some(&face(0.3, (100.0, 100.0))), at(t0, 100)).unwrap();
        assert!(!engine.is_live());

        let snapshot = engine.on_frame(Some(&face(0.3, (103.0, 100.0))), at(t0, 200)).unwrap();
        assert_eq!(snapshot.head_movement, Some(3.0));
        assert!(!engine.is_live());

        let snapshot = engine.on_frame(Some(&face(0.3, (109.0, 100.0))), at(t0, 300)).unwrap();
        assert_eq!(snapshot.head_movement, Some(6.0));
        assert_eq!(snapshot.confirmed_by, Some(LivenessCue::HeadMovement));
        assert!(engine.is_live());
        assert_eq!(engine.last_head_position(), Some(Point2D::new(109.0, 100.0)));
    }

    #[test]
    fn test_movement_at_threshold_does_not_confirm() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (100.0, 100.0))), t0).unwrap();
        engine.on_frame(Some(&face(0.3, (102.0, 103.0))), at(t0, 100)).unwrap();
        assert!(!engine.is_live());
    }

    #[test]
    fn test_movement_tracking_disabled() {
        let config = LivenessConfig {
            track_head_movement: false,
            ..Default::default()
        };
        let mut engine = LivenessEngine::new(config).unwrap();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), t0).unwrap();
        engine.on_frame(Some(&face(0.3, (300.0, 300.0))), at(t0, 100)).unwrap();
        assert!(!engine.is_live());
        assert_eq!(engine.last_head_position(), None);
    }

    #[test]
    fn test_malformed_contour_leaves_state_unchanged() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (50.0, 60.0))), t0).unwrap();
        let before = engine.state().clone();

        let mut bad = face(0.1, (90.0, 90.0)).with_expression("happy", 0.9);
        bad.left_eye.truncate(4);
        let err = engine.on_frame(Some(&bad), at(t0, 500)).unwrap_err();

        assert!(matches!(err, LivenessError::InvalidInput(_)));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_non_finite_nose_rejected() {
        let mut engine = LivenessEngine::default();
        let before = engine.state().clone();
        let bad = face(0.3, (f64::NAN, 1.0));
        assert!(matches!(
            engine.on_frame(Some(&bad), Instant::now()),
            Err(LivenessError::InvalidInput(_))
        ));
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_degenerate_eye_skips_blink_step_only() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (100.0, 100.0))), t0).unwrap();

        let collapsed = vec![Point2D::new(4.0, 4.0); 6];
        let obs = FaceObservation::new(collapsed.clone(), collapsed, Point2D::new(120.0, 100.0))
            .with_expression("neutral", 0.6);
        let snapshot = engine.on_frame(Some(&obs), at(t0, 300)).unwrap();

        assert_eq!(snapshot.ear, None);
        assert_eq!(snapshot.eye_openness, EyeOpenness::Open);
        assert_eq!(snapshot.blink_count, 0);
        // Movement and emotion still run
        assert!(snapshot.liveness_confirmed);
        assert_eq!(snapshot.emotion, "neutral");
    }

    #[test]
    fn test_overflowing_eye_geometry_does_not_blink() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (100.0, 100.0))), t0).unwrap();

        // Every distance overflows, so the raw ratio would be inf / inf
        let huge = vec![
            Point2D::new(-1e308, 0.0),
            Point2D::new(-1e308, 1e308),
            Point2D::new(1e308, 1e308),
            Point2D::new(1e308, 0.0),
            Point2D::new(1e308, -1e308),
            Point2D::new(-1e308, -1e308),
        ];
        let obs = FaceObservation::new(huge.clone(), huge, Point2D::new(100.0, 100.0));
        let snapshot = engine.on_frame(Some(&obs), at(t0, 300)).unwrap();

        assert_eq!(snapshot.ear, None);
        assert!(!snapshot.blink_detected);
        assert_eq!(engine.eye_openness(), EyeOpenness::Open);
        assert_eq!(engine.blink_count(), 0);
        assert!(!engine.is_live());
    }

    #[test]
    fn test_no_face_is_noop() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (10.0, 10.0)).with_expression("happy", 0.8)), t0).unwrap();
        let before = engine.state().clone();

        let snapshot = engine.on_frame(None, at(t0, 100)).unwrap();
        assert!(!snapshot.face_detected);
        assert_eq!(snapshot.status_line(), "Liveness: Not Detected | Emotion: none");
        assert_eq!(engine.state(), &before);
        assert_eq!(engine.current_emotion(), "happy");
    }

    #[test]
    fn test_emotion_follows_latest_face() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        let obs = face(0.3, (0.0, 0.0))
            .with_expression("neutral", 0.3)
            .with_expression("happy", 0.6);
        let snapshot = engine.on_frame(Some(&obs), t0).unwrap();
        assert_eq!(snapshot.emotion, "happy");

        // All-zero scores fall back to the sentinel
        let obs = face(0.3, (0.0, 0.0)).with_expression("happy", 0.0);
        engine.on_frame(Some(&obs), at(t0, 100)).unwrap();
        assert_eq!(engine.current_emotion(), NO_EMOTION);
        assert!(!engine.is_live());
    }

    #[test]
    fn test_cumulative_policy_needs_min_blinks() {
        let config = LivenessConfig {
            blink_policy: BlinkPolicy::Cumulative { min_blinks: 2 },
            track_head_movement: false,
            ..Default::default()
        };
        let mut engine = LivenessEngine::new(config).unwrap();
        let t0 = Instant::now();

        for (ear, ms) in [(0.3, 0), (0.1, 10), (0.3, 20)] {
            engine.on_frame(Some(&face(ear, (0.0, 0.0))), at(t0, ms)).unwrap();
        }
        assert_eq!(engine.blink_count(), 1);
        assert!(!engine.is_live());

        // No debounce: a second edge 20ms later still counts
        let snapshot = engine.on_frame(Some(&face(0.1, (0.0, 0.0))), at(t0, 30)).unwrap();
        assert_eq!(snapshot.blink_count, 2);
        assert_eq!(snapshot.confirmed_by, Some(LivenessCue::Blink));
    }

    #[test]
    fn test_latch_reported_once() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), t0).unwrap();
        let first = engine.on_frame(Some(&face(0.3, (10.0, 0.0))), at(t0, 100)).unwrap();
        let second = engine.on_frame(Some(&face(0.3, (20.0, 0.0))), at(t0, 200)).unwrap();
        assert_eq!(first.confirmed_by, Some(LivenessCue::HeadMovement));
        assert_eq!(second.confirmed_by, None);
        assert!(second.liveness_confirmed);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), t0).unwrap();
        engine.on_frame(Some(&face(0.1, (9.0, 0.0))), at(t0, 100)).unwrap();
        assert!(engine.is_live());

        engine.reset();
        let once = engine.state().clone();
        engine.reset();
        assert_eq!(engine.state(), &once);
        assert_eq!(engine.blink_count(), 0);
        assert!(!engine.is_live());
        assert_eq!(engine.last_head_position(), None);
        assert_eq!(engine.eye_openness(), EyeOpenness::Unknown);
    }

    #[test]
    fn test_reset_starts_clean_session() {
        let mut engine = LivenessEngine::default();
        let t0 = Instant::now();
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), t0).unwrap();
        engine.on_frame(Some(&face(0.1, (0.0, 0.0))), at(t0, 10)).unwrap();
        engine.reset();

        // Blink right after reset is not debounced against the old session
        engine.on_frame(Some(&face(0.3, (0.0, 0.0))), at(t0, 20)).unwrap();
        engine.on_frame(Some(&face(0.1, (0.0, 0.0))), at(t0, 30)).unwrap();
        assert_eq!(engine.blink_count(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LivenessConfig {
            ear_threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(LivenessEngine::new(config), Err(LivenessError::Config(_))));
    }

    fn ticks() -> impl Strategy<Value = Vec<(Option<f64>, f64, f64, u64)>> {
        prop::collection::vec(
            (
                prop::option::of(0.0f64..0.5),
                0.0f64..640.0,
                0.0f64..480.0,
                0u64..400,
            ),
            1..60,
        )
    }

    proptest! {
        #[test]
        fn prop_blink_count_and_latch_are_monotonic(ticks in ticks()) {
            let mut engine = LivenessEngine::default();
            let mut now = Instant::now();
            let mut prev_count = 0;
            let mut prev_live = false;

            for (ear, x, y, dt) in ticks {
                now += Duration::from_millis(dt);
                let obs = ear.map(|ear| face(ear, (x, y)));
                let snapshot = engine.on_frame(obs.as_ref(), now).unwrap();

                prop_assert!(snapshot.blink_count >= prev_count);
                prop_assert!(snapshot.liveness_confirmed || !prev_live);
                prev_count = snapshot.blink_count;
                prev_live = snapshot.liveness_confirmed;
            }
        }

        #[test]
        fn prop_no_face_never_mutates(ticks in ticks()) {
            let mut engine = LivenessEngine::default();
            let mut now = Instant::now();

            for (ear, x, y, dt) in ticks {
                now += Duration::from_millis(dt);
                match ear {
                    Some(ear) => {
                        engine.on_frame(Some(&face(ear, (x, y))), now).unwrap();
                    }
                    None => {
                        let before = engine.state().clone();
                        engine.on_frame(None, now).unwrap();
                        prop_assert_eq!(engine.state(), &before);
                    }
                }
            }
        }

        #[test]
        fn prop_reset_is_idempotent(ticks in ticks()) {
            let mut engine = LivenessEngine::default();
            let mut now = Instant::now();

            for (ear, x, y, dt) in ticks {
                now += Duration::from_millis(dt);
                let obs = ear.map(|ear| face(ear, (x, y)));
                engine.on_frame(obs.as_ref(), now).unwrap();
            }

            engine.reset();
            let once = engine.state().clone();
            engine.reset();
            prop_assert_eq!(engine.state(), &once);
            prop_assert_eq!(engine.state(), &EngineState::default());
        }

        #[test]
        fn prop_blinks_respect_debounce(ticks in ticks()) {
            let mut engine = LivenessEngine::default();
            let mut now = Instant::now();
            let mut last_counted: Option<Instant> = None;

            for (ear, x, y, dt) in ticks {
                now += Duration::from_millis(dt);
                let obs = ear.map(|ear| face(ear, (x, y)));
                let snapshot = engine.on_frame(obs.as_ref(), now).unwrap();
                if snapshot.blink_detected {
                    if let Some(last) = last_counted {
                        prop_assert!(now.duration_since(last) > Duration::from_millis(200));
                    }
                    last_counted = Some(now);
                }
            }
        }
    }
}
