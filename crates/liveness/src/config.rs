//! Liveness engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::LivenessError;

/// How closing-eye edges turn into a liveness verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BlinkPolicy {
    /// Count a closing edge only once the debounce window has elapsed since
    /// the last counted blink; the first counted blink latches liveness.
    #[default]
    Debounced,
    /// Count every closing edge; latch liveness once `min_blinks` is reached.
    Cumulative { min_blinks: u32 },
}

/// Liveness engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    /// Average EAR below which eyes are considered closed
    pub ear_threshold: f64,

    /// Minimum time between two counted blinks (milliseconds)
    pub blink_debounce_ms: u64,

    /// Blink confirmation policy
    pub blink_policy: BlinkPolicy,

    /// Enable head movement as a second liveness cue
    pub track_head_movement: bool,

    /// Nose displacement (|dx| + |dy|, pixels) that confirms liveness
    pub movement_threshold: f64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            blink_debounce_ms: 200,
            blink_policy: BlinkPolicy::Debounced,
            track_head_movement: true,
            movement_threshold: 5.0,
        }
    }
}

impl LivenessConfig {
    /// Create strict config (blinks only, two needed)
    pub fn strict() -> Self {
        Self {
            blink_policy: BlinkPolicy::Cumulative { min_blinks: 2 },
            track_head_movement: false,
            ..Default::default()
        }
    }

    /// Create lenient config (easier closing threshold, smaller movement)
    pub fn lenient() -> Self {
        Self {
            ear_threshold: 0.28,
            movement_threshold: 3.0,
            ..Default::default()
        }
    }

    pub fn blink_debounce(&self) -> Duration {
        Duration::from_millis(self.blink_debounce_ms)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), LivenessError> {
        if !self.ear_threshold.is_finite() || self.ear_threshold <= 0.0 {
            return Err(LivenessError::Config(format!(
                "ear_threshold must be positive, got {}",
                self.ear_threshold
            )));
        }
        if !self.movement_threshold.is_finite() || self.movement_threshold < 0.0 {
            return Err(LivenessError::Config(format!(
                "movement_threshold must be non-negative, got {}",
                self.movement_threshold
            )));
        }
        if let BlinkPolicy::Cumulative { min_blinks: 0 } = self.blink_policy {
            return Err(LivenessError::Config("min_blinks must be at least 1".into()));
        }
        Ok(())
    }
}
