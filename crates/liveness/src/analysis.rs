//! Per-tick engine output

use serde::{Deserialize, Serialize};
use crate::emotion::NO_EMOTION;
use crate::landmarks::Point2D;
use crate::state::{EngineState, EyeOpenness};

/// What confirmed liveness on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LivenessCue {
    Blink,
    HeadMovement,
}

/// Snapshot of the engine after one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivenessSnapshot {
    /// Whether a face was observed this tick
    pub face_detected: bool,

    /// Average eye aspect ratio (absent on no-face or degenerate ticks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<f64>,

    /// Debounced eye state
    pub eye_openness: EyeOpenness,

    /// A blink was counted on this tick
    pub blink_detected: bool,

    /// Confirmed blinks this session
    pub blink_count: u32,

    /// Nose displacement since the previous observation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_movement: Option<f64>,

    /// Most recent nose position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_position: Option<Point2D>,

    /// Latched liveness verdict
    pub liveness_confirmed: bool,

    /// Cue that flipped the latch on this tick, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_by: Option<LivenessCue>,

    /// Dominant expression label (`none` if unknown)
    pub emotion: String,
}

impl LivenessSnapshot {
    /// Snapshot of `state` with no per-tick measurements
    pub fn from_state(state: &EngineState, face_detected: bool) -> Self {
        Self {
            face_detected,
            ear: None,
            eye_openness: state.eye_openness,
            blink_detected: false,
            blink_count: state.blink_count,
            head_movement: None,
            head_position: state.last_head_position,
            liveness_confirmed: state.liveness_confirmed,
            confirmed_by: None,
            emotion: state.emotion_label().to_string(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.liveness_confirmed
    }

    /// Emotion to display; the label is stale when no face is visible
    pub fn display_emotion(&self) -> &str {
        if self.face_detected {
            &self.emotion
        } else {
            NO_EMOTION
        }
    }

    /// Status text, e.g. `Liveness: Detected | Emotion: happy`
    pub fn status_line(&self) -> String {
        format!(
            "Liveness: {} | Emotion: {}",
            if self.liveness_confirmed { "Detected" } else { "Not Detected" },
            self.display_emotion()
        )
    }

    pub fn face_status(&self) -> &'static str {
        if self.face_detected {
            "Face Detected"
        } else {
            "No Face Detected"
        }
    }
}
