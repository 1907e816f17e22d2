//! Per-tick input from the landmark detector

use serde::{Deserialize, Serialize};
use crate::landmarks::Point2D;

/// Expression classifier output for one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub label: String,
    /// Score in [0, 1]
    pub score: f64,
}

/// One detected face
///
/// Eye contours are carried as delivered by the detector and validated by
/// the engine, so a malformed detection can be rejected instead of indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub left_eye: Vec<Point2D>,
    pub right_eye: Vec<Point2D>,
    /// Nose reference point (head position)
    pub nose: Point2D,
    /// Expression scores in classifier order
    #[serde(default)]
    pub expressions: Vec<Expression>,
}

impl FaceObservation {
    pub fn new(left_eye: Vec<Point2D>, right_eye: Vec<Point2D>, nose: Point2D) -> Self {
        Self {
            left_eye,
            right_eye,
            nose,
            expressions: Vec::new(),
        }
    }

    /// Append an expression score
    pub fn with_expression(mut self, label: impl Into<String>, score: f64) -> Self {
        self.expressions.push(Expression {
            label: label.into(),
            score,
        });
        self
    }
}

/// What the frame source produced for a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSample {
    /// No face visible this tick
    NoFace,
    /// First detected face
    Face(FaceObservation),
}

impl FrameSample {
    pub fn observation(&self) -> Option<&FaceObservation> {
        match self {
            FrameSample::NoFace => None,
            FrameSample::Face(obs) => Some(obs),
        }
    }
}

impl From<Option<FaceObservation>> for FrameSample {
    fn from(obs: Option<FaceObservation>) -> Self {
        obs.map_or(FrameSample::NoFace, FrameSample::Face)
    }
}
