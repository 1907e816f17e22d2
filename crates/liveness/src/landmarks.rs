//! Facial landmark geometry and eye aspect ratio

use serde::{Deserialize, Serialize};
use std::fmt;
use crate::LivenessError;

/// Points per eye contour (68-point landmark convention)
pub const EYE_CONTOUR_POINTS: usize = 6;

/// Horizontal eye widths below this are treated as degenerate (edge-on eye)
pub const MIN_EYE_WIDTH: f64 = 1e-6;

/// Landmark point in video pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Sum of absolute axis deltas (head movement metric)
    pub fn manhattan_distance(&self, other: &Point2D) -> f64 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Which eye a contour belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => f.write_str("left"),
            Eye::Right => f.write_str("right"),
        }
    }
}

/// Validated 6-point eye contour
///
/// Indices 0 and 3 are the horizontal corners, (1, 5) and (2, 4) the two
/// vertical pairs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeContour {
    eye: Eye,
    points: [Point2D; EYE_CONTOUR_POINTS],
}

impl EyeContour {
    /// Build a contour from raw detector output
    pub fn from_points(eye: Eye, points: &[Point2D]) -> Result<Self, LivenessError> {
        let points: [Point2D; EYE_CONTOUR_POINTS] = points.try_into().map_err(|_| {
            LivenessError::InvalidInput(format!(
                "{} eye contour has {} points, expected {}",
                eye,
                points.len(),
                EYE_CONTOUR_POINTS
            ))
        })?;

        if let Some(idx) = points.iter().position(|p| !p.is_finite()) {
            return Err(LivenessError::InvalidInput(format!(
                "{} eye contour point {} is not finite",
                eye, idx
            )));
        }

        Ok(Self { eye, points })
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn points(&self) -> &[Point2D; EYE_CONTOUR_POINTS] {
        &self.points
    }

    /// Corner-to-corner distance
    pub fn width(&self) -> f64 {
        self.points[0].distance(&self.points[3])
    }

    /// Eye aspect ratio: `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)`
    pub fn aspect_ratio(&self) -> Result<f64, LivenessError> {
        let p = &self.points;
        let width = self.width();
        if !width.is_finite() || width < MIN_EYE_WIDTH {
            return Err(LivenessError::DegenerateGeometry { width });
        }

        // Finite but extreme coordinates can still overflow the distances
        let vertical = p[1].distance(&p[5]) + p[2].distance(&p[4]);
        let ear = vertical / (2.0 * width);
        if !ear.is_finite() {
            return Err(LivenessError::DegenerateGeometry { width });
        }
        Ok(ear)
    }
}

/// Average EAR of both eyes
pub fn average_aspect_ratio(left: &EyeContour, right: &EyeContour) -> Result<f64, LivenessError> {
    Ok((left.aspect_ratio()? + right.aspect_ratio()?) / 2.0)
}
