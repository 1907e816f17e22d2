//! Dominant expression selection

use crate::observation::Expression;

/// Label shown when no expression scored above zero
pub const NO_EMOTION: &str = "none";

/// Highest-scoring label, first seen wins ties. `None` if every score is 0.
/// Non-finite scores are ignored.
pub fn dominant_emotion(expressions: &[Expression]) -> Option<&str> {
    let mut dominant = None;
    let mut max_score = 0.0;

    for expression in expressions {
        if expression.score.is_finite() && expression.score > max_score {
            max_score = expression.score;
            dominant = Some(expression.label.as_str());
        }
    }

    dominant
}
