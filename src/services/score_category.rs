// src/services/score_category.rs

use crate::{error::AppError, models::performance::ScoreCategory};

/// Maps a percentage to its score band.
///
/// Bands are closed at the top: `[0, 25]`, `(25, 50]`, `(50, 75]`, `(75, 100]`.
pub fn categorize(percentage: f64) -> Result<ScoreCategory, AppError> {
    if !percentage.is_finite() || !(0.0..=100.0).contains(&percentage) {
        return Err(AppError::Validation(format!(
            "percentage {percentage} must be a number between 0 and 100"
        )));
    }

    let category = if percentage <= 25.0 {
        ScoreCategory::BelowExpectation
    } else if percentage <= 50.0 {
        ScoreCategory::Approaching
    } else if percentage <= 75.0 {
        ScoreCategory::Meeting
    } else {
        ScoreCategory::Exceeding
    };
    Ok(category)
}
