// src/models/quiz_attempt.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Represents the 'quiz_attempts' table in the database.
/// Rows are written by the quiz submission service and never modified here.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub topic_id: i64,
    pub course_id: i64,
    pub course_level_id: i64,
    pub school_id: i64,
    pub class_id: i64,
    pub score: i64,
    pub max_score: i64,
    pub percentage: f64,
    pub completed: bool,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QuizAttempt {
    /// The date an attempt is filed under: completion if finished, start otherwise.
    pub fn activity_date(&self) -> NaiveDate {
        self.completed_at.unwrap_or(self.created_at).date_naive()
    }

    pub fn is_failed(&self) -> bool {
        self.completed && !self.passed
    }

    /// Rejects rows no well-behaved submission could have produced.
    pub fn check_integrity(&self) -> Result<(), String> {
        if !self.percentage.is_finite() || !(0.0..=100.0).contains(&self.percentage) {
            return Err(format!("percentage {} outside [0, 100]", self.percentage));
        }
        if self.score < 0 || self.max_score < 0 {
            return Err(format!(
                "negative score {}/{}",
                self.score, self.max_score
            ));
        }
        if self.passed && !self.completed {
            return Err("marked passed but not completed".to_string());
        }
        Ok(())
    }
}

/// Attempt state selector for performance queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatusFilter {
    #[default]
    All,
    Passed,
    /// Completed without passing.
    Failed,
    /// Not completed yet.
    InProgress,
}

impl AttemptStatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatusFilter::All => "all",
            AttemptStatusFilter::Passed => "passed",
            AttemptStatusFilter::Failed => "failed",
            AttemptStatusFilter::InProgress => "in_progress",
        }
    }

    pub fn admits(self, attempt: &QuizAttempt) -> bool {
        match self {
            AttemptStatusFilter::All => true,
            AttemptStatusFilter::Passed => attempt.completed && attempt.passed,
            AttemptStatusFilter::Failed => attempt.is_failed(),
            AttemptStatusFilter::InProgress => !attempt.completed,
        }
    }
}

/// Query parameters for quiz performance.
/// Every present field narrows the result; absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizPerformanceFilter {
    pub school_id: Option<i64>,
    pub class_id: Option<i64>,
    pub course_id: Option<i64>,
    pub course_level_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub quiz_id: Option<i64>,
    /// Inclusive, UTC.
    pub date_from: Option<NaiveDate>,
    /// Inclusive, UTC.
    pub date_to: Option<NaiveDate>,
    #[serde(default)]
    pub status: AttemptStatusFilter,
}

impl QuizPerformanceFilter {
    pub fn for_class(class_id: i64) -> Self {
        Self {
            class_id: Some(class_id),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if let (Some(from), Some(to)) = (self.date_from, self.date_to) {
            if from > to {
                return Err(AppError::Validation(format!(
                    "date_from {from} is after date_to {to}"
                )));
            }
        }
        Ok(())
    }

    pub fn matches(&self, attempt: &QuizAttempt) -> bool {
        let same = |wanted: Option<i64>, actual: i64| wanted.is_none_or(|id| id == actual);
        let day = attempt.activity_date();

        same(self.school_id, attempt.school_id)
            && same(self.class_id, attempt.class_id)
            && same(self.course_id, attempt.course_id)
            && same(self.course_level_id, attempt.course_level_id)
            && same(self.topic_id, attempt.topic_id)
            && same(self.quiz_id, attempt.quiz_id)
            && self.date_from.is_none_or(|from| day >= from)
            && self.date_to.is_none_or(|to| day <= to)
            && self.status.admits(attempt)
    }
}
