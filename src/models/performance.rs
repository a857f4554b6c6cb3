// src/models/performance.rs

use serde::{Deserialize, Serialize};

use crate::models::student::StudentSummary;

/// Ordinal performance band derived from a percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    BelowExpectation,
    Approaching,
    Meeting,
    Exceeding,
}

/// Attempt counts per score category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub below_expectation: i64,
    pub approaching: i64,
    pub meeting: i64,
    pub exceeding: i64,
}

impl ScoreDistribution {
    pub fn add(&mut self, category: ScoreCategory) {
        let bucket = match category {
            ScoreCategory::BelowExpectation => &mut self.below_expectation,
            ScoreCategory::Approaching => &mut self.approaching,
            ScoreCategory::Meeting => &mut self.meeting,
            ScoreCategory::Exceeding => &mut self.exceeding,
        };
        *bucket += 1;
    }

    pub fn total(&self) -> i64 {
        self.below_expectation + self.approaching + self.meeting + self.exceeding
    }
}

/// Totals over every attempt matching a filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizPerformanceStats {
    pub total_attempts: i64,
    pub completed_attempts: i64,
    pub passed_attempts: i64,
    pub failed_attempts: i64,
    pub in_progress_attempts: i64,
    /// Mean score of completed attempts.
    pub average_score: f64,
    /// Mean percentage of completed attempts.
    pub average_percentage: f64,
    pub pass_rate: f64,
    pub total_students: i64,
    pub unique_quizzes: i64,
    pub score_distribution: ScoreDistribution,
}

/// Rollup of one quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizPerformanceData {
    pub quiz_id: i64,
    pub topic_id: i64,
    pub course_id: i64,
    pub total_attempts: i64,
    pub completed_attempts: i64,
    pub passed_attempts: i64,
    pub failed_attempts: i64,
    pub unique_students: i64,
    pub pass_rate: f64,
    pub average_score: f64,
    pub average_percentage: f64,
    /// Highest completed score, 0 when nothing was completed.
    pub best_score: i64,
    /// Lowest completed score, 0 when nothing was completed.
    pub worst_score: i64,
    pub score_distribution: ScoreDistribution,
}

/// Rollup of one student across the matching quizzes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentQuizPerformance {
    pub student: StudentSummary,
    pub class_id: i64,
    pub total_attempts: i64,
    /// Distinct quizzes with at least one completed attempt.
    pub quizzes_completed: i64,
    /// Distinct quizzes with at least one passed attempt.
    pub quizzes_passed: i64,
    /// Sum of scores over completed attempts.
    pub total_points: i64,
    pub highest_score: i64,
    pub highest_percentage: f64,
    pub average_percentage: f64,
    /// Band of the highest percentage; null until something is completed.
    pub score_category: Option<ScoreCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizPerformanceResponse {
    pub stats: QuizPerformanceStats,
    pub quiz_data: Vec<QuizPerformanceData>,
    pub student_data: Vec<StudentQuizPerformance>,
}
