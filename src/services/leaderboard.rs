// src/services/leaderboard.rs

use std::cmp::Ordering;

use crate::{
    config::{DEFAULT_LEADERBOARD_LIMIT, MAX_LEADERBOARD_LIMIT},
    error::AppError,
    models::{
        leaderboard::{LeaderboardCandidate, LeaderboardEntry, LeaderboardScope},
        performance::StudentQuizPerformance,
        quiz_attempt::QuizPerformanceFilter,
    },
    services::performance::aggregate,
    storage::Storage,
    utils::cancel::CancelFlag,
};

/// Leaderboard order: points, then average score, then student id.
fn compare(a: &LeaderboardCandidate, b: &LeaderboardCandidate) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| b.average_score.total_cmp(&a.average_score))
        .then_with(|| a.student.id.cmp(&b.student.id))
}

/// Orders candidates and numbers them `1..=N`.
///
/// Ties on every key but the student id still get distinct ranks; the
/// order never depends on the order of the input.
pub fn rank(
    mut candidates: Vec<LeaderboardCandidate>,
    scope: LeaderboardScope,
) -> Vec<LeaderboardEntry> {
    if let Some(class_id) = scope.class_id() {
        candidates.retain(|c| c.class_id == class_id);
    }
    candidates.sort_by(compare);

    candidates
        .into_iter()
        .zip(1..)
        .map(|(c, rank)| LeaderboardEntry {
            rank,
            student: c.student,
            total_points: c.total_points,
            quizzes_completed: c.quizzes_completed,
            quizzes_passed: c.quizzes_passed,
            average_score: c.average_score,
        })
        .collect()
}

impl From<StudentQuizPerformance> for LeaderboardCandidate {
    fn from(performance: StudentQuizPerformance) -> Self {
        Self {
            student: performance.student,
            class_id: performance.class_id,
            total_points: performance.total_points,
            quizzes_completed: performance.quizzes_completed,
            quizzes_passed: performance.quizzes_passed,
            average_score: performance.average_percentage,
        }
    }
}

/// Clamps a requested row count into `1..=MAX_LEADERBOARD_LIMIT`.
pub fn effective_limit(requested: Option<i64>) -> usize {
    requested
        .unwrap_or(DEFAULT_LEADERBOARD_LIMIT)
        .clamp(1, MAX_LEADERBOARD_LIMIT) as usize
}

/// Ranks every student with at least one completed quiz in `scope`.
pub async fn leaderboard(
    storage: &dyn Storage,
    scope: LeaderboardScope,
    limit: usize,
    cancel: &CancelFlag,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let filter = match scope {
        LeaderboardScope::Global => QuizPerformanceFilter::default(),
        LeaderboardScope::Class(class_id) => QuizPerformanceFilter::for_class(class_id),
    };
    let performance = aggregate(storage, &filter, cancel).await?;

    let candidates = performance
        .student_data
        .into_iter()
        .filter(|s| s.quizzes_completed > 0)
        .map(LeaderboardCandidate::from)
        .collect();

    let mut entries = rank(candidates, scope);
    entries.truncate(limit);
    Ok(entries)
}
