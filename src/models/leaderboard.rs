// src/models/leaderboard.rs

use serde::{Deserialize, Serialize};

use crate::models::student::StudentSummary;

/// Which students a leaderboard ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardScope {
    Global,
    Class(i64),
}

impl LeaderboardScope {
    pub fn class_id(self) -> Option<i64> {
        match self {
            LeaderboardScope::Global => None,
            LeaderboardScope::Class(id) => Some(id),
        }
    }
}

/// Unranked input row for the leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardCandidate {
    pub student: StudentSummary,
    pub class_id: i64,
    pub total_points: i64,
    pub quizzes_completed: i64,
    pub quizzes_passed: i64,
    pub average_score: f64,
}

/// Aggregated struct for displaying the leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// 1-based, consecutive, never shared.
    pub rank: i64,
    pub student: StudentSummary,
    pub total_points: i64,
    pub quizzes_completed: i64,
    pub quizzes_passed: i64,
    pub average_score: f64,
}

/// Query parameters for leaderboard endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct LeaderboardParams {
    /// Number of rows to return (default: 10, max: 100).
    pub limit: Option<i64>,
}
