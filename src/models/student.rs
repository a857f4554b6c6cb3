// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'students' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub full_name: String,
    pub school_id: Option<i64>,
    pub class_id: Option<i64>,
}

/// Public identity of a student shown in rollups and leaderboards.
/// `full_name` is null when the attempt references a student the
/// directory no longer knows about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub id: i64,
    pub full_name: Option<String>,
}
