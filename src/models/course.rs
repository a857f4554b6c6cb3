// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub course_level_id: Option<i64>,

    /// Inactive courses are hidden from the catalogue but may still be
    /// referenced by older enrollments.
    pub is_active: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// The slice of a course embedded in enrollment listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
}

impl From<&Course> for CourseSummary {
    fn from(course: &Course) -> Self {
        Self {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            is_active: course.is_active,
        }
    }
}
