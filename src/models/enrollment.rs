// src/models/enrollment.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::course::CourseSummary;

/// Relationship of a student to a course.
///
/// The variants are ordered: `NotEnrolled < Enrolled < Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    NotEnrolled,
    Enrolled,
    Completed,
}

impl EnrollmentStatus {
    pub const ALL: [EnrollmentStatus; 3] = [
        EnrollmentStatus::NotEnrolled,
        EnrollmentStatus::Enrolled,
        EnrollmentStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStatus::NotEnrolled => "not_enrolled",
            EnrollmentStatus::Enrolled => "enrolled",
            EnrollmentStatus::Completed => "completed",
        }
    }

    /// Position in the forward progression, used by `TransitionPolicy::ForwardOnly`.
    pub fn ordinal(self) -> i32 {
        match self {
            EnrollmentStatus::NotEnrolled => 0,
            EnrollmentStatus::Enrolled => 1,
            EnrollmentStatus::Completed => 2,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown enrollment status '{0}', expected one of not_enrolled, enrolled, completed")]
pub struct UnknownStatus(pub String);

impl FromStr for EnrollmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnrollmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl TryFrom<String> for EnrollmentStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which status changes an upsert may perform on an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may move to any status, including `completed -> enrolled`.
    #[default]
    Permissive,
    /// A write may keep or advance the status but never move it backwards.
    ForwardOnly,
}

impl TransitionPolicy {
    pub fn permits(self, from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
        match self {
            TransitionPolicy::Permissive => true,
            TransitionPolicy::ForwardOnly => from <= to,
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "forward_only" | "forward-only" => Ok(TransitionPolicy::ForwardOnly),
            other => Err(format!("unknown enrollment transition policy '{other}'")),
        }
    }
}

/// Represents the 'enrollments' table in the database.
/// Unique on `(student_id, course_id)`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    #[sqlx(try_from = "String")]
    pub status: EnrollmentStatus,
    pub progress_percentage: i32,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// Builds the row created by the first status write for a pair.
    pub fn create(id: i64, change: &EnrollmentChange) -> Self {
        let stamp_enrolled = change.status != EnrollmentStatus::NotEnrolled;
        let stamp_completed = change.status == EnrollmentStatus::Completed;
        Self {
            id,
            student_id: change.student_id,
            course_id: change.course_id,
            status: change.status,
            progress_percentage: change.progress_percentage.unwrap_or(0),
            enrolled_at: stamp_enrolled.then_some(change.at),
            completed_at: stamp_completed.then_some(change.at),
            updated_at: change.at,
        }
    }

    /// Applies a status write to an existing row.
    ///
    /// `enrolled_at` is set once and kept; `completed_at` is kept while the
    /// row stays completed and cleared when it leaves that state.
    pub fn apply(&mut self, change: &EnrollmentChange) {
        if change.status != EnrollmentStatus::NotEnrolled && self.enrolled_at.is_none() {
            self.enrolled_at = Some(change.at);
        }
        self.completed_at = if change.status == EnrollmentStatus::Completed {
            self.completed_at.or(Some(change.at))
        } else {
            None
        };
        if let Some(progress) = change.progress_percentage {
            self.progress_percentage = progress;
        }
        self.status = change.status;
        self.updated_at = change.at;
    }
}

/// A validated status write handed to storage.
#[derive(Debug, Clone)]
pub struct EnrollmentChange {
    pub student_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    /// `None` leaves the stored progress untouched (or 0 for a new row).
    pub progress_percentage: Option<i32>,
    pub policy: TransitionPolicy,
    pub at: DateTime<Utc>,
}

/// An enrollment together with the course it points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentEnrollment {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course: CourseSummary,
}

/// One active course annotated with the student's enrollment, or the
/// `not_enrolled` defaults when the student has no row for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseWithEnrollment {
    pub course: CourseSummary,
    pub enrollment_id: Option<i64>,
    pub status: EnrollmentStatus,
    pub progress_percentage: i32,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Raw per-status counts over a student's enrollment rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromRow)]
pub struct EnrollmentCounts {
    pub total: i64,
    pub enrolled: i64,
    pub completed: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStats {
    pub total: i64,
    pub enrolled: i64,
    pub completed: i64,
    pub not_enrolled: i64,
}

/// DTO for changing a student's enrollment status.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEnrollmentRequest {
    #[validate(custom(function = validate_status))]
    pub status: String,
    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress_percentage: Option<i32>,
}

fn validate_status(status: &str) -> Result<(), validator::ValidationError> {
    status
        .parse::<EnrollmentStatus>()
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("unknown_enrollment_status"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(status: EnrollmentStatus, progress: Option<i32>) -> EnrollmentChange {
        EnrollmentChange {
            student_id: 1,
            course_id: 2,
            status,
            progress_percentage: progress,
            policy: TransitionPolicy::Permissive,
            at: Utc::now(),
        }
    }

    #[test]
    fn status_parses_wire_names() {
        for status in EnrollmentStatus::ALL {
            assert_eq!(status.as_str().parse::<EnrollmentStatus>(), Ok(status));
        }
        assert!("dropped".parse::<EnrollmentStatus>().is_err());
        assert!("Enrolled".parse::<EnrollmentStatus>().is_err());
    }

    #[test]
    fn forward_only_refuses_regressions() {
        let policy = TransitionPolicy::ForwardOnly;
        assert!(policy.permits(EnrollmentStatus::NotEnrolled, EnrollmentStatus::Completed));
        assert!(policy.permits(EnrollmentStatus::Completed, EnrollmentStatus::Completed));
        assert!(!policy.permits(EnrollmentStatus::Completed, EnrollmentStatus::Enrolled));
        assert!(TransitionPolicy::Permissive
            .permits(EnrollmentStatus::Completed, EnrollmentStatus::NotEnrolled));
    }

    #[test]
    fn create_defaults_progress_and_stamps() {
        let row = Enrollment::create(7, &change(EnrollmentStatus::Enrolled, None));
        assert_eq!(row.progress_percentage, 0);
        assert!(row.enrolled_at.is_some());
        assert!(row.completed_at.is_none());

        let untouched = Enrollment::create(8, &change(EnrollmentStatus::NotEnrolled, Some(10)));
        assert_eq!(untouched.progress_percentage, 10);
        assert!(untouched.enrolled_at.is_none());
    }

    #[test]
    fn apply_keeps_progress_unless_supplied() {
        let mut row = Enrollment::create(1, &change(EnrollmentStatus::Enrolled, Some(40)));
        row.apply(&change(EnrollmentStatus::Completed, None));
        assert_eq!(row.progress_percentage, 40);
        assert!(row.completed_at.is_some());

        let first_enrolled = row.enrolled_at;
        row.apply(&change(EnrollmentStatus::Enrolled, Some(90)));
        assert_eq!(row.progress_percentage, 90);
        assert_eq!(row.enrolled_at, first_enrolled);
        assert!(row.completed_at.is_none());
    }

    #[test]
    fn request_validation_rejects_bad_input() {
        let bad_status = UpdateEnrollmentRequest {
            status: "graduated".into(),
            progress_percentage: None,
        };
        assert!(bad_status.validate().is_err());

        let bad_progress = UpdateEnrollmentRequest {
            status: "enrolled".into(),
            progress_percentage: Some(101),
        };
        assert!(bad_progress.validate().is_err());

        let ok = UpdateEnrollmentRequest {
            status: "completed".into(),
            progress_percentage: Some(100),
        };
        assert!(ok.validate().is_ok());
    }
}
