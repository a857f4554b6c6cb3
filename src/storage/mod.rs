//! Storage collaborator used by the enrollment and performance services.
//!
//! `PgStorage` is the production backend. `MemoryStorage` keeps everything
//! in-process and backs the test suites.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::models::{
    course::Course,
    enrollment::{Enrollment, EnrollmentChange, EnrollmentCounts, StudentEnrollment},
    quiz_attempt::{QuizAttempt, QuizPerformanceFilter},
    student::Student,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Failures reported by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A unique constraint rejected the write.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The row references a student or course that does not exist.
    #[error("referenced row does not exist: {0}")]
    ForeignKeyViolation(String),

    /// A stored row could not be decoded into its model.
    #[error("malformed row: {0}")]
    Decode(String),

    /// The backend cannot serve requests right now.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StorageError::UniqueViolation(db.message().to_string());
            }
            if db.is_foreign_key_violation() {
                return StorageError::ForeignKeyViolation(db.message().to_string());
            }
        }
        if matches!(
            err,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)
        ) {
            return StorageError::Decode(err.to_string());
        }
        StorageError::Database(err)
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Every enrollment row of the student, joined with its course,
    /// whether or not the course is still active.
    async fn student_enrollments(
        &self,
        student_id: i64,
    ) -> Result<Vec<StudentEnrollment>, StorageError>;

    /// Active courses ordered by id.
    async fn active_courses(&self) -> Result<Vec<Course>, StorageError>;

    async fn count_active_courses(&self) -> Result<i64, StorageError>;

    async fn enrollment_counts(&self, student_id: i64) -> Result<EnrollmentCounts, StorageError>;

    /// Inserts or updates the `(student_id, course_id)` row in one atomic
    /// conditional write.
    ///
    /// Returns `Ok(None)` when the row exists and `change.policy` refuses
    /// the transition; the stored row is left untouched in that case.
    async fn upsert_enrollment(
        &self,
        change: &EnrollmentChange,
    ) -> Result<Option<Enrollment>, StorageError>;

    /// Streams the attempts matching `filter`, ordered by attempt id.
    fn attempts<'a>(
        &'a self,
        filter: &'a QuizPerformanceFilter,
    ) -> BoxStream<'a, Result<QuizAttempt, StorageError>>;

    /// Looks up students by id. Unknown ids are absent from the result.
    async fn students_by_ids(&self, ids: &[i64]) -> Result<Vec<Student>, StorageError>;
}
