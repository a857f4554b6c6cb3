// src/storage/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::{FromRow, PgPool};

use crate::models::{
    course::{Course, CourseSummary},
    enrollment::{
        Enrollment, EnrollmentChange, EnrollmentCounts, EnrollmentStatus, StudentEnrollment,
        TransitionPolicy,
    },
    quiz_attempt::{QuizAttempt, QuizPerformanceFilter},
    student::Student,
};

use super::{Storage, StorageError};

/// Postgres-backed storage.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Helper struct for the enrollment/course join.
#[derive(FromRow)]
struct StudentEnrollmentRow {
    id: i64,
    student_id: i64,
    course_id: i64,
    #[sqlx(try_from = "String")]
    status: EnrollmentStatus,
    progress_percentage: i32,
    enrolled_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    course_title: String,
    course_description: Option<String>,
    course_is_active: bool,
}

impl From<StudentEnrollmentRow> for StudentEnrollment {
    fn from(row: StudentEnrollmentRow) -> Self {
        StudentEnrollment {
            course: CourseSummary {
                id: row.course_id,
                title: row.course_title,
                description: row.course_description,
                is_active: row.course_is_active,
            },
            enrollment: Enrollment {
                id: row.id,
                student_id: row.student_id,
                course_id: row.course_id,
                status: row.status,
                progress_percentage: row.progress_percentage,
                enrolled_at: row.enrolled_at,
                completed_at: row.completed_at,
                updated_at: row.updated_at,
            },
        }
    }
}

// Single statement: ON CONFLICT serializes concurrent writers on the unique
// key, and the DO UPDATE ... WHERE refuses regressions under ForwardOnly.
// A refused update returns no row.
const UPSERT_ENROLLMENT_SQL: &str = r#"
    INSERT INTO enrollments
        (student_id, course_id, status, progress_percentage, enrolled_at, completed_at, updated_at)
    VALUES (
        $1,
        $2,
        $3::TEXT,
        COALESCE($4::INTEGER, 0),
        CASE WHEN $3::TEXT <> 'not_enrolled' THEN $7::TIMESTAMPTZ END,
        CASE WHEN $3::TEXT = 'completed' THEN $7::TIMESTAMPTZ END,
        $7::TIMESTAMPTZ
    )
    ON CONFLICT (student_id, course_id) DO UPDATE SET
        status = EXCLUDED.status,
        progress_percentage = COALESCE($4::INTEGER, enrollments.progress_percentage),
        enrolled_at = COALESCE(enrollments.enrolled_at, EXCLUDED.enrolled_at),
        completed_at = CASE
            WHEN EXCLUDED.status = 'completed'
                THEN COALESCE(enrollments.completed_at, EXCLUDED.completed_at)
        END,
        updated_at = EXCLUDED.updated_at
    WHERE NOT $5::BOOLEAN
       OR (CASE enrollments.status
               WHEN 'not_enrolled' THEN 0
               WHEN 'enrolled' THEN 1
               ELSE 2
           END) <= $6::INTEGER
    RETURNING
        id, student_id, course_id, status, progress_percentage,
        enrolled_at, completed_at, updated_at
"#;

const ATTEMPTS_SQL: &str = r#"
    SELECT
        id, student_id, quiz_id, topic_id, course_id, course_level_id,
        school_id, class_id, score, max_score, percentage,
        completed, passed, created_at, completed_at
    FROM quiz_attempts
    WHERE ($1::BIGINT IS NULL OR school_id = $1)
      AND ($2::BIGINT IS NULL OR class_id = $2)
      AND ($3::BIGINT IS NULL OR course_id = $3)
      AND ($4::BIGINT IS NULL OR course_level_id = $4)
      AND ($5::BIGINT IS NULL OR topic_id = $5)
      AND ($6::BIGINT IS NULL OR quiz_id = $6)
      AND ($7::DATE IS NULL
           OR (COALESCE(completed_at, created_at) AT TIME ZONE 'UTC')::DATE >= $7)
      AND ($8::DATE IS NULL
           OR (COALESCE(completed_at, created_at) AT TIME ZONE 'UTC')::DATE <= $8)
      AND CASE $9::TEXT
              WHEN 'passed' THEN completed AND passed
              WHEN 'failed' THEN completed AND NOT passed
              WHEN 'in_progress' THEN NOT completed
              ELSE TRUE
          END
    ORDER BY id
"#;

#[async_trait]
impl Storage for PgStorage {
    async fn student_enrollments(
        &self,
        student_id: i64,
    ) -> Result<Vec<StudentEnrollment>, StorageError> {
        let rows = sqlx::query_as::<_, StudentEnrollmentRow>(
            r#"
            SELECT
                e.id, e.student_id, e.course_id, e.status, e.progress_percentage,
                e.enrolled_at, e.completed_at, e.updated_at,
                c.title AS course_title,
                c.description AS course_description,
                c.is_active AS course_is_active
            FROM enrollments e
            JOIN courses c ON c.id = e.course_id
            WHERE e.student_id = $1
            ORDER BY e.updated_at DESC, e.id DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(StudentEnrollment::from).collect())
    }

    async fn active_courses(&self) -> Result<Vec<Course>, StorageError> {
        let courses = sqlx::query_as::<_, Course>(
            r#"
            SELECT id, title, description, course_level_id, is_active, created_at
            FROM courses
            WHERE is_active
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(courses)
    }

    async fn count_active_courses(&self) -> Result<i64, StorageError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE is_active")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn enrollment_counts(&self, student_id: i64) -> Result<EnrollmentCounts, StorageError> {
        let counts = sqlx::query_as::<_, EnrollmentCounts>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'enrolled') AS enrolled,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed
            FROM enrollments
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }

    async fn upsert_enrollment(
        &self,
        change: &EnrollmentChange,
    ) -> Result<Option<Enrollment>, StorageError> {
        let enrollment = sqlx::query_as::<_, Enrollment>(UPSERT_ENROLLMENT_SQL)
            .bind(change.student_id)
            .bind(change.course_id)
            .bind(change.status.as_str())
            .bind(change.progress_percentage)
            .bind(change.policy == TransitionPolicy::ForwardOnly)
            .bind(change.status.ordinal())
            .bind(change.at)
            .fetch_optional(&self.pool)
            .await?;

        Ok(enrollment)
    }

    fn attempts<'a>(
        &'a self,
        filter: &'a QuizPerformanceFilter,
    ) -> BoxStream<'a, Result<QuizAttempt, StorageError>> {
        sqlx::query_as::<_, QuizAttempt>(ATTEMPTS_SQL)
            .bind(filter.school_id)
            .bind(filter.class_id)
            .bind(filter.course_id)
            .bind(filter.course_level_id)
            .bind(filter.topic_id)
            .bind(filter.quiz_id)
            .bind(filter.date_from)
            .bind(filter.date_to)
            .bind(filter.status.as_str())
            .fetch(&self.pool)
            .map(|row| row.map_err(StorageError::from))
            .boxed()
    }

    async fn students_by_ids(&self, ids: &[i64]) -> Result<Vec<Student>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let students = sqlx::query_as::<_, Student>(
            r#"
            SELECT id, full_name, school_id, class_id
            FROM students
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(students)
    }
}
