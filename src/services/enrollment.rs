// src/services/enrollment.rs

use std::collections::HashMap;

use chrono::Utc;

use crate::{
    error::AppError,
    models::{
        course::CourseSummary,
        enrollment::{
            CourseWithEnrollment, Enrollment, EnrollmentChange, EnrollmentStats,
            EnrollmentStatus, StudentEnrollment, TransitionPolicy,
        },
    },
    storage::{Storage, StorageError},
};

/// Maps storage failures of enrollment operations onto the error taxonomy.
/// Everything except a unique-key race reads as "not found" to the caller.
fn storage_failure(context: String, err: StorageError) -> AppError {
    match err {
        StorageError::UniqueViolation(msg) => {
            tracing::warn!("{}: unresolved upsert race: {}", context, msg);
            AppError::Conflict(context)
        }
        StorageError::ForeignKeyViolation(msg) => AppError::NotFound(msg),
        other => {
            tracing::error!("{}: {}", context, other);
            AppError::NotFound(context)
        }
    }
}

pub fn validate_progress(progress: i32) -> Result<(), AppError> {
    if !(0..=100).contains(&progress) {
        return Err(AppError::Validation(format!(
            "progress_percentage {progress} must be between 0 and 100"
        )));
    }
    Ok(())
}

/// All enrollment rows of a student with their course summaries.
/// An empty list is a valid answer.
pub async fn student_enrollments(
    storage: &dyn Storage,
    student_id: i64,
) -> Result<Vec<StudentEnrollment>, AppError> {
    storage
        .student_enrollments(student_id)
        .await
        .map_err(|e| {
            storage_failure(
                format!("Enrollments for student {student_id} could not be loaded"),
                e,
            )
        })
}

/// Every active course, annotated with the student's enrollment or the
/// `not_enrolled` defaults. The result has one entry per active course.
pub async fn courses_with_enrollment_status(
    storage: &dyn Storage,
    student_id: i64,
) -> Result<Vec<CourseWithEnrollment>, AppError> {
    let courses = storage.active_courses().await.map_err(|e| {
        storage_failure("Active courses could not be loaded".to_string(), e)
    })?;
    let enrollments = student_enrollments(storage, student_id).await?;

    let mut by_course: HashMap<i64, Enrollment> = enrollments
        .into_iter()
        .map(|se| (se.enrollment.course_id, se.enrollment))
        .collect();

    let annotated = courses
        .iter()
        .map(|course| match by_course.remove(&course.id) {
            Some(enrollment) => CourseWithEnrollment {
                course: CourseSummary::from(course),
                enrollment_id: Some(enrollment.id),
                status: enrollment.status,
                progress_percentage: enrollment.progress_percentage,
                enrolled_at: enrollment.enrolled_at,
                completed_at: enrollment.completed_at,
            },
            None => CourseWithEnrollment {
                course: CourseSummary::from(course),
                enrollment_id: None,
                status: EnrollmentStatus::NotEnrolled,
                progress_percentage: 0,
                enrolled_at: None,
                completed_at: None,
            },
        })
        .collect();

    Ok(annotated)
}

/// Sets a student's status for a course, creating the enrollment on first use.
///
/// * `status` must be one of the three wire names.
/// * `progress_percentage` is only written when supplied.
/// * The write is a single conditional upsert; under `ForwardOnly` a
///   regression is refused with `Conflict` and the row is left as it was.
pub async fn update_enrollment_status(
    storage: &dyn Storage,
    policy: TransitionPolicy,
    student_id: i64,
    course_id: i64,
    status: &str,
    progress_percentage: Option<i32>,
) -> Result<Enrollment, AppError> {
    let status = status
        .parse::<EnrollmentStatus>()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if let Some(progress) = progress_percentage {
        validate_progress(progress)?;
    }

    let change = EnrollmentChange {
        student_id,
        course_id,
        status,
        progress_percentage,
        policy,
        at: Utc::now(),
    };

    let written = storage.upsert_enrollment(&change).await.map_err(|e| {
        storage_failure(
            format!("Enrollment of student {student_id} in course {course_id} could not be saved"),
            e,
        )
    })?;

    match written {
        Some(enrollment) => {
            tracing::info!(
                student_id,
                course_id,
                status = %enrollment.status,
                progress = enrollment.progress_percentage,
                "Enrollment updated"
            );
            Ok(enrollment)
        }
        None => {
            tracing::warn!(
                student_id,
                course_id,
                requested = %status,
                "Enrollment transition refused"
            );
            Err(AppError::Conflict(format!(
                "Enrollment of student {student_id} in course {course_id} cannot move back to '{status}'"
            )))
        }
    }
}

/// Per-status counts for a student. `not_enrolled` is the number of active
/// courses without a row, floored at zero because rows may point at courses
/// that have since been deactivated.
pub async fn enrollment_stats(
    storage: &dyn Storage,
    student_id: i64,
) -> Result<EnrollmentStats, AppError> {
    let context = || format!("Enrollment stats for student {student_id} could not be loaded");
    let counts = storage
        .enrollment_counts(student_id)
        .await
        .map_err(|e| storage_failure(context(), e))?;
    let active_courses = storage
        .count_active_courses()
        .await
        .map_err(|e| storage_failure(context(), e))?;

    Ok(EnrollmentStats {
        total: counts.total,
        enrolled: counts.enrolled,
        completed: counts.completed,
        not_enrolled: (active_courses - counts.total).max(0),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{models::student::Student, storage::MemoryStorage};

    fn seeded(courses: i64) -> MemoryStorage {
        let storage = MemoryStorage::new();
        for id in 1..=courses {
            storage.insert_course(id, &format!("Course {id}"), true).unwrap();
        }
        for id in [10, 11] {
            storage
                .insert_student(Student {
                    id,
                    full_name: format!("Student {id}"),
                    school_id: Some(1),
                    class_id: Some(1),
                })
                .unwrap();
        }
        storage
    }

    #[tokio::test]
    async fn first_update_creates_row_with_default_progress() {
        let storage = seeded(2);
        let row = update_enrollment_status(&storage, TransitionPolicy::Permissive, 10, 1, "enrolled", None)
            .await
            .unwrap();
        assert_eq!(row.status, EnrollmentStatus::Enrolled);
        assert_eq!(row.progress_percentage, 0);
        assert!(row.enrolled_at.is_some());
    }

    #[tokio::test]
    async fn omitted_progress_is_left_untouched() {
        let storage = seeded(1);
        let policy = TransitionPolicy::Permissive;
        update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(45)).await.unwrap();
        let row = update_enrollment_status(&storage, policy, 10, 1, "completed", None)
            .await
            .unwrap();
        assert_eq!(row.status, EnrollmentStatus::Completed);
        assert_eq!(row.progress_percentage, 45);
        assert!(row.completed_at.is_some());
    }

    #[tokio::test]
    async fn repeated_update_is_idempotent() {
        let storage = seeded(1);
        let policy = TransitionPolicy::Permissive;
        let first = update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(30))
            .await
            .unwrap();
        let second = update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(30))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, second.status);
        assert_eq!(first.progress_percentage, second.progress_percentage);
        assert_eq!(first.enrolled_at, second.enrolled_at);
        assert_eq!(storage.enrollment_total().unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_writing() {
        let storage = seeded(1);
        let policy = TransitionPolicy::Permissive;

        let bad_status = update_enrollment_status(&storage, policy, 10, 1, "dropped", None).await;
        assert!(matches!(bad_status, Err(AppError::Validation(_))));

        let bad_progress = update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(-1)).await;
        assert!(matches!(bad_progress, Err(AppError::Validation(_))));

        let too_high = update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(101)).await;
        assert!(matches!(too_high, Err(AppError::Validation(_))));

        assert_eq!(storage.enrollment_total().unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_course_is_not_found() {
        let storage = seeded(1);
        let result =
            update_enrollment_status(&storage, TransitionPolicy::Permissive, 10, 42, "enrolled", None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn permissive_policy_allows_regression() {
        let storage = seeded(1);
        let policy = TransitionPolicy::Permissive;
        update_enrollment_status(&storage, policy, 10, 1, "completed", Some(100)).await.unwrap();
        let row = update_enrollment_status(&storage, policy, 10, 1, "enrolled", None)
            .await
            .unwrap();
        assert_eq!(row.status, EnrollmentStatus::Enrolled);
        assert!(row.completed_at.is_none());
    }

    #[tokio::test]
    async fn forward_only_policy_refuses_regression() {
        let storage = seeded(1);
        let policy = TransitionPolicy::ForwardOnly;
        update_enrollment_status(&storage, policy, 10, 1, "completed", Some(100)).await.unwrap();

        let refused = update_enrollment_status(&storage, policy, 10, 1, "enrolled", Some(10)).await;
        assert!(matches!(refused, Err(AppError::Conflict(_))));

        let rows = student_enrollments(&storage, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].enrollment.status, EnrollmentStatus::Completed);
        assert_eq!(rows[0].enrollment.progress_percentage, 100);

        let same = update_enrollment_status(&storage, policy, 10, 1, "completed", None).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn concurrent_upserts_leave_one_row() {
        let storage = Arc::new(seeded(1));
        let mut handles = Vec::new();
        for progress in 0..16 {
            let storage = Arc::clone(&storage);
            handles.push(tokio::spawn(async move {
                update_enrollment_status(
                    storage.as_ref(),
                    TransitionPolicy::Permissive,
                    10,
                    1,
                    "enrolled",
                    Some(progress * 5),
                )
                .await
            }));
        }

        let mut written = Vec::new();
        for handle in handles {
            written.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(storage.enrollment_total().unwrap(), 1);
        let id = written[0].id;
        assert!(written.iter().all(|row| row.id == id));

        // The stored row is exactly what the last committed write returned.
        let stored = student_enrollments(storage.as_ref(), 10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(written.iter().any(|row| *row == stored[0].enrollment));
    }

    #[tokio::test]
    async fn all_courses_view_matches_active_course_count() {
        let storage = seeded(4);
        let none = courses_with_enrollment_status(&storage, 10).await.unwrap();
        assert_eq!(none.len(), 4);
        assert!(none
            .iter()
            .all(|c| c.status == EnrollmentStatus::NotEnrolled && c.progress_percentage == 0));

        let policy = TransitionPolicy::Permissive;
        update_enrollment_status(&storage, policy, 10, 2, "enrolled", Some(20)).await.unwrap();
        update_enrollment_status(&storage, policy, 10, 3, "completed", Some(100)).await.unwrap();

        let some = courses_with_enrollment_status(&storage, 10).await.unwrap();
        assert_eq!(some.len(), 4);
        let course_two = some.iter().find(|c| c.course.id == 2).unwrap();
        assert_eq!(course_two.status, EnrollmentStatus::Enrolled);
        assert_eq!(course_two.progress_percentage, 20);
    }

    #[tokio::test]
    async fn all_courses_view_skips_rows_for_inactive_courses() {
        let storage = seeded(3);
        let policy = TransitionPolicy::Permissive;
        update_enrollment_status(&storage, policy, 10, 3, "enrolled", None).await.unwrap();
        storage.set_course_active(3, false).unwrap();

        let view = courses_with_enrollment_status(&storage, 10).await.unwrap();
        assert_eq!(view.len(), 2);
        assert!(view.iter().all(|c| c.course.id != 3));

        let rows = student_enrollments(&storage, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].course.is_active);
    }

    #[tokio::test]
    async fn stats_count_rows_and_floor_not_enrolled() {
        let storage = seeded(3);
        let policy = TransitionPolicy::Permissive;
        update_enrollment_status(&storage, policy, 10, 1, "enrolled", None).await.unwrap();
        update_enrollment_status(&storage, policy, 10, 2, "completed", None).await.unwrap();
        update_enrollment_status(&storage, policy, 10, 3, "not_enrolled", None).await.unwrap();

        let stats = enrollment_stats(&storage, 10).await.unwrap();
        assert_eq!(
            stats,
            EnrollmentStats {
                total: 3,
                enrolled: 1,
                completed: 1,
                not_enrolled: 0,
            }
        );

        // Rows for deactivated courses must not push not_enrolled below zero.
        storage.set_course_active(1, false).unwrap();
        storage.set_course_active(2, false).unwrap();
        let stats = enrollment_stats(&storage, 10).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.not_enrolled, 0);
    }

    #[tokio::test]
    async fn stats_for_student_without_rows() {
        let storage = seeded(5);
        let stats = enrollment_stats(&storage, 11).await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.not_enrolled, 5);
    }
}
