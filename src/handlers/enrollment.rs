// src/handlers/enrollment.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    models::enrollment::UpdateEnrollmentRequest,
    services::enrollment,
    storage::Storage,
    utils::jwt::Claims,
};

/// List a student's enrollments with their course summaries.
pub async fn list_student_enrollments(
    State(storage): State<Arc<dyn Storage>>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    claims.ensure_can_access_student(student_id)?;

    let enrollments = enrollment::student_enrollments(storage.as_ref(), student_id).await?;
    Ok(Json(enrollments))
}

/// List every active course with the student's enrollment status.
/// Courses the student never touched show up as `not_enrolled`.
pub async fn list_courses_with_status(
    State(storage): State<Arc<dyn Storage>>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    claims.ensure_can_access_student(student_id)?;

    let courses =
        enrollment::courses_with_enrollment_status(storage.as_ref(), student_id).await?;
    Ok(Json(courses))
}

pub async fn get_enrollment_stats(
    State(storage): State<Arc<dyn Storage>>,
    Extension(claims): Extension<Claims>,
    Path(student_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    claims.ensure_can_access_student(student_id)?;

    let stats = enrollment::enrollment_stats(storage.as_ref(), student_id).await?;
    Ok(Json(stats))
}

/// Set the enrollment status of a student for one course.
///
/// Creates the enrollment on first use. Returns the stored row.
pub async fn update_enrollment_status(
    State(storage): State<Arc<dyn Storage>>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path((student_id, course_id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateEnrollmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    claims.ensure_can_access_student(student_id)?;
    payload.validate()?;

    let updated = enrollment::update_enrollment_status(
        storage.as_ref(),
        config.transition_policy,
        student_id,
        course_id,
        &payload.status,
        payload.progress_percentage,
    )
    .await?;

    Ok(Json(updated))
}
