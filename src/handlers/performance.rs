// src/handlers/performance.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    config::Config,
    error::AppError,
    models::quiz_attempt::QuizPerformanceFilter,
    services::performance,
    storage::Storage,
    utils::cancel::CancelFlag,
};

/// Quiz performance rollup for staff.
///
/// Every query parameter is an optional narrowing filter. The pass is
/// abandoned with 503 once `aggregation_timeout` elapses.
pub async fn get_quiz_performance(
    State(storage): State<Arc<dyn Storage>>,
    State(config): State<Config>,
    Query(filter): Query<QuizPerformanceFilter>,
) -> Result<impl IntoResponse, AppError> {
    let (cancel, _deadline) = CancelFlag::with_deadline(config.aggregation_timeout);

    let response = performance::aggregate(storage.as_ref(), &filter, &cancel).await?;
    Ok(Json(response))
}
