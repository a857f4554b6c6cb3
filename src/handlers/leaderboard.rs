// src/handlers/leaderboard.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use crate::{
    config::Config,
    error::AppError,
    models::leaderboard::{LeaderboardParams, LeaderboardScope},
    services::leaderboard::{effective_limit, leaderboard},
    storage::Storage,
    utils::cancel::CancelFlag,
};

/// Get the global leaderboard.
///
/// Ranks students by total points, then average score.
pub async fn get_leaderboard(
    State(storage): State<Arc<dyn Storage>>,
    State(config): State<Config>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let (cancel, _deadline) = CancelFlag::with_deadline(config.aggregation_timeout);
    let limit = effective_limit(params.limit);

    let entries = leaderboard(storage.as_ref(), LeaderboardScope::Global, limit, &cancel).await?;
    Ok(Json(entries))
}

/// Get the leaderboard of a single class.
pub async fn get_class_leaderboard(
    State(storage): State<Arc<dyn Storage>>,
    State(config): State<Config>,
    Path(class_id): Path<i64>,
    Query(params): Query<LeaderboardParams>,
) -> Result<impl IntoResponse, AppError> {
    let (cancel, _deadline) = CancelFlag::with_deadline(config.aggregation_timeout);
    let limit = effective_limit(params.limit);

    let entries = leaderboard(
        storage.as_ref(),
        LeaderboardScope::Class(class_id),
        limit,
        &cancel,
    )
    .await?;
    Ok(Json(entries))
}
