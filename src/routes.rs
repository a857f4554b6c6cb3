// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{enrollment, leaderboard, performance},
    state::AppState,
    utils::jwt::{auth_middleware, staff_middleware},
};

/// Assembles the main application router.
///
/// * Student routes require a bearer token; handlers check self-or-staff.
/// * Quiz performance is staff only.
/// * Leaderboards are public.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let student_routes = Router::new()
        .route("/{id}/enrollments", get(enrollment::list_student_enrollments))
        .route("/{id}/courses", get(enrollment::list_courses_with_status))
        .route("/{id}/enrollment-stats", get(enrollment::get_enrollment_stats))
        .route(
            "/{id}/courses/{course_id}/enrollment",
            put(enrollment::update_enrollment_status),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Auth first, then the staff check
    let staff_routes = Router::new()
        .route("/api/quiz-performance", get(performance::get_quiz_performance))
        .layer(middleware::from_fn(staff_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let public_routes = Router::new()
        .route("/api/leaderboard", get(leaderboard::get_leaderboard))
        .route(
            "/api/classes/{id}/leaderboard",
            get(leaderboard::get_class_leaderboard),
        );

    Router::new()
        .nest("/api/students", student_routes)
        .merge(staff_routes)
        .merge(public_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
