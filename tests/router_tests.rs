// tests/router_tests.rs

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use lms_backend::{
    config::Config,
    create_router,
    models::enrollment::TransitionPolicy,
    state::AppState,
    storage::MemoryStorage,
    utils::jwt::{ROLE_ADMIN, ROLE_STUDENT, sign_jwt},
};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "router_test_secret";

fn app(storage: MemoryStorage) -> Router {
    create_router(AppState {
        storage: Arc::new(storage),
        config: Config {
            database_url: String::new(),
            jwt_secret: SECRET.to_string(),
            rust_log: "error".to_string(),
            port: 0,
            transition_policy: TransitionPolicy::Permissive,
            aggregation_timeout: Duration::from_secs(30),
        },
    })
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn empty_store_gives_empty_rollups() {
    let admin = sign_jwt(1, ROLE_ADMIN, SECRET, 60).unwrap();

    let response = app(MemoryStorage::new())
        .oneshot(get("/api/quiz-performance", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["stats"]["total_attempts"], 0);
    assert_eq!(body["stats"]["pass_rate"], 0.0);
    assert_eq!(body["quiz_data"], Value::Array(vec![]));
    assert_eq!(body["student_data"], Value::Array(vec![]));
}

#[tokio::test]
async fn empty_leaderboard_is_an_empty_list() {
    let response = app(MemoryStorage::new())
        .oneshot(get("/api/leaderboard?limit=500", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, Value::Array(vec![]));
}

#[tokio::test]
async fn student_without_enrollments_sees_zero_stats() {
    let storage = MemoryStorage::new();
    storage.insert_course(1, "Algebra", true).unwrap();
    storage.insert_course(2, "Archived", false).unwrap();
    let token = sign_jwt(5, ROLE_STUDENT, SECRET, 60).unwrap();

    let response = app(storage)
        .oneshot(get("/api/students/5/enrollment-stats", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["total"], 0);
    assert_eq!(body["not_enrolled"], 1);
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    // Default validation allows 60s of leeway
    let claims = lms_backend::utils::jwt::Claims {
        sub: "5".to_string(),
        role: ROLE_STUDENT.to_string(),
        exp: 1_000,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();

    let response = app(MemoryStorage::new())
        .oneshot(get("/api/students/5/enrollments", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_query_is_rejected() {
    let admin = sign_jwt(1, ROLE_ADMIN, SECRET, 60).unwrap();

    let response = app(MemoryStorage::new())
        .oneshot(get("/api/quiz-performance?status=abandoned", Some(&admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
