// src/config.rs

use std::{env, time::Duration};

use dotenvy::dotenv;

use crate::models::enrollment::TransitionPolicy;

/// Rows returned by leaderboard endpoints when no limit is given.
pub const DEFAULT_LEADERBOARD_LIMIT: i64 = 10;
pub const MAX_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub rust_log: String,
    pub port: u16,
    pub transition_policy: TransitionPolicy,
    /// Upper bound for one aggregation pass behind an HTTP request.
    pub aggregation_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let transition_policy = env::var("ENROLLMENT_TRANSITIONS")
            .map(|v| v.parse().expect("ENROLLMENT_TRANSITIONS must be 'permissive' or 'forward_only'"))
            .unwrap_or_default();

        let aggregation_timeout = env::var("AGGREGATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Self {
            database_url,
            jwt_secret,
            rust_log,
            port,
            transition_policy,
            aggregation_timeout,
        }
    }
}
