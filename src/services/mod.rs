// src/services/mod.rs

pub mod enrollment;
pub mod leaderboard;
pub mod performance;
pub mod score_category;
