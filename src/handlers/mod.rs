// src/handlers/mod.rs

pub mod enrollment;
pub mod leaderboard;
pub mod performance;
