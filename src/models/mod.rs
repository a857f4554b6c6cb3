// src/models/mod.rs

pub mod course;
pub mod enrollment;
pub mod leaderboard;
pub mod performance;
pub mod quiz_attempt;
pub mod student;
