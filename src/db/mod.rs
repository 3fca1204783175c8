//! Persistence layer. Split into `models` (row shapes `FromRow` derives onto)
//! and `repository` (per-entity query modules).

pub mod models;
pub mod pool;
pub mod repository;
