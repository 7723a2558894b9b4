// src/strategies/mod.rs
pub mod prediction;
pub mod traits;
