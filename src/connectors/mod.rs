// src/connectors/mod.rs
pub mod alpaca;
pub mod messages;
pub mod oracle;
pub mod traits;
