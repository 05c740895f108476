//! # caphealth
//!
//! The capability health binary crate: clap CLI, axum HTTP API and TOML
//! configuration over `caphealth-core`. Exposed as a library so the API can
//! be exercised in integration tests.

pub mod api;
pub mod cli;
pub mod config;
