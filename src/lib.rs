//! PMP Access Control
//!
//! An access-control plane for an HTTP backend:
//! - API key issuing and validation with hashed secrets
//! - Per-key hourly quotas with race-free admission
//! - A bounded usage ledger with per-key statistics
//! - An axum middleware tying the three to a host router

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use infrastructure::access::AccessControl;
