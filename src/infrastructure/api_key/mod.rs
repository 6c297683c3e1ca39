//! API Key infrastructure implementations
//!
//! This module provides secret generation and hashing, and the service that
//! owns the persisted key collection.

mod generator;
mod service;

pub use generator::{constant_time_compare, ApiKeyGenerator, GeneratedApiKey};
pub use service::{ApiKeyService, IssuedApiKey};
