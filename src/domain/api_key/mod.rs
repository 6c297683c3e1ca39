//! API Key domain
//!
//! Domain types for credential management: the stored key, its lifecycle
//! state, partial updates, and the persisted collection shape.

mod entity;
mod repository;
mod validation;

pub use entity::{ApiKey, ApiKeyId, ApiKeyStatus, ApiKeySummary, ApiKeyUpdate, DEFAULT_HOURLY_LIMIT};
pub use repository::{ApiKeySnapshot, ApiKeyStore};
pub use validation::{
    is_well_formed_secret, validate_api_key_id, validate_api_key_name, ApiKeyValidationError,
    MAX_SECRET_LENGTH,
};
