//! API key validation utilities

use thiserror::Error;

/// Errors that can occur while validating API key identifiers and input
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key ID cannot be empty")]
    EmptyId,

    #[error("API key ID exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("API key ID contains invalid character: '{0}'. Only alphanumeric characters, hyphens and underscores are allowed")]
    InvalidCharacter(char),

    #[error("API key name cannot be empty")]
    EmptyName,

    #[error("API key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),
}

const MAX_API_KEY_ID_LENGTH: usize = 64;
const MAX_API_KEY_NAME_LENGTH: usize = 200;

/// Longest plaintext secret accepted by validation
pub const MAX_SECRET_LENGTH: usize = 512;

/// Validate an API key ID
///
/// Generated IDs are URL-safe base64, so the accepted alphabet is
/// alphanumerics plus `-` and `_`.
pub fn validate_api_key_id(id: &str) -> Result<(), ApiKeyValidationError> {
    if id.is_empty() {
        return Err(ApiKeyValidationError::EmptyId);
    }

    if id.len() > MAX_API_KEY_ID_LENGTH {
        return Err(ApiKeyValidationError::TooLong(MAX_API_KEY_ID_LENGTH));
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(ApiKeyValidationError::InvalidCharacter(c));
    }

    Ok(())
}

/// Validate a display name
pub fn validate_api_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    if name.trim().is_empty() {
        return Err(ApiKeyValidationError::EmptyName);
    }

    if name.chars().count() > MAX_API_KEY_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_API_KEY_NAME_LENGTH));
    }

    Ok(())
}

/// Whether a presented secret is worth hashing at all
///
/// Empty, over-long, or whitespace/control-bearing input can never match an
/// issued key.
pub fn is_well_formed_secret(secret: &str) -> bool {
    !secret.is_empty()
        && secret.len() <= MAX_SECRET_LENGTH
        && secret.bytes().all(|b| b.is_ascii_graphic())
}
