//! API Key entity and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_api_key_id, ApiKeyValidationError};
use crate::domain::Metadata;

/// Requests per hour granted to a key when none is specified
pub const DEFAULT_HOURLY_LIMIT: u32 = 100;

fn default_hourly_limit() -> u32 {
    DEFAULT_HOURLY_LIMIT
}

fn default_active() -> bool {
    true
}

/// API Key identifier - URL-safe base64 alphabet, max 64 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApiKeyId(String);

impl ApiKeyId {
    /// Create a new ApiKeyId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, ApiKeyValidationError> {
        let id = id.into();
        validate_api_key_id(&id)?;
        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ApiKeyId {
    type Error = ApiKeyValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ApiKeyId> for String {
    fn from(id: ApiKeyId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a stored key
///
/// Deleted keys are removed outright, so only the two live states exist here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    Disabled,
}

impl std::fmt::Display for ApiKeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// API Key entity
///
/// Serialized field names follow the on-disk key collection format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    key_id: ApiKeyId,
    /// Hex SHA-256 of the plaintext secret; never leaves the credential store
    /// except through persistence.
    secret_hash: String,
    name: String,
    created_at: DateTime<Utc>,
    #[serde(rename = "last_used", default)]
    last_used_at: Option<DateTime<Utc>>,
    #[serde(rename = "rate_limit", default = "default_hourly_limit")]
    hourly_limit: u32,
    #[serde(rename = "is_active", default = "default_active")]
    active: bool,
    #[serde(default)]
    metadata: Metadata,
}

impl ApiKey {
    /// Create a new, active API key
    pub fn new(key_id: ApiKeyId, name: impl Into<String>, secret_hash: impl Into<String>) -> Self {
        Self {
            key_id,
            secret_hash: secret_hash.into(),
            name: name.into(),
            created_at: Utc::now(),
            last_used_at: None,
            hourly_limit: DEFAULT_HOURLY_LIMIT,
            active: true,
            metadata: Metadata::new(),
        }
    }

    /// Set the hourly request limit
    pub fn with_hourly_limit(mut self, hourly_limit: u32) -> Self {
        self.hourly_limit = hourly_limit;
        self
    }

    /// Set metadata
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.key_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn hourly_limit(&self) -> u32 {
        self.hourly_limit
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn status(&self) -> ApiKeyStatus {
        if self.active {
            ApiKeyStatus::Active
        } else {
            ApiKeyStatus::Disabled
        }
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    // Mutators

    /// Apply a partial update, returning whether anything changed
    pub fn apply(&mut self, update: &ApiKeyUpdate) -> bool {
        let mut changed = false;

        if let Some(name) = &update.name {
            changed |= self.name != *name;
            self.name = name.clone();
        }

        if let Some(limit) = update.hourly_limit {
            changed |= self.hourly_limit != limit;
            self.hourly_limit = limit;
        }

        if let Some(active) = update.active {
            changed |= self.active != active;
            self.active = active;
        }

        changed
    }

    /// Record a successful validation
    pub fn record_usage(&mut self) {
        self.last_used_at = Some(Utc::now());
    }

    /// Public view of the key, without its secret hash
    pub fn summary(&self) -> ApiKeySummary {
        ApiKeySummary {
            key_id: self.key_id.to_string(),
            name: self.name.clone(),
            created_at: self.created_at,
            last_used: self.last_used_at,
            rate_limit: self.hourly_limit,
            is_active: self.active,
            status: self.status(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Partial update of an API key; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiKeyUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "rate_limit")]
    pub hourly_limit: Option<u32>,
    #[serde(default, alias = "is_active")]
    pub active: Option<bool>,
}

impl ApiKeyUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hourly_limit(mut self, hourly_limit: u32) -> Self {
        self.hourly_limit = Some(hourly_limit);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.hourly_limit.is_none() && self.active.is_none()
    }
}

/// Listing view of an API key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiKeySummary {
    pub key_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub rate_limit: u32,
    pub is_active: bool,
    pub status: ApiKeyStatus,
    pub metadata: Metadata,
}
