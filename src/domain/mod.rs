//! Domain layer - credentials, quota and usage entities

pub mod api_key;
pub mod error;
pub mod quota;
pub mod storage;
pub mod usage;

pub use api_key::{ApiKey, ApiKeyId, ApiKeyStatus, ApiKeySummary, ApiKeyUpdate};
pub use error::DomainError;
pub use quota::AdmitResult;
pub use usage::{UsageRecord, UsageStats};

/// Open string-keyed metadata attached to keys and usage records
pub type Metadata = serde_json::Map<String, serde_json::Value>;
