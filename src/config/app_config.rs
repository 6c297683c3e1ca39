use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::api_key::DEFAULT_HOURLY_LIMIT;
use crate::infrastructure::storage::StorageType;
use crate::infrastructure::usage::LedgerConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub quota: QuotaConfig,
    pub usage: UsageConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Where the key collection and the usage ledger live
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageType,
    pub data_dir: PathBuf,
    pub keys_file: String,
    pub usage_file: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Limit given to keys issued without an explicit one
    pub default_hourly_limit: u32,
    /// Seconds between background sweeps of stale counter cells
    pub prune_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UsageConfig {
    pub max_records: usize,
    pub flush_every: usize,
    pub flush_interval_secs: u64,
    pub default_lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Reject requests that carry no usable credential
    pub require_auth: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageType::default(),
            data_dir: PathBuf::from("data"),
            keys_file: "api_keys.json".to_string(),
            usage_file: "api_usage.json".to_string(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_hourly_limit: DEFAULT_HOURLY_LIMIT,
            prune_interval_secs: 300,
        }
    }
}

impl Default for UsageConfig {
    fn default() -> Self {
        let ledger = LedgerConfig::default();

        Self {
            max_records: ledger.max_records,
            flush_every: ledger.flush_every,
            flush_interval_secs: ledger.flush_interval.as_secs(),
            default_lookback_days: 30,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { require_auth: true }
    }
}

impl StorageConfig {
    pub fn keys_path(&self) -> PathBuf {
        self.data_dir.join(&self.keys_file)
    }

    pub fn usage_path(&self) -> PathBuf {
        self.data_dir.join(&self.usage_file)
    }
}

impl QuotaConfig {
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.prune_interval_secs.max(1))
    }
}

impl UsageConfig {
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_max_records(self.max_records)
            .with_flush_every(self.flush_every)
            .with_flush_interval(Duration::from_secs(self.flush_interval_secs))
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
