//! Keys command - API key administration

use clap::{Args, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppConfig;
use crate::domain::api_key::ApiKeyUpdate;
use crate::domain::{DomainError, Metadata};
use crate::infrastructure::access::AccessControl;

#[derive(Subcommand, Clone, Debug)]
pub enum KeysCommand {
    /// Issue a new API key and print its secret once
    Issue(IssueArgs),

    /// List all API keys
    List,

    /// Show one API key with its usage
    Show(ShowArgs),

    /// Change a key's name, limit or state
    Update(UpdateArgs),

    /// Delete an API key; its usage history is kept
    Delete {
        /// ID of the key to delete
        key_id: String,
    },
}

#[derive(Args, Clone, Debug)]
pub struct IssueArgs {
    /// Display name of the key
    #[arg(long)]
    pub name: String,

    /// Requests per hour (defaults to quota.default_hourly_limit)
    #[arg(long)]
    pub limit: Option<u32>,

    /// JSON object stored with the key
    #[arg(long, value_parser = parse_metadata)]
    pub metadata: Option<Metadata>,
}

#[derive(Args, Clone, Debug)]
pub struct ShowArgs {
    /// ID of the key
    pub key_id: String,

    /// Days of usage to aggregate (defaults to usage.default_lookback_days)
    #[arg(long)]
    pub days: Option<u32>,

    /// Number of recent usage records to include
    #[arg(long, default_value_t = 10)]
    pub recent: usize,
}

#[derive(Args, Clone, Debug)]
pub struct UpdateArgs {
    /// ID of the key
    pub key_id: String,

    /// New display name
    #[arg(long)]
    pub name: Option<String>,

    /// New requests-per-hour limit
    #[arg(long)]
    pub limit: Option<u32>,

    /// Re-enable a disabled key
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Disable the key without deleting it
    #[arg(long)]
    pub disable: bool,
}

impl UpdateArgs {
    fn to_update(&self) -> ApiKeyUpdate {
        let active = match (self.enable, self.disable) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };

        ApiKeyUpdate {
            name: self.name.clone(),
            hourly_limit: self.limit,
            active,
        }
    }
}

fn parse_metadata(raw: &str) -> Result<Metadata, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("metadata must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

/// Run a keys subcommand against the configured stores
pub async fn run(command: KeysCommand) -> anyhow::Result<()> {
    let (config, access) = super::bootstrap().await?;

    let result = execute(&access, &config, command).await;
    access.shutdown().await;

    super::print_json(&result?)
}

/// Execute a keys subcommand and return its JSON output
pub async fn execute(
    access: &AccessControl,
    config: &AppConfig,
    command: KeysCommand,
) -> anyhow::Result<Value> {
    match command {
        KeysCommand::Issue(args) => {
            let limit = args.limit.unwrap_or(config.quota.default_hourly_limit);
            let issued = access
                .keys()
                .issue(args.name, limit, args.metadata.unwrap_or_default())
                .await?;

            Ok(json!({
                "key_id": issued.api_key.id().as_str(),
                "secret": issued.secret,
                "name": issued.api_key.name(),
                "rate_limit": issued.api_key.hourly_limit(),
                "note": "Store this secret now; it cannot be retrieved later",
            }))
        }
        KeysCommand::List => Ok(serde_json::to_value(access.keys().list().await)?),
        KeysCommand::Show(args) => {
            let key = access.keys().get(&args.key_id).await.ok_or_else(|| {
                DomainError::not_found(format!("API key '{}' not found", args.key_id))
            })?;

            let days = args.days.unwrap_or(config.usage.default_lookback_days);
            let stats = access.usage().stats(&args.key_id, days).await;
            let recent = access.usage().records_for(&args.key_id, args.recent).await;

            Ok(json!({
                "key": key.summary(),
                "used_this_hour": access.used_this_hour(&args.key_id).await,
                "usage": {
                    "days": days,
                    "stats": stats,
                    "recent": recent,
                },
            }))
        }
        KeysCommand::Update(args) => {
            let update = args.to_update();
            if update.is_empty() {
                anyhow::bail!("Nothing to update; pass --name, --limit, --enable or --disable");
            }

            let updated = access.keys().try_update(&args.key_id, &update).await?;
            Ok(serde_json::to_value(updated.summary())?)
        }
        KeysCommand::Delete { key_id } => {
            let removed = access.keys().try_delete(&key_id).await?;
            info!(key_id = %key_id, "Deleted API key");

            Ok(json!({ "deleted": removed.id().as_str() }))
        }
    }
}
