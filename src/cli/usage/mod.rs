//! Usage command - usage statistics

use clap::{Args, Subcommand};
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::infrastructure::access::AccessControl;

#[derive(Subcommand, Clone, Debug)]
pub enum UsageCommand {
    /// Aggregate usage for one key, or every key in the ledger
    Stats(StatsArgs),
}

#[derive(Args, Clone, Debug)]
pub struct StatsArgs {
    /// Restrict to one key ID
    #[arg(long = "key")]
    pub key_id: Option<String>,

    /// Days to look back (defaults to usage.default_lookback_days)
    #[arg(long)]
    pub days: Option<u32>,
}

/// Run a usage subcommand against the configured stores
pub async fn run(command: UsageCommand) -> anyhow::Result<()> {
    let (config, access) = super::bootstrap().await?;

    let result = execute(&access, &config, command).await;
    access.shutdown().await;

    super::print_json(&result?)
}

/// Execute a usage subcommand and return its JSON output
pub async fn execute(
    access: &AccessControl,
    config: &AppConfig,
    command: UsageCommand,
) -> anyhow::Result<Value> {
    match command {
        UsageCommand::Stats(args) => {
            let days = args.days.unwrap_or(config.usage.default_lookback_days);

            let stats = match args.key_id {
                Some(key_id) => {
                    let stats = access.usage().stats(&key_id, days).await;
                    let mut keys = serde_json::Map::new();
                    keys.insert(key_id, serde_json::to_value(stats)?);
                    Value::Object(keys)
                }
                None => serde_json::to_value(access.usage().all_stats(days).await)?,
            };

            Ok(json!({ "days": days, "keys": stats }))
        }
    }
}
