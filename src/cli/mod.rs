//! CLI module for PMP Access Control
//!
//! Administrative subcommands over the persisted key collection and usage
//! ledger:
//! - `keys`: issue, list, show, update and delete API keys
//! - `usage`: usage statistics per key
//! - `status`: key counts and current-hour quota usage

pub mod keys;
pub mod status;
pub mod usage;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::AppConfig;
use crate::infrastructure::access::AccessControl;
use crate::infrastructure::logging;

/// PMP Access Control - API keys, hourly quotas and usage tracking
#[derive(Parser)]
#[command(name = "pmp-access-control")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage API keys
    #[command(subcommand)]
    Keys(keys::KeysCommand),

    /// Inspect recorded usage
    #[command(subcommand)]
    Usage(usage::UsageCommand),

    /// Show key counts and current-hour usage
    Status,
}

/// Load configuration, start logging and open the stores
pub async fn bootstrap() -> anyhow::Result<(AppConfig, AccessControl)> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    let access = AccessControl::from_config(&config).await;
    Ok((config, access))
}

/// Write a value to stdout as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
