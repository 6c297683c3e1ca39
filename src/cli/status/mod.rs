//! Status command - key counts and current-hour quota usage

use crate::infrastructure::access::AccessControl;

/// Print a status summary of the configured stores
pub async fn run() -> anyhow::Result<()> {
    let (_config, access) = super::bootstrap().await?;

    let status = execute(&access).await;
    access.shutdown().await;

    super::print_json(&status?)
}

/// Build the status summary as JSON
pub async fn execute(access: &AccessControl) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(access.status().await)?)
}
