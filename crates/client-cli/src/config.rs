//! Client Configuration

use anyhow::{Context, Result};
use rpc_client::{rpc_types::CommitmentLevel, ConnectionConfig};
use std::path::Path;

/// Load the connection config from an optional JSON file, then apply flag overrides
pub fn load_config(
    path: Option<&Path>,
    commitment: Option<CommitmentLevel>,
    ws_url: Option<&str>,
) -> Result<ConnectionConfig> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => ConnectionConfig::default(),
    };

    if commitment.is_some() {
        config.commitment = commitment;
    }
    if let Some(ws_url) = ws_url {
        config.ws_endpoint = Some(ws_url.to_string());
    }

    Ok(config)
}
