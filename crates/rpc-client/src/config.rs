//! Connection Configuration

use crate::{
    DEFAULT_BLOCKHASH_MAX_POLLS, DEFAULT_BLOCKHASH_POLL_INTERVAL_MS,
    DEFAULT_BLOCKHASH_VALIDITY_SECS,
};
use rpc_types::CommitmentLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Default commitment for queries that accept one
    pub commitment: Option<CommitmentLevel>,
    /// WebSocket endpoint (derived from the HTTP endpoint when unset)
    pub ws_endpoint: Option<String>,
    /// Expire the cached blockhash after every send
    pub disable_blockhash_caching: bool,
    /// How long a fetched blockhash is reused
    pub blockhash_validity_secs: u64,
    /// Polls before giving up on a new blockhash
    pub blockhash_max_polls: usize,
    /// Sleep between blockhash polls
    pub blockhash_poll_interval_ms: u64,
    /// First reconnect delay after a failed socket connect
    pub reconnect_initial_ms: u64,
    /// Reconnect delay ceiling
    pub reconnect_max_ms: u64,
}

impl ConnectionConfig {
    pub fn blockhash_validity(&self) -> Duration {
        Duration::from_secs(self.blockhash_validity_secs)
    }

    pub fn blockhash_poll_interval(&self) -> Duration {
        Duration::from_millis(self.blockhash_poll_interval_ms)
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            commitment: None,
            ws_endpoint: None,
            disable_blockhash_caching: false,
            blockhash_validity_secs: DEFAULT_BLOCKHASH_VALIDITY_SECS,
            blockhash_max_polls: DEFAULT_BLOCKHASH_MAX_POLLS,
            blockhash_poll_interval_ms: DEFAULT_BLOCKHASH_POLL_INTERVAL_MS,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 60_000,
        }
    }
}
