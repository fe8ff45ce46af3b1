//! Client error types

use crate::subscriptions::{SubscriptionId, SubscriptionKind};
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the connection
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Network or socket failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Reply did not match the shape expected for the method
    #[error("Schema error in {method}: {reason}")]
    Schema { method: String, reason: String },

    /// Server reported a JSON-RPC error
    #[error("{message}")]
    Rpc { code: Option<i64>, message: String },

    /// Removal of a subscription id that is not registered
    #[error("Unknown {kind} subscription id: {id}")]
    UnknownSubscription {
        kind: SubscriptionKind,
        id: SubscriptionId,
    },

    /// Blockhash refresh loop exhausted
    #[error("Unable to obtain a new blockhash after {elapsed_ms}ms ({attempts} polls)")]
    Timeout { elapsed_ms: u64, attempts: usize },

    /// Signer rejected the transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Malformed caller input (endpoint URL, encoded transaction, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ClientError {
    pub fn schema(method: &str, reason: impl ToString) -> Self {
        Self::Schema {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn rpc(message: impl Into<String>) -> Self {
        Self::Rpc {
            code: None,
            message: message.into(),
        }
    }
}

impl From<rpc_types::JsonRpcError> for ClientError {
    fn from(e: rpc_types::JsonRpcError) -> Self {
        Self::Rpc {
            code: Some(e.code),
            message: e.message,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
