//! RPC Client - client connection for the L2
//!
//! Provides a Solana-compatible client interface:
//! - HTTP JSON-RPC queries with validated replies
//! - Transaction submission with a cached, deduplicating blockhash
//! - WebSocket subscriptions: account, program, slot, signature

pub mod blockhash;
pub mod channel;
pub mod config;
pub mod connection;
pub mod error;
pub mod nonce;
pub mod pubsub;
pub mod sender;
pub mod subscriptions;
pub mod transaction;
pub mod validator;

#[cfg(test)]
mod tests;

pub use blockhash::{BlockhashCache, BlockhashCacheConfig};
pub use channel::RpcChannel;
pub use config::ConnectionConfig;
pub use connection::{derive_ws_url, Connection};
pub use error::{ClientError, ClientResult};
pub use pubsub::{PubsubTransport, SocketConfig, SocketEvent, WsSocket};
pub use sender::{HttpSender, RpcSender};
pub use subscriptions::{RemoteState, SocketState, SubscriptionId, SubscriptionKind, SubscriptionManager};
pub use transaction::{NonceInfo, NonceTransaction, SignableTransaction};

// Re-export wire types that consumers need
pub use rpc_types;

/// How long a fetched blockhash is reused for signing
pub const DEFAULT_BLOCKHASH_VALIDITY_SECS: u64 = 30;

/// Polls for a new blockhash before giving up
pub const DEFAULT_BLOCKHASH_MAX_POLLS: usize = 50;

/// Sleep between blockhash polls: half a slot
pub const DEFAULT_BLOCKHASH_POLL_INTERVAL_MS: u64 = rpc_types::MS_PER_SLOT / 2;
