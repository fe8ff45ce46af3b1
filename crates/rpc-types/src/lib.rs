//! RPC Types - JSON-RPC wire types for the L2 client
//!
//! Shared between the client library and the CLI:
//! - JSON-RPC 2.0 request/response envelopes
//! - Context-wrapped results (`{context: {slot}, value}`)
//! - Per-method result types (accounts, epochs, blocks, ...)
//! - Pubsub notification payloads

pub mod commitment;
pub mod request;
pub mod response;
pub mod serde_utils;

pub use commitment::{CommitmentConfig, CommitmentLevel};
pub use request::{JsonRpcError, JsonRpcRequest, RpcId};
pub use response::*;

/// Ticks per second produced by the node
pub const NUM_TICKS_PER_SECOND: u64 = 160;

/// Default ticks per slot
pub const DEFAULT_TICKS_PER_SLOT: u64 = 64;

/// Milliseconds in one slot at the default tick rate (400ms)
pub const MS_PER_SLOT: u64 = 1000 * DEFAULT_TICKS_PER_SLOT / NUM_TICKS_PER_SECOND;
