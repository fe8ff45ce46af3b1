//! RPC Channel - one-shot JSON-RPC calls
//!
//! Builds the 2.0 envelope with a fresh correlation id, sends it through an
//! [`RpcSender`] and validates the reply. No retry.

use crate::{
    error::{ClientError, ClientResult},
    sender::RpcSender,
    validator::{validate_context_reply, validate_reply},
};
use rpc_types::{JsonRpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde_json::Value;
use solana_sdk::signature::Signature;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Request/response channel to the node
#[derive(Clone)]
pub struct RpcChannel {
    sender: Arc<dyn RpcSender>,
    next_id: Arc<AtomicU64>,
}

impl RpcChannel {
    pub fn new(sender: Arc<dyn RpcSender>) -> Self {
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Endpoint of the underlying sender
    pub fn url(&self) -> &str {
        self.sender.url()
    }

    fn next_request(&self, method: &str, params: Vec<Value>) -> JsonRpcRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        JsonRpcRequest::new(id, method, params)
    }

    async fn round_trip(&self, method: &str, params: Vec<Value>) -> ClientResult<(JsonRpcRequest, Value)> {
        let request = self.next_request(method, params);
        tracing::debug!("RPC call {} (id {})", method, request.id);
        let reply = self.sender.send(request.clone()).await?;
        Ok((request, reply))
    }

    /// Call a method whose result is plain
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> ClientResult<T> {
        let (request, reply) = self.round_trip(method, params).await?;
        validate_reply(method, Some(&request.id), reply)
    }

    /// Call a method whose result is `{context, value}`
    pub async fn call_with_context<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> ClientResult<RpcResponse<T>> {
        let (request, reply) = self.round_trip(method, params).await?;
        validate_context_reply(method, Some(&request.id), reply)
    }

    /// Submit signed wire bytes, base58 encoded
    pub async fn send_raw_transaction(&self, wire_bytes: &[u8]) -> ClientResult<Signature> {
        let encoded = bs58::encode(wire_bytes).into_string();
        self.send_encoded_transaction(&encoded).await
    }

    /// Submit an already base58-encoded transaction
    pub async fn send_encoded_transaction(&self, encoded: &str) -> ClientResult<Signature> {
        let signature: String = self
            .call("sendTransaction", vec![Value::from(encoded)])
            .await?;

        signature
            .parse()
            .map_err(|e| ClientError::schema("sendTransaction", format!("invalid signature: {e}")))
    }
}
