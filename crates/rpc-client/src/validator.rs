//! Response Validator - structural checks on decoded replies
//!
//! Every reply is checked against the shape expected for its method before
//! any caller sees it. Two result forms exist:
//! - plain: `{jsonrpc, id, error?, result}`
//! - context-wrapped: `{jsonrpc, id, error?, result: {context: {slot}, value}}`
//!
//! The expected shape of `result` is the type parameter; a mismatch is a
//! [`ClientError::Schema`], a non-null `error` is a [`ClientError::Rpc`].

use crate::error::{ClientError, ClientResult};
use rpc_types::{JsonRpcError, NotificationParams, RpcId, RpcResponse};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    jsonrpc: String,
    id: RpcId,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    result: Value,
}

/// Validate a plain reply and decode its `result` as `T`.
///
/// `expected_id` is checked when the caller correlates by id itself.
pub fn validate_reply<T: DeserializeOwned>(
    method: &str,
    expected_id: Option<&RpcId>,
    reply: Value,
) -> ClientResult<T> {
    let result = validate_envelope(method, expected_id, reply)?;
    serde_json::from_value(result).map_err(|e| ClientError::schema(method, e))
}

/// Validate a context-wrapped reply and decode its `value` as `T`
pub fn validate_context_reply<T: DeserializeOwned>(
    method: &str,
    expected_id: Option<&RpcId>,
    reply: Value,
) -> ClientResult<RpcResponse<T>> {
    validate_reply::<RpcResponse<T>>(method, expected_id, reply)
}

/// Validate the `params` of a pubsub notification
pub fn validate_notification<T: DeserializeOwned>(
    method: &str,
    params: Value,
) -> ClientResult<NotificationParams<T>> {
    serde_json::from_value(params).map_err(|e| ClientError::schema(method, e))
}

/// Check the envelope and return the raw `result`
fn validate_envelope(method: &str, expected_id: Option<&RpcId>, reply: Value) -> ClientResult<Value> {
    if !reply.is_object() {
        return Err(ClientError::schema(method, "reply is not a JSON object"));
    }

    let envelope: ReplyEnvelope =
        serde_json::from_value(reply).map_err(|e| ClientError::schema(method, e))?;

    if envelope.jsonrpc != "2.0" {
        return Err(ClientError::schema(
            method,
            format!("unsupported jsonrpc version {:?}", envelope.jsonrpc),
        ));
    }

    if let Some(expected) = expected_id {
        if &envelope.id != expected {
            return Err(ClientError::schema(
                method,
                format!("reply id {} does not match request id {}", envelope.id, expected),
            ));
        }
    }

    if !envelope.error.is_null() {
        let error: JsonRpcError = serde_json::from_value(envelope.error)
            .map_err(|e| ClientError::schema(method, format!("malformed error object: {e}")))?;
        return Err(error.into());
    }

    Ok(envelope.result)
}
