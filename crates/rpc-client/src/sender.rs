//! Request/response transport for JSON-RPC calls

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use rpc_types::JsonRpcRequest;
use serde_json::Value;

/// Sends one JSON-RPC request and returns the decoded (unvalidated) reply
#[async_trait]
pub trait RpcSender: Send + Sync + 'static {
    async fn send(&self, request: JsonRpcRequest) -> ClientResult<Value>;

    /// Endpoint this sender talks to
    fn url(&self) -> &str;
}

/// HTTP POST transport
pub struct HttpSender {
    url: String,
    http: reqwest::Client,
}

impl HttpSender {
    /// Create a sender for the given endpoint.
    ///
    /// No request timeout is set: failures surface when the transport reports them.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RpcSender for HttpSender {
    async fn send(&self, request: JsonRpcRequest) -> ClientResult<Value> {
        tracing::trace!("POST {} {}", self.url, request.method);

        let response = self.http.post(&self.url).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Transport(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| ClientError::schema(&request.method, format!("reply is not JSON: {e}")))
    }

    fn url(&self) -> &str {
        &self.url
    }
}
