//! Pubsub Socket - WebSocket transport for subscriptions
//!
//! A background task owns the WebSocket connection. Callers talk to it through
//! a command channel; everything the socket observes (open, close, push
//! notifications) is delivered as [`SocketEvent`]s on a single event channel
//! consumed by the subscription dispatcher.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rpc_types::{JsonRpcRequest, RpcId};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

/// Inbound events from the socket task
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// Connection for `generation` is established
    Open { generation: u64 },
    /// Connection for `generation` ended, or could not be established
    Closed { generation: u64 },
    /// Server push message
    Notification { method: String, params: Value },
}

/// Socket operations the subscription manager relies on
#[async_trait]
pub trait PubsubTransport: Send + Sync + 'static {
    /// Request a connection. The outcome arrives as `Open`/`Closed` for `generation`.
    fn connect(&self, generation: u64);

    /// Close the current connection
    fn close(&self);

    /// Send a request over the socket and wait for the reply envelope
    async fn call(&self, request: JsonRpcRequest) -> ClientResult<Value>;
}

/// Reconnect pacing for the socket task
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
        }
    }
}

enum SocketCommand {
    Connect {
        generation: u64,
    },
    Close,
    Call {
        request: JsonRpcRequest,
        reply: oneshot::Sender<ClientResult<Value>>,
    },
}

type PendingCalls = HashMap<RpcId, oneshot::Sender<ClientResult<Value>>>;
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket implementation of [`PubsubTransport`]
pub struct WsSocket {
    url: String,
    commands: mpsc::UnboundedSender<SocketCommand>,
}

impl WsSocket {
    /// Spawn the socket task. It stays idle until the first `connect`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(url: impl Into<String>, config: SocketConfig, events: mpsc::UnboundedSender<SocketEvent>) -> Self {
        let url = url.into();
        let (commands, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(socket_task(url.clone(), config, command_rx, events));

        Self { url, commands }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PubsubTransport for WsSocket {
    fn connect(&self, generation: u64) {
        let _ = self.commands.send(SocketCommand::Connect { generation });
    }

    fn close(&self) {
        let _ = self.commands.send(SocketCommand::Close);
    }

    async fn call(&self, request: JsonRpcRequest) -> ClientResult<Value> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(SocketCommand::Call { request, reply })
            .map_err(|_| ClientError::Transport("socket task stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| ClientError::Transport("socket reply dropped".to_string()))?
    }
}

/// Background task that owns the connection
async fn socket_task(
    url: String,
    config: SocketConfig,
    mut commands: mpsc::UnboundedReceiver<SocketCommand>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    let mut backoff = Duration::ZERO;

    while let Some(command) = commands.recv().await {
        let mut generation = match command {
            SocketCommand::Connect { generation } => generation,
            SocketCommand::Close => continue,
            SocketCommand::Call { reply, .. } => {
                let _ = reply.send(Err(ClientError::Transport("socket not connected".to_string())));
                continue;
            }
        };

        if !backoff.is_zero() {
            tracing::debug!("Waiting {:?} before reconnecting to {}", backoff, url);
            tokio::time::sleep(backoff).await;
        }

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                tracing::warn!("WebSocket connect to {} failed: {}", url, e);
                backoff = next_backoff(backoff, &config);
                let _ = events.send(SocketEvent::Closed { generation });
                continue;
            }
        };

        tracing::info!("WebSocket connected to {}", url);
        let _ = events.send(SocketEvent::Open { generation });

        let exit = run_connection(ws_stream, &mut commands, &events, &mut generation).await;

        let _ = events.send(SocketEvent::Closed { generation });
        match exit {
            ConnectionExit::Closed => {
                tracing::info!("WebSocket to {} closed", url);
                backoff = Duration::ZERO;
            }
            ConnectionExit::Dropped => {
                tracing::warn!("WebSocket to {} dropped", url);
                backoff = config.reconnect_initial;
            }
            ConnectionExit::Shutdown => return,
        }
    }
}

fn next_backoff(current: Duration, config: &SocketConfig) -> Duration {
    if current.is_zero() {
        config.reconnect_initial
    } else {
        (current * 2).min(config.reconnect_max)
    }
}

enum ConnectionExit {
    /// Closed on request
    Closed,
    /// Network drop or server-initiated close
    Dropped,
    /// Command channel gone
    Shutdown,
}

/// Pump one live connection until it ends
async fn run_connection(
    ws_stream: WsStream,
    commands: &mut mpsc::UnboundedReceiver<SocketCommand>,
    events: &mpsc::UnboundedSender<SocketEvent>,
    generation: &mut u64,
) -> ConnectionExit {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending = PendingCalls::new();

    let exit = loop {
        tokio::select! {
            command = commands.recv() => match command {
                None => {
                    let _ = sink.close().await;
                    break ConnectionExit::Shutdown;
                }
                Some(SocketCommand::Close) => {
                    let _ = sink.close().await;
                    break ConnectionExit::Closed;
                }
                Some(SocketCommand::Connect { generation: requested }) => {
                    // Already connected: adopt the newer generation
                    *generation = requested;
                    let _ = events.send(SocketEvent::Open { generation: requested });
                }
                Some(SocketCommand::Call { request, reply }) => {
                    let text = match serde_json::to_string(&request) {
                        Ok(text) => text,
                        Err(e) => {
                            let _ = reply.send(Err(ClientError::schema(&request.method, e)));
                            continue;
                        }
                    };
                    pending.insert(request.id.clone(), reply);
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!("WebSocket send failed: {}", e);
                        break ConnectionExit::Dropped;
                    }
                }
            },
            message = stream.next() => match message {
                None => break ConnectionExit::Dropped,
                Some(Err(e)) => {
                    tracing::warn!("WebSocket receive error: {}", e);
                    break ConnectionExit::Dropped;
                }
                Some(Ok(Message::Text(text))) => handle_text(&text, &mut pending, events),
                Some(Ok(Message::Close(_))) => break ConnectionExit::Dropped,
                Some(Ok(_)) => {}
            },
        }
    };

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(ClientError::Transport("socket closed".to_string())));
    }

    exit
}

/// Route one text frame: replies go to their waiting caller, pushes become events
fn handle_text(text: &str, pending: &mut PendingCalls, events: &mpsc::UnboundedSender<SocketEvent>) {
    let message: Value = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!("Ignoring non-JSON WebSocket frame: {}", e);
            return;
        }
    };

    if let Some(method) = message.get("method").and_then(Value::as_str) {
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let _ = events.send(SocketEvent::Notification {
            method: method.to_string(),
            params,
        });
        return;
    }

    let id = message
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<RpcId>(id).ok());

    match id.and_then(|id| pending.remove(&id)) {
        Some(reply) => {
            let _ = reply.send(Ok(message));
        }
        None => tracing::debug!("Dropping uncorrelated WebSocket reply"),
    }
}
