//! Subscription Manager - client-side pubsub subscriptions
//!
//! Keeps one table of records per subscription kind. Each record carries the
//! caller's callback and the state of its server-side counterpart:
//!
//! ```text
//! Unset --subscribe sent--> Pending --confirmed--> Active(server id)
//!   ^                          |                        |
//!   +------- failure ----------+---- socket closed -----+
//! ```
//!
//! Every mutation (register, remove, socket open/close, signature delivery)
//! runs a resync pass that brings the socket and the remote states in line
//! with the local tables.

use crate::{
    error::{ClientError, ClientResult},
    pubsub::{PubsubTransport, SocketEvent},
    validator::{validate_notification, validate_reply},
};
use parking_lot::Mutex;
use rpc_types::{AccountInfo, CommitmentLevel, JsonRpcRequest, KeyedAccountInfo, RpcResponse, SignatureResult, SlotInfo};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{runtime::Handle, sync::mpsc};

/// Client-side subscription ID (unique per kind)
pub type SubscriptionId = u64;

type Callback<P> = Arc<dyn Fn(P) + Send + Sync>;

/// Subscription kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    Account,
    Program,
    Slot,
    Signature,
}

impl SubscriptionKind {
    pub const ALL: [SubscriptionKind; 4] = [Self::Account, Self::Program, Self::Slot, Self::Signature];

    pub fn subscribe_method(self) -> &'static str {
        match self {
            Self::Account => "accountSubscribe",
            Self::Program => "programSubscribe",
            Self::Slot => "slotSubscribe",
            Self::Signature => "signatureSubscribe",
        }
    }

    pub fn unsubscribe_method(self) -> &'static str {
        match self {
            Self::Account => "accountUnsubscribe",
            Self::Program => "programUnsubscribe",
            Self::Slot => "slotUnsubscribe",
            Self::Signature => "signatureUnsubscribe",
        }
    }

    pub fn notification_method(self) -> &'static str {
        match self {
            Self::Account => "accountNotification",
            Self::Program => "programNotification",
            Self::Slot => "slotNotification",
            Self::Signature => "signatureNotification",
        }
    }

    pub fn from_notification(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.notification_method() == method)
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Account => "account",
            Self::Program => "program",
            Self::Slot => "slot",
            Self::Signature => "signature",
        };
        f.write_str(name)
    }
}

/// Server-side state of a subscription record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// Not subscribed on the server
    Unset,
    /// Subscribe request in flight
    Pending,
    /// Confirmed under the given server id
    Active(u64),
}

/// Socket state as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Connected,
}

struct SubscriptionRecord<P> {
    target: Option<String>,
    commitment: Option<CommitmentLevel>,
    callback: Callback<P>,
    remote: RemoteState,
    /// Tag of the subscribe request that moved this record to `Pending`
    attempt: u64,
}

/// Subscribe request to issue for one record
struct SubscribeRequest {
    kind: SubscriptionKind,
    id: SubscriptionId,
    attempt: u64,
    params: Vec<Value>,
}

/// Records of one kind, keyed by client-side id
struct SubscriptionTable<P> {
    kind: SubscriptionKind,
    next_id: SubscriptionId,
    records: BTreeMap<SubscriptionId, SubscriptionRecord<P>>,
}

impl<P> SubscriptionTable<P> {
    fn new(kind: SubscriptionKind) -> Self {
        Self {
            kind,
            next_id: 0,
            records: BTreeMap::new(),
        }
    }

    fn insert(&mut self, target: Option<String>, commitment: Option<CommitmentLevel>, callback: Callback<P>) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(
            id,
            SubscriptionRecord {
                target,
                commitment,
                callback,
                remote: RemoteState::Unset,
                attempt: 0,
            },
        );
        id
    }

    fn active_callback(&self, server_id: u64) -> Option<(SubscriptionId, Callback<P>)> {
        self.records
            .iter()
            .find(|(_, record)| record.remote == RemoteState::Active(server_id))
            .map(|(id, record)| (*id, record.callback.clone()))
    }
}

/// Kind-independent table operations used by resync
trait RecordTable: Send {
    fn len(&self) -> usize;
    fn remote_state(&self, id: SubscriptionId) -> Option<RemoteState>;
    fn remove(&mut self, id: SubscriptionId) -> bool;
    fn reset_remote(&mut self);
    /// Move every `Unset` record to `Pending` and describe the subscribe to send
    fn begin_subscribes(&mut self, next_attempt: &mut u64) -> Vec<SubscribeRequest>;
    /// Apply a subscribe outcome if the record is still waiting on `attempt`
    fn finish_subscribe(&mut self, id: SubscriptionId, attempt: u64, server_id: Option<u64>) -> bool;
}

impl<P> RecordTable for SubscriptionTable<P> {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn remote_state(&self, id: SubscriptionId) -> Option<RemoteState> {
        self.records.get(&id).map(|record| record.remote)
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        self.records.remove(&id).is_some()
    }

    fn reset_remote(&mut self) {
        for record in self.records.values_mut() {
            record.remote = RemoteState::Unset;
        }
    }

    fn begin_subscribes(&mut self, next_attempt: &mut u64) -> Vec<SubscribeRequest> {
        let kind = self.kind;
        self.records
            .iter_mut()
            .filter(|(_, record)| record.remote == RemoteState::Unset)
            .map(|(id, record)| {
                *next_attempt += 1;
                record.remote = RemoteState::Pending;
                record.attempt = *next_attempt;
                SubscribeRequest {
                    kind,
                    id: *id,
                    attempt: *next_attempt,
                    params: subscribe_params(kind, record.target.as_deref(), record.commitment),
                }
            })
            .collect()
    }

    fn finish_subscribe(&mut self, id: SubscriptionId, attempt: u64, server_id: Option<u64>) -> bool {
        match self.records.get_mut(&id) {
            Some(record) if record.remote == RemoteState::Pending && record.attempt == attempt => {
                record.remote = server_id.map_or(RemoteState::Unset, RemoteState::Active);
                true
            }
            _ => false,
        }
    }
}

/// Subscribe params for one record
fn subscribe_params(kind: SubscriptionKind, target: Option<&str>, commitment: Option<CommitmentLevel>) -> Vec<Value> {
    let mut params = Vec::new();
    if let Some(target) = target {
        params.push(Value::from(target));
    }

    let mut options = Map::new();
    if matches!(kind, SubscriptionKind::Account | SubscriptionKind::Program) {
        options.insert("encoding".to_string(), Value::from("base64"));
    }
    if let Some(commitment) = commitment {
        options.insert("commitment".to_string(), Value::from(commitment.as_str()));
    }
    if !options.is_empty() {
        params.push(Value::Object(options));
    }

    params
}

struct ManagerState {
    accounts: SubscriptionTable<RpcResponse<AccountInfo>>,
    programs: SubscriptionTable<RpcResponse<KeyedAccountInfo>>,
    slots: SubscriptionTable<SlotInfo>,
    signatures: SubscriptionTable<RpcResponse<SignatureResult>>,
    socket: SocketState,
    generation: u64,
    next_attempt: u64,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            accounts: SubscriptionTable::new(SubscriptionKind::Account),
            programs: SubscriptionTable::new(SubscriptionKind::Program),
            slots: SubscriptionTable::new(SubscriptionKind::Slot),
            signatures: SubscriptionTable::new(SubscriptionKind::Signature),
            socket: SocketState::Disconnected,
            generation: 0,
            next_attempt: 0,
        }
    }

    fn table(&self, kind: SubscriptionKind) -> &dyn RecordTable {
        match kind {
            SubscriptionKind::Account => &self.accounts,
            SubscriptionKind::Program => &self.programs,
            SubscriptionKind::Slot => &self.slots,
            SubscriptionKind::Signature => &self.signatures,
        }
    }

    fn table_mut(&mut self, kind: SubscriptionKind) -> &mut dyn RecordTable {
        match kind {
            SubscriptionKind::Account => &mut self.accounts,
            SubscriptionKind::Program => &mut self.programs,
            SubscriptionKind::Slot => &mut self.slots,
            SubscriptionKind::Signature => &mut self.signatures,
        }
    }

    fn is_idle(&self) -> bool {
        SubscriptionKind::ALL.into_iter().all(|kind| self.table(kind).len() == 0)
    }

    fn reset_remote(&mut self) {
        for kind in SubscriptionKind::ALL {
            self.table_mut(kind).reset_remote();
        }
    }

    fn begin_subscribes(&mut self) -> Vec<SubscribeRequest> {
        let mut attempt = self.next_attempt;
        let mut requests = Vec::new();
        for kind in SubscriptionKind::ALL {
            requests.extend(self.table_mut(kind).begin_subscribes(&mut attempt));
        }
        self.next_attempt = attempt;
        requests
    }
}

/// Notification payload of one subscription kind
trait Payload: DeserializeOwned + Send + 'static {
    const KIND: SubscriptionKind;

    fn table(state: &mut ManagerState) -> &mut SubscriptionTable<Self>;
}

impl Payload for RpcResponse<AccountInfo> {
    const KIND: SubscriptionKind = SubscriptionKind::Account;

    fn table(state: &mut ManagerState) -> &mut SubscriptionTable<Self> {
        &mut state.accounts
    }
}

impl Payload for RpcResponse<KeyedAccountInfo> {
    const KIND: SubscriptionKind = SubscriptionKind::Program;

    fn table(state: &mut ManagerState) -> &mut SubscriptionTable<Self> {
        &mut state.programs
    }
}

impl Payload for SlotInfo {
    const KIND: SubscriptionKind = SubscriptionKind::Slot;

    fn table(state: &mut ManagerState) -> &mut SubscriptionTable<Self> {
        &mut state.slots
    }
}

impl Payload for RpcResponse<SignatureResult> {
    const KIND: SubscriptionKind = SubscriptionKind::Signature;

    fn table(state: &mut ManagerState) -> &mut SubscriptionTable<Self> {
        &mut state.signatures
    }
}

struct Shared {
    state: Mutex<ManagerState>,
    transport: Arc<dyn PubsubTransport>,
    runtime: Handle,
    next_request_id: AtomicU64,
}

/// Manages pubsub subscriptions over one socket
#[derive(Clone)]
pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

impl SubscriptionManager {
    /// Must be called from within a Tokio runtime. Subscribe requests are
    /// spawned on that runtime, so the manager may be used from any thread.
    pub fn new(transport: Arc<dyn PubsubTransport>) -> Self {
        Self::with_runtime(transport, Handle::current())
    }

    pub fn with_runtime(transport: Arc<dyn PubsubTransport>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ManagerState::new()),
                transport,
                runtime,
                next_request_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to changes of one account
    pub fn register_account<F>(&self, pubkey: &Pubkey, commitment: Option<CommitmentLevel>, callback: F) -> SubscriptionId
    where
        F: Fn(RpcResponse<AccountInfo>) + Send + Sync + 'static,
    {
        self.register(Some(pubkey.to_string()), commitment, Arc::new(callback))
    }

    /// Subscribe to changes of accounts owned by a program
    pub fn register_program<F>(&self, program_id: &Pubkey, commitment: Option<CommitmentLevel>, callback: F) -> SubscriptionId
    where
        F: Fn(RpcResponse<KeyedAccountInfo>) + Send + Sync + 'static,
    {
        self.register(Some(program_id.to_string()), commitment, Arc::new(callback))
    }

    /// Subscribe to slot progress
    pub fn register_slot<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SlotInfo) + Send + Sync + 'static,
    {
        self.register(None, None, Arc::new(callback))
    }

    /// Subscribe to the outcome of one transaction. Fires at most once.
    pub fn register_signature<F>(&self, signature: &Signature, commitment: Option<CommitmentLevel>, callback: F) -> SubscriptionId
    where
        F: Fn(RpcResponse<SignatureResult>) + Send + Sync + 'static,
    {
        self.register(Some(signature.to_string()), commitment, Arc::new(callback))
    }

    fn register<P: Payload>(&self, target: Option<String>, commitment: Option<CommitmentLevel>, callback: Callback<P>) -> SubscriptionId {
        let id = P::table(&mut self.shared.state.lock()).insert(target, commitment, callback);
        tracing::debug!("Registered {} subscription {}", P::KIND, id);

        self.resync();
        id
    }

    /// Remove a subscription.
    ///
    /// An active server-side subscription is unsubscribed on a best-effort
    /// basis; failures are logged. Signature subscriptions are never
    /// unsubscribed explicitly.
    pub async fn remove(&self, kind: SubscriptionKind, id: SubscriptionId) -> ClientResult<()> {
        let mut unsubscribed = None;

        loop {
            // The record is deleted in the same critical section that finds no
            // further server id to release
            let server_id = {
                let mut state = self.shared.state.lock();
                let remote = state.table(kind).remote_state(id);
                match remote {
                    None if unsubscribed.is_none() => return Err(ClientError::UnknownSubscription { kind, id }),
                    None => None,
                    Some(RemoteState::Active(server_id))
                        if kind != SubscriptionKind::Signature && unsubscribed != Some(server_id) =>
                    {
                        Some(server_id)
                    }
                    Some(_) => {
                        state.table_mut(kind).remove(id);
                        tracing::debug!("Removed {} subscription {}", kind, id);
                        None
                    }
                }
            };

            // A reconnect while the unsubscribe is in flight may confirm the
            // record again under a new server id, which is released next
            let Some(server_id) = server_id else {
                break;
            };
            self.unsubscribe(kind, server_id).await;
            unsubscribed = Some(server_id);
        }

        self.resync();
        Ok(())
    }

    async fn unsubscribe(&self, kind: SubscriptionKind, server_id: u64) {
        let method = kind.unsubscribe_method();
        match self.call::<bool>(method, vec![Value::from(server_id)]).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("{} for server id {} returned false", method, server_id),
            Err(e) => tracing::warn!("{} for server id {} failed: {}", method, server_id, e),
        }
    }

    /// Bring the socket and remote states in line with the local tables
    fn resync(&self) {
        let requests = {
            let mut state = self.shared.state.lock();

            if state.is_idle() {
                if state.socket != SocketState::Disconnected {
                    tracing::info!("No subscriptions left, closing pubsub socket");
                    state.socket = SocketState::Disconnected;
                    state.generation += 1;
                    self.shared.transport.close();
                }
                return;
            }

            match state.socket {
                SocketState::Disconnected => {
                    state.reset_remote();
                    state.generation += 1;
                    state.socket = SocketState::Connecting;
                    tracing::debug!("Connecting pubsub socket (generation {})", state.generation);
                    self.shared.transport.connect(state.generation);
                    return;
                }
                SocketState::Connecting => {
                    state.reset_remote();
                    return;
                }
                SocketState::Connected => state.begin_subscribes(),
            }
        };

        for request in requests {
            self.spawn_subscribe(request);
        }
    }

    fn spawn_subscribe(&self, request: SubscribeRequest) {
        let manager = self.clone();

        self.shared.runtime.spawn(async move {
            let SubscribeRequest {
                kind,
                id,
                attempt,
                params,
            } = request;
            let method = kind.subscribe_method();
            let outcome = manager.call::<u64>(method, params).await;

            let mut state = manager.shared.state.lock();
            match outcome {
                Ok(server_id) => {
                    if state.table_mut(kind).finish_subscribe(id, attempt, Some(server_id)) {
                        tracing::debug!("{} subscription {} active as {}", kind, id, server_id);
                    } else {
                        tracing::debug!("Discarding confirmation {} for {} subscription {}", server_id, kind, id);
                    }
                }
                Err(e) => {
                    tracing::warn!("{} for subscription {} failed: {}", method, id, e);
                    state.table_mut(kind).finish_subscribe(id, attempt, None);
                }
            }
        });
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> ClientResult<T> {
        let id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let expected_id = request.id.clone();

        let reply = self.shared.transport.call(request).await?;
        validate_reply(method, Some(&expected_id), reply)
    }

    /// Apply one socket event
    pub fn handle_event(&self, event: SocketEvent) {
        match event {
            SocketEvent::Open { generation } => {
                {
                    let mut state = self.shared.state.lock();
                    if generation != state.generation {
                        tracing::debug!("Ignoring open for stale generation {}", generation);
                        return;
                    }
                    state.socket = SocketState::Connected;
                }
                tracing::info!("Pubsub socket open");
                self.resync();
            }
            SocketEvent::Closed { generation } => {
                {
                    let mut state = self.shared.state.lock();
                    if generation != state.generation {
                        tracing::debug!("Ignoring close for stale generation {}", generation);
                        return;
                    }
                    state.socket = SocketState::Disconnected;
                    state.reset_remote();
                }
                tracing::info!("Pubsub socket closed");
                self.resync();
            }
            SocketEvent::Notification { method, params } => self.dispatch(&method, params),
        }
    }

    fn dispatch(&self, method: &str, params: Value) {
        match SubscriptionKind::from_notification(method) {
            Some(SubscriptionKind::Account) => self.deliver::<RpcResponse<AccountInfo>>(method, params),
            Some(SubscriptionKind::Program) => self.deliver::<RpcResponse<KeyedAccountInfo>>(method, params),
            Some(SubscriptionKind::Slot) => self.deliver::<SlotInfo>(method, params),
            Some(SubscriptionKind::Signature) => self.deliver::<RpcResponse<SignatureResult>>(method, params),
            None => tracing::debug!("Ignoring unknown notification {}", method),
        }
    }

    fn deliver<P: Payload>(&self, method: &str, params: Value) {
        let notification = match validate_notification::<P>(method, params) {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!("Dropping malformed notification: {}", e);
                return;
            }
        };

        let matched = {
            let mut state = self.shared.state.lock();
            let table = P::table(&mut state);
            let matched = table.active_callback(notification.subscription);

            // The server drops a signature subscription after its single notification
            if let (Some((id, _)), SubscriptionKind::Signature) = (&matched, P::KIND) {
                table.records.remove(id);
            }
            matched
        };

        let Some((id, callback)) = matched else {
            tracing::debug!(
                "No {} subscription for server id {}",
                P::KIND,
                notification.subscription
            );
            return;
        };

        callback(notification.result);

        if P::KIND == SubscriptionKind::Signature {
            tracing::debug!("Signature subscription {} fired and was removed", id);
            self.resync();
        }
    }

    /// Apply socket events until the channel closes
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SocketEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("Pubsub event channel closed");
    }

    pub fn subscription_count(&self, kind: SubscriptionKind) -> usize {
        self.shared.state.lock().table(kind).len()
    }

    pub fn remote_state(&self, kind: SubscriptionKind, id: SubscriptionId) -> Option<RemoteState> {
        self.shared.state.lock().table(kind).remote_state(id)
    }

    pub fn socket_state(&self) -> SocketState {
        self.shared.state.lock().socket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicBool, AtomicUsize},
        time::Duration,
    };
    use tokio::sync::Semaphore;

    /// Transport that records calls and confirms subscribes with ids from 7
    struct MockTransport {
        connects: Mutex<Vec<u64>>,
        closes: AtomicUsize,
        calls: Mutex<Vec<JsonRpcRequest>>,
        next_server_id: AtomicU64,
        fail_subscribe: AtomicBool,
        gate: Semaphore,
        unsubscribe_gate: Semaphore,
    }

    impl MockTransport {
        fn new(held: bool) -> Arc<Self> {
            let permits = if held { 0 } else { Semaphore::MAX_PERMITS };
            Arc::new(Self {
                connects: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
                next_server_id: AtomicU64::new(7),
                fail_subscribe: AtomicBool::new(false),
                gate: Semaphore::new(permits),
                unsubscribe_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            })
        }

        fn release(&self) {
            self.gate.add_permits(1_000);
        }

        fn hold_unsubscribes(&self) {
            self.unsubscribe_gate.forget_permits(Semaphore::MAX_PERMITS);
        }

        fn release_unsubscribes(&self) {
            self.unsubscribe_gate.add_permits(1_000);
        }

        fn generation(&self) -> u64 {
            *self.connects.lock().last().unwrap()
        }

        fn count(&self, method: &str) -> usize {
            self.calls.lock().iter().filter(|r| r.method == method).count()
        }

        fn last_call(&self, method: &str) -> JsonRpcRequest {
            self.calls
                .lock()
                .iter()
                .rev()
                .find(|r| r.method == method)
                .cloned()
                .unwrap()
        }
    }

    #[async_trait]
    impl PubsubTransport for MockTransport {
        fn connect(&self, generation: u64) {
            self.connects.lock().push(generation);
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }

        async fn call(&self, request: JsonRpcRequest) -> ClientResult<Value> {
            self.calls.lock().push(request.clone());
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(|_| ClientError::Transport("gate closed".into()))?;

            if request.method.ends_with("Unsubscribe") {
                let _permit = self
                    .unsubscribe_gate
                    .acquire()
                    .await
                    .map_err(|_| ClientError::Transport("gate closed".into()))?;
                return Ok(json!({"jsonrpc": "2.0", "id": request.id, "result": true}));
            }
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(ClientError::Transport("connection reset".into()));
            }

            let server_id = self.next_server_id.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"jsonrpc": "2.0", "id": request.id, "result": server_id}))
        }
    }

    fn setup(held: bool) -> (SubscriptionManager, Arc<MockTransport>) {
        let transport = MockTransport::new(held);
        (SubscriptionManager::new(transport.clone()), transport)
    }

    fn open(manager: &SubscriptionManager, transport: &MockTransport) {
        manager.handle_event(SocketEvent::Open {
            generation: transport.generation(),
        });
    }

    fn notify(manager: &SubscriptionManager, method: &str, subscription: u64, result: Value) {
        manager.handle_event(SocketEvent::Notification {
            method: method.to_string(),
            params: json!({"subscription": subscription, "result": result}),
        });
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn account_result(lamports: u64) -> Value {
        json!({
            "context": {"slot": 11},
            "value": {
                "lamports": lamports,
                "owner": Pubkey::default().to_string(),
                "data": ["", "base64"],
                "executable": false,
                "rentEpoch": 0
            }
        })
    }

    #[tokio::test]
    async fn test_ids_increase_per_kind() {
        let (manager, transport) = setup(false);
        let pubkey = Pubkey::new_unique();

        let a = manager.register_account(&pubkey, None, |_| {});
        let b = manager.register_account(&pubkey, None, |_| {});
        let s = manager.register_slot(|_| {});

        assert_eq!((a, b, s), (0, 1, 0));
        assert_eq!(manager.subscription_count(SubscriptionKind::Account), 2);
        assert_eq!(manager.socket_state(), SocketState::Connecting);
        // Only the first registration opens the socket
        assert_eq!(transport.connects.lock().len(), 1);
    }

    #[test]
    fn test_subscribe_params() {
        let key = Pubkey::new_unique().to_string();

        assert_eq!(
            subscribe_params(SubscriptionKind::Account, Some(&key), None),
            vec![json!(key), json!({"encoding": "base64"})]
        );
        assert_eq!(
            subscribe_params(SubscriptionKind::Signature, Some("sig"), Some(CommitmentLevel::Max)),
            vec![json!("sig"), json!({"commitment": "max"})]
        );
        assert!(subscribe_params(SubscriptionKind::Slot, None, None).is_empty());
    }

    #[tokio::test]
    async fn test_account_notification_reaches_callback() {
        let (manager, transport) = setup(false);
        let pubkey = Pubkey::new_unique();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = manager.register_account(&pubkey, Some(CommitmentLevel::Recent), move |update| {
            sink.lock().push(update.value.lamports);
        });
        open(&manager, &transport);

        wait_until(|| manager.remote_state(SubscriptionKind::Account, id) == Some(RemoteState::Active(7))).await;

        let subscribe = transport.last_call("accountSubscribe");
        assert_eq!(subscribe.params[0], json!(pubkey.to_string()));
        assert_eq!(subscribe.params[1]["commitment"], "recent");

        notify(&manager, "accountNotification", 7, account_result(500));
        // Unmatched server id and malformed payloads are dropped
        notify(&manager, "accountNotification", 8, account_result(600));
        notify(&manager, "accountNotification", 7, json!({"value": 1}));
        notify(&manager, "rootNotification", 7, json!(3));

        assert_eq!(*seen.lock(), vec![500]);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_fails() {
        let (manager, _transport) = setup(false);

        let err = manager.remove(SubscriptionKind::Program, 42).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnknownSubscription {
                kind: SubscriptionKind::Program,
                id: 42
            }
        ));
    }

    #[tokio::test]
    async fn test_remove_before_confirmation() {
        let (manager, transport) = setup(true);
        let id = manager.register_account(&Pubkey::new_unique(), None, |_| {});
        open(&manager, &transport);

        wait_until(|| transport.count("accountSubscribe") == 1).await;
        assert_eq!(manager.remote_state(SubscriptionKind::Account, id), Some(RemoteState::Pending));

        manager.remove(SubscriptionKind::Account, id).await.unwrap();
        transport.release();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The late confirmation is discarded
        assert_eq!(transport.count("accountSubscribe"), 1);
        assert_eq!(transport.count("accountUnsubscribe"), 0);
        assert_eq!(manager.subscription_count(SubscriptionKind::Account), 0);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_last_closes_and_register_reopens() {
        let (manager, transport) = setup(false);
        let id = manager.register_slot(|_| {});
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Slot, id) == Some(RemoteState::Active(7))).await;

        manager.remove(SubscriptionKind::Slot, id).await.unwrap();

        assert_eq!(transport.last_call("slotUnsubscribe").params, vec![json!(7)]);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);
        assert_eq!(manager.socket_state(), SocketState::Disconnected);

        let first_generation = transport.generation();
        manager.register_slot(|_| {});
        assert_eq!(transport.connects.lock().len(), 2);
        assert!(transport.generation() > first_generation);

        // The close of the torn-down socket belongs to an older generation
        manager.handle_event(SocketEvent::Closed {
            generation: first_generation,
        });
        assert_eq!(manager.socket_state(), SocketState::Connecting);
    }

    #[tokio::test]
    async fn test_signature_fires_once_and_is_removed() {
        let (manager, transport) = setup(false);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let id = manager.register_signature(&Signature::default(), None, move |result| {
            assert!(result.value.err.is_none());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Signature, id) == Some(RemoteState::Active(7))).await;

        let result = json!({"context": {"slot": 3}, "value": {"err": null}});
        notify(&manager, "signatureNotification", 7, result.clone());
        notify(&manager, "signatureNotification", 7, result);

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(manager.subscription_count(SubscriptionKind::Signature), 0);
        assert_eq!(transport.count("signatureUnsubscribe"), 0);
        assert_eq!(transport.closes.load(Ordering::SeqCst), 1);

        let err = manager.remove(SubscriptionKind::Signature, id).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownSubscription { .. }));
    }

    #[tokio::test]
    async fn test_socket_drop_resubscribes() {
        let (manager, transport) = setup(false);
        let id = manager.register_program(&Pubkey::new_unique(), None, |_| {});
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Program, id) == Some(RemoteState::Active(7))).await;

        manager.handle_event(SocketEvent::Closed {
            generation: transport.generation(),
        });
        assert_eq!(manager.remote_state(SubscriptionKind::Program, id), Some(RemoteState::Unset));
        assert_eq!(manager.subscription_count(SubscriptionKind::Program), 1);
        assert_eq!(transport.connects.lock().len(), 2);

        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Program, id) == Some(RemoteState::Active(8))).await;
    }

    #[tokio::test]
    async fn test_stale_open_ignored() {
        let (manager, transport) = setup(false);
        manager.register_slot(|_| {});

        manager.handle_event(SocketEvent::Open {
            generation: transport.generation() + 5,
        });

        assert_eq!(manager.socket_state(), SocketState::Connecting);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(transport.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_subscribe_retried_on_next_resync() {
        let (manager, transport) = setup(false);
        transport.fail_subscribe.store(true, Ordering::SeqCst);

        let id = manager.register_account(&Pubkey::new_unique(), None, |_| {});
        open(&manager, &transport);
        wait_until(|| {
            transport.count("accountSubscribe") == 1
                && manager.remote_state(SubscriptionKind::Account, id) == Some(RemoteState::Unset)
        })
        .await;

        // Not retried on its own
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.count("accountSubscribe"), 1);

        transport.fail_subscribe.store(false, Ordering::SeqCst);
        manager.register_slot(|_| {});

        wait_until(|| {
            matches!(
                manager.remote_state(SubscriptionKind::Account, id),
                Some(RemoteState::Active(_))
            )
        })
        .await;
        assert_eq!(transport.count("accountSubscribe"), 2);
    }

    #[tokio::test]
    async fn test_register_from_thread_outside_runtime() {
        let (manager, transport) = setup(false);
        let slot = manager.register_slot(|_| {});
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Slot, slot) == Some(RemoteState::Active(7))).await;

        let remote = manager.clone();
        let pubkey = Pubkey::new_unique();
        let id = std::thread::spawn(move || remote.register_account(&pubkey, None, |_| {}))
            .join()
            .unwrap();

        wait_until(|| manager.remote_state(SubscriptionKind::Account, id) == Some(RemoteState::Active(8))).await;
        assert_eq!(transport.count("accountSubscribe"), 1);
    }

    #[tokio::test]
    async fn test_remove_releases_id_confirmed_during_unsubscribe() {
        let (manager, transport) = setup(false);
        let id = manager.register_slot(|_| {});
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Slot, id) == Some(RemoteState::Active(7))).await;

        transport.hold_unsubscribes();
        let remover = tokio::spawn({
            let manager = manager.clone();
            async move { manager.remove(SubscriptionKind::Slot, id).await }
        });
        wait_until(|| transport.count("slotUnsubscribe") == 1).await;

        // Socket drops and comes back while the unsubscribe is in flight
        manager.handle_event(SocketEvent::Closed {
            generation: transport.generation(),
        });
        open(&manager, &transport);
        wait_until(|| manager.remote_state(SubscriptionKind::Slot, id) == Some(RemoteState::Active(8))).await;

        transport.release_unsubscribes();
        remover.await.unwrap().unwrap();

        assert_eq!(transport.count("slotUnsubscribe"), 2);
        assert_eq!(transport.last_call("slotUnsubscribe").params, vec![json!(8)]);
        assert_eq!(manager.subscription_count(SubscriptionKind::Slot), 0);
        assert_eq!(manager.socket_state(), SocketState::Disconnected);
    }
}
