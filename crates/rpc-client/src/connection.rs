//! Connection - client facade for one node
//!
//! Queries go through the [`RpcChannel`], transaction submission through the
//! [`BlockhashCache`], and subscriptions through the [`SubscriptionManager`]
//! bound to the node's WebSocket endpoint.

use crate::{
    blockhash::BlockhashCache,
    channel::RpcChannel,
    config::ConnectionConfig,
    error::{ClientError, ClientResult},
    nonce::decode_nonce_account,
    pubsub::{PubsubTransport, SocketConfig, SocketEvent, WsSocket},
    sender::{HttpSender, RpcSender},
    subscriptions::{SubscriptionId, SubscriptionKind, SubscriptionManager},
    transaction::SignableTransaction,
};
use reqwest::Url;
use rpc_types::{
    AccountInfo, CommitmentConfig, CommitmentLevel, ConfirmedBlock, ContactInfo, EpochInfo, EpochSchedule, FeeCalculator, Inflation,
    KeyedAccountInfo, NonceAccount, RecentBlockhash, RpcResponse, SignatureResult, SignatureStatus, SlotInfo, Version,
    VoteAccountStatus,
};
use serde_json::{json, Map, Value};
use solana_sdk::{
    clock::Slot,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

/// Derive the WebSocket endpoint from an HTTP endpoint.
///
/// `http` becomes `ws`, `https` becomes `wss`, and an explicit port is
/// incremented by one (the node serves pubsub on the port after RPC).
pub fn derive_ws_url(endpoint: &str) -> ClientResult<String> {
    let mut url =
        Url::parse(endpoint).map_err(|e| ClientError::InvalidInput(format!("invalid endpoint {endpoint}: {e}")))?;

    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(ClientError::InvalidInput(format!(
                "unsupported endpoint scheme: {other}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::InvalidInput(format!("cannot derive {scheme} url from {endpoint}")))?;

    if let Some(port) = url.port() {
        let ws_port = port
            .checked_add(1)
            .ok_or_else(|| ClientError::InvalidInput(format!("no port after {port}")))?;
        url.set_port(Some(ws_port))
            .map_err(|_| ClientError::InvalidInput(format!("cannot set port on {endpoint}")))?;
    }

    Ok(url.to_string())
}

/// Connection to one node
pub struct Connection {
    channel: RpcChannel,
    subscriptions: SubscriptionManager,
    blockhash_cache: BlockhashCache,
    config: ConnectionConfig,
    dispatcher: JoinHandle<()>,
}

impl Connection {
    /// Connect to `endpoint` with the default configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(endpoint: &str) -> ClientResult<Self> {
        Self::with_config(endpoint, ConnectionConfig::default())
    }

    pub fn with_config(endpoint: &str, config: ConnectionConfig) -> ClientResult<Self> {
        let ws_url = match &config.ws_endpoint {
            Some(ws_url) => ws_url.clone(),
            None => derive_ws_url(endpoint)?,
        };

        Ok(Self::with_sender(Arc::new(HttpSender::new(endpoint)), &ws_url, config))
    }

    /// Use a custom request sender; subscriptions still go to `ws_url`
    pub fn with_sender(sender: Arc<dyn RpcSender>, ws_url: &str, config: ConnectionConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let socket_config = SocketConfig {
            reconnect_initial: config.reconnect_initial(),
            reconnect_max: config.reconnect_max(),
        };
        let socket = WsSocket::spawn(ws_url, socket_config, events_tx);

        Self::with_transports(sender, Arc::new(socket), events_rx, config)
    }

    /// Assemble from explicit transports. `events` must carry the events of `pubsub`.
    pub fn with_transports(
        sender: Arc<dyn RpcSender>,
        pubsub: Arc<dyn PubsubTransport>,
        events: mpsc::UnboundedReceiver<SocketEvent>,
        config: ConnectionConfig,
    ) -> Self {
        let subscriptions = SubscriptionManager::new(pubsub);
        let dispatcher = tokio::spawn(subscriptions.clone().run(events));

        tracing::debug!("Connection to {} ready", sender.url());

        Self {
            channel: RpcChannel::new(sender),
            subscriptions,
            blockhash_cache: BlockhashCache::new((&config).into()),
            config,
            dispatcher,
        }
    }

    pub fn url(&self) -> &str {
        self.channel.url()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// `{"commitment": level}` for the call, falling back to the configured default
    fn commitment_config(&self, commitment: Option<CommitmentLevel>) -> Option<Value> {
        commitment
            .or(self.config.commitment)
            .map(|commitment| json!(CommitmentConfig { commitment }))
    }

    fn with_commitment(&self, mut params: Vec<Value>, commitment: Option<CommitmentLevel>) -> Vec<Value> {
        params.extend(self.commitment_config(commitment));
        params
    }

    /// `{"encoding": "base64", "commitment"?}` for account-returning methods
    fn account_config(&self, commitment: Option<CommitmentLevel>) -> Value {
        let mut config = Map::new();
        config.insert("encoding".to_string(), Value::from("base64"));
        if let Some(level) = commitment.or(self.config.commitment) {
            config.insert("commitment".to_string(), Value::from(level.as_str()));
        }
        Value::Object(config)
    }

    // ============ Accounts ============

    pub async fn get_balance_and_context(
        &self,
        pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<RpcResponse<u64>> {
        let params = self.with_commitment(vec![json!(pubkey.to_string())], commitment);
        self.channel.call_with_context("getBalance", params).await
    }

    pub async fn get_balance(&self, pubkey: &Pubkey, commitment: Option<CommitmentLevel>) -> ClientResult<u64> {
        Ok(self.get_balance_and_context(pubkey, commitment).await?.value)
    }

    /// Fetch an account. An account the node does not know is an error.
    pub async fn get_account_info_and_context(
        &self,
        pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<RpcResponse<AccountInfo>> {
        let response = self.fetch_account(pubkey, commitment).await?;
        match response.value {
            Some(account) => Ok(RpcResponse {
                context: response.context,
                value: account,
            }),
            None => Err(ClientError::rpc("Invalid request")),
        }
    }

    pub async fn get_account_info(
        &self,
        pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<AccountInfo> {
        Ok(self.get_account_info_and_context(pubkey, commitment).await?.value)
    }

    async fn fetch_account(
        &self,
        pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<RpcResponse<Option<AccountInfo>>> {
        let params = vec![json!(pubkey.to_string()), self.account_config(commitment)];
        self.channel.call_with_context("getAccountInfo", params).await
    }

    pub async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<Vec<KeyedAccountInfo>> {
        let params = vec![json!(program_id.to_string()), self.account_config(commitment)];
        self.channel.call("getProgramAccounts", params).await
    }

    /// Decode a durable nonce account; `None` when the account does not exist
    pub async fn get_nonce_and_context(
        &self,
        nonce_pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<RpcResponse<Option<NonceAccount>>> {
        let response = self.fetch_account(nonce_pubkey, commitment).await?;
        let value = response
            .value
            .map(|account| decode_nonce_account(&account.data))
            .transpose()?;

        Ok(RpcResponse {
            context: response.context,
            value,
        })
    }

    pub async fn get_nonce(
        &self,
        nonce_pubkey: &Pubkey,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<Option<NonceAccount>> {
        Ok(self.get_nonce_and_context(nonce_pubkey, commitment).await?.value)
    }

    pub async fn get_minimum_balance_for_rent_exemption(
        &self,
        data_len: usize,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<u64> {
        let params = self.with_commitment(vec![json!(data_len)], commitment);
        self.channel.call("getMinimumBalanceForRentExemption", params).await
    }

    // ============ Cluster ============

    pub async fn get_cluster_nodes(&self) -> ClientResult<Vec<ContactInfo>> {
        self.channel.call("getClusterNodes", vec![]).await
    }

    pub async fn get_vote_accounts(&self, commitment: Option<CommitmentLevel>) -> ClientResult<VoteAccountStatus> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getVoteAccounts", params).await
    }

    pub async fn get_slot_leader(&self, commitment: Option<CommitmentLevel>) -> ClientResult<Pubkey> {
        let params = self.with_commitment(vec![], commitment);
        let leader: String = self.channel.call("getSlotLeader", params).await?;
        leader
            .parse()
            .map_err(|e| ClientError::schema("getSlotLeader", format!("invalid pubkey: {e}")))
    }

    pub async fn get_slot(&self, commitment: Option<CommitmentLevel>) -> ClientResult<Slot> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getSlot", params).await
    }

    pub async fn get_version(&self) -> ClientResult<Version> {
        self.channel.call("getVersion", vec![]).await
    }

    /// Ask the node to exit. Only honored by nodes started with it enabled.
    pub async fn validator_exit(&self) -> ClientResult<bool> {
        self.channel.call("validatorExit", vec![]).await
    }

    // ============ Epochs / economics ============

    pub async fn get_epoch_info(&self, commitment: Option<CommitmentLevel>) -> ClientResult<EpochInfo> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getEpochInfo", params).await
    }

    pub async fn get_epoch_schedule(&self) -> ClientResult<EpochSchedule> {
        self.channel.call("getEpochSchedule", vec![]).await
    }

    pub async fn get_inflation(&self, commitment: Option<CommitmentLevel>) -> ClientResult<Inflation> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getInflation", params).await
    }

    pub async fn get_transaction_count(&self, commitment: Option<CommitmentLevel>) -> ClientResult<u64> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getTransactionCount", params).await
    }

    pub async fn get_total_supply(&self, commitment: Option<CommitmentLevel>) -> ClientResult<u64> {
        let params = self.with_commitment(vec![], commitment);
        self.channel.call("getTotalSupply", params).await
    }

    // ============ Blocks / transactions ============

    pub async fn get_recent_blockhash(
        &self,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<(Hash, FeeCalculator)> {
        let params = self.with_commitment(vec![], commitment);
        let response: RpcResponse<RecentBlockhash> = self.channel.call_with_context("getRecentBlockhash", params).await?;
        Ok((response.value.blockhash, response.value.fee_calculator))
    }

    pub async fn get_confirmed_block(&self, slot: Slot) -> ClientResult<ConfirmedBlock> {
        self.channel
            .call("getConfirmedBlock", vec![json!(slot), json!("base64")])
            .await
    }

    pub async fn confirm_transaction(
        &self,
        signature: &Signature,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<bool> {
        let params = self.with_commitment(vec![json!(signature.to_string())], commitment);
        let response: RpcResponse<bool> = self.channel.call_with_context("confirmTransaction", params).await?;
        Ok(response.value)
    }

    /// Processing status of a transaction; `None` if the node has not seen it
    pub async fn get_signature_status(
        &self,
        signature: &Signature,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<Option<SignatureStatus>> {
        let params = self.with_commitment(vec![json!(signature.to_string())], commitment);
        self.channel.call("getSignatureStatus", params).await
    }

    pub async fn request_airdrop(
        &self,
        to: &Pubkey,
        lamports: u64,
        commitment: Option<CommitmentLevel>,
    ) -> ClientResult<Signature> {
        let params = self.with_commitment(vec![json!(to.to_string()), json!(lamports)], commitment);
        let signature: String = self.channel.call("requestAirdrop", params).await?;
        signature
            .parse()
            .map_err(|e| ClientError::schema("requestAirdrop", format!("invalid signature: {e}")))
    }

    pub async fn send_raw_transaction(&self, wire_bytes: &[u8]) -> ClientResult<Signature> {
        self.channel.send_raw_transaction(wire_bytes).await
    }

    pub async fn send_encoded_transaction(&self, encoded: &str) -> ClientResult<Signature> {
        self.channel.send_encoded_transaction(encoded).await
    }

    /// Sign `transaction` against a fresh blockhash (or its durable nonce) and submit it
    pub async fn send_transaction<T>(&self, transaction: &mut T, signers: &[&Keypair]) -> ClientResult<Signature>
    where
        T: SignableTransaction + ?Sized,
    {
        let signature = self
            .blockhash_cache
            .sign_with_fresh_blockhash(transaction, signers, || self.fetch_blockhash())
            .await?;
        tracing::debug!("Sending transaction {}", signature);

        let wire_bytes = transaction.wire_bytes()?;
        self.send_raw_transaction(&wire_bytes).await
    }

    async fn fetch_blockhash(&self) -> ClientResult<Hash> {
        let (hash, _) = self.get_recent_blockhash(None).await?;
        Ok(hash)
    }

    // ============ Subscriptions ============

    /// Invoke `callback` whenever the account changes
    pub fn on_account_change<F>(&self, pubkey: &Pubkey, commitment: Option<CommitmentLevel>, callback: F) -> SubscriptionId
    where
        F: Fn(RpcResponse<AccountInfo>) + Send + Sync + 'static,
    {
        let commitment = commitment.or(self.config.commitment);
        self.subscriptions.register_account(pubkey, commitment, callback)
    }

    pub async fn remove_account_change_listener(&self, id: SubscriptionId) -> ClientResult<()> {
        self.subscriptions.remove(SubscriptionKind::Account, id).await
    }

    /// Invoke `callback` whenever an account owned by `program_id` changes
    pub fn on_program_account_change<F>(
        &self,
        program_id: &Pubkey,
        commitment: Option<CommitmentLevel>,
        callback: F,
    ) -> SubscriptionId
    where
        F: Fn(RpcResponse<KeyedAccountInfo>) + Send + Sync + 'static,
    {
        let commitment = commitment.or(self.config.commitment);
        self.subscriptions.register_program(program_id, commitment, callback)
    }

    pub async fn remove_program_account_change_listener(&self, id: SubscriptionId) -> ClientResult<()> {
        self.subscriptions.remove(SubscriptionKind::Program, id).await
    }

    pub fn on_slot_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(SlotInfo) + Send + Sync + 'static,
    {
        self.subscriptions.register_slot(callback)
    }

    pub async fn remove_slot_change_listener(&self, id: SubscriptionId) -> ClientResult<()> {
        self.subscriptions.remove(SubscriptionKind::Slot, id).await
    }

    /// Invoke `callback` once when `signature` is processed
    pub fn on_signature<F>(&self, signature: &Signature, commitment: Option<CommitmentLevel>, callback: F) -> SubscriptionId
    where
        F: Fn(RpcResponse<SignatureResult>) + Send + Sync + 'static,
    {
        let commitment = commitment.or(self.config.commitment);
        self.subscriptions.register_signature(signature, commitment, callback)
    }

    pub async fn remove_signature_listener(&self, id: SubscriptionId) -> ClientResult<()> {
        self.subscriptions.remove(SubscriptionKind::Signature, id).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}
