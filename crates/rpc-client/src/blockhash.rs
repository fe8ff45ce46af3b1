//! Blockhash Cache - freshness tokens for transaction signing
//!
//! A fetched blockhash is reused for a fixed window. Every signature produced
//! under the cached hash is remembered; re-signing an identical payload under
//! the same hash would yield the same signature, so that case forces a new
//! hash before the transaction is handed back for submission.

use crate::{
    config::ConnectionConfig,
    error::{ClientError, ClientResult},
    transaction::SignableTransaction,
};
use solana_sdk::{
    hash::Hash,
    signature::{Keypair, Signature},
};
use std::{
    collections::HashSet,
    future::Future,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Cached blockhash and the signatures already produced under it
#[derive(Debug, Default)]
struct BlockhashEntry {
    hash: Option<Hash>,
    recorded_at: Option<Instant>,
    seen_signatures: HashSet<Signature>,
}

impl BlockhashEntry {
    fn fresh_hash(&self, validity: Duration) -> Option<Hash> {
        match (self.hash, self.recorded_at) {
            (Some(hash), Some(at)) if at.elapsed() < validity => Some(hash),
            _ => None,
        }
    }

    fn replace(&mut self, hash: Hash) {
        self.hash = Some(hash);
        self.recorded_at = Some(Instant::now());
        self.seen_signatures.clear();
    }

    /// Keep the hash (refresh must still see a change) but stop reusing it
    fn expire(&mut self) {
        self.recorded_at = None;
    }
}

/// Blockhash cache configuration
#[derive(Debug, Clone)]
pub struct BlockhashCacheConfig {
    pub validity: Duration,
    pub max_polls: usize,
    pub poll_interval: Duration,
    pub disable_caching: bool,
}

impl From<&ConnectionConfig> for BlockhashCacheConfig {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            validity: config.blockhash_validity(),
            max_polls: config.blockhash_max_polls,
            poll_interval: config.blockhash_poll_interval(),
            disable_caching: config.disable_blockhash_caching,
        }
    }
}

/// Supplies recent blockhashes and suppresses bit-identical resubmission
pub struct BlockhashCache {
    entry: Mutex<BlockhashEntry>,
    config: BlockhashCacheConfig,
}

impl BlockhashCache {
    pub fn new(config: BlockhashCacheConfig) -> Self {
        Self {
            entry: Mutex::new(BlockhashEntry::default()),
            config,
        }
    }

    /// Sign `transaction` against a fresh blockhash.
    ///
    /// Nonce-backed transactions are signed against their nonce and skip the
    /// cache. Otherwise the cached hash is used while valid; `fetch` is polled
    /// (at most `max_polls` times) whenever a new hash is needed. Returns the
    /// signature that will be submitted.
    ///
    /// The cache lock is held for the whole resolution so concurrent sends
    /// observe each other's signatures.
    pub async fn sign_with_fresh_blockhash<T, F, Fut>(
        &self,
        transaction: &mut T,
        signers: &[&Keypair],
        mut fetch: F,
    ) -> ClientResult<Signature>
    where
        T: SignableTransaction + ?Sized,
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<Hash>>,
    {
        if let Some(nonce) = transaction.nonce() {
            tracing::debug!("Signing against durable nonce {}", nonce);
            return transaction.sign(signers, nonce);
        }

        let mut entry = self.entry.lock().await;

        loop {
            if let Some(hash) = entry.fresh_hash(self.config.validity) {
                let signature = transaction.sign(signers, hash)?;

                if entry.seen_signatures.insert(signature) {
                    if self.config.disable_caching {
                        entry.expire();
                    }
                    return Ok(signature);
                }

                tracing::debug!(
                    "Signature {} already sent under blockhash {}, forcing refresh",
                    signature,
                    hash
                );
            }

            let hash = self.poll_new_blockhash(entry.hash, &mut fetch).await?;
            entry.replace(hash);
        }
    }

    /// Poll until the node reports a hash different from `previous`
    async fn poll_new_blockhash<F, Fut>(&self, previous: Option<Hash>, fetch: &mut F) -> ClientResult<Hash>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<Hash>>,
    {
        let start = Instant::now();

        for attempt in 1..=self.config.max_polls {
            let hash = fetch().await?;
            if Some(hash) != previous {
                tracing::debug!("New blockhash {} after {} poll(s)", hash, attempt);
                return Ok(hash);
            }

            if attempt < self.config.max_polls {
                tokio::time::sleep(self.config.poll_interval).await;
            }
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        tracing::warn!(
            "Blockhash unchanged after {} polls ({}ms)",
            self.config.max_polls,
            elapsed_ms
        );

        Err(ClientError::Timeout {
            elapsed_ms,
            attempts: self.config.max_polls,
        })
    }

    /// Currently cached hash, if still valid
    pub async fn cached_blockhash(&self) -> Option<Hash> {
        self.entry.lock().await.fresh_hash(self.config.validity)
    }
}
