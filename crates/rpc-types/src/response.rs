//! Result types for RPC methods and pubsub notifications

use crate::serde_utils::{account_data, display_fromstr, encoded_transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{
    clock::Slot, hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction,
};

// ============ Envelopes ============

/// Slot context attached to context-wrapped results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponseContext {
    pub slot: Slot,
}

/// Context-wrapped result: `{context: {slot}, value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse<T> {
    pub context: RpcResponseContext,
    pub value: T,
}

/// Pubsub notification params: `{subscription, result}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationParams<T> {
    pub subscription: u64,
    pub result: T,
}

// ============ Accounts ============

/// Decoded account as reported by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub lamports: u64,
    #[serde(with = "display_fromstr")]
    pub owner: Pubkey,
    #[serde(with = "account_data")]
    pub data: Vec<u8>,
    pub executable: bool,
    #[serde(default)]
    pub rent_epoch: u64,
}

/// Account paired with its address (program account scans)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedAccountInfo {
    #[serde(with = "display_fromstr")]
    pub pubkey: Pubkey,
    pub account: AccountInfo,
}

/// Decoded durable nonce account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceAccount {
    pub authorized_pubkey: Pubkey,
    pub nonce: Hash,
    pub fee_calculator: FeeCalculator,
}

// ============ Cluster ============

/// Gossip view of a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(with = "display_fromstr")]
    pub pubkey: Pubkey,
    pub gossip: Option<String>,
    pub tpu: Option<String>,
    pub rpc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAccountInfo {
    #[serde(with = "display_fromstr")]
    pub vote_pubkey: Pubkey,
    #[serde(with = "display_fromstr")]
    pub node_pubkey: Pubkey,
    pub activated_stake: u64,
    pub commission: u8,
    pub epoch_vote_account: bool,
    pub last_vote: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAccountStatus {
    pub current: Vec<VoteAccountInfo>,
    pub delinquent: Vec<VoteAccountInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "solana-core")]
    pub solana_core: String,
    #[serde(rename = "feature-set", default, skip_serializing_if = "Option::is_none")]
    pub feature_set: Option<u32>,
}

// ============ Epochs / economics ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochInfo {
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub absolute_slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSchedule {
    pub slots_per_epoch: u64,
    pub leader_schedule_slot_offset: u64,
    pub warmup: bool,
    pub first_normal_epoch: u64,
    pub first_normal_slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inflation {
    pub initial: f64,
    pub terminal: f64,
    pub taper: f64,
    pub foundation: f64,
    pub foundation_term: f64,
    #[serde(default)]
    pub storage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeCalculator {
    pub lamports_per_signature: u64,
}

/// `getRecentBlockhash` value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentBlockhash {
    #[serde(with = "display_fromstr")]
    pub blockhash: Hash,
    pub fee_calculator: FeeCalculator,
}

// ============ Transactions / blocks ============

/// Signature status: `{"Ok": null}` or `{"Err": <error>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SignatureStatus {
    Ok(()),
    Err(Value),
}

impl SignatureStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(()))
    }
}

/// Value of a `signatureNotification`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureResult {
    pub err: Option<Value>,
}

/// Result of a `slotNotification`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub parent: Slot,
    pub slot: Slot,
    pub root: Slot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMeta {
    pub fee: u64,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    #[serde(default)]
    pub err: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    #[serde(with = "encoded_transaction")]
    pub transaction: Transaction,
    pub meta: Option<TransactionMeta>,
}

impl ConfirmedTransaction {
    /// First signature of the transaction, if it was signed
    pub fn signature(&self) -> Option<&Signature> {
        self.transaction.signatures.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    #[serde(with = "display_fromstr")]
    pub pubkey: Pubkey,
    pub lamports: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBlock {
    #[serde(with = "display_fromstr")]
    pub blockhash: Hash,
    #[serde(with = "display_fromstr")]
    pub previous_blockhash: Hash,
    pub parent_slot: Slot,
    pub transactions: Vec<ConfirmedTransaction>,
    #[serde(default)]
    pub rewards: Vec<Reward>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_info_from_wire() {
        let owner = Pubkey::new_unique();
        let value = json!({
            "lamports": 42,
            "owner": owner.to_string(),
            "data": ["AQID", "base64"],
            "executable": false,
            "rentEpoch": 3
        });

        let account: AccountInfo = serde_json::from_value(value).unwrap();
        assert_eq!(account.lamports, 42);
        assert_eq!(account.owner, owner);
        assert_eq!(account.data, vec![1, 2, 3]);
        assert_eq!(account.rent_epoch, 3);
    }

    #[test]
    fn test_account_info_rejects_bad_owner() {
        let value = json!({
            "lamports": 42,
            "owner": "not-a-key",
            "data": ["", "base64"],
            "executable": false
        });
        assert!(serde_json::from_value::<AccountInfo>(value).is_err());
    }

    #[test]
    fn test_signature_status_variants() {
        let ok: SignatureStatus = serde_json::from_value(json!({"Ok": null})).unwrap();
        assert!(ok.is_ok());

        let err: SignatureStatus =
            serde_json::from_value(json!({"Err": {"InstructionError": [0, "Custom"]}})).unwrap();
        assert!(!err.is_ok());

        let missing: Option<SignatureStatus> = serde_json::from_value(Value::Null).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_context_wrapped_balance() {
        let response: RpcResponse<u64> =
            serde_json::from_value(json!({"context": {"slot": 11}, "value": 500})).unwrap();
        assert_eq!(response.context.slot, 11);
        assert_eq!(response.value, 500);
    }
}
