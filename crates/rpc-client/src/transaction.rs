//! Transaction capability used by the send path
//!
//! The connection never builds transactions itself; it only needs to set a
//! freshness token, sign, read back the signature and serialize.

use crate::error::{ClientError, ClientResult};
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::Message,
    signature::{Keypair, Signature},
    transaction::Transaction,
};

/// A transaction the connection can sign and submit
pub trait SignableTransaction {
    /// Durable nonce backing this transaction, if any.
    ///
    /// Nonce-backed transactions are signed against the nonce and bypass the
    /// blockhash cache entirely.
    fn nonce(&self) -> Option<Hash>;

    /// Set `recent_blockhash` as the freshness token and sign with `signers`
    fn sign(&mut self, signers: &[&Keypair], recent_blockhash: Hash) -> ClientResult<Signature>;

    /// Signed wire bytes
    fn wire_bytes(&self) -> ClientResult<Vec<u8>>;
}

fn sign_transaction(
    transaction: &mut Transaction,
    signers: &[&Keypair],
    recent_blockhash: Hash,
) -> ClientResult<Signature> {
    transaction
        .try_sign(signers, recent_blockhash)
        .map_err(|e| ClientError::Signing(e.to_string()))?;

    transaction
        .signatures
        .first()
        .copied()
        .ok_or_else(|| ClientError::Signing("transaction has no signatures".to_string()))
}

impl SignableTransaction for Transaction {
    fn nonce(&self) -> Option<Hash> {
        None
    }

    fn sign(&mut self, signers: &[&Keypair], recent_blockhash: Hash) -> ClientResult<Signature> {
        sign_transaction(self, signers, recent_blockhash)
    }

    fn wire_bytes(&self) -> ClientResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ClientError::InvalidInput(e.to_string()))
    }
}

/// Durable nonce data supplied by the caller
#[derive(Debug, Clone)]
pub struct NonceInfo {
    /// Current nonce value of the nonce account
    pub nonce: Hash,
    /// `AdvanceNonceAccount` instruction, expected first in the message
    pub nonce_instruction: Instruction,
}

/// Transaction that may carry durable nonce data
#[derive(Debug, Clone)]
pub struct NonceTransaction {
    pub transaction: Transaction,
    pub nonce_info: Option<NonceInfo>,
}

impl NonceTransaction {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            nonce_info: None,
        }
    }

    pub fn with_nonce(mut self, nonce_info: NonceInfo) -> Self {
        self.nonce_info = Some(nonce_info);
        self
    }
}

/// Instructions of a compiled message, with account flags taken from the header
fn decompile(message: &Message) -> ClientResult<Vec<Instruction>> {
    let keys = &message.account_keys;
    let signed = usize::from(message.header.num_required_signatures);
    let readonly_signed = usize::from(message.header.num_readonly_signed_accounts);
    let readonly_unsigned = usize::from(message.header.num_readonly_unsigned_accounts);
    let key = |index: u8| {
        keys.get(usize::from(index))
            .copied()
            .ok_or_else(|| ClientError::InvalidInput(format!("account index {index} out of range")))
    };

    message
        .instructions
        .iter()
        .map(|compiled| {
            let accounts = compiled
                .accounts
                .iter()
                .map(|&index| {
                    let i = usize::from(index);
                    let is_signer = i < signed;
                    let is_writable = if is_signer {
                        i < signed.saturating_sub(readonly_signed)
                    } else {
                        i < keys.len().saturating_sub(readonly_unsigned)
                    };
                    Ok(AccountMeta {
                        pubkey: key(index)?,
                        is_signer,
                        is_writable,
                    })
                })
                .collect::<ClientResult<Vec<_>>>()?;

            Ok(Instruction {
                program_id: key(compiled.program_id_index)?,
                accounts,
                data: compiled.data.clone(),
            })
        })
        .collect()
}

fn same_instruction(a: &Instruction, b: &Instruction) -> bool {
    a.program_id == b.program_id
        && a.data == b.data
        && a.accounts.iter().map(|meta| meta.pubkey).eq(b.accounts.iter().map(|meta| meta.pubkey))
}

impl NonceTransaction {
    /// Put the advance-nonce instruction first if the message does not already start with it
    fn prepend_nonce_instruction(&mut self) -> ClientResult<()> {
        let Some(info) = &self.nonce_info else {
            return Ok(());
        };

        let mut instructions = decompile(&self.transaction.message)?;
        if instructions
            .first()
            .is_some_and(|first| same_instruction(first, &info.nonce_instruction))
        {
            return Ok(());
        }

        let payer = self.transaction.message.account_keys.first().copied();
        instructions.insert(0, info.nonce_instruction.clone());
        self.transaction = Transaction::new_unsigned(Message::new(&instructions, payer.as_ref()));
        Ok(())
    }
}

impl SignableTransaction for NonceTransaction {
    fn nonce(&self) -> Option<Hash> {
        self.nonce_info.as_ref().map(|info| info.nonce)
    }

    fn sign(&mut self, signers: &[&Keypair], recent_blockhash: Hash) -> ClientResult<Signature> {
        self.prepend_nonce_instruction()?;
        sign_transaction(&mut self.transaction, signers, recent_blockhash)
    }

    fn wire_bytes(&self) -> ClientResult<Vec<u8>> {
        self.transaction.wire_bytes()
    }
}
