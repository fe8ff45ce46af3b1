//! Durable nonce account decoding

use crate::error::{ClientError, ClientResult};
use rpc_types::{FeeCalculator, NonceAccount};
use solana_sdk::nonce::state::{State, Versions};

/// Decode the data of a nonce account.
///
/// Fails when the data is not a nonce state or the nonce was never initialized.
pub fn decode_nonce_account(data: &[u8]) -> ClientResult<NonceAccount> {
    let versions: Versions = bincode::deserialize(data)
        .map_err(|e| ClientError::schema("getAccountInfo", format!("not a nonce account: {e}")))?;

    match versions.state() {
        State::Initialized(data) => Ok(NonceAccount {
            authorized_pubkey: data.authority,
            nonce: data.blockhash(),
            fee_calculator: FeeCalculator {
                lamports_per_signature: data.fee_calculator.lamports_per_signature,
            },
        }),
        State::Uninitialized => Err(ClientError::schema(
            "getAccountInfo",
            "nonce account is uninitialized",
        )),
    }
}
