//! Serde adapters for the JSON encodings used on the wire
//!
//! Keys, hashes and signatures travel as base58 strings; binary payloads
//! travel as `[data, encoding]` pairs.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de, Deserialize, Deserializer, Serializer};
use solana_sdk::transaction::Transaction;
use std::{fmt::Display, str::FromStr};

/// Values carried as their `Display` string (Pubkey, Hash, Signature)
pub mod display_fromstr {
    use super::*;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Decode a `[data, encoding]` pair into raw bytes
pub fn decode_encoded_bytes(data: &str, encoding: &str) -> Result<Vec<u8>, String> {
    match encoding {
        "base64" => BASE64.decode(data).map_err(|e| format!("invalid base64: {e}")),
        // "binary" is the legacy name for base58
        "base58" | "binary" => bs58::decode(data)
            .into_vec()
            .map_err(|e| format!("invalid base58: {e}")),
        other => Err(format!("unsupported encoding: {other}")),
    }
}

/// Account data as `[data, encoding]`
pub mod account_data {
    use super::*;
    use serde::Serialize;

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        (BASE64.encode(data), "base64").serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let (data, encoding) = <(String, String)>::deserialize(deserializer)?;
        decode_encoded_bytes(&data, &encoding).map_err(de::Error::custom)
    }
}

/// Wire transaction as `[data, encoding]`, decoded with bincode
pub mod encoded_transaction {
    use super::*;
    use serde::Serialize;

    pub fn serialize<S: Serializer>(tx: &Transaction, serializer: S) -> Result<S::Ok, S::Error> {
        let bytes = bincode::serialize(tx).map_err(serde::ser::Error::custom)?;
        (BASE64.encode(bytes), "base64").serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Transaction, D::Error> {
        let (data, encoding) = <(String, String)>::deserialize(deserializer)?;
        let bytes = decode_encoded_bytes(&data, &encoding).map_err(de::Error::custom)?;
        bincode::deserialize(&bytes).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_encodings() {
        assert_eq!(decode_encoded_bytes("AQID", "base64").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_encoded_bytes("Ldp", "base58").unwrap(), vec![1, 2, 3]);
        assert!(decode_encoded_bytes("AQID", "jsonParsed").is_err());
        assert!(decode_encoded_bytes("!!!", "base64").is_err());
    }
}
