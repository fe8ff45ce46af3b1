//! Commitment levels accepted by query methods

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Finality level a query reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitmentLevel {
    /// Most recent block confirmed by a supermajority as having reached max lockout
    Max,
    /// Most recent block the node has voted on
    Recent,
    /// Most recent block rooted by the node
    Root,
    /// Most recent block with a single confirmation
    Single,
    /// Single confirmation, observed through gossip votes
    SingleGossip,
}

impl CommitmentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::Recent => "recent",
            Self::Root => "root",
            Self::Single => "single",
            Self::SingleGossip => "singleGossip",
        }
    }
}

impl std::fmt::Display for CommitmentLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommitmentLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max" => Ok(Self::Max),
            "recent" => Ok(Self::Recent),
            "root" => Ok(Self::Root),
            "single" => Ok(Self::Single),
            "singleGossip" | "single-gossip" => Ok(Self::SingleGossip),
            other => Err(format!("unknown commitment level: {other}")),
        }
    }
}

/// `{"commitment": level}` config object appended to query params
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentConfig {
    pub commitment: CommitmentLevel,
}
