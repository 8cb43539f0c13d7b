use std::fmt;

use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

/// Revealed when a UTXO is spent; the ledger rejects a nullifier it has seen before.
/// nullifier = poseidon3(commitment, index, signature)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nullifier(pub B256);

impl Nullifier {
    /// From a big-endian public input.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(B256::from(bytes))
    }
}

impl fmt::Display for Nullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
