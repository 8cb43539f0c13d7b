use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    crypto::{
        field::u64_to_b256,
        poseidon::poseidon3,
    },
    domain::nullifier::Nullifier,
};

/// The public identifier of a UTXO once inserted into the accumulator.
/// commitment = poseidon6(amount_hash, owner, blinding, asset_hash, app_data_hash, pool_type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub B256);

impl Commitment {
    /// Nullifier for this commitment at leaf `index`, given the owner's signature.
    /// nullifier = poseidon3(commitment, index, signature)
    pub fn nullifier(&self, index: u64, signature: B256) -> Nullifier {
        Nullifier(poseidon3(self.0, u64_to_b256(index), signature))
    }
}
