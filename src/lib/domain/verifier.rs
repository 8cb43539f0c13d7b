use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

use super::proof::{
    ProofError,
    PublicInputs,
};
use crate::crypto::field::hash_and_truncate;

/// Public inputs shared by every variant: root, publicAmountSpl,
/// txIntegrityHash, publicAmountSol, publicMintPubkey.
const FIXED_PUBLIC_INPUTS: usize = 5;

/// Circuit variant a transaction is proven against.
///
/// Each variant fixes the input/output arity and the number of public inputs
/// the on-ledger verifier expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VerifierConfig {
    /// 2 inputs, 2 outputs.
    Zero,
    /// 10 inputs, 2 outputs.
    One,
    /// 4 inputs, 4 outputs, bound to an application verifier.
    Two,
    Custom {
        in_arity: usize,
        out_arity: usize,
        /// Adds transactionHash and publicAppVerifier to the public inputs.
        app_inputs: bool,
        program_id: B256,
    },
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::Zero
    }
}

impl VerifierConfig {
    pub fn in_arity(&self) -> usize {
        match self {
            Self::Zero => 2,
            Self::One => 10,
            Self::Two => 4,
            Self::Custom { in_arity, .. } => *in_arity,
        }
    }

    pub fn out_arity(&self) -> usize {
        match self {
            Self::Zero | Self::One => 2,
            Self::Two => 4,
            Self::Custom { out_arity, .. } => *out_arity,
        }
    }

    /// Whether the circuit also exposes transactionHash and publicAppVerifier.
    pub fn has_app_inputs(&self) -> bool {
        match self {
            Self::Zero | Self::One => false,
            Self::Two => true,
            Self::Custom { app_inputs, .. } => *app_inputs,
        }
    }

    pub fn public_input_count(&self) -> usize {
        let app = if self.has_app_inputs() { 2 } else { 0 };
        FIXED_PUBLIC_INPUTS + self.in_arity() + self.out_arity() + app
    }

    /// Identifier of the on-ledger verifier program.
    pub fn program_id(&self) -> B256 {
        match self {
            Self::Zero => hash_and_truncate(b"verifier_program_zero"),
            Self::One => hash_and_truncate(b"verifier_program_one"),
            Self::Two => hash_and_truncate(b"verifier_program_two"),
            Self::Custom { program_id, .. } => *program_id,
        }
    }

    /// Split a flat list of big-endian public inputs into named fields.
    pub fn parse_public_inputs(&self, inputs: &[[u8; 32]]) -> Result<PublicInputs, ProofError> {
        if inputs.len() != self.public_input_count() {
            return Err(ProofError::PublicInputCount {
                expected: self.public_input_count(),
                found: inputs.len(),
            });
        }

        let nullifiers_end = FIXED_PUBLIC_INPUTS + self.in_arity();
        let commitments_end = nullifiers_end + self.out_arity();
        let (transaction_hash, public_app_verifier) = if self.has_app_inputs() {
            (Some(inputs[commitments_end]), Some(inputs[commitments_end + 1]))
        } else {
            (None, None)
        };

        Ok(PublicInputs {
            root: inputs[0],
            public_amount_spl: inputs[1],
            tx_integrity_hash: inputs[2],
            public_amount_sol: inputs[3],
            public_mint_pubkey: inputs[4],
            input_nullifiers: inputs[FIXED_PUBLIC_INPUTS..nullifiers_end].to_vec(),
            output_commitments: inputs[nullifiers_end..commitments_end].to_vec(),
            transaction_hash,
            public_app_verifier,
        })
    }
}
