use std::time::Duration;

use alloy::primitives::B256;
use tracing::{
    debug,
    info,
    warn,
};

use crate::{
    crypto::field::{
        hash_and_truncate,
        to_decimal,
    },
    domain::{
        merkle::{
            ConsistencyError,
            MerkleAccumulator,
            MerklePath,
            MerkleState,
        },
        proof::{
            Groth16Proof,
            ProofError,
            ProofInputs,
            PublicInputs,
            RawProof,
            public_signals_to_bytes,
        },
        transaction_params::{
            N_ASSET_PUBKEYS,
            TransactionParameters,
            ValidationError,
        },
        utxo::Utxo,
    },
    error::EngineError,
    ports::prover::Prover,
};

/// Version tag the circuit binds every transaction to.
pub const TRANSACTION_VERSION: u64 = 0;

/// A transaction ready for submission: ledger-format proof and public inputs
/// plus everything the ledger needs alongside them.
#[derive(Debug, Clone)]
pub struct ProvedTransaction {
    pub proof: Groth16Proof,
    pub public_inputs: PublicInputs,
    /// Slot of the proven root in the ledger's root history.
    pub root_index: u64,
    pub encrypted_utxos: Vec<u8>,
    pub params: TransactionParameters,
}

/// Authentication paths for every (padded) input.
///
/// Zero-amount placeholders get index 0 and an all-zero path. Any other input
/// must carry its leaf index and its commitment must sit at that leaf.
pub fn merkle_proofs(
    params: &TransactionParameters,
    accumulator: &MerkleAccumulator,
) -> Result<Vec<MerklePath>, EngineError> {
    params
        .input_utxos()
        .iter()
        .enumerate()
        .map(|(i, utxo)| {
            if utxo.is_zero() {
                return Ok(MerklePath::zero(accumulator.height()));
            }
            let index = utxo.index().ok_or(ValidationError::InputIndexUnset(i))?;
            let commitment = utxo.commitment();
            if accumulator.leaf(index) != Some(commitment.0) {
                return Err(ConsistencyError::CommitmentNotInTree {
                    commitment: commitment.0,
                    index,
                }
                .into());
            }
            Ok(accumulator.path(index)?)
        })
        .collect()
}

/// One-hot selector `[utxo][asset slot][asset pubkey]` telling the circuit
/// which transaction asset each UTXO slot refers to.
pub fn indices(
    utxos: &[Utxo],
    asset_pubkeys_circuit: &[B256; N_ASSET_PUBKEYS],
) -> Vec<Vec<Vec<String>>> {
    utxos
        .iter()
        .map(|utxo| {
            utxo.assets_circuit()
                .iter()
                .map(|asset| {
                    let mut row = vec!["0".to_string(); N_ASSET_PUBKEYS];
                    if let Some(k) = asset_pubkeys_circuit
                        .iter()
                        .position(|pubkey| *pubkey != B256::ZERO && pubkey == asset)
                    {
                        row[k] = "1".to_string();
                    }
                    row
                })
                .collect()
        })
        .collect()
}

fn decimals(values: impl IntoIterator<Item = B256>) -> Vec<String> {
    values.into_iter().map(|v| to_decimal(&v)).collect()
}

fn amounts(utxos: &[Utxo]) -> Vec<Vec<String>> {
    utxos
        .iter()
        .map(|u| u.amounts().iter().map(|a| a.to_string()).collect())
        .collect()
}

/// Build the circuit input map for `params` against the current accumulator.
pub fn compile(
    params: &TransactionParameters,
    accumulator: &MerkleAccumulator,
) -> Result<ProofInputs, EngineError> {
    let paths = merkle_proofs(params, accumulator)?;
    let nullifiers = params.input_nullifiers()?;
    let private_key = to_decimal(&params.account().private_scalar()?);
    let inputs = params.input_utxos();
    let outputs = params.output_utxos();
    let verifier = params.verifier();

    let (transaction_hash, public_app_verifier) = if verifier.has_app_inputs() {
        (
            Some(to_decimal(&params.transaction_hash()?)),
            Some(to_decimal(&hash_and_truncate(
                verifier.program_id().as_slice(),
            ))),
        )
    } else {
        (None, None)
    };

    Ok(ProofInputs {
        root: to_decimal(&accumulator.root()),
        input_nullifier: decimals(nullifiers.iter().map(|n| n.0)),
        output_commitment: decimals(outputs.iter().map(|u| u.commitment().0)),
        public_amount_spl: params.public_amount_spl().to_string(),
        public_amount_sol: params.public_amount_sol().to_string(),
        public_mint_pubkey: to_decimal(&params.public_mint_circuit()),
        tx_integrity_hash: to_decimal(&params.tx_integrity_hash()),
        in_amount: amounts(inputs),
        in_private_key: vec![private_key; inputs.len()],
        in_blinding: decimals(inputs.iter().map(Utxo::blinding)),
        in_path_indices: paths.iter().map(|p| p.leaf_index.to_string()).collect(),
        in_path_elements: paths.iter().map(|p| decimals(p.elements.iter().copied())).collect(),
        asset_pubkeys: decimals(params.asset_pubkeys_circuit().iter().copied()),
        out_amount: amounts(outputs),
        out_blinding: decimals(outputs.iter().map(Utxo::blinding)),
        out_pubkey: decimals(outputs.iter().map(Utxo::owner)),
        in_indices: indices(inputs, params.asset_pubkeys_circuit()),
        out_indices: indices(outputs, params.asset_pubkeys_circuit()),
        in_app_data_hash: decimals(inputs.iter().map(Utxo::app_data_hash)),
        out_app_data_hash: decimals(outputs.iter().map(Utxo::app_data_hash)),
        in_pool_type: inputs.iter().map(|u| u.pool_type().to_string()).collect(),
        out_pool_type: outputs.iter().map(|u| u.pool_type().to_string()).collect(),
        in_verifier_pubkey: decimals(inputs.iter().map(Utxo::verifier_address_circuit)),
        out_verifier_pubkey: decimals(outputs.iter().map(Utxo::verifier_address_circuit)),
        transaction_version: TRANSACTION_VERSION.to_string(),
        transaction_hash,
        public_app_verifier,
    })
}

/// Turns validated transaction parameters into a verified proof.
pub struct ProofInputAssembler<P> {
    prover: P,
    timeout: Duration,
}

impl<P: Prover> ProofInputAssembler<P> {
    pub fn new(prover: P, timeout: Duration) -> Self {
        Self { prover, timeout }
    }

    pub fn prover(&self) -> &P {
        &self.prover
    }

    /// Compile inputs, generate the proof, verify it locally and convert it
    /// to the ledger's byte layout.
    ///
    /// `state` is the ledger's view fetched for this transaction; the local
    /// root must appear in its root history.
    pub async fn prove(
        &self,
        params: TransactionParameters,
        accumulator: &MerkleAccumulator,
        state: &MerkleState,
    ) -> Result<ProvedTransaction, EngineError> {
        let inputs = compile(&params, accumulator)?;
        let root_index = state.root_index(&accumulator.root())?;
        debug!(
            action = %params.action(),
            root_index,
            "Compiled proof inputs"
        );

        let raw = self.generate(&inputs).await?;
        self.check(&raw, &inputs).await?;

        let proof = Groth16Proof::from_prover_output(&raw.proof)?;
        let signals = public_signals_to_bytes(&raw.public_signals)?;
        let public_inputs = params.verifier().parse_public_inputs(&signals)?;
        info!(
            action = %params.action(),
            public_inputs = signals.len(),
            "Proof generated and verified"
        );

        Ok(ProvedTransaction {
            proof,
            public_inputs,
            root_index,
            encrypted_utxos: params.encrypted_utxos().to_vec(),
            params,
        })
    }

    async fn generate(&self, inputs: &ProofInputs) -> Result<RawProof, ProofError> {
        match tokio::time::timeout(self.timeout, self.prover.prove(inputs)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e)) => {
                warn!(error = %e, "Proof generation failed");
                Err(ProofError::GenerationFailed(e.to_string()))
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "Proof generation timed out");
                Err(ProofError::GenerationFailed(format!(
                    "timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    async fn check(&self, raw: &RawProof, inputs: &ProofInputs) -> Result<(), ProofError> {
        if raw.public_signals != inputs.public_signals() {
            return Err(ProofError::MalformedProof(
                "public signals do not match the compiled inputs".to_string(),
            ));
        }
        match self.prover.verify(raw).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProofError::InvalidProof),
            Err(e) => {
                warn!(error = %e, "Local proof verification errored");
                Err(ProofError::InvalidProof)
            }
        }
    }
}
