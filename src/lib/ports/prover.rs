use std::future::Future;

use thiserror::Error;

use crate::domain::proof::{
    ProofInputs,
    RawProof,
};

/// Failures reported by a proof generator.
#[derive(Debug, Error)]
pub enum ProverError {
    /// The circuit rejected the input map.
    #[error("witness computation failed: {0}")]
    WitnessError(String),

    #[error("groth16 prove failed: {0}")]
    ProofGenerationError(String),

    #[error("groth16 verify failed: {0}")]
    VerificationError(String),

    #[error("prover I/O: {0}")]
    IoError(#[from] std::io::Error),

    /// input.json, proof.json or public.json could not be (de)serialized.
    #[error("prover JSON: {0}")]
    SerializationError(String),
}

/// Generates and checks Groth16 proofs for the transaction circuit.
///
/// Implementations may shell out to an external prover (snarkjs) or stand in
/// for one in tests.
pub trait Prover: Send + Sync {
    /// Generate a proof from the circuit input map.
    fn prove(
        &self,
        inputs: &ProofInputs,
    ) -> impl Future<Output = Result<RawProof, ProverError>> + Send;

    /// Verify a proof against its own public signals.
    fn verify(&self, proof: &RawProof) -> impl Future<Output = Result<bool, ProverError>> + Send;
}
