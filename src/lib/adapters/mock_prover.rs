use std::time::Duration;

use alloy::primitives::{
    U256,
    keccak256,
};

use crate::{
    crypto::field::to_field,
    domain::proof::{
        ProofInputs,
        ProverProof,
        RawProof,
    },
    ports::prover::{
        Prover,
        ProverError,
    },
};

/// Deterministic stand-in for a Groth16 prover.
///
/// The "proof" is a digest of the public signals, so verification catches any
/// tampering with them. Generation and verification can be forced to fail.
#[derive(Debug, Clone, Default)]
pub struct MockProver {
    fail_generation: bool,
    fail_verification: bool,
    delay: Option<Duration>,
}

impl MockProver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `prove` call errors.
    pub fn failing_generation() -> Self {
        Self {
            fail_generation: true,
            ..Self::default()
        }
    }

    /// Proofs are produced but never verify.
    pub fn failing_verification() -> Self {
        Self {
            fail_verification: true,
            ..Self::default()
        }
    }

    /// Sleep before answering `prove`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

fn digest(signals: &[String], domain: u8) -> String {
    let mut preimage = vec![domain];
    for signal in signals {
        preimage.extend_from_slice(signal.as_bytes());
        preimage.push(b',');
    }
    to_field(U256::from_be_bytes(keccak256(&preimage).0)).to_string()
}

fn proof_for(signals: &[String]) -> ProverProof {
    let coordinate = |domain| digest(signals, domain);
    ProverProof {
        pi_a: vec![coordinate(0), coordinate(1), "1".to_string()],
        pi_b: vec![
            vec![coordinate(2), coordinate(3)],
            vec![coordinate(4), coordinate(5)],
            vec!["1".to_string(), "0".to_string()],
        ],
        pi_c: vec![coordinate(6), coordinate(7), "1".to_string()],
        protocol: Some("groth16".to_string()),
        curve: Some("bn128".to_string()),
    }
}

impl Prover for MockProver {
    async fn prove(&self, inputs: &ProofInputs) -> Result<RawProof, ProverError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_generation {
            return Err(ProverError::WitnessError(
                "mock prover configured to fail".to_string(),
            ));
        }
        let public_signals = inputs.public_signals();
        Ok(RawProof {
            proof: proof_for(&public_signals),
            public_signals,
        })
    }

    async fn verify(&self, proof: &RawProof) -> Result<bool, ProverError> {
        if self.fail_verification {
            return Ok(false);
        }
        Ok(proof.proof == proof_for(&proof.public_signals))
    }
}
