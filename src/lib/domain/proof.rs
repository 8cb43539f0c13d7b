use alloy::primitives::U256;
use serde::{
    Deserialize,
    Serialize,
};

use crate::crypto::field::{
    FieldError,
    decimal_to_be_bytes,
};

#[derive(Debug, thiserror::Error)]
pub enum ProofError {
    #[error("PROOF_GENERATION_FAILED: {0}")]
    GenerationFailed(String),
    #[error("INVALID_PROOF: generated proof did not verify")]
    InvalidProof,
    #[error("expected {expected} public inputs, found {found}")]
    PublicInputCount { expected: usize, found: usize },
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    #[error("malformed public signal: {0}")]
    PublicSignal(#[from] FieldError),
}

/// Groth16 proof as written by snarkjs (`proof.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

/// Proof plus public signals, both as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProof {
    pub proof: ProverProof,
    pub public_signals: Vec<String>,
}

/// Groth16 proof in the ledger's big-endian byte layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Groth16Proof {
    /// x | y
    pub a: [u8; 64],
    /// x.c1 | x.c0 | y.c1 | y.c0
    pub b: [u8; 128],
    /// x | y
    pub c: [u8; 64],
}

/// Base-field coordinate as little-endian bytes. Coordinates live in Fq,
/// which is wider than the scalar field, so no scalar-field check applies.
fn coordinate_le(value: &str) -> Result<[u8; 32], ProofError> {
    U256::from_str_radix(value.trim(), 10)
        .map(|v| v.to_le_bytes::<32>())
        .map_err(|_| ProofError::MalformedProof(format!("invalid coordinate {value}")))
}

fn coordinate_be(value: &str) -> Result<[u8; 32], ProofError> {
    let mut bytes = coordinate_le(value)?;
    bytes.reverse();
    Ok(bytes)
}

fn g1_be(point: &[String], name: &str) -> Result<[u8; 64], ProofError> {
    if point.len() < 2 {
        return Err(ProofError::MalformedProof(format!(
            "{name} needs 2 coordinates, found {}",
            point.len()
        )));
    }
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&coordinate_be(&point[0])?);
    out[32..].copy_from_slice(&coordinate_be(&point[1])?);
    Ok(out)
}

impl Groth16Proof {
    /// Convert snarkjs output into ledger bytes.
    ///
    /// Each Fp2 coordinate of `pi_b` is laid out little-endian as `c0 | c1`
    /// and the 64-byte block is then reversed, giving `c1 BE | c0 BE`.
    pub fn from_prover_output(proof: &ProverProof) -> Result<Self, ProofError> {
        let a = g1_be(&proof.pi_a, "pi_a")?;
        let c = g1_be(&proof.pi_c, "pi_c")?;

        if proof.pi_b.len() < 2 || proof.pi_b[..2].iter().any(|pair| pair.len() < 2) {
            return Err(ProofError::MalformedProof(
                "pi_b needs 2 Fp2 coordinates".to_string(),
            ));
        }
        let mut b = [0u8; 128];
        for (i, pair) in proof.pi_b[..2].iter().enumerate() {
            let mut block = [0u8; 64];
            block[..32].copy_from_slice(&coordinate_le(&pair[0])?);
            block[32..].copy_from_slice(&coordinate_le(&pair[1])?);
            block.reverse();
            b[i * 64..(i + 1) * 64].copy_from_slice(&block);
        }

        Ok(Self { a, b, c })
    }

    /// `a | b | c`, 256 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&self.a);
        out.extend_from_slice(&self.b);
        out.extend_from_slice(&self.c);
        out
    }
}

/// Public signals as big-endian 32-byte words.
pub fn public_signals_to_bytes(signals: &[String]) -> Result<Vec<[u8; 32]>, ProofError> {
    signals
        .iter()
        .map(|s| decimal_to_be_bytes(s).map_err(ProofError::from))
        .collect()
}

/// Circuit input map handed to the proof generator. Every value is a
/// decimal field element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofInputs {
    pub root: String,
    pub input_nullifier: Vec<String>,
    pub output_commitment: Vec<String>,
    pub public_amount_spl: String,
    pub public_amount_sol: String,
    pub public_mint_pubkey: String,
    pub tx_integrity_hash: String,
    pub in_amount: Vec<Vec<String>>,
    pub in_private_key: Vec<String>,
    pub in_blinding: Vec<String>,
    pub in_path_indices: Vec<String>,
    pub in_path_elements: Vec<Vec<String>>,
    pub asset_pubkeys: Vec<String>,
    pub out_amount: Vec<Vec<String>>,
    pub out_blinding: Vec<String>,
    pub out_pubkey: Vec<String>,
    pub in_indices: Vec<Vec<Vec<String>>>,
    pub out_indices: Vec<Vec<Vec<String>>>,
    pub in_app_data_hash: Vec<String>,
    pub out_app_data_hash: Vec<String>,
    pub in_pool_type: Vec<String>,
    pub out_pool_type: Vec<String>,
    pub in_verifier_pubkey: Vec<String>,
    pub out_verifier_pubkey: Vec<String>,
    pub transaction_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_app_verifier: Option<String>,
}

impl ProofInputs {
    /// Public signals in the order the circuit declares them.
    pub fn public_signals(&self) -> Vec<String> {
        let mut signals = vec![
            self.root.clone(),
            self.public_amount_spl.clone(),
            self.tx_integrity_hash.clone(),
            self.public_amount_sol.clone(),
            self.public_mint_pubkey.clone(),
        ];
        signals.extend(self.input_nullifier.iter().cloned());
        signals.extend(self.output_commitment.iter().cloned());
        signals.extend(self.transaction_hash.iter().cloned());
        signals.extend(self.public_app_verifier.iter().cloned());
        signals
    }
}

/// Public inputs in the order the verifier consumes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicInputs {
    pub root: [u8; 32],
    pub public_amount_spl: [u8; 32],
    pub tx_integrity_hash: [u8; 32],
    pub public_amount_sol: [u8; 32],
    pub public_mint_pubkey: [u8; 32],
    pub input_nullifiers: Vec<[u8; 32]>,
    pub output_commitments: Vec<[u8; 32]>,
    pub transaction_hash: Option<[u8; 32]>,
    pub public_app_verifier: Option<[u8; 32]>,
}

impl PublicInputs {
    pub fn to_vec(&self) -> Vec<[u8; 32]> {
        let mut out = vec![
            self.root,
            self.public_amount_spl,
            self.tx_integrity_hash,
            self.public_amount_sol,
            self.public_mint_pubkey,
        ];
        out.extend_from_slice(&self.input_nullifiers);
        out.extend_from_slice(&self.output_commitments);
        out.extend(self.transaction_hash);
        out.extend(self.public_app_verifier);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn proof() -> ProverProof {
        ProverProof {
            pi_a: strings(&["1", "2", "1"]),
            pi_b: vec![
                strings(&["3", "4"]),
                strings(&["5", "6"]),
                strings(&["1", "0"]),
            ],
            pi_c: strings(&["258", "7", "1"]),
            protocol: Some("groth16".to_string()),
            curve: Some("bn128".to_string()),
        }
    }

    #[test]
    fn test_g1_coordinates_are_big_endian() {
        let bytes = Groth16Proof::from_prover_output(&proof()).unwrap();
        assert_eq!(bytes.a[31], 1);
        assert_eq!(bytes.a[63], 2);
        assert!(bytes.a[..31].iter().all(|b| *b == 0));
        // 258 = 0x0102
        assert_eq!(&bytes.c[30..32], &[0x01, 0x02]);
    }

    #[test]
    fn test_g2_coordinates_swap_c0_c1() {
        let bytes = Groth16Proof::from_prover_output(&proof()).unwrap();
        // x = (c0: 3, c1: 4) -> 4 BE | 3 BE
        assert_eq!(bytes.b[31], 4);
        assert_eq!(bytes.b[63], 3);
        assert_eq!(bytes.b[95], 6);
        assert_eq!(bytes.b[127], 5);
        assert_eq!(bytes.to_bytes().len(), 256);
    }

    #[test]
    fn test_base_field_coordinate_above_scalar_modulus() {
        // Fq modulus - 1, larger than the scalar field modulus
        let big = "21888242871839275222246405745257275088696311157297823662689037894645226208582";
        let mut p = proof();
        p.pi_a[0] = big.to_string();
        assert!(Groth16Proof::from_prover_output(&p).is_ok());
    }

    #[test]
    fn test_malformed_proof() {
        let mut p = proof();
        p.pi_b.truncate(1);
        assert!(matches!(
            Groth16Proof::from_prover_output(&p),
            Err(ProofError::MalformedProof(_))
        ));
        let mut p = proof();
        p.pi_a[1] = "x".to_string();
        assert!(Groth16Proof::from_prover_output(&p).is_err());
    }

    #[test]
    fn test_public_signals_to_bytes() {
        let signals = strings(&["0", "513"]);
        let bytes = public_signals_to_bytes(&signals).unwrap();
        assert_eq!(bytes[0], [0u8; 32]);
        assert_eq!(&bytes[1][30..], &[0x02, 0x01]);

        let out_of_field =
            strings(&["21888242871839275222246405745257275088548364400416034343698204186575808495617"]);
        assert!(matches!(
            public_signals_to_bytes(&out_of_field),
            Err(ProofError::PublicSignal(FieldError::NotInField(_)))
        ));
    }

    #[test]
    fn test_prover_proof_json() {
        let json = r#"{"pi_a":["1","2","1"],"pi_b":[["3","4"],["5","6"],["1","0"]],"pi_c":["258","7","1"],"protocol":"groth16","curve":"bn128"}"#;
        let parsed: ProverProof = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, proof());
    }
}
