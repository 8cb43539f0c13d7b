//! Client-side construction of shielded UTXO transactions.
//!
//! Accounts derive keys from a seed; UTXOs commit to amounts and owners;
//! the Merkle accumulator mirrors the ledger's commitment tree; the selector
//! picks inputs and shapes outputs; transaction parameters validate one
//! action; the assembler turns everything into circuit inputs and a verified
//! Groth16 proof.

pub mod adapters;
pub mod assembler;
pub mod client;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod error;
pub mod ports;
pub mod sync;

pub use assembler::{
    ProofInputAssembler,
    ProvedTransaction,
};
pub use client::{
    ShieldedClient,
    TransactionRequest,
};
pub use config::EngineConfig;
pub use error::{
    EngineError,
    StateError,
};
