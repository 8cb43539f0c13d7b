use alloy::primitives::B256;
use thiserror::Error;

use crate::{
    config::ConfigError,
    domain::{
        account::AccountError,
        merkle::{
            ConsistencyError,
            MerkleError,
        },
        proof::ProofError,
        selector::SelectionError,
        transaction_params::ValidationError,
        utxo::UtxoError,
    },
    ports::ledger::LedgerError,
};

/// Ledger state that forbids the transaction regardless of retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("NULLIFIER_ALREADY_SPENT: input {input} nullifier {nullifier} is already spent")]
    NullifierAlreadySpent { input: usize, nullifier: B256 },
}

/// Any failure surfaced while building, proving or syncing a transaction.
///
/// Requests that contradict the ledger state are split by where they are
/// caught. A spent input is [`EngineError::State`]. A missing relayer on
/// unshield or transfer is caught during input selection and surfaces as
/// [`EngineError::Selection`] with `RelayerFeeUndefined`; parameters built
/// without the client report it as [`EngineError::Validation`] with
/// `RelayerUndefined`. A relayer named on shield maps the same way to
/// `RelayerFeeDefined` and `RelayerDefined`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Utxo(#[from] UtxoError),

    #[error(transparent)]
    Merkle(#[from] MerkleError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Consistency(#[from] ConsistencyError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
