use std::{
    future::Future,
    sync::Arc,
};

use crate::domain::{
    merkle::{
        LeafRecord,
        MerkleState,
    },
    nullifier::Nullifier,
};

/// Read access to the ledger holding the accumulator and the nullifier set.
///
/// Implementations:
/// - `MockLedger` (in-memory, tests and demo)
pub trait Ledger: Send + Sync {
    /// Root history, current root slot and next free leaf index.
    fn fetch_merkle_state(&self) -> impl Future<Output = Result<MerkleState, LedgerError>> + Send;

    /// Leaf pairs whose left leaf index is at least `from`.
    fn fetch_leaf_records(
        &self,
        from: u64,
    ) -> impl Future<Output = Result<Vec<LeafRecord>, LedgerError>> + Send;

    /// Whether `nullifier` has already been consumed.
    fn is_nullifier_spent(
        &self,
        nullifier: Nullifier,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send;
}

/// Several clients may watch the same ledger.
impl<T: Ledger> Ledger for Arc<T> {
    fn fetch_merkle_state(&self) -> impl Future<Output = Result<MerkleState, LedgerError>> + Send {
        (**self).fetch_merkle_state()
    }

    fn fetch_leaf_records(
        &self,
        from: u64,
    ) -> impl Future<Output = Result<Vec<LeafRecord>, LedgerError>> + Send {
        (**self).fetch_leaf_records(from)
    }

    fn is_nullifier_spent(
        &self,
        nullifier: Nullifier,
    ) -> impl Future<Output = Result<bool, LedgerError>> + Send {
        (**self).is_nullifier_spent(nullifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl LedgerError {
    /// Transport failures are worth retrying; malformed or missing data is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Timeout(_))
    }
}
