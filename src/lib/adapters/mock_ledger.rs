use std::collections::{
    HashSet,
    VecDeque,
};

use alloy::primitives::B256;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    assembler::ProvedTransaction,
    domain::{
        merkle::{
            LEAF_RECORD_ENCRYPTED_OUTPUTS_LENGTH,
            LeafRecord,
            MerkleAccumulator,
            MerkleError,
            MerkleState,
        },
        nullifier::Nullifier,
    },
    ports::ledger::{
        Ledger,
        LedgerError,
    },
};

struct LedgerState {
    tree: MerkleAccumulator,
    records: Vec<LeafRecord>,
    nullifiers: HashSet<Nullifier>,
    /// Errors returned by the next fetches, oldest first.
    injected_failures: VecDeque<LedgerError>,
    /// Replaces the reported current root when set.
    root_override: Option<B256>,
}

/// In-memory ledger holding the commitment tree, its leaf records and the
/// nullifier set.
pub struct MockLedger {
    state: Mutex<LedgerState>,
}

impl MockLedger {
    pub fn new(height: usize, root_history_size: usize) -> Result<Self, MerkleError> {
        Ok(Self {
            state: Mutex::new(LedgerState {
                tree: MerkleAccumulator::new(height, root_history_size)?,
                records: Vec::new(),
                nullifiers: HashSet::new(),
                injected_failures: VecDeque::new(),
                root_override: None,
            }),
        })
    }

    /// Append a leaf pair the way a settled transaction would.
    pub async fn append_leaves(
        &self,
        left: B256,
        right: B256,
        encrypted_outputs: Vec<u8>,
    ) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;
        let index = state
            .tree
            .insert_pair(left, right)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        let mut encrypted_outputs = encrypted_outputs;
        encrypted_outputs.resize(LEAF_RECORD_ENCRYPTED_OUTPUTS_LENGTH, 0);
        state.records.push(LeafRecord {
            node_left: left,
            node_right: right,
            encrypted_outputs,
            left_leaf_index: index,
        });
        Ok(index)
    }

    pub async fn insert_nullifier(&self, nullifier: Nullifier) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if !state.nullifiers.insert(nullifier) {
            return Err(LedgerError::Rejected(format!(
                "nullifier {nullifier} already spent"
            )));
        }
        Ok(())
    }

    /// Settle a proved transaction: check its root, consume its nullifiers and
    /// append its output commitments in pairs. Returns the first new leaf index.
    pub async fn apply(&self, tx: &ProvedTransaction) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().await;

        let root = B256::from(tx.public_inputs.root);
        if !state.tree.is_known_root(&root) {
            return Err(LedgerError::Rejected(format!("unknown root {root}")));
        }
        let nullifiers: Vec<Nullifier> = tx
            .public_inputs
            .input_nullifiers
            .iter()
            .map(|n| Nullifier::from_bytes(*n))
            .collect();
        if let Some(spent) = nullifiers.iter().find(|n| state.nullifiers.contains(*n)) {
            return Err(LedgerError::Rejected(format!(
                "nullifier {spent} already spent"
            )));
        }

        let commitments = &tx.public_inputs.output_commitments;
        if state.tree.next_index() + commitments.len() as u64 > state.tree.capacity() {
            return Err(LedgerError::Rejected("merkle tree is full".to_string()));
        }
        state.nullifiers.extend(nullifiers);

        let slot = LEAF_RECORD_ENCRYPTED_OUTPUTS_LENGTH / 2;
        let first_index = state.tree.next_index();
        for (pair_index, pair) in commitments.chunks(2).enumerate() {
            let left = B256::from(pair[0]);
            let right = pair.get(1).map(|c| B256::from(*c)).unwrap_or(B256::ZERO);
            let start = (pair_index * 2 * slot).min(tx.encrypted_utxos.len());
            let end = (start + 2 * slot).min(tx.encrypted_utxos.len());
            let mut encrypted_outputs = tx.encrypted_utxos[start..end].to_vec();
            encrypted_outputs.resize(LEAF_RECORD_ENCRYPTED_OUTPUTS_LENGTH, 0);

            let index = state
                .tree
                .insert_pair(left, right)
                .map_err(|e| LedgerError::Rejected(e.to_string()))?;
            state.records.push(LeafRecord {
                node_left: left,
                node_right: right,
                encrypted_outputs,
                left_leaf_index: index,
            });
        }
        debug!(
            first_index,
            outputs = commitments.len(),
            "Mock ledger applied transaction"
        );
        Ok(first_index)
    }

    /// Make the next fetch calls fail with `errors`, in order.
    pub async fn inject_failures(&self, errors: impl IntoIterator<Item = LedgerError>) {
        self.state.lock().await.injected_failures.extend(errors);
    }

    /// Report `root` as the current root regardless of the stored tree.
    pub async fn override_current_root(&self, root: B256) {
        self.state.lock().await.root_override = Some(root);
    }

    /// Leaf index of the next insertion (for test assertions).
    pub async fn next_index(&self) -> u64 {
        self.state.lock().await.tree.next_index()
    }
}

impl LedgerState {
    fn take_failure(&mut self) -> Result<(), LedgerError> {
        match self.injected_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Ledger for MockLedger {
    async fn fetch_merkle_state(&self) -> Result<MerkleState, LedgerError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        let mut roots = state.tree.root_history().to_vec();
        let current_root_index = state.tree.current_root_index();
        if let Some(root) = state.root_override {
            roots[current_root_index] = root;
        }
        Ok(MerkleState {
            roots,
            current_root_index: current_root_index as u64,
            next_index: state.tree.next_index(),
        })
    }

    async fn fetch_leaf_records(&self, from: u64) -> Result<Vec<LeafRecord>, LedgerError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.left_leaf_index >= from)
            .cloned()
            .collect())
    }

    async fn is_nullifier_spent(&self, nullifier: Nullifier) -> Result<bool, LedgerError> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.nullifiers.contains(&nullifier))
    }
}
