use alloy::primitives::B256;
use serde::{
    Deserialize,
    Serialize,
};

use crate::crypto::poseidon::poseidon2;

/// Height of the ledger's commitment tree (2^18 leaves).
pub const DEFAULT_MERKLE_TREE_HEIGHT: usize = 18;

/// Number of recent roots the ledger accepts proofs against.
pub const DEFAULT_ROOT_HISTORY_SIZE: usize = 100;

/// Fixed size of the encrypted-output blob stored with each leaf pair.
pub const LEAF_RECORD_ENCRYPTED_OUTPUTS_LENGTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerkleError {
    #[error("tree height must be within 1..=32, got {0}")]
    InvalidHeight(usize),
    #[error("root history size must be non-zero")]
    EmptyRootHistory,
    #[error("merkle tree is full ({capacity} leaves)")]
    TreeFull { capacity: u64 },
    #[error("leaf index {index} out of range ({len} leaves)")]
    LeafIndexOutOfRange { index: u64, len: u64 },
}

/// Disagreement between locally derived state and the ledger's state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    #[error("root {0} is not in the root history")]
    RootNotFound(B256),
    #[error("rebuilt root {local} does not match ledger root {ledger}")]
    RootMismatch { local: B256, ledger: B256 },
    #[error("leaf record gap: expected left leaf index {expected}, found {found}")]
    LeafRecordGap { expected: u64, found: u64 },
    #[error("commitment {commitment} is not at leaf {index}")]
    CommitmentNotInTree { commitment: B256, index: u64 },
    #[error("ledger reports current root index {index} outside history of {len}")]
    RootIndexOutOfRange { index: u64, len: usize },
    #[error(transparent)]
    Tree(#[from] MerkleError),
}

/// Authentication path for one leaf, in the layout the circuit expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf level to just below the root.
    pub elements: Vec<B256>,
    /// 0 = current node is on the left, 1 = on the right.
    pub indices: Vec<u8>,
    pub leaf_index: u64,
}

impl MerklePath {
    /// All-zero path used for placeholder inputs.
    pub fn zero(height: usize) -> Self {
        Self {
            elements: vec![B256::ZERO; height],
            indices: vec![0; height],
            leaf_index: 0,
        }
    }
}

/// A pair of leaves as persisted by the ledger, with the outputs' ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafRecord {
    pub node_left: B256,
    pub node_right: B256,
    pub encrypted_outputs: Vec<u8>,
    pub left_leaf_index: u64,
}

/// The ledger's view of the accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleState {
    pub roots: Vec<B256>,
    pub current_root_index: u64,
    pub next_index: u64,
}

impl MerkleState {
    /// The authoritative current root.
    pub fn current_root(&self) -> Result<B256, ConsistencyError> {
        usize::try_from(self.current_root_index)
            .ok()
            .and_then(|i| self.roots.get(i).copied())
            .ok_or(ConsistencyError::RootIndexOutOfRange {
                index: self.current_root_index,
                len: self.roots.len(),
            })
    }

    /// Position of `root` in the ledger's root array.
    pub fn root_index(&self, root: &B256) -> Result<u64, ConsistencyError> {
        self.roots
            .iter()
            .position(|r| r == root)
            .map(|i| i as u64)
            .ok_or(ConsistencyError::RootNotFound(*root))
    }
}

/// Append-only Poseidon Merkle tree with a ring buffer of recent roots.
///
/// Insertion updates only the path to the root through `filled_subtrees`.
/// Nodes along that path are also kept in `layers` so authentication paths
/// can be produced for any inserted leaf.
#[derive(Debug, Clone)]
pub struct MerkleAccumulator {
    height: usize,
    zeros: Vec<B256>,
    filled_subtrees: Vec<B256>,
    layers: Vec<Vec<B256>>,
    roots: Vec<B256>,
    current_root_index: usize,
}

impl MerkleAccumulator {
    pub fn new(height: usize, root_history_size: usize) -> Result<Self, MerkleError> {
        if height == 0 || height > 32 {
            return Err(MerkleError::InvalidHeight(height));
        }
        if root_history_size == 0 {
            return Err(MerkleError::EmptyRootHistory);
        }

        let mut zeros = Vec::with_capacity(height + 1);
        zeros.push(B256::ZERO);
        for i in 0..height {
            zeros.push(poseidon2(zeros[i], zeros[i]));
        }

        let mut roots = vec![B256::ZERO; root_history_size];
        roots[0] = zeros[height];

        Ok(Self {
            height,
            filled_subtrees: zeros[..height].to_vec(),
            zeros,
            layers: vec![Vec::new(); height + 1],
            roots,
            current_root_index: 0,
        })
    }

    /// Rebuild from persisted leaf pairs.
    ///
    /// Records are replayed in ascending `left_leaf_index` order and must be
    /// contiguous starting at leaf 0.
    pub fn from_leaf_records(
        records: &[LeafRecord],
        height: usize,
        root_history_size: usize,
    ) -> Result<Self, ConsistencyError> {
        let mut tree = Self::new(height, root_history_size)?;
        let mut ordered: Vec<&LeafRecord> = records.iter().collect();
        ordered.sort_by_key(|r| r.left_leaf_index);

        for record in ordered {
            let expected = tree.next_index();
            if record.left_leaf_index != expected {
                return Err(ConsistencyError::LeafRecordGap {
                    expected,
                    found: record.left_leaf_index,
                });
            }
            tree.insert_pair(record.node_left, record.node_right)?;
        }
        Ok(tree)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    pub fn next_index(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn leaves(&self) -> &[B256] {
        &self.layers[0]
    }

    pub fn zeros(&self) -> &[B256] {
        &self.zeros
    }

    pub fn root(&self) -> B256 {
        self.roots[self.current_root_index]
    }

    pub fn current_root_index(&self) -> usize {
        self.current_root_index
    }

    pub fn root_history(&self) -> &[B256] {
        &self.roots
    }

    /// Append one leaf and record the new root.
    pub fn insert(&mut self, leaf: B256) -> Result<u64, MerkleError> {
        self.ensure_room(1)?;
        let (index, root) = self.append(leaf);
        self.push_root(root);
        Ok(index)
    }

    /// Append two leaves and record a single new root. Returns the left leaf index.
    pub fn insert_pair(&mut self, left: B256, right: B256) -> Result<u64, MerkleError> {
        self.ensure_room(2)?;
        let (index, _) = self.append(left);
        let (_, root) = self.append(right);
        self.push_root(root);
        Ok(index)
    }

    fn ensure_room(&self, count: u64) -> Result<(), MerkleError> {
        if self.next_index() + count > self.capacity() {
            return Err(MerkleError::TreeFull {
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    fn append(&mut self, leaf: B256) -> (u64, B256) {
        let index = self.layers[0].len();
        self.layers[0].push(leaf);

        let mut current_index = index;
        let mut current = leaf;
        for level in 0..self.height {
            let (left, right) = if current_index % 2 == 0 {
                self.filled_subtrees[level] = current;
                (current, self.zeros[level])
            } else {
                (self.filled_subtrees[level], current)
            };
            current = poseidon2(left, right);
            current_index /= 2;
            self.set_node(level + 1, current_index, current);
        }
        (index as u64, current)
    }

    fn set_node(&mut self, level: usize, index: usize, node: B256) {
        let layer = &mut self.layers[level];
        if index < layer.len() {
            layer[index] = node;
        } else {
            layer.push(node);
        }
    }

    fn push_root(&mut self, root: B256) {
        self.current_root_index = (self.current_root_index + 1) % self.roots.len();
        self.roots[self.current_root_index] = root;
    }

    pub fn leaf(&self, index: u64) -> Option<B256> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.layers[0].get(i).copied())
    }

    /// Authentication path for an inserted leaf.
    pub fn path(&self, leaf_index: u64) -> Result<MerklePath, MerkleError> {
        if leaf_index >= self.next_index() {
            return Err(MerkleError::LeafIndexOutOfRange {
                index: leaf_index,
                len: self.next_index(),
            });
        }

        let mut elements = Vec::with_capacity(self.height);
        let mut indices = Vec::with_capacity(self.height);
        let mut current_index = leaf_index as usize;
        for level in 0..self.height {
            let sibling_index = current_index ^ 1;
            elements.push(
                self.layers[level]
                    .get(sibling_index)
                    .copied()
                    .unwrap_or(self.zeros[level]),
            );
            indices.push((current_index % 2) as u8);
            current_index /= 2;
        }

        Ok(MerklePath {
            elements,
            indices,
            leaf_index,
        })
    }

    /// Hash `leaf` up `path` and compare with `root`.
    pub fn verify(leaf: B256, path: &MerklePath, root: B256) -> bool {
        let computed = path
            .elements
            .iter()
            .zip(path.indices.iter())
            .fold(leaf, |current, (sibling, is_right)| {
                if *is_right == 1 {
                    poseidon2(*sibling, current)
                } else {
                    poseidon2(current, *sibling)
                }
            });
        computed == root
    }

    /// Whether `root` is in the ring buffer. The zero root is never known.
    pub fn is_known_root(&self, root: &B256) -> bool {
        !root.is_zero() && self.roots.contains(root)
    }

    /// Slot of `root` in the ring buffer.
    pub fn root_index(&self, root: &B256) -> Result<u64, ConsistencyError> {
        if root.is_zero() {
            return Err(ConsistencyError::RootNotFound(*root));
        }
        self.roots
            .iter()
            .position(|r| r == root)
            .map(|i| i as u64)
            .ok_or(ConsistencyError::RootNotFound(*root))
    }

    /// Root recomputed level by level from every stored leaf.
    pub fn root_from_leaves(&self) -> B256 {
        let mut level_nodes = self.layers[0].clone();
        for level in 0..self.height {
            if level_nodes.is_empty() {
                return self.zeros[self.height];
            }
            level_nodes = level_nodes
                .chunks(2)
                .map(|pair| poseidon2(pair[0], pair.get(1).copied().unwrap_or(self.zeros[level])))
                .collect();
        }
        level_nodes.first().copied().unwrap_or(self.zeros[self.height])
    }
}
