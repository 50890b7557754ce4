// swap-core/src/merkle.rs

use crate::commitment::Commitment;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// Domain-separated hashing so a leaf can never be replayed as an interior
// node of a shallower tree.
const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash raw leaf bytes into a leaf commitment
pub fn hash_leaf(data: &[u8]) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    Commitment::new(hasher.finalize().into())
}

fn hash_node(left: &Commitment, right: &Commitment) -> Commitment {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    Commitment::new(hasher.finalize().into())
}

/// Verify an inclusion proof for `leaf` at position `index` under `root`.
///
/// Sibling order per level is decided by the corresponding index bit: an
/// even position hashes as the left child, an odd one as the right child.
/// Leftover index bits after the proof is consumed mean the claimed
/// position is outside the tree, which is a deterministic rejection.
pub fn verify_inclusion(
    root: &Commitment,
    leaf: &Commitment,
    proof: &[Commitment],
    index: u64,
) -> bool {
    let mut node = *leaf;
    let mut position = index;
    for sibling in proof {
        node = if position & 1 == 0 {
            hash_node(&node, sibling)
        } else {
            hash_node(sibling, &node)
        };
        position >>= 1;
    }
    position == 0 && node == *root
}

/// Merkle tree over leaf commitments.
///
/// The engine only ever verifies proofs; the builder exists so embedders and
/// tests can produce valid (root, proof, index) triples for compressed
/// assets. Odd layers are padded by duplicating the trailing node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    layers: Vec<Vec<Commitment>>,
}

impl MerkleTree {
    /// Build a tree from raw leaf data
    pub fn new<T: AsRef<[u8]>>(leaves: &[T]) -> CoreResult<Self> {
        if leaves.is_empty() {
            return Err(CoreError::MerkleError("cannot build an empty tree".into()));
        }

        let mut layers = vec![leaves
            .iter()
            .map(|leaf| hash_leaf(leaf.as_ref()))
            .collect::<Vec<_>>()];

        while layers.last().map(Vec::len).unwrap_or(0) > 1 {
            let below = layers.last().cloned().unwrap_or_default();
            let mut above = Vec::with_capacity(below.len().div_ceil(2));
            for pair in below.chunks(2) {
                let right = pair.get(1).unwrap_or(&pair[0]);
                above.push(hash_node(&pair[0], right));
            }
            layers.push(above);
        }

        Ok(Self { layers })
    }

    pub fn root(&self) -> Commitment {
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.layers.first().map(Vec::len).unwrap_or(0)
    }

    pub fn leaf(&self, index: usize) -> Option<Commitment> {
        self.layers.first().and_then(|layer| layer.get(index)).copied()
    }

    /// Generate the sibling path for the leaf at `index`
    pub fn proof(&self, index: usize) -> CoreResult<Vec<Commitment>> {
        if index >= self.leaf_count() {
            return Err(CoreError::MerkleError("leaf index out of bounds".into()));
        }

        let mut siblings = Vec::new();
        let mut position = index;
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling_index = position ^ 1;
            // Duplicated trailing node when the layer is odd
            let sibling = layer.get(sibling_index).unwrap_or(&layer[position]);
            siblings.push(*sibling);
            position >>= 1;
        }
        Ok(siblings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusion_all_leaves() {
        let leaves = ["asset-0", "asset-1", "asset-2", "asset-3", "asset-4"];
        let tree = MerkleTree::new(&leaves).unwrap();
        let root = tree.root();

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            assert!(verify_inclusion(
                &root,
                &hash_leaf(leaf.as_bytes()),
                &proof,
                i as u64
            ));
        }
    }

    #[test]
    fn test_inclusion_rejects_wrong_leaf() {
        let tree = MerkleTree::new(&["a", "b", "c"]).unwrap();
        let proof = tree.proof(1).unwrap();
        assert!(!verify_inclusion(
            &tree.root(),
            &hash_leaf(b"z"),
            &proof,
            1
        ));
    }

    #[test]
    fn test_inclusion_rejects_wrong_index() {
        let tree = MerkleTree::new(&["a", "b", "c", "d"]).unwrap();
        let proof = tree.proof(2).unwrap();
        assert!(!verify_inclusion(
            &tree.root(),
            &hash_leaf(b"c"),
            &proof,
            3
        ));
    }

    #[test]
    fn test_inclusion_rejects_out_of_range_index() {
        let tree = MerkleTree::new(&["a", "b"]).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(!verify_inclusion(
            &tree.root(),
            &hash_leaf(b"a"),
            &proof,
            4
        ));
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = MerkleTree::new(&["only"]).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert!(verify_inclusion(&tree.root(), &hash_leaf(b"only"), &[], 0));
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(MerkleTree::new::<&str>(&[]).is_err());
    }

    #[test]
    fn test_leaf_not_confused_with_node() {
        let tree = MerkleTree::new(&["a", "b"]).unwrap();
        // The root itself must not verify as a depth-zero leaf of another tree.
        assert_ne!(tree.root(), hash_leaf(b"a"));
    }
}
