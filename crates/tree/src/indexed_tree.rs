use std::{
    collections::BTreeMap,
    ops::Deref,
    sync::Arc,
};

use jmt::SimpleHasher;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use idxtree_common::{
    digest::Digest,
    field::Fr,
    hasher::TreeHasher,
    leaf::IndexedLeaf,
    params::MAX_TREE_HEIGHT,
    preimage::IndexedLeafPreimage,
    witness::MembershipWitness,
};
use idxtree_errors::TreeError;
use idxtree_serde::binary::BinaryTranscodable;

use crate::{
    nodes::{MerkleNodes, NodeReader},
    proofs::{MembershipProof, NonMembershipProof},
};

/// Hash of the leaf node at `index`. Empty preimages hash to zero, except the zero leaf at
/// index 0, which anchors the sorted list and is hashed like any other leaf.
pub fn leaf_hash<P: IndexedLeafPreimage, H: SimpleHasher>(preimage: &P, index: u64) -> Digest {
    if index != 0 && preimage.is_empty() {
        Digest::zero()
    } else {
        preimage.hash::<H>()
    }
}

pub(crate) fn check_height(height: usize) -> Result<(), TreeError> {
    if height == 0 || height > MAX_TREE_HEIGHT {
        return Err(TreeError::InvalidHeight(format!(
            "height {height} must be within 1..={MAX_TREE_HEIGHT}"
        )));
    }
    Ok(())
}

/// A preimage together with its sibling path, captured at the moment it was read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct LeafWitnessData<P> {
    pub preimage: P,
    pub witness: MembershipWitness,
}

impl<P: IndexedLeafPreimage> LeafWitnessData<P> {
    pub const fn index(&self) -> u64 {
        self.witness.leaf_index()
    }

    /// Placeholder for padding entries of a batch.
    pub fn empty(height: usize) -> Self {
        Self {
            preimage: P::empty(),
            witness: MembershipWitness::empty(height, 0),
        }
    }
}

/// Merkle tree whose leaves form a linked list sorted by key.
///
/// Every leaf points at the leaf holding the next larger key, the largest key points back at
/// zero. Index 0 always holds the zero leaf, so every non-zero key has a predecessor ("low
/// leaf"), and the low leaf of an absent key proves its absence.
pub struct IndexedTree<P, H = TreeHasher> {
    pub(crate) nodes: MerkleNodes<H>,
    pub(crate) preimages: Vec<P>,
    pub(crate) key_index: BTreeMap<Fr, u64>,
}

impl<P: Clone, H> Clone for IndexedTree<P, H> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            preimages: self.preimages.clone(),
            key_index: self.key_index.clone(),
        }
    }
}

impl<P: std::fmt::Debug, H> std::fmt::Debug for IndexedTree<P, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedTree")
            .field("nodes", &self.nodes)
            .field("leaf_count", &self.preimages.len())
            .finish()
    }
}

impl<P, H> IndexedTree<P, H>
where
    P: IndexedLeafPreimage,
    H: SimpleHasher,
{
    /// Creates a tree holding only the zero leaf.
    pub fn new(height: usize) -> Result<Self, TreeError> {
        Self::new_prefilled(height, 1)
    }

    /// Creates a tree holding the zero leaf followed by dummy leaves keyed `1..initial_size`,
    /// linked in ascending order.
    pub fn new_prefilled(height: usize, initial_size: u64) -> Result<Self, TreeError> {
        check_height(height)?;
        let initial_size = initial_size.max(1);
        let capacity = 1u64 << height;
        if initial_size > capacity {
            return Err(TreeError::TreeCapacityExceeded {
                leaf_count: 0,
                requested: initial_size,
                capacity,
            });
        }

        let mut preimages = Vec::with_capacity(initial_size as usize);
        let mut key_index = BTreeMap::new();
        for i in 0..initial_size {
            let (next_key, next_index) = if i + 1 < initial_size {
                (Fr::from(i + 1), i + 1)
            } else {
                (Fr::ZERO, 0)
            };
            let leaf = P::Leaf::dummy(Fr::from(i));
            preimages.push(P::from_leaf(&leaf, next_key, next_index));
            key_index.insert(Fr::from(i), i);
        }

        let mut nodes = MerkleNodes::new(height);
        nodes.update_leaves(
            preimages.iter().enumerate().map(|(i, p)| (i as u64, leaf_hash::<P, H>(p, i as u64))),
        );

        debug!("created indexed tree of height {height} with {initial_size} initial leaves");
        Ok(Self {
            nodes,
            preimages,
            key_index,
        })
    }

    pub fn root(&self) -> Digest {
        self.nodes.root()
    }

    pub fn height(&self) -> usize {
        self.nodes.height()
    }

    pub fn leaf_count(&self) -> u64 {
        self.preimages.len() as u64
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height()
    }

    pub fn get_leaf_preimage(&self, index: u64) -> Result<P, TreeError> {
        self.preimages.get(index as usize).cloned().ok_or_else(|| TreeError::IndexOutOfRange {
            index,
            leaf_count: self.leaf_count(),
        })
    }

    pub fn find_leaf_index(&self, key: &Fr) -> Option<u64> {
        self.key_index.get(key).copied()
    }

    pub fn get_membership_witness(&self, index: u64) -> Result<MembershipWitness, TreeError> {
        if index >= self.leaf_count() {
            return Err(TreeError::IndexOutOfRange {
                index,
                leaf_count: self.leaf_count(),
            });
        }
        MembershipWitness::new(self.height(), index, self.nodes.sibling_path(index))
    }

    /// Index of the greatest key not above `key`. The zero leaf guarantees one exists.
    pub(crate) fn low_leaf_index(&self, key: &Fr) -> u64 {
        self.key_index.range(..=*key).next_back().map_or(0, |(_, index)| *index)
    }

    /// Predecessor of an absent `key` with its current witness.
    pub fn get_low_witness(&self, key: &Fr) -> Result<LeafWitnessData<P>, TreeError> {
        if self.key_index.contains_key(key) {
            return Err(TreeError::DuplicateKey(key.to_string()));
        }
        let index = self.low_leaf_index(key);
        Ok(LeafWitnessData {
            preimage: self.preimages[index as usize].clone(),
            witness: self.get_membership_witness(index)?,
        })
    }

    pub fn prove_membership(&self, index: u64) -> Result<MembershipProof<P>, TreeError> {
        let witness = self.get_membership_witness(index)?;
        Ok(MembershipProof {
            root: self.root(),
            preimage: self.preimages[index as usize].clone(),
            witness,
        })
    }

    pub fn prove_non_membership(&self, key: &Fr) -> Result<NonMembershipProof<P>, TreeError> {
        let low_leaf = self.get_low_witness(key)?;
        Ok(NonMembershipProof {
            key: *key,
            low_leaf: MembershipProof {
                root: self.root(),
                preimage: low_leaf.preimage,
                witness: low_leaf.witness,
            },
        })
    }

    /// Inserts a new key, returning its index and the low leaf as it was before the insertion.
    pub fn insert(&mut self, leaf: P::Leaf) -> Result<(u64, LeafWitnessData<P>), TreeError> {
        let key = leaf.key();
        let low_leaf = self.get_low_witness(&key)?;

        let new_index = self.leaf_count();
        if new_index >= self.capacity() {
            return Err(TreeError::TreeCapacityExceeded {
                leaf_count: new_index,
                requested: 1,
                capacity: self.capacity(),
            });
        }

        let low_index = low_leaf.index();
        let new_preimage =
            P::from_leaf(&leaf, low_leaf.preimage.next_key(), low_leaf.preimage.next_index());
        let updated_low = low_leaf.preimage.with_next(key, new_index);

        trace!("inserting key {key} at index {new_index}, low leaf at index {low_index}");
        self.nodes.update_leaves([
            (low_index, leaf_hash::<P, H>(&updated_low, low_index)),
            (new_index, leaf_hash::<P, H>(&new_preimage, new_index)),
        ]);
        self.preimages[low_index as usize] = updated_low;
        self.preimages.push(new_preimage);
        self.key_index.insert(key, new_index);

        Ok((new_index, low_leaf))
    }

    /// Replaces the value of an existing key in place, returning the leaf as it was before.
    pub fn update(&mut self, leaf: P::Leaf) -> Result<LeafWitnessData<P>, TreeError> {
        if !P::Leaf::UPDATABLE {
            return Err(TreeError::UnsupportedOperation(
                "leaves of this tree cannot be updated".to_string(),
            ));
        }
        let key = leaf.key();
        let index = self
            .find_leaf_index(&key)
            .ok_or_else(|| TreeError::KeyNotFound(key.to_string()))?;

        let old_preimage = self.preimages[index as usize].clone();
        let updated_leaf = old_preimage.as_leaf().update_to(&leaf)?;
        let new_preimage =
            P::from_leaf(&updated_leaf, old_preimage.next_key(), old_preimage.next_index());
        let witness = self.get_membership_witness(index)?;

        trace!("updating key {key} at index {index}");
        self.nodes.update_leaves([(index, leaf_hash::<P, H>(&new_preimage, index))]);
        self.preimages[index as usize] = new_preimage;

        Ok(LeafWitnessData {
            preimage: old_preimage,
            witness,
        })
    }

    /// Sorted list of `(index, preimage)` pairs reached by walking the linked list from the zero
    /// leaf.
    pub fn walk(&self) -> Vec<(u64, P)> {
        let mut visited = Vec::with_capacity(self.key_index.len());
        let mut index = 0u64;
        loop {
            let preimage = self.preimages[index as usize].clone();
            let next_index = preimage.next_index();
            let at_end = preimage.next_key().is_zero();
            visited.push((index, preimage));
            if at_end || visited.len() > self.preimages.len() {
                return visited;
            }
            index = next_index;
        }
    }

    pub fn snapshot(&self) -> IndexedTreeSnapshot<P, H> {
        IndexedTreeSnapshot(Arc::new(self.clone()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TreeError> {
        let persisted = PersistedTree {
            height: self.height(),
            preimages: self.preimages.clone(),
        };
        Ok(persisted.encode_to_bytes()?)
    }

    /// Restores a tree from [`IndexedTree::to_bytes`] output, rebuilding nodes and the key index.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TreeError> {
        let persisted = PersistedTree::<P>::decode_from_bytes(&bytes)?;
        check_height(persisted.height)?;
        let capacity = 1u64 << persisted.height;
        let leaf_count = persisted.preimages.len() as u64;
        if leaf_count == 0 || leaf_count > capacity {
            return Err(TreeError::TreeCapacityExceeded {
                leaf_count: 0,
                requested: leaf_count,
                capacity,
            });
        }

        let mut key_index = BTreeMap::new();
        for (i, preimage) in persisted.preimages.iter().enumerate() {
            let occupied = i == 0 || !preimage.is_empty();
            if occupied && key_index.insert(preimage.key(), i as u64).is_some() {
                return Err(TreeError::DuplicateKey(preimage.key().to_string()));
            }
        }

        let mut nodes = MerkleNodes::new(persisted.height);
        nodes.update_leaves(
            persisted
                .preimages
                .iter()
                .enumerate()
                .map(|(i, p)| (i as u64, leaf_hash::<P, H>(p, i as u64))),
        );
        debug!("restored indexed tree with {leaf_count} leaves");
        Ok(Self {
            nodes,
            preimages: persisted.preimages,
            key_index,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
struct PersistedTree<P> {
    height: usize,
    preimages: Vec<P>,
}

/// Immutable copy of an [`IndexedTree`], cheap to clone and share between reader threads.
pub struct IndexedTreeSnapshot<P, H = TreeHasher>(Arc<IndexedTree<P, H>>);

impl<P, H> Clone for IndexedTreeSnapshot<P, H> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P, H> Deref for IndexedTreeSnapshot<P, H> {
    type Target = IndexedTree<P, H>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
