//! Sparse storage of merkle nodes.
//!
//! Only nodes that differ from the root of an empty subtree at their level are stored, so a
//! tree of height 40 holding a handful of leaves costs a handful of entries per level.

use std::{
    collections::{BTreeSet, HashMap},
    marker::PhantomData,
};

use jmt::SimpleHasher;

use idxtree_common::{digest::Digest, hasher::NodeHasher};

/// Read access to a fixed-height binary merkle tree. Level 0 holds the leaves, level `height`
/// the root.
pub trait NodeReader {
    fn height(&self) -> usize;

    fn node(&self, level: usize, index: u64) -> Digest;

    fn root(&self) -> Digest {
        self.node(self.height(), 0)
    }

    /// Bottom-up siblings of the leaf at `index`.
    fn sibling_path(&self, index: u64) -> Vec<Digest> {
        (0..self.height()).map(|level| self.node(level, (index >> level) ^ 1)).collect()
    }
}

pub struct MerkleNodes<H> {
    height: usize,
    levels: Vec<HashMap<u64, Digest>>,
    zero_hashes: Vec<Digest>,
    _hasher: PhantomData<fn() -> H>,
}

impl<H> Clone for MerkleNodes<H> {
    fn clone(&self) -> Self {
        Self {
            height: self.height,
            levels: self.levels.clone(),
            zero_hashes: self.zero_hashes.clone(),
            _hasher: PhantomData,
        }
    }
}

impl<H> std::fmt::Debug for MerkleNodes<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleNodes")
            .field("height", &self.height)
            .field("stored", &self.levels.iter().map(HashMap::len).sum::<usize>())
            .finish()
    }
}

impl<H: SimpleHasher> MerkleNodes<H> {
    pub fn new(height: usize) -> Self {
        Self {
            height,
            levels: vec![HashMap::new(); height + 1],
            zero_hashes: H::zero_hashes(height),
            _hasher: PhantomData,
        }
    }

    pub fn zero_hash(&self, level: usize) -> Digest {
        self.zero_hashes[level]
    }

    fn set_node(&mut self, level: usize, index: u64, value: Digest) {
        if value == self.zero_hashes[level] {
            self.levels[level].remove(&index);
        } else {
            self.levels[level].insert(index, value);
        }
    }

    /// Writes leaf hashes and recomputes every ancestor exactly once, level by level.
    pub fn update_leaves(&mut self, leaves: impl IntoIterator<Item = (u64, Digest)>) {
        let mut dirty = BTreeSet::new();
        for (index, hash) in leaves {
            self.set_node(0, index, hash);
            dirty.insert(index);
        }

        for level in 0..self.height {
            let parents: BTreeSet<u64> = dirty.iter().map(|index| index >> 1).collect();
            for parent in &parents {
                let left = self.node(level, parent << 1);
                let right = self.node(level, (parent << 1) | 1);
                self.set_node(level + 1, *parent, H::hash_nodes(&left, &right));
            }
            dirty = parents;
        }
    }

    /// Starts an overlay that records changes without touching the committed nodes.
    pub fn stage(&self) -> StagedNodes<'_, H> {
        StagedNodes {
            base: self,
            changes: NodeChanges::new(self.height),
        }
    }

    /// Merges changes produced by a [`StagedNodes`] overlay of this store.
    pub fn apply(&mut self, changes: NodeChanges) {
        for (level, nodes) in changes.levels.into_iter().enumerate() {
            for (index, value) in nodes {
                self.set_node(level, index, value);
            }
        }
    }
}

impl<H> NodeReader for MerkleNodes<H> {
    fn height(&self) -> usize {
        self.height
    }

    fn node(&self, level: usize, index: u64) -> Digest {
        self.levels[level].get(&index).copied().unwrap_or(self.zero_hashes[level])
    }
}

/// Node values written through an overlay, detached from the store they were staged on.
#[derive(Clone, Debug, Default)]
pub struct NodeChanges {
    levels: Vec<HashMap<u64, Digest>>,
}

impl NodeChanges {
    fn new(height: usize) -> Self {
        Self {
            levels: vec![HashMap::new(); height + 1],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(HashMap::is_empty)
    }
}

/// Copy-on-write view over a [`MerkleNodes`] store. Every leaf write immediately recomputes its
/// path, so roots and sibling paths read through the overlay reflect all staged writes.
pub struct StagedNodes<'a, H> {
    base: &'a MerkleNodes<H>,
    changes: NodeChanges,
}

impl<H: SimpleHasher> StagedNodes<'_, H> {
    pub fn set_leaf(&mut self, index: u64, hash: Digest) {
        self.changes.levels[0].insert(index, hash);

        let mut current = hash;
        let mut position = index;
        for level in 0..self.base.height {
            let sibling = self.node(level, position ^ 1);
            current = if position & 1 == 0 {
                H::hash_nodes(&current, &sibling)
            } else {
                H::hash_nodes(&sibling, &current)
            };
            position >>= 1;
            self.changes.levels[level + 1].insert(position, current);
        }
    }

    pub fn into_changes(self) -> NodeChanges {
        self.changes
    }
}

impl<H> NodeReader for StagedNodes<'_, H> {
    fn height(&self) -> usize {
        self.base.height
    }

    fn node(&self, level: usize, index: u64) -> Digest {
        match self.changes.levels[level].get(&index) {
            Some(value) => *value,
            None => self.base.node(level, index),
        }
    }
}
