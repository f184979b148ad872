use jmt::SimpleHasher;
use log::debug;

use idxtree_common::{digest::Digest, hasher::TreeHasher, witness::MembershipWitness};
use idxtree_errors::TreeError;

use crate::{
    indexed_tree::check_height,
    nodes::{MerkleNodes, NodeReader},
};

/// Fixed-height merkle tree that only grows at its right edge. Leaves are stored as given,
/// without further hashing.
pub struct AppendOnlyTree<H = TreeHasher> {
    nodes: MerkleNodes<H>,
    leaf_count: u64,
}

impl<H> Clone for AppendOnlyTree<H> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            leaf_count: self.leaf_count,
        }
    }
}

impl<H: SimpleHasher> AppendOnlyTree<H> {
    pub fn new(height: usize) -> Result<Self, TreeError> {
        check_height(height)?;
        Ok(Self {
            nodes: MerkleNodes::new(height),
            leaf_count: 0,
        })
    }

    pub fn root(&self) -> Digest {
        self.nodes.root()
    }

    pub fn height(&self) -> usize {
        self.nodes.height()
    }

    pub const fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.height()
    }

    pub fn ensure_capacity(&self, requested: u64) -> Result<(), TreeError> {
        if self.leaf_count + requested > self.capacity() {
            return Err(TreeError::TreeCapacityExceeded {
                leaf_count: self.leaf_count,
                requested,
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub fn append_leaves(&mut self, leaves: &[Digest]) -> Result<(), TreeError> {
        self.ensure_capacity(leaves.len() as u64)?;
        let start = self.leaf_count;
        self.nodes.update_leaves(
            leaves.iter().enumerate().map(|(offset, leaf)| (start + offset as u64, *leaf)),
        );
        self.leaf_count += leaves.len() as u64;
        debug!("appended {} leaves at index {start}", leaves.len());
        Ok(())
    }

    pub fn get_leaf(&self, index: u64) -> Result<Digest, TreeError> {
        self.check_index(index)?;
        Ok(self.nodes.node(0, index))
    }

    pub fn get_sibling_path(&self, index: u64) -> Result<MembershipWitness, TreeError> {
        self.check_index(index)?;
        MembershipWitness::new(self.height(), index, self.nodes.sibling_path(index))
    }

    /// Siblings of the subtree that the next `2^subtree_height` appended leaves will fill.
    pub fn get_subtree_sibling_path(
        &self,
        subtree_height: usize,
    ) -> Result<Vec<Digest>, TreeError> {
        if subtree_height > self.height() {
            return Err(TreeError::InvalidHeight(format!(
                "subtree height {subtree_height} exceeds tree height {}",
                self.height()
            )));
        }
        let subtree_size = 1u64 << subtree_height;
        if self.leaf_count % subtree_size != 0 {
            return Err(TreeError::UnalignedSubtree {
                start_index: self.leaf_count,
                subtree_size,
            });
        }
        Ok(self.nodes.sibling_path(self.leaf_count).split_off(subtree_height))
    }

    fn check_index(&self, index: u64) -> Result<(), TreeError> {
        if index >= self.leaf_count {
            return Err(TreeError::IndexOutOfRange {
                index,
                leaf_count: self.leaf_count,
            });
        }
        Ok(())
    }
}
