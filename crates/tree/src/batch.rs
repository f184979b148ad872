//! Batch insertion of a fixed-size subtree of leaves.
//!
//! Planning runs against a staged overlay of the tree and never mutates it. Leaves are visited
//! in descending key order: each one rewires its low leaf among the committed leaves, so a
//! smaller key processed later sees the pointer updates staged for the larger keys before it.
//! The new leaves themselves are appended as one subtree at the end.

use std::collections::{BTreeMap, HashSet};

use jmt::SimpleHasher;
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use idxtree_common::{
    digest::Digest, field::Fr, leaf::IndexedLeaf, preimage::IndexedLeafPreimage,
    witness::MembershipWitness,
};
use idxtree_errors::TreeError;

use crate::{
    indexed_tree::{leaf_hash, IndexedTree, LeafWitnessData},
    nodes::{NodeChanges, NodeReader},
};

/// Largest subtree a batch may fill. Sorted positions travel to the circuit as `u32`.
pub const MAX_SUBTREE_HEIGHT: usize = 32;

/// Witness data produced by a batch insertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct BatchInsertionResult<P: IndexedLeafPreimage> {
    /// Low leaf of each sorted entry, captured right before that entry was applied.
    pub low_leaves_witness_data: Vec<LeafWitnessData<P>>,
    /// The padded batch, sorted by descending key.
    pub sorted_new_leaves: Vec<P::Leaf>,
    /// Original batch position of each sorted entry.
    pub sorted_new_leaves_indexes: Vec<u32>,
    /// Siblings of the inserted subtree's root, bottom-up.
    pub new_subtree_sibling_path: Vec<Digest>,
}

/// A validated batch insertion, ready to be committed to the tree it was planned on.
#[derive(Debug)]
pub struct BatchInsertPlan<P: IndexedLeafPreimage> {
    start_index: u64,
    base_root: Digest,
    node_changes: NodeChanges,
    updated_preimages: BTreeMap<u64, P>,
    subtree_preimages: Vec<P>,
    result: BatchInsertionResult<P>,
}

impl<P: IndexedLeafPreimage> BatchInsertPlan<P> {
    pub const fn result(&self) -> &BatchInsertionResult<P> {
        &self.result
    }

    /// First leaf index of the appended subtree.
    pub const fn start_index(&self) -> u64 {
        self.start_index
    }
}

impl<P, H> IndexedTree<P, H>
where
    P: IndexedLeafPreimage,
    H: SimpleHasher,
{
    /// Plans and commits a batch in one step. On error the tree is left untouched.
    ///
    /// See [`IndexedTree::plan_batch_insert`] for the alignment the tree must have.
    pub fn batch_insert(
        &mut self,
        leaves: &[P::Leaf],
        subtree_height: usize,
    ) -> Result<BatchInsertionResult<P>, TreeError> {
        let plan = self.plan_batch_insert(leaves, subtree_height)?;
        Ok(self.commit_batch(plan))
    }

    /// Validates a batch and computes every witness it produces without mutating the tree.
    ///
    /// The batch is padded with empty leaves to `2^subtree_height` entries and must start at a
    /// multiple of that size, otherwise [`TreeError::UnalignedSubtree`] is returned. A tree from
    /// [`IndexedTree::new`] holds one leaf, so it only accepts batches of a single leaf; trees that
    /// take larger batches are created with [`IndexedTree::new_prefilled`] at an aligned size.
    pub fn plan_batch_insert(
        &self,
        leaves: &[P::Leaf],
        subtree_height: usize,
    ) -> Result<BatchInsertPlan<P>, TreeError> {
        if subtree_height > self.height() || subtree_height > MAX_SUBTREE_HEIGHT {
            return Err(TreeError::InvalidHeight(format!(
                "subtree height {subtree_height} exceeds tree height {} or {MAX_SUBTREE_HEIGHT}",
                self.height()
            )));
        }
        let batch_size = 1usize << subtree_height;
        if leaves.len() > batch_size {
            return Err(TreeError::length_mismatch("batch", batch_size, leaves.len()));
        }
        self.validate_batch(leaves, batch_size as u64)?;

        let start_index = self.leaf_count();
        let mut padded = leaves.to_vec();
        padded.resize_with(batch_size, || P::empty().as_leaf());

        let mut order: Vec<usize> = (0..batch_size).collect();
        order.sort_by(|a, b| padded[*b].key().cmp(&padded[*a].key()));

        let mut staged = self.nodes.stage();
        let mut updated_preimages: BTreeMap<u64, P> = BTreeMap::new();
        let mut subtree_preimages = vec![P::empty(); batch_size];
        let mut low_leaves_witness_data = Vec::with_capacity(batch_size);

        for position in &order {
            let leaf = &padded[*position];
            if leaf.is_empty() {
                low_leaves_witness_data.push(LeafWitnessData::empty(self.height()));
                continue;
            }

            let key = leaf.key();
            let low_index = self.low_leaf_index(&key);
            let low_preimage = updated_preimages
                .get(&low_index)
                .cloned()
                .unwrap_or_else(|| self.preimages[low_index as usize].clone());
            let witness =
                MembershipWitness::new(self.height(), low_index, staged.sibling_path(low_index))?;

            let updated_low = if low_preimage.key() == key {
                // existing key of an updatable tree, its subtree slot stays empty
                let updated_leaf = low_preimage.as_leaf().update_to(leaf)?;
                P::from_leaf(
                    &updated_leaf,
                    low_preimage.next_key(),
                    low_preimage.next_index(),
                )
            } else {
                let new_index = start_index + *position as u64;
                subtree_preimages[*position] =
                    P::from_leaf(leaf, low_preimage.next_key(), low_preimage.next_index());
                low_preimage.with_next(key, new_index)
            };

            trace!("batch entry {key} rewires low leaf at index {low_index}");
            staged.set_leaf(low_index, leaf_hash::<P, H>(&updated_low, low_index));
            updated_preimages.insert(low_index, updated_low);
            low_leaves_witness_data.push(LeafWitnessData {
                preimage: low_preimage,
                witness,
            });
        }

        let new_subtree_sibling_path = staged.sibling_path(start_index).split_off(subtree_height);
        let node_changes = staged.into_changes();

        let sorted_new_leaves = order.iter().map(|i| padded[*i].clone()).collect();
        let sorted_new_leaves_indexes = order.iter().map(|i| *i as u32).collect();

        debug!(
            "planned batch of {} leaves at index {start_index}, {} low leaves touched",
            leaves.len(),
            updated_preimages.len()
        );
        Ok(BatchInsertPlan {
            start_index,
            base_root: self.root(),
            node_changes,
            updated_preimages,
            subtree_preimages,
            result: BatchInsertionResult {
                low_leaves_witness_data,
                sorted_new_leaves,
                sorted_new_leaves_indexes,
                new_subtree_sibling_path,
            },
        })
    }

    fn validate_batch(&self, leaves: &[P::Leaf], batch_size: u64) -> Result<(), TreeError> {
        let mut seen: HashSet<Fr> = HashSet::with_capacity(leaves.len());
        for leaf in leaves.iter().filter(|leaf| !leaf.is_empty()) {
            let key = leaf.key();
            if !seen.insert(key) {
                return Err(TreeError::DuplicateKey(key.to_string()));
            }
            if !P::Leaf::UPDATABLE && self.key_index.contains_key(&key) {
                return Err(TreeError::DuplicateKey(key.to_string()));
            }
        }

        let leaf_count = self.leaf_count();
        if leaf_count + batch_size > self.capacity() {
            return Err(TreeError::TreeCapacityExceeded {
                leaf_count,
                requested: batch_size,
                capacity: self.capacity(),
            });
        }
        if leaf_count % batch_size != 0 {
            return Err(TreeError::UnalignedSubtree {
                start_index: leaf_count,
                subtree_size: batch_size,
            });
        }
        Ok(())
    }

    /// Applies a plan produced by [`IndexedTree::plan_batch_insert`] on this tree, with no
    /// mutation in between.
    pub fn commit_batch(&mut self, plan: BatchInsertPlan<P>) -> BatchInsertionResult<P> {
        debug_assert_eq!(plan.start_index, self.leaf_count(), "stale batch plan");
        debug_assert_eq!(plan.base_root, self.root(), "stale batch plan");

        self.nodes.apply(plan.node_changes);
        for (index, preimage) in plan.updated_preimages {
            self.preimages[index as usize] = preimage;
        }

        let start_index = plan.start_index;
        let mut appended = Vec::new();
        for (offset, preimage) in plan.subtree_preimages.into_iter().enumerate() {
            let index = start_index + offset as u64;
            if !preimage.is_empty() {
                self.key_index.insert(preimage.key(), index);
                appended.push((index, leaf_hash::<P, H>(&preimage, index)));
            }
            self.preimages.push(preimage);
        }
        self.nodes.update_leaves(appended);

        debug!(
            "committed batch at index {start_index}, tree now holds {} leaves",
            self.leaf_count()
        );
        plan.result
    }
}
