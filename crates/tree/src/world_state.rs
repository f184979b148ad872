//! Applies the side effects of one transaction to the three state trees.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use idxtree_common::{
    digest::Digest,
    field::Fr,
    hasher::TreeHasher,
    leaf::{NullifierLeaf, PublicDataLeaf},
    params::CircuitParams,
    preimage::{NullifierLeafPreimage, PublicDataLeafPreimage},
};
use idxtree_errors::TreeError;

use crate::{
    append_only_tree::AppendOnlyTree,
    hints::StateDiffHints,
    indexed_tree::{IndexedTree, LeafWitnessData},
};

pub type NoteHashTree = AppendOnlyTree<TreeHasher>;
pub type NullifierTree = IndexedTree<NullifierLeafPreimage, TreeHasher>;
pub type PublicDataTree = IndexedTree<PublicDataLeafPreimage, TreeHasher>;

/// Side effects of a transaction. Arrays may be shorter than the circuit's fixed sizes and are
/// padded with empty entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEffects {
    pub note_hashes: Vec<Digest>,
    pub nullifiers: Vec<Fr>,
    pub public_data_writes: Vec<PublicDataLeaf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub root: Digest,
    pub next_available_leaf_index: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRoots {
    pub note_hash_tree: TreeSnapshot,
    pub nullifier_tree: TreeSnapshot,
    pub public_data_tree: TreeSnapshot,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedTx {
    pub start_roots: StateRoots,
    pub end_roots: StateRoots,
    pub hints: StateDiffHints,
    /// Low leaves of the sorted public data writes, captured as each write was applied.
    pub public_data_low_leaves: Vec<LeafWitnessData<PublicDataLeafPreimage>>,
    /// Original position of each sorted public data write.
    pub sorted_public_data_write_indexes: Vec<u32>,
}

pub struct WorldState {
    params: CircuitParams,
    note_hash_tree: NoteHashTree,
    nullifier_tree: NullifierTree,
    public_data_tree: PublicDataTree,
}

impl WorldState {
    pub fn new(params: CircuitParams) -> Result<Self, TreeError> {
        params.validate()?;
        let world_state = Self {
            params,
            note_hash_tree: AppendOnlyTree::new(params.note_hash_tree_height)?,
            nullifier_tree: IndexedTree::new_prefilled(
                params.nullifier_tree_height,
                params.initial_nullifier_tree_size,
            )?,
            public_data_tree: IndexedTree::new_prefilled(
                params.public_data_tree_height,
                params.initial_public_data_tree_size,
            )?,
        };
        info!("initialized world state at {:?}", world_state.roots());
        Ok(world_state)
    }

    pub const fn params(&self) -> &CircuitParams {
        &self.params
    }

    pub const fn note_hash_tree(&self) -> &NoteHashTree {
        &self.note_hash_tree
    }

    pub const fn nullifier_tree(&self) -> &NullifierTree {
        &self.nullifier_tree
    }

    pub const fn public_data_tree(&self) -> &PublicDataTree {
        &self.public_data_tree
    }

    pub fn roots(&self) -> StateRoots {
        StateRoots {
            note_hash_tree: TreeSnapshot {
                root: self.note_hash_tree.root(),
                next_available_leaf_index: self.note_hash_tree.leaf_count(),
            },
            nullifier_tree: TreeSnapshot {
                root: self.nullifier_tree.root(),
                next_available_leaf_index: self.nullifier_tree.leaf_count(),
            },
            public_data_tree: TreeSnapshot {
                root: self.public_data_tree.root(),
                next_available_leaf_index: self.public_data_tree.leaf_count(),
            },
        }
    }

    /// Applies all effects of a transaction or none of them.
    pub fn process_tx(&mut self, effects: &TxEffects) -> Result<ProcessedTx, TreeError> {
        let params = self.params;
        check_effect_len(
            "note hashes",
            params.max_note_hashes_per_tx,
            effects.note_hashes.len(),
        )?;
        check_effect_len(
            "nullifiers",
            params.max_nullifiers_per_tx,
            effects.nullifiers.len(),
        )?;
        check_effect_len(
            "public data writes",
            params.max_public_data_writes_per_tx,
            effects.public_data_writes.len(),
        )?;

        let start_roots = self.roots();

        let nullifiers: Vec<NullifierLeaf> =
            effects.nullifiers.iter().copied().map(NullifierLeaf::new).collect();
        let nullifier_plan = self
            .nullifier_tree
            .plan_batch_insert(&nullifiers, params.nullifier_subtree_height)?;
        let public_data_plan = self.public_data_tree.plan_batch_insert(
            &effects.public_data_writes,
            params.public_data_subtree_height,
        )?;

        let mut note_hashes = effects.note_hashes.clone();
        note_hashes.resize(params.max_note_hashes_per_tx, Digest::zero());
        self.note_hash_tree.ensure_capacity(note_hashes.len() as u64)?;
        let note_hash_subtree_sibling_path = self
            .note_hash_tree
            .get_subtree_sibling_path(params.note_hash_subtree_height)?;

        let nullifier_result = nullifier_plan.result();
        let hints = StateDiffHints::new(
            &params,
            nullifier_result
                .low_leaves_witness_data
                .iter()
                .map(|data| data.preimage)
                .collect(),
            nullifier_result
                .low_leaves_witness_data
                .iter()
                .map(|data| data.witness.clone())
                .collect(),
            nullifier_result.sorted_new_leaves.iter().map(|leaf| leaf.nullifier).collect(),
            nullifier_result.sorted_new_leaves_indexes.clone(),
            note_hash_subtree_sibling_path,
            nullifier_result.new_subtree_sibling_path.clone(),
            public_data_plan.result().new_subtree_sibling_path.clone(),
        )?;

        // the append is the last fallible step and its capacity was checked above
        self.note_hash_tree.append_leaves(&note_hashes)?;
        self.nullifier_tree.commit_batch(nullifier_plan);
        let public_data_result = self.public_data_tree.commit_batch(public_data_plan);

        let end_roots = self.roots();
        debug!(
            "processed tx: {} note hashes, {} nullifiers, {} public data writes",
            effects.note_hashes.len(),
            effects.nullifiers.len(),
            effects.public_data_writes.len()
        );
        Ok(ProcessedTx {
            start_roots,
            end_roots,
            hints,
            public_data_low_leaves: public_data_result.low_leaves_witness_data,
            sorted_public_data_write_indexes: public_data_result.sorted_new_leaves_indexes,
        })
    }
}

fn check_effect_len(what: &str, max: usize, actual: usize) -> Result<(), TreeError> {
    if actual > max {
        return Err(TreeError::length_mismatch(what, max, actual));
    }
    Ok(())
}
