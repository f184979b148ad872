#![cfg(test)]

#[macro_use]
extern crate log;

use std::{io::Write, sync::Once, thread};

use anyhow::{Result, ensure};
use idxtree_common::{
    digest::Digest,
    field::Fr,
    hasher::{NodeHasher, TreeHasher},
    leaf::{NullifierLeaf, PublicDataLeaf},
    params::CircuitParams,
    preimage::{IndexedLeafPreimage, NullifierLeafPreimage, PublicDataLeafPreimage},
    test_utils::{random_keys, random_public_data_leaves, small_keys},
    witness::MembershipWitness,
};
use idxtree_errors::TreeError;
use idxtree_serde::wire::WireEncode;
use idxtree_tree::{
    hints::StateDiffHints,
    indexed_tree::{IndexedTree, leaf_hash},
    world_state::{TxEffects, WorldState},
};
use rand::{Rng, SeedableRng, rngs::StdRng};

static INIT_LOGGER: Once = Once::new();

fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = pretty_env_logger::formatted_builder()
            .filter_level(log::LevelFilter::Debug)
            .filter_module("idxtree_tree::batch", log::LevelFilter::Info)
            .is_test(true)
            .try_init();
    });
}

fn small_params() -> CircuitParams {
    CircuitParams {
        max_note_hashes_per_tx: 4,
        max_nullifiers_per_tx: 4,
        max_public_data_writes_per_tx: 2,
        note_hash_tree_height: 8,
        note_hash_subtree_height: 2,
        nullifier_tree_height: 8,
        nullifier_subtree_height: 2,
        public_data_tree_height: 8,
        public_data_subtree_height: 1,
        initial_nullifier_tree_size: 8,
        initial_public_data_tree_size: 4,
    }
}

fn dense_root(leaves: &[Digest]) -> Digest {
    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        layer = layer.chunks(2).map(|pair| TreeHasher::hash_nodes(&pair[0], &pair[1])).collect();
    }
    layer[0]
}

/// Checks the nullifier part of a hint bundle the way the rollup circuit does, starting from the
/// pre-state root and ending at the post-state root.
fn verify_nullifier_hints(
    params: &CircuitParams,
    hints: &StateDiffHints,
    start_root: Digest,
    start_index: u64,
    end_root: Digest,
) -> Result<()> {
    let mut running_root = start_root;
    let mut subtree = vec![Digest::zero(); params.max_nullifiers_per_tx];

    for (i, nullifier) in hints.sorted_nullifiers().iter().enumerate() {
        if nullifier.is_zero() {
            continue;
        }
        let low = &hints.nullifier_predecessor_preimages()[i];
        let witness = &hints.nullifier_predecessor_membership_witnesses()[i];
        let position = hints.sorted_nullifier_indexes()[i] as u64;
        let index = witness.leaf_index();

        ensure!(
            witness.compute_root::<TreeHasher>(leaf_hash::<_, TreeHasher>(low, index))
                == running_root,
            "low nullifier of {nullifier} does not open to the running root"
        );
        ensure!(low.is_low_leaf_for(nullifier), "{nullifier} is not enclosed by its low leaf");

        let new_index = start_index + position;
        let updated_low = low.with_next(*nullifier, new_index);
        running_root =
            witness.compute_root::<TreeHasher>(leaf_hash::<_, TreeHasher>(&updated_low, index));
        let inserted = NullifierLeafPreimage::new(*nullifier, low.next_nullifier, low.next_index);
        subtree[position as usize] = leaf_hash::<_, TreeHasher>(&inserted, new_index);
    }

    let subtree_witness = MembershipWitness::new(
        params.nullifier_subtree_sibling_path_len(),
        start_index >> params.nullifier_subtree_height,
        hints.nullifier_subtree_sibling_path().to_vec(),
    )?;
    let empty_subtree = TreeHasher::zero_hashes(params.nullifier_subtree_height)
        [params.nullifier_subtree_height];
    ensure!(
        subtree_witness.compute_root::<TreeHasher>(empty_subtree) == running_root,
        "subtree sibling path does not match the state after the low leaf updates"
    );
    ensure!(
        subtree_witness.compute_root::<TreeHasher>(dense_root(&subtree)) == end_root,
        "appending the subtree does not reach the end root"
    );
    Ok(())
}

#[test]
fn test_world_state_hints_reach_end_roots() -> Result<()> {
    init_logger();
    let params = small_params();
    let mut world_state = WorldState::new(params)?;
    let mut rng = StdRng::seed_from_u64(1);

    for tx_number in 0..6 {
        let nullifier_count = rng.gen_range(0..=params.max_nullifiers_per_tx);
        let note_hash_count = rng.gen_range(0..=params.max_note_hashes_per_tx);
        let effects = TxEffects {
            note_hashes: (0..note_hash_count).map(|_| Digest::random(&mut rng)).collect(),
            nullifiers: random_keys(nullifier_count, &mut rng),
            public_data_writes: random_public_data_leaves(
                params.max_public_data_writes_per_tx,
                &mut rng,
            ),
        };

        let processed = world_state.process_tx(&effects)?;
        debug!("tx {tx_number} moved roots to {:?}", processed.end_roots);
        assert_eq!(processed.end_roots, world_state.roots());

        verify_nullifier_hints(
            &params,
            &processed.hints,
            processed.start_roots.nullifier_tree.root,
            processed.start_roots.nullifier_tree.next_available_leaf_index,
            processed.end_roots.nullifier_tree.root,
        )?;

        let mut note_hashes = effects.note_hashes.clone();
        note_hashes.resize(params.max_note_hashes_per_tx, Digest::zero());
        let note_hash_witness = MembershipWitness::new(
            params.note_hash_subtree_sibling_path_len(),
            processed.start_roots.note_hash_tree.next_available_leaf_index
                >> params.note_hash_subtree_height,
            processed.hints.note_hash_subtree_sibling_path().to_vec(),
        )?;
        assert_eq!(
            note_hash_witness.compute_root::<TreeHasher>(dense_root(&note_hashes)),
            processed.end_roots.note_hash_tree.root
        );

        let bytes = processed.hints.to_wire();
        assert_eq!(bytes.len(), StateDiffHints::wire_len(&params));
        assert_eq!(StateDiffHints::from_wire(&params, &bytes)?, processed.hints);
        assert_eq!(processed.public_data_low_leaves.len(), params.max_public_data_writes_per_tx);
    }

    assert_eq!(world_state.note_hash_tree().leaf_count(), 24);
    assert_eq!(world_state.nullifier_tree().leaf_count(), 8 + 6 * 4);
    Ok(())
}

#[test]
fn test_world_state_is_atomic() -> Result<()> {
    init_logger();
    let params = small_params();
    let mut world_state = WorldState::new(params)?;

    let spent = Fr::from(1_000);
    world_state.process_tx(&TxEffects {
        nullifiers: vec![spent],
        ..TxEffects::default()
    })?;
    let roots = world_state.roots();

    let double_spend = TxEffects {
        note_hashes: vec![Digest::new([7u8; 32])],
        nullifiers: vec![Fr::from(2_000), spent],
        public_data_writes: vec![PublicDataLeaf::new(Fr::from(50), Fr::from(1))],
    };
    assert!(matches!(
        world_state.process_tx(&double_spend),
        Err(TreeError::DuplicateKey(_))
    ));
    assert_eq!(world_state.roots(), roots);

    let conflicting_writes = TxEffects {
        note_hashes: vec![Digest::new([7u8; 32])],
        nullifiers: vec![Fr::from(2_000)],
        public_data_writes: vec![
            PublicDataLeaf::new(Fr::from(50), Fr::from(1)),
            PublicDataLeaf::new(Fr::from(50), Fr::from(2)),
        ],
    };
    assert!(matches!(
        world_state.process_tx(&conflicting_writes),
        Err(TreeError::DuplicateKey(_))
    ));
    assert_eq!(world_state.roots(), roots);

    let too_many = TxEffects {
        nullifiers: random_keys(5, &mut rand::thread_rng()),
        ..TxEffects::default()
    };
    assert!(matches!(
        world_state.process_tx(&too_many),
        Err(TreeError::LengthMismatch { .. })
    ));
    assert_eq!(world_state.roots(), roots);
    Ok(())
}

#[test]
fn test_public_data_overwrite_across_txs() -> Result<()> {
    init_logger();
    let mut world_state = WorldState::new(small_params())?;
    let slot = Fr::from(77);

    world_state.process_tx(&TxEffects {
        public_data_writes: vec![PublicDataLeaf::new(slot, Fr::from(1))],
        ..TxEffects::default()
    })?;
    let index = world_state.public_data_tree().find_leaf_index(&slot).unwrap();

    let processed = world_state.process_tx(&TxEffects {
        public_data_writes: vec![PublicDataLeaf::new(slot, Fr::from(2))],
        ..TxEffects::default()
    })?;
    let low = &processed.public_data_low_leaves[0];
    assert_eq!(low.index(), index);
    assert_eq!(low.preimage.value, Fr::from(1));

    let tree = world_state.public_data_tree();
    assert_eq!(tree.find_leaf_index(&slot), Some(index));
    assert_eq!(tree.get_leaf_preimage(index)?.value, Fr::from(2));
    Ok(())
}

/// Every leaf points at the leaf holding the next larger key, and the walk from the zero leaf
/// visits every key exactly once.
fn assert_sorted_list<P: IndexedLeafPreimage>(tree: &IndexedTree<P>, expected_keys: usize) {
    let walk = tree.walk();
    assert_eq!(walk.len(), expected_keys);
    for pair in walk.windows(2) {
        let (_, current) = &pair[0];
        let (next_index, next) = &pair[1];
        assert!(current.key() < next.key());
        assert_eq!(current.next_key(), next.key());
        assert_eq!(current.next_index(), *next_index);
    }
    let (_, last) = &walk[walk.len() - 1];
    assert!(last.next_key().is_zero());
    assert_eq!(last.next_index(), 0);
}

#[test]
fn test_mixed_sequential_and_batch_inserts_keep_invariants() -> Result<()> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(3);
    let mut tree: IndexedTree<NullifierLeafPreimage> = IndexedTree::new(12)?;
    let mut keys = 1;

    for round in 0..20 {
        if round % 3 == 0 {
            // pad to the next subtree boundary with single inserts first
            while tree.leaf_count() % 8 != 0 {
                tree.insert(NullifierLeaf::new(Fr::random(&mut rng)))?;
                keys += 1;
            }
            let count = rng.gen_range(1..=8);
            let leaves: Vec<NullifierLeaf> =
                random_keys(count, &mut rng).into_iter().map(NullifierLeaf::new).collect();
            tree.batch_insert(&leaves, 3)?;
            keys += count;
        } else {
            tree.insert(NullifierLeaf::new(Fr::random(&mut rng)))?;
            keys += 1;
        }
        assert_sorted_list(&tree, keys);
    }
    Ok(())
}

#[test]
fn test_small_key_batches_keep_sorted_order() -> Result<()> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(4);
    let mut batched: IndexedTree<PublicDataLeafPreimage> = IndexedTree::new_prefilled(8, 4)?;
    let keys = small_keys(16, 200, &mut rng);

    for chunk in keys.chunks(4) {
        let writes: Vec<PublicDataLeaf> = chunk
            .iter()
            .map(|slot| PublicDataLeaf::new(Fr::from(slot.to_u64().unwrap_or(0) + 10), *slot))
            .collect();
        batched.batch_insert(&writes, 2)?;
    }
    assert_sorted_list(&batched, 4 + 16);
    Ok(())
}

#[test]
fn test_concurrent_snapshot_readers() -> Result<()> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(5);
    let mut tree: IndexedTree<NullifierLeafPreimage> = IndexedTree::new(16)?;
    let present = random_keys(64, &mut rng);
    for key in &present {
        tree.insert(NullifierLeaf::new(*key))?;
    }
    let snapshot = tree.snapshot();
    let absent = random_keys(32, &mut rng);

    thread::scope(|scope| {
        for reader in 0..4 {
            let snapshot = snapshot.clone();
            let present = &present;
            let absent = &absent;
            scope.spawn(move || {
                for key in absent.iter().skip(reader).step_by(4) {
                    let proof = snapshot.prove_non_membership(key).unwrap();
                    assert!(proof.verify().is_ok());
                }
                for key in present.iter().skip(reader).step_by(4) {
                    let index = snapshot.find_leaf_index(key).unwrap();
                    assert!(snapshot.prove_membership(index).unwrap().verify().is_ok());
                }
            });
        }

        // the single writer keeps going while readers use the snapshot
        for key in &absent {
            tree.insert(NullifierLeaf::new(*key)).unwrap();
        }
    });

    assert_eq!(tree.leaf_count(), 1 + 64 + 32);
    assert_eq!(snapshot.leaf_count(), 1 + 64);
    Ok(())
}

#[test]
fn test_world_state_from_config_file() -> Result<()> {
    init_logger();
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile()?;
    writeln!(file, "max_nullifiers_per_tx = 16")?;
    writeln!(file, "nullifier_subtree_height = 4")?;
    writeln!(file, "initial_nullifier_tree_size = 32")?;

    let params = CircuitParams::load(Some(file.path()))?;
    assert_eq!(params.nullifier_subtree_sibling_path_len(), 16);

    let mut world_state = WorldState::new(params)?;
    let processed = world_state.process_tx(&TxEffects {
        nullifiers: vec![Fr::from(12_345)],
        ..TxEffects::default()
    })?;
    assert_eq!(processed.hints.sorted_nullifiers().len(), 16);
    assert_eq!(processed.hints.to_wire().len(), StateDiffHints::wire_len(&params));
    Ok(())
}
