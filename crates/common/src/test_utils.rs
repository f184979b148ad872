use rand::{Rng, RngCore};

use crate::{
    field::Fr,
    leaf::{NullifierLeaf, PublicDataLeaf},
};

/// Distinct non-zero random keys.
pub fn random_keys<R: RngCore>(count: usize, rng: &mut R) -> Vec<Fr> {
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = Fr::random(rng);
        if !key.is_zero() && !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

pub fn random_nullifier_leaves<R: RngCore>(count: usize, rng: &mut R) -> Vec<NullifierLeaf> {
    random_keys(count, rng).into_iter().map(NullifierLeaf::new).collect()
}

pub fn random_public_data_leaves<R: RngCore>(count: usize, rng: &mut R) -> Vec<PublicDataLeaf> {
    random_keys(count, rng)
        .into_iter()
        .map(|slot| PublicDataLeaf::new(slot, Fr::from(rng.r#gen::<u64>())))
        .collect()
}

/// Small distinct keys, handy when a test wants to read the sorted list by eye.
pub fn small_keys<R: RngCore>(count: usize, max: u64, rng: &mut R) -> Vec<Fr> {
    assert!(count as u64 <= max, "cannot draw {count} distinct keys below {max}");
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let key = Fr::from(rng.gen_range(1..=max));
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}
