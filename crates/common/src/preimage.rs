//! Leaf preimages: a leaf plus its pointer to the next larger key in the sorted list.

use std::fmt::Debug;

use jmt::SimpleHasher;
use num_bigint::BigUint;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use idxtree_errors::TreeError;
use idxtree_serde::wire::{WireDecode, WireEncode, WireReader, WireWriter};

use crate::{
    digest::Digest,
    field::Fr,
    hasher::NodeHasher,
    leaf::{IndexedLeaf, NullifierLeaf, PublicDataLeaf},
};

pub trait IndexedLeafPreimage:
    Clone
    + Debug
    + PartialEq
    + Eq
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + WireEncode
    + WireDecode
{
    type Leaf: IndexedLeaf;

    fn key(&self) -> Fr;

    fn get_key(&self) -> BigUint {
        self.key().to_biguint()
    }

    /// Value carried next to the key, if the leaf kind has one.
    fn value(&self) -> Option<Fr>;

    fn next_key(&self) -> Fr;

    fn next_index(&self) -> u64;

    fn as_leaf(&self) -> Self::Leaf;

    fn from_leaf(leaf: &Self::Leaf, next_key: Fr, next_index: u64) -> Self;

    fn empty() -> Self;

    /// Field elements hashed into the leaf node, in wire order.
    fn hash_inputs(&self) -> Vec<Fr>;

    fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Copy of this preimage pointing at a different successor.
    fn with_next(&self, next_key: Fr, next_index: u64) -> Self {
        Self::from_leaf(&self.as_leaf(), next_key, next_index)
    }

    /// Whether this preimage proves that `key` is absent: it sits strictly below `key` and its
    /// successor, if any, strictly above.
    fn is_low_leaf_for(&self, key: &Fr) -> bool {
        self.key() < *key && (self.next_key().is_zero() || *key < self.next_key())
    }

    fn hash<H: SimpleHasher>(&self) -> Digest {
        H::hash_fields(&self.hash_inputs())
    }
}

/// Wire layout: `nullifier || next_nullifier || next_index`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NullifierLeafPreimage {
    pub nullifier: Fr,
    pub next_nullifier: Fr,
    pub next_index: u64,
}

impl NullifierLeafPreimage {
    pub const fn new(nullifier: Fr, next_nullifier: Fr, next_index: u64) -> Self {
        Self {
            nullifier,
            next_nullifier,
            next_index,
        }
    }
}

impl IndexedLeafPreimage for NullifierLeafPreimage {
    type Leaf = NullifierLeaf;

    fn key(&self) -> Fr {
        self.nullifier
    }

    fn value(&self) -> Option<Fr> {
        None
    }

    fn next_key(&self) -> Fr {
        self.next_nullifier
    }

    fn next_index(&self) -> u64 {
        self.next_index
    }

    fn as_leaf(&self) -> NullifierLeaf {
        NullifierLeaf::new(self.nullifier)
    }

    fn from_leaf(leaf: &NullifierLeaf, next_key: Fr, next_index: u64) -> Self {
        Self::new(leaf.nullifier, next_key, next_index)
    }

    fn empty() -> Self {
        Self::default()
    }

    fn hash_inputs(&self) -> Vec<Fr> {
        vec![
            self.nullifier,
            self.next_nullifier,
            Fr::from(self.next_index),
        ]
    }
}

impl WireEncode for NullifierLeafPreimage {
    fn write_wire(&self, writer: &mut WireWriter) {
        self.nullifier.write_wire(writer);
        self.next_nullifier.write_wire(writer);
        writer.write_u64_as_field(self.next_index);
    }
}

impl WireDecode for NullifierLeafPreimage {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        let nullifier = Fr::read_wire(reader)?;
        let next_nullifier = Fr::read_wire(reader)?;
        let next_index = reader.read_u64_from_field()?;
        Ok(Self::new(nullifier, next_nullifier, next_index))
    }
}

/// Wire layout: `slot || value || next_index || next_slot`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicDataLeafPreimage {
    pub slot: Fr,
    pub value: Fr,
    pub next_slot: Fr,
    pub next_index: u64,
}

impl PublicDataLeafPreimage {
    pub const fn new(slot: Fr, value: Fr, next_slot: Fr, next_index: u64) -> Self {
        Self {
            slot,
            value,
            next_slot,
            next_index,
        }
    }
}

impl IndexedLeafPreimage for PublicDataLeafPreimage {
    type Leaf = PublicDataLeaf;

    fn key(&self) -> Fr {
        self.slot
    }

    fn value(&self) -> Option<Fr> {
        Some(self.value)
    }

    fn next_key(&self) -> Fr {
        self.next_slot
    }

    fn next_index(&self) -> u64 {
        self.next_index
    }

    fn as_leaf(&self) -> PublicDataLeaf {
        PublicDataLeaf::new(self.slot, self.value)
    }

    fn from_leaf(leaf: &PublicDataLeaf, next_key: Fr, next_index: u64) -> Self {
        Self::new(leaf.slot, leaf.value, next_key, next_index)
    }

    fn empty() -> Self {
        Self::default()
    }

    fn hash_inputs(&self) -> Vec<Fr> {
        vec![
            self.slot,
            self.value,
            Fr::from(self.next_index),
            self.next_slot,
        ]
    }
}

impl WireEncode for PublicDataLeafPreimage {
    fn write_wire(&self, writer: &mut WireWriter) {
        self.slot.write_wire(writer);
        self.value.write_wire(writer);
        writer.write_u64_as_field(self.next_index);
        self.next_slot.write_wire(writer);
    }
}

impl WireDecode for PublicDataLeafPreimage {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        let slot = Fr::read_wire(reader)?;
        let value = Fr::read_wire(reader)?;
        let next_index = reader.read_u64_from_field()?;
        let next_slot = Fr::read_wire(reader)?;
        Ok(Self::new(slot, value, next_slot, next_index))
    }
}
