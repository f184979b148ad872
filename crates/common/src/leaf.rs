//! Leaf kinds stored in indexed trees.

use std::fmt::Debug;

use num_bigint::BigUint;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use idxtree_errors::TreeError;
use idxtree_serde::wire::{WireDecode, WireEncode, WireReader, WireWriter};

use crate::field::Fr;

/// A value that can be inserted into an indexed tree, ordered by its key.
pub trait IndexedLeaf:
    Clone + Debug + PartialEq + Eq + Send + Sync + Serialize + DeserializeOwned
{
    /// Whether an existing key may have its value replaced. Create-only trees reject updates
    /// before touching any state.
    const UPDATABLE: bool;

    fn key(&self) -> Fr;

    fn get_key(&self) -> BigUint {
        self.key().to_biguint()
    }

    fn is_empty(&self) -> bool;

    /// Produces the leaf that results from writing `other` over `self`.
    fn update_to(&self, other: &Self) -> Result<Self, TreeError>;

    /// Filler leaf used when a tree is created with prefilled dummy entries.
    fn dummy(key: Fr) -> Self;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierLeaf {
    pub nullifier: Fr,
}

impl NullifierLeaf {
    pub const fn new(nullifier: Fr) -> Self {
        Self { nullifier }
    }

    pub const fn empty() -> Self {
        Self {
            nullifier: Fr::ZERO,
        }
    }
}

impl IndexedLeaf for NullifierLeaf {
    const UPDATABLE: bool = false;

    fn key(&self) -> Fr {
        self.nullifier
    }

    fn is_empty(&self) -> bool {
        self.nullifier.is_zero()
    }

    fn update_to(&self, _other: &Self) -> Result<Self, TreeError> {
        Err(TreeError::UnsupportedOperation(
            "nullifiers are create only".to_string(),
        ))
    }

    fn dummy(key: Fr) -> Self {
        Self::new(key)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicDataLeaf {
    pub slot: Fr,
    pub value: Fr,
}

impl PublicDataLeaf {
    pub const fn new(slot: Fr, value: Fr) -> Self {
        Self { slot, value }
    }

    pub const fn empty() -> Self {
        Self {
            slot: Fr::ZERO,
            value: Fr::ZERO,
        }
    }
}

impl IndexedLeaf for PublicDataLeaf {
    const UPDATABLE: bool = true;

    fn key(&self) -> Fr {
        self.slot
    }

    fn is_empty(&self) -> bool {
        self.slot.is_zero() && self.value.is_zero()
    }

    fn update_to(&self, other: &Self) -> Result<Self, TreeError> {
        if self.slot != other.slot {
            return Err(TreeError::SlotMismatch {
                expected: self.slot.to_string(),
                found: other.slot.to_string(),
            });
        }
        Ok(Self::new(self.slot, other.value))
    }

    fn dummy(key: Fr) -> Self {
        Self::new(key, Fr::ZERO)
    }
}

impl WireEncode for NullifierLeaf {
    fn write_wire(&self, writer: &mut WireWriter) {
        self.nullifier.write_wire(writer);
    }
}

impl WireDecode for NullifierLeaf {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        Ok(Self::new(Fr::read_wire(reader)?))
    }
}

impl WireEncode for PublicDataLeaf {
    fn write_wire(&self, writer: &mut WireWriter) {
        self.slot.write_wire(writer);
        self.value.write_wire(writer);
    }
}

impl WireDecode for PublicDataLeaf {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        let slot = Fr::read_wire(reader)?;
        let value = Fr::read_wire(reader)?;
        Ok(Self::new(slot, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullifier_is_create_only() {
        let leaf = NullifierLeaf::new(Fr::from(7));
        assert!(!NullifierLeaf::UPDATABLE);
        assert!(matches!(
            leaf.update_to(&NullifierLeaf::new(Fr::from(7))),
            Err(TreeError::UnsupportedOperation(_))
        ));
        assert!(NullifierLeaf::empty().is_empty());
        assert!(!leaf.is_empty());
    }

    #[test]
    fn test_public_data_update_keeps_slot() {
        let leaf = PublicDataLeaf::new(Fr::from(3), Fr::from(10));
        let updated = leaf.update_to(&PublicDataLeaf::new(Fr::from(3), Fr::from(11))).unwrap();
        assert_eq!(updated, PublicDataLeaf::new(Fr::from(3), Fr::from(11)));

        let err = leaf.update_to(&PublicDataLeaf::new(Fr::from(4), Fr::from(11))).unwrap_err();
        assert!(matches!(err, TreeError::SlotMismatch { .. }));
    }

    #[test]
    fn test_public_data_emptiness_needs_both_fields() {
        assert!(PublicDataLeaf::empty().is_empty());
        assert!(!PublicDataLeaf::new(Fr::ZERO, Fr::from(1)).is_empty());
        assert!(!PublicDataLeaf::new(Fr::from(1), Fr::ZERO).is_empty());
    }

    #[test]
    fn test_leaf_wire_layout() {
        let leaf = PublicDataLeaf::new(Fr::from(1), Fr::from(2));
        let bytes = leaf.to_wire();
        assert_eq!(bytes.len(), 64);
        assert_eq!(bytes[31], 1);
        assert_eq!(bytes[63], 2);
        assert_eq!(PublicDataLeaf::from_wire(&bytes).unwrap(), leaf);
    }
}
