use jmt::SimpleHasher;
use serde::{Deserialize, Serialize};

use idxtree_errors::TreeError;
use idxtree_serde::wire::{WireEncode, WireReader, WireWriter, FIELD_SIZE};

use crate::{digest::Digest, hasher::NodeHasher};

/// Sibling path of a leaf together with the leaf's position.
///
/// The path is ordered bottom-up and always has exactly `height` entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipWitness {
    leaf_index: u64,
    sibling_path: Vec<Digest>,
}

impl MembershipWitness {
    pub fn new(
        height: usize,
        leaf_index: u64,
        sibling_path: Vec<Digest>,
    ) -> Result<Self, TreeError> {
        if sibling_path.len() != height {
            return Err(TreeError::length_mismatch(
                "sibling path",
                height,
                sibling_path.len(),
            ));
        }
        Ok(Self {
            leaf_index,
            sibling_path,
        })
    }

    /// Witness at index 0 with random siblings, for tests and placeholders.
    pub fn random(height: usize) -> Self {
        let mut rng = rand::thread_rng();
        Self {
            leaf_index: 0,
            sibling_path: (0..height).map(|_| Digest::random(&mut rng)).collect(),
        }
    }

    /// All-zero witness, used for padding entries of a batch.
    pub fn empty(height: usize, leaf_index: u64) -> Self {
        Self {
            leaf_index,
            sibling_path: vec![Digest::zero(); height],
        }
    }

    pub const fn deserializer(height: usize) -> WitnessDeserializer {
        WitnessDeserializer { height }
    }

    pub const fn wire_len(height: usize) -> usize {
        FIELD_SIZE * (height + 1)
    }

    pub const fn leaf_index(&self) -> u64 {
        self.leaf_index
    }

    pub fn height(&self) -> usize {
        self.sibling_path.len()
    }

    pub fn sibling_path(&self) -> &[Digest] {
        &self.sibling_path
    }

    pub fn into_sibling_path(self) -> Vec<Digest> {
        self.sibling_path
    }

    /// Folds `leaf_hash` up the path, taking the bits of the leaf index as left/right choices.
    pub fn compute_root<H: SimpleHasher>(&self, leaf_hash: Digest) -> Digest {
        let mut current = leaf_hash;
        let mut index = self.leaf_index;
        for sibling in &self.sibling_path {
            current = if index & 1 == 0 {
                H::hash_nodes(&current, sibling)
            } else {
                H::hash_nodes(sibling, &current)
            };
            index >>= 1;
        }
        current
    }
}

impl WireEncode for MembershipWitness {
    fn write_wire(&self, writer: &mut WireWriter) {
        writer.write_u64_as_field(self.leaf_index);
        writer.write_all(&self.sibling_path);
    }
}

/// Decodes witnesses of a fixed height; the height is not part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WitnessDeserializer {
    height: usize,
}

impl WitnessDeserializer {
    pub const fn height(&self) -> usize {
        self.height
    }

    pub fn read(&self, reader: &mut WireReader<'_>) -> Result<MembershipWitness, TreeError> {
        let leaf_index = reader.read_u64_from_field()?;
        let sibling_path = reader.read_vec::<Digest>(self.height)?;
        MembershipWitness::new(self.height, leaf_index, sibling_path)
    }

    /// Parses a buffer holding exactly one witness.
    pub fn from_wire(&self, bytes: &[u8]) -> Result<MembershipWitness, TreeError> {
        let expected = MembershipWitness::wire_len(self.height);
        if bytes.len() != expected {
            return Err(TreeError::length_mismatch(
                "witness buffer",
                expected,
                bytes.len(),
            ));
        }
        let mut reader = WireReader::new(bytes);
        let witness = self.read(&mut reader)?;
        reader.finish()?;
        Ok(witness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::TreeHasher;

    #[test]
    fn test_new_checks_path_length() {
        assert!(MembershipWitness::new(3, 0, vec![Digest::zero(); 3]).is_ok());
        assert_eq!(
            MembershipWitness::new(3, 0, vec![Digest::zero(); 2]),
            Err(TreeError::length_mismatch("sibling path", 3, 2))
        );
    }

    #[test]
    fn test_wire_round_trip() {
        let path = MembershipWitness::random(4).into_sibling_path();
        let witness = MembershipWitness::new(4, 9, path).unwrap();
        let bytes = witness.to_wire();
        assert_eq!(bytes.len(), MembershipWitness::wire_len(4));
        assert_eq!(bytes[31], 9);

        let decoded = MembershipWitness::deserializer(4).from_wire(&bytes).unwrap();
        assert_eq!(decoded, witness);
    }

    #[test]
    fn test_deserializer_rejects_wrong_height() {
        let bytes = MembershipWitness::random(4).to_wire();
        assert!(matches!(
            MembershipWitness::deserializer(5).from_wire(&bytes),
            Err(TreeError::LengthMismatch { .. })
        ));
        assert!(matches!(
            MembershipWitness::deserializer(3).from_wire(&bytes),
            Err(TreeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_compute_root_follows_index_bits() {
        let leaf = Digest::new([7u8; 32]);
        let s0 = Digest::new([1u8; 32]);
        let s1 = Digest::new([2u8; 32]);

        // index 2 = 0b10: left child at level 0, right child at level 1
        let witness = MembershipWitness::new(2, 2, vec![s0, s1]).unwrap();
        let expected = TreeHasher::hash_nodes(&s1, &TreeHasher::hash_nodes(&leaf, &s0));
        assert_eq!(witness.compute_root::<TreeHasher>(leaf), expected);
    }

    #[test]
    fn test_empty_witness() {
        let witness = MembershipWitness::empty(3, 0);
        assert_eq!(witness.leaf_index(), 0);
        assert!(witness.sibling_path().iter().all(Digest::is_zero));
        assert_eq!(witness.to_wire(), vec![0u8; 128]);
    }
}
