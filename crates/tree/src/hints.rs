use serde::{Deserialize, Serialize};

use idxtree_common::{
    digest::Digest, field::Fr, params::CircuitParams, preimage::NullifierLeafPreimage,
    witness::MembershipWitness,
};
use idxtree_errors::TreeError;
use idxtree_serde::wire::{WireEncode, WireReader, WireWriter};

/// Everything the rollup circuit needs to re-derive the post-state roots of one transaction
/// from its pre-state roots.
///
/// [`StateDiffHints::new`] and [`StateDiffHints::from_wire`] check every array against the
/// fixed lengths of [`CircuitParams`]. Serde deserialization has no parameters at hand and
/// checks that the arrays agree with each other instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedStateDiffHints")]
pub struct StateDiffHints {
    nullifier_predecessor_preimages: Vec<NullifierLeafPreimage>,
    nullifier_predecessor_membership_witnesses: Vec<MembershipWitness>,
    sorted_nullifiers: Vec<Fr>,
    sorted_nullifier_indexes: Vec<u32>,
    note_hash_subtree_sibling_path: Vec<Digest>,
    nullifier_subtree_sibling_path: Vec<Digest>,
    public_data_sibling_path: Vec<Digest>,
}

impl StateDiffHints {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &CircuitParams,
        nullifier_predecessor_preimages: Vec<NullifierLeafPreimage>,
        nullifier_predecessor_membership_witnesses: Vec<MembershipWitness>,
        sorted_nullifiers: Vec<Fr>,
        sorted_nullifier_indexes: Vec<u32>,
        note_hash_subtree_sibling_path: Vec<Digest>,
        nullifier_subtree_sibling_path: Vec<Digest>,
        public_data_sibling_path: Vec<Digest>,
    ) -> Result<Self, TreeError> {
        let hints = Self {
            nullifier_predecessor_preimages,
            nullifier_predecessor_membership_witnesses,
            sorted_nullifiers,
            sorted_nullifier_indexes,
            note_hash_subtree_sibling_path,
            nullifier_subtree_sibling_path,
            public_data_sibling_path,
        };
        hints.validate(params)?;
        Ok(hints)
    }

    /// The all-zero bundle.
    pub fn empty(params: &CircuitParams) -> Self {
        let n = params.max_nullifiers_per_tx;
        Self {
            nullifier_predecessor_preimages: vec![NullifierLeafPreimage::default(); n],
            nullifier_predecessor_membership_witnesses: vec![
                MembershipWitness::empty(params.nullifier_tree_height, 0);
                n
            ],
            sorted_nullifiers: vec![Fr::ZERO; n],
            sorted_nullifier_indexes: vec![0; n],
            note_hash_subtree_sibling_path: vec![
                Digest::zero();
                params.note_hash_subtree_sibling_path_len()
            ],
            nullifier_subtree_sibling_path: vec![
                Digest::zero();
                params.nullifier_subtree_sibling_path_len()
            ],
            public_data_sibling_path: vec![
                Digest::zero();
                params.public_data_subtree_sibling_path_len()
            ],
        }
    }

    fn validate(&self, params: &CircuitParams) -> Result<(), TreeError> {
        let n = params.max_nullifiers_per_tx;
        check_len(
            "nullifier predecessor preimages",
            n,
            self.nullifier_predecessor_preimages.len(),
        )?;
        check_len(
            "nullifier predecessor membership witnesses",
            n,
            self.nullifier_predecessor_membership_witnesses.len(),
        )?;
        for witness in &self.nullifier_predecessor_membership_witnesses {
            check_len(
                "nullifier predecessor sibling path",
                params.nullifier_tree_height,
                witness.height(),
            )?;
        }
        check_len("sorted nullifiers", n, self.sorted_nullifiers.len())?;
        check_len(
            "sorted nullifier indexes",
            n,
            self.sorted_nullifier_indexes.len(),
        )?;
        check_len(
            "note hash subtree sibling path",
            params.note_hash_subtree_sibling_path_len(),
            self.note_hash_subtree_sibling_path.len(),
        )?;
        check_len(
            "nullifier subtree sibling path",
            params.nullifier_subtree_sibling_path_len(),
            self.nullifier_subtree_sibling_path.len(),
        )?;
        check_len(
            "public data sibling path",
            params.public_data_subtree_sibling_path_len(),
            self.public_data_sibling_path.len(),
        )
    }

    pub fn nullifier_predecessor_preimages(&self) -> &[NullifierLeafPreimage] {
        &self.nullifier_predecessor_preimages
    }

    pub fn nullifier_predecessor_membership_witnesses(&self) -> &[MembershipWitness] {
        &self.nullifier_predecessor_membership_witnesses
    }

    pub fn sorted_nullifiers(&self) -> &[Fr] {
        &self.sorted_nullifiers
    }

    pub fn sorted_nullifier_indexes(&self) -> &[u32] {
        &self.sorted_nullifier_indexes
    }

    pub fn note_hash_subtree_sibling_path(&self) -> &[Digest] {
        &self.note_hash_subtree_sibling_path
    }

    pub fn nullifier_subtree_sibling_path(&self) -> &[Digest] {
        &self.nullifier_subtree_sibling_path
    }

    pub fn public_data_sibling_path(&self) -> &[Digest] {
        &self.public_data_sibling_path
    }

    /// Byte size of an encoded bundle for the given parameters.
    pub const fn wire_len(params: &CircuitParams) -> usize {
        let n = params.max_nullifiers_per_tx;
        n * 96
            + n * MembershipWitness::wire_len(params.nullifier_tree_height)
            + n * 32
            + n * 4
            + 32 * params.note_hash_subtree_sibling_path_len()
            + 32 * params.nullifier_subtree_sibling_path_len()
            + 32 * params.public_data_subtree_sibling_path_len()
    }

    pub fn from_wire(params: &CircuitParams, bytes: &[u8]) -> Result<Self, TreeError> {
        let expected = Self::wire_len(params);
        if bytes.len() != expected {
            return Err(TreeError::length_mismatch(
                "state diff hints buffer",
                expected,
                bytes.len(),
            ));
        }

        let n = params.max_nullifiers_per_tx;
        let witness_deserializer = MembershipWitness::deserializer(params.nullifier_tree_height);
        let mut reader = WireReader::new(bytes);
        let hints = Self {
            nullifier_predecessor_preimages: reader.read_vec(n)?,
            nullifier_predecessor_membership_witnesses: reader
                .read_vec_with(n, |r| witness_deserializer.read(r))?,
            sorted_nullifiers: reader.read_vec(n)?,
            sorted_nullifier_indexes: reader.read_vec(n)?,
            note_hash_subtree_sibling_path: reader
                .read_vec(params.note_hash_subtree_sibling_path_len())?,
            nullifier_subtree_sibling_path: reader
                .read_vec(params.nullifier_subtree_sibling_path_len())?,
            public_data_sibling_path: reader
                .read_vec(params.public_data_subtree_sibling_path_len())?,
        };
        reader.finish()?;
        Ok(hints)
    }
}

#[derive(Deserialize)]
struct UncheckedStateDiffHints {
    nullifier_predecessor_preimages: Vec<NullifierLeafPreimage>,
    nullifier_predecessor_membership_witnesses: Vec<MembershipWitness>,
    sorted_nullifiers: Vec<Fr>,
    sorted_nullifier_indexes: Vec<u32>,
    note_hash_subtree_sibling_path: Vec<Digest>,
    nullifier_subtree_sibling_path: Vec<Digest>,
    public_data_sibling_path: Vec<Digest>,
}

impl TryFrom<UncheckedStateDiffHints> for StateDiffHints {
    type Error = TreeError;

    fn try_from(unchecked: UncheckedStateDiffHints) -> Result<Self, Self::Error> {
        let n = unchecked.sorted_nullifiers.len();
        if n == 0 {
            return Err(TreeError::length_mismatch("sorted nullifiers", 1, 0));
        }
        check_len(
            "nullifier predecessor preimages",
            n,
            unchecked.nullifier_predecessor_preimages.len(),
        )?;
        check_len(
            "nullifier predecessor membership witnesses",
            n,
            unchecked.nullifier_predecessor_membership_witnesses.len(),
        )?;
        check_len(
            "sorted nullifier indexes",
            n,
            unchecked.sorted_nullifier_indexes.len(),
        )?;

        let height = unchecked.nullifier_predecessor_membership_witnesses[0].height();
        for witness in &unchecked.nullifier_predecessor_membership_witnesses {
            check_len("nullifier predecessor sibling path", height, witness.height())?;
        }
        // the subtree path stops where a subtree of n leaves begins
        let subtree_height = n.trailing_zeros() as usize;
        if !n.is_power_of_two() || subtree_height > height {
            return Err(TreeError::InvalidHeight(format!(
                "{n} nullifiers do not fill a subtree of a tree of height {height}"
            )));
        }
        check_len(
            "nullifier subtree sibling path",
            height - subtree_height,
            unchecked.nullifier_subtree_sibling_path.len(),
        )?;
        if let Some(position) = unchecked
            .sorted_nullifier_indexes
            .iter()
            .find(|position| **position as usize >= n)
        {
            return Err(TreeError::IndexOutOfRange {
                index: u64::from(*position),
                leaf_count: n as u64,
            });
        }

        Ok(Self {
            nullifier_predecessor_preimages: unchecked.nullifier_predecessor_preimages,
            nullifier_predecessor_membership_witnesses: unchecked
                .nullifier_predecessor_membership_witnesses,
            sorted_nullifiers: unchecked.sorted_nullifiers,
            sorted_nullifier_indexes: unchecked.sorted_nullifier_indexes,
            note_hash_subtree_sibling_path: unchecked.note_hash_subtree_sibling_path,
            nullifier_subtree_sibling_path: unchecked.nullifier_subtree_sibling_path,
            public_data_sibling_path: unchecked.public_data_sibling_path,
        })
    }
}

fn check_len(what: &str, expected: usize, actual: usize) -> Result<(), TreeError> {
    if expected != actual {
        return Err(TreeError::length_mismatch(what, expected, actual));
    }
    Ok(())
}

impl WireEncode for StateDiffHints {
    fn write_wire(&self, writer: &mut WireWriter) {
        writer.write_all(&self.nullifier_predecessor_preimages);
        writer.write_all(&self.nullifier_predecessor_membership_witnesses);
        writer.write_all(&self.sorted_nullifiers);
        writer.write_all(&self.sorted_nullifier_indexes);
        writer.write_all(&self.note_hash_subtree_sibling_path);
        writer.write_all(&self.nullifier_subtree_sibling_path);
        writer.write_all(&self.public_data_sibling_path);
    }
}
