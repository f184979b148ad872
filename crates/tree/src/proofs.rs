use jmt::SimpleHasher;
use serde::{Deserialize, Serialize};

use idxtree_common::{
    digest::Digest, field::Fr, hasher::TreeHasher, leaf::IndexedLeaf,
    preimage::IndexedLeafPreimage, witness::MembershipWitness,
};
use idxtree_errors::ProofError;

use crate::indexed_tree::leaf_hash;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub enum Proof<P> {
    Insert(Box<InsertProof<P>>),
    Update(Box<UpdateProof<P>>),
}

/// Opens a preimage at a leaf index against a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct MembershipProof<P> {
    pub root: Digest,
    pub preimage: P,
    pub witness: MembershipWitness,
}

impl<P: IndexedLeafPreimage> MembershipProof<P> {
    pub fn verify(&self) -> Result<(), ProofError> {
        self.verify_with::<TreeHasher>()
    }

    pub fn verify_with<H: SimpleHasher>(&self) -> Result<(), ProofError> {
        let index = self.witness.leaf_index();
        let computed = self.witness.compute_root::<H>(leaf_hash::<P, H>(&self.preimage, index));
        if computed != self.root {
            return Err(ProofError::VerificationError(format!(
                "leaf {index} opens to {computed}, expected {}",
                self.root
            )));
        }
        Ok(())
    }
}

/// Proves that `key` is absent through its low leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct NonMembershipProof<P> {
    pub key: Fr,
    pub low_leaf: MembershipProof<P>,
}

impl<P: IndexedLeafPreimage> NonMembershipProof<P> {
    pub const fn root(&self) -> Digest {
        self.low_leaf.root
    }

    pub fn verify(&self) -> Result<(), ProofError> {
        self.verify_with::<TreeHasher>()
    }

    pub fn verify_with<H: SimpleHasher>(&self) -> Result<(), ProofError> {
        self.low_leaf.verify_with::<H>()?;
        if !self.low_leaf.preimage.is_low_leaf_for(&self.key) {
            return Err(ProofError::VerificationError(format!(
                "leaf {:?} does not enclose key {}",
                self.low_leaf.preimage, self.key
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct InsertProof<P> {
    pub non_membership_proof: NonMembershipProof<P>,

    pub new_root: Digest,
    /// The low leaf after being rewired to the new key, opened against `new_root`.
    pub updated_low_leaf: MembershipProof<P>,
    /// The inserted leaf, opened against `new_root`.
    pub new_leaf: MembershipProof<P>,
}

impl<P: IndexedLeafPreimage> InsertProof<P> {
    pub fn verify(&self) -> Result<(), ProofError> {
        self.verify_with::<TreeHasher>()
    }

    /// Replays the insertion from the old root: the rewired low leaf yields an intermediate
    /// root in which the new slot is still empty, and filling that slot yields `new_root`.
    pub fn verify_with<H: SimpleHasher>(&self) -> Result<(), ProofError> {
        self.non_membership_proof.verify_with::<H>()?;

        let key = self.non_membership_proof.key;
        let old_low = &self.non_membership_proof.low_leaf;
        let low_index = old_low.witness.leaf_index();
        let new_index = self.new_leaf.witness.leaf_index();

        if self.updated_low_leaf.root != self.new_root || self.new_leaf.root != self.new_root {
            return Err(ProofError::VerificationError(
                "leaf proofs are not against the new root".to_string(),
            ));
        }
        if new_index == 0 || new_index == low_index {
            return Err(ProofError::VerificationError(format!(
                "leaf index {new_index} cannot receive a new key"
            )));
        }
        let updated_low = old_low.preimage.with_next(key, new_index);
        if self.updated_low_leaf.witness.leaf_index() != low_index
            || self.updated_low_leaf.preimage != updated_low
        {
            return Err(ProofError::VerificationError(
                "low leaf was not rewired to the new key".to_string(),
            ));
        }
        let expected_new = P::from_leaf(
            &self.new_leaf.preimage.as_leaf(),
            old_low.preimage.next_key(),
            old_low.preimage.next_index(),
        );
        if self.new_leaf.preimage.key() != key || self.new_leaf.preimage != expected_new {
            return Err(ProofError::VerificationError(
                "new leaf does not take over the low leaf's pointers".to_string(),
            ));
        }

        // the path of the new slot does not contain the slot itself, so it is the same before
        // and after the slot is filled
        let intermediate_root =
            old_low.witness.compute_root::<H>(leaf_hash::<P, H>(&updated_low, low_index));
        let empty_slot = leaf_hash::<P, H>(&P::empty(), new_index);
        if self.new_leaf.witness.compute_root::<H>(empty_slot) != intermediate_root {
            return Err(ProofError::VerificationError(format!(
                "leaf {new_index} is not empty after rewiring the low leaf"
            )));
        }

        self.updated_low_leaf.verify_with::<H>()?;
        self.new_leaf.verify_with::<H>()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "P: IndexedLeafPreimage")]
pub struct UpdateProof<P> {
    /// Leaf before the update, opened against the old root.
    pub old_leaf: MembershipProof<P>,
    /// Leaf after the update, opened against the new root.
    pub new_leaf: MembershipProof<P>,
}

impl<P: IndexedLeafPreimage> UpdateProof<P> {
    pub const fn old_root(&self) -> Digest {
        self.old_leaf.root
    }

    pub const fn new_root(&self) -> Digest {
        self.new_leaf.root
    }

    pub fn verify(&self) -> Result<(), ProofError> {
        self.verify_with::<TreeHasher>()
    }

    pub fn verify_with<H: SimpleHasher>(&self) -> Result<(), ProofError> {
        self.old_leaf.verify_with::<H>()?;
        self.new_leaf.verify_with::<H>()?;

        // only the updated leaf may differ between both trees
        if self.old_leaf.witness != self.new_leaf.witness {
            return Err(ProofError::VerificationError(
                "update touched more than one leaf".to_string(),
            ));
        }

        let old = &self.old_leaf.preimage;
        let updated = old
            .as_leaf()
            .update_to(&self.new_leaf.preimage.as_leaf())
            .map_err(|e| ProofError::VerificationError(e.to_string()))?;
        if self.new_leaf.preimage != P::from_leaf(&updated, old.next_key(), old.next_index()) {
            return Err(ProofError::VerificationError(
                "new leaf is not the update of the old leaf".to_string(),
            ));
        }
        Ok(())
    }
}
