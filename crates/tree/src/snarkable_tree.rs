use jmt::SimpleHasher;
use log::debug;

use idxtree_common::{field::Fr, leaf::IndexedLeaf, preimage::IndexedLeafPreimage};
use idxtree_errors::TreeError;

use crate::{
    indexed_tree::IndexedTree,
    proofs::{InsertProof, MembershipProof, Proof, UpdateProof},
    LeafResponse::{self, *},
};

/// An indexed tree that produces self-contained proofs for each operation.
///
/// The methods of this trait are NOT run in circuit: they are used to create verifiable inputs
/// for the circuit, so every returned proof carries everything needed to check it.
pub trait SnarkableTree<P: IndexedLeafPreimage>: Send + Sync {
    /// Inserts an absent key, or updates a present one if the leaf kind allows it.
    fn process_leaf(&mut self, leaf: P::Leaf) -> Result<Proof<P>, TreeError>;
    fn insert_with_proof(&mut self, leaf: P::Leaf) -> Result<InsertProof<P>, TreeError>;
    fn update_with_proof(&mut self, leaf: P::Leaf) -> Result<UpdateProof<P>, TreeError>;
    fn get(&self, key: &Fr) -> Result<LeafResponse<P>, TreeError>;
}

impl<P, H> SnarkableTree<P> for IndexedTree<P, H>
where
    P: IndexedLeafPreimage,
    H: SimpleHasher,
{
    fn process_leaf(&mut self, leaf: P::Leaf) -> Result<Proof<P>, TreeError> {
        match self.find_leaf_index(&leaf.key()) {
            Some(_) if P::Leaf::UPDATABLE => {
                debug!("updating leaf with key {}", leaf.key());
                Ok(Proof::Update(Box::new(self.update_with_proof(leaf)?)))
            }
            Some(_) => Err(TreeError::DuplicateKey(leaf.key().to_string())),
            None => {
                debug!("inserting leaf with key {}", leaf.key());
                Ok(Proof::Insert(Box::new(self.insert_with_proof(leaf)?)))
            }
        }
    }

    fn insert_with_proof(&mut self, leaf: P::Leaf) -> Result<InsertProof<P>, TreeError> {
        let non_membership_proof = self.prove_non_membership(&leaf.key())?;
        let (new_index, low_leaf) = self.insert(leaf)?;

        Ok(InsertProof {
            non_membership_proof,
            new_root: self.root(),
            updated_low_leaf: self.prove_membership(low_leaf.index())?,
            new_leaf: self.prove_membership(new_index)?,
        })
    }

    fn update_with_proof(&mut self, leaf: P::Leaf) -> Result<UpdateProof<P>, TreeError> {
        let old_root = self.root();
        let old_leaf = self.update(leaf)?;
        let index = old_leaf.index();

        Ok(UpdateProof {
            old_leaf: MembershipProof {
                root: old_root,
                preimage: old_leaf.preimage,
                witness: old_leaf.witness,
            },
            new_leaf: self.prove_membership(index)?,
        })
    }

    fn get(&self, key: &Fr) -> Result<LeafResponse<P>, TreeError> {
        match self.find_leaf_index(key) {
            Some(index) => {
                let membership_proof = self.prove_membership(index)?;
                Ok(Found(membership_proof.preimage.clone(), membership_proof))
            }
            None => Ok(NotFound(self.prove_non_membership(key)?)),
        }
    }
}
