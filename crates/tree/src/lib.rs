pub mod append_only_tree;
pub mod batch;
pub mod hints;
pub mod indexed_tree;
pub mod nodes;
pub mod proofs;
pub mod snarkable_tree;
pub mod world_state;

use proofs::{MembershipProof, NonMembershipProof};

/// Enumerates possible responses when looking up a key
#[derive(Debug)]
pub enum LeafResponse<P> {
    /// When the key was found, provides its preimage and the corresponding membership-proof
    Found(P, MembershipProof<P>),

    /// When the key is absent, provides the corresponding non-membership-proof
    NotFound(NonMembershipProof<P>),
}
