use jmt::SimpleHasher;

use crate::{digest::Digest, field::Fr};

/// Default hasher of all trees, SHA-256 behind jmt's hasher seam.
#[derive(Debug, Clone, Default)]
pub struct TreeHasher(sha2::Sha256);

impl SimpleHasher for TreeHasher {
    fn new() -> Self {
        Self(<sha2::Sha256 as sha2::Digest>::new())
    }

    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(&mut self.0, data);
    }

    fn finalize(self) -> [u8; 32] {
        sha2::Digest::finalize(self.0).into()
    }
}

/// Merkle hashing on top of any [`SimpleHasher`].
pub trait NodeHasher: SimpleHasher {
    /// Hashes two children into their parent node.
    fn hash_nodes(left: &Digest, right: &Digest) -> Digest {
        let mut hasher = <Self as SimpleHasher>::new();
        hasher.update(left.as_ref());
        hasher.update(right.as_ref());
        Digest(hasher.finalize())
    }

    /// Hashes the concatenation of a leaf's field elements.
    fn hash_fields(fields: &[Fr]) -> Digest {
        let mut hasher = <Self as SimpleHasher>::new();
        for field in fields {
            hasher.update(field.as_ref());
        }
        Digest(hasher.finalize())
    }

    /// Roots of empty subtrees, indexed by subtree height. `zero_hashes(h)[0]` is the empty leaf.
    fn zero_hashes(height: usize) -> Vec<Digest> {
        let mut zeros = Vec::with_capacity(height + 1);
        let mut current = Digest::zero();
        zeros.push(current);
        for _ in 0..height {
            current = Self::hash_nodes(&current, &current);
            zeros.push(current);
        }
        zeros
    }
}

impl<H: SimpleHasher> NodeHasher for H {}
