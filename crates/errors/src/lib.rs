use thiserror::Error;

// general reusable errors
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum GeneralError {
    #[error("parsing: {0}")]
    ParsingError(String),
    #[error("encoding: {0}")]
    EncodingError(String),
    #[error("decoding: {0}")]
    DecodingError(String),
}

/// Errors raised by the indexed tree, the append-only tree and the wire codec.
///
/// None of these are transient: they signal a logic or input error and are never retried.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("key {0} already exists")]
    DuplicateKey(String),
    #[error("key {0} not found")]
    KeyNotFound(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("invalid update: slot {found} does not match slot {expected}")]
    SlotMismatch { expected: String, found: String },
    #[error("leaf index {index} out of range for {leaf_count} leaves")]
    IndexOutOfRange { index: u64, leaf_count: u64 },
    #[error("reading {requested} bytes at offset {offset} exceeds buffer of {available} bytes")]
    OffsetOutOfBounds {
        offset: usize,
        requested: usize,
        available: usize,
    },
    #[error("expected {what} to have length {expected} but was {actual}")]
    LengthMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },
    #[error(
        "inserting {requested} leaves into a tree holding {leaf_count} exceeds capacity {capacity}"
    )]
    TreeCapacityExceeded {
        leaf_count: u64,
        requested: u64,
        capacity: u64,
    },
    #[error("subtree of size {subtree_size} cannot start at leaf index {start_index}")]
    UnalignedSubtree { start_index: u64, subtree_size: u64 },
    #[error("invalid tree height: {0}")]
    InvalidHeight(String),
    #[error(transparent)]
    General(#[from] GeneralError),
}

impl TreeError {
    pub fn length_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        TreeError::LengthMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ProofError {
    #[error("verifying proof: {0}")]
    VerificationError(String),
}
