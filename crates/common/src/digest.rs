use rand::RngCore;
use serde::{Deserialize, Serialize};

use idxtree_errors::{GeneralError, TreeError};
use idxtree_serde::{
    raw_or_hex_fixed,
    wire::{WireDecode, WireEncode, WireReader, WireWriter, FIELD_SIZE},
};

use crate::field::Fr;

/// Value of a merkle node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "raw_or_hex_fixed")] pub [u8; 32]);

impl Digest {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, GeneralError> {
        let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(stripped, &mut bytes)
            .map_err(|e| GeneralError::ParsingError(format!("digest {hex_str}: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Digest {
    fn from(value: [u8; 32]) -> Self {
        Self(value)
    }
}

impl From<Fr> for Digest {
    fn from(value: Fr) -> Self {
        Self(value.to_bytes())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl WireEncode for Digest {
    fn write_wire(&self, writer: &mut WireWriter) {
        writer.write_bytes(&self.0);
    }
}

impl WireDecode for Digest {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        Ok(Self(reader.read_array::<FIELD_SIZE>()?))
    }
}
