//! Field elements as they appear in leaves, keys and the circuit wire format.
//!
//! The tree never performs field arithmetic. It only needs a total order that agrees with the
//! integer the element encodes, which the big-endian byte representation gives for free.

use num_bigint::BigUint;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use idxtree_errors::{GeneralError, TreeError};
use idxtree_serde::{
    raw_or_hex_fixed,
    wire::{WireDecode, WireEncode, WireReader, WireWriter, FIELD_SIZE},
};

use crate::digest::Digest;

/// A 32-byte big-endian field element.
///
/// `Ord` compares the raw bytes, which for fixed-width big-endian values is the same as
/// comparing the encoded unsigned integers.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fr(#[serde(with = "raw_or_hex_fixed")] [u8; 32]);

impl Fr {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn from_u64(value: u64) -> Self {
        let be = value.to_be_bytes();
        let mut bytes = [0u8; 32];
        let mut i = 0;
        while i < 8 {
            bytes[24 + i] = be[i];
            i += 1;
        }
        Self(bytes)
    }

    pub const fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    pub fn from_biguint(value: &BigUint) -> Result<Self, GeneralError> {
        let be = value.to_bytes_be();
        if be.len() > FIELD_SIZE {
            return Err(GeneralError::DecodingError(format!(
                "integer of {} bytes does not fit into a field element",
                be.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes[FIELD_SIZE - be.len()..].copy_from_slice(&be);
        Ok(Self(bytes))
    }

    /// Returns the value as `u64` if the upper 24 bytes are zero.
    pub fn to_u64(&self) -> Option<u64> {
        let (high, low) = self.0.split_at(FIELD_SIZE - 8);
        if high.iter().any(|b| *b != 0) {
            return None;
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(low);
        Some(u64::from_be_bytes(bytes))
    }

    /// Samples an element below 2^253, so it is canonical in any of the usual 254/255-bit fields.
    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        bytes[0] &= 0x1f;
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, GeneralError> {
        Digest::from_hex(hex_str).map(Self::from)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl From<u64> for Fr {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<Digest> for Fr {
    fn from(value: Digest) -> Self {
        Self(value.to_bytes())
    }
}

impl TryFrom<&BigUint> for Fr {
    type Error = GeneralError;

    fn try_from(value: &BigUint) -> Result<Self, Self::Error> {
        Self::from_biguint(value)
    }
}

impl From<Fr> for BigUint {
    fn from(value: Fr) -> Self {
        value.to_biguint()
    }
}

impl AsRef<[u8]> for Fr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Fr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Fr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_u64() {
            Some(small) => write!(f, "Fr({small})"),
            None => write!(f, "Fr({})", self.to_hex()),
        }
    }
}

impl WireEncode for Fr {
    fn write_wire(&self, writer: &mut WireWriter) {
        writer.write_bytes(&self.0);
    }
}

impl WireDecode for Fr {
    fn read_wire(reader: &mut WireReader<'_>) -> Result<Self, TreeError> {
        Ok(Self(reader.read_array::<FIELD_SIZE>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_order_matches_integer_order() {
        let values = [0u64, 1, 255, 256, 65_535, u64::MAX - 1, u64::MAX];
        for a in values {
            for b in values {
                assert_eq!(Fr::from(a).cmp(&Fr::from(b)), a.cmp(&b));
            }
        }

        let mut wide = [0u8; 32];
        wide[0] = 1;
        assert!(Fr::new(wide) > Fr::from(u64::MAX));
    }

    #[test]
    fn test_biguint_conversion() {
        let fr = Fr::from(0xdead_beef_u64);
        assert_eq!(BigUint::from(fr), BigUint::from(0xdead_beef_u64));
        assert_eq!(Fr::from_biguint(&fr.to_biguint()).unwrap(), fr);
        assert_eq!(Fr::from_biguint(&BigUint::from(0u8)).unwrap(), Fr::ZERO);

        let too_wide = BigUint::from(1u8) << 256;
        assert!(matches!(
            Fr::from_biguint(&too_wide),
            Err(GeneralError::DecodingError(_))
        ));
    }

    #[test]
    fn test_to_u64() {
        assert_eq!(Fr::from(42).to_u64(), Some(42));
        let mut wide = [0u8; 32];
        wide[23] = 1;
        assert_eq!(Fr::new(wide).to_u64(), None);
    }

    #[test]
    fn test_random_stays_below_2_pow_253() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            assert!(Fr::random(&mut rng).as_bytes()[0] < 0x20);
        }
    }

    #[test]
    fn test_hex_json() {
        let fr = Fr::from(5);
        let json = serde_json::to_string(&fr).unwrap();
        assert_eq!(
            json,
            "\"0x0000000000000000000000000000000000000000000000000000000000000005\""
        );
        assert_eq!(serde_json::from_str::<Fr>(&json).unwrap(), fr);
        assert_eq!(Fr::from_hex(&fr.to_hex()).unwrap(), fr);
    }
}
