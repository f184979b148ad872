pub mod binary;
pub mod wire;

/// Serializes byte strings as hex for human-readable formats and as raw bytes otherwise.
pub mod raw_or_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T: AsRef<[u8]>>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            let hex_str = format!("0x{}", hex::encode(bytes.as_ref()));
            serializer.serialize_str(&hex_str)
        } else {
            serializer.serialize_bytes(bytes.as_ref())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let hex_str = String::deserialize(deserializer)?;
            let stripped = hex_str.strip_prefix("0x").unwrap_or(&hex_str);
            hex::decode(stripped.as_bytes()).map_err(serde::de::Error::custom)
        } else {
            Vec::<u8>::deserialize(deserializer)
        }
    }
}

pub mod raw_or_hex_fixed {
    use super::raw_or_hex;
    use serde::{self, Deserializer, Serializer};

    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        raw_or_hex::serialize(bytes.as_slice(), serializer)
    }

    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = raw_or_hex::deserialize(deserializer)?;

        let len = vec.len();
        vec.try_into()
            .map_err(|_| serde::de::Error::custom(format!("Expected {} bytes, got {}", N, len)))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
    struct Wrapper(#[serde(with = "crate::raw_or_hex_fixed")] [u8; 4]);

    #[test]
    fn test_raw_or_hex_fixed_json_uses_prefixed_hex() {
        let json = serde_json::to_string(&Wrapper([0xde, 0xad, 0xbe, 0xef])).unwrap();
        assert_eq!(json, "\"0xdeadbeef\"");
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Wrapper([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn test_raw_or_hex_fixed_rejects_wrong_length() {
        let result: Result<Wrapper, _> = serde_json::from_str("\"0xdeadbe\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_or_hex_accepts_unprefixed_hex() {
        let back: Wrapper = serde_json::from_str("\"01020304\"").unwrap();
        assert_eq!(back, Wrapper([1, 2, 3, 4]));
    }
}
