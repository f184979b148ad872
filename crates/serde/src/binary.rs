use idxtree_errors::GeneralError;
use serde::{Deserialize, Serialize};

pub trait BinaryTranscodable<'de>: Sized {
    fn encode_to_bytes(&self) -> Result<Vec<u8>, GeneralError>;
    fn decode_from_bytes<B: AsRef<[u8]>>(bytes: &'de B) -> Result<Self, GeneralError>;
}

impl<'de, T> BinaryTranscodable<'de> for T
where
    T: Serialize + Deserialize<'de>,
{
    fn encode_to_bytes(&self) -> Result<Vec<u8>, GeneralError> {
        bincode::serialize(self).map_err(|e| GeneralError::EncodingError(e.to_string()))
    }

    fn decode_from_bytes<B: AsRef<[u8]>>(bytes: &'de B) -> Result<Self, GeneralError> {
        bincode::deserialize(bytes.as_ref()).map_err(|e| GeneralError::DecodingError(e.to_string()))
    }
}
