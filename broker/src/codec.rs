//! MessagePack and Snappy helpers shared by the wire envelope and the
//! stored-value format.
//!
//! Structs are packed as named maps (`to_vec_named`) so that values written
//! by older deployments, which stored string-keyed maps, keep decoding.

use crate::error::BrokerError;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub fn pack<T: Serialize>(value: &T) -> Result<Vec<u8>, BrokerError> {
    rmp_serde::to_vec_named(value).map_err(|error| BrokerError::Codec(error.to_string()))
}

pub fn unpack<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BrokerError> {
    rmp_serde::from_slice(bytes).map_err(|error| BrokerError::Codec(error.to_string()))
}

pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, BrokerError> {
    snap::raw::Encoder::new()
        .compress_vec(bytes)
        .map_err(|error| BrokerError::Codec(error.to_string()))
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, BrokerError> {
    snap::raw::Decoder::new()
        .decompress_vec(bytes)
        .map_err(|error| BrokerError::Codec(error.to_string()))
}
