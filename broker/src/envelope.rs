//! The request envelope and response shapes.
//!
//! Requests arrive as a byte buffer: JSON when the first byte is `{`,
//! Snappy-compressed MessagePack otherwise. Every request carries a `method`
//! name and a `params` map; responses mirror the encoding of the request
//! they answer.

use crate::codec;
use crate::error::BrokerError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

/// Response status codes, carried on the wire as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Ok = 20,
    EndOfStream = 21,
    AllPartitionsAssigned = 22,
    Error = 50,
}

impl Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Binary,
}

impl WireFormat {
    pub fn detect(bytes: &[u8]) -> WireFormat {
        if bytes.first() == Some(&b'{') {
            WireFormat::Json
        } else {
            WireFormat::Binary
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, BrokerError> {
        match self {
            WireFormat::Json => serde_json::from_slice(bytes)
                .map_err(|error| BrokerError::BadRequest(format!("malformed envelope: {error}"))),
            WireFormat::Binary => {
                let packed = codec::decompress(bytes)
                    .and_then(|packed| codec::unpack(&packed))
                    .map_err(|error| {
                        BrokerError::BadRequest(format!("malformed envelope: {error}"))
                    })?;
                Ok(packed)
            }
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, BrokerError> {
        match self {
            WireFormat::Json => {
                serde_json::to_vec(value).map_err(|error| BrokerError::Codec(error.to_string()))
            }
            WireFormat::Binary => codec::compress(&codec::pack(value)?),
        }
    }
}

/// A decoded request: a method name plus its parameter map.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub method: String,
    pub params: Option<Params>,
}

/// The loose parameter map of a request. Accessors return `BadRequest` for
/// parameters the dispatched method requires but the client omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Params {
    pub stream: Option<String>,
    pub receiver_group: Option<String>,
    pub receiver: Option<String>,
    pub key: Option<String>,
    pub value: Option<ByteBuf>,
    pub partition: Option<u32>,
    pub index: Option<u64>,
}

impl Params {
    pub fn stream(&self) -> Result<&str, BrokerError> {
        require(self.stream.as_deref(), "stream")
    }

    pub fn receiver_group(&self) -> Result<&str, BrokerError> {
        require(self.receiver_group.as_deref(), "receiver_group")
    }

    pub fn receiver(&self) -> Result<&str, BrokerError> {
        require(self.receiver.as_deref(), "receiver")
    }

    pub fn value(&self) -> Result<&[u8], BrokerError> {
        require(self.value.as_deref().map(Vec::as_slice), "value")
    }

    pub fn partition(&self) -> Result<u32, BrokerError> {
        require(self.partition, "partition")
    }

    pub fn index(&self) -> Result<u64, BrokerError> {
        require(self.index, "index")
    }
}

fn require<T>(value: Option<T>, name: &str) -> Result<T, BrokerError> {
    value.ok_or_else(|| BrokerError::BadRequest(format!("missing param: {name}")))
}

#[derive(Debug, Serialize)]
pub struct KnockResponse {
    pub receiver_group: String,
    pub receiver: String,
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct PutMessageResponse {
    pub stream: String,
    pub partition: u32,
    pub index: u64,
    pub timestamp: u64,
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct GetMessageResponse {
    pub stream: String,
    pub receiver_group: String,
    pub receiver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ByteBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    pub assigned_partitions: Vec<u32>,
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct GetPartitionsResponse {
    pub stream: String,
    pub receiver_group: String,
    pub receiver: String,
    pub assigned_partitions: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct CommitMessageResponse {
    pub stream: String,
    pub receiver_group: String,
    pub status: Status,
}

#[derive(Debug, Serialize)]
pub struct SetOffsetResponse {
    pub stream: String,
    pub partition: u32,
    pub index: u64,
    pub receiver_group: String,
    pub status: Status,
}

/// The in-band failure shape for operational errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver_group: Option<String>,
    pub error: String,
    pub status: Status,
}
