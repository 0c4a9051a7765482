//! Payload body codec.
//!
//! Bodies are bincode-encoded. Routing never looks inside a body except for
//! the relay envelopes in [`crate::relay`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Body encoding and decoding failures
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: bincode::Error,
    },

    #[error("Failed to decode {type_name} from {len} bytes: {source}")]
    Decode {
        type_name: &'static str,
        len: usize,
        #[source]
        source: bincode::Error,
    },

    #[error("Unexpected opcode {actual} (expected {expected})")]
    UnexpectedOpcode { expected: u16, actual: u16 },
}

pub fn encode_body<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|source| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            source,
        })
}

pub fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(body).map_err(|source| CodecError::Decode {
        type_name: std::any::type_name::<T>(),
        len: body.len(),
        source,
    })
}
