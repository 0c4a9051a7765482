//! Wire framing.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────┐
//! │ len: u32 BE  │ bincode(WireFrame { actor_id, msg }) │
//! └──────────────┴──────────────────────────────────────┘
//! ```
//!
//! `len` counts the payload only. Frames whose payload exceeds
//! `max_frame_size` are rejected on both the write and the read side.

use crate::error::{Result, TransportError};
use bytes::{BufMut, Bytes, BytesMut};
use mesh_types::{ActorId, MessageObject};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One addressed frame as it travels over a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub actor_id: ActorId,
    pub message: MessageObject,
}

impl WireFrame {
    pub fn new(actor_id: ActorId, message: MessageObject) -> Self {
        Self { actor_id, message }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Serialize `frame` with its length prefix
    pub fn encode(&self, frame: &WireFrame) -> Result<Bytes> {
        let payload_len = bincode::serialized_size(frame)? as usize;
        if payload_len > self.max_frame_size {
            return Err(TransportError::frame_too_large(payload_len, self.max_frame_size));
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload_len);
        buf.put_u32(payload_len as u32);
        bincode::serialize_into((&mut buf).writer(), frame)?;
        Ok(buf.freeze())
    }

    /// Deserialize a payload with the length prefix already stripped
    pub fn decode_payload(&self, payload: &[u8]) -> Result<WireFrame> {
        if payload.len() > self.max_frame_size {
            return Err(TransportError::frame_too_large(payload.len(), self.max_frame_size));
        }
        Ok(bincode::deserialize(payload)?)
    }

    /// Write an already encoded frame and flush
    pub async fn write_encoded<W>(&self, writer: &mut W, encoded: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer
            .write_all(encoded)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to write frame", e))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to flush stream", e))?;
        Ok(())
    }

    /// Read one frame, reusing `buf` for the payload.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a frame boundary.
    pub async fn read_frame<R>(&self, reader: &mut R, buf: &mut BytesMut) -> Result<Option<WireFrame>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
        match reader.read_exact(&mut len_bytes).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(TransportError::network_with_source(
                    "Failed to read frame length",
                    e,
                ))
            }
        }

        let payload_len = u32::from_be_bytes(len_bytes) as usize;
        if payload_len > self.max_frame_size {
            return Err(TransportError::frame_too_large(payload_len, self.max_frame_size));
        }

        buf.clear();
        buf.resize(payload_len, 0);
        reader
            .read_exact(&mut buf[..])
            .await
            .map_err(|e| TransportError::network_with_source("Failed to read frame payload", e))?;

        self.decode_payload(&buf[..]).map(Some)
    }
}
