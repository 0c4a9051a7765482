//! # Message Sum Type
//!
//! Everything a mailbox or a session carries is a [`MessageObject`]:
//!
//! - [`Message`]: fire-and-forget
//! - [`Request`]: expects exactly one [`Response`], correlated by `rpc_id`
//! - [`Response`]: carries the request's `rpc_id` and an error code
//!
//! The variant is fixed when the frame is built or decoded, so dispatch is a
//! plain `match` rather than a runtime type probe.
//!
//! Bodies are opaque application payloads. Use [`crate::codec`] to move typed
//! values in and out of them.

use crate::codec::{decode_body, encode_body, CodecError};
use crate::error_code;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-level message type identifier
pub type Opcode = u16;

/// Discriminant of a [`MessageObject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Message,
    Request,
    Response,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Message => "message",
            MessageKind::Request => "request",
            MessageKind::Response => "response",
        };
        f.write_str(name)
    }
}

/// Fire-and-forget message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Message {
    pub fn new(opcode: Opcode, body: Bytes) -> Self {
        Self { opcode, body }
    }

    /// Encode `value` as the message body
    pub fn encode<T: Serialize>(opcode: Opcode, value: &T) -> Result<Self, CodecError> {
        Ok(Self::new(opcode, encode_body(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        decode_body(&self.body)
    }
}

/// Request half of an RPC.
///
/// `rpc_id` is overwritten by the sender component when the request is issued
/// through `call`; whatever the caller put there is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub rpc_id: u32,
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Request {
    pub fn new(opcode: Opcode, body: Bytes) -> Self {
        Self {
            rpc_id: 0,
            opcode,
            body,
        }
    }

    pub fn encode<T: Serialize>(opcode: Opcode, value: &T) -> Result<Self, CodecError> {
        Ok(Self::new(opcode, encode_body(value)?))
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        decode_body(&self.body)
    }

    /// Successful response to this request with the given payload
    pub fn reply(&self, opcode: Opcode, body: Bytes) -> Response {
        Response {
            rpc_id: self.rpc_id,
            error: error_code::ERR_SUCCESS,
            message: None,
            opcode,
            body,
        }
    }

    /// Error response to this request
    pub fn reply_error(&self, error: i32, message: impl Into<String>) -> Response {
        Response::error(self.rpc_id, error, message)
    }
}

/// Response half of an RPC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub rpc_id: u32,
    pub error: i32,
    pub message: Option<String>,
    pub opcode: Opcode,
    pub body: Bytes,
}

impl Response {
    pub fn new(rpc_id: u32, opcode: Opcode, body: Bytes) -> Self {
        Self {
            rpc_id,
            error: error_code::ERR_SUCCESS,
            message: None,
            opcode,
            body,
        }
    }

    pub fn encode<T: Serialize>(rpc_id: u32, opcode: Opcode, value: &T) -> Result<Self, CodecError> {
        Ok(Self::new(rpc_id, opcode, encode_body(value)?))
    }

    /// Body-less response carrying only an error code
    pub fn error(rpc_id: u32, error: i32, message: impl Into<String>) -> Self {
        Self {
            rpc_id,
            error,
            message: Some(message.into()),
            opcode: 0,
            body: Bytes::new(),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        decode_body(&self.body)
    }

    pub fn is_success(&self) -> bool {
        self.error == error_code::ERR_SUCCESS
    }
}

/// A frame travelling through a mailbox, a session or the relay fiber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageObject {
    Message(Message),
    Request(Request),
    Response(Response),
}

impl MessageObject {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageObject::Message(_) => MessageKind::Message,
            MessageObject::Request(_) => MessageKind::Request,
            MessageObject::Response(_) => MessageKind::Response,
        }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            MessageObject::Message(m) => m.opcode,
            MessageObject::Request(r) => r.opcode,
            MessageObject::Response(r) => r.opcode,
        }
    }

    /// RPC id for requests and responses, `None` for plain messages
    pub fn rpc_id(&self) -> Option<u32> {
        match self {
            MessageObject::Message(_) => None,
            MessageObject::Request(r) => Some(r.rpc_id),
            MessageObject::Response(r) => Some(r.rpc_id),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, MessageObject::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, MessageObject::Response(_))
    }

    pub fn body_len(&self) -> usize {
        match self {
            MessageObject::Message(m) => m.body.len(),
            MessageObject::Request(r) => r.body.len(),
            MessageObject::Response(r) => r.body.len(),
        }
    }
}

impl From<Message> for MessageObject {
    fn from(message: Message) -> Self {
        MessageObject::Message(message)
    }
}

impl From<Request> for MessageObject {
    fn from(request: Request) -> Self {
        MessageObject::Request(request)
    }
}

impl From<Response> for MessageObject {
    fn from(response: Response) -> Self {
        MessageObject::Response(response)
    }
}
