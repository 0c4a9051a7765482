//! # Relay Envelopes
//!
//! A fiber never talks to a session directly. When the destination lives in
//! another process, the fiber's sender wraps the payload in one of these
//! envelopes and hands it to the process's relay fiber, which owns the
//! sessions.
//!
//! ```text
//!  fiber A ──Request{RELAY_REQUEST, RelayRequest{target, request}}──▶ relay fiber
//!  relay fiber ──Session.send(target, request)──▶ remote process
//!  remote process ──Response──▶ relay fiber
//!  relay fiber ──Response{RELAY_RESPONSE, RelayResponse{response}}──▶ fiber A
//! ```
//!
//! Envelopes use the reserved opcode block starting at [`RELAY_OPCODE_BASE`];
//! application opcodes must stay below it.

use crate::actor_id::ActorId;
use crate::codec::{decode_body, encode_body, CodecError};
use crate::message::{Message, Opcode, Request, Response};
use serde::{Deserialize, Serialize};

/// Instance id of the relay actor inside the relay fiber
pub const RELAY_INSTANCE_ID: i64 = 1;

pub const RELAY_OPCODE_BASE: Opcode = 0xFF00;
pub const RELAY_MESSAGE: Opcode = RELAY_OPCODE_BASE;
pub const RELAY_REQUEST: Opcode = RELAY_OPCODE_BASE + 1;
pub const RELAY_RESPONSE: Opcode = RELAY_OPCODE_BASE + 2;

pub fn is_relay_opcode(opcode: Opcode) -> bool {
    opcode >= RELAY_OPCODE_BASE
}

/// Fire-and-forget message tunnelled through the relay fiber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub target: ActorId,
    pub message: Message,
}

impl RelayMessage {
    pub fn wrap(target: ActorId, message: Message) -> Result<Message, CodecError> {
        Message::encode(RELAY_MESSAGE, &RelayMessage { target, message })
    }

    pub fn unwrap(envelope: &Message) -> Result<Self, CodecError> {
        expect_opcode(RELAY_MESSAGE, envelope.opcode)?;
        decode_body(&envelope.body)
    }
}

/// Request tunnelled through the relay fiber.
///
/// The outer request's `rpc_id` belongs to the caller's correlation table;
/// the inner request's is reassigned by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub target: ActorId,
    pub request: Request,
}

impl RelayRequest {
    pub fn wrap(target: ActorId, request: Request) -> Result<Request, CodecError> {
        Request::encode(RELAY_REQUEST, &RelayRequest { target, request })
    }

    pub fn unwrap(envelope: &Request) -> Result<Self, CodecError> {
        expect_opcode(RELAY_REQUEST, envelope.opcode)?;
        decode_body(&envelope.body)
    }
}

/// Response to a [`RelayRequest`], carrying the final destination's response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayResponse {
    pub response: Response,
}

impl RelayResponse {
    /// Wrap `response` into an envelope answering the caller's `rpc_id`
    pub fn wrap(rpc_id: u32, response: Response) -> Result<Response, CodecError> {
        Ok(Response::new(
            rpc_id,
            RELAY_RESPONSE,
            encode_body(&RelayResponse { response })?,
        ))
    }

    /// Extract the tunnelled response.
    ///
    /// An envelope that itself carries an error (the relay could not even
    /// attempt delivery) is returned as-is.
    pub fn unwrap(envelope: Response) -> Result<Response, CodecError> {
        if envelope.opcode != RELAY_RESPONSE {
            return Ok(envelope);
        }
        let relayed: RelayResponse = decode_body(&envelope.body)?;
        Ok(relayed.response)
    }
}

fn expect_opcode(expected: Opcode, actual: Opcode) -> Result<(), CodecError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CodecError::UnexpectedOpcode { expected, actual })
    }
}
