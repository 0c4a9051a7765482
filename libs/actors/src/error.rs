//! Actor Error Types
//!
//! Two families, split by how callers handle them:
//!
//! | Type | Raised | Meaning |
//! |------|--------|---------|
//! | [`ActorError`] | synchronously by `send`/`call` | the frame could not be routed at all |
//! | [`RpcError`] | when a [`PendingResponse`](crate::PendingResponse) resolves | the call was routed but did not succeed |
//!
//! Both map back onto the numeric codes in [`mesh_types::error_code`], which
//! is what travels inside error-carrying responses.

use mesh_network::TransportError;
use mesh_types::error_code;
use mesh_types::{ActorId, Address, CodecError, Opcode, Response};
use thiserror::Error;

/// Routing or contract violation detected before anything was sent
#[derive(Error, Debug)]
pub enum ActorError {
    #[error("Invalid destination {actor_id}")]
    InvalidDestination { actor_id: ActorId },

    #[error("No mailbox registered for fiber {address}")]
    MailboxNotFound { address: Address },

    #[error("Relay fiber {address} is not running")]
    RelayUnavailable { address: Address },

    #[error("Process {process} is not in the process directory")]
    UnknownProcess { process: i32 },

    #[error("Fiber {address} is already running")]
    FiberExists { address: Address },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ActorError {
    /// Error code used when this failure has to be reported inside a response
    pub fn code(&self) -> i32 {
        match self {
            ActorError::InvalidDestination { .. } => error_code::ERR_INVALID_DESTINATION,
            ActorError::MailboxNotFound { .. } => error_code::ERR_NOT_FOUND_ACTOR,
            ActorError::RelayUnavailable { .. } => error_code::ERR_RELAY_UNAVAILABLE,
            ActorError::UnknownProcess { .. } => error_code::ERR_PEER_UNREACHABLE,
            ActorError::FiberExists { .. } => error_code::ERR_INVALID_DESTINATION,
            ActorError::Transport(e) => e.error_code(),
            ActorError::Codec(_) => error_code::ERR_RELAY_ENVELOPE,
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ActorError::InvalidDestination { .. } => "invalid_destination",
            ActorError::MailboxNotFound { .. } => "mailbox_not_found",
            ActorError::RelayUnavailable { .. } => "relay_unavailable",
            ActorError::UnknownProcess { .. } => "unknown_process",
            ActorError::FiberExists { .. } => "fiber_exists",
            ActorError::Transport(_) => "transport",
            ActorError::Codec(_) => "codec",
        }
    }
}

/// Outcome of a routed call that did not produce a usable response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC {rpc_id} to {target} timed out (opcode {opcode})")]
    Timeout {
        target: ActorId,
        opcode: Opcode,
        rpc_id: u32,
    },

    #[error("RPC {rpc_id}: actor {target} not found")]
    NotFoundActor { target: ActorId, rpc_id: u32 },

    #[error("RPC {rpc_id} to {target} failed with {} ({error}): {message}", code_name(.error))]
    Application {
        target: ActorId,
        opcode: Opcode,
        rpc_id: u32,
        error: i32,
        message: String,
    },

    #[error("RPC {rpc_id} to {target} failed in transport ({})", code_name(.error))]
    Transport {
        target: ActorId,
        rpc_id: u32,
        error: i32,
    },

    #[error("RPC {rpc_id} to {target} was cancelled")]
    Cancelled { target: ActorId, rpc_id: u32 },
}

fn code_name(code: &i32) -> &'static str {
    error_code::name(*code)
}

impl RpcError {
    /// Classify an error-carrying response for a caller that asked for failures
    pub fn from_response(target: ActorId, opcode: Opcode, response: Response) -> Self {
        let rpc_id = response.rpc_id;
        match response.error {
            error_code::ERR_ACTOR_TIMEOUT => RpcError::Timeout {
                target,
                opcode,
                rpc_id,
            },
            error_code::ERR_NOT_FOUND_ACTOR => RpcError::NotFoundActor { target, rpc_id },
            error @ (error_code::ERR_SESSION_DISCONNECTED
            | error_code::ERR_PEER_UNREACHABLE
            | error_code::ERR_RELAY_UNAVAILABLE
            | error_code::ERR_FRAME_TOO_LARGE) => RpcError::Transport {
                target,
                rpc_id,
                error,
            },
            error => RpcError::Application {
                target,
                opcode,
                rpc_id,
                error,
                message: response.message.unwrap_or_default(),
            },
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            RpcError::Timeout { .. } => error_code::ERR_ACTOR_TIMEOUT,
            RpcError::NotFoundActor { .. } => error_code::ERR_NOT_FOUND_ACTOR,
            RpcError::Application { error, .. } => *error,
            RpcError::Transport { error, .. } => *error,
            RpcError::Cancelled { .. } => error_code::ERR_RELAY_UNAVAILABLE,
        }
    }

    pub fn target(&self) -> ActorId {
        match self {
            RpcError::Timeout { target, .. }
            | RpcError::NotFoundActor { target, .. }
            | RpcError::Application { target, .. }
            | RpcError::Transport { target, .. }
            | RpcError::Cancelled { target, .. } => *target,
        }
    }

    pub fn rpc_id(&self) -> u32 {
        match self {
            RpcError::Timeout { rpc_id, .. }
            | RpcError::NotFoundActor { rpc_id, .. }
            | RpcError::Application { rpc_id, .. }
            | RpcError::Transport { rpc_id, .. }
            | RpcError::Cancelled { rpc_id, .. } => *rpc_id,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RpcError::Timeout { .. })
    }

    /// Error response carrying this failure, for forwarding to another caller
    pub fn into_response(self, rpc_id: u32) -> Response {
        let code = self.code();
        Response::error(rpc_id, code, self.to_string())
    }
}
