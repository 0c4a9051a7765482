//! # Response Error Codes
//!
//! Numeric codes carried in [`crate::Response::error`].
//!
//! ## Ranges
//!
//! | Range | Meaning |
//! |---|---|
//! | `0` | success |
//! | `-1` | web-platform sentinel, never raised |
//! | `100_000..110_000` | mesh core: routing, timeouts, sessions |
//! | `110_000..200_000` | application errors surfaced as failures |
//! | `200_000..` | application errors returned as values |
//!
//! [`is_rpc_need_throw`] draws the line between "surface as a failure" and
//! "hand back to the caller as a response".

pub const ERR_SUCCESS: i32 = 0;

/// Sentinel some platforms use for "no error info"; never raised
pub const ERR_UNKNOWN_SENTINEL: i32 = -1;

/// Lowest code reserved for the mesh core
pub const ERR_CORE_BASE: i32 = 100_000;

/// Destination was the reserved zero actor id
pub const ERR_INVALID_DESTINATION: i32 = 100_001;

/// The destination process has no mailbox or actor for the target id
pub const ERR_NOT_FOUND_ACTOR: i32 = 100_002;

/// No response arrived within the RPC timeout
pub const ERR_ACTOR_TIMEOUT: i32 = 100_003;

/// The session carrying the call was closed or failed
pub const ERR_SESSION_DISCONNECTED: i32 = 100_004;

/// No endpoint is configured for the destination process, or connecting failed
pub const ERR_PEER_UNREACHABLE: i32 = 100_005;

/// The relay fiber of the local process is not running
pub const ERR_RELAY_UNAVAILABLE: i32 = 100_006;

/// A relay envelope could not be decoded
pub const ERR_RELAY_ENVELOPE: i32 = 100_007;

/// A frame exceeded the configured maximum size
pub const ERR_FRAME_TOO_LARGE: i32 = 100_008;

/// First application code; application codes below the no-throw floor fail the call
pub const ERR_APPLICATION_BASE: i32 = 110_000;

/// Codes at or above this value are returned as plain responses
pub const ERR_NO_THROW_FLOOR: i32 = 200_000;

/// Whether a response carrying `error` must be surfaced as a failure when the
/// caller asked for exceptions.
pub fn is_rpc_need_throw(error: i32) -> bool {
    if error == ERR_SUCCESS || error == ERR_UNKNOWN_SENTINEL {
        return false;
    }
    error < ERR_NO_THROW_FLOOR
}

/// Whether the code belongs to the mesh core range
pub fn is_core_error(error: i32) -> bool {
    (ERR_CORE_BASE..ERR_APPLICATION_BASE).contains(&error)
}

/// Short name for logging
pub fn name(error: i32) -> &'static str {
    match error {
        ERR_SUCCESS => "success",
        ERR_INVALID_DESTINATION => "invalid_destination",
        ERR_NOT_FOUND_ACTOR => "not_found_actor",
        ERR_ACTOR_TIMEOUT => "actor_timeout",
        ERR_SESSION_DISCONNECTED => "session_disconnected",
        ERR_PEER_UNREACHABLE => "peer_unreachable",
        ERR_RELAY_UNAVAILABLE => "relay_unavailable",
        ERR_RELAY_ENVELOPE => "relay_envelope",
        ERR_FRAME_TOO_LARGE => "frame_too_large",
        e if e >= ERR_NO_THROW_FLOOR => "application_value",
        e if e >= ERR_APPLICATION_BASE => "application",
        _ => "other",
    }
}
