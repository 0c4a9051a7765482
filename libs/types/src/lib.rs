//! # Mesh Types
//!
//! Shared vocabulary for the fiber mesh: how a destination is addressed, what
//! travels between fibers, and which error codes a response may carry.
//!
//! ## Contents
//!
//! - [`ActorId`] / [`Address`]: process + fiber + instance addressing
//! - [`MessageObject`]: the `Message | Request | Response` sum type that every
//!   mailbox, session and relay hop carries
//! - [`relay`]: envelopes used for the inner-network hop through the relay fiber
//! - [`error_code`]: numeric error codes and the "must throw" classification
//! - [`codec`]: bincode helpers for application payload bodies
//!
//! ## Quick Start
//!
//! ```rust
//! use mesh_types::{ActorId, MessageObject, Request};
//!
//! let target = ActorId::new(2, 3, 1001);
//! let ping = Request::new(10, bytes::Bytes::from_static(b"ping"));
//! let frame = MessageObject::from(ping);
//!
//! assert!(target.is_valid());
//! assert!(frame.is_request());
//! ```

pub mod actor_id;
pub mod codec;
pub mod error_code;
pub mod message;
pub mod relay;

pub use actor_id::{ActorId, Address};
pub use codec::{decode_body, encode_body, CodecError};
pub use message::{Message, MessageKind, MessageObject, Opcode, Request, Response};
pub use relay::{RelayMessage, RelayRequest, RelayResponse, RELAY_INSTANCE_ID};
