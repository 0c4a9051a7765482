//! # Actor Addressing
//!
//! An [`ActorId`] names a message destination: the OS process hosting it, the
//! fiber (mailbox) inside that process, and the actor instance inside the fiber.
//!
//! ```text
//!   ActorId { process: 2, fiber: 3, instance_id: 1001 }
//!             ──┬──────   ───┬────   ───────┬────────
//!               │            │               └─ actor inside the fiber
//!               │            └─ mailbox the local dispatch queue delivers to
//!               └─ decides local delivery vs. session/relay
//! ```
//!
//! The all-zero value is reserved: routing rejects it before anything is
//! queued or written to a session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a fiber mailbox inside the mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub process: i32,
    pub fiber: i32,
}

impl Address {
    pub const fn new(process: i32, fiber: i32) -> Self {
        Self { process, fiber }
    }

    /// The fiber-level actor id, used as the `from` of frames a fiber emits
    /// on its own behalf (requests issued by its sender, replies).
    pub const fn actor_id(&self) -> ActorId {
        ActorId::new(self.process, self.fiber, 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process, self.fiber)
    }
}

/// Unique destination identifier.
///
/// Immutable value type with structural equality. `ActorId::default()` is the
/// invalid destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    pub process: i32,
    pub fiber: i32,
    pub instance_id: i64,
}

impl ActorId {
    pub const fn new(process: i32, fiber: i32, instance_id: i64) -> Self {
        Self {
            process,
            fiber,
            instance_id,
        }
    }

    /// Build an id from a fiber address and an instance inside it
    pub const fn from_address(address: Address, instance_id: i64) -> Self {
        Self::new(address.process, address.fiber, instance_id)
    }

    /// The fiber mailbox this actor lives in
    pub const fn address(&self) -> Address {
        Address::new(self.process, self.fiber)
    }

    /// False only for the reserved all-zero id
    pub fn is_valid(&self) -> bool {
        *self != ActorId::default()
    }

    /// True when this actor lives in `process`
    pub fn is_in_process(&self, process: i32) -> bool {
        self.process == process
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.process, self.fiber, self.instance_id)
    }
}

impl From<(i32, i32, i64)> for ActorId {
    fn from((process, fiber, instance_id): (i32, i32, i64)) -> Self {
        Self::new(process, fiber, instance_id)
    }
}
