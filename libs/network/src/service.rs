//! # Service Contract
//!
//! A [`Service`] owns the transport channels of one process. The sender layer
//! never touches sockets; it only asks a service to open, write to, or drop a
//! channel, and learns about everything else through [`ServiceEvent`]s.
//!
//! ## Callback delivery
//!
//! Transport tasks never call into the owner. Inbound frames, accepted
//! connections and channel failures are pushed onto an unbounded event
//! channel that the owning fiber drains on its own turn:
//!
//! ```text
//!  reader task ──ServiceEvent::Read──┐
//!  accept loop ──ServiceEvent::Accept─┼──▶ EventReceiver ──▶ relay fiber
//!  writer task ──ServiceEvent::Error─┘
//! ```
//!
//! ## Channel ids
//!
//! Outbound ids are chosen by the caller of [`Service::create`]. Ids of
//! accepted channels are allocated by the service and always carry
//! [`ACCEPTED_CHANNEL_FLAG`], so the two spaces never collide.

use crate::error::Result;
use mesh_types::{ActorId, MessageObject};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Identifier of one channel inside one service
pub type ChannelId = i64;

/// Bit set on every channel id allocated for an inbound connection
pub const ACCEPTED_CHANNEL_FLAG: ChannelId = 1 << 62;

pub fn is_accepted_channel(channel_id: ChannelId) -> bool {
    channel_id & ACCEPTED_CHANNEL_FLAG != 0
}

/// Callback raised by a service, delivered in order per channel
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A remote peer opened a channel to us
    Accept {
        channel_id: ChannelId,
        remote: SocketAddr,
    },
    /// A frame arrived on a channel
    Read {
        channel_id: ChannelId,
        actor_id: ActorId,
        message: MessageObject,
    },
    /// The channel failed and has already been removed from the service
    Error { channel_id: ChannelId, error: i32 },
}

impl ServiceEvent {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            ServiceEvent::Accept { channel_id, .. }
            | ServiceEvent::Read { channel_id, .. }
            | ServiceEvent::Error { channel_id, .. } => *channel_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<ServiceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServiceEvent>;

/// Create the event channel a service reports into
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Kind of service, for logs and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Tcp,
    Memory,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Tcp => f.write_str("tcp"),
            ServiceType::Memory => f.write_str("memory"),
        }
    }
}

/// Transport channels of one process.
///
/// Every method returns without waiting on the network. Writes are queued in
/// order per channel; failures discovered later arrive as
/// [`ServiceEvent::Error`].
pub trait Service: Send + Sync {
    /// Open an outbound channel to `remote`. Frames sent before the
    /// connection is established are queued.
    fn create(&self, channel_id: ChannelId, remote: SocketAddr) -> Result<()>;

    /// Queue one frame addressed to `actor_id` on the channel
    fn send(&self, channel_id: ChannelId, actor_id: ActorId, message: MessageObject) -> Result<()>;

    /// Drop the channel. Idempotent; raises no event.
    fn remove(&self, channel_id: ChannelId);

    /// Address remote processes use to reach this service, if it listens
    fn local_endpoint(&self) -> Option<SocketAddr>;

    fn service_type(&self) -> ServiceType;

    /// Number of live channels
    fn channel_count(&self) -> usize;
}
