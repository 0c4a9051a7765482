//! Network Infrastructure
//!
//! Transport side of the fiber mesh: the [`Service`] contract the sender
//! layer consumes, the [`Session`] wrapper a sender keeps per remote process,
//! wire framing, and two service implementations.
//!
//! ```text
//!  ProcessOuterSender ──Session::send──▶ Service ──frames──▶ remote Service
//!          ▲                                                       │
//!          └──────────── ServiceEvent (Accept/Read/Error) ◀────────┘
//! ```

pub mod error;
pub mod frame;
pub mod service;
pub mod session;
pub mod transports;

pub use error::{Result, TransportError};
pub use frame::{FrameCodec, WireFrame};
pub use service::{
    event_channel, is_accepted_channel, ChannelId, EventReceiver, EventSender, Service,
    ServiceEvent, ServiceType, ACCEPTED_CHANNEL_FLAG,
};
pub use session::Session;
pub use transports::{MemoryNetwork, MemoryService, TcpService, TcpServiceConfig};
