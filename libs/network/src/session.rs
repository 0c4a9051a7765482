//! Session: one channel of a [`Service`], owned by the sender that opened or
//! accepted it. Dropping the session removes the channel.

use crate::error::Result;
use crate::service::{ChannelId, Service};
use mesh_types::{ActorId, MessageObject};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

pub struct Session {
    channel_id: ChannelId,
    remote: SocketAddr,
    service: Arc<dyn Service>,
    created_at: Instant,
}

impl Session {
    /// Open an outbound channel through `service`
    pub fn connect(service: Arc<dyn Service>, channel_id: ChannelId, remote: SocketAddr) -> Result<Self> {
        service.create(channel_id, remote)?;
        info!(channel_id, remote = %remote, service = %service.service_type(), "Session created");
        Ok(Self::new(service, channel_id, remote))
    }

    /// Wrap a channel the service already accepted
    pub fn accepted(service: Arc<dyn Service>, channel_id: ChannelId, remote: SocketAddr) -> Self {
        info!(channel_id, remote = %remote, "Session accepted");
        Self::new(service, channel_id, remote)
    }

    fn new(service: Arc<dyn Service>, channel_id: ChannelId, remote: SocketAddr) -> Self {
        Self {
            channel_id,
            remote,
            service,
            created_at: Instant::now(),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn send(&self, actor_id: ActorId, message: impl Into<MessageObject>) -> Result<()> {
        let message = message.into();
        debug!(
            channel_id = self.channel_id,
            actor_id = %actor_id,
            kind = %message.kind(),
            rpc_id = ?message.rpc_id(),
            "Session send"
        );
        self.service.send(self.channel_id, actor_id, message)
    }

    /// Close the channel
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.service.remove(self.channel_id);
        info!(channel_id = self.channel_id, remote = %self.remote, "Session disposed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel_id", &self.channel_id)
            .field("remote", &self.remote)
            .field("service", &self.service.service_type())
            .finish()
    }
}
