//! In-Process Transport
//!
//! A [`MemoryNetwork`] is a hub of [`MemoryService`]s keyed by socket
//! address. Channels between two services on the same hub deliver frames
//! straight into the peer's event channel, after a full encode/decode pass
//! so framing limits and serialization behave as they do over TCP.
//!
//! Besides connected services, the hub can hold black-hole endpoints that
//! accept channels and silently discard every frame, which is how tests model
//! a peer that never answers.

use crate::error::{Result, TransportError};
use crate::frame::{FrameCodec, WireFrame, LENGTH_PREFIX_SIZE};
use crate::service::{
    ChannelId, EventSender, Service, ServiceEvent, ServiceType, ACCEPTED_CHANNEL_FLAG,
};
use mesh_config::MessagingConfig;
use mesh_types::{error_code, ActorId, MessageObject};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

#[derive(Clone)]
enum Endpoint {
    Service(Weak<MemoryShared>),
    BlackHole,
}

/// Shared hub connecting in-process services
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<SocketAddr, Endpoint>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint that accepts channels and drops every frame
    pub fn black_hole(&self, addr: SocketAddr) {
        self.endpoints.lock().insert(addr, Endpoint::BlackHole);
    }

    pub fn is_bound(&self, addr: SocketAddr) -> bool {
        match self.endpoints.lock().get(&addr) {
            Some(Endpoint::Service(weak)) => weak.strong_count() > 0,
            Some(Endpoint::BlackHole) => true,
            None => false,
        }
    }

    fn lookup(&self, addr: SocketAddr) -> Option<Endpoint> {
        self.endpoints.lock().get(&addr).cloned()
    }

    fn unbind(&self, addr: SocketAddr) {
        self.endpoints.lock().remove(&addr);
    }
}

#[derive(Clone)]
enum Link {
    Peer {
        service: Weak<MemoryShared>,
        channel_id: ChannelId,
    },
    BlackHole,
}

struct MemoryShared {
    network: MemoryNetwork,
    local: SocketAddr,
    events: EventSender,
    codec: FrameCodec,
    channels: Mutex<HashMap<ChannelId, Link>>,
    next_accept_id: AtomicI64,
}

impl MemoryShared {
    fn accept(&self, remote: SocketAddr, link: Link) -> ChannelId {
        let channel_id = ACCEPTED_CHANNEL_FLAG | self.next_accept_id.fetch_add(1, Ordering::Relaxed);
        self.channels.lock().insert(channel_id, link);
        let _ = self.events.send(ServiceEvent::Accept { channel_id, remote });
        channel_id
    }

    fn deliver(&self, channel_id: ChannelId, encoded: &[u8]) {
        match self.codec.decode_payload(&encoded[LENGTH_PREFIX_SIZE..]) {
            Ok(frame) => {
                let _ = self.events.send(ServiceEvent::Read {
                    channel_id,
                    actor_id: frame.actor_id,
                    message: frame.message,
                });
            }
            Err(e) => {
                warn!(channel_id, error = %e, "Dropping undecodable frame");
                self.fail(channel_id, e.error_code());
            }
        }
    }

    /// Remove the channel and report `error` to our owner
    fn fail(&self, channel_id: ChannelId, error: i32) {
        let removed = self.channels.lock().remove(&channel_id);
        if let Some(link) = removed {
            sever(&link);
            let _ = self.events.send(ServiceEvent::Error { channel_id, error });
        }
    }

    /// Peer side went away
    fn disconnect(&self, channel_id: ChannelId) {
        let removed = self.channels.lock().remove(&channel_id);
        if removed.is_some() {
            debug!(channel_id, local = %self.local, "Peer closed memory channel");
            let _ = self.events.send(ServiceEvent::Error {
                channel_id,
                error: error_code::ERR_SESSION_DISCONNECTED,
            });
        }
    }
}

fn sever(link: &Link) {
    if let Link::Peer { service, channel_id } = link {
        if let Some(peer) = service.upgrade() {
            peer.disconnect(*channel_id);
        }
    }
}

/// Service whose channels live entirely inside this process
#[derive(Clone)]
pub struct MemoryService {
    shared: Arc<MemoryShared>,
}

impl MemoryService {
    /// Bind `local` on `network`
    pub fn bind(
        network: &MemoryNetwork,
        local: SocketAddr,
        config: &MessagingConfig,
        events: EventSender,
    ) -> Result<Self> {
        let shared = Arc::new(MemoryShared {
            network: network.clone(),
            local,
            events,
            codec: FrameCodec::new(config.max_frame_size),
            channels: Mutex::new(HashMap::new()),
            next_accept_id: AtomicI64::new(1),
        });

        let mut endpoints = network.endpoints.lock();
        if let Some(Endpoint::Service(existing)) = endpoints.get(&local) {
            if existing.strong_count() > 0 {
                return Err(TransportError::configuration(
                    format!("{} is already bound", local),
                    Some("inner_endpoint"),
                ));
            }
        }
        endpoints.insert(local, Endpoint::Service(Arc::downgrade(&shared)));
        drop(endpoints);

        info!(local = %local, "Memory service bound");
        Ok(Self { shared })
    }

    /// Tear a channel down as if the transport failed with `error`.
    /// Both ends see a [`ServiceEvent::Error`].
    pub fn inject_error(&self, channel_id: ChannelId, error: i32) {
        self.shared.fail(channel_id, error);
    }

    /// Leave the network, failing every open channel
    pub fn close(&self) {
        self.shared.network.unbind(self.shared.local);
        let channel_ids: Vec<ChannelId> = self.shared.channels.lock().keys().copied().collect();
        for channel_id in channel_ids {
            self.shared.fail(channel_id, error_code::ERR_SESSION_DISCONNECTED);
        }
        info!(local = %self.shared.local, "Memory service closed");
    }
}

impl Service for MemoryService {
    fn create(&self, channel_id: ChannelId, remote: SocketAddr) -> Result<()> {
        let link = match self.shared.network.lookup(remote) {
            Some(Endpoint::BlackHole) => Link::BlackHole,
            Some(Endpoint::Service(weak)) => {
                let peer = weak.upgrade().ok_or_else(|| {
                    TransportError::connection("Service is gone", Some(remote))
                })?;
                let back = Link::Peer {
                    service: Arc::downgrade(&self.shared),
                    channel_id,
                };
                let peer_channel = peer.accept(self.shared.local, back);
                Link::Peer {
                    service: weak,
                    channel_id: peer_channel,
                }
            }
            None => {
                return Err(TransportError::connection(
                    "No service bound at address",
                    Some(remote),
                ))
            }
        };

        self.shared.channels.lock().insert(channel_id, link);
        debug!(channel_id, remote = %remote, "Memory channel created");
        Ok(())
    }

    fn send(&self, channel_id: ChannelId, actor_id: ActorId, message: MessageObject) -> Result<()> {
        let link = self
            .shared
            .channels
            .lock()
            .get(&channel_id)
            .cloned()
            .ok_or_else(|| TransportError::channel_not_found(channel_id))?;

        let encoded = self.shared.codec.encode(&WireFrame::new(actor_id, message))?;

        match link {
            Link::BlackHole => {
                trace!(channel_id, bytes = encoded.len(), "Frame discarded by black hole");
            }
            Link::Peer {
                service,
                channel_id: peer_channel,
            } => match service.upgrade() {
                Some(peer) => peer.deliver(peer_channel, &encoded),
                None => self.shared.fail(channel_id, error_code::ERR_SESSION_DISCONNECTED),
            },
        }
        Ok(())
    }

    fn remove(&self, channel_id: ChannelId) {
        let link = self.shared.channels.lock().remove(&channel_id);
        if let Some(link) = link {
            sever(&link);
            debug!(channel_id, "Memory channel removed");
        }
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        Some(self.shared.local)
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Memory
    }

    fn channel_count(&self) -> usize {
        self.shared.channels.lock().len()
    }
}
