//! TCP Service Implementation
//!
//! Each channel is one TCP connection driven by two tasks:
//!
//! - **writer**: drains the channel's outbound queue in order, writing
//!   pre-encoded frames; it owns the connect step for outbound channels
//! - **reader**: decodes inbound frames and emits [`ServiceEvent::Read`]
//!
//! Whichever task fails first removes the channel and emits a single
//! [`ServiceEvent::Error`]. A channel removed by its owner emits nothing; its
//! writer drains what was already queued and shuts the socket down.

use crate::error::{Result, TransportError};
use crate::frame::{FrameCodec, WireFrame};
use crate::service::{
    ChannelId, EventSender, Service, ServiceEvent, ServiceType, ACCEPTED_CHANNEL_FLAG,
};
use bytes::{Bytes, BytesMut};
use mesh_config::service::session::{
    ACCEPT_BACKOFF_MAX_MS, ACCEPT_BACKOFF_MIN_MS, READ_BUFFER_SIZE,
};
use mesh_config::MessagingConfig;
use mesh_types::{ActorId, MessageObject};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// TCP service configuration
#[derive(Debug, Clone, Copy)]
pub struct TcpServiceConfig {
    /// Connection timeout for outbound channels
    pub connect_timeout: Duration,
    /// Maximum frame payload size
    pub max_frame_size: usize,
}

impl From<&MessagingConfig> for TcpServiceConfig {
    fn from(config: &MessagingConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            max_frame_size: config.max_frame_size,
        }
    }
}

struct ChannelHandle {
    outbound: mpsc::UnboundedSender<Bytes>,
    remote: SocketAddr,
}

struct TcpShared {
    config: TcpServiceConfig,
    codec: FrameCodec,
    events: EventSender,
    channels: Mutex<HashMap<ChannelId, ChannelHandle>>,
    next_accept_id: AtomicI64,
    local: Option<SocketAddr>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpShared {
    /// Remove the channel and report `error`, unless its owner already did
    fn fail(&self, channel_id: ChannelId, error: &TransportError) {
        let removed = self.channels.lock().remove(&channel_id);
        if let Some(handle) = removed {
            warn!(
                channel_id,
                remote = %handle.remote,
                category = error.category(),
                error = %error,
                "TCP channel failed"
            );
            let _ = self.events.send(ServiceEvent::Error {
                channel_id,
                error: error.error_code(),
            });
        }
    }

    fn is_registered(&self, channel_id: ChannelId) -> bool {
        self.channels.lock().contains_key(&channel_id)
    }
}

impl Drop for TcpShared {
    fn drop(&mut self) {
        if let Some(task) = self.accept_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Aborts the paired reader when the writer side ends
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Service carrying frames over TCP connections
#[derive(Clone)]
pub struct TcpService {
    shared: Arc<TcpShared>,
}

impl TcpService {
    /// Listen on `bind_address` and accept inbound channels
    pub async fn bind(
        bind_address: SocketAddr,
        config: impl Into<TcpServiceConfig>,
        events: EventSender,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_address)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to bind TCP listener", e))?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get local address", e))?;

        let service = Self::with_local(config.into(), events, Some(local));
        let task = tokio::spawn(accept_loop(listener, Arc::downgrade(&service.shared)));
        *service.shared.accept_task.lock() = Some(task);

        info!("TCP service listening on {}", local);
        Ok(service)
    }

    /// Service that only opens outbound channels
    pub fn client(config: impl Into<TcpServiceConfig>, events: EventSender) -> Self {
        Self::with_local(config.into(), events, None)
    }

    fn with_local(config: TcpServiceConfig, events: EventSender, local: Option<SocketAddr>) -> Self {
        Self {
            shared: Arc::new(TcpShared {
                config,
                codec: FrameCodec::new(config.max_frame_size),
                events,
                channels: Mutex::new(HashMap::new()),
                next_accept_id: AtomicI64::new(1),
                local,
                accept_task: Mutex::new(None),
            }),
        }
    }

    /// Stop accepting and drop every channel without raising events
    pub fn close(&self) {
        if let Some(task) = self.shared.accept_task.lock().take() {
            task.abort();
        }
        self.shared.channels.lock().clear();
        info!(local = ?self.shared.local, "TCP service closed");
    }

    fn register(&self, channel_id: ChannelId, remote: SocketAddr) -> mpsc::UnboundedReceiver<Bytes> {
        let (outbound, rx) = mpsc::unbounded_channel();
        self.shared
            .channels
            .lock()
            .insert(channel_id, ChannelHandle { outbound, remote });
        rx
    }
}

impl Service for TcpService {
    fn create(&self, channel_id: ChannelId, remote: SocketAddr) -> Result<()> {
        if self.shared.is_registered(channel_id) {
            return Err(TransportError::configuration(
                format!("Channel {} already exists", channel_id),
                Some("channel_id"),
            ));
        }

        let outbound = self.register(channel_id, remote);
        tokio::spawn(run_outbound(
            Arc::downgrade(&self.shared),
            channel_id,
            remote,
            outbound,
        ));
        debug!(channel_id, remote = %remote, "TCP channel created");
        Ok(())
    }

    fn send(&self, channel_id: ChannelId, actor_id: ActorId, message: MessageObject) -> Result<()> {
        let encoded = self.shared.codec.encode(&WireFrame::new(actor_id, message))?;

        let channels = self.shared.channels.lock();
        let handle = channels
            .get(&channel_id)
            .ok_or_else(|| TransportError::channel_not_found(channel_id))?;
        handle
            .outbound
            .send(encoded)
            .map_err(|_| TransportError::network("Writer task has stopped"))
    }

    fn remove(&self, channel_id: ChannelId) {
        if self.shared.channels.lock().remove(&channel_id).is_some() {
            debug!(channel_id, "TCP channel removed");
        }
    }

    fn local_endpoint(&self) -> Option<SocketAddr> {
        self.shared.local
    }

    fn service_type(&self) -> ServiceType {
        ServiceType::Tcp
    }

    fn channel_count(&self) -> usize {
        self.shared.channels.lock().len()
    }
}

/// Pause before retrying accept. `previous` is the last pause, `None` after a success
fn accept_backoff(previous: Option<Duration>) -> Duration {
    let max = Duration::from_millis(ACCEPT_BACKOFF_MAX_MS);
    match previous {
        None => Duration::from_millis(ACCEPT_BACKOFF_MIN_MS),
        Some(previous) => (previous * 2).min(max),
    }
}

async fn accept_loop(listener: TcpListener, shared: Weak<TcpShared>) {
    let mut backoff = None;
    loop {
        let (stream, remote) = match listener.accept().await {
            Ok(accepted) => {
                backoff = None;
                accepted
            }
            Err(e) => {
                // Errors such as EMFILE persist until something is released
                let pause = accept_backoff(backoff);
                backoff = Some(pause);
                warn!(error = %e, retry_ms = pause.as_millis() as u64, "Failed to accept TCP connection");
                tokio::time::sleep(pause).await;
                if shared.strong_count() == 0 {
                    break;
                }
                continue;
            }
        };

        let Some(owner) = shared.upgrade() else {
            break;
        };
        let service = TcpService { shared: owner };
        let channel_id =
            ACCEPTED_CHANNEL_FLAG | service.shared.next_accept_id.fetch_add(1, Ordering::Relaxed);
        let outbound = service.register(channel_id, remote);
        let _ = service
            .shared
            .events
            .send(ServiceEvent::Accept { channel_id, remote });
        info!(channel_id, remote = %remote, "Accepted TCP connection");

        tokio::spawn(run_connection(
            Arc::downgrade(&service.shared),
            channel_id,
            stream,
            outbound,
        ));
    }
}

async fn run_outbound(
    shared: Weak<TcpShared>,
    channel_id: ChannelId,
    remote: SocketAddr,
    outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    let Some(connect_timeout) = shared.upgrade().map(|s| s.config.connect_timeout) else {
        return;
    };

    info!("Connecting to TCP peer at {}", remote);
    let connected = tokio::time::timeout(connect_timeout, TcpStream::connect(remote))
        .await
        .map_err(|_| TransportError::timeout("TCP connect", connect_timeout.as_millis() as u64))
        .and_then(|r| {
            r.map_err(|e| {
                TransportError::connection_with_source("Failed to connect to TCP peer", Some(remote), e)
            })
        });

    match connected {
        Ok(stream) => run_connection(shared, channel_id, stream, outbound).await,
        Err(e) => {
            if let Some(shared) = shared.upgrade() {
                shared.fail(channel_id, &e);
            }
        }
    }
}

async fn run_connection(
    shared: Weak<TcpShared>,
    channel_id: ChannelId,
    stream: TcpStream,
    outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    let Some(codec) = shared.upgrade().map(|s| s.codec) else {
        return;
    };

    let (reader, writer) = stream.into_split();
    let reader_task = tokio::spawn(read_frames(shared.clone(), channel_id, codec, reader));
    let _reader_guard = AbortOnDrop(reader_task.abort_handle());

    write_frames(shared, channel_id, codec, writer, outbound).await;
}

async fn write_frames(
    shared: Weak<TcpShared>,
    channel_id: ChannelId,
    codec: FrameCodec,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(encoded) = outbound.recv().await {
        if let Err(e) = codec.write_encoded(&mut writer, &encoded).await {
            if let Some(shared) = shared.upgrade() {
                shared.fail(channel_id, &e);
            }
            return;
        }
    }

    // Owner removed the channel
    if let Err(e) = writer.shutdown().await {
        debug!(channel_id, "Error shutting down TCP stream: {}", e);
    }
}

async fn read_frames(
    shared: Weak<TcpShared>,
    channel_id: ChannelId,
    codec: FrameCodec,
    mut reader: OwnedReadHalf,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        let result = codec.read_frame(&mut reader, &mut buf).await;
        let Some(owner) = shared.upgrade() else {
            return;
        };

        match result {
            Ok(Some(frame)) => {
                if !owner.is_registered(channel_id) {
                    return;
                }
                let event = ServiceEvent::Read {
                    channel_id,
                    actor_id: frame.actor_id,
                    message: frame.message,
                };
                if owner.events.send(event).is_err() {
                    return;
                }
            }
            Ok(None) => {
                owner.fail(
                    channel_id,
                    &TransportError::network("Peer closed the connection"),
                );
                return;
            }
            Err(e) => {
                owner.fail(channel_id, &e);
                return;
            }
        }
    }
}
