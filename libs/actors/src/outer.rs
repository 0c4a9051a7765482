//! # Process Outer Sender
//!
//! The sender that actually crosses process boundaries. It lives in the
//! relay fiber, owns one [`Session`] per remote process and drains the
//! [`Service`] event channel on that fiber's turn.
//!
//! ```text
//!  outbound                               inbound (ServiceEvent)
//!  ────────                               ──────────────────────
//!  send/call ─▶ same process? ─▶ queue     Accept   ─▶ adopt session
//!                  │                       Read     ─▶ Message  ─▶ local queue
//!                  ▼                                   Request  ─▶ local call, answer on channel
//!            session for process                       Response ─▶ correlation table
//!            (lazily created from the      Error    ─▶ dispose session, fail its calls
//!             process directory)
//! ```
//!
//! The correlation table is the relay fiber's own, so responses arriving
//! through the local queue and responses arriving through a session resolve
//! in one place.

use crate::correlation::{CallRoute, CorrelationTable, PendingResponse};
use crate::error::ActorError;
use crate::metrics::SenderMetrics;
use crate::sender::MessageSender;
use futures::future::BoxFuture;
use futures::FutureExt;
use mesh_config::{MessagingConfig, ProcessDirectory};
use mesh_network::{ChannelId, Service, ServiceEvent, Session, TransportError};
use mesh_types::{error_code, ActorId, Address, Message, MessageObject, Request, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

struct SessionEntry {
    session: Session,
    /// Remote process, known only for sessions we opened
    process: Option<i32>,
}

#[derive(Default)]
struct SessionMap {
    by_channel: HashMap<ChannelId, SessionEntry>,
    by_process: HashMap<i32, ChannelId>,
}

pub struct ProcessOuterSender {
    inner: MessageSender,
    service: Arc<dyn Service>,
    directory: ProcessDirectory,
    sessions: Mutex<SessionMap>,
    next_channel_id: AtomicI64,
    fail_pending_on_session_error: bool,
}

impl ProcessOuterSender {
    /// `inner` is the relay fiber's own sender; its table is shared
    pub fn new(
        inner: MessageSender,
        service: Arc<dyn Service>,
        directory: ProcessDirectory,
        config: &MessagingConfig,
    ) -> Self {
        Self {
            inner,
            service,
            directory,
            sessions: Mutex::new(SessionMap::default()),
            next_channel_id: AtomicI64::new(1),
            fail_pending_on_session_error: config.fail_pending_on_session_error,
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn process(&self) -> i32 {
        self.inner.address().process
    }

    pub fn metrics(&self) -> &Arc<SenderMetrics> {
        self.inner.metrics()
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        self.inner.table()
    }

    pub fn pending_calls(&self) -> usize {
        self.inner.pending_calls()
    }

    /// Open sessions, outbound and accepted
    pub fn session_count(&self) -> usize {
        self.sessions.lock().by_channel.len()
    }

    pub fn has_session(&self, process: i32) -> bool {
        self.sessions.lock().by_process.contains_key(&process)
    }

    pub fn send(&self, target: ActorId, message: Message) -> Result<(), ActorError> {
        if !target.is_valid() {
            return Err(ActorError::InvalidDestination { actor_id: target });
        }
        if target.is_in_process(self.process()) {
            return self.inner.send(target, message);
        }

        let channel_id = self.channel_for(target.process)?;
        if let Err(e) = self.write(channel_id, target, message.into()) {
            self.on_write_error(channel_id, target, &e);
            return Err(e.into());
        }
        self.metrics().record_session_send();
        Ok(())
    }

    pub fn call(
        &self,
        target: ActorId,
        request: Request,
        need_exception: bool,
    ) -> Result<PendingResponse, ActorError> {
        if !target.is_valid() {
            return Err(ActorError::InvalidDestination { actor_id: target });
        }
        if target.is_in_process(self.process()) {
            return self.inner.call(target, request, need_exception);
        }

        let channel_id = self.channel_for(target.process)?;
        let (request, pending) = self.table().register(
            target,
            request,
            need_exception,
            CallRoute::Session(channel_id),
        );
        let rpc_id = request.rpc_id;

        if let Err(e) = self.write(channel_id, target, request.into()) {
            self.table().cancel(rpc_id);
            self.on_write_error(channel_id, target, &e);
            return Err(e.into());
        }
        self.metrics().record_session_send();
        Ok(pending)
    }

    /// Apply one service callback. Inbound requests are answered
    /// asynchronously; the returned future must be driven by the relay fiber.
    pub fn on_service_event(self: &Arc<Self>, event: ServiceEvent) -> Option<BoxFuture<'static, ()>> {
        match event {
            ServiceEvent::Accept { channel_id, remote } => {
                self.adopt(channel_id, remote);
                None
            }
            ServiceEvent::Read {
                channel_id,
                actor_id,
                message,
            } => match message {
                MessageObject::Message(message) => {
                    self.deliver_remote_message(channel_id, actor_id, message);
                    None
                }
                MessageObject::Request(request) => Some(
                    Arc::clone(self)
                        .serve_remote_request(channel_id, actor_id, request)
                        .boxed(),
                ),
                MessageObject::Response(response) => {
                    trace!(channel_id, rpc_id = response.rpc_id, "Response from session");
                    self.table().complete(response);
                    None
                }
            },
            ServiceEvent::Error { channel_id, error } => {
                self.on_session_failed(channel_id, error);
                None
            }
        }
    }

    /// Channel of the session reaching `process`, created on first use
    fn channel_for(&self, process: i32) -> Result<ChannelId, ActorError> {
        let mut sessions = self.sessions.lock();
        if let Some(channel_id) = sessions.by_process.get(&process) {
            return Ok(*channel_id);
        }

        let remote = self
            .directory
            .inner_endpoint(process)
            .ok_or(ActorError::UnknownProcess { process })?;
        let channel_id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::connect(Arc::clone(&self.service), channel_id, remote)?;

        sessions.by_process.insert(process, channel_id);
        sessions.by_channel.insert(
            channel_id,
            SessionEntry {
                session,
                process: Some(process),
            },
        );
        debug!(process, channel_id, remote = %remote, "Session opened for process");
        Ok(channel_id)
    }

    fn write(
        &self,
        channel_id: ChannelId,
        actor_id: ActorId,
        message: MessageObject,
    ) -> Result<(), TransportError> {
        let sessions = self.sessions.lock();
        match sessions.by_channel.get(&channel_id) {
            Some(entry) => entry.session.send(actor_id, message),
            None => Err(TransportError::channel_not_found(channel_id)),
        }
    }

    fn adopt(&self, channel_id: ChannelId, remote: SocketAddr) {
        let session = Session::accepted(Arc::clone(&self.service), channel_id, remote);
        self.sessions.lock().by_channel.insert(
            channel_id,
            SessionEntry {
                session,
                process: None,
            },
        );
    }

    fn deliver_remote_message(&self, channel_id: ChannelId, target: ActorId, message: Message) {
        if !target.is_in_process(self.process()) {
            warn!(channel_id, target = %target, "Message for another process arrived on session, dropping");
            return;
        }
        if let Err(e) = self.inner.send(target, message) {
            warn!(channel_id, target = %target, error = %e, "Dropping message from session");
        }
    }

    /// Run a request that came in over a session against the local process
    /// and write the response back on the same channel
    async fn serve_remote_request(self: Arc<Self>, channel_id: ChannelId, target: ActorId, request: Request) {
        let remote_rpc_id = request.rpc_id;
        trace!(channel_id, rpc_id = remote_rpc_id, target = %target, "Request from session");

        let mut response = if target.is_in_process(self.process()) {
            match self.inner.call(target, request, false) {
                Ok(pending) => match pending.await {
                    Ok(response) => response,
                    Err(e) => e.into_response(remote_rpc_id),
                },
                Err(e) => Response::error(remote_rpc_id, e.code(), e.to_string()),
            }
        } else {
            request.reply_error(
                error_code::ERR_NOT_FOUND_ACTOR,
                format!("Process {} does not host {}", self.process(), target),
            )
        };
        response.rpc_id = remote_rpc_id;

        let Err(e) = self.write(channel_id, target, response.into()) else {
            return;
        };
        if e.is_channel_failure() {
            debug!(channel_id, rpc_id = remote_rpc_id, error = %e, "Could not answer request, session gone");
            return;
        }

        // The answer itself was rejected; tell the caller why instead of
        // leaving it to time out
        warn!(channel_id, rpc_id = remote_rpc_id, target = %target, error = %e, "Response rejected by transport");
        let rejected = Response::error(remote_rpc_id, e.error_code(), e.to_string());
        if let Err(e) = self.write(channel_id, target, rejected.into()) {
            debug!(channel_id, rpc_id = remote_rpc_id, error = %e, "Could not report rejected response");
        }
    }

    /// A broken channel takes its session down. A rejected frame fails only
    /// the caller that produced it.
    fn on_write_error(&self, channel_id: ChannelId, target: ActorId, error: &TransportError) {
        if error.is_channel_failure() {
            self.on_session_failed(channel_id, error.error_code());
        } else {
            debug!(
                channel_id,
                target = %target,
                category = error.category(),
                "Frame rejected, session kept"
            );
        }
    }

    fn on_session_failed(&self, channel_id: ChannelId, error: i32) {
        let removed = {
            let mut sessions = self.sessions.lock();
            let entry = sessions.by_channel.remove(&channel_id);
            if let Some(process) = entry.as_ref().and_then(|entry| entry.process) {
                sessions.by_process.remove(&process);
            }
            entry
        };

        let Some(entry) = removed else {
            trace!(channel_id, error, "Error for a channel with no session");
            return;
        };
        warn!(
            channel_id,
            process = ?entry.process,
            error,
            reason = error_code::name(error),
            "Session failed"
        );
        entry.session.dispose();
        self.metrics().record_transport_failure();

        if self.fail_pending_on_session_error {
            let failed = self.table().fail_channel(channel_id, error);
            if failed > 0 {
                info!(channel_id, failed, "Failed pending calls of broken session");
            }
        }
    }
}
