//! # Message Sender
//!
//! One per fiber. Decides where a frame goes and keeps the fiber's
//! outstanding calls.
//!
//! ## Routing
//!
//! - **Same process**: straight into the destination mailbox through the
//!   [`MessageQueue`]. Nothing is serialized and no session is involved.
//! - **Other process**: wrapped in a relay envelope and queued to the relay
//!   actor of this process, which owns the sessions. A relayed call is
//!   correlated twice: once here, and once in the relay's own table.
//! - **Zero actor id**: rejected before anything is registered or queued.
//!
//! `call` is split in two. The synchronous half returns an [`ActorError`]
//! when the request cannot be routed; the returned [`PendingResponse`]
//! yields the RPC outcome.

use crate::correlation::{CallRoute, CorrelationTable, PendingResponse};
use crate::error::ActorError;
use crate::message_queue::MessageQueue;
use crate::metrics::SenderMetrics;
use mesh_config::MessagingConfig;
use mesh_types::{
    error_code, ActorId, Address, Message, RelayMessage, RelayRequest, Request, Response,
    RELAY_INSTANCE_ID,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

#[derive(Clone)]
pub struct MessageSender {
    /// Fiber this sender belongs to
    address: Address,
    /// Relay fiber of the same process
    relay: Address,
    queue: MessageQueue,
    table: Arc<CorrelationTable>,
}

impl MessageSender {
    pub fn new(address: Address, queue: MessageQueue, config: &MessagingConfig) -> Self {
        Self {
            address,
            relay: Address::new(address.process, config.relay_fiber),
            queue,
            table: CorrelationTable::new(config.rpc_timeout(), SenderMetrics::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// The relay actor remote-bound frames are handed to
    pub fn relay_actor(&self) -> ActorId {
        ActorId::from_address(self.relay, RELAY_INSTANCE_ID)
    }

    fn from(&self) -> ActorId {
        self.address.actor_id()
    }

    fn is_local(&self, target: ActorId) -> bool {
        target.is_in_process(self.address.process)
    }

    /// Fire-and-forget delivery of `message` to `target`
    pub fn send(&self, target: ActorId, message: Message) -> Result<(), ActorError> {
        if !target.is_valid() {
            return Err(ActorError::InvalidDestination { actor_id: target });
        }

        if self.is_local(target) {
            if !self.queue.send(self.from(), target, message.into()) {
                return Err(ActorError::MailboxNotFound {
                    address: target.address(),
                });
            }
            self.metrics().record_local_send();
            return Ok(());
        }

        let envelope = RelayMessage::wrap(target, message)?;
        self.enqueue_to_relay(envelope.into())?;
        self.metrics().record_relay_send();
        trace!(target = %target, relay = %self.relay, "Message handed to relay");
        Ok(())
    }

    /// Issue `request` to `target`.
    ///
    /// Whatever `rpc_id` the request carries is replaced. With
    /// `need_exception` set, must-throw error codes resolve the call as
    /// [`RpcError`](crate::RpcError); otherwise they come back as a response.
    pub fn call(
        &self,
        target: ActorId,
        request: Request,
        need_exception: bool,
    ) -> Result<PendingResponse, ActorError> {
        if !target.is_valid() {
            return Err(ActorError::InvalidDestination { actor_id: target });
        }

        if self.is_local(target) {
            let (request, pending) =
                self.table
                    .register(target, request, need_exception, CallRoute::Local);
            let rpc_id = request.rpc_id;
            if self.queue.send(self.from(), target, request.into()) {
                self.metrics().record_local_send();
            } else {
                // No mailbox: the call still resolves, as not-found
                debug!(rpc_id, target = %target, "No mailbox for call target");
                self.table.complete(Response::error(
                    rpc_id,
                    error_code::ERR_NOT_FOUND_ACTOR,
                    format!("No fiber {} in process {}", target.fiber, target.process),
                ));
            }
            return Ok(pending);
        }

        let (request, pending) =
            self.table
                .register(target, request, need_exception, CallRoute::Relayed);
        let rpc_id = request.rpc_id;
        let mut envelope = match RelayRequest::wrap(target, request) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.table.cancel(rpc_id);
                return Err(e.into());
            }
        };
        envelope.rpc_id = rpc_id;

        if let Err(e) = self.enqueue_to_relay(envelope.into()) {
            self.table.cancel(rpc_id);
            return Err(e);
        }
        self.metrics().record_relay_send();
        trace!(rpc_id, target = %target, relay = %self.relay, "Call handed to relay");
        Ok(pending)
    }

    /// Answer a request received from `to`. Responses only travel back
    /// through the local queue; cross-process replies are written by the
    /// relay on the session the request came in on.
    pub fn reply(&self, to: ActorId, response: Response) -> bool {
        if !self.is_local(to) {
            warn!(to = %to, rpc_id = response.rpc_id, "Dropping reply to another process");
            return false;
        }
        let rpc_id = response.rpc_id;
        if self.queue.send(self.from(), to, response.into()) {
            self.metrics().record_local_send();
            true
        } else {
            debug!(to = %to, rpc_id, "Caller mailbox gone, dropping reply");
            false
        }
    }

    /// Resolve the pending call a response belongs to
    pub fn handle_response(&self, response: Response) -> bool {
        self.table.complete(response)
    }

    pub fn pending_calls(&self) -> usize {
        self.table.len()
    }

    pub fn metrics(&self) -> &Arc<SenderMetrics> {
        self.table.metrics()
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    fn enqueue_to_relay(&self, envelope: mesh_types::MessageObject) -> Result<(), ActorError> {
        if self.queue.send(self.from(), self.relay_actor(), envelope) {
            Ok(())
        } else {
            Err(ActorError::RelayUnavailable {
                address: self.relay,
            })
        }
    }
}
