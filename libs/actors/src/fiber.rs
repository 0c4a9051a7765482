//! # Fibers
//!
//! A fiber is one tokio task draining one mailbox. It hosts actors keyed by
//! instance id and runs their handlers as futures polled on that same task,
//! so a fiber is single-logical-threaded: a handler suspended in a `call`
//! never blocks the rest of the fiber, and nothing inside the fiber runs in
//! parallel with anything else inside it.
//!
//! ## Dispatch
//!
//! | Frame | Goes to |
//! |-------|---------|
//! | `Response` | the fiber's correlation table |
//! | `Message` | `on_message` of the addressed actor, dropped if unknown |
//! | `Request` | `on_request` of the addressed actor, answered to `from`; `ERR_NOT_FOUND_ACTOR` if unknown |
//!
//! The relay fiber additionally drains the service event channel, so session
//! callbacks run on its turn.

use crate::correlation::PendingResponse;
use crate::error::ActorError;
use crate::message_queue::{MailboxFrame, MailboxReceiver, MessageQueue};
use crate::outer::ProcessOuterSender;
use crate::sender::MessageSender;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use mesh_config::MessagingConfig;
use mesh_network::{EventReceiver, ServiceEvent};
use mesh_types::{error_code, ActorId, Address, Message, MessageObject, Request, Response};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Behaviour of one actor hosted in a fiber
#[async_trait]
pub trait ActorHandler: Send + Sync + 'static {
    async fn on_message(&self, ctx: &FiberContext, from: ActorId, message: Message) {
        let _ = ctx;
        debug!(from = %from, opcode = message.opcode, "Actor ignores messages");
    }

    /// Answer a request. The returned response's `rpc_id` is overwritten with
    /// the request's before it is sent back.
    async fn on_request(&self, ctx: &FiberContext, from: ActorId, request: Request) -> Response {
        let _ = (ctx, from);
        request.reply_error(error_code::ERR_NOT_FOUND_ACTOR, "Actor does not serve requests")
    }
}

struct FiberShared {
    address: Address,
    sender: MessageSender,
    queue: MessageQueue,
    config: MessagingConfig,
    actors: RwLock<HashMap<i64, Arc<dyn ActorHandler>>>,
}

/// Handle to a running fiber, passed to every handler it runs
#[derive(Clone)]
pub struct FiberContext {
    shared: Arc<FiberShared>,
}

impl FiberContext {
    pub(crate) fn new(address: Address, queue: MessageQueue, config: &MessagingConfig) -> Self {
        Self {
            shared: Arc::new(FiberShared {
                address,
                sender: MessageSender::new(address, queue.clone(), config),
                queue,
                config: config.clone(),
                actors: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.shared.address
    }

    /// Id of an actor instance in this fiber
    pub fn actor_id(&self, instance_id: i64) -> ActorId {
        ActorId::from_address(self.shared.address, instance_id)
    }

    pub fn sender(&self) -> &MessageSender {
        &self.shared.sender
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.shared.queue
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.shared.config
    }

    /// Host `handler` under `instance_id`, replacing any previous actor there
    pub fn add_actor(&self, instance_id: i64, handler: Arc<dyn ActorHandler>) -> ActorId {
        let actor_id = self.actor_id(instance_id);
        if self.shared.actors.write().insert(instance_id, handler).is_some() {
            warn!(actor_id = %actor_id, "Replaced existing actor");
        } else {
            debug!(actor_id = %actor_id, "Actor added");
        }
        actor_id
    }

    pub fn remove_actor(&self, instance_id: i64) -> bool {
        self.shared.actors.write().remove(&instance_id).is_some()
    }

    pub fn has_actor(&self, instance_id: i64) -> bool {
        self.shared.actors.read().contains_key(&instance_id)
    }

    pub fn send(&self, target: ActorId, message: Message) -> Result<(), ActorError> {
        self.shared.sender.send(target, message)
    }

    /// Call with must-throw codes surfaced as errors
    pub fn call(&self, target: ActorId, request: Request) -> Result<PendingResponse, ActorError> {
        self.shared.sender.call(target, request, true)
    }

    pub fn call_with(
        &self,
        target: ActorId,
        request: Request,
        need_exception: bool,
    ) -> Result<PendingResponse, ActorError> {
        self.shared.sender.call(target, request, need_exception)
    }

    fn actor(&self, instance_id: i64) -> Option<Arc<dyn ActorHandler>> {
        self.shared.actors.read().get(&instance_id).cloned()
    }

    /// Route one mailbox frame. Handler work comes back as a future for the
    /// fiber loop to drive.
    fn dispatch(&self, frame: MailboxFrame) -> Option<BoxFuture<'static, ()>> {
        let MailboxFrame { from, to, message } = frame;
        match message {
            MessageObject::Response(response) => {
                self.shared.sender.handle_response(response);
                None
            }
            MessageObject::Message(message) => {
                let Some(actor) = self.actor(to.instance_id) else {
                    warn!(from = %from, to = %to, opcode = message.opcode, "No actor for message, dropping");
                    return None;
                };
                let ctx = self.clone();
                Some(async move { actor.on_message(&ctx, from, message).await }.boxed())
            }
            MessageObject::Request(request) => {
                let rpc_id = request.rpc_id;
                let Some(actor) = self.actor(to.instance_id) else {
                    debug!(from = %from, to = %to, rpc_id, "No actor for request");
                    self.shared.sender.reply(
                        from,
                        request.reply_error(
                            error_code::ERR_NOT_FOUND_ACTOR,
                            format!("No actor {} in fiber", to),
                        ),
                    );
                    return None;
                };
                let ctx = self.clone();
                Some(
                    async move {
                        let mut response = actor.on_request(&ctx, from, request).await;
                        response.rpc_id = rpc_id;
                        ctx.shared.sender.reply(from, response);
                    }
                    .boxed(),
                )
            }
        }
    }
}

/// Session side of the relay fiber
pub(crate) struct RelayLink {
    pub outer: Arc<ProcessOuterSender>,
    pub events: EventReceiver,
}

/// Fiber task body. Returns once the mailbox is unregistered and drained.
pub(crate) async fn run_fiber(ctx: FiberContext, mut mailbox: MailboxReceiver, relay: Option<RelayLink>) {
    let address = ctx.address();
    info!(fiber = %address, relay = relay.is_some(), "Fiber started");

    let (outer, mut events) = match relay {
        Some(RelayLink { outer, events }) => (Some(outer), Some(events)),
        None => (None, None),
    };
    let mut inflight: FuturesUnordered<BoxFuture<'static, ()>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            frame = mailbox.recv() => match frame {
                Some(frame) => {
                    trace!(fiber = %address, from = %frame.from, to = %frame.to, kind = %frame.message.kind(), "Dispatch");
                    if let Some(task) = ctx.dispatch(frame) {
                        inflight.push(task);
                    }
                }
                None => break,
            },
            event = next_event(&mut events), if events.is_some() => match (event, &outer) {
                (Some(event), Some(outer)) => {
                    if let Some(task) = outer.on_service_event(event) {
                        inflight.push(task);
                    }
                }
                _ => {
                    debug!(fiber = %address, "Service event channel closed");
                    events = None;
                }
            },
            Some(()) = inflight.next(), if !inflight.is_empty() => {}
        }
    }

    info!(fiber = %address, inflight = inflight.len(), "Fiber stopped");
}

async fn next_event(events: &mut Option<EventReceiver>) -> Option<ServiceEvent> {
    match events {
        Some(events) => events.recv().await,
        None => None,
    }
}
