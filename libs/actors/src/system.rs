//! Actor System
//!
//! Owns the fibers of one process: their mailboxes in the shared
//! [`MessageQueue`], their tasks, and the relay fiber that connects the
//! process to the rest of the mesh.
//!
//! # Lifecycle
//!
//! ```text
//!  ActorSystem::new ─▶ start_relay(service, events, directory)
//!                  └─▶ spawn_fiber(id) ─▶ ctx.add_actor(..)
//!  stop_fiber(id) / shutdown()  ─▶ mailbox unregistered, task aborted
//! ```
//!
//! A process without a relay can still talk between its own fibers; calls
//! to other processes then fail with `RelayUnavailable`.

use crate::error::ActorError;
use crate::fiber::{run_fiber, FiberContext, RelayLink};
use crate::message_queue::MessageQueue;
use crate::outer::ProcessOuterSender;
use crate::relay::RelayHandler;
use mesh_config::{MeshConfig, MessagingConfig, ProcessDirectory};
use mesh_network::{EventReceiver, Service};
use mesh_types::{Address, RELAY_INSTANCE_ID};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct FiberHandle {
    ctx: FiberContext,
    task: JoinHandle<()>,
}

pub struct ActorSystem {
    process: i32,
    config: MessagingConfig,
    queue: MessageQueue,
    fibers: Mutex<HashMap<i32, FiberHandle>>,
    relay: Mutex<Option<Arc<ProcessOuterSender>>>,
}

impl ActorSystem {
    pub fn new(process: i32, config: MessagingConfig) -> Self {
        info!(process, relay_fiber = config.relay_fiber, "Creating actor system");
        Self {
            process,
            config,
            queue: MessageQueue::new(process),
            fibers: Mutex::new(HashMap::new()),
            relay: Mutex::new(None),
        }
    }

    pub fn from_config(config: &MeshConfig) -> Self {
        Self::new(config.process_id, config.messaging.clone())
    }

    pub fn process(&self) -> i32 {
        self.process
    }

    pub fn config(&self) -> &MessagingConfig {
        &self.config
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Start an empty fiber. Must run inside a tokio runtime.
    pub fn spawn_fiber(&self, fiber: i32) -> Result<FiberContext, ActorError> {
        let address = Address::new(self.process, fiber);
        let mailbox = self
            .queue
            .register(fiber)
            .ok_or(ActorError::FiberExists { address })?;

        let ctx = FiberContext::new(address, self.queue.clone(), &self.config);
        let task = tokio::spawn(run_fiber(ctx.clone(), mailbox, None));
        self.fibers.lock().insert(
            fiber,
            FiberHandle {
                ctx: ctx.clone(),
                task,
            },
        );
        Ok(ctx)
    }

    /// Start the relay fiber on `service`, whose events arrive on `events`.
    ///
    /// The relay actor is hosted at `RELAY_INSTANCE_ID`; the returned outer
    /// sender is the one the relay routes through.
    pub fn start_relay(
        &self,
        service: Arc<dyn Service>,
        events: EventReceiver,
        directory: ProcessDirectory,
    ) -> Result<Arc<ProcessOuterSender>, ActorError> {
        let fiber = self.config.relay_fiber;
        let address = Address::new(self.process, fiber);
        let mailbox = self
            .queue
            .register(fiber)
            .ok_or(ActorError::FiberExists { address })?;

        let ctx = FiberContext::new(address, self.queue.clone(), &self.config);
        let outer = Arc::new(ProcessOuterSender::new(
            ctx.sender().clone(),
            service,
            directory,
            &self.config,
        ));
        ctx.add_actor(RELAY_INSTANCE_ID, Arc::new(RelayHandler::new(Arc::clone(&outer))));

        let link = RelayLink {
            outer: Arc::clone(&outer),
            events,
        };
        let task = tokio::spawn(run_fiber(ctx.clone(), mailbox, Some(link)));
        self.fibers.lock().insert(fiber, FiberHandle { ctx, task });
        *self.relay.lock() = Some(Arc::clone(&outer));

        info!(process = self.process, fiber, "Relay started");
        Ok(outer)
    }

    pub fn fiber(&self, fiber: i32) -> Option<FiberContext> {
        self.fibers.lock().get(&fiber).map(|handle| handle.ctx.clone())
    }

    pub fn fibers(&self) -> Vec<i32> {
        self.queue.fibers()
    }

    pub fn relay(&self) -> Option<Arc<ProcessOuterSender>> {
        self.relay.lock().clone()
    }

    /// Stop a fiber. Frames still queued for it and calls its handlers were
    /// awaiting are dropped.
    pub async fn stop_fiber(&self, fiber: i32) -> bool {
        debug!(process = self.process, fiber, "Stopping fiber");
        self.queue.unregister(fiber);
        if fiber == self.config.relay_fiber {
            self.relay.lock().take();
        }

        let handle = self.fibers.lock().remove(&fiber);
        let Some(handle) = handle else {
            warn!(process = self.process, fiber, "Attempted to stop unknown fiber");
            return false;
        };

        handle.task.abort();
        match handle.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => debug!(fiber, "Fiber task cancelled"),
            Err(e) => warn!(fiber, error = %e, "Fiber task ended with error"),
        }
        info!(process = self.process, fiber, "Fiber stopped and cleaned up");
        true
    }

    /// Stop every fiber, relay included
    pub async fn shutdown(&self) {
        info!(process = self.process, "Shutting down actor system");
        let fibers: Vec<i32> = self.fibers.lock().keys().copied().collect();
        for fiber in fibers {
            self.stop_fiber(fiber).await;
        }
        info!(process = self.process, "Actor system shutdown complete");
    }
}

impl Drop for ActorSystem {
    fn drop(&mut self) {
        for (_, handle) in self.fibers.get_mut().drain() {
            handle.task.abort();
        }
    }
}
