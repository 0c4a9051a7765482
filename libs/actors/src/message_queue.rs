//! Local Dispatch Queue
//!
//! Per-process map from fiber id to that fiber's mailbox. Enqueueing never
//! blocks and never serializes: the frame moves into an unbounded channel and
//! the receiving fiber picks it up on its own turn.
//!
//! Ordering is FIFO per mailbox, so two frames sent by one fiber to the same
//! destination arrive in order. Nothing is promised across senders.
//!
//! The queue is an explicit value handed to every fiber of the process, not a
//! global; two [`ActorSystem`](crate::ActorSystem)s in one binary (as in the
//! end-to-end tests) never see each other's mailboxes.

use mesh_types::{ActorId, Address, MessageObject};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// One frame waiting in a fiber mailbox
#[derive(Debug, Clone, PartialEq)]
pub struct MailboxFrame {
    pub from: ActorId,
    pub to: ActorId,
    pub message: MessageObject,
}

pub type MailboxReceiver = mpsc::UnboundedReceiver<MailboxFrame>;
type MailboxSender = mpsc::UnboundedSender<MailboxFrame>;

#[derive(Clone)]
pub struct MessageQueue {
    process: i32,
    mailboxes: Arc<RwLock<HashMap<i32, MailboxSender>>>,
}

impl MessageQueue {
    pub fn new(process: i32) -> Self {
        Self {
            process,
            mailboxes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn process(&self) -> i32 {
        self.process
    }

    /// Create the mailbox of `fiber`. `None` if one is already registered.
    pub fn register(&self, fiber: i32) -> Option<MailboxReceiver> {
        let mut mailboxes = self.mailboxes.write();
        if mailboxes.contains_key(&fiber) {
            return None;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        mailboxes.insert(fiber, tx);
        Some(rx)
    }

    /// Drop the mailbox of `fiber`; its receiver drains and then closes
    pub fn unregister(&self, fiber: i32) -> bool {
        self.mailboxes.write().remove(&fiber).is_some()
    }

    pub fn contains(&self, address: Address) -> bool {
        address.process == self.process && self.mailboxes.read().contains_key(&address.fiber)
    }

    pub fn fibers(&self) -> Vec<i32> {
        let mut fibers: Vec<i32> = self.mailboxes.read().keys().copied().collect();
        fibers.sort_unstable();
        fibers
    }

    /// Enqueue `message` for `to`. Returns `false` when no mailbox exists for
    /// the destination fiber in this process.
    pub fn send(&self, from: ActorId, to: ActorId, message: MessageObject) -> bool {
        if to.process != self.process {
            return false;
        }

        let mailboxes = self.mailboxes.read();
        let Some(mailbox) = mailboxes.get(&to.fiber) else {
            trace!(to = %to, "No mailbox for destination");
            return false;
        };
        trace!(from = %from, to = %to, kind = %message.kind(), "Enqueued local frame");
        mailbox.send(MailboxFrame { from, to, message }).is_ok()
    }
}
