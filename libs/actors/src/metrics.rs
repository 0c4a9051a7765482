//! Sender metrics.
//!
//! Lock-free counters shared by a fiber's [`MessageSender`](crate::MessageSender),
//! its correlation table and, in the relay fiber, the
//! [`ProcessOuterSender`](crate::ProcessOuterSender).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct SenderMetrics {
    /// Frames handed to the local dispatch queue
    pub local_sends: AtomicU64,
    /// Frames written to a session
    pub session_sends: AtomicU64,
    /// Frames wrapped in a relay envelope
    pub relay_sends: AtomicU64,
    /// Calls registered in the correlation table
    pub calls: AtomicU64,
    /// Responses matched to a pending call
    pub responses: AtomicU64,
    pub timeouts: AtomicU64,
    /// Responses that arrived after their call was resolved
    pub late_responses: AtomicU64,
    /// Session failures and pending calls failed because of them
    pub transport_failures: AtomicU64,
}

impl SenderMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_local_send(&self) {
        self.local_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_send(&self) {
        self.session_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_relay_send(&self) {
        self.relay_sends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self) {
        self.responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_response(&self) {
        self.late_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> SenderStats {
        SenderStats {
            local_sends: self.local_sends.load(Ordering::Relaxed),
            session_sends: self.session_sends.load(Ordering::Relaxed),
            relay_sends: self.relay_sends.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            responses: self.responses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            late_responses: self.late_responses.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
        }
    }
}

/// Sender statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub local_sends: u64,
    pub session_sends: u64,
    pub relay_sends: u64,
    pub calls: u64,
    pub responses: u64,
    pub timeouts: u64,
    pub late_responses: u64,
    pub transport_failures: u64,
}
