//! # RPC Correlation
//!
//! Every `call` registers a [`PendingCall`] under a fresh rpc id and gets back
//! a [`PendingResponse`] to await. The call is then resolved by exactly one
//! of three paths:
//!
//! ```text
//!                      ┌─▶ complete(response) ── matching Response arrived
//!  register ─▶ pending ┼─▶ expire(rpc_id)     ── watchdog slept rpc_timeout
//!                      └─▶ fail_channel(..)   ── session carrying it failed
//! ```
//!
//! Removal from the table is the only way to obtain the completion handle,
//! so whichever path removes the entry first wins and the others find
//! nothing. A response arriving after that is logged and dropped.
//!
//! ## Watchdog
//!
//! Each call spawns one task that sleeps for the configured timeout and then
//! expires the call if it is still present. The task holds only a `Weak`
//! reference to the table; completing the call aborts it.
//!
//! ## Classification
//!
//! | Response | `need_exception` | Caller sees |
//! |----------|------------------|-------------|
//! | `ERR_ACTOR_TIMEOUT` | any | `Err(RpcError::Timeout)` |
//! | must-throw code | `true` | `Err(RpcError::…)` |
//! | anything else | any | `Ok(response)` |
//! | watchdog fired | `true` | `Err(RpcError::Timeout)` |
//! | watchdog fired | `false` | `Ok(Response { error: ERR_ACTOR_TIMEOUT })` |

use crate::error::RpcError;
use crate::metrics::SenderMetrics;
use mesh_network::ChannelId;
use mesh_types::{error_code, ActorId, RelayResponse, Request, Response};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

type Completion = oneshot::Sender<Result<Response, RpcError>>;

/// How a pending call's request left this fiber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRoute {
    /// Through the local dispatch queue
    Local,
    /// Wrapped in a relay envelope; the response must be unwrapped
    Relayed,
    /// Through a session channel owned by the outer sender
    Session(ChannelId),
}

/// Bookkeeping for one outstanding call
pub struct PendingCall {
    target: ActorId,
    /// Request as issued, with its rpc id
    request: Request,
    completion: Completion,
    need_exception: bool,
    route: CallRoute,
    watchdog: Option<AbortHandle>,
}

impl PendingCall {
    fn rpc_id(&self) -> u32 {
        self.request.rpc_id
    }

    fn stop_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.abort();
        }
    }

    fn settle(self, outcome: Result<Response, RpcError>) {
        if self.completion.send(outcome).is_err() {
            trace!(rpc_id = self.request.rpc_id, "Caller no longer waiting");
        }
    }

    fn classify(&self, response: Response) -> Result<Response, RpcError> {
        if response.error == error_code::ERR_ACTOR_TIMEOUT
            || (self.need_exception && error_code::is_rpc_need_throw(response.error))
        {
            return Err(RpcError::from_response(self.target, self.request.opcode, response));
        }
        Ok(response)
    }
}

struct TableState {
    next_rpc_id: u32,
    pending: HashMap<u32, PendingCall>,
}

impl TableState {
    fn allocate_rpc_id(&mut self) -> u32 {
        loop {
            let rpc_id = self.next_rpc_id;
            self.next_rpc_id = self.next_rpc_id.wrapping_add(1);
            if self.next_rpc_id == 0 {
                self.next_rpc_id = 1;
            }
            if rpc_id != 0 && !self.pending.contains_key(&rpc_id) {
                return rpc_id;
            }
        }
    }
}

/// Outstanding calls of one sender, keyed by rpc id
pub struct CorrelationTable {
    state: Mutex<TableState>,
    timeout: Duration,
    metrics: Arc<SenderMetrics>,
}

impl CorrelationTable {
    pub fn new(timeout: Duration, metrics: Arc<SenderMetrics>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TableState {
                next_rpc_id: 1,
                pending: HashMap::new(),
            }),
            timeout,
            metrics,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn metrics(&self) -> &Arc<SenderMetrics> {
        &self.metrics
    }

    /// Register a call and start its watchdog.
    ///
    /// Returns `request` stamped with the assigned rpc id, ready to be routed,
    /// and the handle the caller awaits. Must run inside a tokio runtime.
    pub fn register(
        self: &Arc<Self>,
        target: ActorId,
        mut request: Request,
        need_exception: bool,
        route: CallRoute,
    ) -> (Request, PendingResponse) {
        let (completion, receiver) = oneshot::channel();
        let mut state = self.state.lock();
        let rpc_id = state.allocate_rpc_id();
        request.rpc_id = rpc_id;

        let watchdog = {
            let table = Arc::downgrade(self);
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                expire_if_alive(table, rpc_id);
            })
            .abort_handle()
        };

        state.pending.insert(
            rpc_id,
            PendingCall {
                target,
                request: request.clone(),
                completion,
                need_exception,
                route,
                watchdog: Some(watchdog),
            },
        );
        drop(state);

        self.metrics.record_call();
        debug!(rpc_id, target = %target, opcode = request.opcode, route = ?route, "Call registered");
        (request, PendingResponse::new(target, rpc_id, receiver))
    }

    /// Resolve the call matching `response.rpc_id`. Returns `false` for a late
    /// or unknown response, which is dropped.
    pub fn complete(&self, response: Response) -> bool {
        let rpc_id = response.rpc_id;
        let removed = self.state.lock().pending.remove(&rpc_id);
        let Some(mut call) = removed else {
            self.metrics.record_late_response();
            debug!(rpc_id, error = response.error, "Dropping response with no pending call");
            return false;
        };
        call.stop_watchdog();
        self.metrics.record_response();

        let response = match call.route {
            CallRoute::Relayed => unwrap_relayed(rpc_id, response),
            CallRoute::Local | CallRoute::Session(_) => response,
        };
        trace!(rpc_id, error = response.error, "Call completed");
        let outcome = call.classify(response);
        call.settle(outcome);
        true
    }

    /// Resolve the call as timed out, if it is still pending
    pub fn expire(&self, rpc_id: u32) -> bool {
        let removed = self.state.lock().pending.remove(&rpc_id);
        let Some(call) = removed else {
            return false;
        };
        self.metrics.record_timeout();
        warn!(
            rpc_id,
            target = %call.target,
            opcode = call.request.opcode,
            timeout_ms = self.timeout.as_millis() as u64,
            "Call timed out"
        );

        let outcome = if call.need_exception {
            Err(RpcError::Timeout {
                target: call.target,
                opcode: call.request.opcode,
                rpc_id,
            })
        } else {
            Ok(Response::error(
                rpc_id,
                error_code::ERR_ACTOR_TIMEOUT,
                format!("RPC to {} timed out", call.target),
            ))
        };
        call.settle(outcome);
        true
    }

    /// Resolve every call routed through `channel_id` with the session's
    /// error code. Returns how many calls were failed.
    pub fn fail_channel(&self, channel_id: ChannelId, error: i32) -> usize {
        let failed: Vec<PendingCall> = {
            let mut state = self.state.lock();
            let rpc_ids: Vec<u32> = state
                .pending
                .iter()
                .filter(|(_, call)| call.route == CallRoute::Session(channel_id))
                .map(|(rpc_id, _)| *rpc_id)
                .collect();
            rpc_ids
                .into_iter()
                .filter_map(|rpc_id| state.pending.remove(&rpc_id))
                .collect()
        };

        let count = failed.len();
        for mut call in failed {
            call.stop_watchdog();
            self.metrics.record_transport_failure();
            let rpc_id = call.rpc_id();
            debug!(rpc_id, channel_id, error, "Failing call on session error");

            let outcome = if call.need_exception {
                Err(RpcError::Transport {
                    target: call.target,
                    rpc_id,
                    error,
                })
            } else {
                Ok(Response::error(
                    rpc_id,
                    error,
                    format!("Session to {} failed", call.target),
                ))
            };
            call.settle(outcome);
        }
        count
    }

    /// Forget a call whose request could not be routed; the caller is told
    /// synchronously and never awaits it
    pub fn cancel(&self, rpc_id: u32) -> bool {
        let removed = self.state.lock().pending.remove(&rpc_id);
        match removed {
            Some(mut call) => {
                call.stop_watchdog();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, rpc_id: u32) -> bool {
        self.state.lock().pending.contains_key(&rpc_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for CorrelationTable {
    fn drop(&mut self) {
        for call in self.state.get_mut().pending.values_mut() {
            call.stop_watchdog();
        }
    }
}

fn expire_if_alive(table: Weak<CorrelationTable>, rpc_id: u32) {
    if let Some(table) = table.upgrade() {
        table.expire(rpc_id);
    }
}

/// Tunnelled response with the caller's rpc id restored
fn unwrap_relayed(rpc_id: u32, envelope: Response) -> Response {
    match RelayResponse::unwrap(envelope) {
        Ok(mut response) => {
            response.rpc_id = rpc_id;
            response
        }
        Err(e) => {
            warn!(rpc_id, error = %e, "Malformed relay response");
            Response::error(rpc_id, error_code::ERR_RELAY_ENVELOPE, e.to_string())
        }
    }
}

/// Handle to the eventual outcome of a call
#[derive(Debug)]
#[must_use = "a call is only observed by awaiting its PendingResponse"]
pub struct PendingResponse {
    target: ActorId,
    rpc_id: u32,
    receiver: oneshot::Receiver<Result<Response, RpcError>>,
}

impl PendingResponse {
    fn new(target: ActorId, rpc_id: u32, receiver: oneshot::Receiver<Result<Response, RpcError>>) -> Self {
        Self {
            target,
            rpc_id,
            receiver,
        }
    }

    pub fn rpc_id(&self) -> u32 {
        self.rpc_id
    }

    pub fn target(&self) -> ActorId {
        self.target
    }
}

impl Future for PendingResponse {
    type Output = Result<Response, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let (target, rpc_id) = (self.target, self.rpc_id);
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or(Err(RpcError::Cancelled { target, rpc_id }))
        })
    }
}
