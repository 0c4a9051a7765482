//! Relay actor: the inner-network hop.
//!
//! Hosted at [`RELAY_INSTANCE_ID`](mesh_types::RELAY_INSTANCE_ID) in the relay
//! fiber. Fibers hand it envelopes; it routes the payload through the
//! [`ProcessOuterSender`] and tunnels the outcome back. Its own call runs
//! with `need_exception = false`, so every failure at this level becomes an
//! error-carrying envelope response and the caller's classification applies
//! unchanged.

use crate::fiber::{ActorHandler, FiberContext};
use crate::outer::ProcessOuterSender;
use async_trait::async_trait;
use mesh_types::{error_code, ActorId, Message, RelayMessage, RelayRequest, RelayResponse, Request, Response};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RelayHandler {
    outer: Arc<ProcessOuterSender>,
}

impl RelayHandler {
    pub fn new(outer: Arc<ProcessOuterSender>) -> Self {
        Self { outer }
    }

    async fn relay_call(&self, request: RelayRequest) -> Response {
        let RelayRequest { target, request } = request;
        let opcode = request.opcode;
        match self.outer.call(target, request, false) {
            Ok(pending) => {
                let rpc_id = pending.rpc_id();
                match pending.await {
                    Ok(response) => response,
                    Err(e) => e.into_response(rpc_id),
                }
            }
            Err(e) => {
                debug!(target = %target, opcode, error = %e, "Relay could not route request");
                Response::error(0, e.code(), e.to_string())
            }
        }
    }
}

#[async_trait]
impl ActorHandler for RelayHandler {
    async fn on_message(&self, _ctx: &FiberContext, from: ActorId, envelope: Message) {
        let relayed = match RelayMessage::unwrap(&envelope) {
            Ok(relayed) => relayed,
            Err(e) => {
                warn!(from = %from, error = %e, "Malformed relay message");
                return;
            }
        };
        if let Err(e) = self.outer.send(relayed.target, relayed.message) {
            warn!(from = %from, target = %relayed.target, error = %e, "Relay dropped message");
        }
    }

    async fn on_request(&self, _ctx: &FiberContext, from: ActorId, envelope: Request) -> Response {
        let relayed = match RelayRequest::unwrap(&envelope) {
            Ok(relayed) => relayed,
            Err(e) => {
                warn!(from = %from, error = %e, "Malformed relay request");
                return envelope.reply_error(error_code::ERR_RELAY_ENVELOPE, e.to_string());
            }
        };

        let response = self.relay_call(relayed).await;
        match RelayResponse::wrap(envelope.rpc_id, response) {
            Ok(wrapped) => wrapped,
            Err(e) => envelope.reply_error(error_code::ERR_RELAY_ENVELOPE, e.to_string()),
        }
    }
}
