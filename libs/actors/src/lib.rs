//! # Mesh Actors
//!
//! Actor-addressed messaging for the fiber mesh: fibers hosting actors, the
//! per-process dispatch queue, RPC correlation with timeouts, and the relay
//! that carries frames between processes.
//!
//! ## Architecture
//!
//! ```text
//!  process 1                                         process 2
//!  ┌───────────────────────────────┐                 ┌───────────────────────────────┐
//!  │ fiber 3 ─MessageSender─┐      │                 │      ┌──▶ fiber 2 (actors)     │
//!  │                        ▼      │   Session /     │      │                        │
//!  │            MessageQueue       │   Service       │  MessageQueue                  │
//!  │                        │      │                 │      ▲                        │
//!  │ relay fiber ◀──────────┘      │                 │      │                        │
//!  │   RelayHandler ─▶ ProcessOuterSender ══════════▶ ProcessOuterSender (relay fiber) │
//!  └───────────────────────────────┘                 └───────────────────────────────┘
//! ```
//!
//! - Same-process frames never leave the [`MessageQueue`].
//! - Cross-process frames are wrapped by the caller's [`MessageSender`],
//!   routed by the relay fiber's [`ProcessOuterSender`] over a session, and
//!   answered back through the same hops.
//!
//! ## Errors
//!
//! Routing failures are returned synchronously as [`ActorError`]; RPC
//! outcomes (timeout, not found, application errors) resolve the
//! [`PendingResponse`] as [`RpcError`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use mesh_actors::{ActorHandler, ActorSystem, FiberContext};
//! use mesh_config::MessagingConfig;
//! use mesh_types::{ActorId, Request, Response};
//! use std::sync::Arc;
//!
//! struct Ping;
//!
//! #[async_trait::async_trait]
//! impl ActorHandler for Ping {
//!     async fn on_request(&self, _ctx: &FiberContext, _from: ActorId, request: Request) -> Response {
//!         request.reply(2, bytes::Bytes::from_static(b"pong"))
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let system = ActorSystem::new(1, MessagingConfig::default());
//! let server = system.spawn_fiber(2)?;
//! let client = system.spawn_fiber(3)?;
//! let ping = server.add_actor(10, Arc::new(Ping));
//!
//! let response = client.call(ping, Request::new(1, bytes::Bytes::new()))?.await?;
//! assert_eq!(response.opcode, 2);
//! # Ok(())
//! # }
//! ```

pub mod correlation;
pub mod error;
pub mod fiber;
pub mod message_queue;
pub mod metrics;
pub mod outer;
pub mod relay;
pub mod sender;
pub mod system;

pub use correlation::{CallRoute, CorrelationTable, PendingResponse};
pub use error::{ActorError, RpcError};
pub use fiber::{ActorHandler, FiberContext};
pub use message_queue::{MailboxFrame, MailboxReceiver, MessageQueue};
pub use metrics::{SenderMetrics, SenderStats};
pub use outer::ProcessOuterSender;
pub use relay::RelayHandler;
pub use sender::MessageSender;
pub use system::ActorSystem;
