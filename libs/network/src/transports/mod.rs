//! Service implementations.
//!
//! - [`tcp`]: one TCP connection per channel, for processes on different hosts
//! - [`mem`]: an in-process hub, for tests and single-binary deployments

pub mod mem;
pub mod tcp;

pub use mem::{MemoryNetwork, MemoryService};
pub use tcp::{TcpService, TcpServiceConfig};
