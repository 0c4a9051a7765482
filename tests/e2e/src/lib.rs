//! End-to-End Test Framework for the fiber mesh
//!
//! Runs several mesh processes inside one test binary. Each process gets its
//! own [`ActorSystem`](mesh_actors::ActorSystem), relay fiber and service, so
//! frames between them cross a real session exactly as they would between
//! separate binaries.
//!
//! - [`fixtures`]: process builders over the in-memory network or TCP loopback
//! - [`actors`]: small actor behaviours the scenarios compose

pub mod fixtures;

pub use actors::*;
pub use fixtures::{memory_endpoint, start_tcp_mesh, MemoryMesh, MeshProcess};

use tracing_subscriber::EnvFilter;

/// Route tracing output through the test harness. `RUST_LOG` overrides the
/// default `warn` filter. Safe to call from every test.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
