//! Default values shared by the messaging components.

/// Sender component defaults
pub mod messaging {
    /// RPC timeout (milliseconds)
    pub const RPC_TIMEOUT_MS: u64 = 10_000;

    /// Fiber id of the relay fiber in every process
    pub const RELAY_FIBER: i32 = 1;

    /// Fail calls routed through a session as soon as it errors
    pub const FAIL_PENDING_ON_SESSION_ERROR: bool = true;
}

/// Session and transport defaults
pub mod session {
    /// Maximum encoded frame size
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

    /// Outbound connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Read buffer for TCP sessions
    pub const READ_BUFFER_SIZE: usize = 64 * 1024; // 64KB

    /// First pause after a failed accept, doubled on each further failure
    pub const ACCEPT_BACKOFF_MIN_MS: u64 = 10;
    pub const ACCEPT_BACKOFF_MAX_MS: u64 = 1_000;
}

/// Environment variable prefix for overrides (`MESH_MESSAGING__RPC_TIMEOUT_MS=...`)
pub const ENV_PREFIX: &str = "MESH";
