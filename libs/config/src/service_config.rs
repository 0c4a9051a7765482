//! Mesh Configuration Module
//!
//! Loads the configuration of one mesh process from a TOML file with
//! `MESH_`-prefixed environment overrides.

use crate::logging::LoggingConfig;
use crate::process::ProcessEntry;
use crate::service::{self, ENV_PREFIX};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Configuration of a single mesh process
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MeshConfig {
    /// Id of this process in the mesh
    pub process_id: i32,

    /// Sender and session behaviour
    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Every process reachable over the inner network, this one included
    #[serde(default)]
    pub processes: Vec<ProcessEntry>,
}

/// Sender component and session settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct MessagingConfig {
    /// Deadline for a `call` before it resolves as timed out
    pub rpc_timeout_ms: u64,

    /// Fiber id hosting the relay in every process
    pub relay_fiber: i32,

    /// Resolve calls routed through a session as soon as that session errors,
    /// instead of waiting for their timeout
    pub fail_pending_on_session_error: bool,

    /// Largest frame a session accepts or sends
    pub max_frame_size: usize,

    /// Outbound connect deadline
    pub connect_timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: service::messaging::RPC_TIMEOUT_MS,
            relay_fiber: service::messaging::RELAY_FIBER,
            fail_pending_on_session_error: service::messaging::FAIL_PENDING_ON_SESSION_ERROR,
            max_frame_size: service::session::MAX_FRAME_SIZE,
            connect_timeout_ms: service::session::CONNECT_TIMEOUT_MS,
        }
    }
}

impl MessagingConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Same settings with a different RPC timeout
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout_ms == 0 {
            bail!("messaging.rpc_timeout_ms must be greater than zero");
        }
        if self.relay_fiber <= 0 {
            bail!("messaging.relay_fiber must be positive, got {}", self.relay_fiber);
        }
        if self.max_frame_size < 64 {
            bail!("messaging.max_frame_size {} is too small", self.max_frame_size);
        }
        Ok(())
    }
}

impl MeshConfig {
    /// Load configuration from a file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading mesh config: {:?}", path);
        let builder = Config::builder().add_source(File::from(path).required(true));
        Self::finish(builder)
    }

    /// Parse configuration from TOML text with environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(text, FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(
        builder: config_crate::ConfigBuilder<config_crate::builder::DefaultState>,
    ) -> Result<Self> {
        // Override with environment variables (MESH_ prefix)
        let builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: MeshConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        debug!(
            process_id = config.process_id,
            processes = config.processes.len(),
            "Mesh config loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.process_id <= 0 {
            bail!("process_id must be positive, got {}", self.process_id);
        }
        self.messaging.validate()
    }

    /// Entry describing this process, if listed
    pub fn own_entry(&self) -> Option<&ProcessEntry> {
        self.processes.iter().find(|p| p.id == self.process_id)
    }
}

/// Convenience function to load configuration from `path`, defaulting to
/// `config/mesh.toml`
pub fn load_config(path: Option<&Path>) -> Result<MeshConfig> {
    MeshConfig::load(path.unwrap_or(Path::new("config/mesh.toml")))
}
