//! # Mesh Configuration
//!
//! Configuration management for processes joining the fiber mesh.
//!
//! ## Features
//!
//! - **Messaging settings**: RPC timeout, relay fiber id, session failure policy
//! - **Process directory**: process id to inner-network endpoint mapping used
//!   when a session to another process is created lazily
//! - **Logging**: tracing subscriber setup shared by every binary and test
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mesh_config::{load_config, ProcessDirectory};
//!
//! let config = load_config(Some("config/mesh.toml".as_ref())).unwrap();
//! let directory = ProcessDirectory::from_entries(&config.processes).unwrap();
//! mesh_config::logging::init_tracing(&config.logging).unwrap();
//! ```

pub mod logging;
pub mod process;
pub mod service;
pub mod service_config;

pub use logging::LoggingConfig;
pub use process::{DirectoryError, ProcessDirectory, ProcessEntry};
pub use service_config::{load_config, MeshConfig, MessagingConfig};
