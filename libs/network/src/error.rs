//! Transport Error Types
//!
//! Errors raised by services and sessions. Each one maps onto the numeric
//! code reported through [`ServiceEvent::Error`](crate::ServiceEvent) so the
//! sender layer only ever sees `(channel_id, error_code)`.

use crate::service::ChannelId;
use mesh_types::error_code;
use std::net::SocketAddr;
use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Framing and serialization errors
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Frame exceeds the configured maximum
    #[error("Frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// No channel registered under this id
    #[error("Channel {channel_id} not found")]
    ChannelNotFound { channel_id: ChannelId },

    /// Transport timeout errors
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            source: None,
        }
    }

    /// Create a protocol error with source
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn frame_too_large(size: usize, max: usize) -> Self {
        Self::FrameTooLarge { size, max }
    }

    pub fn channel_not_found(channel_id: ChannelId) -> Self {
        Self::ChannelNotFound { channel_id }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::Io { .. } => true,
            TransportError::Protocol { .. } => false,
            TransportError::FrameTooLarge { .. } => false,
            TransportError::ChannelNotFound { .. } => false,
            TransportError::Configuration { .. } => false,
        }
    }

    /// True when the channel itself is broken. Per-frame rejections such as
    /// an oversized or unserializable frame leave the channel usable.
    pub fn is_channel_failure(&self) -> bool {
        match self {
            TransportError::Network { .. }
            | TransportError::Connection { .. }
            | TransportError::ChannelNotFound { .. }
            | TransportError::Timeout { .. }
            | TransportError::Io { .. } => true,
            TransportError::Protocol { .. }
            | TransportError::FrameTooLarge { .. }
            | TransportError::Configuration { .. } => false,
        }
    }

    /// Get error category for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            TransportError::Network { .. } => "network",
            TransportError::Connection { .. } => "connection",
            TransportError::Protocol { .. } => "protocol",
            TransportError::FrameTooLarge { .. } => "frame_too_large",
            TransportError::ChannelNotFound { .. } => "channel_not_found",
            TransportError::Timeout { .. } => "timeout",
            TransportError::Configuration { .. } => "configuration",
            TransportError::Io { .. } => "io",
        }
    }

    /// Code reported to the session owner when this error tears a channel down
    pub fn error_code(&self) -> i32 {
        match self {
            TransportError::Connection { .. } | TransportError::Timeout { .. } => {
                error_code::ERR_PEER_UNREACHABLE
            }
            TransportError::FrameTooLarge { .. } => error_code::ERR_FRAME_TOO_LARGE,
            _ => error_code::ERR_SESSION_DISCONNECTED,
        }
    }
}

/// Convert standard I/O errors to transport errors
impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

impl From<bincode::Error> for TransportError {
    fn from(error: bincode::Error) -> Self {
        TransportError::protocol_with_source("Frame serialization failed", error)
    }
}
