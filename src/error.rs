//! Public error type for MiniMQ client operations
//!
//! Producer calls surface every failure as a [`MiniMqError`]. The consumer
//! uses the same taxonomy internally to decide between skipping a message,
//! reconnecting, and logging, but never lets an error end a listener.

use crate::config::ConfigError;
use crate::consumer::HandlerError;
use crate::protocol::ValidationError;
use crate::transport::TransportError;
use thiserror::Error;

/// Main error type for MiniMQ client operations
#[derive(Debug, Error)]
pub enum MiniMqError {
    #[error("Message is not JSON serializable: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Message payload is not valid JSON: {0}")]
    Deserialization(#[source] serde_json::Error),

    #[error("Failed to connect to broker at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: TransportError,
    },

    #[error("I/O error talking to broker at {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: TransportError,
    },

    #[error("Malformed broker response: {0:?}")]
    MalformedResponse(String),

    /// Never raised by the consumer, which logs handler failures and skips
    /// the `ACK`. Lets code that calls handler logic directly (outside a
    /// poll loop) use `?` on a [`HandlerError`] inside a `MiniMqResult`.
    #[error("Handler failed: {0}")]
    Handler(#[from] HandlerError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] ValidationError),

    #[error("Consumer already started; listeners must be registered before start")]
    AlreadyStarted,
}

impl MiniMqError {
    /// Wrap a transport failure raised while opening a connection
    pub fn connect(addr: impl Into<String>, source: TransportError) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }

    /// Wrap a transport failure raised on an open connection
    pub fn io(addr: impl Into<String>, source: TransportError) -> Self {
        Self::Io {
            addr: addr.into(),
            source,
        }
    }

    /// Whether the error leaves the current connection unusable
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, MiniMqError::Connect { .. } | MiniMqError::Io { .. })
    }
}

/// Result type for MiniMQ operations
pub type MiniMqResult<T> = Result<T, MiniMqError>;
