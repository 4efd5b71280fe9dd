//! Transport layer for broker communication
//!
//! This module provides the line-oriented connection abstraction used by the
//! producer and by every consumer listener, plus the TCP implementation.
//! Listeners and the producer are generic over [`Connector`] so tests can
//! swap in scripted connections.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod tcp;

pub use tcp::{TcpConnection, TcpConnector};

/// Host and port of a MiniMQ broker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("connection already closed")]
    Closed,
}

/// One open byte-stream connection to the broker, spoken line by line
///
/// A connection is never reused after an error or after `read_line` reports
/// a disconnect; the owner closes it and asks its [`Connector`] for a new one.
#[async_trait]
pub trait Connection: Send {
    /// Write `line` (which must already carry its `\n`) and flush it
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Read the next line with its terminator stripped.
    ///
    /// Returns `Ok(None)` on end-of-stream or on a blank line; both mean the
    /// broker dropped the connection.
    async fn read_line(&mut self) -> Result<Option<String>, TransportError>;

    /// Close the connection. Never fails; closing twice is a no-op.
    async fn close(&mut self);
}

/// Factory for fresh [`Connection`]s to one broker
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Connection + 'static;

    /// Open a new connection
    async fn connect(&self) -> Result<Self::Connection, TransportError>;

    /// Broker address used in logs and errors
    fn address(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_address_display() {
        assert_eq!(BrokerAddress::new("localhost", 5677).to_string(), "localhost:5677");
        assert_eq!(BrokerAddress::new("10.0.0.1", 1).to_string(), "10.0.0.1:1");
    }

    #[test]
    fn test_transport_error_display() {
        let errors = vec![
            TransportError::Connect(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )),
            TransportError::ConnectTimeout(Duration::from_millis(5)),
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe")),
            TransportError::Closed,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
