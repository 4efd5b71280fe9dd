//! TCP implementation of the broker connection
//!
//! Handles all socket I/O: connecting with a timeout, writing flushed
//! command lines, and reading `\n`-delimited replies.

use super::{BrokerAddress, Connection, Connector, TransportError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens TCP connections to a single broker address
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: BrokerAddress,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(address: BrokerAddress, connect_timeout: Duration) -> Self {
        Self {
            address,
            connect_timeout,
        }
    }

    pub fn broker_address(&self) -> &BrokerAddress {
        &self.address
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Connection = TcpConnection;

    async fn connect(&self) -> Result<TcpConnection, TransportError> {
        let target = (self.address.host.as_str(), self.address.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(target))
            .await
            .map_err(|_| TransportError::ConnectTimeout(self.connect_timeout))?
            .map_err(TransportError::Connect)?;

        // Commands are tiny and latency-bound
        if let Err(e) = stream.set_nodelay(true) {
            debug!(addr = %self.address, "Failed to set TCP_NODELAY: {}", e);
        }

        debug!(addr = %self.address, "TCP connection established");
        Ok(TcpConnection {
            stream: Some(BufReader::new(stream)),
        })
    }

    fn address(&self) -> String {
        self.address.to_string()
    }
}

/// Buffered TCP stream speaking the line protocol
#[derive(Debug)]
pub struct TcpConnection {
    stream: Option<BufReader<TcpStream>>,
}

impl TcpConnection {
    fn stream(&mut self) -> Result<&mut BufReader<TcpStream>, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        let stream = self.stream()?.get_mut();
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        let stream = self.stream()?;
        let mut buf = String::new();
        let read = stream.read_line(&mut buf).await?;
        if read == 0 {
            return Ok(None);
        }

        let line = buf.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(line.to_string()))
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.get_mut().shutdown().await {
                debug!("Error shutting down TCP stream: {}", e);
            }
        }
    }
}
