//! MiniMQ producer
//!
//! Every [`Producer::send`] opens a fresh connection, writes one `PRODUCE`
//! line and closes it again. There is no pooling and no retry; a failure is
//! returned to the caller as a [`MiniMqError`] naming the broker address.

use crate::config::ClientConfig;
use crate::error::{MiniMqError, MiniMqResult};
use crate::producer_span;
use crate::protocol::{encode_publish, validate_topic};
use crate::transport::{Connection, Connector, TcpConnector};
use serde::Serialize;
use tracing::{debug, Instrument};

/// Publishes JSON messages to topics
#[derive(Debug, Clone)]
pub struct Producer<C: Connector = TcpConnector> {
    connector: C,
}

impl Producer<TcpConnector> {
    /// Producer for the broker named in `config`
    pub fn new(config: &ClientConfig) -> MiniMqResult<Self> {
        let address = config.broker.address()?;
        Ok(Self::with_connector(TcpConnector::new(
            address,
            config.broker.connect_timeout(),
        )))
    }
}

impl<C: Connector> Producer<C> {
    pub fn with_connector(connector: C) -> Self {
        Self { connector }
    }

    /// Address of the broker this producer publishes to
    pub fn address(&self) -> String {
        self.connector.address()
    }

    /// Serialize `message` and publish it on `topic`.
    ///
    /// Serialization happens before any connection is opened, so an
    /// unserializable message never touches the network.
    pub async fn send<T>(&self, topic: &str, message: &T) -> MiniMqResult<()>
    where
        T: Serialize + ?Sized,
    {
        validate_topic(topic)?;
        let line = encode_publish(topic, message)?;

        self.publish_line(&line)
            .instrument(producer_span!(topic = %topic))
            .await
    }

    async fn publish_line(&self, line: &str) -> MiniMqResult<()> {
        let addr = self.connector.address();

        let mut connection = self
            .connector
            .connect()
            .await
            .map_err(|e| MiniMqError::connect(&addr, e))?;

        let written = connection.write_line(line).await;
        connection.close().await;
        written.map_err(|e| MiniMqError::io(&addr, e))?;

        debug!(addr = %addr, bytes = line.len(), "Message published");
        Ok(())
    }
}
