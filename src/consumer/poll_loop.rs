//! Per-topic poll loop
//!
//! Each registered listener runs one [`TopicPollLoop`] in its own task. The
//! loop owns a single broker connection at a time and drives it through
//! `CONSUME` → reply → handler → `ACK`, replacing the connection whenever it
//! fails. The only way out is the shared running flag turning false.
//!
//! ```text
//!   Disconnected ──connect ok──▶ Connected ──▶ Polling ⇄ Processing
//!        ▲                                        │
//!        └──────── EOF / I/O error ───────────────┘
//!   (any state) ──running=false──▶ Stopped
//! ```

use super::handler::{invoke_handler, Handler, MessageContext};
use crate::config::ConsumerSection;
use crate::observability::ConsumerMetrics;
use crate::protocol::{
    decode_payload, encode_ack, encode_poll, parse_poll_response, Envelope, PollResponse,
};
use crate::transport::{Connection, Connector, TransportError};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Fixed delays applied by the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait after a failed connect or a broken connection
    pub connect_backoff: Duration,
    /// Wait after a `NO_MSG` reply
    pub empty_poll_backoff: Duration,
}

impl From<&ConsumerSection> for PollPolicy {
    fn from(section: &ConsumerSection) -> Self {
        Self {
            connect_backoff: section.connect_backoff(),
            empty_poll_backoff: section.empty_poll_backoff(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&ConsumerSection::default())
    }
}

/// Where a poll loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// No connection; connecting or backing off
    Disconnected,
    /// Connection open, first poll not yet sent
    Connected,
    /// `CONSUME` sent or waiting between polls
    Polling,
    /// Handler running for a delivered message
    Processing,
    /// Loop has exited
    Stopped,
}

/// Why the inner loop gave up its connection
#[derive(Debug)]
enum ConnectionEnd {
    Stopped,
    BrokerDisconnected,
    Failed(TransportError),
}

/// Poll loop for one (topic, handler) registration
pub struct TopicPollLoop<C: Connector> {
    connector: Arc<C>,
    topic: String,
    handler: Arc<dyn Handler>,
    policy: PollPolicy,
    running: watch::Receiver<bool>,
    state_tx: watch::Sender<LoopState>,
    metrics: Arc<ConsumerMetrics>,
}

impl<C: Connector> TopicPollLoop<C> {
    /// Build a loop and the receiver its state is published on
    pub fn new(
        connector: Arc<C>,
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
        policy: PollPolicy,
        running: watch::Receiver<bool>,
        metrics: Arc<ConsumerMetrics>,
    ) -> (Self, watch::Receiver<LoopState>) {
        let (state_tx, state_rx) = watch::channel(LoopState::Disconnected);
        let poll_loop = Self {
            connector,
            topic: topic.into(),
            handler,
            policy,
            running,
            state_tx,
            metrics,
        };
        (poll_loop, state_rx)
    }

    fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    fn set_state(&self, state: LoopState) {
        self.state_tx.send_replace(state);
    }

    /// Run until the running flag clears
    pub async fn run(mut self) {
        info!(topic = %self.topic, "Listener started");

        while self.is_running() {
            self.set_state(LoopState::Disconnected);

            let mut connection = match self.connector.connect().await {
                Ok(connection) => connection,
                Err(e) => {
                    self.metrics.connect_failed();
                    warn!(
                        topic = %self.topic,
                        addr = %self.connector.address(),
                        error = %e,
                        "Failed to connect to broker, retrying in {:?}",
                        self.policy.connect_backoff
                    );
                    self.interruptible_sleep(self.policy.connect_backoff).await;
                    continue;
                }
            };

            self.metrics.connected();
            self.set_state(LoopState::Connected);
            info!(topic = %self.topic, addr = %self.connector.address(), "Connected and listening");

            let end = self.poll_connection(&mut connection).await;
            connection.close().await;

            match end {
                ConnectionEnd::Stopped => break,
                ConnectionEnd::BrokerDisconnected => {
                    self.metrics.connection_lost();
                    warn!(topic = %self.topic, "Broker disconnected, reconnecting");
                }
                ConnectionEnd::Failed(e) => {
                    self.metrics.connection_lost();
                    error!(
                        topic = %self.topic,
                        error = %e,
                        "Connection error, reconnecting in {:?}",
                        self.policy.connect_backoff
                    );
                    self.interruptible_sleep(self.policy.connect_backoff).await;
                }
            }
        }

        self.set_state(LoopState::Stopped);
        info!(topic = %self.topic, "Listener stopped");
    }

    /// Poll on one connection until it breaks or the loop is stopped
    async fn poll_connection(&mut self, connection: &mut C::Connection) -> ConnectionEnd {
        let poll_line = encode_poll(&self.topic);

        loop {
            if !self.is_running() {
                return ConnectionEnd::Stopped;
            }

            self.set_state(LoopState::Polling);
            if let Err(e) = connection.write_line(&poll_line).await {
                return ConnectionEnd::Failed(e);
            }
            self.metrics.poll_sent();

            let line = match connection.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return ConnectionEnd::BrokerDisconnected,
                Err(e) => return ConnectionEnd::Failed(e),
            };

            match parse_poll_response(&line) {
                Ok(PollResponse::Empty) => {
                    self.metrics.empty_poll();
                    self.interruptible_sleep(self.policy.empty_poll_backoff).await;
                }
                Ok(PollResponse::Message(envelope)) => {
                    self.set_state(LoopState::Processing);
                    if let Err(e) = self.dispatch(connection, envelope).await {
                        return ConnectionEnd::Failed(e);
                    }
                }
                Err(e) => {
                    self.metrics.malformed_response();
                    warn!(topic = %self.topic, "{}", e);
                }
            }
        }
    }

    /// Decode, run the handler, and acknowledge on success.
    ///
    /// Only a failed `ACK` write is returned; decode and handler failures are
    /// logged and leave the message for redelivery.
    async fn dispatch(
        &self,
        connection: &mut C::Connection,
        envelope: Envelope,
    ) -> Result<(), TransportError> {
        self.metrics.message_delivered();
        let message_id = envelope.message_id.as_str();

        let message = match decode_payload(&envelope.payload) {
            Ok(message) => message,
            Err(e) => {
                self.metrics.decode_failed();
                error!(
                    topic = %self.topic,
                    message_id = %message_id,
                    "Error processing message: {}. Message will be re-queued after timeout",
                    e
                );
                return Ok(());
            }
        };

        let context = MessageContext::new(&self.topic, message_id, &envelope.reserved);
        let started = Instant::now();
        match invoke_handler(self.handler.as_ref(), message, &context).await {
            Ok(()) => {
                self.metrics.handler_completed(started.elapsed());
                connection.write_line(&encode_ack(message_id)).await?;
                self.metrics.ack_sent();
                debug!(topic = %self.topic, message_id = %message_id, "Message acknowledged");
            }
            Err(e) => {
                self.metrics.handler_failed(started.elapsed());
                error!(
                    topic = %self.topic,
                    message_id = %message_id,
                    "Error processing message: {}. Message will be re-queued after timeout",
                    e
                );
            }
        }

        Ok(())
    }

    /// Sleep for `duration`, returning early once the running flag clears
    async fn interruptible_sleep(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.running.wait_for(|running| !*running) => {
                debug!(topic = %self.topic, "Sleep interrupted by stop");
            }
        }
    }
}
