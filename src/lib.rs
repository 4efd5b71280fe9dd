//! MiniMQ client
//!
//! Producer and polling consumer for the MiniMQ broker, which speaks a
//! plain-text, newline-delimited protocol over TCP.
//!
//! # Overview
//!
//! - [`Producer`] publishes one JSON message per connection
//!   (`PRODUCE:<topic>:<json>`).
//! - [`Consumer`] runs one poll loop per registered (topic, handler) pair,
//!   polling with `CONSUME:<topic>` and acknowledging with `ACK:<id>` only
//!   after the handler succeeds. Failures leave the message with the broker,
//!   which redelivers it after its ACK timeout.
//!
//! # Quick Start
//!
//! ```no_run
//! use minimq::{ClientConfig, Producer};
//! use serde_json::json;
//!
//! # async fn run() -> minimq::MiniMqResult<()> {
//! let config = ClientConfig::for_broker("localhost", 5677);
//! let producer = Producer::new(&config)?;
//! producer
//!     .send("user_events", &json!({"username": "user_0", "event": "login"}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod observability;
pub mod producer;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::{BrokerSection, ClientConfig, ConfigError, ConsumerSection, DEFAULT_PORT};
pub use consumer::{
    Consumer, Handler, HandlerError, LoopState, MessageContext, Registration, StopHandle,
};
pub use error::{MiniMqError, MiniMqResult};
pub use producer::Producer;
pub use protocol::*;
pub use transport::{BrokerAddress, TcpConnector};
