//! MiniMQ consumer
//!
//! Register handlers per topic, then [`Consumer::start`] runs one poll loop
//! per registration. A message is acknowledged only after its handler
//! returns `Ok`; anything else leaves it for the broker to redeliver, so
//! delivery is at-least-once.
//!
//! ```no_run
//! use minimq::{ClientConfig, Consumer, HandlerError, MessageContext};
//! use serde_json::Value;
//!
//! # async fn run() -> minimq::MiniMqResult<()> {
//! let mut consumer = Consumer::new(&ClientConfig::default())?;
//! consumer.register_fn("orders", |order: Value, ctx: MessageContext| async move {
//!     println!("{} -> {}", ctx.message_id(), order);
//!     Ok::<(), HandlerError>(())
//! })?;
//! consumer.start(true).await;
//! # Ok(())
//! # }
//! ```

pub mod handler;
pub mod poll_loop;
pub mod registry;
pub mod supervisor;

pub use handler::{invoke_handler, FnHandler, Handler, HandlerError, MessageContext, TypedHandler};
pub use poll_loop::{LoopState, PollPolicy, TopicPollLoop};
pub use registry::{Listener, ListenerRegistry, Registration};
pub use supervisor::{Consumer, StopHandle};
