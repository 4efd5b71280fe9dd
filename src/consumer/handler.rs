//! Message handlers and the failure boundary around them
//!
//! A handler receives one decoded message plus its [`MessageContext`] and
//! reports success or failure. Only success leads to an `ACK`; errors and
//! panics are contained here so they never reach the poll loop.

use async_trait::async_trait;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

/// Failure reported by (or captured from) a handler
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("payload does not match the expected type: {0}")]
    Payload(#[source] serde_json::Error),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Wrap any error type
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(error.into())
    }

    /// Failure described by a plain message
    pub fn message<S: Into<String>>(message: S) -> Self {
        Self::Failed(message.into().into())
    }
}

/// Delivery metadata handed to handlers alongside the message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContext {
    topic: String,
    message_id: String,
    reserved: String,
}

impl MessageContext {
    pub fn new(
        topic: impl Into<String>,
        message_id: impl Into<String>,
        reserved: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            message_id: message_id.into(),
            reserved: reserved.into(),
        }
    }

    /// Topic the message was polled from
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Broker-assigned message id, the value sent back in `ACK`
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Second envelope segment, passed through without interpretation
    pub fn reserved(&self) -> &str {
        &self.reserved
    }
}

/// User logic invoked once per delivered message
///
/// Returning `Ok(())` acknowledges the message. Any error (or panic) leaves
/// it unacknowledged, so the broker redelivers it after its ACK timeout.
/// Handlers must therefore tolerate duplicates.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, message: Value, context: &MessageContext) -> Result<(), HandlerError>;
}

/// Handler built from an async closure over the raw JSON value
pub struct FnHandler<F> {
    f: F,
}

impl<F, Fut> FnHandler<F>
where
    F: Fn(Value, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Value, context: &MessageContext) -> Result<(), HandlerError> {
        (self.f)(message, context.clone()).await
    }
}

/// Handler that deserializes the payload into `T` before calling the closure
pub struct TypedHandler<T, F> {
    f: F,
    _phantom: PhantomData<fn(T)>,
}

impl<T, F, Fut> TypedHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> Handler for TypedHandler<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Value, context: &MessageContext) -> Result<(), HandlerError> {
        let typed: T = serde_json::from_value(message).map_err(HandlerError::Payload)?;
        (self.f)(typed, context.clone()).await
    }
}

/// Run a handler, converting a panic into [`HandlerError::Panicked`]
pub async fn invoke_handler(
    handler: &dyn Handler,
    message: Value,
    context: &MessageContext,
) -> Result<(), HandlerError> {
    match AssertUnwindSafe(handler.handle(message, context))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
