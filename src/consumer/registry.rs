//! Topic to handler registrations
//!
//! Filled before the consumer starts and read-only while it runs. Every
//! registration becomes its own poll loop, so two handlers on one topic
//! compete for that topic's messages rather than both receiving each one.

use super::handler::Handler;
use crate::protocol::{validate_topic, ValidationError};
use std::sync::Arc;

/// One (topic, handler) pair
#[derive(Clone)]
pub struct Listener {
    pub topic: String,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Handle returned by a successful registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    index: usize,
    topic: String,
}

impl Registration {
    /// Position of the listener; also the `listener` field of its log span
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Ordered list of listeners
#[derive(Debug, Default, Clone)]
pub struct ListenerRegistry {
    listeners: Vec<Listener>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener after validating its topic
    pub fn register(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Registration, ValidationError> {
        let topic = topic.into();
        validate_topic(&topic)?;

        let index = self.listeners.len();
        self.listeners.push(Listener {
            topic: topic.clone(),
            handler,
        });
        Ok(Registration { index, topic })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    /// Distinct topics in registration order
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = Vec::new();
        for listener in &self.listeners {
            if !topics.contains(&listener.topic.as_str()) {
                topics.push(&listener.topic);
            }
        }
        topics
    }

    /// Handlers registered for `topic`, in registration order
    pub fn handlers_for(&self, topic: &str) -> Vec<Arc<dyn Handler>> {
        self.listeners
            .iter()
            .filter(|listener| listener.topic == topic)
            .map(|listener| Arc::clone(&listener.handler))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
