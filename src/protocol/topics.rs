//! Topic name validation for the MiniMQ line protocol
//!
//! Topics are opaque, case-sensitive identifiers. The broker accepts any
//! non-empty name, so the client checks nothing else.

use thiserror::Error;

/// Validate a topic name before it is written into a command line.
pub fn validate_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }

    Ok(())
}

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Topic cannot be empty")]
    EmptyTopic,
}
