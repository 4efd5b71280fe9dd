//! Testing utilities and mock implementations
//!
//! Lets MiniMQ consumers be tested without a running broker.

pub mod mocks;

pub use mocks::*;
