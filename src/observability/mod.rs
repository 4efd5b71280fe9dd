//! Observability for MiniMQ clients
//!
//! Structured logging setup, span macros, and per-consumer statistics.

pub mod logging;
pub mod metrics;

// Re-export for convenience
pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};
pub use metrics::{ConsumerMetrics, MetricsSnapshot};

// Span macros for structured logging
pub use logging::{listener_span, producer_span};
