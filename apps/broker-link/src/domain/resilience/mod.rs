//! Resilience primitives: backoff schedule and failure classification.

pub mod backoff;
pub mod classifier;

pub use backoff::BackoffPolicy;
pub use classifier::{Classify, FailureKind, classify_message, classify_status};
