//! Application Layer - Use cases and port definitions.
//!
//! Services that make the broker dependable (retry, cached auth, the
//! self-healing stream) and the ports they drive.

/// Port interfaces for external systems.
pub mod ports;

/// Resilience services built on the ports.
pub mod services;
