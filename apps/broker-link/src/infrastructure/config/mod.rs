//! Configuration Module
//!
//! Environment-driven settings for the daemon.

mod settings;

pub use settings::{ConfigError, KiteSettings, LinkConfig, ServerSettings, parse_instruments};
