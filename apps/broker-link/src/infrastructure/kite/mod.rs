//! Kite Connect Adapters
//!
//! - `rest`: REST client, also the auth probe
//! - `ticker`: WebSocket tick transport
//! - `codec`: ticker wire format

pub mod codec;
pub mod rest;
pub mod ticker;

pub use rest::{DEFAULT_API_URL, KiteRestClient, Positions, UserProfile};
pub use ticker::{DEFAULT_TICKER_URL, KiteTickerConnector, KiteTickerTransport};
