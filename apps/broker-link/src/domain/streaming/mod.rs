//! Market Data Streaming Types
//!
//! Ticks as delivered by the broker's ticker feed, plus the connection
//! state and liveness bookkeeping of a streaming session. Wire formats live
//! in the infrastructure adapters.

mod health;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use health::{StreamHealth, TickHealth};

/// Broker-assigned numeric instrument identifier.
pub type InstrumentToken = u32;

/// Detail level of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickMode {
    /// Last traded price only.
    Ltp,
    /// Price, volume and OHLC.
    #[default]
    Quote,
    /// Quote plus open interest and timestamps.
    Full,
}

impl TickMode {
    /// Parse a mode name, defaulting to `Quote`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ltp" => Self::Ltp,
            "full" => Self::Full,
            _ => Self::Quote,
        }
    }

    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ltp => "ltp",
            Self::Quote => "quote",
            Self::Full => "full",
        }
    }
}

/// Open/high/low/close of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ohlc {
    /// Opening price.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Previous close.
    pub close: Decimal,
}

/// A single market data update for one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument the tick belongs to.
    pub instrument_token: InstrumentToken,
    /// Detail level this tick was delivered in.
    pub mode: TickMode,
    /// False for indices.
    pub tradable: bool,
    /// Last traded price.
    pub last_price: Decimal,
    /// Quantity of the last trade.
    pub last_traded_quantity: Option<u32>,
    /// Volume-weighted average price.
    pub average_traded_price: Option<Decimal>,
    /// Volume traded today.
    pub volume_traded: Option<u32>,
    /// Pending buy quantity.
    pub total_buy_quantity: Option<u32>,
    /// Pending sell quantity.
    pub total_sell_quantity: Option<u32>,
    /// Session OHLC.
    pub ohlc: Option<Ohlc>,
    /// Absolute change against previous close (indices only).
    pub change: Option<Decimal>,
    /// Time of the last trade.
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Open interest (derivatives).
    pub open_interest: Option<u32>,
    /// Exchange timestamp of the tick.
    pub exchange_timestamp: Option<DateTime<Utc>>,
}

impl Tick {
    /// A last-price-only tick.
    #[must_use]
    pub const fn ltp(instrument_token: InstrumentToken, last_price: Decimal) -> Self {
        Self {
            instrument_token,
            mode: TickMode::Ltp,
            tradable: true,
            last_price,
            last_traded_quantity: None,
            average_traded_price: None,
            volume_traded: None,
            total_buy_quantity: None,
            total_sell_quantity: None,
            ohlc: None,
            change: None,
            last_trade_time: None,
            open_interest: None,
            exchange_timestamp: None,
        }
    }
}

/// Lifecycle state of the streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session and no reconnection in flight.
    #[default]
    Disconnected,
    /// A caller-initiated connect is in flight.
    Connecting,
    /// Session open and ticks expected.
    Connected,
    /// Session lost; the reconnect task owns recovery.
    Reconnecting,
}

impl ConnectionState {
    /// Name used in logs, metrics and the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Numeric value exported as a gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_mode_parsing() {
        assert_eq!(TickMode::from_str_case_insensitive("LTP"), TickMode::Ltp);
        assert_eq!(TickMode::from_str_case_insensitive("full"), TickMode::Full);
        assert_eq!(TickMode::from_str_case_insensitive("quote"), TickMode::Quote);
        assert_eq!(TickMode::from_str_case_insensitive("bogus"), TickMode::Quote);
        assert_eq!(TickMode::Full.as_str(), "full");
    }

    #[test]
    fn connection_state_labels() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }

    #[test]
    fn ltp_tick_has_no_quote_fields() {
        let tick = Tick::ltp(256_265, Decimal::new(2_450_075, 2));
        assert_eq!(tick.mode, TickMode::Ltp);
        assert_eq!(tick.last_price.to_string(), "24500.75");
        assert!(tick.ohlc.is_none());
        assert!(tick.volume_traded.is_none());
    }
}
