//! Kite Ticker Wire Format
//!
//! Binary frames carry ticks; text frames carry JSON control and
//! postback messages.
//!
//! # Binary Frame Layout (big-endian)
//!
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────┬──────────────┬─────┐
//! │ count u16│ len u16  │ packet (len) │ len u16  │ packet (len) │ ... │
//! └──────────┴──────────┴──────────────┴──────────┴──────────────┴─────┘
//! ```
//!
//! A one-byte frame is a heartbeat. Packet length selects the layout:
//!
//! | Length | Layout                                  |
//! |--------|-----------------------------------------|
//! | 8      | LTP: token, last price                  |
//! | 28     | Index quote: token, ltp, h, l, o, c, Δ  |
//! | 32     | Index full: index quote + timestamp     |
//! | 44     | Quote: price, quantities, volume, OHLC  |
//! | 184    | Full: quote + OI, timestamps, depth     |
//!
//! Prices are integers in paise. Currency derivatives (segment 3) are
//! scaled by 10^7 and BSE currency (segment 6) by 10^4.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::{InstrumentToken, Ohlc, Tick, TickMode};

const SEGMENT_CDS: u32 = 3;
const SEGMENT_BCD: u32 = 6;
const SEGMENT_INDICES: u32 = 9;

const LTP_PACKET: usize = 8;
const INDEX_QUOTE_PACKET: usize = 28;
const INDEX_FULL_PACKET: usize = 32;
const QUOTE_PACKET: usize = 44;
const FULL_PACKET: usize = 184;

/// Wire decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame ended before the declared data.
    #[error("frame truncated: need {needed} bytes at offset {offset}, have {available}")]
    Truncated {
        /// Offset of the missing data.
        offset: usize,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// Packet length matches no known layout.
    #[error("unsupported packet length {0}")]
    UnknownPacket(usize),

    /// Text frame was not valid JSON.
    #[error("invalid text message: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Binary frames
// =============================================================================

/// Decode a binary frame into ticks. Heartbeats decode to no ticks.
///
/// # Errors
///
/// Returns `CodecError` if the frame is truncated or holds a packet of
/// unknown length.
pub fn decode_ticks(frame: &[u8]) -> Result<Vec<Tick>, CodecError> {
    if frame.len() < 2 {
        return Ok(Vec::new());
    }

    let count = usize::from(read_u16(frame, 0)?);
    let mut ticks = Vec::with_capacity(count);
    let mut offset = 2;

    for _ in 0..count {
        let len = usize::from(read_u16(frame, offset)?);
        offset += 2;
        let packet = slice(frame, offset, len)?;
        ticks.push(decode_packet(packet)?);
        offset += len;
    }

    Ok(ticks)
}

fn decode_packet(packet: &[u8]) -> Result<Tick, CodecError> {
    let token = read_u32(packet, 0)?;
    let segment = token & 0xff;
    let scale = price_scale(segment);
    let price = |offset| read_u32(packet, offset).map(|raw| to_price(raw, scale));

    match packet.len() {
        LTP_PACKET => Ok(Tick {
            tradable: segment != SEGMENT_INDICES,
            ..Tick::ltp(token, price(4)?)
        }),
        INDEX_QUOTE_PACKET | INDEX_FULL_PACKET => {
            let last_price = price(4)?;
            let close = price(20)?;
            let mode = if packet.len() == INDEX_FULL_PACKET {
                TickMode::Full
            } else {
                TickMode::Quote
            };
            let exchange_timestamp = if packet.len() == INDEX_FULL_PACKET {
                timestamp(read_u32(packet, 28)?)
            } else {
                None
            };
            Ok(Tick {
                mode,
                tradable: false,
                ohlc: Some(Ohlc {
                    high: price(8)?,
                    low: price(12)?,
                    open: price(16)?,
                    close,
                }),
                change: (!close.is_zero()).then(|| last_price - close),
                exchange_timestamp,
                ..Tick::ltp(token, last_price)
            })
        }
        QUOTE_PACKET | FULL_PACKET => {
            let mut tick = Tick {
                mode: TickMode::Quote,
                tradable: segment != SEGMENT_INDICES,
                last_traded_quantity: Some(read_u32(packet, 8)?),
                average_traded_price: Some(price(12)?),
                volume_traded: Some(read_u32(packet, 16)?),
                total_buy_quantity: Some(read_u32(packet, 20)?),
                total_sell_quantity: Some(read_u32(packet, 24)?),
                ohlc: Some(Ohlc {
                    open: price(28)?,
                    high: price(32)?,
                    low: price(36)?,
                    close: price(40)?,
                }),
                ..Tick::ltp(token, price(4)?)
            };
            if packet.len() == FULL_PACKET {
                tick.mode = TickMode::Full;
                tick.last_trade_time = timestamp(read_u32(packet, 44)?);
                tick.open_interest = Some(read_u32(packet, 48)?);
                tick.exchange_timestamp = timestamp(read_u32(packet, 60)?);
            }
            Ok(tick)
        }
        other => Err(CodecError::UnknownPacket(other)),
    }
}

/// Decimal places of prices in a segment.
const fn price_scale(segment: u32) -> u32 {
    match segment {
        SEGMENT_CDS => 7,
        SEGMENT_BCD => 4,
        _ => 2,
    }
}

fn to_price(raw: u32, scale: u32) -> Decimal {
    Decimal::new(i64::from(raw), scale)
}

fn timestamp(epoch_secs: u32) -> Option<DateTime<Utc>> {
    if epoch_secs == 0 {
        return None;
    }
    DateTime::from_timestamp(i64::from(epoch_secs), 0)
}

fn slice(frame: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    frame
        .get(offset..offset + len)
        .ok_or(CodecError::Truncated {
            offset,
            needed: len,
            available: frame.len().saturating_sub(offset),
        })
}

fn read_u16(frame: &[u8], offset: usize) -> Result<u16, CodecError> {
    let bytes = slice(frame, offset, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(frame: &[u8], offset: usize) -> Result<u32, CodecError> {
    let bytes = slice(frame, offset, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// =============================================================================
// Text frames
// =============================================================================

/// JSON message received on a text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMessage {
    /// Order postback.
    Order(serde_json::Value),
    /// Server-side error notice.
    Error(String),
    /// Informational notice.
    Message(String),
    /// Anything else.
    Other(String),
}

#[derive(Deserialize)]
struct RawText {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Decode a text frame.
///
/// # Errors
///
/// Returns `CodecError::Json` if the frame is not a JSON object with a
/// `type` field.
pub fn decode_text(text: &str) -> Result<TextMessage, CodecError> {
    let raw: RawText = serde_json::from_str(text)?;
    let data_text = || match &raw.data {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(match raw.kind.as_str() {
        "order" => TextMessage::Order(raw.data.clone()),
        "error" => TextMessage::Error(data_text()),
        "message" => TextMessage::Message(data_text()),
        other => TextMessage::Other(other.to_string()),
    })
}

#[derive(Serialize)]
struct Request<'a, V> {
    a: &'a str,
    v: V,
}

/// `{"a":"subscribe","v":[...]}`
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn subscribe_request(tokens: &[InstrumentToken]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&Request {
        a: "subscribe",
        v: tokens,
    })?)
}

/// `{"a":"unsubscribe","v":[...]}`
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn unsubscribe_request(tokens: &[InstrumentToken]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&Request {
        a: "unsubscribe",
        v: tokens,
    })?)
}

/// `{"a":"mode","v":["full",[...]]}`
///
/// # Errors
///
/// Returns `CodecError::Json` if serialization fails.
pub fn mode_request(mode: TickMode, tokens: &[InstrumentToken]) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&Request {
        a: "mode",
        v: (mode.as_str(), tokens),
    })?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(packets: &[Vec<u8>]) -> Vec<u8> {
        let mut out = u16::try_from(packets.len()).unwrap().to_be_bytes().to_vec();
        for packet in packets {
            out.extend_from_slice(&u16::try_from(packet.len()).unwrap().to_be_bytes());
            out.extend_from_slice(packet);
        }
        out
    }

    fn packet(words: &[u32], len: usize) -> Vec<u8> {
        let mut out: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        out.resize(len, 0);
        out
    }

    #[test]
    fn heartbeat_has_no_ticks() {
        assert!(decode_ticks(&[0]).unwrap().is_empty());
        assert!(decode_ticks(&[]).unwrap().is_empty());
    }

    #[test]
    fn ltp_packet() {
        // NSE equity token 408065 (segment 1)
        let ticks = decode_ticks(&frame(&[packet(&[408_065, 152_050], 8)])).unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].instrument_token, 408_065);
        assert_eq!(ticks[0].mode, TickMode::Ltp);
        assert_eq!(ticks[0].last_price, Decimal::new(152_050, 2));
        assert!(ticks[0].tradable);
    }

    #[test]
    fn currency_segment_scaling() {
        let token = (1_000 << 8) | SEGMENT_CDS;
        let ticks = decode_ticks(&frame(&[packet(&[token, 831_234_567], 8)])).unwrap();
        assert_eq!(ticks[0].last_price.to_string(), "83.1234567");
    }

    #[test]
    fn quote_packet() {
        let words = [
            738_561, 250_000, 10, 249_500, 1_200_000, 500, 700, 248_000, 251_000, 247_500,
            246_000,
        ];
        let ticks = decode_ticks(&frame(&[packet(&words, 44)])).unwrap();
        let tick = &ticks[0];

        assert_eq!(tick.mode, TickMode::Quote);
        assert_eq!(tick.last_price, Decimal::new(250_000, 2));
        assert_eq!(tick.last_traded_quantity, Some(10));
        assert_eq!(tick.volume_traded, Some(1_200_000));
        assert_eq!(tick.total_sell_quantity, Some(700));
        let ohlc = tick.ohlc.unwrap();
        assert_eq!(ohlc.open, Decimal::new(248_000, 2));
        assert_eq!(ohlc.close, Decimal::new(246_000, 2));
        assert!(tick.open_interest.is_none());
    }

    #[test]
    fn full_packet_has_timestamps() {
        let mut words = vec![738_561, 250_000, 10, 249_500, 1_200_000, 500, 700, 1, 2, 3, 4];
        words.extend([1_700_000_000, 42, 50, 40, 1_700_000_005]);
        let ticks = decode_ticks(&frame(&[packet(&words, 184)])).unwrap();
        let tick = &ticks[0];

        assert_eq!(tick.mode, TickMode::Full);
        assert_eq!(tick.open_interest, Some(42));
        assert_eq!(tick.last_trade_time.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(tick.exchange_timestamp.unwrap().timestamp(), 1_700_000_005);
    }

    #[test]
    fn index_packet() {
        // NIFTY 50 token 256265 (segment 9)
        let words = [256_265, 2_450_000, 2_460_000, 2_440_000, 2_445_000, 2_400_000, 0];
        let ticks = decode_ticks(&frame(&[packet(&words, 28)])).unwrap();
        let tick = &ticks[0];

        assert!(!tick.tradable);
        assert_eq!(tick.ohlc.unwrap().high, Decimal::new(2_460_000, 2));
        assert_eq!(tick.change, Some(Decimal::new(50_000, 2)));
    }

    #[test]
    fn multiple_packets_in_one_frame() {
        let ticks = decode_ticks(&frame(&[
            packet(&[1, 100], 8),
            packet(&[2, 200], 8),
            packet(&[3, 300], 8),
        ]))
        .unwrap();
        let tokens: Vec<_> = ticks.iter().map(|t| t.instrument_token).collect();
        assert_eq!(tokens, vec![1, 2, 3]);
    }

    #[test]
    fn truncated_frame_is_error() {
        let mut bytes = frame(&[packet(&[1, 100], 8)]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            decode_ticks(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_packet_length_is_error() {
        assert!(matches!(
            decode_ticks(&frame(&[packet(&[1, 100], 12)])),
            Err(CodecError::UnknownPacket(12))
        ));
    }

    #[test]
    fn text_messages() {
        assert_eq!(
            decode_text(r#"{"type":"error","data":"Invalid token"}"#).unwrap(),
            TextMessage::Error("Invalid token".to_string())
        );
        assert!(matches!(
            decode_text(r#"{"type":"order","data":{"order_id":"1"}}"#).unwrap(),
            TextMessage::Order(_)
        ));
        assert_eq!(
            decode_text(r#"{"type":"instruments_meta","data":{}}"#).unwrap(),
            TextMessage::Other("instruments_meta".to_string())
        );
        assert!(decode_text("not json").is_err());
    }

    #[test]
    fn control_requests() {
        assert_eq!(
            subscribe_request(&[408_065, 884_737]).unwrap(),
            r#"{"a":"subscribe","v":[408065,884737]}"#
        );
        assert_eq!(
            unsubscribe_request(&[1]).unwrap(),
            r#"{"a":"unsubscribe","v":[1]}"#
        );
        assert_eq!(
            mode_request(TickMode::Full, &[1, 2]).unwrap(),
            r#"{"a":"mode","v":["full",[1,2]]}"#
        );
    }
}
