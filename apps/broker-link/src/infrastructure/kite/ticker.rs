//! Kite Ticker WebSocket Transport
//!
//! Opens `wss://ws.kite.trade?api_key=..&access_token=..` and splits the
//! socket into two tasks:
//!
//! - a writer that drains subscribe/unsubscribe/close commands, so
//!   [`StreamTransport`] calls never block;
//! - a reader that decodes frames and forwards [`TransportEvent`]s in
//!   arrival order, ending with exactly one `Closed` or `Error`.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::codec::{self, TextMessage};
use crate::application::ports::{
    StreamConnector, StreamTransport, TransportEvent, TransportEventSender,
};
use crate::domain::errors::TransportError;
use crate::domain::session::SessionCredential;
use crate::domain::streaming::{InstrumentToken, TickMode};

/// Production ticker endpoint.
pub const DEFAULT_TICKER_URL: &str = "wss://ws.kite.trade";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug)]
enum Command {
    Subscribe(Vec<InstrumentToken>),
    Unsubscribe(Vec<InstrumentToken>),
    Close,
}

/// Opens ticker sessions.
#[derive(Debug, Clone)]
pub struct KiteTickerConnector {
    url: String,
    mode: TickMode,
}

impl KiteTickerConnector {
    /// Create a connector that subscribes in the given mode.
    #[must_use]
    pub fn new(url: impl Into<String>, mode: TickMode) -> Self {
        Self {
            url: url.into(),
            mode,
        }
    }

    fn session_url(&self, credential: &SessionCredential) -> String {
        format!(
            "{}?api_key={}&access_token={}",
            self.url.trim_end_matches('/'),
            credential.api_key(),
            credential.access_token()
        )
    }
}

#[async_trait]
impl StreamConnector for KiteTickerConnector {
    async fn open(
        &self,
        credential: &SessionCredential,
        events: TransportEventSender,
    ) -> Result<Arc<dyn StreamTransport>, TransportError> {
        let (ws, _response) = connect_async(self.session_url(credential))
            .await
            .map_err(map_connect_error)?;
        tracing::info!(url = %self.url, mode = self.mode.as_str(), "Ticker socket open");

        let (sink, source) = ws.split();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(sink, commands_rx, self.mode));
        tokio::spawn(read_loop(source, events));

        Ok(Arc::new(KiteTickerTransport {
            commands: commands_tx,
        }))
    }
}

/// Handle to an open ticker session.
#[derive(Debug)]
pub struct KiteTickerTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl StreamTransport for KiteTickerTransport {
    fn subscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.commands
            .send(Command::Subscribe(tokens.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn unsubscribe(&self, tokens: &[InstrumentToken]) -> Result<(), TransportError> {
        self.commands
            .send(Command::Unsubscribe(tokens.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }
}

async fn write_loop(
    mut sink: WsSink,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mode: TickMode,
) {
    while let Some(command) = commands.recv().await {
        let frames = match &command {
            Command::Subscribe(tokens) => {
                codec::subscribe_request(tokens).and_then(|subscribe| {
                    codec::mode_request(mode, tokens).map(|set_mode| vec![subscribe, set_mode])
                })
            }
            Command::Unsubscribe(tokens) => codec::unsubscribe_request(tokens).map(|u| vec![u]),
            Command::Close => {
                if let Err(e) = sink.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "Close frame not sent");
                }
                break;
            }
        };

        let frames = match frames {
            Ok(frames) => frames,
            Err(e) => {
                tracing::error!(error = %e, ?command, "Failed to encode ticker command");
                continue;
            }
        };

        for frame in frames {
            if let Err(e) = sink.send(Message::Text(frame.into())).await {
                tracing::warn!(error = %e, "Ticker write failed");
                return;
            }
        }
    }
    tracing::debug!("Ticker writer finished");
}

async fn read_loop(mut source: WsSource, events: TransportEventSender) {
    while let Some(message) = source.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                let _ = events.send(TransportEvent::Error {
                    reason: e.to_string(),
                });
                return;
            }
        };

        match message {
            Message::Binary(frame) => match codec::decode_ticks(&frame) {
                Ok(ticks) if ticks.is_empty() => {}
                Ok(ticks) => {
                    if events.send(TransportEvent::Ticks(ticks)).is_err() {
                        return;
                    }
                }
                Err(e) => tracing::warn!(error = %e, bytes = frame.len(), "Dropping undecodable tick frame"),
            },
            Message::Text(text) => match codec::decode_text(text.as_str()) {
                Ok(TextMessage::Error(reason)) => {
                    tracing::warn!(reason = %reason, "Ticker reported error");
                }
                Ok(TextMessage::Message(note)) => tracing::info!(note = %note, "Ticker notice"),
                Ok(TextMessage::Order(order)) => tracing::debug!(%order, "Order postback"),
                Ok(TextMessage::Other(kind)) => tracing::trace!(kind = %kind, "Ignoring ticker message"),
                Err(e) => tracing::debug!(error = %e, "Ignoring malformed text frame"),
            },
            Message::Close(frame) => {
                let (code, reason) = frame.map_or((None, String::new()), |f| {
                    (Some(u16::from(f.code)), f.reason.as_str().to_owned())
                });
                let _ = events.send(TransportEvent::Closed { code, reason });
                return;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    let _ = events.send(TransportEvent::Closed {
        code: None,
        reason: "socket ended".to_string(),
    });
}

fn map_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error;

    match err {
        Error::Http(response) => TransportError::Rejected(response.status().as_u16()),
        Error::Io(e) => TransportError::Connect(e.to_string()),
        other => TransportError::Connect(other.to_string()),
    }
}
