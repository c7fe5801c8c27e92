//! Transport seam between [`crate::ws::ConnectionManager`] and the network.
//!
//! A [`Connector`] starts a connection attempt and hands back a [`Transport`] handle right away;
//! everything that happens afterwards (open, inbound text, close, error) is reported through the
//! [`EventSink`] it was given. The manager consumes those events one at a time, so connectors
//! never touch session state directly.

use futures::{SinkExt as _, StreamExt as _};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use url::Url;

use super::error::WsError;
use crate::Result;

/// Close code reported when the peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close handshake.
pub const CLOSE_ABNORMAL: u16 = 1006;
/// Close code sent on a local [`crate::ws::ConnectionManager::disconnect`].
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code and reason of a finished connection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, reason: S) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Connection lost without a close frame.
    #[must_use]
    pub fn abnormal() -> Self {
        Self::new(CLOSE_ABNORMAL, "")
    }
}

/// Lifecycle notification produced by a transport.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Message(String),
    Close(CloseInfo),
    Error(String),
}

/// Everything the manager's event loop reacts to.
#[derive(Debug)]
pub(crate) enum Event {
    Transport {
        attempt: u64,
        event: ConnectionEvent,
    },
    HeartbeatTick {
        generation: u64,
    },
}

/// Lifecycle handlers for one connection attempt.
///
/// Events are tagged with the attempt they belong to; once the manager detaches an attempt
/// (on close or local disconnect) anything still arriving through its sink is dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: u64,
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink {
    pub(crate) fn new(attempt: u64, tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { attempt, tx }
    }

    /// Attempt id this sink reports for.
    #[must_use]
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    pub fn opened(&self) {
        self.emit(ConnectionEvent::Open);
    }

    pub fn message<S: Into<String>>(&self, text: S) {
        self.emit(ConnectionEvent::Message(text.into()));
    }

    pub fn closed(&self, info: CloseInfo) {
        self.emit(ConnectionEvent::Close(info));
    }

    pub fn error<S: Into<String>>(&self, message: S) {
        self.emit(ConnectionEvent::Error(message.into()));
    }

    fn emit(&self, event: ConnectionEvent) {
        // The manager may already be gone; nothing left to notify then
        _ = self.tx.send(Event::Transport {
            attempt: self.attempt,
            event,
        });
    }
}

/// Outbound half of an open (or opening) connection.
pub trait Transport: Send {
    /// Queues a text frame for delivery.
    fn send(&self, text: String) -> Result<()>;

    /// Starts the close handshake. No further events are expected after this call.
    fn close(&self, code: u16, reason: &str);
}

/// Opens transports.
///
/// Implementations must report [`ConnectionEvent::Close`] after any error that ends the
/// connection, including a failed open, so that the session always returns to disconnected.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>>;
}

/// [`Connector`] backed by `tokio-tungstenite`.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[derive(Debug)]
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug)]
struct TungsteniteTransport {
    sender_tx: mpsc::UnboundedSender<Outbound>,
}

impl Transport for TungsteniteTransport {
    fn send(&self, text: String) -> Result<()> {
        self.sender_tx
            .send(Outbound::Text(text))
            .map_err(|_e| WsError::ConnectionClosed)?;
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        _ = self.sender_tx.send(Outbound::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

impl Connector for TungsteniteConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>> {
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(WsError::UnsupportedScheme(other.to_owned()).into()),
        }

        let (sender_tx, sender_rx) = mpsc::unbounded_channel();
        let endpoint = url.to_string();

        tokio::spawn(async move {
            Self::connection_task(endpoint, sender_rx, events).await;
        });

        Ok(Box::new(TungsteniteTransport { sender_tx }))
    }
}

impl TungsteniteConnector {
    /// Connects, then pumps frames in both directions until either side closes.
    async fn connection_task(
        endpoint: String,
        mut sender_rx: mpsc::UnboundedReceiver<Outbound>,
        events: EventSink,
    ) {
        let ws_stream = match connect_async(&endpoint).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%endpoint, error = %e, "Unable to connect");
                events.error(WsError::Connection(e).to_string());
                events.closed(CloseInfo::abnormal());
                return;
            }
        };

        events.opened();
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            #[cfg(feature = "tracing")]
                            tracing::trace!(%text, "Received WebSocket text message");
                            events.message(text.as_str());
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let info = frame.map_or_else(
                                || CloseInfo::new(CLOSE_NO_STATUS, ""),
                                |f| CloseInfo::new(u16::from(f.code), f.reason.as_str()),
                            );
                            events.closed(info);
                            break;
                        }
                        Some(Ok(_)) => {
                            // Binary frames and protocol-level ping/pong are not part of the session
                        }
                        Some(Err(e)) => {
                            events.error(WsError::Connection(e).to_string());
                            events.closed(CloseInfo::abnormal());
                            break;
                        }
                        None => {
                            events.closed(CloseInfo::abnormal());
                            break;
                        }
                    }
                }

                outbound = sender_rx.recv() => {
                    match outbound {
                        Some(Outbound::Text(text)) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                events.error(WsError::Connection(e).to_string());
                                events.closed(CloseInfo::abnormal());
                                break;
                            }
                        }
                        Some(Outbound::Close { code, reason }) => {
                            let frame = CloseFrame {
                                code: CloseCode::from(code),
                                reason: reason.into(),
                            };
                            _ = write.send(Message::Close(Some(frame))).await;
                            break;
                        }
                        // Transport handle dropped without an explicit close
                        None => {
                            _ = write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(%endpoint, "Connection task finished");
    }
}
