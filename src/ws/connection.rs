#![expect(
    clippy::module_name_repetitions,
    reason = "Connection types expose their domain in the name for clarity"
)]

use std::fmt;

use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::config::Config;
use super::heartbeat::HeartbeatController;
use super::message::{self, WsMessage};
use super::transport::{
    CLOSE_NORMAL, CloseInfo, ConnectionEvent, Connector, Event, EventSink, Transport,
    TungsteniteConnector,
};
use crate::journal::{EntryKind, Journal, RawPayload};

const NOT_CONNECTED: &str = "not connected to server";
const LOCAL_CLOSE_REASON: &str = "client disconnect";
const MISSING_REASON: &str = "none";

/// Callback invoked once the session has been torn down.
pub type CloseCallback = Box<dyn FnOnce(CloseInfo) + Send>;

/// Connection state tracking.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Transport is being opened
    Connecting,
    /// Transport open, heartbeat running
    Connected,
}

/// Options for a single [`ConnectionManager::connect_with`] call.
#[non_exhaustive]
#[derive(Default)]
pub struct ConnectOptions {
    /// Invoked with the close code and reason after local state has been reset
    pub on_close: Option<CloseCallback>,
}

impl ConnectOptions {
    #[must_use]
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(CloseInfo) + Send + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// The single live connection context.
#[derive(Default)]
struct Session {
    state: SessionState,
    transport: Option<Box<dyn Transport>>,
    last_error: Option<String>,
}

impl Session {
    /// Writes `text` to the transport and journals it as `logged`. Every failure path ends in an
    /// [`EntryKind::Error`] entry and `false`.
    fn transmit(&self, journal: &mut Journal, text: String, logged: String) -> bool {
        let transport = match (&self.state, &self.transport) {
            (SessionState::Connected, Some(transport)) => transport,
            _ => {
                journal.append(EntryKind::Error, NOT_CONNECTED, None);
                return false;
            }
        };

        match transport.send(text) {
            Ok(()) => {
                journal.append(EntryKind::Sent, logged, None);
                true
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %e, "Unable to send frame");
                journal.append(EntryKind::Error, format!("send failed: {e}"), None);
                false
            }
        }
    }

    fn transmit_json(&self, journal: &mut Journal, message: &WsMessage) -> bool {
        let value = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                journal.append(EntryKind::Error, format!("send failed: {e}"), None);
                return false;
            }
        };

        self.transmit(journal, value.to_string(), message::pretty(&value))
    }
}

/// Manages one WebSocket session: lifecycle, heartbeat and journal.
///
/// The manager is event driven. Transport callbacks and heartbeat ticks are queued on a single
/// channel and applied one at a time by [`Self::next_event`] (or [`Self::dispatch_pending`]), so
/// session state, heartbeat bookkeeping and the journal all live on one serial timeline and
/// need no locking. Operations never fail with an error: problems are recorded in the
/// [`Journal`] and in [`Self::last_error`], and sends report success as a `bool`.
///
/// # Example
///
/// ```rust,no_run
/// use codoc_session::ws::{ConnectionManager, SessionState};
///
/// #[tokio::main]
/// async fn main() {
///     let mut manager = ConnectionManager::default();
///     manager.connect("ws://localhost:8080/editor/42");
///
///     while manager.next_event().await != SessionState::Connected {}
///     manager.send_json("EDIT", "alice", serde_json::json!("hello"));
///
///     manager.disconnect();
///     println!("{}", manager.journal().export().contents);
/// }
/// ```
pub struct ConnectionManager<C: Connector = TungsteniteConnector> {
    config: Config,
    connector: C,
    session: Session,
    heartbeat: HeartbeatController,
    journal: Journal,
    on_close: Option<CloseCallback>,
    /// Id of the attempt whose events are currently accepted
    attempt: u64,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
}

impl Default for ConnectionManager<TungsteniteConnector> {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl ConnectionManager<TungsteniteConnector> {
    /// Create a manager that connects with `tokio-tungstenite`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_connector(config, TungsteniteConnector)
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager that opens transports through `connector`.
    #[must_use]
    pub fn with_connector(config: Config, connector: C) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            heartbeat: HeartbeatController::new(config.heartbeat_interval),
            journal: Journal::with_export_prefix(config.export_prefix.clone()),
            config,
            connector,
            session: Session::default(),
            on_close: None,
            attempt: 0,
            events_tx,
            events_rx,
        }
    }

    /// Opens a connection to `url` with default options.
    pub fn connect(&mut self, url: &str) {
        self.connect_with(url, ConnectOptions::default());
    }

    /// Opens a connection to `url`. Outcomes are reported through the journal and [`Self::state`];
    /// nothing is returned.
    ///
    /// While a connection is already open (or being opened) this only records a notice.
    pub fn connect_with(&mut self, url: &str, options: ConnectOptions) {
        match self.session.state {
            SessionState::Connected => {
                self.journal.append(
                    EntryKind::System,
                    "already connected, disconnect first",
                    None,
                );
                return;
            }
            SessionState::Connecting => {
                self.journal.append(
                    EntryKind::System,
                    "connection attempt already in progress, disconnect first",
                    None,
                );
                return;
            }
            SessionState::Disconnected => {}
        }

        self.journal
            .append(EntryKind::System, format!("connecting to {url}"), None);
        self.session.last_error = None;

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, "Connecting");

        let opened = Url::parse(url).map_err(crate::error::Error::from).and_then(|url| {
            self.attempt += 1;
            let sink = EventSink::new(self.attempt, self.events_tx.clone());
            self.connector.open(&url, sink)
        });

        match opened {
            Ok(transport) => {
                self.session.transport = Some(transport);
                self.session.state = SessionState::Connecting;
                self.on_close = options.on_close;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%url, error = %e, "Unable to open connection");
                let message = e.to_string();
                self.journal.append(
                    EntryKind::Error,
                    format!("connection failed: {message}"),
                    None,
                );
                self.session.last_error = Some(message);
            }
        }
    }

    /// Closes the connection if there is one. Calling it again is a no-op.
    ///
    /// The heartbeat is stopped before the transport is released, and the attempt is detached
    /// so nothing the transport reports afterwards reaches the session.
    pub fn disconnect(&mut self) {
        self.heartbeat.reset();

        if let Some(transport) = self.session.transport.take() {
            transport.close(CLOSE_NORMAL, LOCAL_CLOSE_REASON);
            self.finish(CloseInfo::new(CLOSE_NORMAL, LOCAL_CLOSE_REASON));
        } else {
            self.session.state = SessionState::Disconnected;
        }
    }

    /// Sends `{type, sender, data}` as JSON. Returns `false`, with an error entry in the journal,
    /// when not connected or when the transport refuses the frame.
    pub fn send_json<T: Into<String>, S: Into<String>>(
        &mut self,
        message_type: T,
        sender: S,
        data: Value,
    ) -> bool {
        self.send_message(&WsMessage::new(message_type, sender, data))
    }

    /// Sends an already built [`WsMessage`].
    pub fn send_message(&mut self, message: &WsMessage) -> bool {
        self.session.transmit_json(&mut self.journal, message)
    }

    /// Sends `text` verbatim.
    pub fn send_raw<S: Into<String>>(&mut self, text: S) -> bool {
        let text = text.into();
        self.session
            .transmit(&mut self.journal, text.clone(), text)
    }

    /// Waits for the next transport event or heartbeat tick, applies it, and returns the
    /// resulting state.
    ///
    /// This is cancel safe: an event is only taken off the queue when it is applied.
    pub async fn next_event(&mut self) -> SessionState {
        if let Some(event) = self.events_rx.recv().await {
            self.dispatch(event);
        }
        self.session.state
    }

    /// Applies every event that is already queued without waiting. Returns how many were
    /// taken off the queue.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// Drives the event loop until the session is disconnected.
    pub async fn run_until_disconnected(&mut self) {
        while self.session.state != SessionState::Disconnected {
            self.next_event().await;
        }
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Transport { attempt, event } => {
                if attempt != self.attempt || self.session.transport.is_none() {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(attempt, ?event, "Dropping event from detached connection");
                    return;
                }
                match event {
                    ConnectionEvent::Open => self.on_open(),
                    ConnectionEvent::Message(text) => self.on_message(&text),
                    ConnectionEvent::Close(info) => self.on_closed(info),
                    ConnectionEvent::Error(message) => self.on_error(message),
                }
            }
            Event::HeartbeatTick { generation } => {
                if self.heartbeat.take_tick(generation)
                    && self.session.state == SessionState::Connected
                {
                    self.emit_probe();
                }
            }
        }
    }

    fn on_open(&mut self) {
        if self.session.state != SessionState::Connecting {
            return;
        }

        self.session.state = SessionState::Connected;
        self.journal
            .append(EntryKind::System, "connection established", None);

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = self.attempt, "Connected");

        let Self {
            heartbeat,
            session,
            journal,
            events_tx,
            ..
        } = self;
        heartbeat.start(events_tx, |probe| session.transmit_json(journal, probe));
    }

    fn on_message(&mut self, text: &str) {
        let decoded = message::decode(text);

        if self
            .heartbeat
            .classify(decoded.as_ref(), text, &mut self.journal)
        {
            return;
        }

        match decoded {
            Some(value) => {
                let content = message::pretty(&value);
                self.journal
                    .append(EntryKind::Received, content, Some(RawPayload::Json(value)));
            }
            None => {
                self.journal.append(
                    EntryKind::Received,
                    text,
                    Some(RawPayload::Text(text.to_owned())),
                );
            }
        }
    }

    fn on_closed(&mut self, info: CloseInfo) {
        self.heartbeat.reset();
        self.session.transport = None;
        self.finish(info);
    }

    fn on_error(&mut self, message: String) {
        #[cfg(feature = "tracing")]
        tracing::warn!(error = %message, "WebSocket error");

        self.journal
            .append(EntryKind::Error, format!("connection error: {message}"), None);
        self.session.last_error = Some(message);
    }

    /// Common tail of remote close and local disconnect, after the transport is released.
    fn finish(&mut self, info: CloseInfo) {
        self.session.state = SessionState::Disconnected;

        let reason = if info.reason.is_empty() {
            MISSING_REASON
        } else {
            info.reason.as_str()
        };
        self.journal.append(
            EntryKind::System,
            format!("connection closed (code: {}, reason: {reason})", info.code),
            None,
        );

        #[cfg(feature = "tracing")]
        tracing::debug!(code = info.code, reason = %info.reason, "Connection closed");

        if let Some(callback) = self.on_close.take() {
            callback(info);
        }
    }

    fn emit_probe(&mut self) {
        let Self {
            heartbeat,
            session,
            journal,
            ..
        } = self;
        heartbeat.emit_probe(|probe| session.transmit_json(journal, probe));
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.state == SessionState::Connected
    }

    /// Message of the most recent connection error, cleared by every [`Self::connect_with`].
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.session.last_error.as_deref()
    }

    #[must_use]
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Mutable access for [`Journal::clear`].
    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }

    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatController {
        &self.heartbeat
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }
}

impl<C: Connector + fmt::Debug> fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("connector", &self.connector)
            .field("state", &self.session.state)
            .field("last_error", &self.session.last_error)
            .field("attempt", &self.attempt)
            .field("journal_len", &self.journal.len())
            .finish_non_exhaustive()
    }
}
