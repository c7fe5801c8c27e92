#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]
#![allow(
    unused,
    reason = "Not every test binary uses every helper"
)]

use std::sync::{Arc, Mutex};

use codoc_session::Result;
use codoc_session::error::Error;
use codoc_session::journal::{EntryKind, Journal};
use codoc_session::ws::config::Config;
use codoc_session::ws::{ConnectionManager, Connector, EventSink, Transport, WsError};
use url::Url;

pub const URL: &str = "ws://editor.test/editor/doc-1";

/// What the in-memory transport has been asked to do.
#[derive(Debug, Default)]
pub struct MockState {
    pub opened: Vec<String>,
    pub sinks: Vec<EventSink>,
    pub sent: Vec<String>,
    pub closed: Vec<(u16, String)>,
    pub refuse_open: bool,
    pub refuse_sends: bool,
}

/// Connector that never touches the network; tests drive events through its [`EventSink`]s.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Sink of the most recent attempt.
    pub fn sink(&self) -> EventSink {
        self.with(|state| state.sinks.last().cloned().unwrap())
    }

    pub fn opened(&self) -> Vec<String> {
        self.with(|state| state.opened.clone())
    }

    pub fn sent(&self) -> Vec<String> {
        self.with(|state| state.sent.clone())
    }

    pub fn closed(&self) -> Vec<(u16, String)> {
        self.with(|state| state.closed.clone())
    }
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn send(&self, text: String) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_sends {
            return Err(WsError::ConnectionClosed.into());
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .closed
            .push((code, reason.to_owned()));
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_open {
            return Err(Error::validation("connection refused"));
        }
        state.opened.push(url.to_string());
        state.sinks.push(events);

        Ok(Box::new(MockTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

pub fn manager() -> (ConnectionManager<MockConnector>, MockConnector) {
    let connector = MockConnector::default();
    let manager = ConnectionManager::with_connector(Config::default(), connector.clone());
    (manager, connector)
}

/// Manager whose mock connection has already reported `Open`.
pub fn connected() -> (ConnectionManager<MockConnector>, MockConnector) {
    let (mut manager, connector) = manager();
    manager.connect(URL);
    connector.sink().opened();
    manager.dispatch_pending();
    (manager, connector)
}

pub fn kinds(journal: &Journal) -> Vec<EntryKind> {
    journal.iter().map(|entry| entry.kind).collect()
}

pub fn count(journal: &Journal, kind: EntryKind) -> usize {
    journal.iter().filter(|entry| entry.kind == kind).count()
}
