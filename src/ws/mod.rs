//! WebSocket session engine.
//!
//! This module owns a single client-side connection and everything that happens on it.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: connection lifecycle, outbound sends, routing of inbound frames
//! - [`HeartbeatController`]: periodic PING probes, probe-response classification, latency
//! - [`transport`]: the [`Connector`] / [`Transport`] seam and its `tokio-tungstenite`
//!   implementation
//! - [`crate::journal::Journal`]: where every frame and lifecycle notice ends up
//!
//! # Example
//!
//! ```rust,no_run
//! use codoc_session::ws::{ConnectOptions, ConnectionManager};
//!
//! # async fn run() {
//! let mut manager = ConnectionManager::default();
//! manager.connect_with(
//!     "ws://localhost:8080/editor/42?token=abc",
//!     ConnectOptions::default().on_close(|info| eprintln!("closed with {}", info.code)),
//! );
//! manager.run_until_disconnected().await;
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod heartbeat;
pub mod message;
pub mod transport;

pub use connection::{CloseCallback, ConnectOptions, ConnectionManager, SessionState};
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use heartbeat::{HeartbeatController, RESPONSE_RULES, ResponseRule};
pub use message::WsMessage;
pub use transport::{
    CloseInfo, ConnectionEvent, Connector, EventSink, Transport, TungsteniteConnector,
};
