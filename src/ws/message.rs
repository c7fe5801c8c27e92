//! The `{type, sender, data}` envelope exchanged with the editor server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known values of the envelope `type` field.
pub mod types {
    /// A user edited the document
    pub const EDIT: &str = "EDIT";
    /// Full document content pushed to a newly joined user
    pub const SYNC: &str = "SYNC";
    /// Cursor position update
    pub const CURSOR: &str = "CURSOR";
    pub const USER_JOIN: &str = "USER_JOIN";
    pub const USER_LEAVE: &str = "USER_LEAVE";
    /// Current list of online users
    pub const USER_LIST: &str = "USER_LIST";
    pub const OPERATION: &str = "OPERATION";
    /// The document was deleted by its owner
    pub const DOC_DELETED: &str = "DOC_DELETED";
    /// Liveness probe
    pub const PING: &str = "PING";
    /// Liveness probe response
    pub const PONG: &str = "PONG";
}

/// Sender id used by the server for messages it originates.
pub const SENDER_SERVER: &str = "server";

/// Sender id used by this client for messages it originates on its own, i.e. heartbeats.
pub const SENDER_SYSTEM: &str = "system";

/// Structured message envelope.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub sender: String,
    pub data: Value,
}

impl WsMessage {
    #[must_use]
    pub fn new<T: Into<String>, S: Into<String>>(message_type: T, sender: S, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            sender: sender.into(),
            data,
        }
    }

    /// The standard liveness probe, `{"type":"PING","sender":"system","data":"ping"}`.
    #[must_use]
    pub fn probe() -> Self {
        Self::new(types::PING, SENDER_SYSTEM, Value::from("ping"))
    }
}

/// Best-effort JSON decode of an inbound text frame. Returns `None` for anything that is not
/// well-formed JSON.
#[must_use]
pub fn decode(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// Two-space indented rendering used for journal content.
#[must_use]
pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Reads a string field from a decoded object payload.
pub(crate) fn str_field<'value>(value: &'value Value, field: &str) -> Option<&'value str> {
    value.get(field).and_then(Value::as_str)
}
