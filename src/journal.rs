//! Ordered, append-only record of session traffic and lifecycle events.
//!
//! The [`Journal`] outlives individual connections: reconnecting keeps the existing entries until
//! [`Journal::clear`] is called. [`Journal::export`] renders the entries into a plain-text
//! [`ExportedLog`] that can be persisted with [`ExportedLog::save_in`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// File name prefix used for exported logs unless configured otherwise.
pub const DEFAULT_EXPORT_PREFIX: &str = "codoc-log";

/// Line separating two entries in an exported log.
pub const EXPORT_DELIMITER: &str = "\n\n---\n\n";

const EXPORT_TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Category of a [`LogEntry`].
#[non_exhaustive]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "UPPERCASE")]
pub enum EntryKind {
    /// Outbound frame written to the transport
    Sent,
    /// Inbound frame that was not a heartbeat response
    Received,
    /// Lifecycle or heartbeat notice
    System,
    /// Connection failure or rejected send
    Error,
}

/// Original payload kept alongside the rendered content of an entry.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    /// The frame decoded as JSON
    Json(Value),
    /// The frame as received, when it was not JSON
    Text(String),
}

/// One journal record.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonically increasing, starting at 1 after construction or [`Journal::clear`]
    pub id: u64,
    pub kind: EntryKind,
    /// Human-readable rendering, pretty-printed when the payload was JSON
    pub content: String,
    pub raw_payload: Option<RawPayload>,
    /// Wall-clock time at which the entry was appended
    pub timestamp: DateTime<Local>,
}

/// Plain-text rendering of a [`Journal`], ready to be written to disk.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedLog {
    /// `<prefix>-<epoch-millis>.txt`
    pub file_name: String,
    pub contents: String,
}

impl ExportedLog {
    /// Writes the log into `dir` under [`Self::file_name`] and returns the full path.
    pub fn save_in<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.contents)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = %path.display(), "Exported journal");

        Ok(path)
    }
}

/// Append-only log of [`LogEntry`] values in ascending `id` order.
#[derive(Debug, Clone)]
pub struct Journal {
    entries: Vec<LogEntry>,
    last_id: u64,
    export_prefix: String,
}

impl Default for Journal {
    fn default() -> Self {
        Self::with_export_prefix(DEFAULT_EXPORT_PREFIX)
    }
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_export_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            entries: Vec::new(),
            last_id: 0,
            export_prefix: prefix.into(),
        }
    }

    /// Appends an entry stamped with the current time and returns its id.
    pub fn append<S: Into<String>>(
        &mut self,
        kind: EntryKind,
        content: S,
        raw_payload: Option<RawPayload>,
    ) -> u64 {
        self.last_id += 1;
        let entry = LogEntry {
            id: self.last_id,
            kind,
            content: content.into(),
            raw_payload,
            timestamp: Local::now(),
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(id = entry.id, kind = %entry.kind, content = %entry.content, "Journal entry");

        self.entries.push(entry);
        self.last_id
    }

    /// Removes every entry; the next appended entry gets id 1.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_id = 0;
    }

    /// Renders the journal as `[timestamp] [KIND]\ncontent` blocks separated by
    /// [`EXPORT_DELIMITER`].
    #[must_use]
    pub fn export(&self) -> ExportedLog {
        let contents = self
            .entries
            .iter()
            .map(|entry| {
                format!(
                    "[{}] [{}]\n{}",
                    entry.timestamp.format(EXPORT_TIMESTAMP_FORMAT),
                    entry.kind,
                    entry.content
                )
            })
            .collect::<Vec<_>>()
            .join(EXPORT_DELIMITER);

        ExportedLog {
            file_name: format!(
                "{}-{}.txt",
                self.export_prefix,
                Utc::now().timestamp_millis()
            ),
            contents,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEntry> {
        self.entries.iter()
    }

    /// Entries with an id strictly greater than `id`.
    #[must_use]
    pub fn since(&self, id: u64) -> &[LogEntry] {
        let start = self.entries.partition_point(|entry| entry.id <= id);
        &self.entries[start..]
    }
}

impl<'journal> IntoIterator for &'journal Journal {
    type Item = &'journal LogEntry;
    type IntoIter = std::slice::Iter<'journal, LogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
