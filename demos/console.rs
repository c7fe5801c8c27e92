//! Interactive console for an editor session.
//!
//! Connects to the document URL in `CODOC_WS_URL` (or a local default), prints every journal
//! entry as it is recorded and sends each line typed on stdin as a raw text frame.
//!
//! Commands:
//! - `/json TYPE DATA` sends `{"type": TYPE, "sender": "console", "data": DATA}`; DATA is parsed
//!   as JSON and falls back to a string
//! - `/clear` empties the journal
//! - `/export` writes the journal to the current directory
//! - `/quit` disconnects and exits
//!
//! Run with tracing enabled:
//! ```sh
//! RUST_LOG=info CODOC_WS_URL=ws://localhost:8080/editor/1 cargo run --example console --features tracing
//! ```

use codoc_session::WS_URL_VAR;
use codoc_session::ws::{ConnectOptions, ConnectionManager, SessionState};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::{info, warn};

const DEFAULT_URL: &str = "ws://localhost:8080/editor/1?token=dev&username=console";
const SENDER: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let url = std::env::var(WS_URL_VAR).unwrap_or_else(|_| DEFAULT_URL.to_owned());
    let mut manager = ConnectionManager::default();
    manager.connect_with(
        &url,
        ConnectOptions::default().on_close(|info| {
            info!(code = info.code, reason = %info.reason, "Session closed");
        }),
    );

    if manager.state() == SessionState::Disconnected {
        print_new_entries(&manager, 0);
        anyhow::bail!("unable to connect to {url}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last_seen = 0;

    loop {
        last_seen = print_new_entries(&manager, last_seen);

        tokio::select! {
            state = manager.next_event() => {
                if state == SessionState::Disconnected {
                    break;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle_line(&mut manager, line.trim()) {
                    break;
                }
            }
        }
    }

    manager.disconnect();
    print_new_entries(&manager, last_seen);

    Ok(())
}

/// Returns `false` when the console should exit.
fn handle_line(manager: &mut ConnectionManager, line: &str) -> bool {
    match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit", _) => return false,
        ("/clear", _) => manager.journal_mut().clear(),
        ("/export", _) => match manager.journal().export().save_in(".") {
            Ok(path) => info!(path = %path.display(), "Journal exported"),
            Err(e) => warn!(error = %e, "Unable to export journal"),
        },
        ("/json", rest) => {
            let (message_type, data) = rest.split_once(' ').unwrap_or((rest, ""));
            let data = serde_json::from_str(data).unwrap_or_else(|_| Value::from(data));
            manager.send_json(message_type, SENDER, data);
        }
        ("", _) => {}
        _ => {
            manager.send_raw(line);
        }
    }
    true
}

fn print_new_entries(manager: &ConnectionManager, mut last_seen: u64) -> u64 {
    // Ids restart after `/clear`
    if manager
        .journal()
        .last()
        .is_none_or(|entry| entry.id < last_seen)
    {
        last_seen = 0;
    }

    let entries = manager.journal().since(last_seen);
    for entry in entries {
        info!(
            time = %entry.timestamp.format("%H:%M:%S"),
            kind = %entry.kind,
            "{}",
            entry.content
        );
    }
    entries.last().map_or(last_seen, |entry| entry.id)
}
