#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use codoc_session::journal::{EntryKind, RawPayload};
use codoc_session::ws::{CloseInfo, ConnectOptions, SessionState};
use serde_json::{Value, json};
use tokio::time::{self, timeout};

use crate::common::{URL, connected, count, kinds, manager};

fn probe() -> Value {
    json!({ "type": "PING", "sender": "system", "data": "ping" })
}

mod lifecycle {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn open_starts_heartbeat_with_immediate_probe() {
        let (mut manager, connector) = manager();

        manager.connect(URL);
        assert_eq!(manager.state(), SessionState::Connecting);
        assert_eq!(connector.opened(), vec![URL.to_owned()]);
        assert!(!manager.heartbeat().is_running());

        connector.sink().opened();
        assert_eq!(manager.dispatch_pending(), 1);

        assert_eq!(manager.state(), SessionState::Connected);
        assert!(manager.heartbeat().is_running());
        assert!(manager.heartbeat().last_ping_sent_at().is_some());

        let sent = connector.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(serde_json::from_str::<Value>(&sent[0]).unwrap(), probe());

        assert_eq!(
            kinds(manager.journal()),
            vec![EntryKind::System, EntryKind::System, EntryKind::Sent]
        );
        assert_eq!(
            manager.journal().entries()[0].content,
            format!("connecting to {URL}")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn connect_while_connected_only_records_notice() {
        let (mut manager, connector) = connected();
        let before = manager.journal().len();

        manager.connect("ws://elsewhere.test/editor/2");

        assert_eq!(manager.journal().len(), before + 1);
        let notice = manager.journal().last().unwrap();
        assert_eq!(notice.kind, EntryKind::System);
        assert_eq!(notice.content, "already connected, disconnect first");
        assert_eq!(connector.opened().len(), 1);
        assert_eq!(manager.state(), SessionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_clears_last_error() {
        let (mut manager, connector) = manager();
        manager.connect(URL);
        connector.sink().error("refused");
        connector.sink().closed(CloseInfo::abnormal());
        manager.dispatch_pending();
        assert_eq!(manager.last_error(), Some("refused"));

        manager.connect(URL);

        assert_eq!(manager.last_error(), None);
        assert_eq!(connector.opened().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_recorded_not_raised() {
        let (mut manager, connector) = manager();
        manager.connect(URL);

        connector.sink().error("handshake failed");
        connector.sink().closed(CloseInfo::abnormal());
        manager.dispatch_pending();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(manager.last_error(), Some("handshake failed"));
        assert_eq!(count(manager.journal(), EntryKind::Error), 1);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "connection closed (code: 1006, reason: none)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn refused_open_leaves_session_disconnected() {
        let (mut manager, connector) = manager();
        connector.with(|state| state.refuse_open = true);

        manager.connect(URL);

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.last_error().unwrap().contains("connection refused"));
        assert_eq!(
            kinds(manager.journal()),
            vec![EntryKind::System, EntryKind::Error]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_url_never_reaches_connector() {
        let (mut manager, connector) = manager();

        manager.connect("not a url");

        assert!(connector.opened().is_empty());
        assert_eq!(manager.state(), SessionState::Disconnected);
        assert_eq!(manager.journal().last().unwrap().kind, EntryKind::Error);
        assert!(manager.last_error().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_close_resets_state_and_calls_back() {
        let (mut manager, connector) = manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_callback = Arc::clone(&seen);

        manager.connect_with(
            URL,
            ConnectOptions::default().on_close(move |info| {
                seen_by_callback.lock().unwrap().push(info);
            }),
        );
        connector.sink().opened();
        connector.sink().closed(CloseInfo::new(4001, "document deleted"));
        manager.dispatch_pending();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(!manager.heartbeat().is_running());
        assert_eq!(
            manager.journal().last().unwrap().content,
            "connection closed (code: 4001, reason: document deleted)"
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![CloseInfo::new(4001, "document deleted")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_twice_is_harmless() {
        let (mut manager, connector) = manager();
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = Arc::clone(&calls);
        manager.connect_with(
            URL,
            ConnectOptions::default().on_close(move |_| *counter.lock().unwrap() += 1),
        );
        connector.sink().opened();
        manager.dispatch_pending();

        manager.disconnect();
        let after_first = manager.journal().len();
        manager.disconnect();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(!manager.heartbeat().is_running());
        assert_eq!(manager.journal().len(), after_first);
        assert_eq!(connector.closed(), vec![(1000, "client disconnect".to_owned())]);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "connection closed (code: 1000, reason: client disconnect)"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_without_connection_is_noop() {
        let (mut manager, connector) = manager();

        manager.disconnect();

        assert_eq!(manager.state(), SessionState::Disconnected);
        assert!(manager.journal().is_empty());
        assert!(connector.closed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn events_after_disconnect_are_dropped() {
        let (mut manager, connector) = connected();
        let sink = connector.sink();
        manager.disconnect();
        let len = manager.journal().len();

        sink.message("late frame");
        sink.closed(CloseInfo::new(1000, "late close"));
        manager.dispatch_pending();

        assert_eq!(manager.journal().len(), len);
        assert_eq!(manager.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn journal_survives_reconnect() {
        let (mut manager, connector) = connected();
        manager.disconnect();
        let len = manager.journal().len();

        manager.connect(URL);
        connector.sink().opened();
        manager.dispatch_pending();

        assert!(manager.journal().len() > len);
        assert_eq!(manager.journal().entries()[0].id, 1);
        assert_eq!(manager.state(), SessionState::Connected);
    }
}

mod sending {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sends_fail_when_disconnected() {
        let (mut manager, connector) = manager();

        assert!(!manager.send_json("EDIT", "alice", json!("text")));
        assert_eq!(count(manager.journal(), EntryKind::Error), 1);
        assert!(!manager.send_raw("hello"));
        assert_eq!(count(manager.journal(), EntryKind::Error), 2);

        assert_eq!(manager.journal().len(), 2);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "not connected to server"
        );
        assert!(connector.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sends_fail_while_connecting() {
        let (mut manager, connector) = manager();
        manager.connect(URL);

        assert!(!manager.send_raw("too early"));
        assert!(connector.sent().is_empty());
        assert_eq!(manager.journal().last().unwrap().kind, EntryKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn send_json_is_pretty_printed_in_journal() {
        let (mut manager, connector) = connected();

        assert!(manager.send_json("EDIT", "alice", json!("hello")));

        let wire: Value = serde_json::from_str(connector.sent().last().unwrap()).unwrap();
        assert_eq!(wire, json!({ "type": "EDIT", "sender": "alice", "data": "hello" }));

        let entry = manager.journal().last().unwrap();
        assert_eq!(entry.kind, EntryKind::Sent);
        assert!(entry.content.contains("\n  \"type\": \"EDIT\""));
    }

    #[tokio::test(start_paused = true)]
    async fn send_raw_is_logged_verbatim() {
        let (mut manager, connector) = connected();

        assert!(manager.send_raw("{ not json"));

        assert_eq!(connector.sent().last().unwrap(), "{ not json");
        assert_eq!(manager.journal().last().unwrap().content, "{ not json");
    }

    #[tokio::test(start_paused = true)]
    async fn refused_send_reports_error() {
        let (mut manager, connector) = connected();
        connector.with(|state| state.refuse_sends = true);

        assert!(!manager.send_raw("hello"));
        assert_eq!(manager.journal().last().unwrap().kind, EntryKind::Error);
    }
}

mod inbound {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn structured_frame_is_pretty_printed() {
        let (mut manager, connector) = connected();

        connector
            .sink()
            .message(r#"{"type":"SYNC","sender":"server","data":"doc body"}"#);
        manager.dispatch_pending();

        let entry = manager.journal().last().unwrap();
        assert_eq!(entry.kind, EntryKind::Received);
        assert!(entry.content.starts_with("{\n  "));
        assert_eq!(
            entry.raw_payload,
            Some(RawPayload::Json(
                json!({ "type": "SYNC", "sender": "server", "data": "doc body" })
            ))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn plain_text_frame_is_kept_raw() {
        let (mut manager, connector) = connected();

        connector.sink().message("hello world");
        manager.dispatch_pending();

        let entry = manager.journal().last().unwrap();
        assert_eq!(entry.kind, EntryKind::Received);
        assert_eq!(entry.content, "hello world");
        assert_eq!(
            entry.raw_payload,
            Some(RawPayload::Text("hello world".to_owned()))
        );
        assert_eq!(count(manager.journal(), EntryKind::Error), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn frames_are_journaled_in_delivery_order() {
        let (mut manager, connector) = connected();
        let sink = connector.sink();

        sink.message("first");
        sink.message("second");
        sink.message("third");
        manager.dispatch_pending();

        let received: Vec<&str> = manager
            .journal()
            .iter()
            .filter(|entry| entry.kind == EntryKind::Received)
            .map(|entry| entry.content.as_str())
            .collect();
        assert_eq!(received, vec!["first", "second", "third"]);
    }
}

mod heartbeat {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pong_reports_latency_and_is_not_received_traffic() {
        let (mut manager, connector) = connected();
        let sent_at = manager.heartbeat().last_ping_sent_at().unwrap();

        time::advance(Duration::from_millis(250)).await;
        connector.sink().message(r#"{"type":"PONG"}"#);
        manager.dispatch_pending();

        assert_eq!(
            manager.heartbeat().pending_latency(),
            Some(time::Instant::now() - sent_at)
        );
        assert_eq!(
            manager.heartbeat().pending_latency(),
            Some(Duration::from_millis(250))
        );
        assert!(manager.heartbeat().last_ping_sent_at().is_none());
        assert_eq!(count(manager.journal(), EntryKind::Received), 0);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "heartbeat response, latency: 250ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn server_ping_with_pong_is_a_response() {
        let (mut manager, connector) = connected();

        connector
            .sink()
            .message(r#"{"type":"PING","sender":"server","data":"server pong ack"}"#);
        manager.dispatch_pending();

        assert_eq!(count(manager.journal(), EntryKind::Received), 0);
        assert!(manager.heartbeat().pending_latency().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_word_in_text_is_a_response_but_pongomatic_is_not() {
        let (mut manager, connector) = connected();

        connector.sink().message("pongomatic");
        connector.sink().message("hello pong world");
        manager.dispatch_pending();

        let received: Vec<&str> = manager
            .journal()
            .iter()
            .filter(|entry| entry.kind == EntryKind::Received)
            .map(|entry| entry.content.as_str())
            .collect();
        assert_eq!(received, vec!["pongomatic"]);
        assert!(manager.heartbeat().pending_latency().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn pong_without_probe_reports_unknown_latency() {
        let (mut manager, connector) = manager();
        connector.with(|state| state.refuse_sends = true);
        manager.connect(URL);
        connector.sink().opened();
        manager.dispatch_pending();
        // The opening probe could not be sent, so nothing is being measured
        assert!(manager.heartbeat().last_ping_sent_at().is_none());

        connector.sink().message(r#"{"type":"PONG"}"#);
        manager.dispatch_pending();

        assert_eq!(manager.state(), SessionState::Connected);
        assert_eq!(manager.heartbeat().pending_latency(), None);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "heartbeat response, latency: unknown"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_interval_probe_discards_pending_measurement() {
        let (mut manager, connector) = connected();
        assert!(manager.heartbeat().last_ping_sent_at().is_some());

        connector.with(|state| state.refuse_sends = true);
        timeout(Duration::from_secs(6), manager.next_event())
            .await
            .unwrap();
        assert!(manager.heartbeat().last_ping_sent_at().is_none());
        assert_eq!(count(manager.journal(), EntryKind::Error), 1);

        time::advance(Duration::from_millis(100)).await;
        connector.sink().message(r#"{"type":"PONG"}"#);
        manager.dispatch_pending();

        assert_eq!(manager.heartbeat().pending_latency(), None);
        assert_eq!(
            manager.journal().last().unwrap().content,
            "heartbeat response, latency: unknown"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_owner_gets_one_probe_not_a_burst() {
        let (mut manager, connector) = connected();

        time::sleep(Duration::from_secs(31)).await;
        manager.dispatch_pending();

        // Opening probe plus a single catch-up probe
        assert_eq!(connector.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_repeat_on_interval() {
        let (mut manager, connector) = connected();
        assert_eq!(connector.sent().len(), 1);

        let state = timeout(Duration::from_secs(6), manager.next_event())
            .await
            .unwrap();

        assert_eq!(state, SessionState::Connected);
        let sent = connector.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(serde_json::from_str::<Value>(&sent[1]).unwrap(), probe());
    }

    #[tokio::test(start_paused = true)]
    async fn no_probe_after_close() {
        let (mut manager, connector) = connected();
        connector.sink().closed(CloseInfo::new(1001, "going away"));
        manager.dispatch_pending();

        time::sleep(Duration::from_secs(12)).await;
        manager.dispatch_pending();

        assert_eq!(connector.sent().len(), 1);
        assert!(manager.heartbeat().last_ping_sent_at().is_none());
    }
}

mod journal {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn clear_then_append_restarts_ids() {
        let (mut manager, _connector) = connected();
        assert!(!manager.journal().is_empty());

        manager.journal_mut().clear();
        manager.send_raw("after clear");

        assert_eq!(manager.journal().len(), 1);
        assert_eq!(manager.journal().entries()[0].id, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn export_has_one_block_per_entry() {
        let (mut manager, connector) = connected();
        connector.sink().message("hello");
        manager.dispatch_pending();
        let len = manager.journal().len();

        let exported = manager.journal().export();

        assert_eq!(
            exported
                .contents
                .split(codoc_session::journal::EXPORT_DELIMITER)
                .count(),
            len
        );
        assert!(exported.file_name.starts_with("codoc-log-"));
        assert!(exported.file_name.ends_with(".txt"));
        assert_eq!(manager.journal().len(), len);
    }
}
