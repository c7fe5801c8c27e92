//! Liveness probing and heartbeat-response classification.
//!
//! While connected, the [`HeartbeatController`] sends [`WsMessage::probe`] once immediately and
//! then on every tick of its schedule. Inbound frames are offered to
//! [`HeartbeatController::classify`] before they reach the journal; frames recognised as probe
//! responses are consumed and produce a latency notice instead.
//!
//! # Response rules
//!
//! Servers answer probes in different ways, so recognition is heuristic. The rules in
//! [`RESPONSE_RULES`] are evaluated in order and the first match wins:
//!
//! 1. [`ResponseRule::PongType`]: a JSON frame whose `type` is `"PONG"`.
//! 2. [`ResponseRule::ServerPingWithPong`]: a JSON frame with `type` `"PING"`, `sender`
//!    `"server"` and a string `data` containing the word "pong" in any case.
//! 3. [`ResponseRule::PongWord`]: any frame whose text contains the standalone word "pong" in
//!    any case.
//!
//! The last rule is loose: it also matches ordinary application messages that
//! mention "pong" as a word. `"pongomatic"` does not match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::message::{self, SENDER_SERVER, WsMessage, types};
use super::transport::Event;
use crate::journal::{EntryKind, Journal};

static PONG_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bpong\b").expect("pong pattern is valid"));

/// One way of recognising a probe response.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseRule {
    PongType,
    ServerPingWithPong,
    PongWord,
}

/// Response rules in priority order.
pub const RESPONSE_RULES: [ResponseRule; 3] = [
    ResponseRule::PongType,
    ResponseRule::ServerPingWithPong,
    ResponseRule::PongWord,
];

impl ResponseRule {
    #[must_use]
    pub fn matches(self, decoded: Option<&Value>, raw: &str) -> bool {
        match self {
            Self::PongType => {
                decoded.and_then(|v| message::str_field(v, "type")) == Some(types::PONG)
            }
            Self::ServerPingWithPong => decoded.is_some_and(|v| {
                message::str_field(v, "type") == Some(types::PING)
                    && message::str_field(v, "sender") == Some(SENDER_SERVER)
                    && message::str_field(v, "data").is_some_and(|data| PONG_WORD.is_match(data))
            }),
            Self::PongWord => PONG_WORD.is_match(raw),
        }
    }
}

/// Cancels the ticker task when dropped, so a discarded controller never leaves a schedule behind.
#[derive(Debug)]
struct Schedule {
    token: CancellationToken,
    generation: u64,
    /// Set by the ticker when it queues a tick, cleared when the tick is taken. At most one tick
    /// is queued at a time.
    tick_pending: Arc<AtomicBool>,
}

impl Drop for Schedule {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Probe scheduling and response bookkeeping for one connection at a time.
#[derive(Debug)]
pub struct HeartbeatController {
    interval: Duration,
    schedule: Option<Schedule>,
    /// Bumped on every `start`; ticks carrying an older value are stale
    generation: u64,
    last_ping_sent_at: Option<Instant>,
    pending_latency: Option<Duration>,
}

impl HeartbeatController {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            schedule: None,
            generation: 0,
            last_ping_sent_at: None,
            pending_latency: None,
        }
    }

    /// Replaces any running schedule: sends one probe through `send` right away and then asks
    /// for a probe on every interval by queueing a tick on `ticks`.
    pub(crate) fn start<F>(&mut self, ticks: &mpsc::UnboundedSender<Event>, send: F)
    where
        F: FnOnce(&WsMessage) -> bool,
    {
        self.stop();
        self.last_ping_sent_at = None;
        self.pending_latency = None;
        self.generation += 1;

        self.emit_probe(send);

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let generation = self.generation;
        let period = self.interval;
        let ticks = ticks.clone();
        let tick_pending = Arc::new(AtomicBool::new(false));
        let queued = Arc::clone(&tick_pending);

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        // The owner has not caught up with the previous tick yet
                        if queued.swap(true, Ordering::AcqRel) {
                            continue;
                        }
                        if ticks.send(Event::HeartbeatTick { generation }).is_err() {
                            break;
                        }
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(generation, "Heartbeat schedule terminated");
        });

        self.schedule = Some(Schedule {
            token,
            generation,
            tick_pending,
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(generation, interval = ?self.interval, "Heartbeat schedule started");
    }

    /// Cancels the schedule. Safe to call repeatedly or when nothing is running.
    pub fn stop(&mut self) {
        if let Some(schedule) = self.schedule.take() {
            #[cfg(feature = "tracing")]
            tracing::debug!(generation = schedule.generation, "Stopping heartbeat schedule");
            drop(schedule);
        }
    }

    /// Whether a tick with this generation belongs to the running schedule.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.schedule
            .as_ref()
            .is_some_and(|schedule| schedule.generation == generation)
    }

    /// Takes a queued tick off the schedule, letting the ticker queue the next one. Returns
    /// whether the tick belongs to the running schedule.
    pub(crate) fn take_tick(&self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        if let Some(schedule) = &self.schedule {
            schedule.tick_pending.store(false, Ordering::Release);
        }
        true
    }

    /// Sends one probe through `send`. The measurement only starts when `send` reports success;
    /// a failed probe discards whatever measurement was still pending.
    pub(crate) fn emit_probe<F>(&mut self, send: F)
    where
        F: FnOnce(&WsMessage) -> bool,
    {
        let probe = WsMessage::probe();
        self.last_ping_sent_at = send(&probe).then(Instant::now);

        #[cfg(feature = "tracing")]
        if self.last_ping_sent_at.is_none() {
            tracing::warn!("Heartbeat probe could not be sent");
        }
    }

    /// The first rule in [`RESPONSE_RULES`] that matches the frame.
    #[must_use]
    pub fn matched_rule(decoded: Option<&Value>, raw: &str) -> Option<ResponseRule> {
        RESPONSE_RULES
            .into_iter()
            .find(|rule| rule.matches(decoded, raw))
    }

    /// Returns `true` when the frame is a probe response. Responses are reported to `journal`
    /// with the measured latency, or as unknown when no probe was outstanding.
    pub fn classify(&mut self, decoded: Option<&Value>, raw: &str, journal: &mut Journal) -> bool {
        let Some(rule) = Self::matched_rule(decoded, raw) else {
            return false;
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(?rule, "Heartbeat response recognised");
        #[cfg(not(feature = "tracing"))]
        let _ = &rule;

        match self.last_ping_sent_at.take() {
            Some(sent_at) => {
                let latency = Instant::now().saturating_duration_since(sent_at);
                self.pending_latency = Some(latency);
                journal.append(
                    EntryKind::System,
                    format!("heartbeat response, latency: {}ms", latency.as_millis()),
                    None,
                );
            }
            None => {
                journal.append(
                    EntryKind::System,
                    "heartbeat response, latency: unknown",
                    None,
                );
            }
        }

        true
    }

    /// Forgets the current measurement, used when the connection goes away.
    pub(crate) fn reset(&mut self) {
        self.stop();
        self.last_ping_sent_at = None;
        self.pending_latency = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.schedule.is_some()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn last_ping_sent_at(&self) -> Option<Instant> {
        self.last_ping_sent_at
    }

    /// Last measured round trip, if any response has been matched to a probe.
    #[must_use]
    pub fn pending_latency(&self) -> Option<Duration> {
        self.pending_latency
    }
}
