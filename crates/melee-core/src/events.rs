// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Bounded append-only event log.
//!
//! Many emitters (kernel tick, combat, join/leave paths), one batcher.
//! Sequence numbers are assigned atomically at emit time, so retained
//! events are always in sequence order; under backpressure events drop at
//! the source (`emit` returns `false`) but never out of order. The batcher
//! drains the queue and appends newline-delimited JSON to a 0644 file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::constants::{EVENT_QUEUE_CAPACITY, EVENT_RATE_BURST, EVENT_RATE_PER_SEC};

/// Closed set of event kinds, encoded as small integers on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// One per tick: seed and population.
    Tick,
    /// Damage landed.
    Damage,
    /// A kill was credited.
    Kill,
    /// An agent joined.
    Join,
    /// An agent was removed.
    Leave,
    /// A dead agent rejoined.
    Respawn,
    /// A weapon purchase.
    Purchase,
}

impl EventType {
    /// Wire code for the NDJSON `type` field.
    pub fn code(self) -> u8 {
        match self {
            EventType::Tick => 1,
            EventType::Damage => 2,
            EventType::Kill => 3,
            EventType::Join => 4,
            EventType::Leave => 5,
            EventType::Respawn => 6,
            EventType::Purchase => 7,
        }
    }
}

/// One logged event, in the on-disk field layout.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Format version.
    pub version: u8,
    /// [`EventType`] wire code.
    #[serde(rename = "type")]
    pub ty: u8,
    /// Unix nanoseconds at emit time.
    pub timestamp: u64,
    /// Monotonic sequence, assigned at emit.
    pub sequence: u64,
    /// Tick the event belongs to.
    #[serde(rename = "tickNum")]
    pub tick_num: u64,
    /// Acting player id; 0 for system events.
    #[serde(rename = "playerId")]
    pub player_id: u32,
    /// Event-specific body.
    pub payload: serde_json::Value,
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    fn take(&mut self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * EVENT_RATE_PER_SEC).min(EVENT_RATE_BURST);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// MP/SC emit half of the event log.
#[derive(Debug)]
pub struct EventLog {
    seq: AtomicU64,
    tx: mpsc::Sender<Event>,
    limiters: Mutex<HashMap<u32, TokenBucket>>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl EventLog {
    /// Creates the log and the receiver half the batcher drains.
    pub fn channel() -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (
            Self {
                seq: AtomicU64::new(0),
                tx,
                limiters: Mutex::new(HashMap::new()),
                emitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Emits one event.
    ///
    /// Returns `false` when the per-player rate limit rejects it or the
    /// queue is full; both drop silently at the source per the
    /// exhaustion policy. System events (`player_id == 0`) bypass the
    /// rate limit so TICK records are gapless.
    pub fn emit(
        &self,
        ty: EventType,
        tick_num: u64,
        player_id: u32,
        payload: serde_json::Value,
    ) -> bool {
        if player_id != 0 && !self.allow(player_id) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let sequence = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let event = Event {
            version: 1,
            ty: ty.code(),
            timestamp: unix_ns(),
            sequence,
            tick_num,
            player_id,
            payload,
        };
        match self.tx.try_send(event) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn allow(&self, player_id: u32) -> bool {
        let now = Instant::now();
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        limiters
            .entry(player_id)
            .or_insert_with(|| TokenBucket {
                tokens: EVENT_RATE_BURST,
                last: now,
            })
            .take(now)
    }

    /// Events accepted since startup.
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Events dropped by rate limiting or backpressure.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains the event queue and appends NDJSON to `path`.
///
/// Flushes buffered lines every 250 ms; exits after the final flush when
/// every [`EventLog`] sender is dropped. The file is created 0644,
/// append-only.
pub async fn run_batcher(mut rx: mpsc::Receiver<Event>, path: PathBuf) -> std::io::Result<()> {
    let mut opts = tokio::fs::OpenOptions::new();
    opts.create(true).append(true);
    #[cfg(unix)]
    opts.mode(0o644);
    let mut file = opts.open(&path).await?;

    let mut buf: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut flush = tokio::time::interval(std::time::Duration::from_millis(250));
    flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = flush.tick() => {
                if !buf.is_empty() {
                    file.write_all(&buf).await?;
                    buf.clear();
                }
            }
            event = rx.recv() => match event {
                Some(event) => {
                    if let Err(err) = serde_json::to_writer(&mut buf, &event) {
                        warn!(?err, "event serialization failed; line skipped");
                    } else {
                        buf.push(b'\n');
                    }
                }
                None => {
                    if !buf.is_empty() {
                        file.write_all(&buf).await?;
                    }
                    file.flush().await?;
                    debug!(path = %path.display(), "event log batcher drained");
                    return Ok(());
                }
            }
        }
    }
}

fn unix_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos() as u64)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequences_are_monotonic() {
        let (log, mut rx) = EventLog::channel();
        for tick in 0..10 {
            assert!(log.emit(EventType::Tick, tick, 0, json!({"seed": tick})));
        }
        let mut last = 0;
        while let Ok(ev) = rx.try_recv() {
            assert!(ev.sequence > last);
            last = ev.sequence;
        }
        assert_eq!(last, 10);
    }

    #[test]
    fn per_player_rate_limit_drops() {
        let (log, _rx) = EventLog::channel();
        let mut accepted = 0;
        for i in 0..200 {
            if log.emit(EventType::Damage, i, 42, json!({})) {
                accepted += 1;
            }
        }
        // burst allows ~EVENT_RATE_BURST instantaneous events
        assert!(accepted <= EVENT_RATE_BURST as usize + 1);
        assert!(log.dropped() > 0);
    }

    #[test]
    fn system_events_bypass_rate_limit() {
        let (log, _rx) = EventLog::channel();
        for tick in 0..200 {
            assert!(log.emit(EventType::Tick, tick, 0, json!({})));
        }
    }

    #[test]
    fn queue_overflow_drops_at_source() {
        let (log, rx) = EventLog::channel();
        // hold the receiver without draining
        let mut accepted = 0u64;
        for tick in 0..(EVENT_QUEUE_CAPACITY as u64 + 100) {
            if log.emit(EventType::Tick, tick, 0, json!({})) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, EVENT_QUEUE_CAPACITY as u64);
        assert_eq!(log.dropped(), 100);
        drop(rx);
    }

    #[tokio::test]
    async fn batcher_writes_ndjson() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("melee-events-{}.ndjson", std::process::id()));
        let _ = tokio::fs::remove_file(&path).await;

        let (log, rx) = EventLog::channel();
        let task = tokio::spawn(run_batcher(rx, path.clone()));
        assert!(log.emit(EventType::Join, 1, 3, json!({"name": "ada"})));
        assert!(log.emit(EventType::Kill, 2, 3, json!({"victimID": 4})));
        drop(log);
        task.await.expect("join").expect("io");

        let body = tokio::fs::read_to_string(&path).await.expect("read");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(first["version"], 1);
        assert_eq!(first["type"], 4);
        assert_eq!(first["tickNum"], 1);
        assert_eq!(first["playerId"], 3);
        assert_eq!(first["payload"]["name"], "ada");
        let _ = tokio::fs::remove_file(&path).await;
    }
}
