// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Ticker-driven frame writer draining the ring into an opaque sink.
//!
//! The sink is the external encoder's stdin; the writer never learns
//! more about it than `AsyncWrite`. Failure policy per the error
//! taxonomy: transient write errors are logged (first five) and retried
//! next tick with the next frame; ten consecutive errors flip the
//! `connection_lost` flag once, fire the registered callback on a
//! detached task, and cease writes until the writer is started again.
//! A write success more than five seconds after the last error clears
//! the consecutive-error counter (connection recovered).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::ring::FrameRing;

/// Consecutive empty reads before a starvation warning (≈1 s at 30 Hz).
const EMPTY_WARN_TICKS: u32 = 30;
/// Consecutive write errors that flip `connection_lost`.
const CONNECTION_LOST_THRESHOLD: u32 = 10;
/// Write errors logged verbosely per session.
const LOGGED_ERRORS: u64 = 5;
/// Quiet period after the last error before a success clears the streak.
const RECOVERY_WINDOW: Duration = Duration::from_secs(5);
/// EMA smoothing factor for write time, as a divisor (α = 1/10).
const EMA_DIV: u64 = 10;
/// Every Nth slow frame gets logged.
const SLOW_LOG_EVERY: u64 = 30;

/// Callback fired at most once per session when the connection is lost.
pub type LostCallback = Box<dyn FnOnce() + Send + 'static>;

/// Point-in-time writer counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStats {
    /// Frames successfully written to the sink.
    pub frames_sent: u64,
    /// Total write errors this session.
    pub write_errors: u64,
    /// Current consecutive-error streak.
    pub consecutive_errors: u32,
    /// Whether the connection-lost latch is set.
    pub connection_lost: bool,
    /// Exponential moving average of write time, nanoseconds.
    pub avg_write_ns: u64,
    /// Writes slower than 3x the frame interval.
    pub slow_frames: u64,
}

#[derive(Debug)]
struct WriterShared {
    running: AtomicBool,
    frames_sent: AtomicU64,
    write_errors: AtomicU64,
    consecutive_errors: AtomicU32,
    connection_lost: AtomicBool,
    ema_write_ns: AtomicU64,
    slow_frames: AtomicU64,
    last_error_time: Mutex<Option<Instant>>,
}

impl WriterShared {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            frames_sent: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            consecutive_errors: AtomicU32::new(0),
            connection_lost: AtomicBool::new(false),
            ema_write_ns: AtomicU64::new(0),
            slow_frames: AtomicU64::new(0),
            last_error_time: Mutex::new(None),
        }
    }
}

/// Handle to the running frame-writer task.
pub struct FrameWriter {
    shared: Arc<WriterShared>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FrameWriter {
    /// Starts the writer at `fps`, draining `ring` into `sink`.
    ///
    /// Starting resets the connection-lost latch and the error streak.
    /// `on_lost` fires at most once for the lifetime of this session.
    pub fn start<S>(
        ring: Arc<FrameRing>,
        mut sink: S,
        fps: u32,
        mut on_lost: Option<LostCallback>,
    ) -> Self
    where
        S: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(WriterShared::new());
        shared.running.store(true, Ordering::SeqCst);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let frame_interval = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
            let slow_threshold = frame_interval * 3;
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut buf: Vec<u8> = Vec::with_capacity(ring.frame_size());
            let mut consecutive_empty = 0u32;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                if !ring.try_read(&mut buf) {
                    consecutive_empty += 1;
                    if consecutive_empty % EMPTY_WARN_TICKS == 0 {
                        warn!(consecutive_empty, "frame ring starved; renderer behind");
                    }
                    continue;
                }
                consecutive_empty = 0;

                let start = Instant::now();
                match sink.write_all(&buf).await {
                    Err(err) => {
                        let total = task_shared.write_errors.fetch_add(1, Ordering::Relaxed) + 1;
                        let streak =
                            task_shared.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                        if total <= LOGGED_ERRORS {
                            error!(?err, total, "frame write failed");
                        }
                        {
                            let mut last = task_shared
                                .last_error_time
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner);
                            *last = Some(Instant::now());
                        }
                        if streak >= CONNECTION_LOST_THRESHOLD
                            && task_shared
                                .connection_lost
                                .compare_exchange(
                                    false,
                                    true,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_ok()
                        {
                            warn!(streak, "connection lost; halting frame writes");
                            if let Some(cb) = on_lost.take() {
                                tokio::spawn(async move { cb() });
                            }
                            break;
                        }
                    }
                    Ok(()) => {
                        let elapsed = start.elapsed();
                        task_shared.frames_sent.fetch_add(1, Ordering::Relaxed);

                        if task_shared.consecutive_errors.load(Ordering::Relaxed) > 0 {
                            let recovered = {
                                let last = task_shared
                                    .last_error_time
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner);
                                last.is_some_and(|t| t.elapsed() > RECOVERY_WINDOW)
                            };
                            if recovered {
                                task_shared.consecutive_errors.store(0, Ordering::Relaxed);
                                info!("sink writes recovered; error streak cleared");
                            }
                        }

                        let sample = elapsed.as_nanos() as u64;
                        let old = task_shared.ema_write_ns.load(Ordering::Relaxed);
                        let ema = if old == 0 {
                            sample
                        } else {
                            old - old / EMA_DIV + sample / EMA_DIV
                        };
                        task_shared.ema_write_ns.store(ema, Ordering::Relaxed);

                        if elapsed > slow_threshold {
                            let slow =
                                task_shared.slow_frames.fetch_add(1, Ordering::Relaxed) + 1;
                            if slow % SLOW_LOG_EVERY == 0 {
                                warn!(slow, ema_ns = ema, "frame writes running slow");
                            }
                        }
                    }
                }
            }
            task_shared.running.store(false, Ordering::SeqCst);
            debug!("frame writer task exited");
        });

        Self {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Signals the stop channel and waits for the task; the in-flight
    /// write completes first.
    pub async fn stop(&self) {
        let tx = {
            let mut slot = self
                .stop_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }
        let task = {
            let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Whether the writer task is alive.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Whether the connection-lost latch is set.
    pub fn connection_lost(&self) -> bool {
        self.shared.connection_lost.load(Ordering::Acquire)
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> WriterStats {
        WriterStats {
            frames_sent: self.shared.frames_sent.load(Ordering::Relaxed),
            write_errors: self.shared.write_errors.load(Ordering::Relaxed),
            consecutive_errors: self.shared.consecutive_errors.load(Ordering::Relaxed),
            connection_lost: self.shared.connection_lost.load(Ordering::Acquire),
            avg_write_ns: self.shared.ema_write_ns.load(Ordering::Relaxed),
            slow_frames: self.shared.slow_frames.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Context, Poll};

    /// Sink that fails the first `fail_count` writes, then succeeds.
    struct FlakySink {
        fail_count: usize,
        attempts: Arc<AtomicUsize>,
    }

    impl AsyncWrite for FlakySink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_count {
                Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe down")))
            } else {
                Poll::Ready(Ok(buf.len()))
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn full_ring(capacity: usize, frames: usize) -> Arc<FrameRing> {
        let ring = Arc::new(FrameRing::new(capacity, 4));
        for i in 0..frames {
            assert!(ring.try_write(&[i as u8; 4]));
        }
        ring
    }

    #[tokio::test(start_paused = true)]
    async fn ten_consecutive_errors_flip_connection_lost_once() {
        let ring = full_ring(16, 15);
        let fired = Arc::new(AtomicUsize::new(0));
        let cb_fired = Arc::clone(&fired);
        let sink = FlakySink {
            fail_count: usize::MAX,
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let writer = FrameWriter::start(
            Arc::clone(&ring),
            sink,
            30,
            Some(Box::new(move || {
                cb_fired.fetch_add(1, Ordering::SeqCst);
            })),
        );

        // paused-clock auto-advance drives the ticker
        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(34)).await;
            if writer.connection_lost() {
                break;
            }
        }
        assert!(writer.connection_lost());
        let stats = writer.stats();
        assert_eq!(stats.consecutive_errors, 10);
        assert_eq!(stats.write_errors, 10);
        assert_eq!(stats.frames_sent, 0);

        // no further reads once the latch is set
        let drained = ring.frames_read();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ring.frames_read(), drained);

        writer.stop().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1, "callback fired once");
    }

    #[tokio::test(start_paused = true)]
    async fn error_streak_clears_only_after_quiet_window() {
        let ring = full_ring(16, 4);
        let sink = FlakySink {
            fail_count: 3,
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let writer = FrameWriter::start(Arc::clone(&ring), sink, 30, None);

        // three failures, then the first success lands inside the window
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_millis(34)).await;
        }
        let stats = writer.stats();
        assert_eq!(stats.write_errors, 3);
        assert!(stats.frames_sent >= 1);
        assert_eq!(
            stats.consecutive_errors, 3,
            "streak persists until the quiet window elapses"
        );

        // feed frames across the five-second window
        for i in 0..170u32 {
            let _ = ring.try_write(&[i as u8; 4]);
            tokio::time::sleep(Duration::from_millis(34)).await;
        }
        assert_eq!(writer.stats().consecutive_errors, 0, "streak cleared");
        assert!(!writer.connection_lost());

        writer.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn drains_frames_in_order() {
        let ring = full_ring(16, 6);
        let sink = FlakySink {
            fail_count: 0,
            attempts: Arc::new(AtomicUsize::new(0)),
        };
        let writer = FrameWriter::start(Arc::clone(&ring), sink, 30, None);
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(34)).await;
        }
        assert_eq!(writer.stats().frames_sent, 6);
        assert_eq!(ring.available(), 0);
        writer.stop().await;
        assert!(!writer.is_running());
    }
}
