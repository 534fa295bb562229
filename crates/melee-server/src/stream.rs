// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Stream lifecycle: encoder process + frame writer as one unit.
//!
//! The render loop always feeds the frame ring; starting the stream
//! spawns the encoder and the async writer draining the ring into its
//! stdin, stopping tears both down (writer first, which closes the
//! encoder's stdin and lets it flush). Connection loss recorded by the
//! writer is surfaced here for the status endpoint.
//!
//! The audio pipe is opened here, not at startup: the write end of a
//! FIFO blocks until a reader exists, and the reader is the encoder
//! this controller spawns. The open runs on a blocking task with a
//! timeout and fills the render loop's shared sink slot on success.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use melee_render::SharedAudioSink;
use melee_stream::{EncoderConfig, EncoderError, EncoderProcess, FrameRing, FrameWriter};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Status errors kept for the status endpoint.
const RECENT_ERRORS_KEPT: usize = 10;

/// Stream lifecycle failures.
#[derive(Debug, Error)]
pub enum StreamControlError {
    /// `start` while already streaming.
    #[error("stream already running")]
    AlreadyStreaming,
    /// Encoder spawn failure.
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

struct Active {
    writer: FrameWriter,
    encoder: EncoderProcess,
}

/// Deferred PCM hand-off: the path the encoder reads and the render
/// loop's sink slot, connected only while a stream is up.
pub struct AudioPipe {
    /// s16le source path handed to the encoder (FIFO or file).
    pub path: PathBuf,
    /// Slot the render loop writes the cue mix through.
    pub slot: SharedAudioSink,
}

/// Handle owning the encoder/writer pair.
pub struct StreamControl {
    encoder_cfg: EncoderConfig,
    ring: Arc<FrameRing>,
    audio: Option<AudioPipe>,
    active: tokio::sync::Mutex<Option<Active>>,
    recent_errors: Mutex<VecDeque<String>>,
}

/// Status payload for `/api/stream/status` and the WS hub.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStatus {
    /// Whether the encoder/writer pair is up.
    pub streaming: bool,
    /// Configured frame rate.
    pub fps: u32,
    /// Frames the writer pushed into the sink.
    pub frames_sent: u64,
    /// Frames the renderer put into the ring.
    pub frames_written: u64,
    /// Frames drained from the ring.
    pub frames_read: u64,
    /// Frames dropped by ring backpressure.
    pub frames_dropped: u64,
    /// Frames currently queued.
    pub buffered: usize,
    /// Sink write errors this session.
    pub write_errors: u64,
    /// Whether the connection-lost latch is set.
    pub connection_lost: bool,
    /// EMA of sink write time, milliseconds.
    pub avg_write_ms: f64,
    /// Most recent error lines (up to ten).
    pub recent_errors: Vec<String>,
}

impl StreamControl {
    /// Creates a stopped control for the given encoder geometry.
    pub fn new(
        encoder_cfg: EncoderConfig,
        ring: Arc<FrameRing>,
        audio: Option<AudioPipe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            encoder_cfg,
            ring,
            audio,
            active: tokio::sync::Mutex::new(None),
            recent_errors: Mutex::new(VecDeque::new()),
        })
    }

    fn push_error(&self, line: String) {
        let mut errors = self
            .recent_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if errors.len() == RECENT_ERRORS_KEPT {
            errors.pop_front();
        }
        errors.push_back(line);
    }

    /// Spawns the encoder and writer. Fails when already streaming or
    /// when the encoder cannot start.
    pub async fn start(self: &Arc<Self>) -> Result<(), StreamControlError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(StreamControlError::AlreadyStreaming);
        }
        let (encoder, stdin) = EncoderProcess::spawn(&self.encoder_cfg).inspect_err(|err| {
            self.push_error(format!("encoder spawn failed: {err}"));
        })?;
        let on_lost: melee_stream::LostCallback = {
            let control = Arc::clone(self);
            Box::new(move || {
                warn!("stream connection lost");
                control.push_error("connection lost after 10 consecutive write errors".into());
            })
        };
        let writer = FrameWriter::start(
            Arc::clone(&self.ring),
            stdin,
            self.encoder_cfg.fps,
            Some(on_lost),
        );
        *active = Some(Active { writer, encoder });
        if let Some(audio) = &self.audio {
            connect_audio_pipe(audio.path.clone(), Arc::clone(&audio.slot));
        }
        info!("stream started");
        Ok(())
    }

    /// Stops the stream; `false` when nothing was running.
    pub async fn stop(&self) -> bool {
        let taken = { self.active.lock().await.take() };
        let Some(active) = taken else {
            return false;
        };
        active.writer.stop().await;
        active.encoder.stop().await;
        if let Some(audio) = &self.audio {
            // the pipe's reader is gone; disconnect the cue mix
            let mut slot = audio.slot.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = None;
        }
        info!("stream stopped");
        true
    }

    /// Point-in-time status.
    pub async fn status(&self) -> StreamStatus {
        let (streaming, writer_stats) = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(a) => (true, Some(a.writer.stats())),
                None => (false, None),
            }
        };
        let w = writer_stats.unwrap_or_default();
        let recent_errors = {
            let errors = self
                .recent_errors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            errors.iter().cloned().collect()
        };
        StreamStatus {
            streaming,
            fps: self.encoder_cfg.fps,
            frames_sent: w.frames_sent,
            frames_written: self.ring.frames_written(),
            frames_read: self.ring.frames_read(),
            frames_dropped: self.ring.frames_dropped(),
            buffered: self.ring.available(),
            write_errors: w.write_errors,
            connection_lost: w.connection_lost,
            avg_write_ms: w.avg_write_ns as f64 / 1.0e6,
            recent_errors,
        }
    }
}

/// Opens the PCM path off the runtime and fills the sink slot.
///
/// A FIFO write-end open blocks until the encoder opens its read end,
/// so this runs detached on a blocking task with a timeout; on timeout
/// or error the cue mix simply stays disconnected.
fn connect_audio_pipe(path: PathBuf, slot: SharedAudioSink) {
    tokio::spawn(async move {
        let open = tokio::task::spawn_blocking({
            let path = path.clone();
            move || std::fs::OpenOptions::new().write(true).open(path)
        });
        match tokio::time::timeout(Duration::from_secs(5), open).await {
            Ok(Ok(Ok(file))) => {
                let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                *guard = Some(Box::new(file));
                info!(path = %path.display(), "audio pipe connected");
            }
            Ok(Ok(Err(err))) => {
                warn!(?err, path = %path.display(), "audio pipe open failed; cue mix disabled");
            }
            Ok(Err(err)) => warn!(?err, "audio pipe open task failed"),
            Err(_) => {
                warn!(path = %path.display(), "audio pipe open timed out; cue mix disabled");
            }
        }
    });
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn control() -> Arc<StreamControl> {
        control_with_audio(None)
    }

    fn control_with_audio(audio: Option<AudioPipe>) -> Arc<StreamControl> {
        let cfg = EncoderConfig {
            width: 4,
            height: 4,
            // a binary that exits immediately; stop() then reaps it
            ffmpeg_path: "true".into(),
            ..EncoderConfig::default()
        };
        StreamControl::new(
            cfg.clone(),
            Arc::new(FrameRing::new(16, cfg.frame_size())),
            audio,
        )
    }

    #[tokio::test]
    async fn stop_without_start_is_false() {
        let c = control();
        assert!(!c.stop().await);
        let status = c.status().await;
        assert!(!status.streaming);
        assert_eq!(status.frames_sent, 0);
    }

    #[tokio::test]
    async fn double_start_rejected() {
        let c = control();
        c.start().await.expect("first start");
        assert!(matches!(
            c.start().await,
            Err(StreamControlError::AlreadyStreaming)
        ));
        assert!(c.status().await.streaming);
        assert!(c.stop().await);
        assert!(!c.status().await.streaming);
    }

    #[tokio::test]
    async fn spawn_failure_is_recorded() {
        let cfg = EncoderConfig {
            ffmpeg_path: "/nonexistent/encoder-binary".into(),
            ..EncoderConfig::default()
        };
        let c = StreamControl::new(
            cfg.clone(),
            Arc::new(FrameRing::new(16, cfg.frame_size())),
            None,
        );
        assert!(c.start().await.is_err());
        let status = c.status().await;
        assert!(!status.streaming);
        assert_eq!(status.recent_errors.len(), 1);
    }

    #[tokio::test]
    async fn audio_slot_fills_on_start_and_clears_on_stop() {
        let path = std::env::temp_dir().join(format!("melee-audio-{}.pcm", std::process::id()));
        let _ = std::fs::write(&path, b"");
        let slot: SharedAudioSink = Arc::new(Mutex::new(None));
        let c = control_with_audio(Some(AudioPipe {
            path: path.clone(),
            slot: Arc::clone(&slot),
        }));

        c.start().await.expect("start");
        // the open runs on a detached task; a regular file connects fast
        let mut connected = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if slot.lock().expect("slot").is_some() {
                connected = true;
                break;
            }
        }
        assert!(connected, "sink slot never filled");

        assert!(c.stop().await);
        assert!(slot.lock().expect("slot").is_none(), "slot cleared on stop");
        let _ = std::fs::remove_file(&path);
    }
}
