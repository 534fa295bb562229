// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! The periodic render task: snapshot in, frame into the ring, cues out.
//!
//! Double buffering: each iteration rasterizes into the back buffer and
//! publishes the front buffer (the one rendered last iteration) to the
//! frame ring with a non-blocking write; a full ring counts a dropped
//! frame and the loop carries on. The loop never touches simulation
//! state and never holds the snapshot guard while writing to the ring.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use melee_core::pool::SnapshotPool;
use melee_core::snapshot::GameSnapshot;
use melee_stream::FrameRing;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::audio::{AudioMixer, Cue};
use crate::scene::render_scene;

/// Kill cues fired per frame at most.
const MAX_KILL_CUES_PER_FRAME: u64 = 3;

/// Render geometry and audio knobs.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Frame width, px.
    pub width: u32,
    /// Frame height, px.
    pub height: u32,
    /// Frames per second; typically the tick rate.
    pub fps: u32,
    /// Cue mix volume in `[0, 1]`.
    pub music_volume: f32,
    /// Whether the cue mix is audible.
    pub music_enabled: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            music_volume: 0.7,
            music_enabled: true,
        }
    }
}

/// Byte sink receiving one frame interval of s16le PCM per video frame.
pub type AudioSink = Box<dyn std::io::Write + Send>;

/// Shared slot for the audio sink.
///
/// Opening the write end of a FIFO blocks until a reader exists, so the
/// sink cannot be opened before the encoder runs. The stream controller
/// fills this slot once the encoder is up and clears it on stop; while
/// it is empty the mixer still advances so cues stay on the frame
/// timeline.
pub type SharedAudioSink = Arc<Mutex<Option<AudioSink>>>;

/// Diffs consecutive snapshots into audio cues.
///
/// The first observed snapshot primes the sets without firing cues so a
/// restart does not open with a burst of spawn sounds.
struct CueTracker {
    primed: bool,
    attacking: HashSet<u32>,
    alive: HashSet<u32>,
    total_kills: u64,
}

impl CueTracker {
    fn new() -> Self {
        Self {
            primed: false,
            attacking: HashSet::new(),
            alive: HashSet::new(),
            total_kills: 0,
        }
    }

    fn observe(&mut self, snap: &GameSnapshot, mixer: &mut AudioMixer) {
        let now_attacking: HashSet<u32> = snap
            .agents
            .iter()
            .filter(|a| a.is_attacking)
            .map(|a| a.id)
            .collect();
        let now_alive: HashSet<u32> = snap
            .agents
            .iter()
            .filter(|a| !a.is_dead)
            .map(|a| a.id)
            .collect();

        if self.primed {
            for _ in now_attacking.difference(&self.attacking) {
                mixer.trigger(Cue::Swing);
            }
            for _ in now_alive.difference(&self.alive) {
                mixer.trigger(Cue::Spawn);
            }
            for _ in self.alive.difference(&now_alive) {
                mixer.trigger(Cue::Hit);
            }
            let kills = snap.total_kills.saturating_sub(self.total_kills);
            for _ in 0..kills.min(MAX_KILL_CUES_PER_FRAME) {
                mixer.trigger(Cue::Kill);
            }
        }

        self.primed = true;
        self.attacking = now_attacking;
        self.alive = now_alive;
        self.total_kills = snap.total_kills;
    }
}

/// Handle to the running render task.
pub struct RenderLoop {
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RenderLoop {
    /// Starts rendering snapshots from `pool` into `ring` at `cfg.fps`.
    ///
    /// `audio_sink`, when present, receives the PCM cue mix one frame
    /// interval at a time through whatever sink currently occupies the
    /// slot.
    pub fn start(
        pool: Arc<SnapshotPool>,
        ring: Arc<FrameRing>,
        cfg: RenderConfig,
        audio_sink: Option<SharedAudioSink>,
    ) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let width = cfg.width as usize;
            let height = cfg.height as usize;
            let frame_size = width * height * 4;
            debug_assert_eq!(frame_size, ring.frame_size(), "ring sized for the geometry");

            let mut frames = [vec![0u8; frame_size], vec![0u8; frame_size]];
            let mut active = 0usize;
            let mut tracker = CueTracker::new();
            let mut mixer = AudioMixer::new(
                cfg.fps,
                cfg.music_volume,
                cfg.music_enabled && audio_sink.is_some(),
            );
            let mut audio_errors = 0u64;

            let mut ticker =
                tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(cfg.fps.max(1))));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(width, height, fps = cfg.fps, "render loop started");

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                {
                    let snap = pool.acquire_read();
                    if snap.seq == 0 {
                        continue; // nothing published yet
                    }
                    tracker.observe(&snap, &mut mixer);
                    let back = 1 - active;
                    render_scene(&mut frames[back], width, height, &snap);
                }
                // guard dropped: publish outside any lock
                let _ = ring.try_write(&frames[active]);

                if let Some(slot) = &audio_sink {
                    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    match guard.as_mut() {
                        Some(sink) => {
                            if let Err(err) = mixer.write_frame(sink) {
                                audio_errors += 1;
                                if audio_errors <= 3 {
                                    warn!(?err, "audio sink write failed; disconnecting");
                                }
                                *guard = None;
                            }
                        }
                        // no reader yet: advance the mixer, discard samples
                        None => {
                            let _ = mixer.render_frame();
                        }
                    }
                }

                active = 1 - active;
            }
            debug!("render loop exited");
        });
        Self {
            stop_tx: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        }
    }

    /// Signals the ticker loop and waits for the task.
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
}
