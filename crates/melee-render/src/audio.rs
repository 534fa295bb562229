// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Synthesized audio cues mixed to interleaved s16le stereo PCM.
//!
//! The render loop triggers cues from snapshot transitions; the mixer
//! renders exactly one frame interval of samples per video frame so the
//! PCM stream stays in lockstep with the 44.1 kHz encoder input. Music
//! decode is an external collaborator; `volume`/`enabled` gate only the
//! cue mix.

use std::f32::consts::TAU;

/// Output sample rate, Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Simultaneous voice cap; extra triggers drop the oldest.
const MAX_VOICES: usize = 16;

/// Audio cue kinds, mapped from snapshot transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// An agent started attacking.
    Swing,
    /// An agent left the alive set.
    Hit,
    /// A new agent appeared.
    Spawn,
    /// The global kill counter advanced.
    Kill,
}

struct Patch {
    start_hz: f32,
    end_hz: f32,
    duration: f32,
    amp: f32,
}

fn patch(cue: Cue) -> Patch {
    match cue {
        Cue::Swing => Patch {
            start_hz: 880.0,
            end_hz: 320.0,
            duration: 0.09,
            amp: 0.25,
        },
        Cue::Hit => Patch {
            start_hz: 220.0,
            end_hz: 140.0,
            duration: 0.12,
            amp: 0.4,
        },
        Cue::Spawn => Patch {
            start_hz: 440.0,
            end_hz: 880.0,
            duration: 0.18,
            amp: 0.3,
        },
        Cue::Kill => Patch {
            start_hz: 110.0,
            end_hz: 55.0,
            duration: 0.35,
            amp: 0.5,
        },
    }
}

struct Voice {
    patch: Patch,
    t: f32,
    phase: f32,
}

/// Mixes triggered cues into per-frame PCM buffers.
pub struct AudioMixer {
    volume: f32,
    enabled: bool,
    fps: u32,
    frame_counter: u64,
    samples_emitted: u64,
    voices: Vec<Voice>,
    buf: Vec<i16>,
}

impl AudioMixer {
    /// Creates a mixer producing one frame interval of samples per call.
    pub fn new(fps: u32, volume: f32, enabled: bool) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            enabled,
            fps: fps.max(1),
            frame_counter: 0,
            samples_emitted: 0,
            voices: Vec::with_capacity(MAX_VOICES),
            buf: Vec::with_capacity((SAMPLE_RATE as usize / fps.max(1) as usize + 1) * 2),
        }
    }

    /// Queues a cue; ignored when audio is disabled.
    pub fn trigger(&mut self, cue: Cue) {
        if !self.enabled {
            return;
        }
        if self.voices.len() >= MAX_VOICES {
            self.voices.remove(0);
        }
        self.voices.push(Voice {
            patch: patch(cue),
            t: 0.0,
            phase: 0.0,
        });
    }

    /// Renders the next frame interval of interleaved stereo samples.
    ///
    /// The sample count varies by one between frames when the rate does
    /// not divide evenly, keeping the long-run stream exactly at
    /// 44.1 kHz.
    pub fn render_frame(&mut self) -> &[i16] {
        self.frame_counter += 1;
        let target = self.frame_counter * u64::from(SAMPLE_RATE) / u64::from(self.fps);
        let count = (target - self.samples_emitted) as usize;
        self.samples_emitted = target;

        self.buf.clear();
        let dt = 1.0 / SAMPLE_RATE as f32;
        for _ in 0..count {
            let mut sample = 0.0f32;
            for v in &mut self.voices {
                let progress = (v.t / v.patch.duration).min(1.0);
                let hz = v.patch.start_hz + (v.patch.end_hz - v.patch.start_hz) * progress;
                v.phase = (v.phase + hz * dt * TAU) % TAU;
                let envelope = (1.0 - progress).max(0.0);
                sample += v.phase.sin() * v.patch.amp * envelope;
                v.t += dt;
            }
            self.voices.retain(|v| v.t < v.patch.duration);
            let s = (sample * self.volume).clamp(-1.0, 1.0);
            let q = (s * f32::from(i16::MAX)) as i16;
            self.buf.push(q); // left
            self.buf.push(q); // right
        }
        &self.buf
    }

    /// Renders a frame and writes it little-endian to `sink`.
    pub fn write_frame(&mut self, sink: &mut impl std::io::Write) -> std::io::Result<()> {
        self.render_frame();
        // reborrow: render_frame holds &mut self
        let mut bytes = Vec::with_capacity(self.buf.len() * 2);
        for s in &self.buf {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        sink.write_all(&bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn frame_sample_counts_sum_to_rate() {
        let mut mixer = AudioMixer::new(30, 1.0, true);
        let total: usize = (0..30).map(|_| mixer.render_frame().len()).sum();
        assert_eq!(total, SAMPLE_RATE as usize * 2);
    }

    #[test]
    fn uneven_fps_keeps_long_run_rate() {
        let mut mixer = AudioMixer::new(24, 1.0, true);
        let total: usize = (0..24).map(|_| mixer.render_frame().len()).sum();
        assert_eq!(total, SAMPLE_RATE as usize * 2);
    }

    #[test]
    fn silence_without_cues() {
        let mut mixer = AudioMixer::new(30, 1.0, true);
        assert!(mixer.render_frame().iter().all(|&s| s == 0));
    }

    #[test]
    fn cue_produces_signal_then_decays() {
        let mut mixer = AudioMixer::new(30, 1.0, true);
        mixer.trigger(Cue::Kill);
        let first = mixer.render_frame();
        assert!(first.iter().any(|&s| s != 0));
        // the longest cue is 0.35 s; after a second it must be silent
        for _ in 0..30 {
            mixer.render_frame();
        }
        assert!(mixer.render_frame().iter().all(|&s| s == 0));
    }

    #[test]
    fn disabled_mixer_ignores_triggers() {
        let mut mixer = AudioMixer::new(30, 1.0, false);
        mixer.trigger(Cue::Swing);
        assert!(mixer.render_frame().iter().all(|&s| s == 0));
    }

    #[test]
    fn write_frame_emits_le_bytes() {
        let mut mixer = AudioMixer::new(30, 1.0, true);
        let mut sink = Vec::new();
        mixer.write_frame(&mut sink).unwrap();
        assert_eq!(sink.len(), 1470 * 2 * 2);
    }
}
