// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! External encoder process management.
//!
//! Spawns `ffmpeg` reading raw RGBA frames on stdin at the configured
//! geometry and pushing FLV to the RTMP endpoint. Audio rides a second
//! input: a caller-provided s16le 44.1 kHz stereo source path (a FIFO
//! the audio mixer writes, or a file), or silent `anullsrc` when none is
//! configured — inherited extra file descriptors are not portable, so
//! the PCM hand-off is by path.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{info, warn};

/// Errors from encoder process management.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// The encoder binary failed to spawn.
    #[error("failed to spawn encoder: {0}")]
    Spawn(#[from] std::io::Error),
    /// The spawned process exposed no stdin pipe.
    #[error("encoder process has no stdin")]
    MissingStdin,
}

/// Encoder invocation parameters.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Frame width, px.
    pub width: u32,
    /// Frame height, px.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Video bitrate, kbit/s.
    pub bitrate_kbps: u32,
    /// RTMP (or any ffmpeg-writable) output URL.
    pub output_url: String,
    /// Optional s16le 44.1 kHz stereo PCM source path.
    pub audio_source: Option<PathBuf>,
    /// Encoder binary; `ffmpeg` on PATH by default.
    pub ffmpeg_path: String,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bitrate_kbps: 4500,
            output_url: "rtmp://localhost/live/stream".to_owned(),
            audio_source: None,
            ffmpeg_path: "ffmpeg".to_owned(),
        }
    }
}

impl EncoderConfig {
    /// Bytes per RGBA frame at this geometry.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Full ffmpeg argument vector.
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "warning".into(),
            // video: raw RGBA on stdin
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgba".into(),
            "-s".into(),
            format!("{}x{}", self.width, self.height),
            "-r".into(),
            self.fps.to_string(),
            "-i".into(),
            "-".into(),
        ];
        match &self.audio_source {
            Some(path) => {
                args.extend([
                    "-f".into(),
                    "s16le".into(),
                    "-ar".into(),
                    "44100".into(),
                    "-ac".into(),
                    "2".into(),
                    "-i".into(),
                    path.display().to_string(),
                ]);
            }
            None => {
                args.extend([
                    "-f".into(),
                    "lavfi".into(),
                    "-i".into(),
                    "anullsrc=channel_layout=stereo:sample_rate=44100".into(),
                ]);
            }
        }
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-tune".into(),
            "zerolatency".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-b:v".into(),
            format!("{}k", self.bitrate_kbps),
            "-g".into(),
            (self.fps * 2).to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-ar".into(),
            "44100".into(),
            "-f".into(),
            "flv".into(),
            self.output_url.clone(),
        ]);
        args
    }
}

/// A running encoder child process.
pub struct EncoderProcess {
    child: Child,
}

impl EncoderProcess {
    /// Spawns the encoder and hands back its stdin as the frame sink.
    pub fn spawn(cfg: &EncoderConfig) -> Result<(Self, ChildStdin), EncoderError> {
        let mut child = Command::new(&cfg.ffmpeg_path)
            .args(cfg.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child.stdin.take().ok_or(EncoderError::MissingStdin)?;
        info!(
            url = %cfg.output_url,
            geometry = format!("{}x{}@{}", cfg.width, cfg.height, cfg.fps),
            "encoder started"
        );
        Ok((Self { child }, stdin))
    }

    /// Waits briefly for a clean exit (the caller closed stdin first),
    /// then kills the process.
    pub async fn stop(mut self) {
        match tokio::time::timeout(Duration::from_secs(3), self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "encoder exited"),
            Ok(Err(err)) => warn!(?err, "encoder wait failed"),
            Err(_) => {
                warn!("encoder did not exit; killing");
                if let Err(err) = self.child.kill().await {
                    warn!(?err, "encoder kill failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_matches_rgba_geometry() {
        let cfg = EncoderConfig::default();
        assert_eq!(cfg.frame_size(), 1280 * 720 * 4);
    }

    #[test]
    fn args_describe_raw_rgba_to_flv() {
        let cfg = EncoderConfig {
            width: 640,
            height: 360,
            fps: 25,
            bitrate_kbps: 2500,
            output_url: "rtmp://example/live/key".into(),
            ..EncoderConfig::default()
        };
        let args = cfg.args();
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo"));
        assert!(joined.contains("-pix_fmt rgba"));
        assert!(joined.contains("-s 640x360"));
        assert!(joined.contains("-r 25"));
        assert!(joined.contains("-b:v 2500k"));
        assert!(joined.contains("anullsrc"), "silent audio when unset");
        assert!(joined.ends_with("rtmp://example/live/key"));
    }

    #[test]
    fn audio_source_path_replaces_anullsrc() {
        let cfg = EncoderConfig {
            audio_source: Some(PathBuf::from("/tmp/melee-audio.pcm")),
            ..EncoderConfig::default()
        };
        let joined = cfg.args().join(" ");
        assert!(joined.contains("-f s16le -ar 44100 -ac 2 -i /tmp/melee-audio.pcm"));
        assert!(!joined.contains("anullsrc"));
    }
}
