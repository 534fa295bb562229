// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Server configuration: CLI flags over environment over defaults.
//!
//! Every knob reads its environment variable (`STREAM_WIDTH`,
//! `STREAM_HEIGHT`, `STREAM_FPS`, `STREAM_BITRATE`, `MUSIC_VOLUME`,
//! `MUSIC_ENABLED`, `PORT`, `MAX_PLAYERS`, `KICK_CHATROOM_ID`); a CLI
//! flag, when given, wins. Invalid values are startup failures and exit
//! the process non-zero.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

/// Command-line flags. Anything unset falls back to env, then defaults.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "melee arena stream server")]
pub struct Args {
    /// HTTP listen port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Stream width, px.
    #[arg(long)]
    pub width: Option<u32>,
    /// Stream height, px.
    #[arg(long)]
    pub height: Option<u32>,
    /// Stream frame rate (also the simulation tick rate).
    #[arg(long)]
    pub fps: Option<u32>,
    /// Video bitrate, kbit/s.
    #[arg(long)]
    pub bitrate: Option<u32>,
    /// Active player cap.
    #[arg(long)]
    pub max_players: Option<usize>,
    /// RTMP output URL for the encoder.
    #[arg(long, default_value = "rtmp://localhost/live/stream")]
    pub rtmp_url: String,
    /// Event-log output path (NDJSON, append-only).
    #[arg(long, default_value = "melee-events.ndjson")]
    pub event_log: PathBuf,
    /// Optional s16le PCM path (FIFO or file) fed to the encoder.
    #[arg(long)]
    pub audio_pipe: Option<PathBuf>,
    /// Simulation seed; fixed seeds reproduce runs.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Disable per-request logging.
    #[arg(long)]
    pub quiet_http: bool,
}

/// A config value failed to parse.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable held an unusable value.
    #[error("invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Resolved runtime configuration, constructed once in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// Stream width, px.
    pub width: u32,
    /// Stream height, px.
    pub height: u32,
    /// Frame rate and tick rate.
    pub fps: u32,
    /// Video bitrate, kbit/s.
    pub bitrate_kbps: u32,
    /// Cue-mix volume in `[0, 1]`.
    pub music_volume: f32,
    /// Whether the cue mix is audible.
    pub music_enabled: bool,
    /// Active player cap.
    pub max_players: usize,
    /// Chatroom id for the platform listener; `None` leaves it disabled.
    pub kick_chatroom_id: Option<u64>,
    /// RTMP output URL.
    pub rtmp_url: String,
    /// Event-log path.
    pub event_log: PathBuf,
    /// Optional PCM hand-off path.
    pub audio_pipe: Option<PathBuf>,
    /// Simulation seed.
    pub seed: u64,
    /// Per-request logging toggle.
    pub log_requests: bool,
}

impl Config {
    /// Resolves config from `args` and the process environment.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        Self::resolve(args, |key| std::env::var(key).ok())
    }

    /// Resolution seam: `lookup` stands in for the environment.
    pub fn resolve(
        args: &Args,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let width = pick(args.width, parsed(&lookup, "STREAM_WIDTH")?, 1280);
        let height = pick(args.height, parsed(&lookup, "STREAM_HEIGHT")?, 720);
        let fps = pick(args.fps, parsed(&lookup, "STREAM_FPS")?, 30);
        let bitrate_kbps = pick(args.bitrate, parsed(&lookup, "STREAM_BITRATE")?, 4500);
        let music_volume = parsed(&lookup, "MUSIC_VOLUME")?.unwrap_or(0.7f32);
        let music_enabled = parse_bool(&lookup, "MUSIC_ENABLED")?.unwrap_or(true);
        let port = pick(args.port, parsed(&lookup, "PORT")?, 8080);
        let max_players = pick(args.max_players, parsed(&lookup, "MAX_PLAYERS")?, 100);
        let kick_chatroom_id = parsed(&lookup, "KICK_CHATROOM_ID")?;

        if width == 0 || height == 0 {
            return Err(ConfigError::Invalid {
                key: "STREAM_WIDTH",
                value: format!("{width}x{height}"),
            });
        }
        if fps == 0 {
            return Err(ConfigError::Invalid {
                key: "STREAM_FPS",
                value: "0".to_owned(),
            });
        }

        Ok(Self {
            port,
            width,
            height,
            fps,
            bitrate_kbps,
            music_volume: music_volume.clamp(0.0, 1.0),
            music_enabled,
            max_players,
            kick_chatroom_id,
            rtmp_url: args.rtmp_url.clone(),
            event_log: args.event_log.clone(),
            audio_pipe: args.audio_pipe.clone(),
            seed: args.seed.unwrap_or(0x6d65_6c65_6521),
            log_requests: !args.quiet_http,
        })
    }
}

fn pick<T>(cli: Option<T>, env: Option<T>, default: T) -> T {
    cli.or(env).unwrap_or(default)
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = Config::resolve(&Args::default(), env(&[])).expect("config");
        assert_eq!(cfg.width, 1280);
        assert_eq!(cfg.height, 720);
        assert_eq!(cfg.fps, 30);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.max_players, 100);
        assert!(cfg.music_enabled);
        assert!(cfg.kick_chatroom_id.is_none());
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = Config::resolve(
            &Args::default(),
            env(&[
                ("STREAM_WIDTH", "1920"),
                ("STREAM_HEIGHT", "1080"),
                ("STREAM_FPS", "24"),
                ("STREAM_BITRATE", "6000"),
                ("MUSIC_ENABLED", "false"),
                ("PORT", "9000"),
                ("MAX_PLAYERS", "50"),
                ("KICK_CHATROOM_ID", "12345"),
            ]),
        )
        .expect("config");
        assert_eq!(cfg.width, 1920);
        assert_eq!(cfg.height, 1080);
        assert_eq!(cfg.fps, 24);
        assert_eq!(cfg.bitrate_kbps, 6000);
        assert!(!cfg.music_enabled);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_players, 50);
        assert_eq!(cfg.kick_chatroom_id, Some(12345));
    }

    #[test]
    fn cli_beats_env() {
        let args = Args {
            width: Some(640),
            ..Args::default()
        };
        let cfg = Config::resolve(&args, env(&[("STREAM_WIDTH", "1920")])).expect("config");
        assert_eq!(cfg.width, 640);
    }

    #[test]
    fn malformed_env_is_a_startup_failure() {
        let err = Config::resolve(&Args::default(), env(&[("STREAM_FPS", "fast")]));
        assert!(matches!(
            err,
            Err(ConfigError::Invalid { key: "STREAM_FPS", .. })
        ));
    }

    #[test]
    fn zero_fps_rejected() {
        let err = Config::resolve(&Args::default(), env(&[("STREAM_FPS", "0")]));
        assert!(err.is_err());
    }

    #[test]
    fn volume_clamps_into_unit_range() {
        let cfg =
            Config::resolve(&Args::default(), env(&[("MUSIC_VOLUME", "3.5")])).expect("config");
        assert_eq!(cfg.music_volume, 1.0);
    }
}
