// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! melee server binary: wires kernel, renderer, stream, and surfaces.
//!
//! Everything is constructed explicitly here and passed by handle; no
//! process-wide globals. Shutdown on SIGINT is ordered: HTTP stops
//! accepting, then render loop, writer/encoder, kernel, and finally the
//! event-log batcher drains. Exit code 0 on graceful shutdown, non-zero
//! on startup failure (bind error, invalid configuration).

mod chat;
mod config;
mod http;
mod ratelimit;
mod stream;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use melee_core::{run_batcher, EventLog, GameKernel, KernelConfig};
use melee_render::{RenderConfig, RenderLoop, SharedAudioSink};
use melee_stream::{EncoderConfig, FrameRing};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::ratelimit::RateLimiter;
use crate::stream::{AudioPipe, StreamControl};
use crate::ws::WsHub;

/// Frame ring capacity (slots).
const RING_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cfg = Config::load(&args).context("invalid configuration")?;
    info!(
        geometry = format!("{}x{}@{}", cfg.width, cfg.height, cfg.fps),
        port = cfg.port,
        "starting melee server"
    );

    // event log + batcher
    let (events, event_rx) = EventLog::channel();
    let events = Arc::new(events);
    let batcher = tokio::spawn(run_batcher(event_rx, cfg.event_log.clone()));

    // simulation kernel
    let kernel = GameKernel::new(
        KernelConfig {
            world_width: cfg.width as f32,
            world_height: cfg.height as f32,
            max_players: cfg.max_players,
            seed: cfg.seed,
        },
        Arc::clone(&events),
    );
    kernel.start(cfg.fps).context("start simulation")?;

    // frame pipeline
    let encoder_cfg = EncoderConfig {
        width: cfg.width,
        height: cfg.height,
        fps: cfg.fps,
        bitrate_kbps: cfg.bitrate_kbps,
        output_url: cfg.rtmp_url.clone(),
        audio_source: cfg.audio_pipe.clone(),
        ..EncoderConfig::default()
    };
    let ring = Arc::new(FrameRing::new(RING_CAPACITY, encoder_cfg.frame_size()));

    // the pipe itself is opened by the stream controller once the
    // encoder (its reader) is running; opening a FIFO write end here
    // would block startup
    let audio_slot: Option<SharedAudioSink> = cfg
        .audio_pipe
        .as_ref()
        .map(|_| Arc::new(std::sync::Mutex::new(None)));
    let audio_pipe = cfg.audio_pipe.clone().and_then(|path| {
        audio_slot.as_ref().map(|slot| AudioPipe {
            path,
            slot: Arc::clone(slot),
        })
    });
    let stream_control = StreamControl::new(encoder_cfg, Arc::clone(&ring), audio_pipe);

    let render_loop = RenderLoop::start(
        kernel.pool(),
        Arc::clone(&ring),
        RenderConfig {
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
            music_volume: cfg.music_volume,
            music_enabled: cfg.music_enabled,
        },
        audio_slot,
    );

    // chat command seam; the platform integration feeds the sender
    let (chat_tx, chat_rx) = mpsc::channel(256);
    let dispatcher = tokio::spawn(chat::run_dispatcher(Arc::clone(&kernel), chat_rx));
    match cfg.kick_chatroom_id {
        Some(id) if id != 0 => {
            info!(chatroom = id, "chat listener configured; awaiting platform session");
        }
        _ => info!("no chatroom configured; chat commands disabled"),
    }

    // HTTP + WS surfaces
    let limiter = Arc::new(RateLimiter::default());
    let sweeper = limiter.start_sweeper(Duration::from_secs(5 * 60));
    let hub = Arc::new(WsHub::new());
    let broadcaster = ws::start_broadcaster(
        Arc::clone(&hub),
        Arc::clone(&kernel),
        Arc::clone(&stream_control),
    );

    let state = http::AppState {
        kernel: Arc::clone(&kernel),
        stream: Arc::clone(&stream_control),
        limiter,
        events: Arc::clone(&events),
        hub,
        started_at: Instant::now(),
    };
    let app = http::router(state, cfg.log_requests);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "http listening");

    let serve = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    });
    serve.await.context("http server")?;

    // ordered teardown: render -> stream -> kernel -> chat -> event log
    render_loop.stop().await;
    stream_control.stop().await;
    kernel.stop().await;
    drop(chat_tx);
    let _ = dispatcher.await;
    broadcaster.abort();
    let _ = broadcaster.await;
    sweeper.abort();
    let _ = sweeper.await;
    // every kernel handle is gone now, so the event senders drop and the
    // batcher drains to EOF
    drop(kernel);
    drop(events);
    match batcher.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(?err, "event log flush failed"),
        Err(err) => warn!(?err, "event log batcher panicked"),
    }
    info!("shutdown complete");
    Ok(())
}
