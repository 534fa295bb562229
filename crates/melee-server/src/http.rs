// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP surface: JSON API, middleware chain, origin policy.
//!
//! Global middleware: request tracing (toggleable), panic recovery,
//! per-IP rate limiting (429 + `Retry-After: 1`), CORS restricted to
//! localhost on any port, a closed production list, and subdomains of
//! the production host. Engine booleans map to 200/4xx/503 with a JSON
//! `{error}` envelope on failure.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use melee_core::{EventLog, GameKernel, JoinOptions, PlayerView};
use serde::Deserialize;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::ratelimit::RateLimiter;
use crate::stream::{StreamControl, StreamControlError};
use crate::ws;

/// Production host; subdomains of it are allowed origins.
const PROD_HOST: &str = "melee.tv";

/// Batch-join clamp bounds.
const BATCH_MIN: usize = 1;
/// Batch-join clamp upper bound.
const BATCH_MAX: usize = 200;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Simulation kernel.
    pub kernel: Arc<GameKernel>,
    /// Stream lifecycle control.
    pub stream: Arc<StreamControl>,
    /// Per-IP limiter.
    pub limiter: Arc<RateLimiter>,
    /// Event log (for stats counters).
    pub events: Arc<EventLog>,
    /// WebSocket hub.
    pub hub: Arc<ws::WsHub>,
    /// Process start, for uptime.
    pub started_at: Instant,
}

/// Builds the full router with middleware applied.
pub fn router(state: AppState, log_requests: bool) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(origin_allowed)
        }))
        .allow_methods(tower_http::cors::Any)
        .allow_headers([header::CONTENT_TYPE]);

    let mut router = Router::new()
        .route("/api/state", get(get_state))
        .route("/api/stats", get(get_stats))
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/weapons", get(get_weapons))
        .route("/api/player/join", post(player_join))
        .route("/api/player/batch", post(player_batch))
        .route("/api/player/heal", post(player_heal))
        .route("/api/stream/start", post(stream_start))
        .route("/api/stream/stop", post(stream_stop))
        .route("/api/stream/status", get(stream_status))
        .route("/ws", get(ws::ws_handler))
        .route("/socket.io/", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(cors)
        .layer(CatchPanicLayer::new());
    if log_requests {
        router = router.layer(TraceLayer::new_for_http());
    }
    router.with_state(state)
}

/// Origin policy shared by CORS and the WebSocket upgrade check.
///
/// Allows localhost/127.0.0.1 with any port and scheme, the closed
/// production list, and https subdomains of the production host.
pub fn origin_allowed(origin: &str) -> bool {
    let Some((scheme, rest)) = origin.split_once("://") else {
        return false;
    };
    let host = rest.split(':').next().unwrap_or(rest);
    if host == "localhost" || host == "127.0.0.1" {
        return scheme == "http" || scheme == "https";
    }
    if scheme != "https" {
        return false;
    }
    host == PROD_HOST
        || host == format!("www.{PROD_HOST}")
        || host
            .strip_suffix(PROD_HOST)
            .is_some_and(|prefix| prefix.ends_with('.') && !prefix.is_empty())
}

async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    if state.limiter.check(addr.ip()) {
        return next.run(req).await;
    }
    debug!(ip = %addr.ip(), "request rate limited");
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "1")],
        Json(json!({ "error": "rate limit exceeded" })),
    )
        .into_response()
}

async fn get_state(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.kernel.get_state();
    Json(json!({
        "players": view.players,
        "playerCount": view.player_count,
        "aliveCount": view.alive_count,
    }))
}

async fn get_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let view = state.kernel.get_state();
    let stream = state.stream.status().await;
    Json(json!({
        "playerCount": view.player_count,
        "aliveCount": view.alive_count,
        "totalKills": view.total_kills,
        "tick": state.kernel.tick_num(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "eventsEmitted": state.events.emitted(),
        "eventsDropped": state.events.dropped(),
        "wsClients": state.hub.client_count(),
        "rateLimitedIps": state.limiter.tracked(),
        "streaming": stream.streaming,
        "stream": stream,
    }))
}

async fn get_leaderboard(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut players = state.kernel.get_state().players;
    leaderboard_top(&mut players, 10);
    Json(json!({ "leaderboard": players }))
}

async fn get_weapons(State(_): State<AppState>) -> Json<serde_json::Value> {
    let weapons: Vec<serde_json::Value> = melee_core::WeaponId::ALL
        .iter()
        .map(|&id| {
            json!({
                "id": id.name(),
                "stats": melee_core::weapon::stats(id),
                "animation": melee_core::weapon::anim(id),
                "hitbox": melee_core::weapon::hitbox(id),
                "combo": melee_core::weapon::combo(id),
            })
        })
        .collect();
    Json(json!(weapons))
}

#[derive(Debug, Deserialize)]
struct JoinBody {
    name: String,
    #[serde(rename = "profilePic")]
    profile_pic: Option<String>,
}

async fn player_join(State(state): State<AppState>, Json(body): Json<JoinBody>) -> Response {
    let name = body.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name must not be empty");
    }
    match state.kernel.add_player(
        name,
        JoinOptions {
            profile_pic: body.profile_pic,
            team: None,
        },
    ) {
        Some(player) => Json(player).into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "arena is full"),
    }
}

#[derive(Debug, Deserialize)]
struct BatchBody {
    count: usize,
}

async fn player_batch(State(state): State<AppState>, Json(body): Json<BatchBody>) -> Response {
    let requested = body.count.clamp(BATCH_MIN, BATCH_MAX);
    let tick = state.kernel.tick_num();
    let taken: HashSet<String> = state
        .kernel
        .get_state()
        .players
        .into_iter()
        .map(|p| p.name)
        .collect();

    let mut joined = 0usize;
    for i in 0..requested {
        let Some(name) = bot_name(&taken, tick, i) else {
            continue; // both candidates collided; the slot is skipped
        };
        if state.kernel.add_player(&name, JoinOptions::default()).is_none() {
            break; // population cap
        }
        joined += 1;
    }
    Json(json!({
        "success": joined > 0,
        "count": joined,
        "message": format!("{joined} bots joined"),
    }))
    .into_response()
}

/// Tick-derived bot name with one retry on collision.
fn bot_name(taken: &HashSet<String>, tick: u64, slot: usize) -> Option<String> {
    let candidate = format!("Bot{}", (tick + slot as u64) % 1000);
    if !taken.contains(&candidate) {
        return Some(candidate);
    }
    let retry = format!("{candidate}x{}", (tick / 1000) % 1000);
    if !taken.contains(&retry) {
        return Some(retry);
    }
    None
}

#[derive(Debug, Deserialize)]
struct HealBody {
    name: String,
    amount: u32,
}

async fn player_heal(State(state): State<AppState>, Json(body): Json<HealBody>) -> Json<serde_json::Value> {
    let success = state.kernel.heal_player(body.name.trim(), body.amount);
    Json(json!({ "success": success }))
}

async fn stream_start(State(state): State<AppState>) -> Response {
    match state.stream.start().await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(err @ StreamControlError::AlreadyStreaming) => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "error": err.to_string() })),
        )
            .into_response(),
    }
}

async fn stream_stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stopped = state.stream.stop().await;
    Json(json!({ "success": stopped }))
}

async fn stream_status(State(state): State<AppState>) -> Json<crate::stream::StreamStatus> {
    Json(state.stream.status().await)
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (code, Json(json!({ "error": message }))).into_response()
}

/// Leaderboard comparator, shared with the WS hub payloads.
pub fn leaderboard_top(players: &mut Vec<PlayerView>, n: usize) {
    players.sort_by(|a, b| b.kills.cmp(&a.kills).then_with(|| a.name.cmp(&b.name)));
    players.truncate(n);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn origin_policy_allows_localhost_any_port() {
        assert!(origin_allowed("http://localhost:3000"));
        assert!(origin_allowed("http://localhost"));
        assert!(origin_allowed("https://127.0.0.1:8443"));
        assert!(!origin_allowed("http://192.168.1.5:3000"));
    }

    #[test]
    fn origin_policy_allows_production_and_subdomains() {
        assert!(origin_allowed("https://melee.tv"));
        assert!(origin_allowed("https://www.melee.tv"));
        assert!(origin_allowed("https://admin.melee.tv"));
        assert!(!origin_allowed("http://melee.tv"), "plain http rejected");
        assert!(!origin_allowed("https://evilmelee.tv"));
        assert!(!origin_allowed("https://melee.tv.attacker.io"));
    }

    #[test]
    fn origin_policy_rejects_garbage() {
        assert!(!origin_allowed(""));
        assert!(!origin_allowed("null"));
        assert!(!origin_allowed("file:///etc/passwd"));
    }

    #[test]
    fn bot_names_retry_once_then_skip() {
        let mut taken = HashSet::new();
        let first = bot_name(&taken, 42, 0).expect("fresh name");
        assert_eq!(first, "Bot42");

        taken.insert("Bot42".to_owned());
        let retry = bot_name(&taken, 42, 0).expect("retry name");
        assert_eq!(retry, "Bot42x0");

        taken.insert(retry);
        assert!(bot_name(&taken, 42, 0).is_none(), "slot dropped");
    }

    #[test]
    fn leaderboard_sorts_kills_then_name() {
        let mk = |name: &str, kills: u32| PlayerView {
            id: 0,
            name: name.to_owned(),
            x: 0.0,
            y: 0.0,
            hp: 100,
            max_hp: 100,
            money: 0,
            kills,
            deaths: 0,
            weapon: "fists".to_owned(),
            team: None,
            is_dead: false,
            lifecycle: melee_core::Lifecycle::Alive,
        };
        let mut players = vec![mk("zoe", 3), mk("ada", 3), mk("bob", 7), mk("cat", 0)];
        leaderboard_top(&mut players, 3);
        let names: Vec<&str> = players.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["bob", "ada", "zoe"]);
    }
}
