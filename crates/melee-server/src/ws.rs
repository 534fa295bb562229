// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! WebSocket hub: `game:state` and `stream:stats` fan-out at 10 Hz.
//!
//! `/ws` and `/socket.io/` accept upgrades. Caps: 10 concurrent
//! connections per IP, 500 global; the origin check is the same policy
//! CORS uses. Rejections report 401 (origin), 429 (per-IP), or 503
//! (global). Slow clients are dropped rather than buffered: each client
//! has a small outbound queue and a full queue closes the connection.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use melee_core::GameKernel;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::http::{origin_allowed, AppState};
use crate::stream::StreamControl;

/// Broadcast frequency, Hz.
pub const BROADCAST_HZ: u64 = 10;
/// Concurrent connections allowed per IP.
pub const MAX_PER_IP: usize = 10;
/// Concurrent connections allowed overall.
pub const MAX_GLOBAL: usize = 500;
/// Outbound messages queued per client before it is dropped.
const CLIENT_QUEUE: usize = 32;

/// Why a connection was refused.
enum Reject {
    PerIp,
    Global,
}

/// Connection registry and fan-out.
pub struct WsHub {
    next_id: AtomicU64,
    clients: DashMap<u64, (IpAddr, mpsc::Sender<String>)>,
    per_ip: DashMap<IpAddr, usize>,
    total: AtomicUsize,
}

impl Default for WsHub {
    fn default() -> Self {
        Self::new()
    }
}

impl WsHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            clients: DashMap::new(),
            per_ip: DashMap::new(),
            total: AtomicUsize::new(0),
        }
    }

    /// Connected clients.
    pub fn client_count(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn try_register(&self, ip: IpAddr) -> Result<(u64, mpsc::Receiver<String>), Reject> {
        if self.total.load(Ordering::Relaxed) >= MAX_GLOBAL {
            return Err(Reject::Global);
        }
        {
            let mut count = self.per_ip.entry(ip).or_insert(0);
            if *count >= MAX_PER_IP {
                return Err(Reject::PerIp);
            }
            *count += 1;
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        self.clients.insert(id, (ip, tx));
        Ok((id, rx))
    }

    /// Removes a client and releases both the global and the per-IP
    /// slot. Every removal path goes through here so the cap
    /// accounting cannot drift.
    fn deregister(&self, id: u64) {
        let Some((_, (ip, _))) = self.clients.remove(&id) else {
            return;
        };
        self.total.fetch_sub(1, Ordering::Relaxed);
        if let Some(mut count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
        }
        self.per_ip.remove_if(&ip, |_, &count| count == 0);
    }

    /// Queues `msg` to every client; clients with full queues are
    /// deregistered (their forward task then closes).
    pub fn broadcast(&self, msg: &str) {
        let mut dead: Vec<u64> = Vec::new();
        for entry in &self.clients {
            if entry.value().1.try_send(msg.to_owned()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            debug!(id, "dropping slow ws client");
            self.deregister(id);
        }
    }
}

/// Spawns the 10 Hz broadcaster.
pub fn start_broadcaster(
    hub: Arc<WsHub>,
    kernel: Arc<GameKernel>,
    stream: Arc<StreamControl>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1000 / BROADCAST_HZ));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if hub.client_count() == 0 {
                continue;
            }
            let view = kernel.get_state();
            let game = json!({
                "event": "game:state",
                "data": {
                    "players": view.players,
                    "playerCount": view.player_count,
                    "aliveCount": view.alive_count,
                    "stats": { "totalKills": view.total_kills },
                },
            });
            hub.broadcast(&game.to_string());

            let status = stream.status().await;
            let stats = json!({ "event": "stream:stats", "data": status });
            hub.broadcast(&stats.to_string());
        }
    })
}

/// Upgrade handler for `/ws` and `/socket.io/`.
pub async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin_ok = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .is_none_or(origin_allowed);
    if !origin_ok {
        warn!(ip = %addr.ip(), "ws origin rejected");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let hub = Arc::clone(&state.hub);
    match hub.try_register(addr.ip()) {
        Err(Reject::PerIp) => StatusCode::TOO_MANY_REQUESTS.into_response(),
        Err(Reject::Global) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        Ok((id, rx)) => ws.on_upgrade(move |socket| handle_socket(socket, hub, id, addr.ip(), rx)),
    }
}

async fn handle_socket(
    socket: WebSocket,
    hub: Arc<WsHub>,
    id: u64,
    ip: IpAddr,
    mut rx: mpsc::Receiver<String>,
) {
    debug!(id, %ip, "ws client connected");
    let (mut sink, mut source) = socket.split();

    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // inbound side: clients only ping/close; payloads are ignored
    while let Some(Ok(msg)) = source.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    hub.deregister(id);
    forward.abort();
    debug!(id, %ip, "ws client disconnected");
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 1, 0, last))
    }

    #[test]
    fn per_ip_cap_enforced() {
        let hub = WsHub::new();
        let mut held = Vec::new();
        for _ in 0..MAX_PER_IP {
            held.push(hub.try_register(ip(1)).ok().expect("under the cap"));
        }
        assert!(matches!(hub.try_register(ip(1)), Err(Reject::PerIp)));
        // another address still fits
        assert!(hub.try_register(ip(2)).is_ok());
    }

    #[test]
    fn deregister_frees_the_slot() {
        let hub = WsHub::new();
        let (id, _rx) = hub.try_register(ip(3)).ok().expect("register");
        assert_eq!(hub.client_count(), 1);
        hub.deregister(id);
        assert_eq!(hub.client_count(), 0);
        assert!(hub.try_register(ip(3)).is_ok());
    }

    #[tokio::test]
    async fn broadcast_reaches_registered_clients() {
        let hub = WsHub::new();
        let (_id, mut rx) = hub.try_register(ip(4)).ok().expect("register");
        hub.broadcast("{\"event\":\"game:state\"}");
        let msg = rx.recv().await.expect("message");
        assert!(msg.contains("game:state"));
    }

    #[tokio::test]
    async fn slow_clients_are_dropped_and_release_their_ip_slot() {
        let hub = WsHub::new();
        let (_id, rx) = hub.try_register(ip(5)).ok().expect("register");
        // never drain: fill the queue past capacity
        for i in 0..(CLIENT_QUEUE + 2) {
            hub.broadcast(&format!("{{\"n\":{i}}}"));
        }
        assert_eq!(hub.client_count(), 0, "slow client evicted");
        drop(rx);

        // the per-IP slot is released: the full cap is available again
        let mut held = Vec::new();
        for _ in 0..MAX_PER_IP {
            held.push(hub.try_register(ip(5)).ok().expect("slot released"));
        }
        assert!(matches!(hub.try_register(ip(5)), Err(Reject::PerIp)));
    }
}
