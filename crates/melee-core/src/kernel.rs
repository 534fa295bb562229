// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Simulation kernel: owns all mutable world state and the tick loop.
//!
//! One coarse `RwLock` protects the world; `tick` and every mutator take
//! the write lock, so callers never observe partial state. Agents live in
//! a dense arena (`Vec<Agent>`) with a `BTreeMap` name index; the per-tick
//! processing order is the map's name-ascending iteration, which makes a
//! fixed seed plus a scripted input sequence fully reproducible.
//!
//! Tick order (fixed): counter → TICK event → seed advance → arena order +
//! spatial rebuild → per-agent AI/ragdoll → collisions → transient
//! effects → shake → projectiles → shake-budget reset → snapshot publish.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::{Agent, ChatBubble, Focus, Lifecycle};
use crate::ai;
use crate::combat;
use crate::constants::{
    AGENT_RADIUS, COLLISION_QUERY_RADIUS, MAX_PLAYERS, MAX_PROJECTILES, RAGDOLL_FRICTION,
    SHAKE_MIN_VISIBLE, SPATIAL_CELL_SIZE, WORLD_MARGIN,
};
use crate::effects::TransientEffects;
use crate::events::{EventLog, EventType};
use crate::pool::SnapshotPool;
use crate::prng::{splitmix64, Prng};
use crate::projectile::Projectile;
use crate::snapshot::{AgentSnapshot, GameSnapshot, ShakeSnapshot};
use crate::spatial::SpatialGrid;
use crate::weapon::{self, WeaponId};

/// Kernel construction parameters.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// World rectangle width, px (matches the stream geometry).
    pub world_width: f32,
    /// World rectangle height, px.
    pub world_height: f32,
    /// Active population cap.
    pub max_players: usize,
    /// Initial seed for the per-tick seed chain.
    pub seed: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            world_width: 1280.0,
            world_height: 720.0,
            max_players: MAX_PLAYERS,
            seed: 0x6d65_6c65_6521,
        }
    }
}

/// Errors surfaced by kernel lifecycle operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// `start` was called while the tick task is running.
    #[error("kernel already running")]
    AlreadyRunning,
    /// `start` was called with a zero tick rate.
    #[error("tick rate must be >= 1")]
    InvalidTickRate,
}

/// Options accepted by `add_player`.
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    /// Profile image reference shown by the renderer.
    pub profile_pic: Option<String>,
    /// Team to join immediately.
    pub team: Option<String>,
}

/// Caller-facing value copy of one agent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    /// Stable id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Position, px.
    pub x: f32,
    /// Position, px.
    pub y: f32,
    /// Current hit points.
    pub hp: u32,
    /// Hit point ceiling.
    pub max_hp: u32,
    /// Currency balance.
    pub money: u32,
    /// Lifetime kills.
    pub kills: u32,
    /// Lifetime deaths.
    pub deaths: u32,
    /// Equipped weapon name.
    pub weapon: String,
    /// Team id, when any.
    pub team: Option<String>,
    /// Dead flag.
    pub is_dead: bool,
    /// Lifecycle state.
    pub lifecycle: Lifecycle,
}

impl PlayerView {
    fn from_agent(a: &Agent) -> Self {
        Self {
            id: a.id,
            name: a.name.clone(),
            x: a.x,
            y: a.y,
            hp: a.hp,
            max_hp: a.max_hp,
            money: a.money,
            kills: a.kills,
            deaths: a.deaths,
            weapon: a.weapon.name().to_owned(),
            team: a.team.clone(),
            is_dead: a.is_dead,
            lifecycle: a.lifecycle,
        }
    }
}

/// Sorted mutable-free view of the population.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateView {
    /// Players, alive first, then kills descending, then name ascending.
    pub players: Vec<PlayerView>,
    /// Total joined agents.
    pub player_count: usize,
    /// Alive agents.
    pub alive_count: usize,
    /// Kills across the population.
    pub total_kills: u64,
}

/// All kernel-owned mutable state. Lives behind the kernel write lock.
pub(crate) struct WorldState {
    pub(crate) cfg: KernelConfig,
    pub(crate) tick_num: u64,
    /// Seed for the current tick; advanced via SplitMix64 each tick.
    pub(crate) tick_seed: u64,
    pub(crate) rng: Prng,
    next_agent_id: u32,
    pub(crate) agents: Vec<Agent>,
    pub(crate) by_name: BTreeMap<String, usize>,
    /// Aux processing order, rebuilt each tick in name order.
    pub(crate) order: Vec<usize>,
    pub(crate) grid: SpatialGrid,
    pub(crate) fx: TransientEffects,
    pub(crate) projectiles: Vec<Projectile>,
    pub(crate) shake_budget_used: u32,
    collision_scratch: Vec<u32>,
    sort_scratch: Vec<usize>,
}

impl WorldState {
    pub(crate) fn new(cfg: KernelConfig) -> Self {
        let grid = SpatialGrid::new(
            cfg.world_width,
            cfg.world_height,
            SPATIAL_CELL_SIZE,
            cfg.max_players,
        );
        let rng = Prng::from_seed(cfg.seed);
        Self {
            tick_num: 0,
            tick_seed: cfg.seed,
            rng,
            next_agent_id: 1,
            agents: Vec::with_capacity(cfg.max_players),
            by_name: BTreeMap::new(),
            order: Vec::with_capacity(cfg.max_players),
            grid,
            fx: TransientEffects::new(),
            projectiles: Vec::with_capacity(MAX_PROJECTILES),
            shake_budget_used: 0,
            collision_scratch: Vec::with_capacity(64),
            sort_scratch: Vec::with_capacity(cfg.max_players),
            cfg,
        }
    }

    pub(crate) fn agent_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn add_player(
        &mut self,
        name: &str,
        opts: JoinOptions,
        events: &EventLog,
    ) -> Option<PlayerView> {
        if let Some(&idx) = self.by_name.get(name) {
            let agent = &mut self.agents[idx];
            if agent.is_dead {
                agent.respawn(&mut self.rng, self.cfg.world_width, self.cfg.world_height);
                events.emit(
                    EventType::Respawn,
                    self.tick_num,
                    agent.id,
                    json!({ "name": agent.name }),
                );
            }
            // idempotent: an alive rejoin returns the same agent
            return Some(PlayerView::from_agent(&self.agents[idx]));
        }
        if self.agents.len() >= self.cfg.max_players {
            return None;
        }
        let id = self.next_agent_id;
        self.next_agent_id += 1;
        let mut agent = Agent::spawn(
            id,
            name.to_owned(),
            opts.profile_pic,
            &mut self.rng,
            self.cfg.world_width,
            self.cfg.world_height,
        );
        agent.team = opts.team;
        let view = PlayerView::from_agent(&agent);
        self.by_name.insert(name.to_owned(), self.agents.len());
        self.agents.push(agent);
        events.emit(
            EventType::Join,
            self.tick_num,
            id,
            json!({ "name": name }),
        );
        Some(view)
    }

    fn remove_player(&mut self, name: &str, events: &EventLog) {
        let Some(idx) = self.by_name.remove(name) else {
            return;
        };
        let removed = self.agents.swap_remove(idx);
        if idx < self.agents.len() {
            // fix the index of the agent that swapped into the hole
            let moved_name = self.agents[idx].name.clone();
            self.by_name.insert(moved_name, idx);
        }
        events.emit(
            EventType::Leave,
            self.tick_num,
            removed.id,
            json!({ "name": removed.name }),
        );
    }

    fn buy_weapon(&mut self, name: &str, weapon: WeaponId, events: &EventLog) -> bool {
        let Some(&idx) = self.by_name.get(name) else {
            return false;
        };
        let price = weapon::stats(weapon).price;
        let agent = &mut self.agents[idx];
        if agent.is_dead || agent.money < price {
            return false;
        }
        agent.money -= price;
        agent.weapon = weapon;
        agent.clamp_combo();
        events.emit(
            EventType::Purchase,
            self.tick_num,
            agent.id,
            json!({ "name": agent.name, "weapon": weapon.name(), "price": price }),
        );
        true
    }

    fn state_view(&mut self) -> StateView {
        self.sort_scratch.clear();
        self.sort_scratch.extend(0..self.agents.len());
        let agents = &self.agents;
        self.sort_scratch.sort_by(|&a, &b| visible_order(&agents[a], &agents[b]));
        let players: Vec<PlayerView> = self
            .sort_scratch
            .iter()
            .map(|&i| PlayerView::from_agent(&agents[i]))
            .collect();
        let alive_count = agents.iter().filter(|a| !a.is_dead).count();
        let total_kills = agents.iter().map(|a| u64::from(a.kills)).sum();
        StateView {
            player_count: players.len(),
            alive_count,
            total_kills,
            players,
        }
    }

    /// One fixed-timestep simulation step.
    pub(crate) fn tick(&mut self, dt: f32, events: &EventLog, pool: &SnapshotPool) {
        // 1-3: counter, TICK event, deterministic seed advance
        self.tick_num += 1;
        let seed = self.tick_seed;
        events.emit(
            EventType::Tick,
            self.tick_num,
            0,
            json!({ "seed": seed, "playerCount": self.agents.len() }),
        );
        let mut chain = self.tick_seed;
        self.tick_seed = splitmix64(&mut chain);

        // 4: aux order (name-ascending) + spatial rebuild
        self.order.clear();
        self.order.extend(self.by_name.values().copied());
        self.grid.clear();
        for &idx in &self.order {
            let a = &self.agents[idx];
            if !a.is_dead && !a.is_ragdoll {
                self.grid.insert(idx as u32, a.x, a.y);
            }
        }

        // 5: per-agent ragdoll physics or AI/combat
        for i in 0..self.order.len() {
            let idx = self.order[i];
            if self.agents[idx].is_ragdoll {
                self.ragdoll_step(idx, dt);
            } else if !self.agents[idx].is_dead {
                ai::ai_step(self, idx, dt, events);
            }
        }

        // 6: pairwise collision resolution among the living
        self.resolve_collisions();

        // 7-8: transient effects and screen shake
        self.fx.advance(dt, seed);

        // 9: projectiles
        self.advance_projectiles(events);

        // 10: per-tick shake budget resets
        self.shake_budget_used = 0;

        // 11: snapshot
        self.produce_snapshot(seed, pool);
    }

    fn ragdoll_step(&mut self, idx: usize, dt: f32) {
        let a = &mut self.agents[idx];
        a.x += a.vx * dt;
        a.y += a.vy * dt;
        a.vx *= RAGDOLL_FRICTION;
        a.vy *= RAGDOLL_FRICTION;
        a.rotation += a.ragdoll_spin * dt;
        a.ragdoll_timer = (a.ragdoll_timer - dt).max(0.0);
        if a.ragdoll_timer == 0.0 {
            // animation over; the agent stays DEAD until an explicit rejoin
            a.is_ragdoll = false;
            a.ragdoll_spin = 0.0;
        }
        let m = WORLD_MARGIN;
        a.x = a.x.clamp(m, self.cfg.world_width - m);
        a.y = a.y.clamp(m, self.cfg.world_height - m);
    }

    fn resolve_collisions(&mut self) {
        for i in 0..self.order.len() {
            let idx = self.order[i];
            {
                let a = &self.agents[idx];
                if a.is_dead || a.is_ragdoll {
                    continue;
                }
                let (x, y) = (a.x, a.y);
                let hits = self.grid.query_radius(x, y, COLLISION_QUERY_RADIUS);
                self.collision_scratch.clear();
                self.collision_scratch.extend_from_slice(hits);
            }
            for k in 0..self.collision_scratch.len() {
                let other = self.collision_scratch[k] as usize;
                // process each unordered pair once
                if other <= idx {
                    continue;
                }
                let (a, b) = combat::pair_mut(&mut self.agents, idx, other);
                if b.is_dead || b.is_ragdoll {
                    continue;
                }
                let dx = b.x - a.x;
                let dy = b.y - a.y;
                let dist_sq = dx * dx + dy * dy;
                let min_dist = AGENT_RADIUS * 2.0;
                if dist_sq >= min_dist * min_dist || dist_sq <= f32::EPSILON {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let overlap = (min_dist - dist) * 0.5;
                let nx = dx / dist;
                let ny = dy / dist;
                a.x -= nx * overlap;
                a.y -= ny * overlap;
                b.x += nx * overlap;
                b.y += ny * overlap;
                a.vx -= nx * overlap * 4.0;
                a.vy -= ny * overlap * 4.0;
                b.vx += nx * overlap * 4.0;
                b.vy += ny * overlap * 4.0;
            }
        }
    }

    fn advance_projectiles(&mut self, events: &EventLog) {
        let mut i = 0;
        while i < self.projectiles.len() {
            self.projectiles[i].step();
            let hit = {
                let p = &self.projectiles[i];
                self.order.iter().copied().find(|&aidx| {
                    let a = &self.agents[aidx];
                    a.id != p.owner_id
                        && a.can_be_hit()
                        && !same_team(&p.owner_team, &a.team)
                        && p.overlaps(a.x, a.y, AGENT_RADIUS)
                })
            };
            if let Some(victim) = hit {
                let p = self.projectiles.swap_remove(i);
                let attacker = self.agent_index(&p.owner_name);
                combat::apply_projectile_hit(self, attacker, victim, &p, events);
                continue;
            }
            if self.projectiles[i].expired(self.cfg.world_width, self.cfg.world_height) {
                self.projectiles.swap_remove(i);
                continue;
            }
            i += 1;
        }
    }

    fn produce_snapshot(&mut self, seed: u64, pool: &SnapshotPool) {
        self.sort_scratch.clear();
        self.sort_scratch.extend(self.order.iter().copied());
        let agents = &self.agents;
        self.sort_scratch.sort_by(|&a, &b| visible_order(&agents[a], &agents[b]));

        let alive_count = agents.iter().filter(|a| !a.is_dead).count();
        let total_kills: u64 = agents.iter().map(|a| u64::from(a.kills)).sum();

        let mut snap = pool.acquire_write(self.tick_num, seed);
        for &idx in self.sort_scratch.iter().take(self.cfg.max_players) {
            snap.agents.push(AgentSnapshot::default());
            if let Some(slot) = snap.agents.last_mut() {
                slot.copy_from(&agents[idx]);
            }
        }
        for p in &self.fx.particles {
            snap.push_particle(p);
        }
        for e in &self.fx.effects {
            snap.push_effect(e);
        }
        for t in &self.fx.texts {
            snap.push_text(t);
        }
        for t in &self.fx.trails {
            snap.push_trail(t);
        }
        for f in &self.fx.flashes {
            snap.push_flash(f);
        }
        for p in &self.projectiles {
            snap.push_projectile(p);
        }
        if self.fx.shake.intensity > SHAKE_MIN_VISIBLE {
            snap.shake = Some(ShakeSnapshot {
                offset_x: self.fx.shake.offset_x,
                offset_y: self.fx.shake.offset_y,
                intensity: self.fx.shake.intensity,
            });
        }
        snap.player_count = agents.len();
        snap.alive_count = alive_count;
        snap.total_kills = total_kills;
        drop(snap);
        pool.publish_write();
    }
}

/// Visible ordering: alive before dead, kills descending, name ascending.
fn visible_order(a: &Agent, b: &Agent) -> std::cmp::Ordering {
    a.is_dead
        .cmp(&b.is_dead)
        .then_with(|| b.kills.cmp(&a.kills))
        .then_with(|| a.name.cmp(&b.name))
}

fn same_team(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

/// The simulation kernel handle: public contract of the engine.
pub struct GameKernel {
    world: RwLock<WorldState>,
    pool: Arc<SnapshotPool>,
    events: Arc<EventLog>,
    running: AtomicBool,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameKernel {
    /// Constructs a stopped kernel.
    pub fn new(cfg: KernelConfig, events: Arc<EventLog>) -> Arc<Self> {
        Arc::new(Self {
            world: RwLock::new(WorldState::new(cfg)),
            pool: Arc::new(SnapshotPool::new()),
            events,
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            task: Mutex::new(None),
        })
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, WorldState> {
        self.world.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.world.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the periodic tick task at `tick_rate` ticks per second.
    pub fn start(self: &Arc<Self>, tick_rate: u32) -> Result<(), KernelError> {
        if tick_rate == 0 {
            return Err(KernelError::InvalidTickRate);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(KernelError::AlreadyRunning);
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);
        {
            let mut slot = self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(stop_tx);
        }
        let kernel = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let dt = 1.0 / tick_rate as f32;
            let mut ticker =
                tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(tick_rate)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(tick_rate, "simulation started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut world = kernel.write();
                        world.tick(dt, &kernel.events, &kernel.pool);
                    }
                    _ = stop_rx.changed() => break,
                }
            }
            debug!("simulation task exited");
        });
        {
            let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            *slot = Some(handle);
        }
        Ok(())
    }

    /// Signals the tick task and waits for it; the in-flight tick
    /// completes first. Idempotent.
    pub async fn stop(&self) {
        let tx = {
            let mut slot = self.stop_tx.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(tx) = tx {
            let _ = tx.send(true);
        }
        let handle = {
            let mut slot = self.task.lock().unwrap_or_else(PoisonError::into_inner);
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the tick task is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The snapshot pool the render loop reads from.
    pub fn pool(&self) -> Arc<SnapshotPool> {
        Arc::clone(&self.pool)
    }

    /// Latest published snapshot.
    pub fn get_snapshot(&self) -> RwLockReadGuard<'_, GameSnapshot> {
        self.pool.acquire_read()
    }

    /// Joins (or respawns, or idempotently returns) the named player.
    /// `None` when the population cap is reached.
    pub fn add_player(&self, name: &str, opts: JoinOptions) -> Option<PlayerView> {
        if name.is_empty() {
            return None;
        }
        self.write().add_player(name, opts, &self.events)
    }

    /// Removes the named player; no-op when absent.
    pub fn remove_player(&self, name: &str) {
        self.write().remove_player(name, &self.events);
    }

    /// Heals an alive player. `false` when missing or dead.
    pub fn heal_player(&self, name: &str, amount: u32) -> bool {
        if amount == 0 {
            return false;
        }
        let mut world = self.write();
        match world.agent_index(name) {
            Some(idx) => world.agents[idx].heal(amount),
            None => false,
        }
    }

    /// Resolves an attack between two named agents with pre-rolled
    /// damage. Silently drops on protection, miss, or teammates.
    pub fn process_attack(&self, attacker: &str, victim: &str, damage: u32) {
        let mut world = self.write();
        let (Some(a), Some(v)) = (world.agent_index(attacker), world.agent_index(victim)) else {
            return;
        };
        if a == v {
            return;
        }
        combat::process_attack(&mut world, a, v, damage, &self.events);
    }

    /// Points the agent at a focus target for `ttl_secs`.
    pub fn set_focus(&self, name: &str, target: &str, ttl_secs: f32) -> bool {
        let mut world = self.write();
        let Some(idx) = world.agent_index(name) else {
            return false;
        };
        if world.agent_index(target).is_none() || name == target {
            return false;
        }
        world.agents[idx].focus = Some(Focus {
            target: target.to_owned(),
            ttl_secs,
        });
        true
    }

    /// Clears the agent's focus target.
    pub fn clear_focus(&self, name: &str) -> bool {
        let mut world = self.write();
        let Some(idx) = world.agent_index(name) else {
            return false;
        };
        world.agents[idx].focus = None;
        true
    }

    /// Attaches a chat bubble for `ttl_secs`.
    pub fn set_chat_bubble(&self, name: &str, text: &str, ttl_secs: f32) -> bool {
        let mut world = self.write();
        let Some(idx) = world.agent_index(name) else {
            return false;
        };
        world.agents[idx].bubble = Some(ChatBubble {
            text: text.to_owned(),
            ttl_secs,
        });
        true
    }

    /// Sets or clears the agent's team.
    pub fn set_player_team(&self, name: &str, team: Option<String>) -> bool {
        let mut world = self.write();
        let Some(idx) = world.agent_index(name) else {
            return false;
        };
        world.agents[idx].team = team;
        true
    }

    /// Buys and equips a weapon. `false` when missing, dead, or broke.
    pub fn buy_weapon(&self, name: &str, weapon: WeaponId) -> bool {
        self.write().buy_weapon(name, weapon, &self.events)
    }

    /// Sorted mutable-free view of the population.
    pub fn get_state(&self) -> StateView {
        self.write().state_view()
    }

    /// Current tick number.
    pub fn tick_num(&self) -> u64 {
        self.read().tick_num
    }

    /// Runs one tick synchronously. Test seam; the periodic task uses the
    /// same path.
    pub fn step_once(&self, dt: f32) {
        let mut world = self.write();
        world.tick(dt, &self.events, &self.pool);
    }
}
