// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Tuning constants shared across the simulation kernel.
//!
//! Geometry is in world pixels; the world rectangle matches the stream
//! geometry. Timers are in seconds unless the name says ticks.

/// Collision radius of an agent body.
pub const AGENT_RADIUS: f32 = 30.0;

/// Spatial-grid cell edge. Must exceed the largest query radius used by
/// collision resolution; target acquisition uses multi-cell scans.
pub const SPATIAL_CELL_SIZE: f32 = 100.0;

/// Radius for the per-tick collision query around each agent.
pub const COLLISION_QUERY_RADIUS: f32 = 66.0;

/// Radius for proximity target acquisition.
pub const TARGET_QUERY_RADIUS: f32 = 300.0;

/// Beyond this distance the approach vector blends a flow-field hint.
pub const FAR_APPROACH_DISTANCE: f32 = 400.0;

/// Agents back up when a target is closer than this.
pub const MIN_ENGAGE_DISTANCE: f32 = 48.0;

/// Agents keep inside the world rectangle by this margin.
pub const WORLD_MARGIN: f32 = 40.0;

/// Padding around the world rectangle before a projectile despawns.
pub const WORLD_PAD: f32 = 64.0;

/// Upper bound on agent speed, world px per second.
pub const MAX_SPEED: f32 = 260.0;

/// Per-tick velocity damping applied after integration.
pub const FRICTION: f32 = 0.85;

/// Velocity damping while ragdolling.
pub const RAGDOLL_FRICTION: f32 = 0.92;

/// Spawn protection granted on first join.
pub const SPAWN_PROTECT_JOIN_SECS: f32 = 0.3;

/// Spawn protection granted on respawn after death.
pub const SPAWN_PROTECT_RESPAWN_SECS: f32 = 0.5;

/// Duration of the post-death ragdoll animation.
pub const RAGDOLL_SECS: f32 = 4.0;

/// Chance for any AI-initiated attack to crit.
pub const CRIT_CHANCE: f32 = 0.10;

/// Damage multiplier applied on crit.
pub const CRIT_MULTIPLIER: f32 = 1.5;

/// Currency credited to the killer.
pub const KILL_REWARD: u32 = 50;

/// Default hit points for a fresh agent.
pub const DEFAULT_MAX_HP: u32 = 100;

/// Stamina ceiling.
pub const MAX_STAMINA: f32 = 100.0;

/// Linear stamina regeneration, points per second.
pub const STAMINA_REGEN_PER_SEC: f32 = 18.0;

/// Stamina cost of one attack.
pub const ATTACK_STAMINA_COST: f32 = 10.0;

/// Stamina cost of a dodge roll.
pub const DODGE_STAMINA_COST: f32 = 25.0;

/// Dodge roll duration in ticks.
pub const DODGE_TICKS: u16 = 8;

/// Cooldown between dodge rolls in ticks.
pub const DODGE_COOLDOWN_TICKS: u16 = 45;

/// Invulnerability frames granted by a dodge.
pub const DODGE_INVULN_TICKS: u16 = 6;

/// Active population cap. `add_player` returns `None` beyond it.
pub const MAX_PLAYERS: usize = 100;

/// Per-category transient caps; spawns beyond a cap are silent no-ops.
pub const MAX_PARTICLES: usize = 512;
/// Cap for attack visual effects.
pub const MAX_EFFECTS: usize = 64;
/// Cap for floating damage texts.
pub const MAX_TEXTS: usize = 64;
/// Cap for weapon trails.
pub const MAX_TRAILS: usize = 64;
/// Cap for impact flashes.
pub const MAX_FLASHES: usize = 64;
/// Cap for live projectiles.
pub const MAX_PROJECTILES: usize = 128;

/// Screen shakes accepted per tick; later requests are dropped.
pub const SHAKE_BUDGET_PER_TICK: u32 = 3;

/// Clamp on accumulated shake intensity.
pub const SHAKE_MAX_INTENSITY: f32 = 24.0;

/// Shake below this intensity is not published to snapshots.
pub const SHAKE_MIN_VISIBLE: f32 = 0.5;

/// Projectile lifetime in ticks.
pub const PROJECTILE_LIFETIME_TICKS: u16 = 90;

/// Points kept in a projectile trail ring.
pub const PROJECTILE_TRAIL_LEN: usize = 4;

/// Points kept in a weapon trail ring.
pub const WEAPON_TRAIL_LEN: usize = 8;

/// Event-log queue capacity; emits beyond it drop at the source.
pub const EVENT_QUEUE_CAPACITY: usize = 4096;

/// Per-player event rate limit: sustained events per second.
pub const EVENT_RATE_PER_SEC: f64 = 10.0;

/// Per-player event rate limit: burst size.
pub const EVENT_RATE_BURST: f64 = 30.0;
