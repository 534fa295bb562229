// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! melee-core: deterministic fixed-timestep arena simulation.
//!
//! The kernel owns all mutable world state behind one coarse lock,
//! advances it at a fixed tick rate, and publishes immutable snapshots
//! through a lock-free triple-buffered pool. Everything downstream (the
//! render loop, the HTTP surfaces) consumes value copies; nothing outside
//! the kernel mutates an agent.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::suboptimal_flops,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::float_cmp
)]

/// Agent entity and lifecycle.
pub mod agent;
mod ai;
mod combat;
/// Tuning constants.
pub mod constants;
/// Transient visual effects and screen shake.
pub mod effects;
/// Bounded append-only event log.
pub mod events;
/// Simulation kernel and its public contract.
pub mod kernel;
/// Triple-buffered snapshot pool.
pub mod pool;
/// Deterministic PRNG.
pub mod prng;
/// Projectiles.
pub mod projectile;
/// Immutable per-tick snapshots.
pub mod snapshot;
/// Uniform-grid spatial index.
pub mod spatial;
/// Closed weapon catalog.
pub mod weapon;

pub use agent::{Agent, ChatBubble, Focus, Lifecycle};
pub use events::{run_batcher, Event, EventLog, EventType};
pub use kernel::{GameKernel, JoinOptions, KernelConfig, KernelError, PlayerView, StateView};
pub use pool::SnapshotPool;
pub use prng::Prng;
pub use snapshot::{AgentSnapshot, GameSnapshot, ShakeSnapshot};
pub use spatial::SpatialGrid;
pub use weapon::{HitboxShape, WeaponId};
