// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Immutable per-tick world snapshot consumed by the renderer.
//!
//! A snapshot is a value-type copy of exactly the fields the renderer
//! needs, bounded by the per-category caps, so the render loop never
//! touches live kernel state. Slot reuse: `reset` length-truncates every
//! slice while preserving capacity.

use crate::agent::Agent;
use crate::constants::{
    MAX_EFFECTS, MAX_FLASHES, MAX_PARTICLES, MAX_PLAYERS, MAX_PROJECTILES, MAX_TEXTS, MAX_TRAILS,
    PROJECTILE_TRAIL_LEN, WEAPON_TRAIL_LEN,
};
use crate::effects::{AttackEffect, FloatingText, ImpactFlash, Particle, WeaponTrail};
use crate::projectile::Projectile;
use crate::weapon::WeaponId;

/// Renderer-facing copy of one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentSnapshot {
    /// Stable id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Position, world px.
    pub x: f32,
    /// Position, world px.
    pub y: f32,
    /// Velocity, px/s.
    pub vx: f32,
    /// Velocity, px/s.
    pub vy: f32,
    /// Current hit points.
    pub hp: u32,
    /// Hit point ceiling.
    pub max_hp: u32,
    /// Lifetime kills, for the leaderboard overlay.
    pub kills: u32,
    /// Equipped weapon.
    pub weapon: Option<WeaponId>,
    /// Body color.
    pub color: [u8; 3],
    /// Attack facing, radians.
    pub attack_angle: f32,
    /// Body rotation (ragdoll spin).
    pub rotation: f32,
    /// Dead flag.
    pub is_dead: bool,
    /// Ragdolling flag.
    pub is_ragdoll: bool,
    /// Spawn protection flag.
    pub spawn_protection: bool,
    /// Attack animation flag.
    pub is_attacking: bool,
    /// Stunned flag.
    pub is_stunned: bool,
    /// Dodging flag.
    pub is_dodging: bool,
    /// Hits in the current combo chain.
    pub combo_count: u8,
    /// Stamina in `[0, MAX_STAMINA]`.
    pub stamina: f32,
    /// Profile image reference.
    pub profile_pic: Option<String>,
    /// Chat bubble text, when visible.
    pub bubble: Option<String>,
}

impl AgentSnapshot {
    /// Copies the renderer-consumed subset from a live agent.
    pub fn copy_from(&mut self, a: &Agent) {
        self.id = a.id;
        self.name.clone_from(&a.name);
        self.x = a.x;
        self.y = a.y;
        self.vx = a.vx;
        self.vy = a.vy;
        self.hp = a.hp;
        self.max_hp = a.max_hp;
        self.kills = a.kills;
        self.weapon = Some(a.weapon);
        self.color = a.color;
        self.attack_angle = a.attack_angle;
        self.rotation = a.rotation;
        self.is_dead = a.is_dead;
        self.is_ragdoll = a.is_ragdoll;
        self.spawn_protection = a.spawn_protection;
        self.is_attacking = a.is_attacking;
        self.is_stunned = a.is_stunned;
        self.is_dodging = a.is_dodging;
        self.combo_count = a.combat.combo_count;
        self.stamina = a.stamina;
        self.profile_pic.clone_from(&a.profile_pic);
        self.bubble = a.bubble.as_ref().map(|b| b.text.clone());
    }
}

/// Renderer-facing copy of one particle.
#[derive(Debug, Clone, Copy)]
pub struct ParticleSnapshot {
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Opacity.
    pub alpha: f32,
}

/// Renderer-facing copy of one floating text.
#[derive(Debug, Clone, Default)]
pub struct TextSnapshot {
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    /// Rendered string.
    pub text: String,
    /// RGB color.
    pub color: [u8; 3],
    /// Opacity.
    pub alpha: f32,
}

/// Renderer-facing copy of one attack visual.
#[derive(Debug, Clone, Copy)]
pub struct EffectSnapshot {
    /// Source position.
    pub from_x: f32,
    /// Source position.
    pub from_y: f32,
    /// Target position.
    pub to_x: f32,
    /// Target position.
    pub to_y: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Seconds left.
    pub timer: f32,
}

/// Renderer-facing copy of one weapon trail.
#[derive(Debug, Clone, Copy)]
pub struct TrailSnapshot {
    /// Trail points, oldest first.
    pub points: [(f32, f32); WEAPON_TRAIL_LEN],
    /// Valid points.
    pub len: u8,
    /// RGB color.
    pub color: [u8; 3],
    /// Seconds left.
    pub timer: f32,
}

/// Renderer-facing copy of one impact flash.
#[derive(Debug, Clone, Copy)]
pub struct FlashSnapshot {
    /// Center.
    pub x: f32,
    /// Center.
    pub y: f32,
    /// Current radius.
    pub radius: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Seconds left.
    pub timer: f32,
}

/// Renderer-facing copy of one projectile.
#[derive(Debug, Clone, Copy)]
pub struct ProjectileSnapshot {
    /// Position.
    pub x: f32,
    /// Position.
    pub y: f32,
    /// Facing, radians.
    pub rotation: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Body radius.
    pub radius: f32,
    /// Trail ring, oldest first.
    pub trail: [(f32, f32); PROJECTILE_TRAIL_LEN],
    /// Valid trail points.
    pub trail_len: u8,
}

/// Screen-shake record for the frame.
#[derive(Debug, Clone, Copy)]
pub struct ShakeSnapshot {
    /// Frame offset, px.
    pub offset_x: f32,
    /// Frame offset, px.
    pub offset_y: f32,
    /// Intensity, px.
    pub intensity: f32,
}

/// An immutable value copy of the per-tick world.
#[derive(Debug, Clone, Default)]
pub struct GameSnapshot {
    /// Monotonic sequence number, stamped at acquire time.
    pub seq: u64,
    /// Wall-clock timestamp, Unix ms.
    pub timestamp_ms: u64,
    /// Tick number the snapshot reflects.
    pub tick: u64,
    /// Tick RNG seed; replaying with it reproduces the tick.
    pub seed: u64,
    /// Agents, pre-sorted alive → kills desc → name asc, capped.
    pub agents: Vec<AgentSnapshot>,
    /// Particles, capped.
    pub particles: Vec<ParticleSnapshot>,
    /// Attack visuals, capped.
    pub effects: Vec<EffectSnapshot>,
    /// Floating texts, capped.
    pub texts: Vec<TextSnapshot>,
    /// Weapon trails, capped.
    pub trails: Vec<TrailSnapshot>,
    /// Impact flashes, capped.
    pub flashes: Vec<FlashSnapshot>,
    /// Projectiles, capped.
    pub projectiles: Vec<ProjectileSnapshot>,
    /// Shake record, present only above the visibility floor.
    pub shake: Option<ShakeSnapshot>,
    /// Total joined agents (alive or dead).
    pub player_count: usize,
    /// Alive agents, counted beyond the visible slice cap.
    pub alive_count: usize,
    /// Sum of kills across the population.
    pub total_kills: u64,
}

impl GameSnapshot {
    /// Allocates a snapshot with every slice at its cap capacity.
    pub fn with_caps() -> Self {
        Self {
            agents: Vec::with_capacity(MAX_PLAYERS),
            particles: Vec::with_capacity(MAX_PARTICLES),
            effects: Vec::with_capacity(MAX_EFFECTS),
            texts: Vec::with_capacity(MAX_TEXTS),
            trails: Vec::with_capacity(MAX_TRAILS),
            flashes: Vec::with_capacity(MAX_FLASHES),
            projectiles: Vec::with_capacity(MAX_PROJECTILES),
            ..Self::default()
        }
    }

    /// Length-truncates every slice (capacity preserved) and restamps the
    /// header for reuse as the next write slot.
    pub fn reset(&mut self, seq: u64, timestamp_ms: u64, tick: u64, seed: u64) {
        self.seq = seq;
        self.timestamp_ms = timestamp_ms;
        self.tick = tick;
        self.seed = seed;
        self.agents.clear();
        self.particles.clear();
        self.effects.clear();
        self.texts.clear();
        self.trails.clear();
        self.flashes.clear();
        self.projectiles.clear();
        self.shake = None;
        self.player_count = 0;
        self.alive_count = 0;
        self.total_kills = 0;
    }

    /// Copies a particle if under the cap.
    pub fn push_particle(&mut self, p: &Particle) {
        if self.particles.len() < MAX_PARTICLES {
            self.particles.push(ParticleSnapshot {
                x: p.x,
                y: p.y,
                color: p.color,
                alpha: p.alpha.clamp(0.0, 1.0),
            });
        }
    }

    /// Copies a floating text if under the cap.
    pub fn push_text(&mut self, t: &FloatingText) {
        if self.texts.len() < MAX_TEXTS {
            self.texts.push(TextSnapshot {
                x: t.x,
                y: t.y,
                text: t.text.clone(),
                color: t.color,
                alpha: t.alpha.clamp(0.0, 1.0),
            });
        }
    }

    /// Copies an attack visual if under the cap.
    pub fn push_effect(&mut self, e: &AttackEffect) {
        if self.effects.len() < MAX_EFFECTS {
            self.effects.push(EffectSnapshot {
                from_x: e.from_x,
                from_y: e.from_y,
                to_x: e.to_x,
                to_y: e.to_y,
                color: e.color,
                timer: e.timer,
            });
        }
    }

    /// Copies a weapon trail if under the cap.
    pub fn push_trail(&mut self, t: &WeaponTrail) {
        if self.trails.len() < MAX_TRAILS {
            self.trails.push(TrailSnapshot {
                points: t.points,
                len: t.len,
                color: t.color,
                timer: t.timer,
            });
        }
    }

    /// Copies an impact flash if under the cap.
    pub fn push_flash(&mut self, f: &ImpactFlash) {
        if self.flashes.len() < MAX_FLASHES {
            self.flashes.push(FlashSnapshot {
                x: f.x,
                y: f.y,
                radius: f.radius,
                color: f.color,
                timer: f.timer,
            });
        }
    }

    /// Copies a projectile if under the cap.
    pub fn push_projectile(&mut self, p: &Projectile) {
        if self.projectiles.len() < MAX_PROJECTILES {
            self.projectiles.push(ProjectileSnapshot {
                x: p.x,
                y: p.y,
                rotation: p.rotation,
                color: p.color,
                radius: p.hit_radius,
                trail: p.trail_points(),
                trail_len: p.trail_len,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_truncates_but_keeps_capacity() {
        let mut s = GameSnapshot::with_caps();
        s.agents.push(AgentSnapshot::default());
        s.push_particle(&Particle {
            x: 1.0,
            y: 2.0,
            vx: 0.0,
            vy: 0.0,
            color: [1, 2, 3],
            alpha: 1.0,
            life: 1.0,
        });
        let cap = s.particles.capacity();
        s.reset(9, 1000, 5, 77);
        assert_eq!(s.seq, 9);
        assert_eq!(s.tick, 5);
        assert!(s.agents.is_empty());
        assert!(s.particles.is_empty());
        assert_eq!(s.particles.capacity(), cap);
    }

    #[test]
    fn category_caps_hold() {
        let mut s = GameSnapshot::with_caps();
        let p = Particle {
            x: 0.0,
            y: 0.0,
            vx: 0.0,
            vy: 0.0,
            color: [0, 0, 0],
            alpha: 1.0,
            life: 1.0,
        };
        for _ in 0..(MAX_PARTICLES + 10) {
            s.push_particle(&p);
        }
        assert_eq!(s.particles.len(), MAX_PARTICLES);
    }
}
