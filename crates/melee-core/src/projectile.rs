// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Projectiles launched by ranged weapons.
//!
//! A projectile never collides with its owner, with dead/ragdoll or
//! spawn-protected targets, with invulnerable targets, or with teammates;
//! the kernel enforces those filters at collision time. Expiry is by tick
//! countdown or by leaving the padded world rectangle, checked at tick end.

use crate::constants::{PROJECTILE_LIFETIME_TICKS, PROJECTILE_TRAIL_LEN, WORLD_PAD};
use crate::weapon::{anim, stats, WeaponId};

/// An in-flight projectile.
#[derive(Debug, Clone)]
pub struct Projectile {
    /// Owning agent id; never hit.
    pub owner_id: u32,
    /// Owning agent name, for kill attribution.
    pub owner_name: String,
    /// Owner team at launch time; teammates are never hit.
    pub owner_team: Option<String>,
    /// Position, world px.
    pub x: f32,
    /// Position, world px.
    pub y: f32,
    /// Velocity, px/tick.
    pub vx: f32,
    /// Velocity, px/tick.
    pub vy: f32,
    /// Muzzle speed, px/tick.
    pub speed: f32,
    /// Damage applied on hit.
    pub damage: u32,
    /// Collision radius against agent bodies.
    pub hit_radius: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Facing, radians; follows velocity.
    pub rotation: f32,
    /// Ticks until expiry.
    pub ticks_remaining: u16,
    /// Ring of prior positions for the trail.
    pub trail: [(f32, f32); PROJECTILE_TRAIL_LEN],
    /// Valid trail points.
    pub trail_len: u8,
    trail_head: u8,
}

impl Projectile {
    /// Launches a projectile from `(x, y)` toward `(tx, ty)` with the
    /// weapon's muzzle speed and the given rolled damage.
    pub fn launch(
        owner_id: u32,
        owner_name: String,
        owner_team: Option<String>,
        weapon: WeaponId,
        x: f32,
        y: f32,
        tx: f32,
        ty: f32,
        damage: u32,
    ) -> Self {
        let speed = anim(weapon).projectile_speed;
        let (dx, dy) = (tx - x, ty - y);
        let dist = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
        let vx = dx / dist * speed;
        let vy = dy / dist * speed;
        Self {
            owner_id,
            owner_name,
            owner_team,
            x,
            y,
            vx,
            vy,
            speed,
            damage,
            hit_radius: 26.0,
            color: stats(weapon).color,
            rotation: vy.atan2(vx),
            ticks_remaining: PROJECTILE_LIFETIME_TICKS,
            trail: [(x, y); PROJECTILE_TRAIL_LEN],
            trail_len: 0,
            trail_head: 0,
        }
    }

    /// Advances one tick: records the trail point, integrates position,
    /// re-aims the sprite along the velocity, burns lifetime.
    pub fn step(&mut self) {
        self.trail[self.trail_head as usize] = (self.x, self.y);
        self.trail_head = (self.trail_head + 1) % PROJECTILE_TRAIL_LEN as u8;
        if (self.trail_len as usize) < PROJECTILE_TRAIL_LEN {
            self.trail_len += 1;
        }
        self.x += self.vx;
        self.y += self.vy;
        self.rotation = self.vy.atan2(self.vx);
        self.ticks_remaining = self.ticks_remaining.saturating_sub(1);
    }

    /// Whether the projectile is past its lifetime or outside the padded
    /// world rectangle.
    pub fn expired(&self, world_w: f32, world_h: f32) -> bool {
        self.ticks_remaining == 0
            || self.x < -WORLD_PAD
            || self.y < -WORLD_PAD
            || self.x > world_w + WORLD_PAD
            || self.y > world_h + WORLD_PAD
    }

    /// Trail points ordered oldest first, regardless of ring wrap.
    pub fn trail_points(&self) -> [(f32, f32); PROJECTILE_TRAIL_LEN] {
        let mut out = [(self.x, self.y); PROJECTILE_TRAIL_LEN];
        let len = self.trail_len as usize;
        for (i, slot) in out.iter_mut().enumerate().take(len) {
            let idx = if len == PROJECTILE_TRAIL_LEN {
                (self.trail_head as usize + i) % PROJECTILE_TRAIL_LEN
            } else {
                i
            };
            *slot = self.trail[idx];
        }
        out
    }

    /// Exact body-overlap test against an agent at `(ax, ay)`.
    pub fn overlaps(&self, ax: f32, ay: f32, agent_radius: f32) -> bool {
        let dx = ax - self.x;
        let dy = ay - self.y;
        let reach = self.hit_radius + agent_radius;
        dx * dx + dy * dy <= reach * reach
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bolt() -> Projectile {
        Projectile::launch(
            7,
            "robin".into(),
            None,
            WeaponId::Bow,
            100.0,
            100.0,
            300.0,
            100.0,
            20,
        )
    }

    #[test]
    fn launch_aims_at_target() {
        let p = bolt();
        assert!(p.vx > 0.0);
        assert_eq!(p.vy, 0.0);
        assert_eq!(p.rotation, 0.0);
        assert_eq!(p.ticks_remaining, PROJECTILE_LIFETIME_TICKS);
    }

    #[test]
    fn step_advances_and_records_trail() {
        let mut p = bolt();
        let speed = p.speed;
        p.step();
        assert_eq!(p.x, 100.0 + speed);
        assert_eq!(p.trail_len, 1);
        assert_eq!(p.trail[0], (100.0, 100.0));
    }

    #[test]
    fn expires_by_lifetime() {
        let mut p = bolt();
        p.vx = 0.0; // hover inside the world
        for _ in 0..PROJECTILE_LIFETIME_TICKS {
            assert!(!p.expired(1280.0, 720.0));
            p.step();
        }
        assert!(p.expired(1280.0, 720.0));
    }

    #[test]
    fn expires_outside_padded_rect() {
        let mut p = bolt();
        p.x = 1280.0 + WORLD_PAD + 1.0;
        assert!(p.expired(1280.0, 720.0));
        p.x = 1280.0 + WORLD_PAD - 1.0;
        assert!(!p.expired(1280.0, 720.0));
    }

    #[test]
    fn overlap_uses_combined_radius() {
        let p = bolt();
        assert!(p.overlaps(100.0 + p.hit_radius + 29.0, 100.0, 30.0));
        assert!(!p.overlaps(100.0 + p.hit_radius + 31.0, 100.0, 30.0));
    }
}
