// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Transient visual effects: particles, floating texts, attack visuals,
//! weapon trails, impact flashes, screen shake.
//!
//! Every category has a hard cap; spawns beyond a cap are silent no-ops so
//! snapshot slices never overflow. Advancing compacts in place and never
//! allocates.

use crate::constants::{
    MAX_EFFECTS, MAX_FLASHES, MAX_PARTICLES, MAX_TEXTS, MAX_TRAILS, SHAKE_MAX_INTENSITY,
    WEAPON_TRAIL_LEN,
};

/// A short-lived physics particle.
#[derive(Debug, Clone, Copy)]
pub struct Particle {
    /// Position, world px.
    pub x: f32,
    /// Position, world px.
    pub y: f32,
    /// Velocity, px/s.
    pub vx: f32,
    /// Velocity, px/s.
    pub vy: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Opacity in `[0, 1]`.
    pub alpha: f32,
    /// Seconds left to live.
    pub life: f32,
}

/// Floating combat text (damage numbers, kill callouts).
#[derive(Debug, Clone)]
pub struct FloatingText {
    /// Position, world px.
    pub x: f32,
    /// Position, world px.
    pub y: f32,
    /// Upward drift, px/s (negative is up in screen space).
    pub vy: f32,
    /// Rendered string.
    pub text: String,
    /// RGB color.
    pub color: [u8; 3],
    /// Opacity in `[0, 1]`.
    pub alpha: f32,
}

/// Attack visual from source toward target.
#[derive(Debug, Clone, Copy)]
pub struct AttackEffect {
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
    /// Seconds left to live.
    pub timer: f32,
}

/// Fixed-size ring of recent weapon tip positions.
#[derive(Debug, Clone, Copy)]
pub struct WeaponTrail {
    /// Ring of tip positions.
    pub points: [(f32, f32); WEAPON_TRAIL_LEN],
    /// Number of valid points.
    pub len: u8,
    /// Index the next point overwrites.
    pub head: u8,
    /// RGB color.
    pub color: [u8; 3],
    /// Owning agent id.
    pub player_id: u32,
    /// Seconds left to live.
    pub timer: f32,
}

impl WeaponTrail {
    /// Creates an empty trail for `player_id`.
    pub fn new(player_id: u32, color: [u8; 3], timer: f32) -> Self {
        Self {
            points: [(0.0, 0.0); WEAPON_TRAIL_LEN],
            len: 0,
            head: 0,
            color,
            player_id,
            timer,
        }
    }

    /// Pushes a tip position, overwriting the oldest when full.
    pub fn push(&mut self, x: f32, y: f32) {
        self.points[self.head as usize] = (x, y);
        self.head = (self.head + 1) % WEAPON_TRAIL_LEN as u8;
        if (self.len as usize) < WEAPON_TRAIL_LEN {
            self.len += 1;
        }
    }
}

/// Expanding impact flash.
#[derive(Debug, Clone, Copy)]
pub struct ImpactFlash {
    /// Center position.
    pub x: f32,
    /// Center position.
    pub y: f32,
    /// Current radius; grows toward `max_radius`.
    pub radius: f32,
    /// Radius ceiling.
    pub max_radius: f32,
    /// RGB color.
    pub color: [u8; 3],
    /// Seconds left to live.
    pub timer: f32,
}

/// Screen shake with a deterministic per-tick offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScreenShake {
    /// Current intensity, px.
    pub intensity: f32,
    /// Seconds of shake left.
    pub duration: f32,
    /// Computed x offset for the frame.
    pub offset_x: f32,
    /// Computed y offset for the frame.
    pub offset_y: f32,
}

impl ScreenShake {
    /// Stacks a new shake, clamping accumulated intensity.
    pub fn add(&mut self, intensity: f32, duration: f32) {
        self.intensity = (self.intensity + intensity).min(SHAKE_MAX_INTENSITY);
        self.duration = self.duration.max(duration);
    }

    /// Advances the shake and derives the frame offset from the tick seed
    /// and the remaining duration, so replays with the same seed chain
    /// shake identically.
    pub fn advance(&mut self, dt: f32, seed: u64) {
        if self.duration <= 0.0 {
            self.intensity = 0.0;
            self.offset_x = 0.0;
            self.offset_y = 0.0;
            return;
        }
        self.duration -= dt;
        let phase = (seed & 0xffff) as f32 * 1.0e-3 + self.duration * 47.0;
        self.offset_x = phase.sin() * self.intensity;
        self.offset_y = (phase * 1.31).cos() * self.intensity;
        self.intensity *= 0.88;
        if self.duration <= 0.0 || self.intensity < 0.05 {
            self.intensity = 0.0;
            self.duration = 0.0;
            self.offset_x = 0.0;
            self.offset_y = 0.0;
        }
    }
}

/// Owning pool for every transient category.
#[derive(Debug)]
pub struct TransientEffects {
    /// Live particles.
    pub particles: Vec<Particle>,
    /// Live floating texts.
    pub texts: Vec<FloatingText>,
    /// Live attack visuals.
    pub effects: Vec<AttackEffect>,
    /// Live weapon trails.
    pub trails: Vec<WeaponTrail>,
    /// Live impact flashes.
    pub flashes: Vec<ImpactFlash>,
    /// The single screen-shake accumulator.
    pub shake: ScreenShake,
}

impl TransientEffects {
    /// Pre-sizes every pool to its cap.
    pub fn new() -> Self {
        Self {
            particles: Vec::with_capacity(MAX_PARTICLES),
            texts: Vec::with_capacity(MAX_TEXTS),
            effects: Vec::with_capacity(MAX_EFFECTS),
            trails: Vec::with_capacity(MAX_TRAILS),
            flashes: Vec::with_capacity(MAX_FLASHES),
            shake: ScreenShake::default(),
        }
    }

    /// Spawns a particle; no-op at the cap.
    pub fn spawn_particle(&mut self, p: Particle) {
        if self.particles.len() < MAX_PARTICLES {
            self.particles.push(p);
        }
    }

    /// Spawns a floating text; no-op at the cap.
    pub fn spawn_text(&mut self, t: FloatingText) {
        if self.texts.len() < MAX_TEXTS {
            self.texts.push(t);
        }
    }

    /// Spawns an attack visual; no-op at the cap.
    pub fn spawn_effect(&mut self, e: AttackEffect) {
        if self.effects.len() < MAX_EFFECTS {
            self.effects.push(e);
        }
    }

    /// Spawns a weapon trail; no-op at the cap.
    pub fn spawn_trail(&mut self, t: WeaponTrail) {
        if self.trails.len() < MAX_TRAILS {
            self.trails.push(t);
        }
    }

    /// Spawns an impact flash; no-op at the cap.
    pub fn spawn_flash(&mut self, f: ImpactFlash) {
        if self.flashes.len() < MAX_FLASHES {
            self.flashes.push(f);
        }
    }

    /// Advances every category one tick with in-place compaction.
    pub fn advance(&mut self, dt: f32, seed: u64) {
        self.particles.retain_mut(|p| {
            p.x += p.vx * dt;
            p.y += p.vy * dt;
            p.vy += 260.0 * dt; // gravity pull on debris
            p.alpha -= 1.6 * dt;
            p.life -= dt;
            p.life > 0.0 && p.alpha > 0.0
        });
        self.texts.retain_mut(|t| {
            t.y += t.vy * dt;
            t.alpha -= 1.1 * dt;
            t.alpha > 0.0
        });
        self.effects.retain_mut(|e| {
            e.timer -= dt;
            e.timer > 0.0
        });
        self.trails.retain_mut(|t| {
            t.timer -= dt;
            t.timer > 0.0
        });
        self.flashes.retain_mut(|f| {
            f.timer -= dt;
            f.radius = (f.radius + (f.max_radius - f.radius) * 9.0 * dt).min(f.max_radius);
            f.timer > 0.0
        });
        self.shake.advance(dt, seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particle_cap_drops_silently() {
        let mut fx = TransientEffects::new();
        for _ in 0..(MAX_PARTICLES + 50) {
            fx.spawn_particle(Particle {
                x: 0.0,
                y: 0.0,
                vx: 0.0,
                vy: 0.0,
                color: [255, 0, 0],
                alpha: 1.0,
                life: 1.0,
            });
        }
        assert_eq!(fx.particles.len(), MAX_PARTICLES);
    }

    #[test]
    fn advance_compacts_expired() {
        let mut fx = TransientEffects::new();
        fx.spawn_effect(AttackEffect {
            from_x: 0.0,
            from_y: 0.0,
            to_x: 10.0,
            to_y: 0.0,
            color: [255, 255, 255],
            timer: 0.05,
        });
        fx.spawn_effect(AttackEffect {
            from_x: 0.0,
            from_y: 0.0,
            to_x: 10.0,
            to_y: 0.0,
            color: [255, 255, 255],
            timer: 1.0,
        });
        fx.advance(0.1, 1);
        assert_eq!(fx.effects.len(), 1);
    }

    #[test]
    fn trail_ring_overwrites_oldest() {
        let mut t = WeaponTrail::new(1, [255, 255, 255], 1.0);
        for i in 0..(WEAPON_TRAIL_LEN + 2) {
            t.push(i as f32, 0.0);
        }
        assert_eq!(t.len as usize, WEAPON_TRAIL_LEN);
        // the two oldest points were overwritten
        assert_eq!(t.points[0].0, WEAPON_TRAIL_LEN as f32);
        assert_eq!(t.points[1].0, WEAPON_TRAIL_LEN as f32 + 1.0);
    }

    #[test]
    fn shake_intensity_clamps_and_decays() {
        let mut s = ScreenShake::default();
        s.add(20.0, 0.4);
        s.add(20.0, 0.4);
        assert_eq!(s.intensity, SHAKE_MAX_INTENSITY);
        let mut ticks = 0;
        while s.intensity > 0.0 {
            s.advance(1.0 / 30.0, 0xdead_beef);
            ticks += 1;
            assert!(ticks < 120, "shake never settled");
        }
        assert_eq!(s.offset_x, 0.0);
        assert_eq!(s.offset_y, 0.0);
    }

    #[test]
    fn shake_offset_is_deterministic_in_seed() {
        let mut a = ScreenShake::default();
        let mut b = ScreenShake::default();
        a.add(10.0, 0.5);
        b.add(10.0, 0.5);
        for _ in 0..5 {
            a.advance(1.0 / 30.0, 42);
            b.advance(1.0 / 30.0, 42);
        }
        assert_eq!(a.offset_x, b.offset_x);
        assert_eq!(a.offset_y, b.offset_y);
    }
}
