// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Closed weapon catalog: stats, animation config, hitbox shapes, combos.
//!
//! The catalog is three read-only tables keyed by [`WeaponId`] plus a combo
//! table. Dispatch is by variant tag; there is no trait object in the hot
//! path. Every non-projectile weapon keeps `range > 60` (twice the agent
//! collision radius) so melee reach always clears two touching bodies.

use serde::{Deserialize, Serialize};

use crate::prng::Prng;

/// Closed set of weapon identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeaponId {
    /// Starter weapon; every agent spawns with it.
    Fists,
    /// Fast, short reach, long combo chain.
    Dagger,
    /// Balanced arc swing.
    Sword,
    /// Long thrust along a line.
    Spear,
    /// Slow wide arc, heavy hits.
    Axe,
    /// Slowest swing, highest damage, radial impact.
    Hammer,
    /// The only projectile weapon.
    Bow,
}

impl WeaponId {
    /// Every catalog entry, in display order.
    pub const ALL: [WeaponId; 7] = [
        WeaponId::Fists,
        WeaponId::Dagger,
        WeaponId::Sword,
        WeaponId::Spear,
        WeaponId::Axe,
        WeaponId::Hammer,
        WeaponId::Bow,
    ];

    /// Lowercase catalog name.
    pub fn name(self) -> &'static str {
        match self {
            WeaponId::Fists => "fists",
            WeaponId::Dagger => "dagger",
            WeaponId::Sword => "sword",
            WeaponId::Spear => "spear",
            WeaponId::Axe => "axe",
            WeaponId::Hammer => "hammer",
            WeaponId::Bow => "bow",
        }
    }

    /// Parses a catalog name; `None` for anything outside the closed set.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fists" => Some(WeaponId::Fists),
            "dagger" => Some(WeaponId::Dagger),
            "sword" => Some(WeaponId::Sword),
            "spear" => Some(WeaponId::Spear),
            "axe" => Some(WeaponId::Axe),
            "hammer" => Some(WeaponId::Hammer),
            "bow" => Some(WeaponId::Bow),
            _ => None,
        }
    }

    /// Whether attacks spawn a projectile instead of resolving a hitbox.
    pub fn is_projectile(self) -> bool {
        matches!(self, WeaponId::Bow)
    }
}

/// Static combat numbers for one weapon.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WeaponStats {
    /// Damage roll lower bound.
    pub min_damage: u32,
    /// Damage roll upper bound (inclusive).
    pub max_damage: u32,
    /// Reach in world px (projectile: max flight range).
    pub range: f32,
    /// Seconds between attacks.
    pub cooldown_secs: f32,
    /// Shop price in currency.
    pub price: u32,
    /// Display color, RGB.
    pub color: [u8; 3],
}

/// Trail visual drawn while the weapon swings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailKind {
    /// No trail.
    None,
    /// Arc sweep following the swing.
    Arc,
    /// Straight thrust line.
    Line,
    /// Radial burst on impact.
    Radial,
    /// Trail rides the projectile itself.
    Projectile,
}

/// Animation timing and motion parameters for one weapon.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AnimConfig {
    /// Ticks of wind-up before the hit lands.
    pub windup_ticks: u16,
    /// Ticks the attack visual stays active (`is_attacking` window).
    pub active_ticks: u16,
    /// Ticks of recovery after the active window.
    pub recovery_ticks: u16,
    /// Forward lunge applied to the attacker, px/s.
    pub lunge: f32,
    /// Backward recoil applied to the victim on top of knockback, px/s.
    pub recoil: f32,
    /// Trail visual.
    pub trail: TrailKind,
    /// Swing arc width in radians (arc weapons).
    pub arc_width: f32,
    /// Seconds of stun applied on hit.
    pub hit_stun_secs: f32,
    /// Knockback impulse applied to the victim, px/s.
    pub knockback: f32,
    /// Projectile muzzle speed, px/tick (projectile weapons only).
    pub projectile_speed: f32,
}

/// Hitbox geometry, dispatched by variant tag.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum HitboxShape {
    /// Disk around the attacker.
    Circle {
        /// Disk radius.
        range: f32,
    },
    /// Wedge centered on the attack facing.
    Arc {
        /// Wedge radius.
        range: f32,
        /// Half the wedge angle, radians.
        half_width: f32,
    },
    /// Thrust of the given width along the attack facing.
    Line {
        /// Thrust length.
        range: f32,
        /// Full thrust width, px.
        width: f32,
    },
    /// Resolved by projectile flight, never by a melee test.
    Projectile {
        /// Maximum flight range.
        range: f32,
    },
}

impl HitboxShape {
    /// Pure geometric hit test.
    ///
    /// `(dx, dy)` is victim minus attacker; `facing` is the attack angle.
    /// Depends only on Euclidean geometry and the shape — never on world
    /// state. The projectile variant always misses here; flight handles it.
    pub fn contains(self, dx: f32, dy: f32, facing: f32) -> bool {
        let dist = (dx * dx + dy * dy).sqrt();
        match self {
            HitboxShape::Circle { range } => dist <= range,
            HitboxShape::Arc { range, half_width } => {
                dist <= range && angle_delta(dy.atan2(dx), facing).abs() <= half_width
            }
            HitboxShape::Line { range, width } => {
                if dist > range || dist <= f32::EPSILON {
                    return dist <= range;
                }
                let half_angle = (width.atan2(dist)).abs();
                angle_delta(dy.atan2(dx), facing).abs() <= half_angle
            }
            HitboxShape::Projectile { .. } => false,
        }
    }
}

/// Combo rules for one weapon.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ComboSpec {
    /// Maximum chained hits.
    pub max_hits: u8,
    /// Ticks the combo window stays open after a hit.
    pub window_ticks: u16,
    /// Damage multiplier per hit number (index `hit - 1`).
    pub scale: &'static [f32],
}

/// Stats table.
pub fn stats(id: WeaponId) -> &'static WeaponStats {
    match id {
        WeaponId::Fists => &WeaponStats {
            min_damage: 8,
            max_damage: 14,
            range: 80.0,
            cooldown_secs: 0.5,
            price: 0,
            color: [224, 200, 160],
        },
        WeaponId::Dagger => &WeaponStats {
            min_damage: 10,
            max_damage: 16,
            range: 70.0,
            cooldown_secs: 0.35,
            price: 100,
            color: [180, 220, 255],
        },
        WeaponId::Sword => &WeaponStats {
            min_damage: 16,
            max_damage: 24,
            range: 110.0,
            cooldown_secs: 0.7,
            price: 250,
            color: [200, 200, 210],
        },
        WeaponId::Spear => &WeaponStats {
            min_damage: 14,
            max_damage: 22,
            range: 150.0,
            cooldown_secs: 0.8,
            price: 350,
            color: [190, 160, 110],
        },
        WeaponId::Axe => &WeaponStats {
            min_damage: 22,
            max_damage: 34,
            range: 95.0,
            cooldown_secs: 1.0,
            price: 400,
            color: [160, 120, 90],
        },
        WeaponId::Hammer => &WeaponStats {
            min_damage: 30,
            max_damage: 46,
            range: 90.0,
            cooldown_secs: 1.4,
            price: 500,
            color: [130, 130, 140],
        },
        WeaponId::Bow => &WeaponStats {
            min_damage: 18,
            max_damage: 26,
            range: 420.0,
            cooldown_secs: 1.1,
            price: 600,
            color: [230, 210, 120],
        },
    }
}

/// Animation table.
pub fn anim(id: WeaponId) -> &'static AnimConfig {
    match id {
        WeaponId::Fists => &AnimConfig {
            windup_ticks: 2,
            active_ticks: 4,
            recovery_ticks: 3,
            lunge: 180.0,
            recoil: 40.0,
            trail: TrailKind::None,
            arc_width: 0.0,
            hit_stun_secs: 0.15,
            knockback: 90.0,
            projectile_speed: 0.0,
        },
        WeaponId::Dagger => &AnimConfig {
            windup_ticks: 1,
            active_ticks: 3,
            recovery_ticks: 2,
            lunge: 220.0,
            recoil: 30.0,
            trail: TrailKind::Line,
            arc_width: 0.0,
            hit_stun_secs: 0.1,
            knockback: 60.0,
            projectile_speed: 0.0,
        },
        WeaponId::Sword => &AnimConfig {
            windup_ticks: 3,
            active_ticks: 5,
            recovery_ticks: 4,
            lunge: 140.0,
            recoil: 60.0,
            trail: TrailKind::Arc,
            arc_width: 1.4,
            hit_stun_secs: 0.2,
            knockback: 130.0,
            projectile_speed: 0.0,
        },
        WeaponId::Spear => &AnimConfig {
            windup_ticks: 4,
            active_ticks: 4,
            recovery_ticks: 5,
            lunge: 120.0,
            recoil: 70.0,
            trail: TrailKind::Line,
            arc_width: 0.0,
            hit_stun_secs: 0.2,
            knockback: 150.0,
            projectile_speed: 0.0,
        },
        WeaponId::Axe => &AnimConfig {
            windup_ticks: 5,
            active_ticks: 5,
            recovery_ticks: 6,
            lunge: 110.0,
            recoil: 90.0,
            trail: TrailKind::Arc,
            arc_width: 1.8,
            hit_stun_secs: 0.3,
            knockback: 190.0,
            projectile_speed: 0.0,
        },
        WeaponId::Hammer => &AnimConfig {
            windup_ticks: 7,
            active_ticks: 4,
            recovery_ticks: 8,
            lunge: 90.0,
            recoil: 120.0,
            trail: TrailKind::Radial,
            arc_width: 0.0,
            hit_stun_secs: 0.45,
            knockback: 260.0,
            projectile_speed: 0.0,
        },
        WeaponId::Bow => &AnimConfig {
            windup_ticks: 5,
            active_ticks: 2,
            recovery_ticks: 4,
            lunge: 0.0,
            recoil: 20.0,
            trail: TrailKind::Projectile,
            arc_width: 0.0,
            hit_stun_secs: 0.1,
            knockback: 70.0,
            projectile_speed: 14.0,
        },
    }
}

/// Hitbox table.
pub fn hitbox(id: WeaponId) -> HitboxShape {
    match id {
        WeaponId::Fists => HitboxShape::Circle { range: 80.0 },
        WeaponId::Dagger => HitboxShape::Circle { range: 70.0 },
        WeaponId::Sword => HitboxShape::Arc {
            range: 110.0,
            half_width: 0.7,
        },
        WeaponId::Spear => HitboxShape::Line {
            range: 150.0,
            width: 28.0,
        },
        WeaponId::Axe => HitboxShape::Arc {
            range: 95.0,
            half_width: 0.9,
        },
        WeaponId::Hammer => HitboxShape::Circle { range: 90.0 },
        WeaponId::Bow => HitboxShape::Projectile { range: 420.0 },
    }
}

/// Combo table.
pub fn combo(id: WeaponId) -> &'static ComboSpec {
    match id {
        WeaponId::Fists => &ComboSpec {
            max_hits: 4,
            window_ticks: 10,
            scale: &[1.0, 1.1, 1.2, 1.5],
        },
        WeaponId::Dagger => &ComboSpec {
            max_hits: 5,
            window_ticks: 8,
            scale: &[1.0, 1.05, 1.1, 1.2, 1.4],
        },
        WeaponId::Sword => &ComboSpec {
            max_hits: 3,
            window_ticks: 12,
            scale: &[1.0, 1.15, 1.35],
        },
        WeaponId::Spear => &ComboSpec {
            max_hits: 2,
            window_ticks: 12,
            scale: &[1.0, 1.25],
        },
        WeaponId::Axe => &ComboSpec {
            max_hits: 2,
            window_ticks: 14,
            scale: &[1.0, 1.3],
        },
        WeaponId::Hammer => &ComboSpec {
            max_hits: 1,
            window_ticks: 0,
            scale: &[1.0],
        },
        WeaponId::Bow => &ComboSpec {
            max_hits: 1,
            window_ticks: 0,
            scale: &[1.0],
        },
    }
}

/// Rolls damage uniformly in `[min_damage, max_damage]`.
pub fn roll_damage(id: WeaponId, rng: &mut Prng) -> u32 {
    let s = stats(id);
    rng.range_i32(s.min_damage as i32, s.max_damage as i32) as u32
}

/// Signed smallest difference between two angles, in `(-PI, PI]`.
pub fn angle_delta(a: f32, b: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut d = (a - b) % TAU;
    if d > PI {
        d -= TAU;
    } else if d < -PI {
        d += TAU;
    }
    d
}
