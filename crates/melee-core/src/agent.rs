// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Agent entity: identity, motion, combat sub-state, lifecycle.
//!
//! Agents are owned exclusively by the simulation kernel and mutated only
//! under its write lock. Invariants maintained here and in `combat`:
//! `0 <= hp <= max_hp`, `is_dead == (hp == 0)`, `is_dead` implies
//! `lifecycle == Dead`, `spawn_protection == (spawn_timer > 0)`,
//! `stamina in [0, MAX_STAMINA]`, `combo_count <= weapon max hits`.

use serde::Serialize;

use crate::constants::{
    DEFAULT_MAX_HP, MAX_STAMINA, RAGDOLL_SECS, SPAWN_PROTECT_JOIN_SECS,
    SPAWN_PROTECT_RESPAWN_SECS, STAMINA_REGEN_PER_SEC,
};
use crate::prng::Prng;
use crate::weapon::{combo, WeaponId};

/// Agent lifecycle per the join/death/rejoin state machine.
///
/// `Dead -> Alive` happens only via an explicit rejoin; the ragdoll
/// animation ending does not respawn anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    /// Never joined, or removed.
    Out,
    /// Participating in combat, collision, and AI.
    Alive,
    /// Killed; waiting for an explicit rejoin.
    Dead,
}

/// Caller-designated preferred target.
#[derive(Debug, Clone, Serialize)]
pub struct Focus {
    /// Target agent name, resolved on use.
    pub target: String,
    /// Remaining validity in seconds.
    pub ttl_secs: f32,
}

/// Short-lived chat bubble rendered above the agent.
#[derive(Debug, Clone, Serialize)]
pub struct ChatBubble {
    /// Bubble text, already length-clamped by the command layer.
    pub text: String,
    /// Remaining display time in seconds.
    pub ttl_secs: f32,
}

/// Combat sub-state advanced on the tick timeline.
///
/// `attack_active_ticks` replaces the source's detached flag-clearing task:
/// the per-agent timer phase counts it down and clears `is_attacking` when
/// it reaches zero, so the behavior is testable by tick count.
#[derive(Debug, Clone, Copy, Default)]
pub struct CombatState {
    /// Hits landed in the current combo chain.
    pub combo_count: u8,
    /// Ticks left in the combo window; expiry resets the chain.
    pub combo_window_ticks: u16,
    /// Ticks left in the current dodge roll.
    pub dodge_ticks: u16,
    /// Ticks until the next dodge is allowed.
    pub dodge_cooldown_ticks: u16,
    /// Dodge direction in radians.
    pub dodge_dir: f32,
    /// Invulnerability frames remaining.
    pub invuln_ticks: u16,
    /// Tick number of the last attack.
    pub last_attack_tick: u64,
    /// Ticks until `is_attacking` clears.
    pub attack_active_ticks: u16,
}

/// A combatant in the arena.
#[derive(Debug, Clone)]
pub struct Agent {
    /// Stable unique id.
    pub id: u32,
    /// Human-visible name, unique within the active population.
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
    /// Spendable currency.
    pub money: u32,
    /// Lifetime kill count.
    pub kills: u32,
    /// Lifetime death count.
    pub deaths: u32,
    /// Equipped weapon.
    pub weapon: WeaponId,
    /// Attack facing in radians.
    pub attack_angle: f32,
    /// Aggression scalar in `[0.5, 1.0]`; scales engage ranges.
    pub aggression: f32,
    /// Stamina in `[0, MAX_STAMINA]`.
    pub stamina: f32,
    /// Hp reached zero.
    pub is_dead: bool,
    /// Post-death physics animation in progress.
    pub is_ragdoll: bool,
    /// Damage is nullified while set.
    pub spawn_protection: bool,
    /// Attack animation active.
    pub is_attacking: bool,
    /// Stunned; no motion or attacks.
    pub is_stunned: bool,
    /// Dodge roll in progress.
    pub is_dodging: bool,
    /// Seconds of spawn protection left.
    pub spawn_timer: f32,
    /// Seconds of stun left.
    pub stun_timer: f32,
    /// Seconds until the next attack is allowed.
    pub attack_cooldown: f32,
    /// Seconds of ragdoll animation left.
    pub ragdoll_timer: f32,
    /// Ragdoll spin, radians/s.
    pub ragdoll_spin: f32,
    /// Visual body rotation while ragdolling.
    pub rotation: f32,
    /// Combat sub-state.
    pub combat: CombatState,
    /// Optional focus target.
    pub focus: Option<Focus>,
    /// Optional team id; teammates never damage each other.
    pub team: Option<String>,
    /// Optional chat bubble.
    pub bubble: Option<ChatBubble>,
    /// Lifecycle state.
    pub lifecycle: Lifecycle,
    /// Profile image reference for the renderer.
    pub profile_pic: Option<String>,
    /// Body color, RGB.
    pub color: [u8; 3],
}

impl Agent {
    /// Creates a fresh agent at a seeded-random position within 10–90% of
    /// the world extents, with join spawn protection.
    pub fn spawn(
        id: u32,
        name: String,
        profile_pic: Option<String>,
        rng: &mut Prng,
        world_w: f32,
        world_h: f32,
    ) -> Self {
        let x = rng.range_f32(world_w * 0.1, world_w * 0.9);
        let y = rng.range_f32(world_h * 0.1, world_h * 0.9);
        Self {
            id,
            name,
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            hp: DEFAULT_MAX_HP,
            max_hp: DEFAULT_MAX_HP,
            money: 0,
            kills: 0,
            deaths: 0,
            weapon: WeaponId::Fists,
            attack_angle: rng.angle(),
            aggression: rng.range_f32(0.5, 1.0),
            stamina: MAX_STAMINA,
            is_dead: false,
            is_ragdoll: false,
            spawn_protection: true,
            is_attacking: false,
            is_stunned: false,
            is_dodging: false,
            spawn_timer: SPAWN_PROTECT_JOIN_SECS,
            stun_timer: 0.0,
            attack_cooldown: 0.0,
            ragdoll_timer: 0.0,
            ragdoll_spin: 0.0,
            rotation: 0.0,
            combat: CombatState::default(),
            focus: None,
            team: None,
            bubble: None,
            lifecycle: Lifecycle::Alive,
            profile_pic,
            color: body_color(rng),
        }
    }

    /// Rejoin after death: reset combat state, restore hp and stamina,
    /// reseat randomly, grant respawn protection.
    pub fn respawn(&mut self, rng: &mut Prng, world_w: f32, world_h: f32) {
        self.x = rng.range_f32(world_w * 0.1, world_w * 0.9);
        self.y = rng.range_f32(world_h * 0.1, world_h * 0.9);
        self.vx = 0.0;
        self.vy = 0.0;
        self.hp = self.max_hp;
        self.stamina = MAX_STAMINA;
        self.is_dead = false;
        self.is_ragdoll = false;
        self.is_attacking = false;
        self.is_stunned = false;
        self.is_dodging = false;
        self.spawn_protection = true;
        self.spawn_timer = SPAWN_PROTECT_RESPAWN_SECS;
        self.stun_timer = 0.0;
        self.attack_cooldown = 0.0;
        self.ragdoll_timer = 0.0;
        self.ragdoll_spin = 0.0;
        self.rotation = 0.0;
        self.combat = CombatState::default();
        self.focus = None;
        self.lifecycle = Lifecycle::Alive;
    }

    /// Death transition: clears focus, starts the ragdoll with randomized
    /// spin, bumps the death counter. The agent stays `Dead` until rejoin.
    pub fn die(&mut self, rng: &mut Prng) {
        self.hp = 0;
        self.is_dead = true;
        self.is_attacking = false;
        self.is_stunned = false;
        self.is_dodging = false;
        self.is_ragdoll = true;
        self.ragdoll_timer = RAGDOLL_SECS;
        self.ragdoll_spin = rng.range_f32(-6.0, 6.0);
        self.deaths += 1;
        self.focus = None;
        self.combat = CombatState::default();
        self.lifecycle = Lifecycle::Dead;
    }

    /// Restores hit points up to `max_hp`. Fails on the dead.
    pub fn heal(&mut self, amount: u32) -> bool {
        if self.is_dead || self.lifecycle != Lifecycle::Alive {
            return false;
        }
        self.hp = (self.hp + amount).min(self.max_hp);
        true
    }

    /// Whether attacks can land on this agent right now.
    pub fn can_be_hit(&self) -> bool {
        !self.is_dead
            && !self.is_ragdoll
            && !self.spawn_protection
            && self.combat.invuln_ticks == 0
            && self.lifecycle == Lifecycle::Alive
    }

    /// Per-tick timer phase.
    ///
    /// Decrements every countdown, clears the flags tied to them, and
    /// regenerates stamina linearly. Combo reset on window expiry lives
    /// here so a whiffed chain decays without an attack landing.
    pub fn update_timers(&mut self, dt: f32) {
        if self.combat.combo_window_ticks > 0 {
            self.combat.combo_window_ticks -= 1;
            if self.combat.combo_window_ticks == 0 {
                self.combat.combo_count = 0;
            }
        }
        if self.combat.dodge_ticks > 0 {
            self.combat.dodge_ticks -= 1;
            if self.combat.dodge_ticks == 0 {
                self.is_dodging = false;
            }
        }
        if self.combat.dodge_cooldown_ticks > 0 {
            self.combat.dodge_cooldown_ticks -= 1;
        }
        if self.combat.invuln_ticks > 0 {
            self.combat.invuln_ticks -= 1;
        }
        if self.combat.attack_active_ticks > 0 {
            self.combat.attack_active_ticks -= 1;
            if self.combat.attack_active_ticks == 0 {
                self.is_attacking = false;
            }
        }
        if self.spawn_timer > 0.0 {
            self.spawn_timer = (self.spawn_timer - dt).max(0.0);
            if self.spawn_timer == 0.0 {
                self.spawn_protection = false;
            }
        }
        if self.stun_timer > 0.0 {
            self.stun_timer = (self.stun_timer - dt).max(0.0);
            if self.stun_timer == 0.0 {
                self.is_stunned = false;
            }
        }
        if self.attack_cooldown > 0.0 {
            self.attack_cooldown = (self.attack_cooldown - dt).max(0.0);
        }
        if let Some(focus) = &mut self.focus {
            focus.ttl_secs -= dt;
            if focus.ttl_secs <= 0.0 {
                self.focus = None;
            }
        }
        if let Some(bubble) = &mut self.bubble {
            bubble.ttl_secs -= dt;
            if bubble.ttl_secs <= 0.0 {
                self.bubble = None;
            }
        }
        self.stamina = (self.stamina + STAMINA_REGEN_PER_SEC * dt).min(MAX_STAMINA);
    }

    /// Caps the combo counter to the equipped weapon's chain length.
    ///
    /// Used after weapon swaps so a long dagger chain cannot index past a
    /// shorter scale vector.
    pub fn clamp_combo(&mut self) {
        let max = combo(self.weapon).max_hits;
        if self.combat.combo_count > max {
            self.combat.combo_count = max;
        }
    }
}

/// Rolls a body color from the display palette.
fn body_color(rng: &mut Prng) -> [u8; 3] {
    const PALETTE: [[u8; 3]; 10] = [
        [239, 83, 80],
        [171, 71, 188],
        [92, 107, 192],
        [41, 182, 246],
        [38, 166, 154],
        [156, 204, 101],
        [255, 213, 79],
        [255, 138, 101],
        [144, 164, 174],
        [240, 98, 146],
    ];
    PALETTE[rng.range_i32(0, PALETTE.len() as i32 - 1) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        let mut rng = Prng::from_seed(11);
        Agent::spawn(1, "ada".into(), None, &mut rng, 1280.0, 720.0)
    }

    #[test]
    fn spawn_position_within_inner_extents() {
        let mut rng = Prng::from_seed(3);
        for i in 0..100 {
            let a = Agent::spawn(i, format!("p{i}"), None, &mut rng, 1280.0, 720.0);
            assert!((128.0..=1152.0).contains(&a.x));
            assert!((72.0..=648.0).contains(&a.y));
            assert!(a.spawn_protection);
            assert!((0.5..=1.0).contains(&a.aggression));
        }
    }

    #[test]
    fn spawn_protection_clears_when_timer_elapses() {
        let mut a = agent();
        let dt = 1.0 / 30.0;
        let mut ticks = 0;
        while a.spawn_protection {
            a.update_timers(dt);
            ticks += 1;
            assert!(ticks < 60, "protection never cleared");
        }
        assert_eq!(a.spawn_timer, 0.0);
    }

    #[test]
    fn attacking_flag_clears_on_tick_timeline() {
        let mut a = agent();
        a.is_attacking = true;
        a.combat.attack_active_ticks = 3;
        a.update_timers(1.0 / 30.0);
        a.update_timers(1.0 / 30.0);
        assert!(a.is_attacking);
        a.update_timers(1.0 / 30.0);
        assert!(!a.is_attacking);
    }

    #[test]
    fn combo_resets_when_window_expires() {
        let mut a = agent();
        a.combat.combo_count = 3;
        a.combat.combo_window_ticks = 2;
        a.update_timers(1.0 / 30.0);
        assert_eq!(a.combat.combo_count, 3);
        a.update_timers(1.0 / 30.0);
        assert_eq!(a.combat.combo_count, 0);
    }

    #[test]
    fn death_and_respawn_round_trip() {
        let mut rng = Prng::from_seed(4);
        let mut a = agent();
        a.kills = 2;
        a.money = 150;
        a.die(&mut rng);
        assert!(a.is_dead && a.is_ragdoll);
        assert_eq!(a.lifecycle, Lifecycle::Dead);
        assert_eq!(a.hp, 0);
        assert_eq!(a.deaths, 1);
        assert!(a.focus.is_none());

        a.respawn(&mut rng, 1280.0, 720.0);
        assert_eq!(a.lifecycle, Lifecycle::Alive);
        assert_eq!(a.hp, a.max_hp);
        assert!(a.spawn_protection);
        assert_eq!(a.spawn_timer, 0.5);
        // lifetime stats survive the respawn
        assert_eq!(a.kills, 2);
        assert_eq!(a.money, 150);
        assert_eq!(a.deaths, 1);
    }

    #[test]
    fn heal_fails_on_dead() {
        let mut rng = Prng::from_seed(4);
        let mut a = agent();
        a.hp = 40;
        assert!(a.heal(30));
        assert_eq!(a.hp, 70);
        assert!(a.heal(999));
        assert_eq!(a.hp, a.max_hp);
        a.die(&mut rng);
        assert!(!a.heal(10));
        assert_eq!(a.hp, 0);
    }

    #[test]
    fn stamina_regenerates_to_cap() {
        let mut a = agent();
        a.stamina = 0.0;
        for _ in 0..400 {
            a.update_timers(1.0 / 30.0);
        }
        assert_eq!(a.stamina, MAX_STAMINA);
    }
}
