// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Attack resolution: hitboxes, combos, damage, kill credit.
//!
//! `process_attack` is the single damage gateway for melee; projectile
//! flight lands through `apply_projectile_hit`. Rejections are silent per
//! the exhaustion policy: spawn protection, invulnerability, teammates,
//! and hitbox misses all drop without side effects.

use serde_json::json;

use crate::agent::Agent;
use crate::constants::{
    ATTACK_STAMINA_COST, CRIT_CHANCE, CRIT_MULTIPLIER, KILL_REWARD, MAX_PROJECTILES,
    SHAKE_BUDGET_PER_TICK,
};
use crate::effects::{AttackEffect, FloatingText, ImpactFlash, Particle, WeaponTrail};
use crate::events::{EventLog, EventType};
use crate::kernel::WorldState;
use crate::projectile::Projectile;
use crate::weapon::{self, TrailKind, WeaponId};

/// Disjoint mutable borrows of two arena slots.
///
/// Panics in debug builds if `a == b`; callers guarantee distinctness.
pub(crate) fn pair_mut(agents: &mut [Agent], a: usize, b: usize) -> (&mut Agent, &mut Agent) {
    debug_assert_ne!(a, b, "pair_mut requires distinct indices");
    if a < b {
        let (left, right) = agents.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = agents.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

/// AI-initiated attack: pays cooldown and stamina, applies the lunge,
/// rolls damage with the crit multiplier, spawns the swing trail, then
/// resolves through [`process_attack`].
pub(crate) fn attack(world: &mut WorldState, attacker: usize, victim: usize, events: &EventLog) {
    let tick_num = world.tick_num;
    let weapon = world.agents[attacker].weapon;
    let stats = weapon::stats(weapon);
    let anim = weapon::anim(weapon);

    let (ax, ay, angle, id) = {
        let a = &mut world.agents[attacker];
        a.attack_cooldown = stats.cooldown_secs;
        a.is_attacking = true;
        a.combat.attack_active_ticks = anim.windup_ticks + anim.active_ticks;
        a.combat.last_attack_tick = tick_num;
        a.vx += a.attack_angle.cos() * anim.lunge;
        a.vy += a.attack_angle.sin() * anim.lunge;
        a.stamina = (a.stamina - ATTACK_STAMINA_COST).max(0.0);
        (a.x, a.y, a.attack_angle, a.id)
    };

    let mut damage = weapon::roll_damage(weapon, &mut world.rng);
    if world.rng.chance(CRIT_CHANCE) {
        damage = (damage as f32 * CRIT_MULTIPLIER).round() as u32;
    }

    spawn_swing_trail(world, id, ax, ay, angle, weapon);
    process_attack(world, attacker, victim, damage, events);
}

/// Resolves one attack with pre-rolled damage.
///
/// Projectile weapons spawn a bolt toward the victim's current position
/// and return. Melee rejects protected/dead/invulnerable victims and
/// teammates, applies the hitbox test, advances the combo chain, and
/// lands the scaled damage.
pub(crate) fn process_attack(
    world: &mut WorldState,
    attacker: usize,
    victim: usize,
    damage: u32,
    events: &EventLog,
) {
    let weapon = world.agents[attacker].weapon;
    if weapon.is_projectile() {
        if world.projectiles.len() < MAX_PROJECTILES {
            let a = &world.agents[attacker];
            let v = &world.agents[victim];
            let bolt = Projectile::launch(
                a.id,
                a.name.clone(),
                a.team.clone(),
                weapon,
                a.x,
                a.y,
                v.x,
                v.y,
                damage,
            );
            world.projectiles.push(bolt);
        }
        return;
    }

    {
        let v = &world.agents[victim];
        if !v.can_be_hit() {
            return;
        }
        let a = &world.agents[attacker];
        if same_team(a, v) {
            return;
        }
        let dx = v.x - a.x;
        let dy = v.y - a.y;
        if !weapon::hitbox(weapon).contains(dx, dy, a.attack_angle) {
            return;
        }
    }

    // combo: extend inside the window, else restart the chain
    let combo = weapon::combo(weapon);
    let multiplier = {
        let c = &mut world.agents[attacker].combat;
        if c.combo_window_ticks > 0 && c.combo_count < combo.max_hits {
            c.combo_count += 1;
        } else {
            c.combo_count = 1;
        }
        c.combo_window_ticks = combo.window_ticks;
        combo.scale[usize::from(c.combo_count) - 1]
    };
    let scaled = (damage as f32 * multiplier).round() as u32;

    let anim = weapon::anim(weapon);
    let (dx, dy) = {
        let a = &world.agents[attacker];
        let v = &world.agents[victim];
        let dx = v.x - a.x;
        let dy = v.y - a.y;
        let dist = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
        (dx / dist, dy / dist)
    };
    apply_damage(
        world,
        Some(attacker),
        victim,
        scaled,
        (dx, dy),
        anim.knockback,
        anim.hit_stun_secs,
        weapon::stats(weapon).color,
        events,
    );
}

/// Lands a projectile on `victim`; attribution falls back to a system
/// event when the owner has left the arena.
pub(crate) fn apply_projectile_hit(
    world: &mut WorldState,
    attacker: Option<usize>,
    victim: usize,
    p: &Projectile,
    events: &EventLog,
) {
    let speed = (p.vx * p.vx + p.vy * p.vy).sqrt().max(f32::EPSILON);
    let dir = (p.vx / speed, p.vy / speed);
    let anim = weapon::anim(WeaponId::Bow);
    apply_damage(
        world,
        attacker,
        victim,
        p.damage,
        dir,
        anim.knockback,
        anim.hit_stun_secs,
        p.color,
        events,
    );
}

/// Applies damage plus its knockback, stun, visuals, and events; handles
/// the fatal transition and kill credit.
#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_damage(
    world: &mut WorldState,
    attacker: Option<usize>,
    victim: usize,
    damage: u32,
    dir: (f32, f32),
    knockback: f32,
    stun_secs: f32,
    color: [u8; 3],
    events: &EventLog,
) {
    let attacker_info = attacker.map(|i| {
        let a = &world.agents[i];
        (a.id, a.x, a.y)
    });

    let (vx, vy, vid, fatal, hp_left) = {
        let v = &mut world.agents[victim];
        v.hp = v.hp.saturating_sub(damage);
        v.vx += dir.0 * knockback;
        v.vy += dir.1 * knockback;
        if stun_secs > 0.0 {
            v.stun_timer = v.stun_timer.max(stun_secs);
            v.is_stunned = true;
        }
        (v.x, v.y, v.id, v.hp == 0, v.hp)
    };

    spawn_hit_particles(world, vx, vy, color, 8);
    if let Some((_, ax, ay)) = attacker_info {
        world.fx.spawn_effect(AttackEffect {
            from_x: ax,
            from_y: ay,
            to_x: vx,
            to_y: vy,
            color,
            timer: 0.2,
        });
    }
    world.fx.spawn_flash(ImpactFlash {
        x: vx,
        y: vy,
        radius: 6.0,
        max_radius: 34.0,
        color,
        timer: 0.25,
    });
    add_shake(world, 3.0 + damage as f32 * 0.15, 0.25);
    world.fx.spawn_text(FloatingText {
        x: vx,
        y: vy - 36.0,
        vy: -55.0,
        text: damage.to_string(),
        color: [255, 235, 120],
        alpha: 1.0,
    });

    let attacker_id = attacker_info.map_or(0, |(id, _, _)| id);
    events.emit(
        EventType::Damage,
        world.tick_num,
        attacker_id,
        json!({ "attackerID": attacker_id, "victimID": vid, "damage": damage, "hpLeft": hp_left }),
    );

    if fatal {
        world.agents[victim].die(&mut world.rng);
        spawn_hit_particles(world, vx, vy, [200, 40, 40], 20);
        add_shake(world, 10.0, 0.45);
        if let Some(a_idx) = attacker {
            let killer = &mut world.agents[a_idx];
            killer.kills += 1;
            killer.money += KILL_REWARD;
        }
        events.emit(
            EventType::Kill,
            world.tick_num,
            attacker_id,
            json!({ "killerID": attacker_id, "victimID": vid }),
        );
    }
}

fn same_team(a: &Agent, b: &Agent) -> bool {
    matches!((&a.team, &b.team), (Some(x), Some(y)) if x == y)
}

fn add_shake(world: &mut WorldState, intensity: f32, duration: f32) {
    if world.shake_budget_used >= SHAKE_BUDGET_PER_TICK {
        return;
    }
    world.shake_budget_used += 1;
    world.fx.shake.add(intensity, duration);
}

fn spawn_hit_particles(world: &mut WorldState, x: f32, y: f32, color: [u8; 3], count: u32) {
    for _ in 0..count {
        let angle = world.rng.angle();
        let speed = world.rng.range_f32(40.0, 180.0);
        world.fx.spawn_particle(Particle {
            x,
            y,
            vx: angle.cos() * speed,
            vy: angle.sin() * speed - 60.0,
            color,
            alpha: 1.0,
            life: world.rng.range_f32(0.3, 0.7),
        });
    }
}

fn spawn_swing_trail(
    world: &mut WorldState,
    player_id: u32,
    x: f32,
    y: f32,
    angle: f32,
    weapon: WeaponId,
) {
    let anim = weapon::anim(weapon);
    let stats = weapon::stats(weapon);
    if anim.trail == TrailKind::None || anim.trail == TrailKind::Projectile {
        return;
    }
    let mut trail = WeaponTrail::new(player_id, stats.color, 0.3);
    let reach = stats.range * 0.8;
    match anim.trail {
        TrailKind::Arc => {
            // sweep across the swing wedge
            for i in 0..8 {
                let t = i as f32 / 7.0;
                let a = angle - anim.arc_width * 0.5 + anim.arc_width * t;
                trail.push(x + a.cos() * reach, y + a.sin() * reach);
            }
        }
        TrailKind::Line => {
            for i in 0..8 {
                let t = (i + 1) as f32 / 8.0;
                trail.push(x + angle.cos() * reach * t, y + angle.sin() * reach * t);
            }
        }
        TrailKind::Radial => {
            for i in 0..8 {
                let a = i as f32 / 8.0 * std::f32::consts::TAU;
                trail.push(x + a.cos() * reach, y + a.sin() * reach);
            }
        }
        TrailKind::None | TrailKind::Projectile => {}
    }
    world.fx.spawn_trail(trail);
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::events::{Event, EventLog};
    use crate::kernel::{JoinOptions, KernelConfig, WorldState};
    use tokio::sync::mpsc;

    fn world_with(names: &[&str]) -> (WorldState, EventLog, mpsc::Receiver<Event>) {
        let (log, rx) = EventLog::channel();
        let mut w = WorldState::new(KernelConfig::default());
        for n in names {
            w.add_player(n, JoinOptions::default(), &log);
        }
        (w, log, rx)
    }

    fn place(w: &mut WorldState, name: &str, x: f32, y: f32, protected: bool) {
        let idx = w.agent_index(name).expect("agent exists");
        let a = &mut w.agents[idx];
        a.x = x;
        a.y = y;
        a.attack_angle = 0.0;
        a.spawn_protection = protected;
        a.spawn_timer = if protected { 10.0 } else { 0.0 };
    }

    fn hp(w: &WorldState, name: &str) -> u32 {
        w.agents[w.agent_index(name).expect("agent exists")].hp
    }

    fn drain_kills(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
        let mut kills = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.ty == crate::events::EventType::Kill.code() {
                kills.push(ev);
            }
        }
        kills
    }

    #[test]
    fn spawn_protected_victim_takes_no_damage() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, true);
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        process_attack(&mut w, a, v, 25, &log);
        assert_eq!(hp(&w, "bob"), 100);
    }

    #[test]
    fn fatal_hit_credits_killer_and_emits() {
        let (mut w, log, mut rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, false);
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        w.agents[v].hp = 10;
        let money_before = w.agents[a].money;
        process_attack(&mut w, a, v, 50, &log);

        assert!(w.agents[v].is_dead);
        assert!(w.agents[v].is_ragdoll);
        assert_eq!(w.agents[a].kills, 1);
        assert_eq!(w.agents[a].money, money_before + 50);

        let kills = drain_kills(&mut rx);
        assert_eq!(kills.len(), 1);
        assert_eq!(kills[0].payload["killerID"], w.agents[a].id);
        assert_eq!(kills[0].payload["victimID"], w.agents[v].id);
    }

    #[test]
    fn combo_multipliers_follow_the_scale_vector() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, false);
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        // fists: MaxHits 4, scale [1.0, 1.1, 1.2, 1.5], window 10 ticks
        let mut hp_before = hp(&w, "bob");
        let expected = [10u32, 11, 12, 15, 10]; // fifth hit restarts the chain
        for want in expected {
            process_attack(&mut w, a, v, 10, &log);
            let hp_after = hp(&w, "bob");
            assert_eq!(hp_before - hp_after, want);
            hp_before = hp_after;
        }
    }

    #[test]
    fn combo_resets_outside_the_window() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, false);
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        process_attack(&mut w, a, v, 10, &log);
        process_attack(&mut w, a, v, 10, &log);
        assert_eq!(w.agents[a].combat.combo_count, 2);
        // window expires
        w.agents[a].combat.combo_window_ticks = 0;
        let before = hp(&w, "bob");
        process_attack(&mut w, a, v, 10, &log);
        assert_eq!(before - hp(&w, "bob"), 10);
        assert_eq!(w.agents[a].combat.combo_count, 1);
    }

    #[test]
    fn teammates_never_damage_each_other() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, false);
        for name in ["alice", "bob"] {
            let idx = w.agent_index(name).expect("agent");
            w.agents[idx].team = Some("red".into());
        }
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        process_attack(&mut w, a, v, 40, &log);
        assert_eq!(hp(&w, "bob"), 100);
    }

    #[test]
    fn invulnerable_victim_rejected() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 140.0, 100.0, false);
        let v = w.agent_index("bob").expect("v");
        w.agents[v].combat.invuln_ticks = 5;
        let a = w.agent_index("alice").expect("a");
        process_attack(&mut w, a, v, 40, &log);
        assert_eq!(hp(&w, "bob"), 100);
    }

    #[test]
    fn out_of_range_attack_misses_and_keeps_combo() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 400.0, 100.0, false);
        let (a, v) = (
            w.agent_index("alice").expect("a"),
            w.agent_index("bob").expect("v"),
        );
        process_attack(&mut w, a, v, 40, &log);
        assert_eq!(hp(&w, "bob"), 100);
        assert_eq!(w.agents[a].combat.combo_count, 0);
    }

    #[test]
    fn projectile_weapon_spawns_instead_of_hitting() {
        let (mut w, log, _rx) = world_with(&["alice", "bob"]);
        place(&mut w, "alice", 100.0, 100.0, false);
        place(&mut w, "bob", 300.0, 100.0, false);
        let a = w.agent_index("alice").expect("a");
        w.agents[a].weapon = WeaponId::Bow;
        let v = w.agent_index("bob").expect("v");
        process_attack(&mut w, a, v, 20, &log);
        assert_eq!(hp(&w, "bob"), 100);
        assert_eq!(w.projectiles.len(), 1);
        assert_eq!(w.projectiles[0].damage, 20);
        assert!(w.projectiles[0].vx > 0.0);
    }

    #[test]
    fn pair_mut_returns_disjoint_slots() {
        let (mut w, _log, _rx) = world_with(&["alice", "bob"]);
        let (a, b) = pair_mut(&mut w.agents, 0, 1);
        a.hp = 1;
        b.hp = 2;
        assert_ne!(a.id, b.id);
        let (c, d) = pair_mut(&mut w.agents, 1, 0);
        assert_eq!(c.hp, 2);
        assert_eq!(d.hp, 1);
    }
}
