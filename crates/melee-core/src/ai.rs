// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-agent AI/combat step, run once per alive agent per tick.
//!
//! Four phases in fixed order: timers, target selection, behavior,
//! integration. Target priority: focus target (alive, not a teammate;
//! the victim's spawn protection does not block acquisition — damage is
//! still rejected at resolution time), then the closest candidate inside
//! the spatial query, then a global scan.

use crate::combat;
use crate::constants::{
    DODGE_COOLDOWN_TICKS, DODGE_INVULN_TICKS, DODGE_STAMINA_COST, DODGE_TICKS,
    FAR_APPROACH_DISTANCE, FRICTION, MAX_SPEED, MIN_ENGAGE_DISTANCE, TARGET_QUERY_RADIUS,
    WORLD_MARGIN,
};
use crate::events::EventLog;
use crate::kernel::WorldState;
use crate::weapon;

/// Acceleration applied by steering decisions, px/s^2 at aggression 1.0.
const STEER_ACCEL: f32 = 420.0;

/// Per-tick probability of a dodge roll while inside engage range.
const DODGE_CHANCE: f32 = 0.02;

struct TargetInfo {
    idx: usize,
    x: f32,
    y: f32,
    dist: f32,
    spawn_protected: bool,
}

/// Runs one AI step for the agent at arena index `idx`.
pub(crate) fn ai_step(world: &mut WorldState, idx: usize, dt: f32, events: &EventLog) {
    // Phase A: timers
    world.agents[idx].update_timers(dt);
    if world.agents[idx].is_stunned {
        return;
    }

    // Phase B: target selection
    let target = select_target(world, idx);

    // Phase C: behavior
    if let Some(t) = target {
        let (range, cooldown_ready, protected) = {
            let a = &mut world.agents[idx];
            a.attack_angle = (t.y - a.y).atan2(t.x - a.x);
            (
                weapon::stats(a.weapon).range,
                a.attack_cooldown <= 0.0,
                a.spawn_protection,
            )
        };

        if t.dist <= range && cooldown_ready && !protected && !t.spawn_protected {
            combat::attack(world, idx, t.idx, events);
        } else {
            steer(world, idx, &t, range, dt);
            maybe_dodge(world, idx, t.dist, range);
        }
    } else {
        wander(world, idx, dt);
    }

    // Phase D: integration
    integrate(world, idx, dt);
}

fn select_target(world: &mut WorldState, idx: usize) -> Option<TargetInfo> {
    let (x, y) = (world.agents[idx].x, world.agents[idx].y);

    // 1. focus target
    if let Some(focus_name) = world.agents[idx].focus.as_ref().map(|f| f.target.clone()) {
        if let Some(tidx) = world.agent_index(&focus_name) {
            let t = &world.agents[tidx];
            if tidx != idx && !t.is_dead && !t.is_ragdoll && !teammates(world, idx, tidx) {
                return Some(target_info(world, tidx, x, y));
            }
        }
    }

    // 2. closest non-teammate candidate within the spatial query
    let agents = &world.agents;
    let my_team = &agents[idx].team;
    let mut best: Option<(usize, f32)> = None;
    for &cand in world.grid.query_radius(x, y, TARGET_QUERY_RADIUS) {
        let tidx = cand as usize;
        if tidx == idx {
            continue;
        }
        let t = &agents[tidx];
        if t.is_dead || t.is_ragdoll || same_team(my_team, &t.team) {
            continue;
        }
        let d2 = (t.x - x).powi(2) + (t.y - y).powi(2);
        if best.is_none_or(|(_, bd)| d2 < bd) {
            best = Some((tidx, d2));
        }
    }

    // 3. global scan fallback
    if best.is_none() {
        for (tidx, t) in agents.iter().enumerate() {
            if tidx == idx {
                continue;
            }
            if t.is_dead || t.is_ragdoll || same_team(my_team, &t.team) {
                continue;
            }
            let d2 = (t.x - x).powi(2) + (t.y - y).powi(2);
            if best.is_none_or(|(_, bd)| d2 < bd) {
                best = Some((tidx, d2));
            }
        }
    }
    best.map(|(tidx, _)| target_info(world, tidx, x, y))
}

fn same_team(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(x), Some(y)) if x == y)
}

fn target_info(world: &WorldState, tidx: usize, from_x: f32, from_y: f32) -> TargetInfo {
    let t = &world.agents[tidx];
    TargetInfo {
        idx: tidx,
        x: t.x,
        y: t.y,
        dist: ((t.x - from_x).powi(2) + (t.y - from_y).powi(2)).sqrt(),
        spawn_protected: t.spawn_protection,
    }
}

fn teammates(world: &WorldState, a: usize, b: usize) -> bool {
    matches!(
        (&world.agents[a].team, &world.agents[b].team),
        (Some(x), Some(y)) if x == y
    )
}

fn steer(world: &mut WorldState, idx: usize, t: &TargetInfo, range: f32, dt: f32) {
    let (cx, cy) = (world.cfg.world_width * 0.5, world.cfg.world_height * 0.5);
    let a = &mut world.agents[idx];
    let accel = STEER_ACCEL * a.aggression * dt;
    let dx = t.x - a.x;
    let dy = t.y - a.y;
    let dist = t.dist.max(f32::EPSILON);
    let (nx, ny) = (dx / dist, dy / dist);
    // stable strafe orientation per agent
    let strafe_sign = if a.id % 2 == 0 { 1.0 } else { -1.0 };
    let (px, py) = (-ny * strafe_sign, nx * strafe_sign);

    if t.dist < MIN_ENGAGE_DISTANCE {
        // too close: back off with a lateral slide
        a.vx += (-nx + px * 0.6) * accel;
        a.vy += (-ny + py * 0.6) * accel;
    } else if t.dist > range * 0.8 {
        a.vx += nx * accel;
        a.vy += ny * accel;
        if t.dist > FAR_APPROACH_DISTANCE {
            // long approach: drift toward the arena center to avoid wall rides
            let cdx = cx - a.x;
            let cdy = cy - a.y;
            let cd = (cdx * cdx + cdy * cdy).sqrt().max(f32::EPSILON);
            a.vx += cdx / cd * accel * 0.3;
            a.vy += cdy / cd * accel * 0.3;
        }
    } else {
        // in the attack zone waiting out the cooldown: circle with a nudge in
        a.vx += (px + nx * 0.25) * accel;
        a.vy += (py + ny * 0.25) * accel;
    }
}

fn maybe_dodge(world: &mut WorldState, idx: usize, dist: f32, range: f32) {
    if dist > range * 1.2 {
        return;
    }
    let roll = world.rng.chance(DODGE_CHANCE);
    let dir = world.rng.angle();
    let a = &mut world.agents[idx];
    if !roll
        || a.is_dodging
        || a.combat.dodge_cooldown_ticks > 0
        || a.stamina < DODGE_STAMINA_COST
    {
        return;
    }
    a.is_dodging = true;
    a.combat.dodge_ticks = DODGE_TICKS;
    a.combat.dodge_cooldown_ticks = DODGE_COOLDOWN_TICKS;
    a.combat.dodge_dir = dir;
    a.combat.invuln_ticks = DODGE_INVULN_TICKS;
    a.stamina -= DODGE_STAMINA_COST;
    a.vx += dir.cos() * 320.0;
    a.vy += dir.sin() * 320.0;
}

fn wander(world: &mut WorldState, idx: usize, dt: f32) {
    let (cx, cy) = (world.cfg.world_width * 0.5, world.cfg.world_height * 0.5);
    let jitter = world.rng.angle();
    let a = &mut world.agents[idx];
    let accel = STEER_ACCEL * 0.25 * dt;
    let cdx = cx - a.x;
    let cdy = cy - a.y;
    let cd = (cdx * cdx + cdy * cdy).sqrt().max(f32::EPSILON);
    a.vx += (cdx / cd * 0.4 + jitter.cos()) * accel;
    a.vy += (cdy / cd * 0.4 + jitter.sin()) * accel;
}

fn integrate(world: &mut WorldState, idx: usize, dt: f32) {
    let (w, h) = (world.cfg.world_width, world.cfg.world_height);
    let a = &mut world.agents[idx];
    let speed = (a.vx * a.vx + a.vy * a.vy).sqrt();
    if speed > MAX_SPEED {
        let scale = MAX_SPEED / speed;
        a.vx *= scale;
        a.vy *= scale;
    }
    a.x += a.vx * dt;
    a.y += a.vy * dt;
    a.vx *= FRICTION;
    a.vy *= FRICTION;
    a.x = a.x.clamp(WORLD_MARGIN, w - WORLD_MARGIN);
    a.y = a.y.clamp(WORLD_MARGIN, h - WORLD_MARGIN);
}
