// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene rasterization: one snapshot in, one RGBA frame out.
//!
//! Draw order is fixed: background, constellation overlay, agents with
//! their attack animations, particles, attack effects, weapon trails,
//! impact flashes, projectiles, floating texts, then the unshaken
//! overlay UI. Screen shake offsets every world-space element; the UI
//! stays pinned.

use melee_core::constants::AGENT_RADIUS;
use melee_core::snapshot::{AgentSnapshot, GameSnapshot};
use melee_core::weapon::{self, TrailKind, WeaponId};
use rayon::prelude::*;

use crate::font::{self, ADVANCE};
use crate::raster::Canvas;

/// Particle count at which rasterization fans out across the pool.
pub const PARALLEL_PARTICLE_THRESHOLD: usize = 30;

/// Rows per band when particles render in parallel.
const BAND_ROWS: usize = 64;

const BACKGROUND: [u8; 3] = [14, 16, 24];
const GRID_COLOR: [u8; 3] = [30, 34, 48];
const CONSTELLATION_REACH: f32 = 260.0;

/// Rasterizes `snap` into `buf` (`width * height * 4` bytes).
pub fn render_scene(buf: &mut [u8], width: usize, height: usize, snap: &GameSnapshot) {
    let (ox, oy) = snap
        .shake
        .map_or((0.0, 0.0), |s| (s.offset_x, s.offset_y));

    {
        let mut canvas = Canvas::new(buf, width, height);
        draw_background(&mut canvas, ox, oy);
        draw_constellation(&mut canvas, snap, ox, oy);
        for agent in &snap.agents {
            draw_agent(&mut canvas, agent, snap.tick, ox, oy);
        }
    }

    draw_particles(buf, width, snap, ox, oy);

    let mut canvas = Canvas::new(buf, width, height);
    for e in &snap.effects {
        let alpha = (e.timer * 5.0).clamp(0.0, 0.8);
        canvas.line(
            e.from_x + ox,
            e.from_y + oy,
            e.to_x + ox,
            e.to_y + oy,
            3.0,
            e.color,
            alpha,
        );
    }
    for t in &snap.trails {
        let alpha = (t.timer * 3.0).clamp(0.0, 0.7);
        let pts = &t.points[..t.len as usize];
        for pair in pts.windows(2) {
            canvas.line(
                pair[0].0 + ox,
                pair[0].1 + oy,
                pair[1].0 + ox,
                pair[1].1 + oy,
                2.0,
                t.color,
                alpha,
            );
        }
    }
    for f in &snap.flashes {
        let alpha = (f.timer * 4.0).clamp(0.0, 0.9);
        canvas.ring(f.x + ox, f.y + oy, f.radius, 3.0, f.color, alpha);
    }
    for p in &snap.projectiles {
        let pts = &p.trail[..p.trail_len as usize];
        for (i, pair) in pts.windows(2).enumerate() {
            let alpha = 0.15 + 0.1 * i as f32;
            canvas.line(
                pair[0].0 + ox,
                pair[0].1 + oy,
                pair[1].0 + ox,
                pair[1].1 + oy,
                2.0,
                p.color,
                alpha,
            );
        }
        canvas.fill_circle(p.x + ox, p.y + oy, 6.0, p.color, 1.0);
        let tip_x = p.x + p.rotation.cos() * 9.0;
        let tip_y = p.y + p.rotation.sin() * 9.0;
        canvas.fill_circle(tip_x + ox, tip_y + oy, 2.5, [255, 255, 255], 0.9);
    }
    for t in &snap.texts {
        let x = t.x as i32 - font::text_width(&t.text, 2) / 2;
        font::draw_text(
            &mut canvas,
            x + ox as i32,
            t.y as i32 + oy as i32,
            &t.text,
            2,
            t.color,
            t.alpha,
        );
    }

    draw_overlay_ui(&mut canvas, snap);
}

fn draw_background(canvas: &mut Canvas<'_>, ox: f32, oy: f32) {
    canvas.clear(BACKGROUND);
    let w = canvas.width() as f32;
    let h = canvas.height() as f32;
    let step = 80.0;
    let mut x = (ox % step) - step;
    while x < w + step {
        canvas.line(x, 0.0, x, h, 1.0, GRID_COLOR, 0.5);
        x += step;
    }
    let mut y = (oy % step) - step;
    while y < h + step {
        canvas.line(0.0, y, w, y, 1.0, GRID_COLOR, 0.5);
        y += step;
    }
}

/// Faint lines between nearby fighters give the arena its network look.
fn draw_constellation(canvas: &mut Canvas<'_>, snap: &GameSnapshot, ox: f32, oy: f32) {
    let agents: Vec<&AgentSnapshot> = snap.agents.iter().filter(|a| !a.is_dead).collect();
    for (i, a) in agents.iter().enumerate() {
        for b in agents.iter().skip(i + 1) {
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            let d = (dx * dx + dy * dy).sqrt();
            if d < CONSTELLATION_REACH {
                let alpha = 0.18 * (1.0 - d / CONSTELLATION_REACH);
                canvas.line(a.x + ox, a.y + oy, b.x + ox, b.y + oy, 1.0, [90, 110, 160], alpha);
            }
        }
    }
}

fn draw_agent(canvas: &mut Canvas<'_>, a: &AgentSnapshot, tick: u64, ox: f32, oy: f32) {
    let x = a.x + ox;
    let y = a.y + oy;

    if a.is_dead && !a.is_ragdoll {
        return; // corpse faded out with the ragdoll
    }

    if a.is_ragdoll {
        // tumbling cross, dimmed body
        canvas.fill_circle(x, y, AGENT_RADIUS, [70, 70, 78], 0.7);
        let r = AGENT_RADIUS * 0.7;
        let (s, c) = a.rotation.sin_cos();
        canvas.line(x - c * r, y - s * r, x + c * r, y + s * r, 3.0, [30, 30, 34], 0.8);
        canvas.line(x + s * r, y - c * r, x - s * r, y + c * r, 3.0, [30, 30, 34], 0.8);
        return;
    }

    let body_alpha = if a.is_dodging { 0.5 } else { 1.0 };

    // attack animation under the body so the body edge stays crisp
    if a.is_attacking {
        if let Some(weapon) = a.weapon {
            draw_attack_animation(canvas, a, weapon, x, y);
        }
    }

    canvas.fill_circle(x, y, AGENT_RADIUS, a.color, body_alpha);
    canvas.ring(x, y, AGENT_RADIUS, 2.0, darken(a.color), body_alpha);
    // facing notch
    let nx = x + a.attack_angle.cos() * (AGENT_RADIUS - 6.0);
    let ny = y + a.attack_angle.sin() * (AGENT_RADIUS - 6.0);
    canvas.fill_circle(nx, ny, 5.0, [240, 240, 240], body_alpha * 0.9);

    if a.spawn_protection {
        // slow pulse keyed off the tick counter
        let pulse = 0.5 + 0.4 * ((tick as f32) * 0.35).sin().abs();
        canvas.ring(x, y, AGENT_RADIUS + 6.0, 2.5, [255, 255, 255], pulse);
    }
    if a.is_stunned {
        canvas.ring(x, y, AGENT_RADIUS + 3.0, 2.0, [255, 220, 70], 0.8);
    }

    // hp and stamina bars
    let bar_w = AGENT_RADIUS * 2.0;
    let bar_x = x - AGENT_RADIUS;
    let bar_y = y - AGENT_RADIUS - 14.0;
    let pct = if a.max_hp == 0 {
        0.0
    } else {
        a.hp as f32 / a.max_hp as f32
    };
    canvas.fill_rect(bar_x, bar_y, bar_w, 5.0, [40, 40, 46], 0.8);
    let hp_color = if pct > 0.5 {
        [90, 200, 90]
    } else if pct > 0.25 {
        [230, 190, 60]
    } else {
        [220, 70, 60]
    };
    canvas.fill_rect(bar_x, bar_y, bar_w * pct, 5.0, hp_color, 0.95);
    canvas.fill_rect(bar_x, bar_y + 6.0, bar_w, 2.0, [40, 40, 46], 0.8);
    canvas.fill_rect(
        bar_x,
        bar_y + 6.0,
        bar_w * (a.stamina / 100.0).clamp(0.0, 1.0),
        2.0,
        [90, 150, 235],
        0.9,
    );

    // combo pips
    for i in 0..a.combo_count {
        canvas.fill_rect(
            bar_x + f32::from(i) * 7.0,
            bar_y - 6.0,
            5.0,
            4.0,
            [255, 170, 40],
            0.95,
        );
    }

    // name tag, centered above the bars
    let name_x = x as i32 - font::text_width(&a.name, 1) / 2;
    font::draw_text(canvas, name_x, bar_y as i32 - 12, &a.name, 1, [225, 225, 230], 0.95);

    // chat bubble
    if let Some(text) = &a.bubble {
        let tw = font::text_width(text, 1);
        let bx = x as i32 - tw / 2;
        let by = bar_y as i32 - 28;
        canvas.fill_rect(
            (bx - 3) as f32,
            (by - 3) as f32,
            (tw + 6) as f32,
            13.0,
            [245, 245, 245],
            0.9,
        );
        font::draw_text(canvas, bx, by, text, 1, [20, 20, 24], 1.0);
    }
}

fn darken(color: [u8; 3]) -> [u8; 3] {
    [color[0] / 2, color[1] / 2, color[2] / 2]
}

fn draw_attack_animation(
    canvas: &mut Canvas<'_>,
    a: &AgentSnapshot,
    weapon: WeaponId,
    x: f32,
    y: f32,
) {
    let stats = weapon::stats(weapon);
    let anim = weapon::anim(weapon);
    match anim.trail {
        TrailKind::Arc => {
            canvas.arc_wedge(
                x,
                y,
                stats.range,
                a.attack_angle,
                anim.arc_width * 0.5,
                stats.color,
                0.35,
            );
        }
        TrailKind::Line => {
            let tx = x + a.attack_angle.cos() * stats.range * 0.9;
            let ty = y + a.attack_angle.sin() * stats.range * 0.9;
            canvas.line(x, y, tx, ty, 4.0, stats.color, 0.6);
        }
        TrailKind::Radial => {
            canvas.ring(x, y, stats.range * 0.8, 5.0, stats.color, 0.5);
        }
        TrailKind::None => {
            // bare-handed jab: a fist flash at reach
            let fx = x + a.attack_angle.cos() * stats.range * 0.7;
            let fy = y + a.attack_angle.sin() * stats.range * 0.7;
            canvas.fill_circle(fx, fy, 8.0, stats.color, 0.7);
        }
        TrailKind::Projectile => {}
    }
}

fn draw_particles(buf: &mut [u8], width: usize, snap: &GameSnapshot, ox: f32, oy: f32) {
    if snap.particles.is_empty() {
        return;
    }
    let band_bytes = width * 4 * BAND_ROWS;
    if snap.particles.len() >= PARALLEL_PARTICLE_THRESHOLD {
        buf.par_chunks_mut(band_bytes)
            .enumerate()
            .for_each(|(i, chunk)| {
                let mut band = Canvas::band(chunk, width, i * BAND_ROWS);
                for p in &snap.particles {
                    band.fill_circle(p.x + ox, p.y + oy, 3.0, p.color, p.alpha);
                }
            });
    } else {
        let height = buf.len() / (width * 4);
        let mut canvas = Canvas::new(buf, width, height);
        for p in &snap.particles {
            canvas.fill_circle(p.x + ox, p.y + oy, 3.0, p.color, p.alpha);
        }
    }
}

fn draw_overlay_ui(canvas: &mut Canvas<'_>, snap: &GameSnapshot) {
    let w = canvas.width() as f32;
    let h = canvas.height() as f32;

    // live badge
    canvas.fill_rect(16.0, 14.0, 76.0, 24.0, [20, 20, 26], 0.75);
    canvas.fill_circle(30.0, 26.0, 6.0, [235, 40, 40], 1.0);
    font::draw_text(canvas, 42, 20, "LIVE", 2, [245, 245, 245], 1.0);

    // call to action
    let cta = "TYPE !JOIN TO ENTER THE PIT";
    let cta_w = font::text_width(cta, 2);
    canvas.fill_rect(
        12.0,
        h - 44.0,
        (cta_w + 20) as f32,
        30.0,
        [20, 20, 26],
        0.75,
    );
    font::draw_text(
        canvas,
        22,
        h as i32 - 36,
        cta,
        2,
        [255, 214, 90],
        1.0,
    );

    // top-5 leaderboard from the pre-sorted slice
    let panel_w = 220.0;
    let x0 = w - panel_w - 16.0;
    canvas.fill_rect(x0, 14.0, panel_w, 24.0 + 5.0 * 18.0, [20, 20, 26], 0.75);
    font::draw_text(canvas, x0 as i32 + 10, 20, "TOP KILLERS", 2, [245, 245, 245], 1.0);
    for (i, a) in snap.agents.iter().take(5).enumerate() {
        let row_y = 44 + i as i32 * 18;
        let rank = format!("{}.", i + 1);
        font::draw_text(canvas, x0 as i32 + 10, row_y, &rank, 1, [160, 160, 170], 1.0);
        let name: String = a.name.chars().take(14).collect();
        font::draw_text(canvas, x0 as i32 + 30, row_y, &name, 1, [225, 225, 230], 1.0);
        let kills = a.kills.to_string();
        let kx = (x0 + panel_w) as i32 - 10 - kills.len() as i32 * ADVANCE;
        font::draw_text(canvas, kx, row_y, &kills, 1, [255, 170, 40], 1.0);
    }

    // population line under the badge
    let pop = format!("{} FIGHTERS / {} ALIVE", snap.player_count, snap.alive_count);
    font::draw_text(canvas, 16, 46, &pop, 1, [170, 175, 190], 0.95);
}
