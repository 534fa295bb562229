// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! melee-render: CPU rasterization of simulation snapshots.
//!
//! A periodic task reads the latest snapshot from the pool, rasterizes
//! the scene into one of two pre-allocated RGBA buffers, publishes the
//! other into the frame ring, and mixes audio cues derived from
//! snapshot-to-snapshot transitions.
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
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::suboptimal_flops,
    clippy::many_single_char_names,
    clippy::float_cmp
)]

/// Audio cue synthesis and mixing.
pub mod audio;
/// Embedded pixel font.
pub mod font;
/// Rasterization primitives.
pub mod raster;
/// The periodic render task.
pub mod render_loop;
/// Scene drawing.
pub mod scene;

pub use audio::{AudioMixer, Cue, SAMPLE_RATE};
pub use raster::Canvas;
pub use render_loop::{AudioSink, RenderConfig, RenderLoop, SharedAudioSink};
pub use scene::render_scene;
