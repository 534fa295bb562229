// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! melee-stream: the simulation-to-encoder frame pipeline.
//!
//! A fixed-capacity SPSC ring of pre-allocated frame buffers decouples
//! the render loop from sink latency; a ticker-driven async writer
//! drains the ring into the external encoder's stdin with backpressure
//! accounting and connection-loss detection.
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
    clippy::cast_sign_loss
)]

/// External encoder process management.
pub mod encoder;
/// SPSC frame ring buffer.
pub mod ring;
/// Async frame writer with connection-loss handling.
pub mod writer;

pub use encoder::{EncoderConfig, EncoderError, EncoderProcess};
pub use ring::FrameRing;
pub use writer::{FrameWriter, LostCallback, WriterStats};
