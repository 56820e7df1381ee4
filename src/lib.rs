//! gridplay – program execution and replay engine for a block-programming
//! grid puzzle
//!
//! This crate implements:
//! - A grid world model where moves are legal only along a level's expected path
//! - A sandboxed, tick-budgeted interpreter for the scripts blocks compile to
//! - An action log recorded during execution and replayed as a timed animation
//! - Outcome classification (success, failure, timeout, error)
//! - Per-run idempotence so repeated blocks are sensed and animated once

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Script language: parser, IR and tick-driven interpreter
pub mod interpreter;
/// Grid world, executor, replay scheduler and orchestrator
pub mod runtime;

// Re-export key types for convenience
pub use runtime::{Runtime, RuntimeConfig};

/// Current version of gridplay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
