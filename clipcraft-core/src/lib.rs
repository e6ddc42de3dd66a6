//! ClipCraft Core
//!
//! Core types and state transitions for the ClipCraft clip pipeline.
//!
//! This crate contains:
//! - Domain types: runs, stages, highlights and the events they emit
//! - Stage registry: the ordered stage definitions a run is built from
//! - Progress tracker: the only code allowed to mutate a run
//!
//! It has no async runtime; timers and delivery live in `clipcraft-runner`.

pub mod domain;
pub mod error;
pub mod registry;
pub mod tracker;

pub use error::{CoreError, Result};
pub use registry::StageRegistry;
pub use tracker::ProgressTracker;
