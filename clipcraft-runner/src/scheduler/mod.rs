//! Scheduler layer for the runner
//!
//! Each run is driven by its own timer loop. The loop is the single owner
//! of the run's tracker while it executes; everything else sees snapshots.

pub mod run_loop;

pub use run_loop::RunLoop;
