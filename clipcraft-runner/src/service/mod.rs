//! Service layer
//!
//! Stage workers perform the work behind each stage; the run service
//! starts, cancels and retries runs on top of them.
//!
//! Workers are trait-based so runs can be driven by simulated or real
//! backends alike.

pub mod runs;
pub mod worker;

pub use runs::{RunService, ServiceError};
pub use worker::{SimulatedStageWorker, StageWorker, StepOutcome, TimerStageWorker};
