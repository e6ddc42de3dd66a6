//! ClipCraft Runner
//!
//! Drives pipeline runs on timers and publishes their progress.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Publisher: Fan-out of run events to subscribers
//! - Services: Stage workers and the run service
//! - Scheduler: One timer loop per run

pub mod config;
pub mod publisher;
pub mod scheduler;
pub mod service;

pub use config::Config;
pub use publisher::{StatusPublisher, SubscriptionHandle};
pub use service::{RunService, ServiceError};
