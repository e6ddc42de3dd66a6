//! Core domain types
//!
//! This module contains the structures shared between the tracker (which
//! mutates them) and the runner and CLI (which read snapshots of them).

pub mod analysis;
pub mod event;
pub mod highlight;
pub mod run;
pub mod stage;
