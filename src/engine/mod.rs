// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - workspace/config resolution and dependency installation
//! - port allocation and process launch per instance
//! - readiness tracking and the termination protocol
//! - hot reload on config changes and idle reaping
//!
//! [`PreviewOrchestrator`] is the single owner of all runtime state. The
//! record types live in `state`; `launch` spawns one instance and attaches
//! its exit and readiness tasks; [`snapshot`] holds the serialisable views
//! returned to callers.

mod idle;
mod launch;
mod orchestrator;
mod single_flight;
pub mod snapshot;
mod state;

pub use idle::group_is_idle;
pub use orchestrator::PreviewOrchestrator;
pub use single_flight::SingleFlight;
pub use snapshot::{
    Diagnostics, GroupStatus, InstanceSummary, LogSnapshot, ProxyTarget, StartSnapshot,
    preview_path,
};
