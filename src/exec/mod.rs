// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running preview instances, using
//! `tokio::process::Command`, and for deciding when they are ready.
//!
//! - [`command`] renders command templates and builds the child environment.
//! - [`supervisor`] spawns a process, pipes its output into an
//!   [`InstanceLog`](crate::logs::InstanceLog) and implements the
//!   graceful-then-forced termination protocol.
//! - [`readiness`] resolves a freshly spawned process to ready / exited /
//!   timed out, by output pattern or by polling its port.
//! - [`signal`] holds the platform-specific signalling.

pub mod command;
pub mod readiness;
pub mod signal;
pub mod supervisor;

pub use command::{build_env, render_command, resolve_env, shell_command, utf8_env};
pub use readiness::{ReadinessOutcome, ReadinessStrategy, wait_ready};
pub use supervisor::{ExitInfo, ProcessHandle, SpawnSpec, spawn_process};
