// src/watch/mod.rs

//! Config file watching for hot reload.
//!
//! - [`watcher`] wires a `notify` watcher onto a group's config file.
//! - [`debounce`] collapses bursts of change notifications into one trigger.
//!
//! Neither knows what a reload does; the orchestrator supplies the callback.

pub mod debounce;
pub mod watcher;

pub use debounce::debounce;
pub use watcher::ConfigWatcher;
