// src/logs/mod.rs

//! Per-instance log capture and live fan-out.
//!
//! - [`buffer`] holds the bounded ring buffer kept for every instance.
//! - [`hub`] is the publish/subscribe registry keyed by
//!   `"<group>:<instance>"`.
//! - [`InstanceLog`] ties one buffer to the shared hub; everything that
//!   writes instance output goes through it.

pub mod buffer;
pub mod hub;

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use buffer::LogBuffer;
pub use hub::{LogHub, LogListener, Subscription, stream_key};

/// Where a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Stdout,
    Stderr,
    /// Written by the orchestrator itself (lifecycle notes, diagnostics).
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogSource,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

/// The log of one running instance: a ring buffer plus live subscribers.
#[derive(Debug)]
pub struct InstanceLog {
    key: String,
    buffer: Mutex<LogBuffer>,
    hub: LogHub,
}

impl InstanceLog {
    pub fn new(group: &str, instance: &str, capacity: usize, hub: LogHub) -> Self {
        Self {
            key: stream_key(group, instance),
            buffer: Mutex::new(LogBuffer::new(capacity)),
            hub,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Append to the buffer, then deliver to subscribers outside the lock.
    pub fn push(&self, level: LogSource, message: impl Into<String>) {
        let entry = LogEntry::new(level, message);
        {
            let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
            buffer.push(entry.clone());
        }
        self.hub.publish(&self.key, &entry);
    }

    pub fn system(&self, message: impl Into<String>) {
        self.push(LogSource::System, message);
    }

    /// Buffered entries, oldest first; `tail` keeps only the newest `n`.
    pub fn snapshot(&self, tail: Option<usize>) -> Vec<LogEntry> {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.tail(tail.unwrap_or(usize::MAX))
    }

    /// Messages of the newest `n` entries, for diagnostics.
    pub fn last_lines(&self, n: usize) -> Vec<String> {
        self.snapshot(Some(n))
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }
}
