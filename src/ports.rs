// src/ports.rs

//! Ephemeral TCP port allocation.

use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;
use std::sync::Mutex;

use tracing::{debug, trace};

use crate::errors::{PreviewError, Result};

#[derive(Debug, Default)]
struct PoolState {
    in_use: HashSet<u16>,
    by_group: HashMap<String, Vec<u16>>,
}

/// Allocates ports from a bounded inclusive range, tracked per task group.
///
/// Allocation is a linear scan from the low end: the expected load is a
/// handful of concurrent groups. Every candidate is bind-probed on loopback
/// so ports held by processes outside this pool are skipped.
#[derive(Debug)]
pub struct PortPool {
    range: RangeInclusive<u16>,
    state: Mutex<PoolState>,
}

impl PortPool {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        Self {
            range,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn range(&self) -> RangeInclusive<u16> {
        self.range.clone()
    }

    /// Reserve the lowest free port for `group`.
    pub fn allocate(&self, group: &str) -> Result<u16> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        for port in self.range.clone() {
            if state.in_use.contains(&port) {
                continue;
            }
            if !probe_port(port) {
                trace!(port, "port busy outside the pool; skipping");
                continue;
            }

            state.in_use.insert(port);
            state
                .by_group
                .entry(group.to_string())
                .or_default()
                .push(port);
            debug!(group, port, "allocated port");
            return Ok(port);
        }

        Err(PreviewError::PortUnavailable {
            start: *self.range.start(),
            end: *self.range.end(),
        })
    }

    /// Return a single port. Releasing a port twice is a no-op.
    pub fn release(&self, group: &str, port: u16) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.remove(&port);
        if let Some(owned) = state.by_group.get_mut(group) {
            owned.retain(|p| *p != port);
            if owned.is_empty() {
                state.by_group.remove(group);
            }
        }
        debug!(group, port, "released port");
    }

    /// Return every port `group` still owns.
    pub fn release_group(&self, group: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(owned) = state.by_group.remove(group) else {
            return;
        };
        for port in &owned {
            state.in_use.remove(port);
        }
        debug!(group, ports = ?owned, "released group ports");
    }

    pub fn is_allocated(&self, port: u16) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_use.contains(&port)
    }

    /// Ports currently owned by `group`, in allocation order.
    pub fn ports_of(&self, group: &str) -> Vec<u16> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.by_group.get(group).cloned().unwrap_or_default()
    }
}

/// Bind-and-close on loopback; `true` if nothing else holds the port.
fn probe_port(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
