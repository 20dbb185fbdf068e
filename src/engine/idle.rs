// src/engine/idle.rs

use std::time::Duration;

use tokio::time::Instant;

use crate::types::InstanceStatus;

/// Whether a group may be reaped.
///
/// True only if at least one instance is running and every running
/// instance was last accessed more than `threshold` before `now`. Instances
/// in any other state do not count either way.
pub fn group_is_idle<I>(instances: I, now: Instant, threshold: Duration) -> bool
where
    I: IntoIterator<Item = (InstanceStatus, Instant)>,
{
    let mut any_running = false;
    for (status, last_access) in instances {
        if status != InstanceStatus::Running {
            continue;
        }
        any_running = true;
        if now.saturating_duration_since(last_access) <= threshold {
            return false;
        }
    }
    any_running
}
