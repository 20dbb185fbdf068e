// src/exec/signal.rs

//! Platform signalling for instance processes.
//!
//! On Unix every instance is spawned as the leader of its own process group,
//! so signals go to the whole group and shell-wrapped servers take their
//! children down with them.

#[cfg(unix)]
pub fn graceful(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    killpg(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| format!("failed to send SIGTERM to process group {pid}: {e}"))
}

/// No portable graceful signal; the caller escalates straight to a kill.
#[cfg(not(unix))]
pub fn graceful(_pid: u32) -> Result<(), String> {
    Err("graceful termination is not supported on this platform".to_string())
}

#[cfg(unix)]
pub fn force(pid: u32) -> Result<(), String> {
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    let target = Pid::from_raw(pid as i32);
    killpg(target, Signal::SIGKILL).or_else(|group_err| {
        kill(target, Signal::SIGKILL).map_err(|e| {
            format!("failed to kill process {pid} (group kill failed: {group_err}): {e}")
        })
    })
}

#[cfg(not(unix))]
pub fn force(_pid: u32) -> Result<(), String> {
    // The supervisor's own `start_kill` handles this platform.
    Ok(())
}

/// Name of a terminating signal, e.g. `SIGTERM`.
#[cfg(unix)]
pub fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signal}"))
}

#[cfg(not(unix))]
pub fn signal_name(signal: i32) -> String {
    format!("signal {signal}")
}
