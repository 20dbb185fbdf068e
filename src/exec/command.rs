// src/exec/command.rs

use std::collections::BTreeMap;
use std::ffi::OsString;

use tokio::process::Command;
use tracing::debug;

use crate::config::validate::PORT_PLACEHOLDER;

/// Disables "open a browser on start" in common dev servers.
const NO_BROWSER_ENV: (&str, &str) = ("BROWSER", "none");

/// Substitute every `{{PORT}}` in `template`.
pub fn render_command(template: &str, port: u16) -> String {
    template.replace(PORT_PLACEHOLDER, &port.to_string())
}

/// Substitute `{{PORT}}` in every env value.
pub fn resolve_env(env: &BTreeMap<String, String>, port: u16) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.clone(), render_command(value, port)))
        .collect()
}

/// Keep the inherited entries whose key and value are both valid UTF-8.
///
/// Anything else is dropped from the child environment.
pub fn utf8_env<I>(vars: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                debug!(key = ?key, "skipping non UTF-8 environment entry");
                None
            }
        })
}

/// Final child environment.
///
/// Layering, later wins: the inherited environment, then the instance's
/// resolved env, then the forced `PORT`, `HOST` and browser-disable keys.
pub fn build_env<I>(
    inherited: I,
    config_env: &BTreeMap<String, String>,
    port: u16,
    host: &str,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = inherited.into_iter().collect();
    env.extend(resolve_env(config_env, port));
    env.insert("PORT".to_string(), port.to_string());
    env.insert("HOST".to_string(), host.to_string());
    env.insert(NO_BROWSER_ENV.0.to_string(), NO_BROWSER_ENV.1.to_string());
    env
}

/// Build a shell command appropriate for the platform.
pub fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}
