// src/watch/watcher.rs

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::watch::debounce::debounce;

/// Watch on one group's config file.
///
/// The parent directory is watched (editors often replace files by rename)
/// and events are filtered down to the config file name. Dropping the handle
/// stops the watch and discards any pending debounce.
pub struct ConfigWatcher {
    path: PathBuf,
    _inner: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ConfigWatcher {
    /// Start watching `path`; `on_change` runs once per debounced burst of
    /// change/rename notifications.
    pub fn spawn<F>(path: impl Into<PathBuf>, window: Duration, on_change: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let path = path.into();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .with_context(|| format!("config path {:?} has no file name", path))?;

        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            {
                let watched = path.clone();
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        if is_config_change(&event, &file_name) {
                            let _ = event_tx.send(());
                        }
                    }
                    Err(err) => warn!(path = ?watched, error = %err, "config watch error"),
                }
            },
            Config::default(),
        )?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("watching {:?}", dir))?;

        info!(path = ?path, "config watcher started");

        let watched = path.clone();
        let task = tokio::spawn(async move {
            debounce(event_rx, window, on_change).await;
            debug!(path = ?watched, "config watcher loop ended");
        });

        Ok(Self {
            path,
            _inner: watcher,
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn is_config_change(event: &Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    );
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some_and(|n| n == file_name.as_os_str()))
}
