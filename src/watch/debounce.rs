// src/watch/debounce.rs

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::trace;

/// Call `on_fire` once per burst of events.
///
/// Every event restarts the `window` timer; `on_fire` runs only when the
/// timer expires without a newer event. Returns when the channel closes; a
/// burst still pending at that point is discarded.
pub async fn debounce<T, F>(mut events: mpsc::UnboundedReceiver<T>, window: Duration, mut on_fire: F)
where
    F: FnMut(),
{
    while events.recv().await.is_some() {
        loop {
            tokio::select! {
                next = events.recv() => {
                    if next.is_none() {
                        return;
                    }
                    trace!("debounce timer reset");
                }
                _ = sleep(window) => break,
            }
        }
        on_fire();
    }
}
