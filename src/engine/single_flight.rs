// src/engine/single_flight.rs

//! Keyed coalescing of concurrent async operations.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::{Arc, Mutex};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{trace, warn};

type InFlight<T> = Shared<BoxFuture<'static, T>>;

/// At most one running operation per key; late callers share its result.
///
/// The operation is spawned onto the runtime, so it runs to completion even
/// if every caller stops polling. The key is cleared from inside the
/// operation once it settles, never earlier. A panicking operation also
/// clears its key before the panic reaches the callers, so the next call
/// starts fresh.
pub struct SingleFlight<T: Clone> {
    in_flight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the operation running under `key`, or start one with `make`.
    ///
    /// `make` is only called when no operation is in flight.
    pub fn run<F, Fut>(&self, key: &str, make: F) -> InFlight<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = in_flight.get(key) {
            trace!(key, "joining in-flight operation");
            return existing.clone();
        }

        let registry = Arc::clone(&self.in_flight);
        let owned_key = key.to_string();
        let work = make();
        let shared = async move {
            let output = AssertUnwindSafe(work).catch_unwind().await;
            {
                let mut in_flight = registry.lock().unwrap_or_else(|e| e.into_inner());
                in_flight.remove(&owned_key);
            }
            match output {
                Ok(output) => output,
                Err(panic) => {
                    warn!(key = %owned_key, "in-flight operation panicked; key cleared");
                    resume_unwind(panic)
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), shared.clone());
        drop(in_flight);

        tokio::spawn(shared.clone());
        shared
    }

    pub fn contains(&self, key: &str) -> bool {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.contains_key(key)
    }
}
