//! Single-flight execution of shared async operations.
//!
//! Concurrent callers of [`SingleFlight::run`] share one in-flight future
//! instead of issuing duplicates; once the shared future settles, the slot is
//! cleared and the next call starts fresh. The credential refresh path uses
//! this so that a 401 on the HTTP layer and an expired-token rejection on the
//! WebSocket layer can never trigger two simultaneous refreshes.

use std::future::Future;
use std::sync::Mutex;

use futures_util::future::{BoxFuture, FutureExt, Shared};

pub struct SingleFlight<T: Clone> {
    inflight: Mutex<Option<Shared<BoxFuture<'static, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(None),
        }
    }

    /// Run `make()` unless an earlier call is still in flight, in which case
    /// await that call's result instead.
    pub async fn run<F, Fut>(&self, make: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut slot = self.inflight.lock().unwrap();
            match slot.as_ref() {
                Some(existing) => existing.clone(),
                None => {
                    let shared = make().boxed().shared();
                    *slot = Some(shared.clone());
                    shared
                }
            }
        };

        let result = shared.await;

        // Clear the slot once settled so later calls re-execute.
        let mut slot = self.inflight.lock().unwrap();
        if let Some(current) = slot.as_ref() {
            if current.peek().is_some() {
                *slot = None;
            }
        }

        result
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
