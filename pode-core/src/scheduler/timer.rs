//! Fixed-interval timers. Per the spec's invariant, a timer never
//! re-enters while a previous tick is still running — ticks that would
//! overlap are skipped rather than queued, tracked with an `AtomicBool`
//! the way the teacher guards re-entrant cloud-config reloads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::worker::{Job, WorkerPool};

pub struct Timer {
    pub name: String,
    handle: JoinHandle<()>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Default)]
pub struct TimerRegistry {
    timers: HashMap<String, Timer>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a timer that calls `make_job()` every `period`, skipping
    /// a tick if the previous one hasn't finished.
    pub fn register<F>(&mut self, name: impl Into<String>, period: Duration, pool: Arc<WorkerPool>, make_job: F)
    where
        F: Fn() -> Job + Send + Sync + 'static,
    {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(false));
        let timer_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if running
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!(timer = %timer_name, "tick skipped, previous run still in flight");
                    continue;
                }
                let running_flag = running.clone();
                let inner_job = make_job();
                let wrapped: Job = Box::new(move || {
                    let result = inner_job();
                    running_flag.store(false, Ordering::SeqCst);
                    result
                });
                let pool = pool.clone();
                tokio::spawn(async move {
                    pool.submit(wrapped).await;
                });
            }
        });

        if self.timers.insert(name.clone(), Timer { name, handle }).is_some() {
            warn!(timer = %self.timers.len(), "timer registration replaced an existing timer");
        }
    }

    pub fn remove(&mut self, name: &str) {
        self.timers.remove(name);
    }

    pub fn names(&self) -> Vec<&str> {
        self.timers.keys().map(String::as_str).collect()
    }
}
