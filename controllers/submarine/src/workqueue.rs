//! Deduplicating, rate-limited work queue of `namespace/name` keys.
//!
//! A key is queued at most once. While a worker holds a key (between
//! [`WorkQueue::get`] and [`WorkQueue::done`]) a second `add` only marks it
//! dirty; `done` then puts it back exactly once, so two workers never hold
//! the same key and no wake-up is lost.

use crate::backoff::ExponentialBackoff;
use crate::metrics::ControllerMetrics;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug, Default)]
struct QueueState {
    /// Keys ready to be handed out, in arrival order
    queue: VecDeque<String>,
    /// Keys that need a pass (queued, or re-added while in flight)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Consecutive failures per key
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

/// Work queue shared by the event router and the worker pool
#[derive(Debug)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: ExponentialBackoff,
    metrics: Option<ControllerMetrics>,
}

impl WorkQueue {
    /// Create an empty queue retrying failed keys with `backoff`
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
            metrics: None,
        }
    }

    /// Report depth and retries on `metrics`
    #[must_use]
    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // critical sections never panic midway, the state is always consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report_depth(&self, state: &QueueState) {
        if let Some(metrics) = &self.metrics {
            metrics
                .workqueue_depth
                .set(i64::try_from(state.queue.len()).unwrap_or(i64::MAX));
        }
    }

    /// Queue `key` unless it is already pending. No-op after shutdown.
    pub fn add(&self, key: &str) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(key) {
            return;
        }
        state.dirty.insert(key.to_string());
        if state.processing.contains(key) {
            debug!(key, "Key in flight, coalescing into the next pass");
            return;
        }
        state.queue.push_back(key.to_string());
        self.report_depth(&state);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    self.report_depth(&state);
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Release a key handed out by [`get`](Self::get).
    ///
    /// A key re-added while it was in flight is queued again here.
    pub fn done(&self, key: &str) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            self.report_depth(&state);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Clear the failure count of `key`
    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    /// Queue `key` again after its back-off delay and count the failure.
    pub fn add_rate_limited(self: &Arc<Self>, key: &str) {
        let delay = {
            let mut state = self.lock();
            let failures = state.failures.entry(key.to_string()).or_insert(0);
            let delay = self.backoff.for_failures(*failures);
            *failures = failures.saturating_add(1);
            delay
        };
        if let Some(metrics) = &self.metrics {
            metrics.workqueue_retries_total.inc();
        }
        debug!(key, delay_ms = delay.as_millis(), "Scheduling rate-limited requeue");

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(&key);
        });
    }

    /// Number of rate-limited requeues since the last [`forget`](Self::forget)
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.lock().failures.get(key).copied().unwrap_or(0)
    }

    /// Keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no key is waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop handing out keys and wake every blocked [`get`](Self::get).
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Whether [`shut_down`](Self::shut_down) was called
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}

#[cfg(test)]
#[path = "workqueue_test.rs"]
mod workqueue_test;
