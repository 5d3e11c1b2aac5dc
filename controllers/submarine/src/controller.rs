//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the watch loops,
//! the work queue and a fixed pool of workers around the reconciler, and
//! runs them until shutdown.

use crate::backoff::ExponentialBackoff;
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Severity};
use crate::events::EventPublisher;
use crate::metrics::ControllerMetrics;
use crate::reconciler::Reconciler;
use crate::store::TypedStore;
use crate::watcher::{EventRouter, WatchRegistry};
use crate::workqueue::WorkQueue;
use cluster_client::ClusterClient;
use crds::Submarine;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Main controller for Submarine resources.
pub struct Controller<C> {
    workers: usize,
    queue: Arc<WorkQueue>,
    roots: Arc<TypedStore<Submarine>>,
    reconciler: Arc<Reconciler<C>>,
    metrics: ControllerMetrics,
    watchers: Vec<(String, JoinHandle<Result<(), ControllerError>>)>,
}

impl<C> std::fmt::Debug for Controller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("workers", &self.workers)
            .field("watchers", &self.watchers.len())
            .finish_non_exhaustive()
    }
}

impl<C: ClusterClient + Clone> Controller<C> {
    /// Creates the controller and starts its watch loops.
    ///
    /// Workers are not started until [`run`](Self::run) sees the Submarine
    /// cache synced.
    pub fn new(
        config: &ControllerConfig,
        client: C,
        roots: Arc<TypedStore<Submarine>>,
        events: Arc<dyn EventPublisher>,
        metrics: ControllerMetrics,
    ) -> Self {
        info!("Initializing Submarine Controller");

        let queue = Arc::new(
            WorkQueue::new(ExponentialBackoff::new(config.base_delay, config.max_delay))
                .with_metrics(metrics.clone()),
        );
        let router = Arc::new(EventRouter::new(Arc::clone(&queue), Arc::clone(&roots)));
        let registry = WatchRegistry::for_submarine(client.clone(), router, Arc::clone(&roots));
        info!(kinds = ?registry.kinds(), "Started watchers");

        let reconciler = Arc::new(Reconciler::new(client, Arc::clone(&roots), events));

        Self {
            workers: config.workers,
            queue,
            roots,
            reconciler,
            metrics,
            watchers: registry.into_tasks(),
        }
    }

    /// Runs until `shutdown` completes or a watch loop dies.
    ///
    /// On shutdown the queue stops handing out keys, workers finish the key
    /// they hold and exit, then the watch loops are stopped.
    pub async fn run(
        mut self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), ControllerError> {
        tokio::pin!(shutdown);

        info!("Waiting for Submarine cache to sync");
        tokio::select! {
            () = self.roots.wait_for_sync() => {}
            () = &mut shutdown => {
                info!("Shutdown requested before cache sync");
                self.stop_watchers();
                return Ok(());
            }
        }

        info!(workers = self.workers, "Starting workers");
        let workers: Vec<JoinHandle<()>> = (0..self.workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.reconciler),
                    self.metrics.clone(),
                ))
            })
            .collect();

        let kinds: Vec<String> = self.watchers.iter().map(|(kind, _)| kind.clone()).collect();
        let watchers = futures::future::select_all(self.watchers.iter_mut().map(|(_, task)| task));
        let outcome = tokio::select! {
            () = &mut shutdown => {
                info!("Shutting down workers");
                Ok(())
            }
            (result, index, _) = watchers => {
                let kind = kinds.get(index).map_or("unknown", String::as_str);
                match result {
                    Ok(Ok(())) => Err(ControllerError::Watch(format!("{kind} watcher exited"))),
                    Ok(Err(e)) => Err(ControllerError::Watch(format!("{kind} watcher error: {e}"))),
                    Err(e) => Err(ControllerError::Watch(format!("{kind} watcher panicked: {e}"))),
                }
            }
        };

        self.queue.shut_down();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed");
            }
        }
        self.stop_watchers();
        info!("Controller stopped");
        outcome
    }

    fn stop_watchers(&self) {
        for (_, task) in &self.watchers {
            task.abort();
        }
    }
}

async fn run_worker<C: ClusterClient>(
    id: usize,
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler<C>>,
    metrics: ControllerMetrics,
) {
    debug!(worker = id, "Worker started");
    let reconciler = reconciler.as_ref();
    while process_next(&queue, &metrics, move |key| async move {
        reconciler.reconcile(&key).await
    })
    .await
    {}
    debug!(worker = id, "Worker stopped");
}

/// Takes one key off the queue and reconciles it.
///
/// Panics are caught and treated as transient failures. Returns `false`
/// once the queue is shut down.
pub(crate) async fn process_next<F, Fut>(
    queue: &Arc<WorkQueue>,
    metrics: &ControllerMetrics,
    reconcile: F,
) -> bool
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(), ControllerError>>,
{
    let Some(key) = queue.get().await else {
        return false;
    };

    let result = AssertUnwindSafe(reconcile(key.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(ControllerError::Panicked(panic_message(panic.as_ref()))));

    match result {
        Ok(()) => {
            metrics.record_reconcile(None);
            queue.forget(&key);
        }
        Err(e) => {
            let severity = e.severity();
            metrics.record_reconcile(Some(severity));
            match severity {
                Severity::Terminal => {
                    error!(
                        key,
                        error = %e,
                        "Reconcile failed, not retrying until the Submarine changes"
                    );
                    queue.forget(&key);
                }
                Severity::Transient => {
                    warn!(
                        key,
                        error = %e,
                        retries = queue.num_requeues(&key),
                        "Reconcile failed, requeuing"
                    );
                    queue.add_rate_limited(&key);
                }
            }
        }
    }
    queue.done(&key);
    true
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod controller_test;
