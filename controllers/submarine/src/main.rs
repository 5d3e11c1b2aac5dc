//! Submarine Controller
//!
//! Level-triggered controller for `Submarine` resources. Each Submarine is
//! converged into its child objects:
//! - Server: ServiceAccount, Deployment and Service
//! - Database: PersistentVolumeClaim, Secret, StatefulSet and Service
//! - Ingress, Role and RoleBinding for the server
//! - Tensorboard, MLflow and Minio with their Traefik IngressRoutes
//!
//! Availability of the server and database is written back to the
//! Submarine status.

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod manifests;
mod metrics;
mod owner;
mod probes;
mod reconciler;
mod store;
#[cfg(test)]
mod test_utils;
mod watcher;
mod workqueue;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeEventPublisher;
use crate::metrics::ControllerMetrics;
use crate::probes::ProbeState;
use crate::store::TypedStore;
use cluster_client::KubeClusterClient;
use controller::Controller;
use prometheus::Registry;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) =
        rustls::crypto::CryptoProvider::install_default(rustls::crypto::ring::default_provider())
    {
        debug!(?e, "CryptoProvider already installed");
    }

    info!("Starting Submarine Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Workers: {}", config.workers);
    info!("  Probe address: {}", config.probe_addr);

    let kube_client = kube::Client::try_default().await?;
    let client = KubeClusterClient::new(kube_client.clone(), config.namespace.clone());
    let events = Arc::new(KubeEventPublisher::new(kube_client));

    let registry = Registry::new();
    let metrics = ControllerMetrics::new(&registry)?;
    let roots = Arc::new(TypedStore::new());

    let probe_state = ProbeState::new(Arc::clone(&roots), registry);
    let probe_addr = config.probe_addr;
    tokio::spawn(async move {
        if let Err(e) = probes::serve(probe_addr, probe_state).await {
            error!(error = %e, "Probe server stopped");
        }
    });

    let controller = Controller::new(&config, client, roots, events, metrics);
    controller.run(shutdown_signal()).await
}

/// Completes on SIGINT or SIGTERM
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
