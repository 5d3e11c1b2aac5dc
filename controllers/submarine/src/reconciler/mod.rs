//! Reconciliation logic for Submarine resources.
//!
//! One pass re-reads the Submarine from the cache and converges every child
//! it declares, in dependency order:
//! - server: service account, deployment, service
//! - database: claim, password secret, statefulset, service
//! - ingress and RBAC for the server
//! - tensorboard, mlflow and minio when enabled
//!
//! and then writes the observed status back.

pub mod compare;
pub mod converge;
pub mod status;

use crate::error::ControllerError;
use crate::events::{EventPublisher, MESSAGE_SYNCED, reasons};
use crate::manifests::database::{self, DATABASE_NAME, DATABASE_PVC_NAME, DATABASE_SECRET_NAME};
use crate::manifests::ingress::{self, INGRESS_NAME};
use crate::manifests::server::{self, SERVER_NAME};
use crate::manifests::{auxiliary, rbac};
use crate::store::{TypedStore, split_key};
use cluster_client::ClusterClient;
use crds::{ACCEPTED_STORAGE_TYPES, Submarine};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::Resource;
use kube::runtime::events::EventType;
use std::sync::Arc;
use tracing::{debug, info};

/// Reconciles Submarine resources.
pub struct Reconciler<C> {
    pub(crate) client: C,
    roots: Arc<TypedStore<Submarine>>,
    pub(crate) events: Arc<dyn EventPublisher>,
}

impl<C> std::fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

/// Rejects specs the controller can never act on.
pub fn validate(root: &Submarine) -> Result<(), ControllerError> {
    let storage_type = root.spec.storage.storage_type.as_str();
    if !ACCEPTED_STORAGE_TYPES.contains(&storage_type) {
        return Err(ControllerError::InvalidSpec(format!(
            "invalid storageType '{storage_type}', nothing will be created. \
             Valid storage types are {}",
            ACCEPTED_STORAGE_TYPES.join(", ")
        )));
    }
    if root.spec.server.replicas < 0 || root.spec.database.replicas < 0 {
        return Err(ControllerError::InvalidSpec(
            "replica counts must not be negative".to_string(),
        ));
    }
    Ok(())
}

impl<C: ClusterClient> Reconciler<C> {
    /// Creates a reconciler reading roots from `roots` and writing through `client`.
    pub fn new(
        client: C,
        roots: Arc<TypedStore<Submarine>>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { client, roots, events }
    }

    /// Sync entry point for one `namespace/name` key.
    ///
    /// A missing or terminating Submarine is a successful no-op. Any failing
    /// step stops the pass; the error's severity decides whether the key is
    /// retried.
    pub async fn reconcile(&self, key: &str) -> Result<(), ControllerError> {
        let (namespace, name) =
            split_key(key).ok_or_else(|| ControllerError::InvalidKey(key.to_string()))?;

        let Some(root) = self.roots.get(namespace, name).await else {
            info!(key, "Submarine in work queue no longer exists");
            return Ok(());
        };
        if root.metadata.deletion_timestamp.is_some() {
            debug!(key, "Submarine is terminating, leaving children alone");
            return Ok(());
        }
        debug!(key, "Reconciling Submarine");

        if let Err(e) = validate(&root) {
            self.events
                .publish(
                    &root.object_ref(&()),
                    EventType::Warning,
                    reasons::INVALID_SPEC,
                    e.to_string(),
                )
                .await;
            return Err(e);
        }

        let server = self.converge_server(&root).await?;
        let database = self.converge_database(&root).await?;
        self.converge(&root, INGRESS_NAME, ingress::ingress).await?;
        self.converge(&root, SERVER_NAME, rbac::role).await?;
        self.converge(&root, SERVER_NAME, rbac::role_binding).await?;
        self.converge_auxiliaries(&root).await?;

        self.report_status(&root, &server, &database).await?;

        self.events
            .publish(
                &root.object_ref(&()),
                EventType::Normal,
                reasons::SYNCED,
                MESSAGE_SYNCED.to_string(),
            )
            .await;
        info!(key, "Successfully synced Submarine");
        Ok(())
    }

    async fn converge_server(&self, root: &Submarine) -> Result<Deployment, ControllerError> {
        self.converge(root, SERVER_NAME, server::service_account).await?;
        let deployment = self.converge(root, SERVER_NAME, server::deployment).await?;
        self.converge(root, SERVER_NAME, server::service).await?;
        Ok(deployment)
    }

    async fn converge_database(&self, root: &Submarine) -> Result<StatefulSet, ControllerError> {
        self.converge(root, DATABASE_PVC_NAME, database::persistent_volume_claim).await?;
        if database::manages_secret(root) {
            self.converge(root, DATABASE_SECRET_NAME, database::secret).await?;
        }
        let stateful_set = self.converge(root, DATABASE_NAME, database::stateful_set).await?;
        self.converge(root, DATABASE_NAME, database::service).await?;
        Ok(stateful_set)
    }

    async fn converge_auxiliaries(&self, root: &Submarine) -> Result<(), ControllerError> {
        for aux in auxiliary::ALL.iter().filter(|aux| aux.enabled(root)) {
            self.converge(root, &aux.pvc_name(), |root| aux.persistent_volume_claim(root)).await?;
            self.converge(root, aux.name, |root| aux.deployment(root)).await?;
            self.converge(root, &aux.service_name(), |root| aux.service(root)).await?;
            self.converge(root, &aux.ingress_route_name(), |root| aux.ingress_route(root)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;
