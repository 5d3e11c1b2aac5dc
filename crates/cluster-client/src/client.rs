//! Kubernetes-backed implementation of [`ClusterClient`]

use crate::error::ClusterError;
use crate::event::WatchEvent;
use crate::cluster_trait::{ClusterClient, ClusterObject, describe, identity};
use futures::StreamExt;
use futures::stream::BoxStream;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use kube_runtime::{WatchStreamExt, watcher};
use tracing::debug;

/// Object-store client talking to the Kubernetes API server.
///
/// Reads and writes are addressed by the object's own namespace; watches
/// cover `namespace` when set, otherwise the whole cluster.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    namespace: Option<String>,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a client; `namespace` limits the watch scope.
    #[must_use]
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    /// Underlying kube client, e.g. for event recording.
    #[must_use]
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn api<K: ClusterObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, ClusterError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, describe::<K>(namespace, name)))
    }

    async fn create<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "create");
        self.api::<K>(&namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| ClusterError::from_kube(e, describe::<K>(&namespace, &name)))
    }

    async fn update<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        debug!(kind = %K::kind(&()), %namespace, %name, "replace");
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| ClusterError::from_kube(e, describe::<K>(&namespace, &name)))
    }

    async fn update_status<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        let value = serde_json::to_value(object)?;
        // resourceVersion in a merge patch makes the API server reject stale writers
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": object.meta().resource_version },
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });
        debug!(kind = %K::kind(&()), %namespace, %name, "patch status");
        self.api::<K>(&namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, describe::<K>(&namespace, &name)))
    }

    fn watch<K: ClusterObject>(&self) -> BoxStream<'static, Result<WatchEvent<K>, ClusterError>> {
        let api: Api<K> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        watcher(api, watcher::Config::default())
            .default_backoff()
            .map(|event| {
                event
                    .map(WatchEvent::from)
                    .map_err(|e| ClusterError::Watch(e.to_string()))
            })
            .boxed()
    }
}
