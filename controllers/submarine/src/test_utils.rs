//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

#[cfg(test)]
use crate::events::RecordingEventPublisher;
#[cfg(test)]
use crate::reconciler::Reconciler;
#[cfg(test)]
use crate::store::TypedStore;
#[cfg(test)]
use cluster_client::{MockClusterClient, WatchEvent};
#[cfg(test)]
use crds::*;
#[cfg(test)]
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
#[cfg(test)]
use std::sync::Arc;

/// Helper to create a test Submarine with `nfs` storage and auxiliary services off
#[cfg(test)]
pub fn create_test_submarine(namespace: &str, name: &str, server_replicas: i32) -> Submarine {
    Submarine {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{name}")),
            resource_version: Some("1".to_string()),
            generation: Some(1),
            ..Default::default()
        },
        spec: SubmarineSpec {
            version: "0.8.0".to_string(),
            server: SubmarineServerSpec {
                image: None,
                replicas: server_replicas,
            },
            database: SubmarineDatabaseSpec::default(),
            tensorboard: AuxiliarySpec {
                enabled: false,
                ..Default::default()
            },
            mlflow: AuxiliarySpec {
                enabled: false,
                ..Default::default()
            },
            minio: AuxiliarySpec {
                enabled: false,
                ..Default::default()
            },
            storage: SubmarineStorage {
                storage_type: "nfs".to_string(),
                storage_class_name: None,
            },
            common: None,
        },
        status: None,
    }
}

/// Reconciler wired to an in-memory cluster
#[cfg(test)]
pub struct TestHarness {
    pub cluster: MockClusterClient,
    pub roots: Arc<TypedStore<Submarine>>,
    pub events: RecordingEventPublisher,
    pub reconciler: Reconciler<MockClusterClient>,
}

#[cfg(test)]
impl TestHarness {
    pub fn new() -> Self {
        let cluster = MockClusterClient::new();
        let roots = Arc::new(TypedStore::new());
        let events = RecordingEventPublisher::default();
        let reconciler = Reconciler::new(
            cluster.clone(),
            Arc::clone(&roots),
            Arc::new(events.clone()),
        );
        Self {
            cluster,
            roots,
            events,
            reconciler,
        }
    }

    /// Store `root` in the cluster and mirror it into the root cache
    pub async fn add_root(&self, root: Submarine) -> Submarine {
        let stored = self.cluster.insert(root);
        self.roots.apply(WatchEvent::Applied(stored.clone())).await;
        stored
    }

    /// Edit a root as a user would and mirror the result into the cache
    pub async fn edit_root(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut Submarine),
    ) -> Submarine {
        let edited = self.cluster.modify::<Submarine>(namespace, name, f);
        self.roots.apply(WatchEvent::Applied(edited.clone())).await;
        edited
    }

    /// Re-read a root from the cluster into the cache (e.g. after a status write)
    pub async fn refresh_root(&self, namespace: &str, name: &str) -> Submarine {
        let current = self.cluster.object::<Submarine>(namespace, name).unwrap();
        self.roots.apply(WatchEvent::Applied(current.clone())).await;
        current
    }
}
