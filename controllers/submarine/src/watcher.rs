//! Kubernetes resource watchers.
//!
//! Every watched kind gets one long-lived watch loop that feeds a
//! [`TypedStore`] and hands the resulting notifications to the
//! [`EventRouter`]. The router maps each notification to the key of the
//! Submarine it concerns and enqueues it; it never reconciles anything itself.

use crate::error::ControllerError;
use crate::owner::OwnerResolvable;
use crate::store::{Notification, Tombstone, TypedStore, object_key};
use crate::workqueue::WorkQueue;
use cluster_client::{ClusterClient, ClusterObject};
use crds::{IngressRoute, Submarine};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Secret, Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::Resource;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Routes store notifications to work queue keys.
#[derive(Debug)]
pub struct EventRouter {
    queue: Arc<WorkQueue>,
    roots: Arc<TypedStore<Submarine>>,
}

impl EventRouter {
    /// Creates a router resolving owners against `roots`
    pub fn new(queue: Arc<WorkQueue>, roots: Arc<TypedStore<Submarine>>) -> Self {
        Self { queue, roots }
    }

    /// Handles a change to a Submarine.
    ///
    /// Adds always enqueue. Updates enqueue only when the resource version
    /// moved, which drops resyncs and echoes of unchanged objects. Deletes
    /// enqueue nothing: children are collected through their owner links.
    pub fn on_root(&self, notification: &Notification<Submarine>) {
        match notification {
            Notification::Added(root) => self.enqueue_root(root),
            Notification::Updated { old, new } => {
                if OwnerResolvable::resource_version(old.as_ref())
                    == OwnerResolvable::resource_version(new.as_ref())
                {
                    return;
                }
                self.enqueue_root(new);
            }
            Notification::Deleted(tombstone) => {
                debug!(name = ?tombstone.object().metadata.name, "Submarine deleted");
            }
        }
    }

    /// Handles a change to a child of any kind by enqueueing its owner.
    pub async fn on_child<K: ClusterObject>(&self, notification: Notification<K>) {
        let object = match notification {
            Notification::Added(object) => object,
            Notification::Updated { old, new } => {
                if OwnerResolvable::resource_version(old.as_ref())
                    == OwnerResolvable::resource_version(new.as_ref())
                {
                    return;
                }
                new
            }
            Notification::Deleted(Tombstone::Known(object)) => object,
            Notification::Deleted(Tombstone::FinalStateUnknown { key, last }) => {
                debug!(kind = %K::kind(&()), key, "Recovered deleted object from tombstone");
                last
            }
        };
        self.enqueue_owner(object.as_ref()).await;
    }

    fn enqueue_root(&self, root: &Submarine) {
        let key = object_key(
            root.meta().namespace.as_deref().unwrap_or_default(),
            root.meta().name.as_deref().unwrap_or_default(),
        );
        self.queue.add(&key);
    }

    async fn enqueue_owner<K: ClusterObject>(&self, object: &K) {
        let Some(owner) = object.controller_owner() else {
            return;
        };
        if owner.kind != Submarine::kind(&()) {
            return;
        }
        let namespace = object.meta().namespace.as_deref().unwrap_or_default();
        let name = object.meta().name.as_deref().unwrap_or_default();

        match self.roots.get(namespace, &owner.name).await {
            None => {
                warn!(
                    kind = %K::kind(&()),
                    namespace,
                    name,
                    owner = %owner.name,
                    "Ignoring orphaned object"
                );
            }
            Some(root) if root.meta().uid.as_deref() != Some(owner.uid.as_str()) => {
                warn!(
                    kind = %K::kind(&()),
                    namespace,
                    name,
                    owner = %owner.name,
                    "Ignoring object owned by a previous Submarine with the same name"
                );
            }
            Some(_) => self.queue.add(&object_key(namespace, &owner.name)),
        }
    }
}

/// Applies every watch event of kind `K` to `store` and passes the
/// notifications to `handle`. Only returns when the stream ends.
async fn run_watch<K, C, H, Fut>(
    client: C,
    store: Arc<TypedStore<K>>,
    handle: H,
) -> Result<(), ControllerError>
where
    K: ClusterObject,
    C: ClusterClient,
    H: Fn(Notification<K>) -> Fut + Send,
    Fut: Future<Output = ()> + Send,
{
    let kind = K::kind(&());
    info!(%kind, "Starting watcher");
    let mut stream = client.watch::<K>();
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                for notification in store.apply(event).await {
                    handle(notification).await;
                }
            }
            // the stream backs off and reconnects by itself
            Err(e) => warn!(%kind, error = %e, "Watch stream error"),
        }
    }
    Err(ControllerError::Watch(format!("{kind} watch stream ended")))
}

/// Explicit list of watch loops started at boot.
#[derive(Debug)]
pub struct WatchRegistry<C> {
    client: C,
    router: Arc<EventRouter>,
    tasks: Vec<(String, JoinHandle<Result<(), ControllerError>>)>,
}

impl<C: ClusterClient + Clone> WatchRegistry<C> {
    /// Creates an empty registry
    pub fn new(client: C, router: Arc<EventRouter>) -> Self {
        Self {
            client,
            router,
            tasks: Vec::new(),
        }
    }

    /// Registry watching Submarines into `roots` plus every child kind the
    /// reconciler manages.
    pub fn for_submarine(
        client: C,
        router: Arc<EventRouter>,
        roots: Arc<TypedStore<Submarine>>,
    ) -> Self {
        let mut registry = Self::new(client, router);
        registry.watch_roots(roots);
        registry.watch_children::<ServiceAccount>();
        registry.watch_children::<Deployment>();
        registry.watch_children::<Service>();
        registry.watch_children::<PersistentVolumeClaim>();
        registry.watch_children::<Secret>();
        registry.watch_children::<StatefulSet>();
        registry.watch_children::<Ingress>();
        registry.watch_children::<Role>();
        registry.watch_children::<RoleBinding>();
        registry.watch_children::<IngressRoute>();
        registry
    }

    /// Start the Submarine watch loop
    pub fn watch_roots(&mut self, roots: Arc<TypedStore<Submarine>>) {
        let router = Arc::clone(&self.router);
        let task = tokio::spawn(run_watch(self.client.clone(), roots, move |notification| {
            router.on_root(&notification);
            std::future::ready(())
        }));
        self.tasks.push((Submarine::kind(&()).to_string(), task));
    }

    /// Start a watch loop for child kind `K` with its own store
    pub fn watch_children<K: ClusterObject>(&mut self) {
        let router = Arc::clone(&self.router);
        let store = Arc::new(TypedStore::<K>::new());
        let task = tokio::spawn(run_watch(self.client.clone(), store, move |notification| {
            let router = Arc::clone(&router);
            async move { router.on_child(notification).await }
        }));
        self.tasks.push((K::kind(&()).to_string(), task));
    }

    /// Kinds being watched, in registration order
    pub fn kinds(&self) -> Vec<&str> {
        self.tasks.iter().map(|(kind, _)| kind.as_str()).collect()
    }

    /// Hand the running loops to the caller
    pub fn into_tasks(self) -> Vec<(String, JoinHandle<Result<(), ControllerError>>)> {
        self.tasks
    }
}

#[cfg(test)]
#[path = "watcher_test.rs"]
mod watcher_test;
