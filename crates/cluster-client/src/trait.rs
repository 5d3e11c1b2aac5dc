//! ClusterClient trait for mocking
//!
//! This trait abstracts the object-store API the controller consumes so that
//! reconcilers can be unit tested against an in-memory cluster.

use crate::error::ClusterError;
use crate::event::WatchEvent;
use futures::stream::BoxStream;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Any namespaced, statically typed object the controller reads or writes.
pub trait ClusterObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ClusterObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Trait for cluster object-store operations
///
/// Namespaces and names are taken from the object metadata for writes.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Fetch one object. Missing objects yield [`ClusterError::NotFound`].
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, ClusterError>;

    /// Create an object. A taken name yields [`ClusterError::AlreadyExists`].
    async fn create<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError>;

    /// Replace an object. A stale `resourceVersion` yields [`ClusterError::Conflict`].
    async fn update<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError>;

    /// Replace the status subresource of an object, guarded by its `resourceVersion`.
    async fn update_status<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError>;

    /// Long-lived watch over every object of kind `K` in the client's scope.
    fn watch<K: ClusterObject>(&self) -> BoxStream<'static, Result<WatchEvent<K>, ClusterError>>;
}

/// Describes an object as `Kind namespace/name` for error messages.
pub(crate) fn describe<K: ClusterObject>(namespace: &str, name: &str) -> String {
    format!("{} {}/{}", K::kind(&()), namespace, name)
}

/// Returns `(namespace, name)` from object metadata.
pub(crate) fn identity<K: ClusterObject>(object: &K) -> Result<(String, String), ClusterError> {
    let meta = object.meta();
    let name = meta.name.clone().ok_or_else(|| {
        ClusterError::InvalidObject(format!("{} without metadata.name", K::kind(&())))
    })?;
    let namespace = meta.namespace.clone().ok_or_else(|| {
        ClusterError::InvalidObject(format!("{} {} without metadata.namespace", K::kind(&()), name))
    })?;
    Ok((namespace, name))
}
