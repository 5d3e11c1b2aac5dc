//! Typed, watch-populated object cache.
//!
//! One [`TypedStore`] per watched kind. The watch loop feeds it
//! [`WatchEvent`]s and forwards the resulting [`Notification`]s to the event
//! router. Readers get shared `Arc` snapshots and must treat them as
//! read-only; a reconcile that wants to change an object clones it first.

use cluster_client::{ClusterObject, WatchEvent};
use kube::ResourceExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{RwLock, watch};
use tracing::debug;

/// Builds the `namespace/name` key used by the store and the work queue.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Splits a `namespace/name` key. `None` when the key is malformed.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let (namespace, name) = key.split_once('/')?;
    if namespace.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((namespace, name))
}

fn key_of<K: ClusterObject>(object: &K) -> String {
    object_key(&object.namespace().unwrap_or_default(), &object.name_any())
}

/// Last known state of a deleted object
#[derive(Debug, Clone)]
pub enum Tombstone<K> {
    /// Deletion observed on the watch stream
    Known(Arc<K>),
    /// Object vanished between two listings; the deletion itself was never seen
    FinalStateUnknown {
        /// `namespace/name` of the vanished object
        key: String,
        /// Last state the cache held
        last: Arc<K>,
    },
}

impl<K> Tombstone<K> {
    /// The deleted object, unwrapped from either form
    pub fn object(&self) -> &Arc<K> {
        match self {
            Self::Known(object) | Self::FinalStateUnknown { last: object, .. } => object,
        }
    }
}

/// Change produced by applying a watch event to the store
#[derive(Debug, Clone)]
pub enum Notification<K> {
    /// First time the store sees the object
    Added(Arc<K>),
    /// Object replaced a cached version
    Updated {
        /// Cached version before the event
        old: Arc<K>,
        /// Version now cached
        new: Arc<K>,
    },
    /// Object removed from the store
    Deleted(Tombstone<K>),
}

#[derive(Debug)]
struct StoreState<K> {
    objects: HashMap<String, Arc<K>>,
    /// Keys seen since the current relist started
    relisting: Option<HashSet<String>>,
}

/// Read-only cache of one kind, keyed by `namespace/name`
#[derive(Debug)]
pub struct TypedStore<K> {
    state: RwLock<StoreState<K>>,
    synced: watch::Sender<bool>,
}

impl<K: ClusterObject> Default for TypedStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ClusterObject> TypedStore<K> {
    /// Create an empty, unsynced store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                objects: HashMap::new(),
                relisting: None,
            }),
            synced: watch::Sender::new(false),
        }
    }

    /// Cached object, possibly slightly stale
    pub async fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.state
            .read()
            .await
            .objects
            .get(&object_key(namespace, name))
            .cloned()
    }

    /// Number of cached objects
    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    /// Whether the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Whether the first complete listing has been applied
    pub fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until [`has_synced`](Self::has_synced) is true
    pub async fn wait_for_sync(&self) {
        let mut synced = self.synced.subscribe();
        // the sender lives in self, the channel cannot close under us
        let _ = synced.wait_for(|synced| *synced).await;
    }

    /// Apply one watch event and return what changed
    pub async fn apply(&self, event: WatchEvent<K>) -> Vec<Notification<K>> {
        let mut state = self.state.write().await;
        match event {
            WatchEvent::Applied(object) => vec![Self::upsert(&mut state, object)],
            WatchEvent::Listed(object) => {
                let key = key_of(&object);
                if let Some(seen) = state.relisting.as_mut() {
                    seen.insert(key);
                }
                vec![Self::upsert(&mut state, object)]
            }
            WatchEvent::Deleted(object) => {
                let object = Arc::new(object);
                state.objects.remove(&key_of(object.as_ref()));
                vec![Notification::Deleted(Tombstone::Known(object))]
            }
            WatchEvent::RelistStarted => {
                state.relisting = Some(HashSet::new());
                Vec::new()
            }
            WatchEvent::RelistDone => {
                let seen = state.relisting.take().unwrap_or_default();
                let vanished: Vec<String> = state
                    .objects
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();
                let notifications = vanished
                    .into_iter()
                    .filter_map(|key| {
                        let last = state.objects.remove(&key)?;
                        debug!(kind = %K::kind(&()), key, "Object vanished during relist");
                        Some(Notification::Deleted(Tombstone::FinalStateUnknown { key, last }))
                    })
                    .collect();
                drop(state);
                self.synced.send_replace(true);
                notifications
            }
        }
    }

    fn upsert(state: &mut StoreState<K>, object: K) -> Notification<K> {
        let new = Arc::new(object);
        match state.objects.insert(key_of(new.as_ref()), Arc::clone(&new)) {
            Some(old) => Notification::Updated { old, new },
            None => Notification::Added(new),
        }
    }
}
