//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClient`] that
//! behaves like a small API server: it assigns UIDs and resource versions,
//! enforces optimistic concurrency, keeps status separate from the main
//! resource, and streams watch events. Every call is recorded so tests can
//! assert on exactly which writes a reconcile pass issued.

use crate::cluster_trait::{ClusterClient, ClusterObject, describe, identity};
use crate::error::ClusterError;
use crate::event::WatchEvent;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// API verb recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `get`
    Get,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `update_status`
    UpdateStatus,
}

impl Verb {
    /// Whether the verb writes to the cluster
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Get)
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Verb issued
    pub verb: Verb,
    /// Object kind, e.g. "Deployment"
    pub kind: String,
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

/// Failure injected into the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Optimistic concurrency failure
    Conflict,
    /// Name already taken
    AlreadyExists,
    /// Server unavailable (503)
    Unavailable,
}

#[derive(Debug, Clone)]
struct MockEvent {
    kind: String,
    deleted: bool,
    object: Value,
}

type ObjectKey = (String, String, String);

struct MockState {
    objects: BTreeMap<ObjectKey, Value>,
    calls: Vec<Call>,
    failures: VecDeque<(Verb, String, MockFailure)>,
    next_version: u64,
    events: broadcast::Sender<MockEvent>,
}

impl MockState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_failure(&mut self, verb: Verb, kind: &str) -> Option<MockFailure> {
        let position = self
            .failures
            .iter()
            .position(|(v, k, _)| *v == verb && k == kind)?;
        self.failures.remove(position).map(|(_, _, failure)| failure)
    }

    fn publish(&self, kind: &str, deleted: bool, object: &Value) {
        // no receivers is fine
        let _ = self.events.send(MockEvent {
            kind: kind.to_string(),
            deleted,
            object: object.clone(),
        });
    }
}

/// Mock ClusterClient for testing
///
/// Cheap to clone; clones share the same in-memory cluster.
#[derive(Clone)]
pub struct MockClusterClient {
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("MockClusterClient")
            .field("objects", &state.objects.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl Default for MockClusterClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClusterClient {
    /// Create an empty mock cluster
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            state: Arc::new(Mutex::new(MockState {
                objects: BTreeMap::new(),
                calls: Vec::new(),
                failures: VecDeque::new(),
                next_version: 0,
                events,
            })),
        }
    }

    /// Add an object as if another actor had created it (not recorded as a call).
    ///
    /// Assigns a UID and resource version when missing and returns the stored object.
    pub fn insert<K: ClusterObject>(&self, object: K) -> K {
        let (namespace, name) = identity(&object).unwrap();
        let mut value = serde_json::to_value(&object).unwrap();
        let mut state = self.state.lock().unwrap();
        let version = state.bump_version();
        let meta = metadata_mut(&mut value);
        if meta.get("uid").is_none_or(Value::is_null) {
            meta["uid"] = json!(uuid::Uuid::new_v4().to_string());
        }
        meta["resourceVersion"] = json!(version);
        let kind = K::kind(&()).to_string();
        state
            .objects
            .insert((kind.clone(), namespace, name), value.clone());
        state.publish(&kind, false, &value);
        serde_json::from_value(value).unwrap()
    }

    /// Mutate a stored object as an external actor would (not recorded as a call).
    ///
    /// Status changes made by `f` are kept. The resource version is bumped,
    /// the generation too when the spec changed, and a watch event is emitted.
    pub fn modify<K: ClusterObject>(
        &self,
        namespace: &str,
        name: &str,
        f: impl FnOnce(&mut K),
    ) -> K {
        let kind = K::kind(&()).to_string();
        let key = (kind.clone(), namespace.to_string(), name.to_string());
        let mut state = self.state.lock().unwrap();
        let stored = state.objects.get(&key).cloned().unwrap();
        let mut object: K = serde_json::from_value(stored.clone()).unwrap();
        f(&mut object);
        let mut value = serde_json::to_value(&object).unwrap();
        let generation = stored["metadata"]["generation"].as_i64().unwrap_or(1);
        if stored.get("spec") != value.get("spec") {
            metadata_mut(&mut value)["generation"] = json!(generation + 1);
        }
        let version = state.bump_version();
        metadata_mut(&mut value)["resourceVersion"] = json!(version);
        state.objects.insert(key, value.clone());
        state.publish(&kind, false, &value);
        serde_json::from_value(value).unwrap()
    }

    /// Delete a stored object as an external actor would (not recorded as a call).
    pub fn remove<K: ClusterObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock().unwrap();
        let value = state
            .objects
            .remove(&(kind.clone(), namespace.to_string(), name.to_string()))?;
        state.publish(&kind, true, &value);
        serde_json::from_value(value).ok()
    }

    /// Read a stored object without recording a call
    #[must_use]
    pub fn object<K: ClusterObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let kind = K::kind(&()).to_string();
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Number of stored objects of kind `K`
    #[must_use]
    pub fn object_count<K: ClusterObject>(&self) -> usize {
        let kind = K::kind(&());
        let state = self.state.lock().unwrap();
        state.objects.keys().filter(|(k, _, _)| k == kind.as_ref()).count()
    }

    /// Fail the next `verb` call on `kind` with `failure`
    pub fn fail_next(&self, verb: Verb, kind: &str, failure: MockFailure) {
        self.state
            .lock()
            .unwrap()
            .failures
            .push_back((verb, kind.to_string(), failure));
    }

    /// Every recorded call, oldest first
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded create/update/update_status calls
    #[must_use]
    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.verb.is_mutation()).collect()
    }

    /// Number of recorded `verb` calls on `kind`
    #[must_use]
    pub fn count(&self, verb: Verb, kind: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.verb == verb && c.kind == kind)
            .count()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(
        state: &mut MockState,
        verb: Verb,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<(), ClusterError> {
        state.calls.push(Call {
            verb,
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        let what = format!("{kind} {namespace}/{name}");
        match state.take_failure(verb, kind) {
            None => Ok(()),
            Some(MockFailure::Conflict) => Err(ClusterError::Conflict(what)),
            Some(MockFailure::AlreadyExists) => Err(ClusterError::AlreadyExists(what)),
            Some(MockFailure::Unavailable) => Err(ClusterError::Api {
                code: 503,
                message: format!("injected failure for {what}"),
            }),
        }
    }

    fn check_version(stored: &Value, incoming: &Value, what: String) -> Result<(), ClusterError> {
        let expected = &incoming["metadata"]["resourceVersion"];
        if !expected.is_null() && *expected != stored["metadata"]["resourceVersion"] {
            return Err(ClusterError::Conflict(what));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn get<K: ClusterObject>(&self, namespace: &str, name: &str) -> Result<K, ClusterError> {
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Verb::Get, &kind, namespace, name)?;
        let value = state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(describe::<K>(namespace, name)))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn create<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Verb::Create, &kind, &namespace, &name)?;
        let key = (kind.clone(), namespace.clone(), name.clone());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists(describe::<K>(&namespace, &name)));
        }
        let mut value = serde_json::to_value(object)?;
        let version = state.bump_version();
        let meta = metadata_mut(&mut value);
        meta["uid"] = json!(uuid::Uuid::new_v4().to_string());
        meta["resourceVersion"] = json!(version);
        meta["generation"] = json!(1);
        state.objects.insert(key, value.clone());
        state.publish(&kind, false, &value);
        Ok(serde_json::from_value(value)?)
    }

    async fn update<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Verb::Update, &kind, &namespace, &name)?;
        let key = (kind.clone(), namespace.clone(), name.clone());
        let stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(describe::<K>(&namespace, &name)))?;
        let mut value = serde_json::to_value(object)?;
        Self::check_version(&stored, &value, describe::<K>(&namespace, &name))?;

        // status is only writable through the status subresource
        value["status"] = stored.get("status").cloned().unwrap_or(Value::Null);
        let generation = stored["metadata"]["generation"].as_i64().unwrap_or(1);
        let generation = if stored.get("spec") == value.get("spec") {
            generation
        } else {
            generation + 1
        };
        let version = state.bump_version();
        let meta = metadata_mut(&mut value);
        meta["uid"] = stored["metadata"]["uid"].clone();
        meta["resourceVersion"] = json!(version);
        meta["generation"] = json!(generation);
        state.objects.insert(key, value.clone());
        state.publish(&kind, false, &value);
        Ok(serde_json::from_value(value)?)
    }

    async fn update_status<K: ClusterObject>(&self, object: &K) -> Result<K, ClusterError> {
        let (namespace, name) = identity(object)?;
        let kind = K::kind(&()).to_string();
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, Verb::UpdateStatus, &kind, &namespace, &name)?;
        let key = (kind.clone(), namespace.clone(), name.clone());
        let mut stored = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(describe::<K>(&namespace, &name)))?;
        let incoming = serde_json::to_value(object)?;
        Self::check_version(&stored, &incoming, describe::<K>(&namespace, &name))?;

        stored["status"] = incoming.get("status").cloned().unwrap_or(Value::Null);
        let version = state.bump_version();
        metadata_mut(&mut stored)["resourceVersion"] = json!(version);
        state.objects.insert(key, stored.clone());
        state.publish(&kind, false, &stored);
        Ok(serde_json::from_value(stored)?)
    }

    fn watch<K: ClusterObject>(&self) -> BoxStream<'static, Result<WatchEvent<K>, ClusterError>> {
        let kind = K::kind(&()).to_string();
        let state = self.state.lock().unwrap();
        // subscribe before listing so no change between the two is lost
        let receiver = state.events.subscribe();
        let listing: Vec<Result<WatchEvent<K>, ClusterError>> =
            std::iter::once(Ok(WatchEvent::RelistStarted))
                .chain(
                    state
                        .objects
                        .iter()
                        .filter(|((k, _, _), _)| *k == kind)
                        .map(|(_, value)| decode(value.clone()).map(WatchEvent::Listed)),
                )
                .chain(std::iter::once(Ok(WatchEvent::RelistDone)))
                .collect();
        drop(state);

        let live = futures::stream::unfold(receiver, move |mut receiver| {
            let kind = kind.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) if event.kind == kind => {
                            let item = decode(event.object).map(|object| {
                                if event.deleted {
                                    WatchEvent::Deleted(object)
                                } else {
                                    WatchEvent::Applied(object)
                                }
                            });
                            return Some((item, receiver));
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        futures::stream::iter(listing).chain(live).boxed()
    }
}

fn decode<K: ClusterObject>(value: Value) -> Result<K, ClusterError> {
    Ok(serde_json::from_value(value)?)
}

fn metadata_mut(value: &mut Value) -> &mut Value {
    if !value["metadata"].is_object() {
        value["metadata"] = json!({});
    }
    &mut value["metadata"]
}
