//! Kubernetes Event recording.
//!
//! Warnings and progress are published as Events on the Submarine they are
//! about, visible via `kubectl describe submarine`. Publishing is
//! fire-and-forget: failures are logged and never fail a reconcile.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

/// Reporting component shown on every Event
pub const CONTROLLER_NAME: &str = "submarine-controller";

/// Well-known event reason strings.
pub mod reasons {
    /// Reconcile pass completed
    pub const SYNCED: &str = "Synced";
    /// A child name is taken by an object the controller does not own
    pub const ERR_RESOURCE_EXISTS: &str = "ErrResourceExists";
    /// Spec holds a value the controller cannot act on
    pub const INVALID_SPEC: &str = "InvalidSpec";
}

/// Message for a successful pass
pub const MESSAGE_SYNCED: &str = "Submarine synced successfully";

/// Message for an ownership conflict on `name`
pub fn message_resource_exists(name: &str) -> String {
    format!("Resource \"{name}\" already exists and is not managed by Submarine")
}

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event about `resource_ref`
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// Create a publisher reporting as [`CONTROLLER_NAME`]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// One Event captured by [`RecordingEventPublisher`]
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    /// Name of the object the event is about
    pub object: String,
    /// Normal or Warning
    pub type_: EventType,
    /// Reason string
    pub reason: String,
    /// Human-readable message
    pub note: String,
}

/// Publisher that keeps events in memory for assertions
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct RecordingEventPublisher {
    events: std::sync::Arc<std::sync::Mutex<Vec<RecordedEvent>>>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    /// Every event published so far
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events published with `reason`
    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events().into_iter().filter(|e| e.reason == reason).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        note: String,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone().unwrap_or_default(),
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}
