//! Controller-specific error types.
//!
//! Every error a reconcile pass returns carries a [`Severity`] so that the
//! worker can decide between forgetting the key and scheduling a retry
//! without knowing which branch produced it.

use cluster_client::ClusterError;
use thiserror::Error;

/// Retry policy attached to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Retry with per-key exponential back-off
    Transient,
    /// Do not retry; only a new watch event re-triggers the key
    Terminal,
}

impl Severity {
    /// Label used for the `result` dimension of the reconcile counter
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Terminal => "terminal",
        }
    }
}

/// Errors that can occur in the Submarine Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster API error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client construction error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Spec holds a value the controller can never act on
    #[error("Invalid spec: {0}")]
    InvalidSpec(String),

    /// A child with the expected name exists but is owned by something else
    #[error("Resource {kind} {name} already exists and is not managed by Submarine")]
    ResourceConflict {
        /// Kind of the conflicting object
        kind: String,
        /// Name of the conflicting object
        name: String,
    },

    /// Queue key is not `namespace/name`
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Reconcile panicked
    #[error("Reconcile panicked: {0}")]
    Panicked(String),

    /// Probe server could not bind or serve
    #[error("Probe server error: {0}")]
    Io(#[from] std::io::Error),

    /// Metric registration failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControllerError {
    /// Retry policy for this error.
    ///
    /// Ownership conflicts stay transient: the conflicting object may be
    /// removed later and the key must pick that up.
    pub fn severity(&self) -> Severity {
        match self {
            Self::InvalidSpec(_) | Self::InvalidKey(_) | Self::InvalidConfig(_) => {
                Severity::Terminal
            }
            Self::Cluster(_)
            | Self::Kube(_)
            | Self::ResourceConflict { .. }
            | Self::Watch(_)
            | Self::Panicked(_)
            | Self::Io(_)
            | Self::Metrics(_) => Severity::Transient,
        }
    }
}
