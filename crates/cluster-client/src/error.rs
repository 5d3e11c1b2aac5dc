//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Create raced with another writer or a stale cache
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Optimistic concurrency failure (stale resourceVersion)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server rejected the request (throttling, server errors, ...)
    #[error("API error {code}: {message}")]
    Api {
        /// HTTP status code returned by the API server
        code: u16,
        /// Server-provided message
        message: String,
    },

    /// Transport or client-side error
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Object is missing metadata the call needs (name, namespace)
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Watch stream failure
    #[error("Watch error: {0}")]
    Watch(String),
}

impl ClusterError {
    /// Whether the object was missing
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether an update lost an optimistic concurrency race
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Whether a create found the name already taken
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Classifies a kube error for the object described by `what`.
    pub(crate) fn from_kube(err: kube::Error, what: String) -> Self {
        match &err {
            kube::Error::Api(response) if response.code == 404 => Self::NotFound(what),
            kube::Error::Api(response)
                if response.code == 409 && response.reason == "AlreadyExists" =>
            {
                Self::AlreadyExists(what)
            }
            kube::Error::Api(response) if response.code == 409 => Self::Conflict(what),
            kube::Error::Api(response) => Self::Api {
                code: response.code,
                message: response.message.clone(),
            },
            _ => Self::Kube(err),
        }
    }
}
