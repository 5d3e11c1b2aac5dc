//! Cluster object-store client
//!
//! The narrow API the Submarine controller needs from the cluster: typed
//! `get`/`create`/`update`/`update_status` plus a long-lived `watch` per kind.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, KubeClusterClient};
//! use k8s_openapi::api::apps::v1::Deployment;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?, None);
//! let deployment: Deployment = client.get("default", "submarine-server").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **test-util**: in-memory [`MockClusterClient`] recording every call

pub mod client;
pub mod error;
pub mod event;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use error::ClusterError;
pub use event::WatchEvent;
pub use cluster_trait::{ClusterClient, ClusterObject};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{Call, MockClusterClient, MockFailure, Verb};
