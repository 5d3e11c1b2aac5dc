//! Submarine CRD
//!
//! The desired-state root reconciled by the Submarine controller. One
//! `Submarine` declares a server, a database and the optional auxiliary
//! services (tensorboard, mlflow, minio) that make up an installation.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Storage types accepted in `spec.storage.storageType`.
pub const ACCEPTED_STORAGE_TYPES: [&str; 2] = ["nfs", "host"];

/// SubmarineSpec defines the desired state of a Submarine installation
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "submarine.apache.org",
    version = "v1alpha1",
    kind = "Submarine",
    namespaced,
    status = "SubmarineStatus",
    shortname = "sub",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.submarineState.state"}"#,
    printcolumn = r#"{"name":"Server","type":"integer","jsonPath":".status.availableServerReplicas"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSpec {
    /// Release used for the default image tags (e.g. "0.8.0")
    pub version: String,

    /// Submarine server settings
    #[serde(default)]
    pub server: SubmarineServerSpec,

    /// Database settings
    #[serde(default)]
    pub database: SubmarineDatabaseSpec,

    /// Tensorboard settings
    #[serde(default)]
    pub tensorboard: AuxiliarySpec,

    /// MLflow settings
    #[serde(default)]
    pub mlflow: AuxiliarySpec,

    /// Minio settings
    #[serde(default)]
    pub minio: AuxiliarySpec,

    /// Backing storage for every persistent volume claim
    pub storage: SubmarineStorage,

    /// Settings shared by every workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common: Option<SubmarineCommon>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineServerSpec {
    /// Full image reference, overrides `apache/submarine:server-<version>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of server replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,
}

impl Default for SubmarineServerSpec {
    fn default() -> Self {
        Self {
            image: None,
            replicas: default_replicas(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineDatabaseSpec {
    /// Full image reference, overrides `apache/submarine:database-<version>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of database replicas
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Requested size of the database volume
    #[serde(default = "default_storage_size")]
    pub storage_size: String,

    /// Name of a user-managed secret holding `MYSQL_ROOT_PASSWORD`.
    /// When unset the controller creates `submarine-database-secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_root_password_secret: Option<String>,
}

impl Default for SubmarineDatabaseSpec {
    fn default() -> Self {
        Self {
            image: None,
            replicas: default_replicas(),
            storage_size: default_storage_size(),
            mysql_root_password_secret: None,
        }
    }
}

/// Settings for an optional service exposed behind a path prefix
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuxiliarySpec {
    /// Whether the service is deployed
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requested size of the service volume
    #[serde(default = "default_storage_size")]
    pub storage_size: String,
}

impl Default for AuxiliarySpec {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            storage_size: default_storage_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineStorage {
    /// Storage backend, one of `nfs` or `host`
    pub storage_type: String,

    /// Storage class for the claims, defaults by storage type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineCommon {
    /// Image settings shared by every workload
    #[serde(default)]
    pub image: CommonImage,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommonImage {
    /// Image pull secrets attached to every workload
    #[serde(default)]
    pub pull_secrets: Vec<String>,
}

/// Observed state of a Submarine installation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineStatus {
    /// Available replicas of the server deployment
    #[serde(default)]
    pub available_server_replicas: i32,

    /// Available replicas of the database statefulset
    #[serde(default)]
    pub available_database_replicas: i32,

    /// Aggregated installation state
    #[serde(default)]
    pub submarine_state: SubmarineState,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineState {
    /// Current phase
    pub state: SubmarinePhase,

    /// When `state` last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

/// Installation phase
///
/// Serializes as PascalCase ("Creating", "Running") but also accepts the
/// upper-case spelling used by earlier releases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum SubmarinePhase {
    /// Children are being created or are not yet available
    #[default]
    #[serde(alias = "CREATING")]
    Creating,

    /// Server and database report every desired replica available
    #[serde(alias = "RUNNING")]
    Running,
}

fn default_replicas() -> i32 {
    1
}

fn default_storage_size() -> String {
    "1Gi".to_string()
}

fn default_enabled() -> bool {
    true
}
