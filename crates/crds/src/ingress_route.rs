//! Traefik IngressRoute CRD
//!
//! Only the subset of `traefik.containo.us/v1alpha1` IngressRoute that the
//! controller writes. Routes expose the auxiliary services under a path prefix.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRoute",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    /// Traefik entry points serving the routes (e.g. "web")
    #[serde(default)]
    pub entry_points: Vec<String>,

    /// Routing rules
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Rule kind, always "Rule"
    pub kind: String,

    /// Traefik matcher expression, e.g. ``PathPrefix(`/mlflow`)``
    #[serde(rename = "match")]
    pub match_: String,

    /// Backends for the rule
    #[serde(default)]
    pub services: Vec<RouteService>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteService {
    /// Kubernetes service name
    pub name: String,

    /// Service port
    pub port: i32,
}
