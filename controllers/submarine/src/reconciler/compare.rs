//! Per-kind semantic comparators.
//!
//! Only the fields the controller manages take part. The API server fills
//! defaults and status on everything it stores, so whole-object equality
//! would report a difference on every pass.

use crds::IngressRoute;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{
    LocalObjectReference, PersistentVolumeClaim, PodTemplateSpec, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};

/// Equality restricted to controller-managed fields
pub trait SemanticEq {
    /// Whether `self` (live) already matches `desired`
    fn semantic_eq(&self, desired: &Self) -> bool;
}

fn pull_secrets(template: &PodTemplateSpec) -> &[LocalObjectReference] {
    template
        .spec
        .as_ref()
        .and_then(|pod| pod.image_pull_secrets.as_deref())
        .unwrap_or_default()
}

/// replicas, first container image and env, pull secrets
fn workload_eq(
    current: (Option<i32>, &PodTemplateSpec),
    desired: (Option<i32>, &PodTemplateSpec),
) -> bool {
    let containers = |template: &PodTemplateSpec| {
        template
            .spec
            .as_ref()
            .map(|pod| pod.containers.clone())
            .unwrap_or_default()
    };
    let (current_containers, desired_containers) = (containers(current.1), containers(desired.1));
    if current_containers.len() != desired_containers.len() {
        return false;
    }
    let first_matches = match (current_containers.first(), desired_containers.first()) {
        (Some(c), Some(d)) => {
            c.image == d.image
                && c.env.as_deref().unwrap_or_default() == d.env.as_deref().unwrap_or_default()
        }
        (None, None) => true,
        _ => false,
    };

    current.0.unwrap_or(1) == desired.0.unwrap_or(1)
        && first_matches
        && pull_secrets(current.1) == pull_secrets(desired.1)
}

impl SemanticEq for Deployment {
    fn semantic_eq(&self, desired: &Self) -> bool {
        match (&self.spec, &desired.spec) {
            (Some(c), Some(d)) => workload_eq((c.replicas, &c.template), (d.replicas, &d.template)),
            (None, None) => true,
            _ => false,
        }
    }
}

impl SemanticEq for StatefulSet {
    fn semantic_eq(&self, desired: &Self) -> bool {
        match (&self.spec, &desired.spec) {
            (Some(c), Some(d)) => workload_eq((c.replicas, &c.template), (d.replicas, &d.template)),
            (None, None) => true,
            _ => false,
        }
    }
}

impl SemanticEq for Service {
    fn semantic_eq(&self, desired: &Self) -> bool {
        let (current, desired) = (self.spec.as_ref(), desired.spec.as_ref());
        current.map(|s| &s.selector) == desired.map(|s| &s.selector)
            && current.map(|s| &s.ports) == desired.map(|s| &s.ports)
    }
}

impl SemanticEq for Secret {
    fn semantic_eq(&self, desired: &Self) -> bool {
        self.data == desired.data
    }
}

impl SemanticEq for Role {
    fn semantic_eq(&self, desired: &Self) -> bool {
        self.rules == desired.rules
    }
}

impl SemanticEq for RoleBinding {
    fn semantic_eq(&self, desired: &Self) -> bool {
        self.role_ref == desired.role_ref && self.subjects == desired.subjects
    }
}

impl SemanticEq for Ingress {
    fn semantic_eq(&self, desired: &Self) -> bool {
        self.spec.as_ref().map(|s| &s.rules) == desired.spec.as_ref().map(|s| &s.rules)
    }
}

impl SemanticEq for IngressRoute {
    fn semantic_eq(&self, desired: &Self) -> bool {
        self.spec == desired.spec
    }
}

// PVC specs are immutable once bound; both kinds are create-only.
impl SemanticEq for PersistentVolumeClaim {
    fn semantic_eq(&self, _desired: &Self) -> bool {
        true
    }
}

impl SemanticEq for ServiceAccount {
    fn semantic_eq(&self, _desired: &Self) -> bool {
        true
    }
}
