//! Desired child objects built from a Submarine.
//!
//! Each builder is a pure function of the root: same spec in, same object
//! out. Builders fill only the fields the comparators look at plus what the
//! API server needs to accept the object; namespace and owner are set by the
//! convergence engine.

pub mod auxiliary;
pub mod database;
pub mod ingress;
pub mod rbac;
pub mod server;

use crds::Submarine;
use k8s_openapi::api::core::v1::{
    LocalObjectReference, PersistentVolumeClaim, PersistentVolumeClaimSpec, Service, ServicePort,
    ServiceSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Storage class used when `storage.storageClassName` is unset
pub fn default_storage_class(storage_type: &str) -> &'static str {
    match storage_type {
        "host" => "local-path",
        _ => "nfs-client",
    }
}

/// `app=<name>` labels shared by a workload, its pods and its service
pub fn labels(app: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), app.to_string())])
}

/// Metadata for a child named `name`
pub fn metadata(root: &Submarine, name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: root.metadata.namespace.clone(),
        labels: Some(labels(name)),
        ..Default::default()
    }
}

/// Selector matching pods labelled `app=<app>`
pub fn selector(app: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(labels(app)),
        ..Default::default()
    }
}

/// Image pull secrets from `spec.common.image.pullSecrets`
pub fn pull_secrets(root: &Submarine) -> Option<Vec<LocalObjectReference>> {
    let secrets = &root.spec.common.as_ref()?.image.pull_secrets;
    if secrets.is_empty() {
        return None;
    }
    Some(
        secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect(),
    )
}

/// Claim of `size` on the root's storage class
pub fn persistent_volume_claim(root: &Submarine, name: &str, size: &str) -> PersistentVolumeClaim {
    let storage_class = root.spec.storage.storage_class_name.clone().unwrap_or_else(|| {
        default_storage_class(&root.spec.storage.storage_type).to_string()
    });
    PersistentVolumeClaim {
        metadata: metadata(root, name),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: Some(storage_class),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// ClusterIP service named `name` forwarding `port` to pods labelled `app=<app>`
pub fn service(root: &Submarine, name: &str, app: &str, port: i32) -> Service {
    Service {
        metadata: metadata(root, name),
        spec: Some(ServiceSpec {
            selector: Some(labels(app)),
            // protocol and targetPort spelled out, the API server would default them
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_submarine;

    #[test]
    fn test_storage_class_defaults_by_type() {
        let mut root = create_test_submarine("ns", "x", 1);
        let pvc = persistent_volume_claim(&root, "data", "2Gi");
        let spec = pvc.spec.unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("nfs-client"));
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"],
            Quantity("2Gi".to_string())
        );

        root.spec.storage.storage_type = "host".to_string();
        let pvc = persistent_volume_claim(&root, "data", "2Gi");
        assert_eq!(pvc.spec.unwrap().storage_class_name.as_deref(), Some("local-path"));

        root.spec.storage.storage_class_name = Some("fast".to_string());
        let pvc = persistent_volume_claim(&root, "data", "2Gi");
        assert_eq!(pvc.spec.unwrap().storage_class_name.as_deref(), Some("fast"));
    }

    #[test]
    fn test_pull_secrets_only_when_declared() {
        let mut root = create_test_submarine("ns", "x", 1);
        assert_eq!(pull_secrets(&root), None);

        root.spec.common = Some(crds::SubmarineCommon {
            image: crds::CommonImage {
                pull_secrets: vec!["regcred".to_string()],
            },
        });
        assert_eq!(
            pull_secrets(&root),
            Some(vec![LocalObjectReference {
                name: "regcred".to_string()
            }])
        );
    }
}
