//! Submarine database: volume claim, root password secret, statefulset and service.

use super::{labels, metadata, pull_secrets, selector};
use crds::Submarine;
use k8s_openapi::ByteString;
use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, PersistentVolumeClaim,
    PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Secret, SecretKeySelector, Service,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Name shared by the database statefulset and service
pub const DATABASE_NAME: &str = "submarine-database";

/// Database volume claim
pub const DATABASE_PVC_NAME: &str = "submarine-database-pvc";

/// Secret created when the spec references no user secret
pub const DATABASE_SECRET_NAME: &str = "submarine-database-secret";

/// Key holding the MySQL root password
pub const ROOT_PASSWORD_KEY: &str = "MYSQL_ROOT_PASSWORD";

/// Port the database listens on
pub const DATABASE_PORT: i32 = 3306;

const DEFAULT_ROOT_PASSWORD: &str = "password";

/// Database image: `spec.database.image` or `apache/submarine:database-<version>`
pub fn database_image(root: &Submarine) -> String {
    root.spec
        .database
        .image
        .clone()
        .unwrap_or_else(|| format!("apache/submarine:database-{}", root.spec.version))
}

/// Whether the controller owns the password secret for this root
pub fn manages_secret(root: &Submarine) -> bool {
    root.spec.database.mysql_root_password_secret.is_none()
}

/// Secret the statefulset reads the root password from
pub fn password_secret_name(root: &Submarine) -> &str {
    root.spec
        .database
        .mysql_root_password_secret
        .as_deref()
        .unwrap_or(DATABASE_SECRET_NAME)
}

/// Database volume claim
pub fn persistent_volume_claim(root: &Submarine) -> PersistentVolumeClaim {
    super::persistent_volume_claim(root, DATABASE_PVC_NAME, &root.spec.database.storage_size)
}

/// Default root password secret
pub fn secret(root: &Submarine) -> Secret {
    Secret {
        metadata: metadata(root, DATABASE_SECRET_NAME),
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([(
            ROOT_PASSWORD_KEY.to_string(),
            ByteString(DEFAULT_ROOT_PASSWORD.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// Database statefulset
pub fn stateful_set(root: &Submarine) -> StatefulSet {
    let password = EnvVar {
        name: ROOT_PASSWORD_KEY.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: password_secret_name(root).to_string(),
                key: ROOT_PASSWORD_KEY.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    };

    StatefulSet {
        metadata: metadata(root, DATABASE_NAME),
        spec: Some(StatefulSetSpec {
            replicas: Some(root.spec.database.replicas),
            service_name: Some(DATABASE_NAME.to_string()),
            selector: selector(DATABASE_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(DATABASE_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    image_pull_secrets: pull_secrets(root),
                    containers: vec![Container {
                        name: DATABASE_NAME.to_string(),
                        image: Some(database_image(root)),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(vec![password]),
                        ports: Some(vec![ContainerPort {
                            container_port: DATABASE_PORT,
                            ..Default::default()
                        }]),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "volume".to_string(),
                            mount_path: "/var/lib/mysql".to_string(),
                            sub_path: Some("mysql".to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "volume".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: DATABASE_PVC_NAME.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Database service
pub fn service(root: &Submarine) -> Service {
    super::service(root, DATABASE_NAME, DATABASE_NAME, DATABASE_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_submarine;

    fn secret_ref(root: &Submarine) -> String {
        let set = stateful_set(root);
        let env = set.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();
        env[0]
            .value_from
            .clone()
            .unwrap()
            .secret_key_ref
            .unwrap()
            .name
    }

    #[test]
    fn test_password_from_managed_secret_by_default() {
        let root = create_test_submarine("ns", "x", 1);
        assert!(manages_secret(&root));
        assert_eq!(secret_ref(&root), DATABASE_SECRET_NAME);
        assert_eq!(
            secret(&root).data.unwrap()[ROOT_PASSWORD_KEY],
            ByteString(b"password".to_vec())
        );
    }

    #[test]
    fn test_password_from_user_secret() {
        let mut root = create_test_submarine("ns", "x", 1);
        root.spec.database.mysql_root_password_secret = Some("my-db".to_string());
        assert!(!manages_secret(&root));
        assert_eq!(secret_ref(&root), "my-db");
    }

    #[test]
    fn test_statefulset_image_and_claim() {
        let root = create_test_submarine("ns", "x", 1);
        let pod = stateful_set(&root).spec.unwrap().template.spec.unwrap();
        assert_eq!(
            pod.containers[0].image.as_deref(),
            Some("apache/submarine:database-0.8.0")
        );
        let claim = pod.volumes.unwrap()[0].persistent_volume_claim.clone().unwrap();
        assert_eq!(claim.claim_name, DATABASE_PVC_NAME);
    }

    #[test]
    fn test_claim_sized_from_database_spec() {
        let mut root = create_test_submarine("ns", "x", 1);
        root.spec.database.storage_size = "5Gi".to_string();

        let claim = persistent_volume_claim(&root);
        assert_eq!(claim.metadata.name.as_deref(), Some(DATABASE_PVC_NAME));
        let spec = claim.spec.unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("nfs-client"));
        assert_eq!(
            spec.resources.unwrap().requests.unwrap()["storage"],
            k8s_openapi::apimachinery::pkg::api::resource::Quantity("5Gi".to_string())
        );
    }
}
