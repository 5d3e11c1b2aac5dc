//! Submarine server: service account, deployment and service.

use super::{labels, metadata, pull_secrets, selector};
use crds::Submarine;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServiceAccount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Name shared by the server service account, deployment and service
pub const SERVER_NAME: &str = "submarine-server";

/// Port the server listens on
pub const SERVER_PORT: i32 = 8080;

/// Server image: `spec.server.image` or `apache/submarine:server-<version>`
pub fn server_image(root: &Submarine) -> String {
    root.spec
        .server
        .image
        .clone()
        .unwrap_or_else(|| format!("apache/submarine:server-{}", root.spec.version))
}

/// Service account the server pods run under
pub fn service_account(root: &Submarine) -> ServiceAccount {
    ServiceAccount {
        metadata: metadata(root, SERVER_NAME),
        ..Default::default()
    }
}

/// Server deployment
pub fn deployment(root: &Submarine) -> Deployment {
    let env = vec![
        EnvVar {
            name: "SUBMARINE_SERVER_PORT".to_string(),
            value: Some(SERVER_PORT.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "SUBMARINE_UID".to_string(),
            value: root.metadata.uid.clone(),
            ..Default::default()
        },
    ];

    Deployment {
        metadata: metadata(root, SERVER_NAME),
        spec: Some(DeploymentSpec {
            replicas: Some(root.spec.server.replicas),
            selector: selector(SERVER_NAME),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(SERVER_NAME)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVER_NAME.to_string()),
                    image_pull_secrets: pull_secrets(root),
                    containers: vec![Container {
                        name: SERVER_NAME.to_string(),
                        image: Some(server_image(root)),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(env),
                        ports: Some(vec![ContainerPort {
                            container_port: SERVER_PORT,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Server service
pub fn service(root: &Submarine) -> Service {
    super::service(root, SERVER_NAME, SERVER_NAME, SERVER_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_submarine;

    #[test]
    fn test_deployment_from_spec() {
        let root = create_test_submarine("ns", "x", 2);
        let deployment = deployment(&root);

        let spec = deployment.spec.unwrap();
        assert_eq!(spec.replicas, Some(2));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some(SERVER_NAME));
        let container = &pod.containers[0];
        assert_eq!(container.image.as_deref(), Some("apache/submarine:server-0.8.0"));
        assert!(container.env.as_ref().unwrap().contains(&EnvVar {
            name: "SUBMARINE_UID".to_string(),
            value: root.metadata.uid.clone(),
            ..Default::default()
        }));
    }

    #[test]
    fn test_image_override() {
        let mut root = create_test_submarine("ns", "x", 1);
        root.spec.server.image = Some("harbor.local/submarine/server:dev".to_string());
        assert_eq!(server_image(&root), "harbor.local/submarine/server:dev");
    }
}
