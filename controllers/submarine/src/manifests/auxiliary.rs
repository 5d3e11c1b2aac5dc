//! Optional services exposed behind a Traefik path prefix.
//!
//! Tensorboard, MLflow and Minio share one shape (claim, deployment,
//! service, route) and differ only in the fields of [`Auxiliary`].

use super::{labels, metadata, pull_secrets, selector};
use crds::{AuxiliarySpec, IngressRoute, IngressRouteSpec, Route, RouteService, Submarine};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimVolumeSource,
    PodSpec, PodTemplateSpec, Service, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// One optional service
#[derive(Debug, Clone, Copy)]
pub struct Auxiliary {
    /// Base name; children are `<name>`, `<name>-pvc`, `<name>-service`, `<name>-ingressroute`
    pub name: &'static str,
    /// Container and service port
    pub port: i32,
    /// Path prefix routed to the service
    pub path_prefix: &'static str,
    /// Where the claim is mounted
    pub mount_path: &'static str,
    image: fn(&Submarine) -> String,
    args: &'static [&'static str],
    env: &'static [(&'static str, &'static str)],
    settings: fn(&Submarine) -> &AuxiliarySpec,
}

/// Tensorboard
pub const TENSORBOARD: Auxiliary = Auxiliary {
    name: "submarine-tensorboard",
    port: 6006,
    path_prefix: "/tensorboard",
    mount_path: "/logs",
    image: |_| "tensorflow/tensorflow:1.11.0".to_string(),
    args: &["tensorboard", "--logdir=/logs", "--path_prefix=/tensorboard"],
    env: &[],
    settings: |root| &root.spec.tensorboard,
};

/// MLflow tracking server
pub const MLFLOW: Auxiliary = Auxiliary {
    name: "submarine-mlflow",
    port: 5000,
    path_prefix: "/mlflow",
    mount_path: "/logs",
    image: |root| format!("apache/submarine:mlflow-{}", root.spec.version),
    args: &[],
    env: &[],
    settings: |root| &root.spec.mlflow,
};

/// Minio object storage
pub const MINIO: Auxiliary = Auxiliary {
    name: "submarine-minio",
    port: 9000,
    path_prefix: "/minio",
    mount_path: "/data",
    image: |_| "minio/minio:RELEASE.2021-02-14T04-01-33Z".to_string(),
    args: &["server", "/data"],
    env: &[("MINIO_ACCESS_KEY", "submarine_minio"), ("MINIO_SECRET_KEY", "submarine_minio")],
    settings: |root| &root.spec.minio,
};

/// Every optional service, in reconcile order
pub const ALL: [Auxiliary; 3] = [TENSORBOARD, MLFLOW, MINIO];

impl Auxiliary {
    /// Whether the root asks for this service
    pub fn enabled(&self, root: &Submarine) -> bool {
        (self.settings)(root).enabled
    }

    /// Claim name
    pub fn pvc_name(&self) -> String {
        format!("{}-pvc", self.name)
    }

    /// Service name
    pub fn service_name(&self) -> String {
        format!("{}-service", self.name)
    }

    /// IngressRoute name
    pub fn ingress_route_name(&self) -> String {
        format!("{}-ingressroute", self.name)
    }

    /// Volume claim
    pub fn persistent_volume_claim(&self, root: &Submarine) -> PersistentVolumeClaim {
        super::persistent_volume_claim(root, &self.pvc_name(), &(self.settings)(root).storage_size)
    }

    /// Single-replica deployment mounting the claim
    pub fn deployment(&self, root: &Submarine) -> Deployment {
        let env: Vec<EnvVar> = self
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: (*name).to_string(),
                value: Some((*value).to_string()),
                ..Default::default()
            })
            .collect();
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();

        Deployment {
            metadata: metadata(root, self.name),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: selector(self.name),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels(self.name)),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        image_pull_secrets: pull_secrets(root),
                        containers: vec![Container {
                            name: self.name.to_string(),
                            image: Some((self.image)(root)),
                            image_pull_policy: Some("IfNotPresent".to_string()),
                            args: (!args.is_empty()).then_some(args),
                            env: (!env.is_empty()).then_some(env),
                            ports: Some(vec![ContainerPort {
                                container_port: self.port,
                                ..Default::default()
                            }]),
                            volume_mounts: Some(vec![VolumeMount {
                                name: "volume".to_string(),
                                mount_path: self.mount_path.to_string(),
                                ..Default::default()
                            }]),
                            ..Default::default()
                        }],
                        volumes: Some(vec![Volume {
                            name: "volume".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: self.pvc_name(),
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

    /// ClusterIP service in front of the deployment
    pub fn service(&self, root: &Submarine) -> Service {
        super::service(root, &self.service_name(), self.name, self.port)
    }

    /// Traefik route sending `path_prefix` to the service
    pub fn ingress_route(&self, root: &Submarine) -> IngressRoute {
        IngressRoute {
            metadata: metadata(root, &self.ingress_route_name()),
            spec: IngressRouteSpec {
                entry_points: vec!["web".to_string()],
                routes: vec![Route {
                    kind: "Rule".to_string(),
                    match_: format!("PathPrefix(`{}`)", self.path_prefix),
                    services: vec![RouteService {
                        name: self.service_name(),
                        port: self.port,
                    }],
                }],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_submarine;

    #[test]
    fn test_names_follow_convention() {
        assert_eq!(MLFLOW.pvc_name(), "submarine-mlflow-pvc");
        assert_eq!(MLFLOW.service_name(), "submarine-mlflow-service");
        assert_eq!(MLFLOW.ingress_route_name(), "submarine-mlflow-ingressroute");
    }

    #[test]
    fn test_enabled_reads_matching_settings() {
        let mut root = create_test_submarine("ns", "x", 1);
        root.spec.minio.enabled = true;
        assert!(MINIO.enabled(&root));
        assert!(!TENSORBOARD.enabled(&root));
    }

    #[test]
    fn test_route_points_at_service() {
        let root = create_test_submarine("ns", "x", 1);
        let route = TENSORBOARD.ingress_route(&root);
        assert_eq!(route.spec.routes[0].match_, "PathPrefix(`/tensorboard`)");
        assert_eq!(route.spec.routes[0].services[0].name, "submarine-tensorboard-service");
        assert_eq!(route.spec.routes[0].services[0].port, 6006);
    }

    #[test]
    fn test_mlflow_image_tracks_version() {
        let root = create_test_submarine("ns", "x", 1);
        let deployment = MLFLOW.deployment(&root);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some("apache/submarine:mlflow-0.8.0"));
        assert!(pod.containers[0].args.is_none());
    }
}
