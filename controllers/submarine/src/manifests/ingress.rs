//! Ingress routing `/` to the server.

use super::metadata;
use super::server::{SERVER_NAME, SERVER_PORT};
use crds::Submarine;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};

/// Ingress name
pub const INGRESS_NAME: &str = "submarine-server-ingress";

/// Server ingress
pub fn ingress(root: &Submarine) -> Ingress {
    Ingress {
        metadata: metadata(root, INGRESS_NAME),
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: SERVER_NAME.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(SERVER_PORT),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
