//! Role and binding granting the server access to the workloads it launches.

use super::metadata;
use super::server::SERVER_NAME;
use crds::Submarine;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};

fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| items.iter().map(ToString::to_string).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(owned(api_groups)),
        resources: Some(owned(resources)),
        verbs: owned(verbs),
        ..Default::default()
    }
}

/// Role for the server service account
pub fn role(root: &Submarine) -> Role {
    const ALL: &[&str] = &["*"];
    Role {
        metadata: metadata(root, SERVER_NAME),
        rules: Some(vec![
            rule(
                &["kubeflow.org"],
                &[
                    "tfjobs",
                    "tfjobs/status",
                    "pytorchjobs",
                    "pytorchjobs/status",
                    "notebooks",
                    "notebooks/status",
                ],
                ALL,
            ),
            rule(&["traefik.containo.us"], &["ingressroutes"], ALL),
            rule(
                &[""],
                &[
                    "pods",
                    "pods/log",
                    "services",
                    "persistentvolumeclaims",
                    "events",
                    "configmaps",
                ],
                ALL,
            ),
            rule(&["apps"], &["deployments", "deployments/status"], ALL),
        ]),
    }
}

/// Binds [`role`] to the server service account
pub fn role_binding(root: &Submarine) -> RoleBinding {
    RoleBinding {
        metadata: metadata(root, SERVER_NAME),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: SERVER_NAME.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: SERVER_NAME.to_string(),
            namespace: root.metadata.namespace.clone(),
            ..Default::default()
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_submarine;

    #[test]
    fn test_binding_targets_server_account_in_root_namespace() {
        let root = create_test_submarine("team-a", "x", 1);
        let binding = role_binding(&root);
        assert_eq!(binding.role_ref.name, role(&root).metadata.name.unwrap());
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.name, SERVER_NAME);
        assert_eq!(subject.namespace.as_deref(), Some("team-a"));
    }
}
