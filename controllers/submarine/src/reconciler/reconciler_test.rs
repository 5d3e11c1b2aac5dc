//! Unit tests for the reconcile pass against an in-memory cluster

use super::*;
use crate::error::Severity;
use crate::events::message_resource_exists;
use crate::owner::OwnerResolvable;
use crate::test_utils::{TestHarness, create_test_submarine};
use cluster_client::{MockFailure, Verb};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

#[tokio::test]
async fn test_first_pass_creates_every_child() {
    let harness = TestHarness::new();
    let root = harness.add_root(create_test_submarine("ns", "x", 2)).await;

    harness.reconciler.reconcile("ns/x").await.unwrap();

    let cluster = &harness.cluster;
    for (kind, expected) in [
        ("ServiceAccount", 1),
        ("Deployment", 1),
        ("Service", 2),
        ("PersistentVolumeClaim", 1),
        ("Secret", 1),
        ("StatefulSet", 1),
        ("Ingress", 1),
        ("Role", 1),
        ("RoleBinding", 1),
        ("IngressRoute", 0),
    ] {
        assert_eq!(cluster.count(Verb::Create, kind), expected, "creates of {kind}");
    }
    assert_eq!(cluster.count(Verb::Update, "Deployment"), 0);
    assert_eq!(cluster.count(Verb::UpdateStatus, "Submarine"), 1);

    let deployment = cluster.object::<Deployment>("ns", SERVER_NAME).unwrap();
    assert_eq!(deployment.spec.unwrap().replicas, Some(2));
    assert!(deployment.metadata.name.is_some());
    let owner = cluster
        .object::<Service>("ns", SERVER_NAME)
        .unwrap()
        .controller_owner()
        .unwrap();
    assert!(owner.points_to(&root));

    let status = cluster.object::<Submarine>("ns", "x").unwrap().status.unwrap();
    assert_eq!(status.submarine_state.state, crds::SubmarinePhase::Creating);

    assert_eq!(harness.events.with_reason(reasons::SYNCED).len(), 1);
}

#[tokio::test]
async fn test_second_pass_without_changes_writes_nothing() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness.reconciler.reconcile("ns/x").await.unwrap();
    harness.refresh_root("ns", "x").await;
    harness.cluster.clear_calls();

    harness.reconciler.reconcile("ns/x").await.unwrap();

    assert_eq!(harness.cluster.mutations(), Vec::new());
}

#[tokio::test]
async fn test_replica_edit_updates_only_the_deployment() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 2)).await;
    harness.reconciler.reconcile("ns/x").await.unwrap();
    harness.refresh_root("ns", "x").await;

    let edited = harness
        .edit_root("ns", "x", |root| root.spec.server.replicas = 3)
        .await;
    // a spec edit moves the generation, which must not trigger a status write
    assert_eq!(edited.metadata.generation, Some(2));
    harness.cluster.clear_calls();
    harness.reconciler.reconcile("ns/x").await.unwrap();

    let mutations = harness.cluster.mutations();
    assert_eq!(mutations.len(), 1, "unexpected writes: {mutations:?}");
    assert_eq!(mutations[0].verb, Verb::Update);
    assert_eq!(mutations[0].kind, "Deployment");
    assert_eq!(mutations[0].name, SERVER_NAME);

    let deployment = harness.cluster.object::<Deployment>("ns", SERVER_NAME).unwrap();
    assert_eq!(deployment.spec.unwrap().replicas, Some(3));
}

#[tokio::test]
async fn test_external_drift_is_reverted() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness.reconciler.reconcile("ns/x").await.unwrap();
    harness.refresh_root("ns", "x").await;

    harness.cluster.modify::<StatefulSet>("ns", DATABASE_NAME, |set| {
        if let Some(pod) = set.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.containers[0].image = Some("mysql:latest".to_string());
        }
    });
    harness.cluster.clear_calls();
    harness.reconciler.reconcile("ns/x").await.unwrap();

    assert_eq!(harness.cluster.count(Verb::Update, "StatefulSet"), 1);
    let set = harness.cluster.object::<StatefulSet>("ns", DATABASE_NAME).unwrap();
    assert_eq!(
        set.spec.unwrap().template.spec.unwrap().containers[0].image.as_deref(),
        Some("apache/submarine:database-0.8.0")
    );
}

#[tokio::test]
async fn test_terminating_root_is_left_alone() {
    let harness = TestHarness::new();
    let mut root = create_test_submarine("ns", "x", 1);
    root.metadata.deletion_timestamp =
        Some(serde_json::from_value::<Time>(serde_json::json!("2024-01-01T00:00:00Z")).unwrap());
    harness.add_root(root).await;

    harness.reconciler.reconcile("ns/x").await.unwrap();

    assert_eq!(harness.cluster.mutations(), Vec::new());
}

#[tokio::test]
async fn test_missing_root_is_success() {
    let harness = TestHarness::new();
    harness.reconciler.reconcile("ns/gone").await.unwrap();
    assert!(harness.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_malformed_key_is_terminal() {
    let harness = TestHarness::new();
    let err = harness.reconciler.reconcile("no-namespace").await.unwrap_err();
    assert_eq!(err.severity(), Severity::Terminal);
}

#[tokio::test]
async fn test_invalid_storage_type_is_terminal_and_reported() {
    let harness = TestHarness::new();
    let mut root = create_test_submarine("ns", "x", 1);
    root.spec.storage.storage_type = "ceph".to_string();
    harness.add_root(root).await;

    let err = harness.reconciler.reconcile("ns/x").await.unwrap_err();

    assert!(matches!(err, ControllerError::InvalidSpec(_)));
    assert_eq!(err.severity(), Severity::Terminal);
    assert_eq!(harness.cluster.mutations(), Vec::new());
    assert_eq!(harness.events.with_reason(reasons::INVALID_SPEC).len(), 1);
}

#[tokio::test]
async fn test_foreign_child_is_never_touched() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness.cluster.insert(Service {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        },
        ..Default::default()
    });

    let err = harness.reconciler.reconcile("ns/x").await.unwrap_err();

    assert!(matches!(err, ControllerError::ResourceConflict { ref kind, .. } if kind == "Service"));
    assert_eq!(err.severity(), Severity::Transient);
    assert_eq!(harness.cluster.count(Verb::Update, "Service"), 0);
    // later children are not attempted
    assert_eq!(harness.cluster.count(Verb::Get, "StatefulSet"), 0);

    let events = harness.events.with_reason(reasons::ERR_RESOURCE_EXISTS);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].note, message_resource_exists(SERVER_NAME));
    assert_eq!(events[0].object, "x");
}

#[tokio::test]
async fn test_child_of_recreated_root_is_foreign() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness.reconciler.reconcile("ns/x").await.unwrap();

    // same name, new incarnation
    harness.cluster.remove::<Submarine>("ns", "x");
    let mut reborn = create_test_submarine("ns", "x", 1);
    reborn.metadata.uid = Some("uid-x-2".to_string());
    harness.add_root(reborn).await;

    let err = harness.reconciler.reconcile("ns/x").await.unwrap_err();
    assert!(matches!(err, ControllerError::ResourceConflict { .. }));
}

#[tokio::test]
async fn test_user_secret_is_not_managed() {
    let harness = TestHarness::new();
    let mut root = create_test_submarine("ns", "x", 1);
    root.spec.database.mysql_root_password_secret = Some("my-db".to_string());
    harness.add_root(root).await;

    harness.reconciler.reconcile("ns/x").await.unwrap();

    assert_eq!(harness.cluster.count(Verb::Get, "Secret"), 0);
    assert_eq!(harness.cluster.count(Verb::Create, "Secret"), 0);
}

#[tokio::test]
async fn test_enabled_auxiliaries_get_routes() {
    let harness = TestHarness::new();
    let mut root = create_test_submarine("ns", "x", 1);
    root.spec.mlflow.enabled = true;
    root.spec.minio.enabled = true;
    harness.add_root(root).await;

    harness.reconciler.reconcile("ns/x").await.unwrap();

    assert_eq!(harness.cluster.count(Verb::Create, "IngressRoute"), 2);
    assert_eq!(harness.cluster.count(Verb::Create, "Deployment"), 3);
    assert!(harness
        .cluster
        .object::<crds::IngressRoute>("ns", "submarine-minio-ingressroute")
        .is_some());
    assert!(harness
        .cluster
        .object::<Deployment>("ns", "submarine-tensorboard")
        .is_none());
}

#[tokio::test]
async fn test_transient_api_failure_stops_the_pass() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness
        .cluster
        .fail_next(Verb::Create, "StatefulSet", MockFailure::Unavailable);

    let err = harness.reconciler.reconcile("ns/x").await.unwrap_err();

    assert_eq!(err.severity(), Severity::Transient);
    assert_eq!(harness.cluster.count(Verb::UpdateStatus, "Submarine"), 0);
    assert!(harness.events.with_reason(reasons::SYNCED).is_empty());

    // the retry picks up where the pass stopped
    harness.reconciler.reconcile("ns/x").await.unwrap();
    assert_eq!(harness.cluster.count(Verb::Create, "Deployment"), 1);
    assert!(harness.cluster.object::<StatefulSet>("ns", DATABASE_NAME).is_some());
}

#[tokio::test]
async fn test_status_conflict_is_transient() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;
    harness
        .cluster
        .fail_next(Verb::UpdateStatus, "Submarine", MockFailure::Conflict);

    let err = harness.reconciler.reconcile("ns/x").await.unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ref e) if e.is_conflict()));
    assert_eq!(err.severity(), Severity::Transient);
}

#[tokio::test]
async fn test_status_write_leaves_cached_root_untouched() {
    let harness = TestHarness::new();
    harness.add_root(create_test_submarine("ns", "x", 1)).await;

    harness.reconciler.reconcile("ns/x").await.unwrap();

    let cached = harness.roots.get("ns", "x").await.unwrap();
    assert!(cached.status.is_none());
    assert!(harness.cluster.object::<Submarine>("ns", "x").unwrap().status.is_some());
}
