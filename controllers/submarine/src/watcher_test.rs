//! Unit tests for event routing and the watch registry

use super::*;
use crate::backoff::ExponentialBackoff;
use crate::owner::set_owner;
use crate::test_utils::create_test_submarine;
use cluster_client::{MockClusterClient, WatchEvent};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::time::Duration;

struct Fixture {
    queue: Arc<WorkQueue>,
    roots: Arc<TypedStore<Submarine>>,
    router: EventRouter,
}

async fn fixture(roots: &[Submarine]) -> Fixture {
    let queue = Arc::new(WorkQueue::new(ExponentialBackoff::new(
        Duration::from_millis(5),
        Duration::from_secs(1),
    )));
    let store = Arc::new(TypedStore::new());
    for root in roots {
        store.apply(WatchEvent::Applied(root.clone())).await;
    }
    Fixture {
        router: EventRouter::new(Arc::clone(&queue), Arc::clone(&store)),
        queue,
        roots: store,
    }
}

async fn drain(queue: &WorkQueue) -> Vec<String> {
    let mut keys = Vec::new();
    while !queue.is_empty() {
        if let Some(key) = queue.get().await {
            queue.done(&key);
            keys.push(key);
        }
    }
    keys
}

fn service(name: &str, version: &str, owner: Option<&Submarine>) -> Service {
    let mut service = Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("ns".to_string()),
            resource_version: Some(version.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    if let Some(owner) = owner {
        set_owner(&mut service, owner).unwrap();
    }
    service
}

#[tokio::test]
async fn test_root_add_enqueues_and_noop_update_does_not() {
    let root = create_test_submarine("ns", "a", 1);
    let f = fixture(&[]).await;

    f.router.on_root(&Notification::Added(Arc::new(root.clone())));
    assert_eq!(drain(&f.queue).await, vec!["ns/a"]);

    let same = Arc::new(root.clone());
    f.router.on_root(&Notification::Updated {
        old: Arc::clone(&same),
        new: same,
    });
    assert!(f.queue.is_empty());

    let mut edited = root.clone();
    edited.metadata.resource_version = Some("2".to_string());
    f.router.on_root(&Notification::Updated {
        old: Arc::new(root.clone()),
        new: Arc::new(edited),
    });
    assert_eq!(drain(&f.queue).await, vec!["ns/a"]);

    f.router
        .on_root(&Notification::Deleted(Tombstone::Known(Arc::new(root))));
    assert!(f.queue.is_empty());
}

#[tokio::test]
async fn test_child_event_enqueues_only_its_owner() {
    let a = create_test_submarine("ns", "a", 1);
    let b = create_test_submarine("ns", "b", 1);
    let f = fixture(&[a.clone(), b.clone()]).await;

    f.router
        .on_child(Notification::Added(Arc::new(service("svc-a", "1", Some(&a)))))
        .await;

    assert_eq!(drain(&f.queue).await, vec!["ns/a"]);
}

#[tokio::test]
async fn test_child_without_submarine_owner_is_dropped() {
    let a = create_test_submarine("ns", "a", 1);
    let f = fixture(&[a]).await;

    f.router
        .on_child(Notification::Added(Arc::new(service("plain", "1", None))))
        .await;

    let mut foreign = service("foreign", "1", None);
    foreign.metadata.owner_references = Some(vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: "a".to_string(),
        uid: "uid-a".to_string(),
        controller: Some(true),
        ..Default::default()
    }]);
    f.router.on_child(Notification::Added(Arc::new(foreign))).await;

    assert!(f.queue.is_empty());
}

#[tokio::test]
async fn test_orphan_and_stale_owner_are_dropped() {
    let live = create_test_submarine("ns", "a", 1);
    let f = fixture(&[live.clone()]).await;

    let gone = create_test_submarine("ns", "gone", 1);
    f.router
        .on_child(Notification::Added(Arc::new(service("orphan", "1", Some(&gone)))))
        .await;

    let mut previous = live.clone();
    previous.metadata.uid = Some("uid-a-old".to_string());
    f.router
        .on_child(Notification::Added(Arc::new(service("stale", "1", Some(&previous)))))
        .await;

    assert!(f.queue.is_empty());
    assert!(f.roots.get("ns", "gone").await.is_none());
}

#[tokio::test]
async fn test_child_update_without_version_change_is_dropped() {
    let a = create_test_submarine("ns", "a", 1);
    let f = fixture(&[a.clone()]).await;

    f.router
        .on_child(Notification::Updated {
            old: Arc::new(service("svc", "7", Some(&a))),
            new: Arc::new(service("svc", "7", Some(&a))),
        })
        .await;
    assert!(f.queue.is_empty());

    f.router
        .on_child(Notification::Updated {
            old: Arc::new(service("svc", "7", Some(&a))),
            new: Arc::new(service("svc", "8", Some(&a))),
        })
        .await;
    assert_eq!(drain(&f.queue).await, vec!["ns/a"]);
}

#[tokio::test]
async fn test_deleted_child_tombstone_is_unwrapped() {
    let a = create_test_submarine("ns", "a", 1);
    let f = fixture(&[a.clone()]).await;

    f.router
        .on_child(Notification::Deleted(Tombstone::FinalStateUnknown {
            key: "ns/svc".to_string(),
            last: Arc::new(service("svc", "3", Some(&a))),
        }))
        .await;

    assert_eq!(drain(&f.queue).await, vec!["ns/a"]);
}

#[tokio::test]
async fn test_registry_routes_cluster_changes() {
    let cluster = MockClusterClient::new();
    let f = fixture(&[]).await;
    let router = Arc::new(f.router);
    let registry =
        WatchRegistry::for_submarine(cluster.clone(), Arc::clone(&router), Arc::clone(&f.roots));
    assert_eq!(registry.kinds().first().copied(), Some("Submarine"));
    assert!(registry.kinds().contains(&"IngressRoute"));
    let mut registry = registry;
    registry.watch_children::<ConfigMap>();

    let root = cluster.insert(create_test_submarine("ns", "a", 1));
    tokio::time::timeout(Duration::from_secs(1), f.roots.wait_for_sync())
        .await
        .unwrap();
    let key = tokio::time::timeout(Duration::from_secs(1), f.queue.get())
        .await
        .unwrap();
    assert_eq!(key.as_deref(), Some("ns/a"));
    f.queue.done("ns/a");

    let mut owned = ConfigMap {
        metadata: ObjectMeta {
            name: Some("settings".to_string()),
            namespace: Some("ns".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    set_owner(&mut owned, &root).unwrap();
    cluster.insert(owned);
    let key = tokio::time::timeout(Duration::from_secs(1), f.queue.get())
        .await
        .unwrap();
    assert_eq!(key.as_deref(), Some("ns/a"));

    for (_, task) in registry.into_tasks() {
        task.abort();
    }
}
