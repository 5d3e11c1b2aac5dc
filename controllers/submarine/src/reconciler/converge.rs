//! Generic create-or-update of one child.

use super::Reconciler;
use super::compare::SemanticEq;
use crate::error::ControllerError;
use crate::events::{message_resource_exists, reasons};
use crate::owner::{owner_of, set_owner};
use cluster_client::{ClusterClient, ClusterObject};
use crds::Submarine;
use kube::Resource;
use kube::runtime::events::EventType;
use tracing::{debug, info, warn};

impl<C: ClusterClient> Reconciler<C> {
    /// Drives the child `name` of kind `K` toward `build(root)`.
    ///
    /// Missing children are created with `root` as controller owner. Present
    /// children are updated only when the kind's comparator reports a
    /// difference, reusing the live metadata so the write is guarded by the
    /// live `resourceVersion`. A child owned by anything else is never
    /// touched. Returns the live object after the step.
    pub async fn converge<K, B>(
        &self,
        root: &Submarine,
        name: &str,
        build: B,
    ) -> Result<K, ControllerError>
    where
        K: ClusterObject + SemanticEq,
        B: Fn(&Submarine) -> K + Send + Sync,
    {
        let kind = K::kind(&());
        let namespace = root.meta().namespace.clone().ok_or_else(|| {
            ControllerError::InvalidSpec("Submarine without namespace".to_string())
        })?;

        let current = match self.client.get::<K>(&namespace, name).await {
            Ok(current) => current,
            Err(e) if e.is_not_found() => {
                let mut desired = build(root);
                desired.meta_mut().name = Some(name.to_string());
                desired.meta_mut().namespace = Some(namespace.clone());
                set_owner(&mut desired, root)?;
                info!(%kind, namespace, name, "Creating child");
                return Ok(self.client.create(&desired).await?);
            }
            Err(e) => return Err(e.into()),
        };

        if !owner_of(&current).is_some_and(|link| link.points_to(root)) {
            warn!(%kind, namespace, name, "Child exists but is not controlled by this Submarine");
            self.events
                .publish(
                    &root.object_ref(&()),
                    EventType::Warning,
                    reasons::ERR_RESOURCE_EXISTS,
                    message_resource_exists(name),
                )
                .await;
            return Err(ControllerError::ResourceConflict {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }

        let mut desired = build(root);
        if current.semantic_eq(&desired) {
            debug!(%kind, namespace, name, "Child up to date");
            return Ok(current);
        }

        *desired.meta_mut() = current.meta().clone();
        info!(%kind, namespace, name, "Updating child");
        Ok(self.client.update(&desired).await?)
    }
}
