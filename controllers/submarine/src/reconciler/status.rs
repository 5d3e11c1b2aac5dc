//! Status reporter: observed replica counts written back onto the Submarine.

use super::Reconciler;
use crate::error::ControllerError;
use chrono::{DateTime, Utc};
use cluster_client::ClusterClient;
use crds::{Submarine, SubmarinePhase, SubmarineState, SubmarineStatus};
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use tracing::{debug, info};

/// Status for `root` given the live server and database workloads.
///
/// `lastTransitionTime` moves only when the phase changes, so an unchanged
/// cluster yields an identical status and no write.
pub fn observed_status(
    root: &Submarine,
    server: &Deployment,
    database: &StatefulSet,
    now: DateTime<Utc>,
) -> SubmarineStatus {
    let available_server_replicas = server
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    let available_database_replicas = database
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);

    let state = if available_server_replicas >= root.spec.server.replicas
        && available_database_replicas >= root.spec.database.replicas
    {
        SubmarinePhase::Running
    } else {
        SubmarinePhase::Creating
    };

    let previous = root.status.as_ref().map(|s| &s.submarine_state);
    let last_transition_time = match previous {
        Some(previous) if previous.state == state => previous.last_transition_time,
        _ => Some(now),
    };

    SubmarineStatus {
        available_server_replicas,
        available_database_replicas,
        submarine_state: SubmarineState {
            state,
            last_transition_time,
        },
    }
}

impl<C: ClusterClient> Reconciler<C> {
    /// Writes the observed status onto a copy of `root` when it changed.
    ///
    /// The cached root is shared and never modified. A conflict means the
    /// cache was stale; it surfaces as a transient error and the next pass
    /// sees the fresh root.
    pub async fn report_status(
        &self,
        root: &Submarine,
        server: &Deployment,
        database: &StatefulSet,
    ) -> Result<(), ControllerError> {
        let status = observed_status(root, server, database, Utc::now());
        if root.status.as_ref() == Some(&status) {
            debug!(name = ?root.metadata.name, "Status unchanged");
            return Ok(());
        }

        let mut copy = root.clone();
        info!(
            name = ?root.metadata.name,
            state = ?status.submarine_state.state,
            server = status.available_server_replicas,
            database = status.available_database_replicas,
            "Updating Submarine status"
        );
        copy.status = Some(status);
        self.client.update_status(&copy).await?;
        Ok(())
    }
}
