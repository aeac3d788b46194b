//! Lifecycle phase of a UnifiedPushServer and the writes of its status subresource.
//!
//! ```text
//! Empty ──▶ Initializing ◀──▶ Reconciling
//!              any phase ──▶ Failing ──▶ Initializing | Reconciling
//! ```
//!
//! The phase is recomputed from observed state on every pass; nothing remembers how a server
//! got into its current phase.

use crate::crd::Phase;
use crate::crd::UnifiedPushServer;
use crate::crd::UnifiedPushServerStatus;
use crate::error::Error;
use crate::error::Result;
use crate::k8s::ManageObjects;
use crate::registry::SecondaryResources;
use crate::ObserveGeneration;
use crate::TryResource;
use crate::WithStatusError;

fn status_mut(server: &mut UnifiedPushServer) -> &mut UnifiedPushServerStatus {
    server.status.get_or_insert_with(Default::default)
}

/// Moves a server seen for the first time to Initializing; returns whether it did.
pub fn initialize(server: &mut UnifiedPushServer) -> bool {
    if server.phase() != Phase::Empty {
        return false;
    }
    status_mut(server).phase = Phase::Initializing;
    true
}

/// Records a failed pass.
pub fn fail(server: &mut UnifiedPushServer, error: &Error) {
    let status = status_mut(server);
    status.phase = Phase::Failing;
    status.ready = false;
    status.with_status_error(error);
}

/// Records a completed pass: Reconciling once every child is ready, Initializing until then.
pub fn succeed(server: &mut UnifiedPushServer, ready: bool, secondary_resources: SecondaryResources) {
    let status = status_mut(server);
    status.phase = if ready { Phase::Reconciling } else { Phase::Initializing };
    status.ready = ready;
    status.message.clear();
    status.secondary_resources = secondary_resources;
}

/// Writes the status of `server` unless it equals `previous`, and returns the server as
/// stored afterwards.
pub async fn persist<M: ManageObjects>(
    cluster: &M,
    mut server: UnifiedPushServer,
    previous: Option<&UnifiedPushServerStatus>,
) -> Result<UnifiedPushServer> {
    let meta = server.metadata.clone();
    status_mut(&mut server).with_observed_gen(&meta);
    if server.status.as_ref() == previous {
        return Ok(server);
    }

    let updated = cluster.update_status(&server).await?;
    tracing::info!(
        namespace = %server.try_namespace()?,
        name = %server.try_name()?,
        phase = ?updated.phase(),
        "Updated status"
    );
    Ok(updated)
}
