use std::ops::ControlFlow;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;

use super::Pass;
use super::Step;
use crate::builders::child_name;
use crate::builders::postgres;
use crate::builders::POSTGRESQL;
use crate::ensure::ensure_image;
use crate::ensure::ensure_resources;
use crate::ensure::ensure_storage_size;
use crate::ensure::Drift;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::ProbeApi;
use crate::readiness::is_deployment_ready;

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    /// The database volume, credentials, deployment and service. An external database only
    /// gets a credentials secret, and not even that when it names its own.
    pub(super) async fn reconcile_database(&mut self) -> Result<Step> {
        let external = self.server.spec.external_db;
        let name = child_name(&self.server, POSTGRESQL);

        if !external {
            let claim = self.ensure(&name, postgres::postgres_pvc).await?;
            if let Some(found) = claim.observed() {
                let desired = postgres::postgres_pvc(&self.server, self.config)?;
                if ensure_storage_size(self.cluster, found, &desired).await? == Drift::Corrected {
                    return Ok(self.drift_corrected::<PersistentVolumeClaim>(&name, "storage size").await);
                }
            }
        }

        let own_secret = self
            .server
            .spec
            .database_secret
            .as_deref()
            .is_some_and(|secret| !secret.is_empty());
        if !(external && own_secret) {
            self.ensure(&postgres::secret_name(&self.server), |server, _| postgres::postgres_secret(server))
                .await?;
        }

        if external {
            return Ok(ControlFlow::Continue(()));
        }

        let deployment = self.ensure(&name, postgres::postgres_deployment).await?;
        if let Some(found) = deployment.observed() {
            let desired = postgres::postgres_deployment(&self.server, self.config)?;
            if ensure_resources(self.cluster, found, &desired).await? == Drift::Corrected {
                return Ok(self.drift_corrected::<Deployment>(&name, "resources").await);
            }
            if ensure_image(self.cluster, found, &desired, &self.config.postgres_container_name).await?
                == Drift::Corrected
            {
                return Ok(self.drift_corrected::<Deployment>(&name, "image").await);
            }
        }
        self.ready &= is_deployment_ready(deployment.observed())?;

        self.ensure(&name, |server, _| postgres::postgres_service(server))
            .await?;
        Ok(ControlFlow::Continue(()))
    }
}
