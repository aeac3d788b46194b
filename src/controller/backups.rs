use std::ops::ControlFlow;
use std::time::Duration;

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::runtime::controller::Action;
use kube::ResourceExt;

use super::kind;
use super::Pass;
use super::Step;
use crate::builders::backup;
use crate::builders::selector;
use crate::builders::BACKUP;
use crate::ensure::create_owned;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::EventData;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::ProbeApi;
use crate::registry::TrackChildren;
use crate::TryResource;

const REQUEUE_WAITING_FOR_SERVICE_ACCOUNT: Duration = Duration::from_secs(10);

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    /// One scheduled job per backup in the spec. Jobs of removed backups are deleted, jobs
    /// whose spec or labels were changed are replaced.
    pub(super) async fn reconcile_backups(&mut self) -> Result<Step> {
        let namespace = self.server.try_namespace()?;
        let desired = backup::backup_cron_jobs(&self.server, self.config)?;

        if !desired.is_empty()
            && self
                .cluster
                .get::<ServiceAccount>(&namespace, backup::SERVICE_ACCOUNT)
                .await?
                .is_none()
        {
            tracing::warn!(
                namespace = %namespace,
                service_account = backup::SERVICE_ACCOUNT,
                "Backups need the service account, checking again later"
            );
            return Ok(ControlFlow::Break(Action::requeue(REQUEUE_WAITING_FOR_SERVICE_ACCOUNT)));
        }

        let existing: Vec<CronJob> = self
            .cluster
            .list(&namespace, &selector(&self.server, BACKUP))
            .await?;

        for job in desired.iter().cloned() {
            let name = job.try_name()?.to_owned();
            match existing.iter().find(|found| found.name_any() == name) {
                Some(found) if found.spec == job.spec && found.labels() == job.labels() => {}
                Some(found) => {
                    let mut replacement = job;
                    replacement.metadata.resource_version = found.metadata.resource_version.clone();
                    replacement.metadata.owner_references = found.metadata.owner_references.clone();
                    self.cluster.update(&replacement).await?;
                    tracing::info!(namespace = %namespace, name = %name, "Replaced backup CronJob");
                }
                None => {
                    create_owned(self.cluster, &self.server, job).await?;
                    self.events
                        .emit(
                            &self.server,
                            EventData::new(ServerEvent::ChildCreated, format!("Created CronJob {name}")),
                        )
                        .await;
                }
            }
            self.registry.add(&kind::<CronJob>(), &name);
        }

        for found in &existing {
            let name = found.name_any();
            if desired.iter().any(|job| job.metadata.name.as_deref() == Some(name.as_str())) {
                continue;
            }
            self.cluster.delete(found).await?;
            self.registry.remove(&kind::<CronJob>(), &name);
            tracing::info!(namespace = %namespace, name = %name, "Deleted CronJob of removed backup");
            self.events
                .emit(
                    &self.server,
                    EventData::new(ServerEvent::BackupRemoved, format!("Deleted CronJob {name}")),
                )
                .await;
        }

        Ok(ControlFlow::Continue(()))
    }
}
