use std::ops::ControlFlow;

use kube::ResourceExt;

use super::kind;
use super::Pass;
use super::Step;
use crate::crd::DeploymentConfig;
use crate::crd::ImageStream;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::EventData;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::Object;
use crate::k8s::ProbeApi;
use crate::TryResource;

const APPS_API: &str = "apps.openshift.io/v1";
const IMAGE_API: &str = "image.openshift.io/v1";

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    /// Deletes the DeploymentConfigs and ImageStreams earlier operator versions created for
    /// this server. Clusters without the OpenShift APIs are skipped.
    pub(super) async fn migrate_legacy(&mut self) -> Result<Step> {
        self.remove_legacy::<DeploymentConfig>(APPS_API).await?;
        self.remove_legacy::<ImageStream>(IMAGE_API).await?;
        Ok(ControlFlow::Continue(()))
    }

    async fn remove_legacy<K: Object>(&self, group_version: &str) -> Result<()> {
        if !self.cluster.api_version_exists(group_version).await? {
            return Ok(());
        }

        let namespace = self.server.try_namespace()?;
        let selector = format!("app={}", self.server.name_any());
        let legacy = match self.cluster.list::<K>(&namespace, &selector).await {
            Ok(legacy) => legacy,
            Err(error) if error.is_not_found() => return Ok(()),
            Err(error) => return Err(error),
        };

        let uid = self.server.uid();
        for object in legacy
            .iter()
            .filter(|object| object.owner_references().iter().any(|owner| Some(&owner.uid) == uid.as_ref()))
        {
            self.cluster.delete(object).await?;
            tracing::info!(
                kind = %kind::<K>(),
                namespace = %namespace,
                name = %object.name_any(),
                "Deleted legacy object"
            );
            self.events
                .emit(
                    &self.server,
                    EventData::new(
                        ServerEvent::LegacyResourceRemoved,
                        format!("Deleted {} {}", kind::<K>(), object.name_any()),
                    ),
                )
                .await;
        }
        Ok(())
    }
}
