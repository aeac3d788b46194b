use std::ops::ControlFlow;

use k8s_openapi::api::apps::v1::Deployment;
use kube::ResourceExt;

use super::Pass;
use super::Step;
use crate::builders::child_name;
use crate::builders::generate_password;
use crate::builders::server;
use crate::builders::PROXY;
use crate::builders::UNIFIEDPUSH;
use crate::ensure::ensure_image;
use crate::ensure::ensure_resources;
use crate::ensure::Drift;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::ProbeApi;
use crate::readiness::is_deployment_ready;
use crate::readiness::is_route_ready;

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    pub(super) async fn reconcile_server(&mut self) -> Result<Step> {
        let name = self.server.name_any();
        let proxy = child_name(&self.server, PROXY);

        self.ensure(&name, |owner, _| server::service_account(owner)).await?;
        self.ensure(&proxy, |owner, _| server::proxy_service(owner)).await?;
        self.ensure(&child_name(&self.server, UNIFIEDPUSH), |owner, _| server::server_service(owner))
            .await?;

        let route = self.ensure(&proxy, |owner, _| server::proxy_route(owner)).await?;
        self.ready &= is_route_ready(route.observed());

        let deployment = self
            .ensure(&name, |owner, config| {
                server::server_deployment(owner, config, &generate_password())
            })
            .await?;
        if let Some(found) = deployment.observed() {
            // The cookie secret only shows up in the proxy args, which drift checks never compare.
            let desired = server::server_deployment(&self.server, self.config, "")?;
            if ensure_resources(self.cluster, found, &desired).await? == Drift::Corrected {
                return Ok(self.drift_corrected::<Deployment>(&name, "resources").await);
            }
            for container in [&self.config.ups_container_name, &self.config.oauth_proxy_container_name] {
                if ensure_image(self.cluster, found, &desired, container).await? == Drift::Corrected {
                    return Ok(self.drift_corrected::<Deployment>(&name, "image").await);
                }
            }
        }
        self.ready &= is_deployment_ready(deployment.observed())?;

        Ok(ControlFlow::Continue(()))
    }
}
