use std::ops::ControlFlow;

use super::Pass;
use super::Step;
use crate::builders::monitoring;
use crate::ensure::create_or_update;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::ProbeApi;

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    /// Scraping, alerting and the dashboard, on clusters running the monitoring operators.
    pub(super) async fn reconcile_monitoring(&mut self) -> Result<Step> {
        if self.cluster.api_version_exists(monitoring::MONITORING_API).await? {
            let service_monitor =
                create_or_update(self.cluster, &self.server, monitoring::service_monitor(&self.server)?).await?;
            self.track(&service_monitor).await?;

            let rule = create_or_update(self.cluster, &self.server, monitoring::prometheus_rule(&self.server)?).await?;
            self.track(&rule).await?;
        } else {
            tracing::debug!(api = monitoring::MONITORING_API, "Monitoring API not served, skipping");
        }

        if self.cluster.api_version_exists(monitoring::DASHBOARD_API).await? {
            let dashboard =
                create_or_update(self.cluster, &self.server, monitoring::grafana_dashboard(&self.server)?).await?;
            self.track(&dashboard).await?;
        } else {
            tracing::debug!(api = monitoring::DASHBOARD_API, "Dashboard API not served, skipping");
        }

        Ok(ControlFlow::Continue(()))
    }
}
