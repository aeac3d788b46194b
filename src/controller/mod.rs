//! Reconciliation of UnifiedPushServer resources.
//!
//! A pass fetches the resource and converges its children step by step: broker, legacy
//! cleanup, database, server, backups, monitoring. A step either continues or ends the pass
//! early with a requeue, e.g. while the broker is not ready yet or right after a drift
//! correction. Errors end the pass in the Failing phase.

mod backups;
mod broker;
mod database;
mod migration;
mod monitoring;
mod server;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Action;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::Api;
use kube::Client;
use kube::Resource;
use kube::ResourceExt;

use crate::config::Config;
use crate::crd::Address;
use crate::crd::AddressSpace;
use crate::crd::Route;
use crate::crd::UnifiedPushServer;
use crate::crd::UnifiedPushServerStatus;
use crate::ensure::ensure_exists;
use crate::ensure::Ensured;
use crate::error::Error;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::EventData;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::Object;
use crate::k8s::ProbeApi;
use crate::phase;
use crate::registry::SecondaryResources;
use crate::registry::TrackChildren;
use crate::Context;
use crate::Reconcile;
use crate::TryResource;

const REQUEUE_AFTER_SUCCESS: Duration = Duration::from_secs(30);
const REQUEUE_AFTER_ERROR: Duration = Duration::from_secs(5);
const REQUEUE_AFTER_DRIFT: Duration = Duration::from_secs(1);

pub const ROUTE_API: &str = "route.openshift.io/v1";
pub const ENMASSE_API: &str = "enmasse.io/v1beta1";

/// Whether a step lets the pass go on or ends it with the given action.
type Step = ControlFlow<Action>;

fn kind<K: Object>() -> String {
    K::kind(&()).into_owned()
}

/// Everything a pass needs: the cluster, the event sink and the operator configuration.
pub struct ServerContext<M, E> {
    cluster: Arc<M>,
    events: Arc<E>,
    config: Arc<Config>,
}

impl<M, E> ServerContext<M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    pub fn new(cluster: Arc<M>, events: Arc<E>, config: Arc<Config>) -> Self {
        Self {
            cluster,
            events,
            config,
        }
    }

    /// Runs one pass for the resource `namespace/name`.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action> {
        if !self.config.watches(namespace) {
            tracing::debug!("Namespace is not watched");
            return Ok(Action::await_change());
        }

        let Some(server) = self.cluster.get::<UnifiedPushServer>(namespace, name).await? else {
            tracing::debug!("UnifiedPushServer is gone");
            return Ok(Action::await_change());
        };

        let mut pass = Pass::new(self, server);
        match pass.run().await {
            Ok(action) => Ok(action),
            Err(error) => Ok(pass.fail(error).await),
        }
    }
}

/// State of a single pass over one UnifiedPushServer.
struct Pass<'a, M, E> {
    cluster: &'a M,
    events: &'a E,
    config: &'a Config,
    server: UnifiedPushServer,
    /// Status as last read from or written to the cluster.
    stored: Option<UnifiedPushServerStatus>,
    registry: SecondaryResources,
    ready: bool,
}

impl<'a, M, E> Pass<'a, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    fn new(context: &'a ServerContext<M, E>, server: UnifiedPushServer) -> Self {
        Self {
            cluster: context.cluster.as_ref(),
            events: context.events.as_ref(),
            config: context.config.as_ref(),
            stored: server.status.clone(),
            server,
            registry: SecondaryResources::default(),
            ready: true,
        }
    }

    async fn run(&mut self) -> Result<Action> {
        if self.defers_to_active_instance().await? {
            tracing::info!("Another UnifiedPushServer is active in the namespace, leaving this one alone");
            return Ok(Action::await_change());
        }

        if phase::initialize(&mut self.server) {
            self.persist().await?;
        }

        if let ControlFlow::Break(action) = self.converge().await? {
            return Ok(action);
        }

        let registry = std::mem::take(&mut self.registry);
        phase::succeed(&mut self.server, self.ready, registry);
        self.persist().await?;
        Ok(Action::requeue(REQUEUE_AFTER_SUCCESS))
    }

    /// Only one UnifiedPushServer per namespace is Initializing or Reconciling at a time.
    ///
    /// A server outside those phases, Failing ones included, waits for a change while another
    /// server of the namespace is active.
    async fn defers_to_active_instance(&self) -> Result<bool> {
        if self.server.phase().is_active() {
            return Ok(false);
        }

        let name = self.server.name_any();
        let others: Vec<UnifiedPushServer> = self.cluster.list(&self.server.try_namespace()?, "").await?;
        Ok(others
            .iter()
            .any(|other| other.name_any() != name && other.phase().is_active()))
    }

    async fn converge(&mut self) -> Result<Step> {
        let step = self.reconcile_broker().await?;
        if step.is_break() {
            return Ok(step);
        }
        let step = self.migrate_legacy().await?;
        if step.is_break() {
            return Ok(step);
        }
        let step = self.reconcile_database().await?;
        if step.is_break() {
            return Ok(step);
        }
        let step = self.reconcile_server().await?;
        if step.is_break() {
            return Ok(step);
        }
        let step = self.reconcile_backups().await?;
        if step.is_break() {
            return Ok(step);
        }
        self.reconcile_monitoring().await
    }

    /// Records the failure in the status; a failing status write is only logged.
    async fn fail(&mut self, error: Error) -> Action {
        tracing::warn!(
            namespace = %self.server.namespace().unwrap_or_default(),
            name = %self.server.name_any(),
            %error,
            "Reconciliation failed"
        );
        phase::fail(&mut self.server, &error);
        self.events
            .emit(
                &self.server,
                EventData::new(ServerEvent::ReconcileFailed, error.to_string()),
            )
            .await;
        if let Err(status_error) = self.persist().await {
            tracing::error!(
                namespace = %self.server.namespace().unwrap_or_default(),
                name = %self.server.name_any(),
                error = %status_error,
                "Failed to record failure in status"
            );
        }
        Action::requeue(REQUEUE_AFTER_ERROR)
    }

    async fn persist(&mut self) -> Result<()> {
        self.server = phase::persist(self.cluster, self.server.clone(), self.stored.as_ref()).await?;
        self.stored = self.server.status.clone();
        Ok(())
    }

    /// Makes sure the child `name` exists, building it with `build` when it does not.
    async fn ensure<K, F>(&mut self, name: &str, build: F) -> Result<Ensured<K>>
    where
        K: Object,
        F: FnOnce(&UnifiedPushServer, &Config) -> Result<K> + Send,
    {
        let server = &self.server;
        let config = self.config;
        let ensured = ensure_exists(self.cluster, server, name, || build(server, config)).await?;
        self.track(&ensured).await?;
        Ok(ensured)
    }

    /// Registers a child touched in this pass, announcing it when it was just created.
    async fn track<K: Object>(&mut self, ensured: &Ensured<K>) -> Result<()> {
        let name = ensured.object().try_name()?;
        self.registry.add(&kind::<K>(), name);
        if ensured.was_created() {
            self.events
                .emit(
                    &self.server,
                    EventData::new(ServerEvent::ChildCreated, format!("Created {} {name}", kind::<K>())),
                )
                .await;
        }
        Ok(())
    }

    /// Ends the pass after a drift correction so the next one sees the corrected child.
    async fn drift_corrected<K: Object>(&self, name: &str, what: &str) -> Step {
        self.events
            .emit(
                &self.server,
                EventData::new(
                    ServerEvent::DriftCorrected,
                    format!("Restored {what} of {} {name}", kind::<K>()),
                ),
            )
            .await;
        ControlFlow::Break(Action::requeue(REQUEUE_AFTER_DRIFT))
    }
}

#[async_trait]
impl<M, E> Context<UnifiedPushServer> for ServerContext<M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    async fn handle_apply(&self, object: Arc<UnifiedPushServer>) -> Result<Action> {
        self.reconcile(&object.try_namespace()?, object.try_name()?).await
    }
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Watches UnifiedPushServers and their children, in one namespace or in all of them.
pub struct ServerReconciler<M, E> {
    controller: Controller<UnifiedPushServer>,
    context: Arc<ServerContext<M, E>>,
}

impl<M, E> ServerReconciler<M, E>
where
    M: ManageObjects + ProbeApi + 'static,
    E: EmitEvent<ServerEvent> + 'static,
{
    /// Child kinds of optional API groups are only watched when the cluster serves them.
    pub async fn new(client: Client, namespace: Option<&str>, context: Arc<ServerContext<M, E>>) -> Result<Self> {
        let config = watcher::Config::default();
        let mut controller = Controller::new(scoped_api::<UnifiedPushServer>(&client, namespace), config.clone())
            .owns(scoped_api::<Deployment>(&client, namespace), config.clone())
            .owns(scoped_api::<Service>(&client, namespace), config.clone())
            .owns(scoped_api::<Secret>(&client, namespace), config.clone())
            .owns(scoped_api::<PersistentVolumeClaim>(&client, namespace), config.clone())
            .owns(scoped_api::<ServiceAccount>(&client, namespace), config.clone())
            .owns(scoped_api::<CronJob>(&client, namespace), config.clone());

        if context.cluster.api_version_exists(ROUTE_API).await? {
            controller = controller.owns(scoped_api::<Route>(&client, namespace), config.clone());
        }
        if context.cluster.api_version_exists(ENMASSE_API).await? {
            controller = controller
                .owns(scoped_api::<AddressSpace>(&client, namespace), config.clone())
                .owns(scoped_api::<Address>(&client, namespace), config);
        }

        Ok(Self { controller, context })
    }
}

#[async_trait]
impl<M, E> Reconcile<UnifiedPushServer, ServerContext<M, E>> for ServerReconciler<M, E>
where
    M: ManageObjects + ProbeApi + 'static,
    E: EmitEvent<ServerEvent> + 'static,
{
    fn destruct(self) -> (Controller<UnifiedPushServer>, Arc<ServerContext<M, E>>) {
        (self.controller, self.context)
    }
}
