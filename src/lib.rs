//! `unifiedpush-operator` provisions and maintains UnifiedPush Server installations on
//! Kubernetes and OpenShift.
//!
//! A `UnifiedPushServer` resource describes one installation. The operator converges the
//! cluster towards it: a PostgreSQL database (or the connection to an external one), the
//! server deployment behind an OAuth proxy and its route, scheduled database backups,
//! Prometheus and Grafana monitoring objects and, when asked for, the AMQ Online address
//! space the server exchanges push messages through.
//!
//! ## Layout
//!
//! - [builders]: the desired state of every child, as pure functions of the resource and [config::Config]
//! - [ensure]: get-or-create and per kind drift correction of single children
//! - [readiness]: whether observed children are ready
//! - [registry]: the children a resource owns, as published in its status
//! - [phase]: the lifecycle phase stored in the status subresource
//! - [controller]: one reconciliation pass, sequencing all of the above
//! - [k8s]: the cluster port the pass talks through
//!
//! ## Usage
//!
//! The binary wires everything up; embedding the operator looks like this:
//!
//! ```rust,ignore
//! let client = Client::try_default().await?;
//! let config = Arc::new(Config::parse());
//! let repository = Arc::new(K8sRepository::new(client.clone()));
//! let events = Arc::new(EventRecorder::new(Arc::new(CachedApiProvider::new(client.clone())), "unifiedpush-operator"));
//!
//! let context = Arc::new(ServerContext::new(repository, events, config));
//! ServerReconciler::new(client, None, context).start(Some(4)).await;
//! ```
//!
//! ## Status Object Handling
//!
//! The status of a `UnifiedPushServer` follows the **Observed Generation Pattern**: every status
//! write records the generation of the spec it was computed from, see [ObserveGeneration].
//! Errors of a failed pass end up in the status message through [WithStatusError].

pub mod builders;
pub mod cache;
pub mod config;
pub mod controller;
pub mod crd;
pub mod ensure;
pub mod error;
pub mod events;
pub mod k8s;
pub mod phase;
pub mod readiness;
pub mod registry;

use std::fmt::Debug;
use std::hash::Hash;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ObjectMeta;
use kube::runtime::controller::Action;
use kube::runtime::controller::Error as KubeControllerError;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::Controller;
use kube::Resource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

const REQUEUE_AFTER_ERROR_SECONDS: u64 = 5;

type ReconciliationResult<R, RE, QE> = StdResult<(ObjectRef<R>, Action), KubeControllerError<RE, QE>>;

/// Runs a [Controller] until the process is told to stop.
///
/// Implementors hand over the configured controller and the [Context] doing the work through
/// [Reconcile::destruct]; everything else has a default.
#[async_trait]
pub trait Reconcile<R, C>: Sized + Send
where
    R: Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static,
    R::DynamicType: Default + Eq + Hash + Clone + Debug + Unpin,
    C: Context<R> + 'static,
{
    /// Drives the controller stream. At most `limit` resources are reconciled at once, all of
    /// them when `None`; one resource is never reconciled twice at the same time.
    async fn start(self, limit: Option<usize>) {
        let (controller, context) = self.destruct();
        controller
            .shutdown_on_signal()
            .run(Self::reconcile, Self::error_policy, context)
            .for_each_concurrent(limit, Self::log_outcome)
            .await;
    }

    async fn reconcile(resource: Arc<R>, context: Arc<C>) -> Result<Action> {
        context.handle_apply(resource).await
    }

    fn error_policy(resource: Arc<R>, error: &Error, context: Arc<C>) -> Action {
        context.handle_error(resource, error, Self::retry_after())
    }

    async fn log_outcome<RE, QE>(outcome: ReconciliationResult<R, RE, QE>)
    where
        RE: Debug + Send,
        QE: Debug + Send,
    {
        match outcome {
            Ok((resource, action)) => tracing::debug!(%resource, ?action, "Pass finished"),
            Err(error) => tracing::error!(?error, "Pass failed"),
        }
    }

    /// Delay before a resource whose pass returned an error is tried again.
    fn retry_after() -> Option<Duration> {
        Some(Duration::from_secs(REQUEUE_AFTER_ERROR_SECONDS))
    }

    fn destruct(self) -> (Controller<R>, Arc<C>);
}

/// Converges the cluster towards one resource.
///
/// Children carry owner references and are removed by the garbage collector, so there is no
/// deletion hook.
#[async_trait]
pub trait Context<R>: Send + Sync
where
    R: Resource<Scope = NamespaceResourceScope> + Serialize + DeserializeOwned + Debug + Clone + Send + Sync + 'static,
    R::DynamicType: Default,
{
    /// Last resort for errors [Context::handle_apply] let through: log, then retry after
    /// `requeue` or wait for the next change.
    fn handle_error(&self, object: Arc<R>, error: &Error, requeue: Option<Duration>) -> Action {
        tracing::error!(
            namespace = %object.namespace().unwrap_or_default(),
            name = %object.name_any(),
            %error,
            "Reconciliation error"
        );
        requeue.map_or_else(Action::await_change, Action::requeue)
    }

    /// One pass. Passes may be cut short at any await and run again from the start.
    async fn handle_apply(&self, object: Arc<R>) -> Result<Action>;
}

/// A status recording which generation of the spec it describes.
pub trait ObserveGeneration {
    fn add(&mut self, observed_generation: i64);

    /// Records `meta.generation`, if the object has one.
    fn with_observed_gen(&mut self, meta: &ObjectMeta) {
        if let Some(generation) = meta.generation {
            self.add(generation);
        }
    }
}

/// How an error is shown in a status.
pub trait AsStatusError<E>
where
    E: Serialize + Debug + PartialEq + Clone + JsonSchema,
    E: for<'de> Deserialize<'de>,
{
    fn as_status_error(&self) -> E;
}

/// A status that can carry the error of the last pass.
pub trait WithStatusError<A, E>
where
    A: AsStatusError<E>,
    E: Serialize + Debug + PartialEq + Clone + JsonSchema,
    E: for<'de> Deserialize<'de>,
{
    fn add(&mut self, error: E);

    fn with_status_error(&mut self, error: &A) {
        self.add(error.as_status_error());
    }
}

/// Name and namespace of an object, or an error when it has none.
pub trait TryResource {
    fn try_name(&self) -> Result<&str>;
    fn try_namespace(&self) -> Result<String>;
}

impl<R> TryResource for R
where
    R: Resource,
{
    fn try_name(&self) -> Result<&str> {
        self.meta().name.as_deref().ok_or(Error::UnnamedObject)
    }

    fn try_namespace(&self) -> Result<String> {
        self.namespace()
            .ok_or_else(|| Error::UserInput("Object has no namespace to place its children in".to_owned()))
    }
}
