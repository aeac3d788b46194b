use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::api::core::v1::EventSource;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::PostParams;
use kube::Resource;

use crate::cache::ProvideApi;
use crate::error::Result;
use crate::events::types::EventData;
use crate::events::types::Reason;
use crate::events::EmitEvent;
use crate::TryResource;

/// Reports events as `core/v1` Event objects in the namespace of the object they are about.
pub struct EventRecorder<P>
where
    P: ProvideApi<Event> + Send + Sync,
{
    apis: Arc<P>,
    component: Cow<'static, str>,
}

impl<P> EventRecorder<P>
where
    P: ProvideApi<Event> + Send + Sync,
{
    /// `component` is shown as the source of every event, e.g. `unifiedpush-operator`.
    pub fn new(apis: Arc<P>, component: impl Into<Cow<'static, str>>) -> Self {
        Self {
            apis,
            component: component.into(),
        }
    }
}

/// `<object>.<unix nanos in hex>`, the naming scheme kubectl and client-go recorders use.
fn event_name(object_name: &str, now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default();
    format!("{object_name}.{nanos:x}")
}

/// The Event reporting `event` on `object`, first and last seen `now`.
fn to_event<K, R>(object: &K, event: EventData<R>, component: &str, now: DateTime<Utc>) -> Result<Event>
where
    K: Resource<DynamicType = ()>,
    R: Reason,
{
    let namespace = object.try_namespace()?;
    let name = object.try_name()?;

    Ok(Event {
        metadata: ObjectMeta {
            name: Some(event_name(name, now)),
            namespace: Some(namespace.clone()),
            ..Default::default()
        },
        involved_object: ObjectReference {
            api_version: Some(K::api_version(&()).into_owned()),
            kind: Some(K::kind(&()).into_owned()),
            name: Some(name.to_owned()),
            namespace: Some(namespace),
            uid: object.meta().uid.clone(),
            resource_version: object.meta().resource_version.clone(),
            ..Default::default()
        },
        type_: Some(event.event_type().to_string()),
        action: Some(event.reason.action().to_owned()),
        reason: Some(event.reason.to_string()),
        message: Some(event.message),
        count: Some(1),
        first_timestamp: Some(Time(now)),
        last_timestamp: Some(Time(now)),
        source: Some(EventSource {
            component: Some(component.to_owned()),
            ..Default::default()
        }),
        reporting_component: Some(component.to_owned()),
        ..Default::default()
    })
}

#[async_trait]
impl<P, R> EmitEvent<R> for EventRecorder<P>
where
    P: ProvideApi<Event> + Send + Sync,
    R: Reason,
{
    #[tracing::instrument(
        skip(self, object, event),
        fields(
            kind = %K::kind(&()),
            name = %object.try_name().unwrap_or_default(),
            reason = %event.reason,
        )
    )]
    async fn try_emit<K>(&self, object: &K, event: EventData<R>) -> Result<()>
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync,
    {
        let k8s_event = to_event(object, event, &self.component, Utc::now())?;
        let namespace = k8s_event.metadata.namespace.clone().unwrap_or_default();
        self.apis
            .get(&namespace)?
            .create(&PostParams::default(), &k8s_event)
            .await?;
        Ok(())
    }
}
