//! Kubernetes event emission.
//!
//! Events tell users what the operator did to their UnifiedPushServer: children created,
//! drift put back, backups removed, passes failed. Events are observability-only and never
//! fail reconciliation.
//!
//! # Example
//! ```rust,ignore
//! use unifiedpush_operator::cache::CachedApiProvider;
//! use unifiedpush_operator::events::{EmitEvent, EventData, EventRecorder, ServerEvent};
//!
//! let recorder = EventRecorder::new(Arc::new(CachedApiProvider::new(client)), "unifiedpush-operator");
//!
//! recorder
//!     .emit(&server, EventData::new(ServerEvent::ChildCreated, "Created Service example-postgresql"))
//!     .await;
//! ```

pub mod types;

mod recorder;

pub use recorder::EventRecorder;
pub use types::EventData;
pub use types::EventType;
pub use types::Reason;
pub use types::ServerEvent;

use async_trait::async_trait;
use kube::Resource;

use crate::error::Result;
use crate::TryResource;

/// Reports events about an object.
#[async_trait]
pub trait EmitEvent<R>: Send + Sync
where
    R: Reason,
{
    /// Reports the event, failing when the cluster refuses it.
    async fn try_emit<K>(&self, object: &K, event: EventData<R>) -> Result<()>
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync;

    /// Reports the event, logging a refusal instead of returning it. Reconciliation passes
    /// use this one.
    async fn emit<K>(&self, object: &K, event: EventData<R>)
    where
        K: Resource<DynamicType = ()> + TryResource + Clone + Send + Sync,
    {
        let reason = event.reason.clone();
        if let Err(error) = self.try_emit(object, event).await {
            tracing::warn!(%error, %reason, "Event not reported");
        }
    }
}
