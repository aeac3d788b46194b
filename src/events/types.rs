use std::fmt::Debug;
use std::fmt::Display;

use strum::AsRefStr;
use strum::Display as StrumDisplay;

/// Type of Kubernetes event
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, AsRefStr)]
pub enum EventType {
    Normal,
    Warning,
}

/// A reason an event can be reported for.
///
/// Reasons are CamelCase strings as Kubernetes shows them. Each reason fixes the type of its
/// events and the action it reports, so callers only pick the reason and write the message.
pub trait Reason: Debug + Display + AsRef<str> + Clone + Send + Sync + 'static {
    fn event_type(&self) -> EventType;

    /// What the operator did, e.g. `Create`.
    fn action(&self) -> &'static str;
}

/// Reasons of the events emitted on UnifiedPushServer resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, AsRefStr)]
pub enum ServerEvent {
    /// A child was missing and has been created
    ChildCreated,
    /// A child was changed outside the operator and has been put back
    DriftCorrected,
    /// The scheduled job of a backup no longer in the resource was deleted
    BackupRemoved,
    /// An object of an earlier operator version was deleted
    LegacyResourceRemoved,
    /// A pass failed; the message carries the error
    ReconcileFailed,
}

impl Reason for ServerEvent {
    fn event_type(&self) -> EventType {
        match self {
            ServerEvent::ReconcileFailed => EventType::Warning,
            _ => EventType::Normal,
        }
    }

    fn action(&self) -> &'static str {
        match self {
            ServerEvent::ChildCreated => "Create",
            ServerEvent::DriftCorrected => "Update",
            ServerEvent::BackupRemoved | ServerEvent::LegacyResourceRemoved => "Delete",
            ServerEvent::ReconcileFailed => "Reconcile",
        }
    }
}

/// One event about to be reported on an object.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData<R: Reason> {
    pub reason: R,
    pub message: String,
}

impl<R: Reason> EventData<R> {
    pub fn new(reason: R, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn event_type(&self) -> EventType {
        self.reason.event_type()
    }
}
