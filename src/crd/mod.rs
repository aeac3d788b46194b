//! Custom resources the operator reads and writes.
//!
//! - UnifiedPushServer: the resource the operator reconciles
//! - OpenShift routes, plus the legacy kinds of earlier operator versions
//! - AMQ Online address spaces, addresses and messaging users
//! - Prometheus and Grafana operator objects

mod enmasse;
mod monitoring;
mod openshift;
mod server;

pub use enmasse::{
    Address, AddressSpace, AddressSpaceSpec, AddressSpaceStatus, AddressSpec, AddressStatus, EndpointStatus,
    MessagingUser, MessagingUserSpec, UserAuthentication, UserAuthorization,
};
pub use monitoring::{
    Endpoint, GrafanaDashboard, GrafanaDashboardSpec, PrometheusRule, PrometheusRuleSpec, Rule, RuleGroup,
    ServiceMonitor, ServiceMonitorSpec,
};
pub use openshift::{
    DeploymentConfig, DeploymentConfigSpec, ImageStream, ImageStreamSpec, Route, RouteIngress,
    RouteIngressCondition, RouteSpec, RouteStatus, RouteTargetReference, TlsConfig,
};
pub use server::{Backup, Database, Phase, UnifiedPushServer, UnifiedPushServerSpec, UnifiedPushServerStatus};
