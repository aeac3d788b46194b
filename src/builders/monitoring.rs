//! Prometheus scraping and alerting, and the Grafana dashboard of a server.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

use super::child_name;
use super::named_meta;
use super::server::METRICS_PATH;
use super::POSTGRESQL;
use super::UNIFIEDPUSH;
use crate::crd::Endpoint;
use crate::crd::GrafanaDashboard;
use crate::crd::GrafanaDashboardSpec;
use crate::crd::PrometheusRule;
use crate::crd::PrometheusRuleSpec;
use crate::crd::Rule;
use crate::crd::RuleGroup;
use crate::crd::ServiceMonitor;
use crate::crd::ServiceMonitorSpec;
use crate::crd::UnifiedPushServer;
use crate::error::Result;

pub const MONITORING_API: &str = "monitoring.coreos.com/v1";
pub const DASHBOARD_API: &str = "integreatly.org/v1alpha1";

/// Labels the application monitoring stack discovers its objects by.
fn monitoring_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("monitoring-key".to_owned(), "middleware".to_owned()),
        ("prometheus".to_owned(), "application-monitoring".to_owned()),
    ])
}

pub fn service_monitor(server: &UnifiedPushServer) -> Result<ServiceMonitor> {
    let name = child_name(server, UNIFIEDPUSH);
    Ok(ServiceMonitor {
        metadata: named_meta(server, &name, monitoring_labels())?,
        spec: ServiceMonitorSpec {
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([("service".to_owned(), name.clone())])),
                ..Default::default()
            },
            endpoints: vec![Endpoint {
                port: "web".to_owned(),
                path: METRICS_PATH.to_owned(),
            }],
        },
    })
}

pub fn prometheus_rule(server: &UnifiedPushServer) -> Result<PrometheusRule> {
    let mut labels = monitoring_labels();
    labels.insert("role".to_owned(), "alert-rules".to_owned());

    let namespace = server.namespace().unwrap_or_default();
    let rules = vec![
        down_alert(
            "UnifiedPushDown",
            &child_name(server, UNIFIEDPUSH),
            &format!("UnifiedPush Server {} in namespace {namespace} is down", server.name_any()),
        ),
        down_alert(
            "UnifiedPushDatabaseDown",
            &child_name(server, POSTGRESQL),
            &format!("UnifiedPush database {} in namespace {namespace} is down", child_name(server, POSTGRESQL)),
        ),
    ];

    Ok(PrometheusRule {
        metadata: named_meta(server, &child_name(server, UNIFIEDPUSH), labels)?,
        spec: PrometheusRuleSpec {
            groups: vec![RuleGroup {
                name: "general.rules".to_owned(),
                rules,
            }],
        },
    })
}

fn down_alert(alert: &str, service: &str, message: &str) -> Rule {
    Rule {
        alert: alert.to_owned(),
        expr: format!("absent(up{{service=\"{service}\"}} == 1)"),
        for_: "5m".to_owned(),
        labels: BTreeMap::from([("severity".to_owned(), "critical".to_owned())]),
        annotations: BTreeMap::from([("message".to_owned(), message.to_owned())]),
    }
}

/// Dashboard object; the dashboard json itself is shipped with the operator image.
pub fn grafana_dashboard(server: &UnifiedPushServer) -> Result<GrafanaDashboard> {
    let name = child_name(server, UNIFIEDPUSH);
    Ok(GrafanaDashboard {
        metadata: named_meta(server, &name, monitoring_labels())?,
        spec: GrafanaDashboardSpec {
            name: format!("{name}.json"),
            json: dashboard_json(server),
        },
    })
}

fn dashboard_json(server: &UnifiedPushServer) -> String {
    serde_json::json!({
        "title": format!("UnifiedPush Server {}", server.name_any()),
        "tags": ["unifiedpush"],
        "schemaVersion": 16,
        "panels": [],
    })
    .to_string()
}
