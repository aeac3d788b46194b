//! UnifiedPushServer Custom Resource Definition

use k8s_openapi::api::core::v1::Affinity;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::api::core::v1::Toleration;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::registry::SecondaryResources;
use crate::ObserveGeneration;
use crate::WithStatusError;

/// UnifiedPushServer is the Schema for the unifiedpushservers API
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "push.aerogear.org",
    version = "v1alpha1",
    kind = "UnifiedPushServer",
    plural = "unifiedpushservers",
    shortname = "ups",
    namespaced,
    status = "UnifiedPushServerStatus",
    derive = "PartialEq",
    derive = "Default",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedPushServerSpec {
    /// Use an existing database instead of provisioning one
    #[serde(default, rename = "externalDB")]
    pub external_db: bool,

    /// Connection details of the external database
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,

    /// Secret holding the external database connection (POSTGRES_* keys)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_secret: Option<String>,

    /// Scheduled database backups
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<Backup>,

    /// Route push messages through an AMQ Online address space
    #[serde(default)]
    pub use_message_broker: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_push_resource_requirements: Option<ResourceRequirements>,

    #[serde(default, rename = "oAuthResourceRequirements", skip_serializing_if = "Option::is_none")]
    pub oauth_resource_requirements: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres_resource_requirements: Option<ResourceRequirements>,

    /// Storage size of the database volume, e.g. `10Gi`
    #[serde(default, rename = "postgresPVCSize", skip_serializing_if = "Option::is_none")]
    pub postgres_pvc_size: Option<String>,

    /// Applied to every pod the operator creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Applied to every pod the operator creates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

/// External database connection
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: String,
    pub user: String,
    pub password: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<IntOrString>,
}

/// A scheduled backup of the database
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Name of the backup, used as the name of the scheduled job
    pub name: String,

    /// Cron schedule, e.g. `0 * * * *`
    pub schedule: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<std::collections::BTreeMap<String, String>>,

    /// Secret with the GPG key the dumps are encrypted with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key_secret_namespace: Option<String>,

    /// Secret with the credentials of the storage backend
    pub backend_secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_secret_namespace: Option<String>,
}

/// Lifecycle phase of a UnifiedPushServer
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub enum Phase {
    #[default]
    #[serde(rename = "")]
    Empty,
    Initializing,
    Reconciling,
    Failing,
}

impl Phase {
    /// Initializing and Reconciling instances own their namespace.
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Initializing | Phase::Reconciling)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedPushServerStatus {
    #[serde(default)]
    pub phase: Phase,

    #[serde(default)]
    pub ready: bool,

    #[serde(default)]
    pub message: String,

    /// Names of the children the last successful pass converged, by kind
    #[serde(default)]
    pub secondary_resources: SecondaryResources,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ObserveGeneration for UnifiedPushServerStatus {
    fn add(&mut self, observed_generation: i64) {
        self.observed_generation = Some(observed_generation);
    }
}

impl WithStatusError<crate::error::Error, String> for UnifiedPushServerStatus {
    fn add(&mut self, error: String) {
        self.message = error;
    }
}

impl UnifiedPushServer {
    pub fn phase(&self) -> Phase {
        self.status.as_ref().map(|status| status.phase).unwrap_or_default()
    }
}
