//! Desired state of every child of a UnifiedPushServer.
//!
//! Builders are pure: the same resource and configuration yield the same object, except for
//! generated secrets (database password, proxy cookie secret) which callers only produce when
//! an object is about to be created.

pub mod backup;
pub mod broker;
pub mod monitoring;
pub mod postgres;
pub mod resources;
pub mod server;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Affinity;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::EnvVarSource;
use k8s_openapi::api::core::v1::SecretKeySelector;
use k8s_openapi::api::core::v1::Toleration;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use crate::crd::UnifiedPushServer;
use crate::error::Result;
use crate::TryResource;

pub const POSTGRESQL: &str = "postgresql";
pub const UNIFIEDPUSH: &str = "unifiedpush";
pub const PROXY: &str = "unifiedpush-proxy";
pub const AMQ: &str = "amq";
pub const BACKUP: &str = "backup";

/// `<server>-<suffix>`
pub fn child_name(server: &UnifiedPushServer, suffix: &str) -> String {
    format!("{}-{suffix}", server.name_any())
}

pub fn labels(server: &UnifiedPushServer, suffix: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_owned(), server.name_any()),
        ("service".to_owned(), child_name(server, suffix)),
    ])
}

/// Label selector matching `labels(server, suffix)`.
pub fn selector(server: &UnifiedPushServer, suffix: &str) -> String {
    labels(server, suffix)
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn object_meta(server: &UnifiedPushServer, suffix: &str) -> Result<ObjectMeta> {
    named_meta(server, &child_name(server, suffix), labels(server, suffix))
}

pub fn named_meta(server: &UnifiedPushServer, name: &str, labels: BTreeMap<String, String>) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(name.to_owned()),
        namespace: Some(server.try_namespace()?),
        labels: Some(labels),
        ..Default::default()
    })
}

pub fn generate_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_owned(),
                key: key.to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn value_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..Default::default()
    }
}

/// Affinity and tolerations the resource asks every pod to carry.
pub fn placement(server: &UnifiedPushServer) -> (Option<Affinity>, Option<Vec<Toleration>>) {
    let tolerations = &server.spec.tolerations;
    (
        server.spec.affinity.clone(),
        (!tolerations.is_empty()).then(|| tolerations.clone()),
    )
}

pub fn find_container<'a>(containers: &'a [Container], name: &str) -> Option<&'a Container> {
    containers.iter().find(|container| container.name == name)
}
