//! The database the server keeps its applications and installations in.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::apps::v1::DeploymentStrategy;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::ExecAction;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use k8s_openapi::api::core::v1::PersistentVolumeClaimVolumeSource;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::Probe;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::api::core::v1::TCPSocketAction;
use k8s_openapi::api::core::v1::Volume;
use k8s_openapi::api::core::v1::VolumeMount;
use k8s_openapi::api::core::v1::VolumeResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use super::generate_password;
use super::labels;
use super::object_meta;
use super::placement;
use super::resources::postgres_pvc_size;
use super::resources::postgres_resources;
use super::secret_env;
use super::POSTGRESQL;
use crate::config::Config;
use crate::crd::UnifiedPushServer;
use crate::error::Error;
use crate::error::Result;
use crate::TryResource;

pub const PORT: i32 = 5432;
pub const DATABASE: &str = "unifiedpush";
pub const USERNAME: &str = "unifiedpush";

pub const HOST_KEY: &str = "POSTGRES_HOST";
pub const PORT_KEY: &str = "POSTGRES_PORT";
pub const DATABASE_KEY: &str = "POSTGRES_DATABASE";
pub const USERNAME_KEY: &str = "POSTGRES_USERNAME";
pub const PASSWORD_KEY: &str = "POSTGRES_PASSWORD";
pub const SUPERUSER_KEY: &str = "POSTGRES_SUPERUSER";

const DATA_PATH: &str = "/var/lib/pgsql/data";

/// Name of the secret the server reads its database connection from.
pub fn secret_name(server: &UnifiedPushServer) -> String {
    match (&server.spec.database_secret, server.spec.external_db) {
        (Some(secret), true) if !secret.is_empty() => secret.clone(),
        _ => super::child_name(server, POSTGRESQL),
    }
}

pub fn postgres_pvc(server: &UnifiedPushServer, config: &Config) -> Result<PersistentVolumeClaim> {
    Ok(PersistentVolumeClaim {
        metadata: object_meta(server, POSTGRESQL)?,
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_owned(),
                    postgres_pvc_size(server, config)?,
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Connection secret of the database. Generates a fresh password for an operator managed
/// database, so only call it when the secret is about to be created.
pub fn postgres_secret(server: &UnifiedPushServer) -> Result<Secret> {
    let namespace = server.try_namespace()?;

    let entries = if server.spec.external_db {
        let database = server.spec.database.as_ref().ok_or_else(|| {
            Error::Configuration("an external database needs either `database` or `databaseSecret`".to_owned())
        })?;
        let port = match &database.port {
            Some(IntOrString::Int(port)) => port.to_string(),
            Some(IntOrString::String(port)) => port.clone(),
            None => PORT.to_string(),
        };
        [
            (DATABASE_KEY, database.name.clone()),
            (USERNAME_KEY, database.user.clone()),
            (PASSWORD_KEY, database.password.clone()),
            (HOST_KEY, database.host.clone()),
            (PORT_KEY, port),
            (SUPERUSER_KEY, "false".to_owned()),
        ]
    } else {
        [
            (DATABASE_KEY, DATABASE.to_owned()),
            (USERNAME_KEY, USERNAME.to_owned()),
            (PASSWORD_KEY, generate_password()),
            (HOST_KEY, format!("{}.{namespace}.svc", super::child_name(server, POSTGRESQL))),
            (PORT_KEY, PORT.to_string()),
            (SUPERUSER_KEY, "false".to_owned()),
        ]
    };

    Ok(Secret {
        metadata: object_meta(server, POSTGRESQL)?,
        string_data: Some(entries.into_iter().map(|(key, value)| (key.to_owned(), value)).collect()),
        ..Default::default()
    })
}

pub fn postgres_deployment(server: &UnifiedPushServer, config: &Config) -> Result<Deployment> {
    let labels = labels(server, POSTGRESQL);
    let name = super::child_name(server, POSTGRESQL);
    let data_volume = format!("{name}-data");
    let secret = secret_name(server);
    let (affinity, tolerations) = placement(server);

    let container = Container {
        name: config.postgres_container_name.clone(),
        image: Some(config.postgres_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_owned()),
        env: Some(vec![
            secret_env("POSTGRESQL_USER", &secret, USERNAME_KEY),
            secret_env("POSTGRESQL_PASSWORD", &secret, PASSWORD_KEY),
            secret_env("POSTGRESQL_DATABASE", &secret, DATABASE_KEY),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some(POSTGRESQL.to_owned()),
            container_port: PORT,
            protocol: Some("TCP".to_owned()),
            ..Default::default()
        }]),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(vec![
                    "/bin/sh".to_owned(),
                    "-i".to_owned(),
                    "-c".to_owned(),
                    "psql -h 127.0.0.1 -U $POSTGRESQL_USER -q -d $POSTGRESQL_DATABASE -c 'SELECT 1'".to_owned(),
                ]),
            }),
            initial_delay_seconds: Some(5),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: IntOrString::Int(PORT),
                ..Default::default()
            }),
            initial_delay_seconds: Some(30),
            timeout_seconds: Some(1),
            ..Default::default()
        }),
        resources: Some(postgres_resources(server, config)?),
        volume_mounts: Some(vec![VolumeMount {
            name: data_volume.clone(),
            mount_path: DATA_PATH.to_owned(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: object_meta(server, POSTGRESQL)?,
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_owned()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: data_volume,
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: name,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    affinity,
                    tolerations,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

pub fn postgres_service(server: &UnifiedPushServer) -> Result<Service> {
    Ok(Service {
        metadata: object_meta(server, POSTGRESQL)?,
        spec: Some(ServiceSpec {
            selector: Some(labels(server, POSTGRESQL)),
            ports: Some(vec![ServicePort {
                name: Some(POSTGRESQL.to_owned()),
                port: PORT,
                protocol: Some("TCP".to_owned()),
                target_port: Some(IntOrString::Int(PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}
