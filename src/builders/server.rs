//! The push server itself, its OAuth proxy and the way in from outside the cluster.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::apps::v1::DeploymentSpec;
use k8s_openapi::api::apps::v1::DeploymentStrategy;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::ContainerPort;
use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::api::core::v1::HTTPGetAction;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::api::core::v1::Probe;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::core::v1::ServicePort;
use k8s_openapi::api::core::v1::ServiceSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use super::broker;
use super::child_name;
use super::named_meta;
use super::object_meta;
use super::placement;
use super::postgres;
use super::resources::oauth_proxy_resources;
use super::resources::ups_resources;
use super::secret_env;
use super::value_env;
use super::PROXY;
use super::UNIFIEDPUSH;
use crate::config::Config;
use crate::crd::RouteSpec;
use crate::crd::RouteTargetReference;
use crate::crd::TlsConfig;
use crate::crd::UnifiedPushServer;
use crate::crd::Route;
use crate::error::Result;

pub const HTTP_PORT: i32 = 8080;
pub const PROXY_PORT: i32 = 4180;
pub const METRICS_PATH: &str = "/rest/prometheus/metrics";

const HEALTH_PATH: &str = "/rest/applications";
const OAUTH_REDIRECT_ANNOTATION: &str = "serviceaccounts.openshift.io/oauth-redirectreference.ups";
const METRICS_ANNOTATION: &str = "org.aerogear.metrics/plain_endpoint";
const UNAUTHENTICATED_PATHS: &str = "/rest/sender,/rest/registry/device,/rest/prometheus/metrics,/rest/auth/config";

/// Labels of the server pods; both services select on them.
pub fn pod_labels(server: &UnifiedPushServer) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_owned(), server.name_any()),
        ("service".to_owned(), "ups".to_owned()),
    ])
}

/// The identity the OAuth proxy authenticates users with, redirecting back through the route.
pub fn service_account(server: &UnifiedPushServer) -> Result<ServiceAccount> {
    let mut metadata = named_meta(server, &server.name_any(), super::labels(server, UNIFIEDPUSH))?;
    let redirect = serde_json::json!({
        "kind": "OAuthRedirectReference",
        "apiVersion": "v1",
        "reference": { "kind": "Route", "name": child_name(server, PROXY) },
    });
    metadata.annotations = Some(BTreeMap::from([(
        OAUTH_REDIRECT_ANNOTATION.to_owned(),
        serde_json::to_string(&redirect)?,
    )]));

    Ok(ServiceAccount {
        metadata,
        ..Default::default()
    })
}

pub fn proxy_service(server: &UnifiedPushServer) -> Result<Service> {
    Ok(Service {
        metadata: object_meta(server, PROXY)?,
        spec: Some(web_service_spec(server, PROXY_PORT)),
        ..Default::default()
    })
}

/// In-cluster service of the server, bypassing the proxy; carries the metrics endpoint.
pub fn server_service(server: &UnifiedPushServer) -> Result<Service> {
    let mut metadata = object_meta(server, UNIFIEDPUSH)?;
    metadata.annotations = Some(BTreeMap::from([(
        METRICS_ANNOTATION.to_owned(),
        METRICS_PATH.to_owned(),
    )]));
    if let Some(labels) = metadata.labels.as_mut() {
        labels.insert("mobile".to_owned(), "enabled".to_owned());
        labels.insert("internal".to_owned(), UNIFIEDPUSH.to_owned());
    }

    Ok(Service {
        metadata,
        spec: Some(web_service_spec(server, HTTP_PORT)),
        ..Default::default()
    })
}

fn web_service_spec(server: &UnifiedPushServer, target_port: i32) -> ServiceSpec {
    ServiceSpec {
        selector: Some(pod_labels(server)),
        ports: Some(vec![ServicePort {
            name: Some("web".to_owned()),
            protocol: Some("TCP".to_owned()),
            port: 80,
            target_port: Some(IntOrString::Int(target_port)),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Edge terminated route to the proxy service; plain http is refused.
pub fn proxy_route(server: &UnifiedPushServer) -> Result<Route> {
    Ok(Route {
        metadata: object_meta(server, PROXY)?,
        spec: RouteSpec {
            host: None,
            to: RouteTargetReference {
                kind: "Service".to_owned(),
                name: child_name(server, PROXY),
            },
            tls: Some(TlsConfig {
                termination: "edge".to_owned(),
                insecure_edge_termination_policy: Some("None".to_owned()),
            }),
        },
        status: None,
    })
}

/// Environment of the server container: database connection and, with the broker enabled,
/// the broker credentials.
pub fn server_env(server: &UnifiedPushServer) -> Vec<EnvVar> {
    let database = postgres::secret_name(server);
    let mut port = secret_env("POSTGRES_SERVICE_PORT", &database, postgres::PORT_KEY);
    if let Some(selector) = port
        .value_from
        .as_mut()
        .and_then(|source| source.secret_key_ref.as_mut())
    {
        selector.optional = Some(true);
    }

    let mut env = vec![
        secret_env("POSTGRES_SERVICE_HOST", &database, postgres::HOST_KEY),
        port,
        secret_env("POSTGRES_USER", &database, postgres::USERNAME_KEY),
        secret_env("POSTGRES_PASSWORD", &database, postgres::PASSWORD_KEY),
        secret_env("POSTGRES_DATABASE", &database, postgres::DATABASE_KEY),
    ];

    if server.spec.use_message_broker {
        let amq = broker::secret_name(server);
        env.extend([
            value_env("ARTEMIS_USER", broker::USERNAME),
            secret_env("ARTEMIS_PASSWORD", &amq, broker::PASSWORD_KEY),
            secret_env("ARTEMIS_SERVICE_HOST", &amq, broker::URL_KEY),
            value_env("ARTEMIS_SERVICE_PORT", broker::PORT),
        ]);
    }

    env
}

fn http_probe(initial_delay_seconds: i32, timeout_seconds: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(HEALTH_PATH.to_owned()),
            port: IntOrString::Int(HTTP_PORT),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        timeout_seconds: Some(timeout_seconds),
        ..Default::default()
    }
}

/// The server deployment with the given proxy cookie secret.
///
/// Pass a freshly generated secret only when creating the deployment; the live deployment
/// keeps the secret it was created with.
pub fn server_deployment(server: &UnifiedPushServer, config: &Config, cookie_secret: &str) -> Result<Deployment> {
    let labels = pod_labels(server);
    let name = server.name_any();
    let (affinity, tolerations) = placement(server);

    let wait_for_database = Container {
        name: format!("{}-wait", config.postgres_container_name),
        image: Some(config.postgres_image.clone()),
        image_pull_policy: Some("IfNotPresent".to_owned()),
        env: Some(vec![secret_env(
            "POSTGRES_SERVICE_HOST",
            &postgres::secret_name(server),
            postgres::HOST_KEY,
        )]),
        command: Some(vec![
            "/bin/sh".to_owned(),
            "-c".to_owned(),
            "source /opt/rh/rh-postgresql96/enable && until pg_isready -h $POSTGRES_SERVICE_HOST; do echo waiting for database; sleep 2; done;".to_owned(),
        ]),
        ..Default::default()
    };

    let ups = Container {
        name: config.ups_container_name.clone(),
        image: Some(config.ups_image.clone()),
        image_pull_policy: Some("Always".to_owned()),
        env: Some(server_env(server)),
        resources: Some(ups_resources(server, config)?),
        ports: Some(vec![ContainerPort {
            name: Some(config.ups_container_name.clone()),
            protocol: Some("TCP".to_owned()),
            container_port: HTTP_PORT,
            ..Default::default()
        }]),
        readiness_probe: Some(http_probe(15, 2)),
        liveness_probe: Some(http_probe(120, 10)),
        ..Default::default()
    };

    let oauth_proxy = Container {
        name: config.oauth_proxy_container_name.clone(),
        image: Some(config.oauth_proxy_image.clone()),
        image_pull_policy: Some("Always".to_owned()),
        ports: Some(vec![ContainerPort {
            name: Some("public".to_owned()),
            protocol: Some("TCP".to_owned()),
            container_port: PROXY_PORT,
            ..Default::default()
        }]),
        resources: Some(oauth_proxy_resources(server, config)?),
        args: Some(vec![
            "--provider=openshift".to_owned(),
            format!("--openshift-service-account={name}"),
            format!("--upstream=http://localhost:{HTTP_PORT}"),
            format!("--http-address=0.0.0.0:{PROXY_PORT}"),
            format!("--skip-auth-regex={UNAUTHENTICATED_PATHS}"),
            "--https-address=".to_owned(),
            format!("--cookie-secret={cookie_secret}"),
        ]),
        ..Default::default()
    };

    Ok(Deployment {
        metadata: named_meta(server, &name, labels.clone())?,
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
                    service_account_name: Some(name),
                    init_containers: Some(vec![wait_for_database]),
                    containers: vec![ups, oauth_proxy],
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
