//! Converging single children towards their desired state.
//!
//! Children are created once and afterwards only corrected where they drifted: the storage
//! request of a claim, the resources and images of deployment containers, the spec of
//! monitoring objects. Everything else on a live child belongs to the cluster and to users.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::core::object::HasSpec;
use kube::Resource;

use crate::builders::find_container;
use crate::crd::UnifiedPushServer;
use crate::error::Error;
use crate::error::Result;
use crate::k8s::ManageObjects;
use crate::k8s::Object;
use crate::TryResource;

/// Outcome of making sure a child exists.
#[derive(Debug, Clone, PartialEq)]
pub enum Ensured<K> {
    /// The child already existed and was left as it was.
    Found(K),
    /// The child was missing and has just been created.
    Created(K),
}

impl<K> Ensured<K> {
    pub fn object(&self) -> &K {
        match self {
            Ensured::Found(object) | Ensured::Created(object) => object,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Ensured::Created(_))
    }

    /// The child as observed in the cluster; a child created during this pass has not been
    /// observed yet.
    pub fn observed(&self) -> Option<&K> {
        match self {
            Ensured::Found(object) => Some(object),
            Ensured::Created(_) => None,
        }
    }
}

/// Whether a drift check had to correct the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    None,
    Corrected,
}

/// Controller reference pointing at the server, set on every child before it is created.
pub fn owner_reference(
    owner: &UnifiedPushServer,
) -> Result<k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference> {
    owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::UserInput(format!(
            "UnifiedPushServer {} has no uid and can not own children",
            owner.try_name().unwrap_or_default()
        ))
    })
}

/// Creates `desired` owned by `owner`.
pub async fn create_owned<M, K>(cluster: &M, owner: &UnifiedPushServer, mut desired: K) -> Result<K>
where
    M: ManageObjects,
    K: Object,
{
    desired.meta_mut().owner_references = Some(vec![owner_reference(owner)?]);
    let created = cluster.create(&desired).await?;
    tracing::info!(
        kind = %K::kind(&()),
        namespace = %created.try_namespace()?,
        name = %created.try_name()?,
        "Created child"
    );
    Ok(created)
}

/// Fetches the child `name` of `owner`, creating it from `build` when it does not exist.
///
/// `build` only runs when the child is missing, so generated secrets are produced once.
pub async fn ensure_exists<M, K, F>(cluster: &M, owner: &UnifiedPushServer, name: &str, build: F) -> Result<Ensured<K>>
where
    M: ManageObjects,
    K: Object,
    F: FnOnce() -> Result<K> + Send,
{
    let namespace = owner.try_namespace()?;
    if let Some(found) = cluster.get::<K>(&namespace, name).await? {
        return Ok(Ensured::Found(found));
    }

    Ok(Ensured::Created(create_owned(cluster, owner, build()?).await?))
}

/// Creates the child or replaces its spec when it differs from the desired one.
pub async fn create_or_update<M, K>(cluster: &M, owner: &UnifiedPushServer, desired: K) -> Result<Ensured<K>>
where
    M: ManageObjects,
    K: Object + HasSpec,
    K::Spec: Clone + PartialEq + Send + Sync,
{
    let namespace = owner.try_namespace()?;
    let name = desired.try_name()?.to_owned();
    let Some(mut found) = cluster.get::<K>(&namespace, &name).await? else {
        return Ok(Ensured::Created(create_owned(cluster, owner, desired).await?));
    };

    if found.spec() == desired.spec() {
        return Ok(Ensured::Found(found));
    }

    *found.spec_mut() = desired.spec().clone();
    let updated = cluster.update(&found).await?;
    tracing::info!(
        kind = %K::kind(&()),
        namespace = %namespace,
        name = %name,
        "Replaced drifted spec"
    );
    Ok(Ensured::Found(updated))
}

fn storage_request(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|quantity| quantity.0.as_str())
}

/// `found` with the storage request of `desired`, when the two differ.
pub fn storage_size_drift(found: &PersistentVolumeClaim, desired: &PersistentVolumeClaim) -> Option<PersistentVolumeClaim> {
    if storage_request(found) == storage_request(desired) {
        return None;
    }

    let mut corrected = found.clone();
    let requested = desired
        .spec
        .as_ref()
        .and_then(|spec| spec.resources.as_ref())
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get("storage"))
        .cloned();
    if let Some(requested) = requested {
        corrected
            .spec
            .get_or_insert_with(Default::default)
            .resources
            .get_or_insert_with(Default::default)
            .requests
            .get_or_insert_with(Default::default)
            .insert("storage".to_owned(), requested);
    }
    Some(corrected)
}

fn containers(deployment: &Deployment) -> &[Container] {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.template.spec.as_ref())
        .map(|pod| pod.containers.as_slice())
        .unwrap_or_default()
}

fn container_mut<'a>(deployment: &'a mut Deployment, name: &str) -> Option<&'a mut Container> {
    deployment
        .spec
        .as_mut()?
        .template
        .spec
        .as_mut()?
        .containers
        .iter_mut()
        .find(|container| container.name == name)
}

/// `found` with the resources of the first container whose resources differ from `desired`.
pub fn resources_drift(found: &Deployment, desired: &Deployment) -> Option<Deployment> {
    let drifted = containers(desired).iter().find(|expected| {
        find_container(containers(found), &expected.name).is_some_and(|live| live.resources != expected.resources)
    })?;

    let mut corrected = found.clone();
    container_mut(&mut corrected, &drifted.name)?.resources = drifted.resources.clone();
    Some(corrected)
}

/// `found` with the image of container `name` taken from `desired`, when the two differ.
pub fn image_drift(found: &Deployment, desired: &Deployment, name: &str) -> Option<Deployment> {
    let expected = find_container(containers(desired), name)?;
    let live = find_container(containers(found), name)?;
    if live.image == expected.image {
        return None;
    }

    let mut corrected = found.clone();
    container_mut(&mut corrected, name)?.image = expected.image.clone();
    Some(corrected)
}

async fn apply_correction<M, K>(cluster: &M, corrected: Option<K>, what: &str) -> Result<Drift>
where
    M: ManageObjects,
    K: Object,
{
    let Some(corrected) = corrected else {
        return Ok(Drift::None);
    };

    cluster.update(&corrected).await?;
    tracing::info!(
        kind = %K::kind(&()),
        namespace = %corrected.try_namespace()?,
        name = %corrected.try_name()?,
        drift = what,
        "Corrected drift"
    );
    Ok(Drift::Corrected)
}

pub async fn ensure_storage_size<M: ManageObjects>(
    cluster: &M,
    found: &PersistentVolumeClaim,
    desired: &PersistentVolumeClaim,
) -> Result<Drift> {
    apply_correction(cluster, storage_size_drift(found, desired), "storage size").await
}

pub async fn ensure_resources<M: ManageObjects>(cluster: &M, found: &Deployment, desired: &Deployment) -> Result<Drift> {
    apply_correction(cluster, resources_drift(found, desired), "resources").await
}

pub async fn ensure_image<M: ManageObjects>(
    cluster: &M,
    found: &Deployment,
    desired: &Deployment,
    container: &str,
) -> Result<Drift> {
    apply_correction(cluster, image_drift(found, desired, container), "image").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::server;
    use crate::builders::postgres::postgres_deployment;
    use crate::builders::postgres::postgres_pvc;
    use crate::builders::postgres::postgres_service;
    use crate::config::Config;
    use crate::crd::ServiceMonitor;
    use crate::k8s::fake::FakeCluster;
    use crate::k8s::fake::Verb;
    use crate::k8s::fake::Write;
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use k8s_openapi::api::core::v1::Service;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn owned_server(cluster: &FakeCluster) -> UnifiedPushServer {
        cluster.insert(server("example", "push"))
    }

    #[tokio::test]
    async fn test_ensure_exists_creates_once() {
        // Given: A server without a database service
        let cluster = FakeCluster::new();
        let owner = owned_server(&cluster);

        // When: Ensuring the service twice
        let first = ensure_exists(&cluster, &owner, "example-postgresql", || postgres_service(&owner))
            .await
            .unwrap();
        let second = ensure_exists::<_, Service, _>(&cluster, &owner, "example-postgresql", || {
            panic!("must not build an existing child")
        })
        .await
        .unwrap();

        // Then: It was created once, owned by the server, and found afterwards
        assert!(first.was_created());
        assert!(first.observed().is_none());
        assert!(!second.was_created());
        let owners = second.object().metadata.owner_references.clone().unwrap();
        assert_eq!(owners[0].uid, owner.metadata.uid.clone().unwrap());
        assert_eq!(owners[0].controller, Some(true));
        assert_eq!(cluster.writes(), [Write::new(Verb::Create, "Service", "example-postgresql")]);
    }

    #[tokio::test]
    async fn test_children_need_an_owner_with_uid() {
        let cluster = FakeCluster::new();
        let owner = server("example", "push");

        let result = ensure_exists(&cluster, &owner, "example-postgresql", || postgres_service(&owner)).await;

        assert!(matches!(result, Err(Error::UserInput(_))));
        assert!(cluster.writes().is_empty());
    }

    #[test]
    fn test_storage_size_drift() {
        // Given: A claim of 5Gi while 10Gi are wanted
        let config = Config::default();
        let found = postgres_pvc(&server("example", "push"), &config).unwrap();
        let mut wanted = config.clone();
        wanted.postgres_pvc_size = "10Gi".to_owned();
        let desired = postgres_pvc(&server("example", "push"), &wanted).unwrap();

        // When: Checking for drift
        let corrected = storage_size_drift(&found, &desired).unwrap();

        // Then: Only the request changes
        assert_eq!(storage_request(&corrected), Some("10Gi"));
        assert_eq!(corrected.spec.as_ref().unwrap().access_modes, found.spec.as_ref().unwrap().access_modes);
        assert!(storage_size_drift(&desired, &desired).is_none());
    }

    #[test]
    fn test_resources_drift_overwrites_whole_requirements() {
        // Given: A live deployment whose limits were edited by hand
        let desired = postgres_deployment(&server("example", "push"), &Config::default()).unwrap();
        let mut found = desired.clone();
        container_mut(&mut found, "postgresql").unwrap().resources = Some(ResourceRequirements {
            limits: Some(BTreeMap::from([("memory".to_owned(), Quantity("1Gi".to_owned()))])),
            ..Default::default()
        });
        container_mut(&mut found, "postgresql").unwrap().image = Some("postgres:latest".to_owned());

        // When: Checking for resource drift
        let corrected = resources_drift(&found, &desired).unwrap();

        // Then: The resources are restored and the image is left for a later check
        let container = find_container(containers(&corrected), "postgresql").unwrap();
        let expected = find_container(containers(&desired), "postgresql").unwrap();
        assert_eq!(container.resources, expected.resources);
        assert_eq!(container.image.as_deref(), Some("postgres:latest"));
        assert!(image_drift(&corrected, &desired, "postgresql").is_some());
    }

    #[test]
    fn test_no_drift_without_differences() {
        let desired = postgres_deployment(&server("example", "push"), &Config::default()).unwrap();

        assert!(resources_drift(&desired, &desired).is_none());
        assert!(image_drift(&desired, &desired, "postgresql").is_none());
        assert!(image_drift(&desired, &desired, "missing").is_none());
    }

    #[tokio::test]
    async fn test_ensure_image_updates_live_object() {
        // Given: A live database deployment running another image
        let cluster = FakeCluster::new();
        let owner = owned_server(&cluster);
        let desired = postgres_deployment(&owner, &Config::default()).unwrap();
        let mut drifted = desired.clone();
        container_mut(&mut drifted, "postgresql").unwrap().image = Some("postgres:latest".to_owned());
        let found = cluster.insert(drifted);

        // When: Ensuring the image
        let drift = ensure_image(&cluster, &found, &desired, "postgresql").await.unwrap();

        // Then: The image is restored with a single update
        assert_eq!(drift, Drift::Corrected);
        let live: Deployment = cluster.object("push", "example-postgresql").unwrap();
        assert_eq!(
            find_container(containers(&live), "postgresql").unwrap().image,
            find_container(containers(&desired), "postgresql").unwrap().image
        );
        assert_eq!(cluster.writes(), [Write::new(Verb::Update, "Deployment", "example-postgresql")]);
    }

    #[tokio::test]
    async fn test_create_or_update_only_writes_changes() {
        // Given: An existing service monitor
        let cluster = FakeCluster::new();
        let owner = owned_server(&cluster);
        let desired = crate::builders::monitoring::service_monitor(&owner).unwrap();
        create_or_update(&cluster, &owner, desired.clone()).await.unwrap();
        cluster.clear_writes();

        // When: Applying the same spec and then a changed live object
        create_or_update(&cluster, &owner, desired.clone()).await.unwrap();
        let unchanged_writes = cluster.writes();
        cluster.modify::<ServiceMonitor>("push", "example-unifiedpush", |monitor| {
            monitor.spec.endpoints.clear();
        });
        create_or_update(&cluster, &owner, desired.clone()).await.unwrap();

        // Then: Only the drifted spec is written back
        assert!(unchanged_writes.is_empty());
        assert_eq!(cluster.writes(), [Write::new(Verb::Update, "ServiceMonitor", "example-unifiedpush")]);
        let live: ServiceMonitor = cluster.object("push", "example-unifiedpush").unwrap();
        assert_eq!(live.spec, desired.spec);
    }
}
