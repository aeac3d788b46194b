//! Access to the cluster the operator converges.
//!
//! The reconciliation core talks to the API server only through [`ManageObjects`] and
//! [`ProbeApi`]. [`K8sRepository`] implements both on top of a [`kube::Client`]; tests use the
//! in-memory [`fake::FakeCluster`].

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::api::DeleteParams;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::TryResource;

/// A namespaced, statically typed Kubernetes object.
pub trait Object:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Reading and writing objects of any kind.
///
/// Every call is a single round trip; retries are left to the caller.
#[async_trait]
pub trait ManageObjects: Send + Sync {
    /// Fetches an object by name; `None` when it does not exist.
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    /// Lists the objects matching an equality based label selector, e.g. `app=example`.
    async fn list<K: Object>(&self, namespace: &str, selector: &str) -> Result<Vec<K>>;

    async fn create<K: Object>(&self, object: &K) -> Result<K>;

    /// Replaces the object; fails with a conflict when its resource version is stale.
    async fn update<K: Object>(&self, object: &K) -> Result<K>;

    /// Replaces the status subresource of the object.
    async fn update_status<K: Object>(&self, object: &K) -> Result<K>;

    async fn delete<K: Object>(&self, object: &K) -> Result<()>;
}

/// Discovery of optional API groups.
#[async_trait]
pub trait ProbeApi: Send + Sync {
    /// Whether the API server serves `group/version`, e.g. `monitoring.coreos.com/v1`.
    async fn api_version_exists(&self, group_version: &str) -> Result<bool>;
}

/// [`ManageObjects`] and [`ProbeApi`] backed by the API server.
#[derive(Clone)]
pub struct K8sRepository {
    client: Client,
}

impl K8sRepository {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: Object>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ManageObjects for K8sRepository {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.api::<K>(namespace).get_opt(name).await?)
    }

    async fn list<K: Object>(&self, namespace: &str, selector: &str) -> Result<Vec<K>> {
        let params = ListParams::default().labels(selector);
        Ok(self.api::<K>(namespace).list(&params).await?.items)
    }

    async fn create<K: Object>(&self, object: &K) -> Result<K> {
        let api = self.api::<K>(&object.try_namespace()?);
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn update<K: Object>(&self, object: &K) -> Result<K> {
        let api = self.api::<K>(&object.try_namespace()?);
        Ok(api.replace(object.try_name()?, &PostParams::default(), object).await?)
    }

    async fn update_status<K: Object>(&self, object: &K) -> Result<K> {
        let api = self.api::<K>(&object.try_namespace()?);
        let body = serde_json::to_vec(object)?;
        Ok(api.replace_status(object.try_name()?, &PostParams::default(), body).await?)
    }

    async fn delete<K: Object>(&self, object: &K) -> Result<()> {
        let api = self.api::<K>(&object.try_namespace()?);
        match api.delete(object.try_name()?, &DeleteParams::background()).await {
            Ok(_) => Ok(()),
            Err(error) => {
                let error = Error::from(error);
                if error.is_not_found() {
                    Ok(())
                } else {
                    Err(error)
                }
            }
        }
    }
}

#[async_trait]
impl ProbeApi for K8sRepository {
    async fn api_version_exists(&self, group_version: &str) -> Result<bool> {
        match self.client.list_api_group_resources(group_version).await {
            Ok(_) => Ok(true),
            Err(error) => {
                let error = Error::from(error);
                if error.is_not_found() {
                    Ok(false)
                } else {
                    Err(error)
                }
            }
        }
    }
}

/// In-memory cluster for tests.
#[cfg(test)]
pub mod fake {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub enum Verb {
        Get,
        List,
        Create,
        Update,
        UpdateStatus,
        Delete,
    }

    /// A write the reconciler issued.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Write {
        pub verb: Verb,
        pub kind: String,
        pub name: String,
    }

    impl Write {
        pub fn new(verb: Verb, kind: &str, name: &str) -> Self {
            Self {
                verb,
                kind: kind.to_owned(),
                name: name.to_owned(),
            }
        }
    }

    type Key = (String, String, String);

    /// Stores objects as json keyed by kind, namespace and name.
    ///
    /// Emulates the parts of the API server the reconciler relies on: generated uids, resource
    /// version conflicts, status as a separate subresource and equality label selectors.
    #[derive(Default)]
    pub struct FakeCluster {
        objects: Mutex<BTreeMap<Key, Value>>,
        writes: Mutex<Vec<Write>>,
        missing_apis: Mutex<BTreeSet<String>>,
        failures: Mutex<BTreeMap<(Verb, String), String>>,
        revision: Mutex<u64>,
    }

    fn api_error(code: u16, reason: &str, message: String) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_owned(),
            message,
            reason: reason.to_owned(),
            code,
        }))
    }

    fn key<K: Object>(namespace: &str, name: &str) -> Key {
        (K::kind(&()).to_string(), namespace.to_owned(), name.to_owned())
    }

    fn object_key<K: Object>(object: &K) -> Key {
        key::<K>(
            object.meta().namespace.as_deref().unwrap_or_default(),
            object.meta().name.as_deref().unwrap_or_default(),
        )
    }

    fn matches_selector(object: &Value, selector: &str) -> bool {
        let labels = &object["metadata"]["labels"];
        selector
            .split(',')
            .filter(|requirement| !requirement.is_empty())
            .all(|requirement| match requirement.split_once('=') {
                Some((label, value)) => labels[label].as_str() == Some(value),
                None => !labels[requirement].is_null(),
            })
    }

    impl FakeCluster {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_revision(&self) -> String {
            let mut revision = self.revision.lock().unwrap();
            *revision += 1;
            revision.to_string()
        }

        fn check_failure(&self, verb: Verb, kind: &str) -> Result<()> {
            match self.failures.lock().unwrap().get(&(verb, kind.to_owned())) {
                Some(message) => Err(api_error(500, "InternalError", message.clone())),
                None => Ok(()),
            }
        }

        fn record(&self, verb: Verb, kind: &str, name: &str) {
            self.writes.lock().unwrap().push(Write::new(verb, kind, name));
        }

        fn stamp(&self, value: &mut Value) {
            let revision = self.next_revision();
            let metadata = &mut value["metadata"];
            if metadata["uid"].is_null() {
                metadata["uid"] = Value::String(format!("uid-{revision}"));
            }
            metadata["resourceVersion"] = Value::String(revision);
        }

        /// Puts an object into the store as if another actor created it.
        pub fn insert<K: Object>(&self, object: K) -> K {
            let mut value = serde_json::to_value(&object).unwrap();
            self.stamp(&mut value);
            self.objects.lock().unwrap().insert(object_key(&object), value.clone());
            serde_json::from_value(value).unwrap()
        }

        pub fn object<K: Object>(&self, namespace: &str, name: &str) -> Option<K> {
            self.objects
                .lock()
                .unwrap()
                .get(&key::<K>(namespace, name))
                .map(|value| serde_json::from_value(value.clone()).unwrap())
        }

        pub fn objects<K: Object>(&self, namespace: &str) -> Vec<K> {
            let kind = K::kind(&()).to_string();
            self.objects
                .lock()
                .unwrap()
                .iter()
                .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
                .map(|(_, value)| serde_json::from_value(value.clone()).unwrap())
                .collect()
        }

        /// Changes a stored object, status included, as if another actor did.
        pub fn modify<K: Object>(&self, namespace: &str, name: &str, change: impl FnOnce(&mut K)) {
            let mut object: K = self.object(namespace, name).unwrap();
            change(&mut object);
            let mut value = serde_json::to_value(&object).unwrap();
            self.stamp(&mut value);
            self.objects.lock().unwrap().insert(key::<K>(namespace, name), value);
        }

        pub fn writes(&self) -> Vec<Write> {
            self.writes.lock().unwrap().clone()
        }

        pub fn clear_writes(&self) {
            self.writes.lock().unwrap().clear();
        }

        /// Makes `group_version` unknown to discovery.
        pub fn without_api(&self, group_version: &str) {
            self.missing_apis.lock().unwrap().insert(group_version.to_owned());
        }

        /// Fails every `verb` on objects of `kind` with an internal server error.
        pub fn fail_on(&self, verb: Verb, kind: &str, message: &str) {
            self.failures
                .lock()
                .unwrap()
                .insert((verb, kind.to_owned()), message.to_owned());
        }

        pub fn clear_failures(&self) {
            self.failures.lock().unwrap().clear();
        }

        fn stored_for_write<K: Object>(&self, object: &K) -> Result<Value> {
            let (kind, _, name) = object_key(object);
            let stored = self
                .objects
                .lock()
                .unwrap()
                .get(&object_key(object))
                .cloned()
                .ok_or_else(|| api_error(404, "NotFound", format!("{kind} {name} not found")))?;

            let expected = object.meta().resource_version.as_deref();
            let actual = stored["metadata"]["resourceVersion"].as_str();
            if expected.is_some() && expected != actual {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!("the object {kind} {name} has been modified"),
                ));
            }
            Ok(stored)
        }
    }

    #[async_trait]
    impl ManageObjects for FakeCluster {
        async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
            self.check_failure(Verb::Get, &K::kind(&()))?;
            Ok(self.object(namespace, name))
        }

        async fn list<K: Object>(&self, namespace: &str, selector: &str) -> Result<Vec<K>> {
            let kind = K::kind(&()).to_string();
            self.check_failure(Verb::List, &kind)?;
            self.objects
                .lock()
                .unwrap()
                .iter()
                .filter(|((k, ns, _), value)| *k == kind && ns == namespace && matches_selector(value, selector))
                .map(|(_, value)| serde_json::from_value(value.clone()).map_err(Error::from))
                .collect()
        }

        async fn create<K: Object>(&self, object: &K) -> Result<K> {
            let (kind, _, name) = object_key(object);
            self.check_failure(Verb::Create, &kind)?;
            if self.objects.lock().unwrap().contains_key(&object_key(object)) {
                return Err(api_error(409, "AlreadyExists", format!("{kind} {name} already exists")));
            }

            let mut value = serde_json::to_value(object)?;
            self.stamp(&mut value);
            self.objects.lock().unwrap().insert(object_key(object), value.clone());
            self.record(Verb::Create, &kind, &name);
            Ok(serde_json::from_value(value)?)
        }

        async fn update<K: Object>(&self, object: &K) -> Result<K> {
            let (kind, _, name) = object_key(object);
            self.check_failure(Verb::Update, &kind)?;
            let stored = self.stored_for_write(object)?;

            let mut value = serde_json::to_value(object)?;
            value["metadata"]["uid"] = stored["metadata"]["uid"].clone();
            match stored.get("status") {
                Some(status) => value["status"] = status.clone(),
                None => {
                    if let Some(fields) = value.as_object_mut() {
                        fields.remove("status");
                    }
                }
            }
            self.stamp(&mut value);
            self.objects.lock().unwrap().insert(object_key(object), value.clone());
            self.record(Verb::Update, &kind, &name);
            Ok(serde_json::from_value(value)?)
        }

        async fn update_status<K: Object>(&self, object: &K) -> Result<K> {
            let (kind, _, name) = object_key(object);
            self.check_failure(Verb::UpdateStatus, &kind)?;
            let mut stored = self.stored_for_write(object)?;

            let status = serde_json::to_value(object)?
                .get("status")
                .cloned()
                .unwrap_or(Value::Null);
            stored["status"] = status;
            self.stamp(&mut stored);
            self.objects.lock().unwrap().insert(object_key(object), stored.clone());
            self.record(Verb::UpdateStatus, &kind, &name);
            Ok(serde_json::from_value(stored)?)
        }

        async fn delete<K: Object>(&self, object: &K) -> Result<()> {
            let (kind, _, name) = object_key(object);
            self.check_failure(Verb::Delete, &kind)?;
            if self.objects.lock().unwrap().remove(&object_key(object)).is_none() {
                return Err(api_error(404, "NotFound", format!("{kind} {name} not found")));
            }
            self.record(Verb::Delete, &kind, &name);
            Ok(())
        }
    }

    #[async_trait]
    impl ProbeApi for FakeCluster {
        async fn api_version_exists(&self, group_version: &str) -> Result<bool> {
            Ok(!self.missing_apis.lock().unwrap().contains(group_version))
        }
    }
}
