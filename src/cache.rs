//! Per-namespace [Api] handles, created once and shared.
//!
//! Events are written to the namespace of the server they are about, and which namespaces
//! hold servers is only known while the operator runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use k8s_openapi::NamespaceResourceScope;
use kube::Api;
use kube::Client;
use kube::Resource;

use crate::error::Result;

/// Hands out the [Api] of a namespace.
pub trait ProvideApi<R>
where
    R: Resource<Scope = NamespaceResourceScope>,
{
    fn get(&self, namespace: &str) -> Result<Arc<Api<R>>>;
}

/// Creates the [Api] of a namespace on first use and hands out clones of it afterwards.
pub struct CachedApiProvider<R> {
    client: Client,
    apis: RwLock<HashMap<String, Arc<Api<R>>>>,
}

impl<R> CachedApiProvider<R> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            apis: RwLock::new(HashMap::new()),
        }
    }
}

impl<R> ProvideApi<R> for CachedApiProvider<R>
where
    R: Resource<Scope = NamespaceResourceScope>,
    R::DynamicType: Default,
{
    fn get(&self, namespace: &str) -> Result<Arc<Api<R>>> {
        if let Some(api) = self.apis.read()?.get(namespace) {
            return Ok(Arc::clone(api));
        }

        // A concurrent miss on the same namespace may have inserted it in the meantime.
        let api = self
            .apis
            .write()?
            .entry(namespace.to_owned())
            .or_insert_with(|| Arc::new(Api::namespaced(self.client.clone(), namespace)))
            .clone();
        Ok(api)
    }
}
