//! Kubernetes lookups used while reconciling

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::Client;
use serde::de::DeserializeOwned;

#[cfg(test)]
use mockall::automock;

use crate::crd::ConfigMapKeyRef;
use crate::Error;

/// Trait abstracting Kubernetes client operations for CloudEndpoint
///
/// Each lookup returns `Ok(None)` when the object does not exist so callers
/// can tell "not there yet" apart from a failed request.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get an Ingress by namespace and name
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error>;

    /// Get a Service by namespace and name
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error>;

    /// Get a ConfigMap by namespace and name
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get_opt<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, Error>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_ingress(&self, namespace: &str, name: &str) -> Result<Option<Ingress>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, Error> {
        self.get_opt(namespace, name).await
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        self.get_opt(namespace, name).await
    }
}

/// Read one key of a ConfigMap; `None` when the map or the key is missing
pub async fn config_map_value(
    kube: &dyn KubeClient,
    namespace: &str,
    reference: &ConfigMapKeyRef,
) -> Result<Option<String>, Error> {
    let Some(config_map) = kube.get_config_map(namespace, &reference.name).await? else {
        return Ok(None);
    };
    Ok(config_map
        .data
        .and_then(|mut data| data.remove(&reference.key)))
}

/// First load-balancer address of an ingress: its IP, else its hostname
pub fn ingress_address(ingress: &Ingress) -> Option<String> {
    let first = ingress
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?;

    first
        .ip
        .clone()
        .filter(|ip| !ip.is_empty())
        .or_else(|| first.hostname.clone().filter(|h| !h.is_empty()))
}
