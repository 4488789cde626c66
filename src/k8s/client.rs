//! Cluster Access
//!
//! [`ClusterReader`] is the only seam between tools and the Kubernetes API. The live
//! implementation wraps a `kube::Client`; [`super::memory::InMemoryCluster`] serves fixtures and
//! offline manifests through the same interface.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DynamicObject, ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::Client;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::KubernetesConfig;
use crate::k8s::resources::ResourceKind;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} is not available: the CustomResourceDefinition is not installed")]
    NotInstalled { kind: ResourceKind },

    #[error("{kind} '{name}' not found{}", in_namespace(.namespace))]
    NotFound { kind: ResourceKind, namespace: Option<String>, name: String },

    #[error("access to {kind} is forbidden: {message}")]
    Forbidden { kind: ResourceKind, message: String },

    #[error("Kubernetes API error: {0}")]
    Api(String),

    #[error("failed to decode {kind}: {message}")]
    Decode { kind: ResourceKind, message: String },
}

fn in_namespace(namespace: &Option<String>) -> String {
    namespace.as_deref().map(|ns| format!(" in namespace '{}'", ns)).unwrap_or_default()
}

/// Read-only view of a cluster.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List objects of `kind`; `None` lists across all namespaces.
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError>;

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError>;

    /// Existence check that never reads object contents (used for Secrets).
    async fn exists(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError>;

    /// Whether the API server serves `kind`.
    async fn is_installed(&self, kind: ResourceKind) -> Result<bool, ClusterError>;

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError>;
}

impl dyn ClusterReader {
    /// List a kind that may not be installed: a missing CRD yields an empty list.
    pub async fn list_optional(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        match self.list(kind, namespace).await {
            Ok(items) => Ok(items),
            Err(ClusterError::NotInstalled { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// `ApiResource` for a catalog kind.
pub fn api_resource(kind: ResourceKind) -> ApiResource {
    let gvk = GroupVersionKind::gvk(kind.group(), kind.version(), kind.kind());
    ApiResource::from_gvk_with_plural(&gvk, kind.plural())
}

/// Live cluster access through `kube`.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from kubeconfig / in-cluster config, applying the configured context and
    /// timeouts.
    pub async fn connect(config: &KubernetesConfig) -> Result<Self, ClusterError> {
        let mut kube_config = match (&config.kubeconfig, &config.context) {
            (Some(path), context) => {
                let kubeconfig =
                    Kubeconfig::read_from(path).map_err(|e| ClusterError::Api(e.to_string()))?;
                let options = KubeConfigOptions { context: context.clone(), ..Default::default() };
                kube::Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| ClusterError::Api(e.to_string()))?
            }
            (None, Some(context)) => {
                let options = KubeConfigOptions { context: Some(context.clone()), ..Default::default() };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| ClusterError::Api(e.to_string()))?
            }
            (None, None) => {
                kube::Config::infer().await.map_err(|e| ClusterError::Api(e.to_string()))?
            }
        };

        kube_config.connect_timeout = Some(config.connect_timeout());
        kube_config.read_timeout = Some(config.request_timeout());

        debug!(cluster_url = %kube_config.cluster_url, "Creating Kubernetes client");
        let client =
            Client::try_from(kube_config).map_err(|e| ClusterError::Api(e.to_string()))?;
        Ok(Self::new(client))
    }

    fn api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = api_resource(kind);
        match namespace {
            Some(ns) if kind.namespaced() => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn map_kube_error(
    error: kube::Error,
    kind: ResourceKind,
    namespace: Option<&str>,
    name: Option<&str>,
) -> ClusterError {
    match error {
        kube::Error::Api(response) if response.code == 404 => match name {
            Some(name) => ClusterError::NotFound {
                kind,
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            },
            None if kind.is_custom() => ClusterError::NotInstalled { kind },
            None => ClusterError::Api(response.message),
        },
        kube::Error::Api(response) if response.code == 403 => {
            ClusterError::Forbidden { kind, message: response.message }
        }
        kube::Error::SerdeError(e) => ClusterError::Decode { kind, message: e.to_string() },
        other => ClusterError::Api(other.to_string()),
    }
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let list = self
            .api(kind, namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| map_kube_error(e, kind, namespace, None))?;
        debug!(count = list.items.len(), "Listed objects");
        Ok(list.items)
    }

    #[instrument(skip(self, kind), fields(kind = %kind))]
    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        self.api(kind, namespace)
            .get(name)
            .await
            .map_err(|e| map_kube_error(e, kind, namespace, Some(name)))
    }

    async fn exists(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        let found = self
            .api(kind, namespace)
            .get_metadata_opt(name)
            .await
            .map_err(|e| map_kube_error(e, kind, namespace, Some(name)))?;
        Ok(found.is_some())
    }

    async fn is_installed(&self, kind: ResourceKind) -> Result<bool, ClusterError> {
        match self.api(kind, None).list_metadata(&ListParams::default().limit(1)).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 404 => Ok(false),
            Err(e) => Err(map_kube_error(e, kind, None, None)),
        }
    }

    #[instrument(skip(self))]
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        tail_lines: i64,
    ) -> Result<String, ClusterError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: container.map(str::to_string),
            tail_lines: Some(tail_lines),
            ..Default::default()
        };
        pods.logs(pod, &params)
            .await
            .map_err(|e| map_kube_error(e, ResourceKind::Pod, Some(namespace), Some(pod)))
    }
}
