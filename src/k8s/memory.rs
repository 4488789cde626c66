//! In-memory cluster
//!
//! Serves objects loaded from manifests (offline `analyze` command) or built in tests. CRD-backed
//! kinds only answer list calls once installed, mirroring a real API server without the CRD.

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::k8s::client::{ClusterError, ClusterReader};
use crate::k8s::resources::{Provider, ResourceKind};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("object is missing apiVersion or kind")]
    MissingTypeMeta,

    #[error("unsupported resource {api_version}/{kind}")]
    UnknownKind { api_version: String, kind: String },
}

type LogKey = (String, String, Option<String>);

#[derive(Debug, Clone)]
pub struct InMemoryCluster {
    objects: Vec<(ResourceKind, DynamicObject)>,
    installed: BTreeSet<ResourceKind>,
    logs: BTreeMap<LogKey, String>,
}

impl InMemoryCluster {
    /// An empty cluster with only the core API installed.
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            installed: ResourceKind::of_provider(Provider::Core).into_iter().collect(),
            logs: BTreeMap::new(),
        }
    }

    /// Mark every kind of a provider as installed, even with no objects.
    pub fn install_provider(&mut self, provider: Provider) {
        self.installed.extend(ResourceKind::of_provider(provider));
    }

    /// Insert one object given as JSON (`apiVersion`, `kind`, `metadata`, ...).
    pub fn insert_value(&mut self, value: Value) -> Result<(), ManifestError> {
        if value.get("kind").and_then(Value::as_str) == Some("List") {
            let items = value.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
            for item in items {
                self.insert_value(item)?;
            }
            return Ok(());
        }

        let api_version = value.get("apiVersion").and_then(Value::as_str);
        let kind_name = value.get("kind").and_then(Value::as_str);
        let (api_version, kind_name) = match (api_version, kind_name) {
            (Some(a), Some(k)) => (a.to_string(), k.to_string()),
            _ => return Err(ManifestError::MissingTypeMeta),
        };
        let kind = ResourceKind::from_api_version_kind(&api_version, &kind_name).ok_or(
            ManifestError::UnknownKind { api_version, kind: kind_name },
        )?;

        let mut object: DynamicObject = serde_json::from_value(value)?;
        if kind.namespaced() && object.metadata.namespace.is_none() {
            object.metadata.namespace = Some("default".to_string());
        }
        self.installed.insert(kind);
        self.objects.push((kind, object));
        Ok(())
    }

    /// Build a cluster from JSON objects.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self, ManifestError> {
        let mut cluster = Self::new();
        for value in values {
            cluster.insert_value(value)?;
        }
        Ok(cluster)
    }

    /// Load every document of a multi-document YAML string. Unsupported kinds are skipped and
    /// returned so callers can report them.
    pub fn load_yaml(&mut self, yaml: &str) -> Result<Vec<String>, ManifestError> {
        let mut skipped = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml) {
            let value = Value::deserialize(document)?;
            if value.is_null() {
                continue;
            }
            match self.insert_value(value) {
                Ok(()) => {}
                Err(ManifestError::UnknownKind { api_version, kind }) => {
                    skipped.push(format!("{}/{}", api_version, kind));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(skipped)
    }

    /// Load manifest files (`.yaml`, `.yml` or `.json`).
    pub fn load_files(&mut self, paths: &[PathBuf]) -> Result<Vec<String>, ManifestError> {
        let mut skipped = Vec::new();
        for path in paths {
            let contents = read_manifest(path)?;
            skipped.extend(self.load_yaml(&contents)?);
        }
        Ok(skipped)
    }

    /// Register log output for a pod container.
    pub fn set_pod_logs(
        &mut self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        logs: impl Into<String>,
    ) {
        self.logs.insert(
            (namespace.to_string(), pod.to_string(), container.map(str::to_string)),
            logs.into(),
        );
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn matching<'a>(
        &'a self,
        kind: ResourceKind,
        namespace: Option<&'a str>,
    ) -> impl Iterator<Item = &'a DynamicObject> + 'a {
        self.objects.iter().filter_map(move |(k, obj)| {
            let in_namespace = match namespace {
                Some(ns) if kind.namespaced() => obj.namespace().as_deref() == Some(ns),
                _ => true,
            };
            (*k == kind && in_namespace).then_some(obj)
        })
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn read_manifest(path: &Path) -> Result<String, ManifestError> {
    std::fs::read_to_string(path)
        .map_err(|source| ManifestError::Io { path: path.to_path_buf(), source })
}

#[async_trait]
impl ClusterReader for InMemoryCluster {
    async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        if !self.installed.contains(&kind) {
            return Err(ClusterError::NotInstalled { kind });
        }
        Ok(self.matching(kind, namespace).cloned().collect())
    }

    async fn get(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject, ClusterError> {
        if !self.installed.contains(&kind) {
            return Err(ClusterError::NotInstalled { kind });
        }
        self.matching(kind, namespace).find(|obj| obj.name_any() == name).cloned().ok_or_else(|| {
            ClusterError::NotFound {
                kind,
                namespace: namespace.map(str::to_string),
                name: name.to_string(),
            }
        })
    }

    async fn exists(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, ClusterError> {
        Ok(self.matching(kind, namespace).any(|obj| obj.name_any() == name))
    }

    async fn is_installed(&self, kind: ResourceKind) -> Result<bool, ClusterError> {
        Ok(self.installed.contains(&kind))
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        _tail_lines: i64,
    ) -> Result<String, ClusterError> {
        let exact = (namespace.to_string(), pod.to_string(), container.map(str::to_string));
        let any_container = (namespace.to_string(), pod.to_string(), None);
        self.logs.get(&exact).or_else(|| self.logs.get(&any_container)).cloned().ok_or_else(|| {
            ClusterError::NotFound {
                kind: ResourceKind::Pod,
                namespace: Some(namespace.to_string()),
                name: pod.to_string(),
            }
        })
    }
}
