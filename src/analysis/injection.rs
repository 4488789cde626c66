//! Sidecar injection coverage for Istio and Linkerd.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{container_names, in_namespace, pod_is_terminated};
use crate::findings::{Category, Finding};
use crate::k8s::fields::ObjectExt;
use crate::k8s::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mesh {
    Istio,
    Linkerd,
}

impl Mesh {
    fn proxy_container(&self) -> &'static str {
        match self {
            Mesh::Istio => "istio-proxy",
            Mesh::Linkerd => "linkerd-proxy",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Mesh::Istio => "Istio",
            Mesh::Linkerd => "Linkerd",
        }
    }

    /// Namespace-level opt-in.
    fn enabled_for(&self, namespace: &DynamicObject) -> bool {
        match self {
            Mesh::Istio => {
                let labels = namespace.labels();
                labels.get("istio-injection").map(String::as_str) == Some("enabled")
                    || labels.contains_key("istio.io/rev")
            }
            Mesh::Linkerd => namespace.annotation("linkerd.io/inject") == Some("enabled"),
        }
    }

    /// Pod-level opt-out, as label or annotation.
    fn opted_out(&self, pod: &DynamicObject) -> bool {
        let (key, value) = match self {
            Mesh::Istio => ("sidecar.istio.io/inject", "false"),
            Mesh::Linkerd => ("linkerd.io/inject", "disabled"),
        };
        pod.labels().get(key).map(String::as_str) == Some(value) || pod.annotation(key) == Some(value)
    }
}

#[derive(Debug, Default)]
pub struct InjectionSnapshot {
    pub namespaces: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

/// Injection coverage of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceInjection {
    pub mesh: Mesh,
    pub pods: usize,
    pub injected: usize,
    pub opted_out: usize,
}

pub fn check(snapshot: &InjectionSnapshot) -> (Vec<Finding>, BTreeMap<String, Vec<NamespaceInjection>>) {
    let mut findings = Vec::new();
    let mut coverage: BTreeMap<String, Vec<NamespaceInjection>> = BTreeMap::new();

    for namespace in &snapshot.namespaces {
        let ns_name = namespace.name_any();
        for mesh in [Mesh::Istio, Mesh::Linkerd] {
            if !mesh.enabled_for(namespace) {
                continue;
            }
            let mut row = NamespaceInjection { mesh, pods: 0, injected: 0, opted_out: 0 };
            let mut missing = Vec::new();

            for pod in in_namespace(&snapshot.pods, Some(ns_name.as_str())).filter(|p| !pod_is_terminated(p)) {
                row.pods += 1;
                if mesh.opted_out(pod) {
                    row.opted_out += 1;
                    findings.push(
                        Finding::info(
                            Category::Mesh,
                            format!("Pod {}/{} opts out of {} injection", ns_name, pod.name_any(), mesh.name()),
                        )
                        .on(ResourceKind::Pod, pod),
                    );
                } else if container_names(pod).contains(&mesh.proxy_container()) {
                    row.injected += 1;
                } else {
                    missing.push(pod);
                }
            }

            for pod in missing {
                findings.push(
                    Finding::warning(
                        Category::Mesh,
                        format!(
                            "Pod {}/{} has no {} container although {} injection is enabled",
                            ns_name,
                            pod.name_any(),
                            mesh.proxy_container(),
                            mesh.name()
                        ),
                    )
                    .on(ResourceKind::Pod, pod)
                    .detail("Pods created before injection was enabled keep running without the proxy")
                    .suggestion("Restart the owning workload (kubectl rollout restart)"),
                );
            }
            coverage.entry(ns_name.clone()).or_default().push(row);
        }
    }

    (findings, coverage)
}
