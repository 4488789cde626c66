//! Networking stack detection.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;

use crate::findings::{Category, Finding};
use crate::k8s::fields::{i64_at, ObjectExt};
use crate::k8s::{Provider, ResourceKind};

/// DaemonSet name → CNI plugin.
pub const CNI_DAEMONSETS: [(&str, &str); 7] = [
    ("calico-node", "calico"),
    ("kube-flannel-ds", "flannel"),
    ("cilium", "cilium"),
    ("weave-net", "weave"),
    ("aws-node", "aws-vpc-cni"),
    ("antrea-agent", "antrea"),
    ("kube-router", "kube-router"),
];

/// Deployment name → control plane, with the provider whose CRDs it serves.
pub const CONTROL_PLANES: [(&str, &str, Provider); 4] = [
    ("istiod", "istio", Provider::Istio),
    ("linkerd-destination", "linkerd", Provider::Linkerd),
    ("kuma-control-plane", "kuma", Provider::Kuma),
    ("kgateway", "kgateway", Provider::Kgateway),
];

#[derive(Debug, Default)]
pub struct StackSnapshot {
    pub installed: Vec<Provider>,
    pub daemon_sets: Vec<DynamicObject>,
    pub deployments: Vec<DynamicObject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    pub workload: String,
    pub namespace: String,
    pub ready: i64,
    pub desired: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingStack {
    pub crds: Vec<Provider>,
    pub cni: Vec<Component>,
    pub control_planes: Vec<Component>,
}

pub fn detect(snapshot: &StackSnapshot) -> (NetworkingStack, Vec<Finding>) {
    let mut findings = Vec::new();
    let mut stack = NetworkingStack {
        crds: snapshot.installed.iter().copied().filter(|p| *p != Provider::Core).collect(),
        ..Default::default()
    };

    for daemon_set in &snapshot.daemon_sets {
        let workload = daemon_set.name_any();
        if let Some((_, plugin)) = CNI_DAEMONSETS.iter().find(|(name, _)| *name == workload) {
            let component = Component {
                name: plugin.to_string(),
                workload,
                namespace: daemon_set.namespace_or_default(),
                ready: i64_at(daemon_set.status(), &["numberReady"]).unwrap_or_default(),
                desired: i64_at(daemon_set.status(), &["desiredNumberScheduled"]).unwrap_or_default(),
            };
            if component.ready < component.desired {
                findings.push(
                    Finding::warning(
                        Category::Cni,
                        format!(
                            "CNI {} DaemonSet {}/{} has {}/{} pods ready",
                            component.name, component.namespace, component.workload, component.ready, component.desired
                        ),
                    )
                    .on(ResourceKind::DaemonSet, daemon_set),
                );
            }
            stack.cni.push(component);
        }
    }

    for deployment in &snapshot.deployments {
        let workload = deployment.name_any();
        if let Some((_, plane, _)) = CONTROL_PLANES.iter().find(|(name, _, _)| *name == workload) {
            let component = Component {
                name: plane.to_string(),
                workload,
                namespace: deployment.namespace_or_default(),
                ready: i64_at(deployment.status(), &["readyReplicas"]).unwrap_or_default(),
                desired: i64_at(deployment.spec(), &["replicas"]).unwrap_or(1),
            };
            if component.ready < component.desired.max(1) {
                findings.push(
                    Finding::warning(
                        Category::Mesh,
                        format!(
                            "Control plane {}/{} has {}/{} replicas ready",
                            component.namespace, component.workload, component.ready, component.desired
                        ),
                    )
                    .on(ResourceKind::Deployment, deployment),
                );
            }
            stack.control_planes.push(component);
        }
    }

    if stack.cni.is_empty() {
        findings.push(
            Finding::info(Category::Cni, "No known CNI DaemonSet detected")
                .detail("The cluster may use a managed or unlisted CNI plugin"),
        );
    }

    for (workload, plane, provider) in CONTROL_PLANES {
        if stack.crds.contains(&provider) && !stack.control_planes.iter().any(|c| c.name == plane) {
            findings.push(
                Finding::warning(
                    Category::Configuration,
                    format!("{} CRDs are installed but no {} Deployment was found", provider, workload),
                )
                .suggestion("The CRDs may be left over from an uninstall, or the control plane runs elsewhere"),
            );
        }
    }

    (stack, findings)
}
