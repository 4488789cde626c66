//! Service → endpoint health.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;

use super::{container_ports, format_labels, pod_is_ready, pod_is_terminated, pods_selected_by, TargetPort};
use crate::findings::{Category, Finding};
use crate::k8s::fields::{array_at, i64_at, str_at, string_map_at, ObjectExt};
use crate::k8s::ResourceKind;

#[derive(Debug, Default)]
pub struct ServiceSnapshot {
    pub services: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

/// One row of the per-service summary returned alongside the findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoints {
    pub namespace: String,
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub selected_pods: usize,
    pub ready_pods: usize,
}

pub fn check_endpoints(snapshot: &ServiceSnapshot) -> (Vec<Finding>, Vec<ServiceEndpoints>) {
    let mut findings = Vec::new();
    let mut rows = Vec::new();

    for service in &snapshot.services {
        let namespace = service.namespace_or_default();
        let name = service.name_any();
        let service_type = str_at(service.spec(), &["type"]).unwrap_or("ClusterIP").to_string();
        if service_type == "ExternalName" {
            continue;
        }

        let selector = string_map_at(service.spec(), &["selector"]);
        if selector.is_empty() {
            findings.push(
                Finding::info(
                    Category::Connectivity,
                    format!("Service {}/{} has no selector", namespace, name),
                )
                .on(ResourceKind::Service, service)
                .detail("Endpoints for selector-less Services are managed manually"),
            );
            rows.push(ServiceEndpoints {
                namespace,
                name,
                service_type,
                selected_pods: 0,
                ready_pods: 0,
            });
            continue;
        }

        let selected: Vec<&DynamicObject> = pods_selected_by(&snapshot.pods, &namespace, &selector)
            .filter(|pod| !pod_is_terminated(pod))
            .collect();
        let ready: Vec<&DynamicObject> = selected.iter().copied().filter(|p| pod_is_ready(p)).collect();

        if selected.is_empty() {
            findings.push(
                Finding::critical(
                    Category::Connectivity,
                    format!("Service {}/{} selector matches no pods", namespace, name),
                )
                .on(ResourceKind::Service, service)
                .detail(format!("selector: {}", format_labels(&selector)))
                .suggestion("Compare the Service selector with the pod template labels of the workload"),
            );
        } else if ready.is_empty() {
            findings.push(
                Finding::critical(
                    Category::Connectivity,
                    format!(
                        "Service {}/{} has no ready endpoints ({} pod(s) selected, none Ready)",
                        namespace,
                        name,
                        selected.len()
                    ),
                )
                .on(ResourceKind::Service, service)
                .suggestion("Check readiness probes and pod events of the selected pods"),
            );
        }

        if !selected.is_empty() {
            check_target_ports(service, &namespace, &name, &selected, &mut findings);
        }

        if service_type == "LoadBalancer"
            && array_at(service.status(), &["loadBalancer", "ingress"]).is_empty()
        {
            findings.push(
                Finding::warning(
                    Category::Connectivity,
                    format!("LoadBalancer Service {}/{} has no external address", namespace, name),
                )
                .on(ResourceKind::Service, service)
                .suggestion("Check the cloud load balancer controller and Service events"),
            );
        }

        rows.push(ServiceEndpoints {
            namespace,
            name,
            service_type,
            selected_pods: selected.len(),
            ready_pods: ready.len(),
        });
    }

    (findings, rows)
}

fn check_target_ports(
    service: &DynamicObject,
    namespace: &str,
    name: &str,
    selected: &[&DynamicObject],
    findings: &mut Vec<Finding>,
) {
    let declared: Vec<_> = selected.iter().flat_map(|pod| container_ports(pod)).collect();

    for port in array_at(service.spec(), &["ports"]) {
        let Some(target) = TargetPort::of(port) else {
            continue;
        };
        if target.is_declared_by(&declared) {
            continue;
        }
        let service_port = i64_at(port, &["port"]).unwrap_or_default();
        match target {
            TargetPort::Number(number) => findings.push(
                Finding::warning(
                    Category::Connectivity,
                    format!(
                        "Service {}/{} port {} targets {} which no selected container declares",
                        namespace, name, service_port, number
                    ),
                )
                .on(ResourceKind::Service, service)
                .detail("Undeclared ports still receive traffic if the process listens on them")
                .suggestion("Verify the container listens on the target port"),
            ),
            TargetPort::Name(port_name) => findings.push(
                Finding::critical(
                    Category::Connectivity,
                    format!(
                        "Service {}/{} port {} targets named port '{}' which no selected pod defines",
                        namespace, name, service_port, port_name
                    ),
                )
                .on(ResourceKind::Service, service)
                .suggestion("Name the container port or use a numeric targetPort"),
            ),
        }
    }
}
