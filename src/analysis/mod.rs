//! # Analyses
//!
//! Pure functions from in-memory object lists to [`Finding`](crate::findings::Finding)s. Tools
//! fetch what an analysis needs from the cluster and hand it over in a snapshot struct; nothing
//! here performs I/O.

pub mod calico;
pub mod flannel;
pub mod gateway_api;
pub mod injection;
pub mod istio_config;
pub mod istio_routing;
pub mod kgateway;
pub mod kuma;
pub mod linkerd;
pub mod logs;
pub mod network_policy;
pub mod services;
pub mod stack;

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde_json::Value;

use crate::k8s::fields::{array_at, str_at, ObjectExt};
use crate::k8s::selectors::{map_matches, LabelSelector, Labels};

pub const CLUSTER_DOMAIN: &str = "svc.cluster.local";

/// Objects in `namespace` (all objects when the kind is cluster-scoped or `namespace` is None).
pub fn in_namespace<'a, 'n>(
    objects: &'a [DynamicObject],
    namespace: Option<&'n str>,
) -> impl Iterator<Item = &'a DynamicObject> + 'n
where
    'a: 'n,
{
    objects.iter().filter(move |obj| match namespace {
        Some(ns) => obj.namespace().as_deref() == Some(ns),
        None => true,
    })
}

pub fn find_named<'a>(
    objects: &'a [DynamicObject],
    namespace: Option<&str>,
    name: &str,
) -> Option<&'a DynamicObject> {
    objects.iter().find(|obj| {
        obj.name_any() == name && namespace.is_none_or(|ns| obj.namespace().as_deref() == Some(ns))
    })
}

/// Pods in `namespace` whose labels satisfy a map selector.
pub fn pods_selected_by<'a, 'n>(
    pods: &'a [DynamicObject],
    namespace: &'n str,
    selector: &'n Labels,
) -> impl Iterator<Item = &'a DynamicObject> + 'n
where
    'a: 'n,
{
    in_namespace(pods, Some(namespace)).filter(move |pod| map_matches(selector, pod.labels()))
}

/// Pods in `namespace` matching a `LabelSelector`.
pub fn pods_matching<'a, 'n>(
    pods: &'a [DynamicObject],
    namespace: &'n str,
    selector: &'n LabelSelector,
) -> impl Iterator<Item = &'a DynamicObject> + 'n
where
    'a: 'n,
{
    in_namespace(pods, Some(namespace)).filter(move |pod| selector.matches(pod.labels()))
}

/// `Ready` condition of a pod.
pub fn pod_is_ready(pod: &DynamicObject) -> bool {
    pod.status_conditions().iter().any(|c| c.type_ == "Ready" && c.status == "True")
}

/// Pods that finished (Succeeded/Failed) take no traffic and are skipped by most checks.
pub fn pod_is_terminated(pod: &DynamicObject) -> bool {
    matches!(str_at(pod.status(), &["phase"]), Some("Succeeded") | Some("Failed"))
}

/// A declared container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPort {
    pub container: String,
    pub name: Option<String>,
    pub port: i64,
    pub protocol: String,
}

pub fn container_ports(pod: &DynamicObject) -> Vec<ContainerPort> {
    array_at(pod.spec(), &["containers"])
        .iter()
        .flat_map(|container| {
            let container_name = str_at(container, &["name"]).unwrap_or_default().to_string();
            array_at(container, &["ports"]).iter().filter_map(move |port| {
                Some(ContainerPort {
                    container: container_name.clone(),
                    name: str_at(port, &["name"]).map(str::to_string),
                    port: port.get("containerPort")?.as_i64()?,
                    protocol: str_at(port, &["protocol"]).unwrap_or("TCP").to_string(),
                })
            })
        })
        .collect()
}

/// Names of regular and init containers (native sidecars run as init containers).
pub fn container_names(pod: &DynamicObject) -> Vec<&str> {
    ["containers", "initContainers"]
        .iter()
        .flat_map(|key| array_at(pod.spec(), &[*key]))
        .filter_map(|c| str_at(c, &["name"]))
        .collect()
}

/// A Service port's `targetPort`, which may be a number or a named pod port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    Number(i64),
    Name(String),
}

impl TargetPort {
    /// `targetPort` of a Service port entry; defaults to `port`.
    pub fn of(service_port: &Value) -> Option<TargetPort> {
        match service_port.get("targetPort") {
            Some(Value::Number(n)) => n.as_i64().map(TargetPort::Number),
            Some(Value::String(s)) => match s.parse::<i64>() {
                Ok(n) => Some(TargetPort::Number(n)),
                Err(_) => Some(TargetPort::Name(s.clone())),
            },
            _ => service_port.get("port").and_then(Value::as_i64).map(TargetPort::Number),
        }
    }

    pub fn is_declared_by(&self, ports: &[ContainerPort]) -> bool {
        match self {
            TargetPort::Number(n) => ports.iter().any(|p| p.port == *n),
            TargetPort::Name(name) => ports.iter().any(|p| p.name.as_deref() == Some(name)),
        }
    }
}

impl std::fmt::Display for TargetPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetPort::Number(n) => write!(f, "{}", n),
            TargetPort::Name(name) => f.write_str(name),
        }
    }
}

/// `k=v,k2=v2` rendering of a label map for messages.
pub fn format_labels(labels: &Labels) -> String {
    labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect::<Vec<_>>().join(",")
}

/// Expand a short mesh host to its cluster FQDN relative to `namespace`, the way Istio does:
/// `reviews` → `reviews.ns.svc.cluster.local`. Hosts with a dot (`reviews.other`,
/// `api.example.com`) and wildcards are returned unchanged.
pub fn fqdn(host: &str, namespace: &str) -> String {
    let host = host.trim_end_matches('.');
    if host.starts_with('*') || host.contains('.') {
        return host.to_string();
    }
    format!("{}.{}.{}", host, namespace, CLUSTER_DOMAIN)
}

/// `(namespace, name)` of the in-cluster Service an FQDN names, if it is one.
pub fn service_of_fqdn(fqdn: &str) -> Option<(&str, &str)> {
    let prefix = fqdn.strip_suffix(CLUSTER_DOMAIN)?.strip_suffix('.')?;
    let (name, namespace) = prefix.split_once('.')?;
    (!namespace.contains('.')).then_some((namespace, name))
}

/// DNS host matching with a single leading `*` wildcard on either side.
pub fn hosts_intersect(a: &str, b: &str) -> bool {
    if a == "*" || b == "*" || a.eq_ignore_ascii_case(b) {
        return true;
    }
    match (a.strip_prefix('*'), b.strip_prefix('*')) {
        (Some(a_suffix), Some(b_suffix)) => a_suffix.ends_with(b_suffix) || b_suffix.ends_with(a_suffix),
        (Some(suffix), None) => b.len() > suffix.len() && b.ends_with(suffix),
        (None, Some(suffix)) => a.len() > suffix.len() && a.ends_with(suffix),
        (None, None) => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fqdn_expansion() {
        assert_eq!(fqdn("reviews", "bookinfo"), "reviews.bookinfo.svc.cluster.local");
        assert_eq!(fqdn("reviews.other", "bookinfo"), "reviews.other");
        assert_eq!(fqdn("reviews.other.svc", "bookinfo"), "reviews.other.svc");
        assert_eq!(
            fqdn("reviews.other.svc.cluster.local.", "bookinfo"),
            "reviews.other.svc.cluster.local"
        );
        assert_eq!(fqdn("api.example.com", "bookinfo"), "api.example.com");
        assert_eq!(fqdn("*.example.com", "bookinfo"), "*.example.com");
    }

    #[test]
    fn test_service_of_fqdn() {
        assert_eq!(service_of_fqdn("reviews.bookinfo.svc.cluster.local"), Some(("bookinfo", "reviews")));
        assert_eq!(service_of_fqdn("api.example.com"), None);
    }

    #[test]
    fn test_hosts_intersect() {
        assert!(hosts_intersect("*.example.com", "shop.example.com"));
        assert!(hosts_intersect("shop.example.com", "*.example.com"));
        assert!(hosts_intersect("*.example.com", "*.shop.example.com"));
        assert!(!hosts_intersect("*.example.com", "example.com"));
        assert!(!hosts_intersect("a.example.com", "b.example.com"));
    }

    #[test]
    fn test_target_port_parsing() {
        assert_eq!(TargetPort::of(&json!({"port": 80})), Some(TargetPort::Number(80)));
        assert_eq!(
            TargetPort::of(&json!({"port": 80, "targetPort": "http"})),
            Some(TargetPort::Name("http".to_string()))
        );
        assert_eq!(TargetPort::of(&json!({"port": 80, "targetPort": 8080})), Some(TargetPort::Number(8080)));
    }

    #[test]
    fn test_container_ports_and_readiness() {
        let pod = fixtures::pod("shop", "web-1", json!({"app": "web"}), true);
        let ports = container_ports(&pod);
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port, 9080);
        assert!(pod_is_ready(&pod));
        assert!(!pod_is_terminated(&pod));
        assert_eq!(container_names(&pod), vec!["app"]);
    }
}
