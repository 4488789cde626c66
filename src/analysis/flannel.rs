//! Flannel health: `kube-flannel-cfg`, the DaemonSet, and node pod CIDRs.

use ipnet::IpNet;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use super::find_named;
use crate::findings::{Category, Finding};
use crate::k8s::fields::{i64_at, str_at, ObjectExt};
use crate::k8s::ResourceKind;

pub const NAMESPACES: [&str; 2] = ["kube-flannel", "kube-system"];
pub const CONFIG_MAP: &str = "kube-flannel-cfg";
pub const DAEMON_SET: &str = "kube-flannel-ds";
const NET_CONF_KEY: &str = "net-conf.json";
const PUBLIC_IP_ANNOTATION: &str = "flannel.alpha.coreos.com/public-ip";

#[derive(Debug, Default)]
pub struct FlannelSnapshot {
    pub config_maps: Vec<DynamicObject>,
    pub daemon_sets: Vec<DynamicObject>,
    pub nodes: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetConf {
    network: Option<String>,
    #[serde(default)]
    backend: BackendConf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BackendConf {
    #[serde(rename = "Type")]
    backend_type: Option<String>,
}

/// What was learned from the flannel configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlannelSummary {
    pub config_namespace: Option<String>,
    pub network: Option<String>,
    pub backend: Option<String>,
    pub nodes: usize,
}

pub fn check(snapshot: &FlannelSnapshot) -> (Vec<Finding>, FlannelSummary) {
    let mut findings = Vec::new();
    let mut summary = FlannelSummary {
        nodes: snapshot.nodes.len(),
        ..Default::default()
    };

    let config = NAMESPACES
        .iter()
        .find_map(|ns| find_named(&snapshot.config_maps, Some(*ns), CONFIG_MAP));
    let network = match config {
        None => {
            findings.push(
                Finding::critical(
                    Category::Cni,
                    format!("ConfigMap {} not found in {}", CONFIG_MAP, NAMESPACES.join(" or ")),
                )
                .suggestion("Reapply the flannel manifest for your cluster version"),
            );
            None
        }
        Some(config_map) => {
            summary.config_namespace = config_map.namespace();
            parse_net_conf(config_map, &mut summary, &mut findings)
        }
    };

    check_daemon_set(snapshot, &mut findings);
    check_nodes(snapshot, network, &mut findings);
    (findings, summary)
}

fn parse_net_conf(
    config_map: &DynamicObject,
    summary: &mut FlannelSummary,
    findings: &mut Vec<Finding>,
) -> Option<IpNet> {
    let Some(raw) = str_at(&config_map.data, &["data", NET_CONF_KEY]) else {
        findings.push(
            Finding::critical(Category::Cni, format!("{} has no {} key", CONFIG_MAP, NET_CONF_KEY))
                .on(ResourceKind::ConfigMap, config_map),
        );
        return None;
    };

    let conf: NetConf = match serde_json::from_str(raw) {
        Ok(conf) => conf,
        Err(e) => {
            findings.push(
                Finding::critical(Category::Cni, format!("{} is not valid JSON", NET_CONF_KEY))
                    .on(ResourceKind::ConfigMap, config_map)
                    .detail(e.to_string()),
            );
            return None;
        }
    };

    summary.network = conf.network.clone();
    summary.backend = conf.backend.backend_type.clone();

    if conf.backend.backend_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("udp")) {
        findings.push(
            Finding::warning(Category::Cni, "Flannel uses the deprecated udp backend")
                .on(ResourceKind::ConfigMap, config_map)
                .suggestion("Switch Backend.Type to vxlan or host-gw"),
        );
    }

    match conf.network.as_deref().map(str::parse::<IpNet>) {
        Some(Ok(net)) => Some(net),
        Some(Err(_)) | None => {
            findings.push(
                Finding::critical(
                    Category::Cni,
                    format!("{} has no parseable Network CIDR", NET_CONF_KEY),
                )
                .on(ResourceKind::ConfigMap, config_map)
                .detail(format!("Network: {}", conf.network.as_deref().unwrap_or("<missing>"))),
            );
            None
        }
    }
}

fn check_daemon_set(snapshot: &FlannelSnapshot, findings: &mut Vec<Finding>) {
    let daemon_set = NAMESPACES
        .iter()
        .find_map(|ns| find_named(&snapshot.daemon_sets, Some(*ns), DAEMON_SET));
    let Some(daemon_set) = daemon_set else {
        findings.push(Finding::warning(
            Category::Cni,
            format!("DaemonSet {} not found in {}", DAEMON_SET, NAMESPACES.join(" or ")),
        ));
        return;
    };

    let desired = i64_at(daemon_set.status(), &["desiredNumberScheduled"]).unwrap_or_default();
    let ready = i64_at(daemon_set.status(), &["numberReady"]).unwrap_or_default();
    if ready < desired {
        findings.push(
            Finding::warning(
                Category::Cni,
                format!("DaemonSet {} has {}/{} pods ready", DAEMON_SET, ready, desired),
            )
            .on(ResourceKind::DaemonSet, daemon_set)
            .suggestion("Inspect the logs of the kube-flannel pods that are not ready"),
        );
    }
}

fn check_nodes(snapshot: &FlannelSnapshot, network: Option<IpNet>, findings: &mut Vec<Finding>) {
    for node in &snapshot.nodes {
        let name = node.name_any();
        match str_at(node.spec(), &["podCIDR"]) {
            None => findings.push(
                Finding::warning(Category::Cni, format!("Node {} has no podCIDR", name))
                    .on(ResourceKind::Node, node)
                    .suggestion("Enable --allocate-node-cidrs on the controller manager"),
            ),
            Some(cidr) => {
                if let (Some(network), Ok(pod_cidr)) = (network, cidr.parse::<IpNet>()) {
                    if !network.contains(&pod_cidr) {
                        findings.push(
                            Finding::critical(
                                Category::Cni,
                                format!("Node {} podCIDR {} is outside the flannel network {}", name, cidr, network),
                            )
                            .on(ResourceKind::Node, node)
                            .suggestion("Align --cluster-cidr with the Network in net-conf.json"),
                        );
                    }
                }
            }
        }

        if node.annotation(PUBLIC_IP_ANNOTATION).is_none() {
            findings.push(
                Finding::warning(
                    Category::Cni,
                    format!("Node {} has no {} annotation", name, PUBLIC_IP_ANNOTATION),
                )
                .on(ResourceKind::Node, node)
                .detail("flanneld has not registered this node"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::obj;
    use crate::findings::Severity;
    use serde_json::json;

    fn config_map(net_conf: &str) -> DynamicObject {
        obj(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "kube-flannel-cfg", "namespace": "kube-flannel"},
            "data": {"net-conf.json": net_conf}
        }))
    }

    fn daemon_set(ready: i64, desired: i64) -> DynamicObject {
        obj(json!({
            "apiVersion": "apps/v1",
            "kind": "DaemonSet",
            "metadata": {"name": "kube-flannel-ds", "namespace": "kube-flannel"},
            "status": {"numberReady": ready, "desiredNumberScheduled": desired}
        }))
    }

    fn node(name: &str, pod_cidr: Option<&str>) -> DynamicObject {
        let mut node = json!({
            "apiVersion": "v1",
            "kind": "Node",
            "metadata": {"name": name, "annotations": {"flannel.alpha.coreos.com/public-ip": "192.168.1.10"}},
            "spec": {}
        });
        if let Some(cidr) = pod_cidr {
            node["spec"]["podCIDR"] = json!(cidr);
        }
        obj(node)
    }

    #[test]
    fn test_healthy_flannel() {
        let (findings, summary) = check(&FlannelSnapshot {
            config_maps: vec![config_map(r#"{"Network": "10.244.0.0/16", "Backend": {"Type": "vxlan"}}"#)],
            daemon_sets: vec![daemon_set(3, 3)],
            nodes: vec![node("worker-1", Some("10.244.1.0/24"))],
        });
        assert!(findings.is_empty(), "{:?}", findings);
        assert_eq!(summary.network.as_deref(), Some("10.244.0.0/16"));
        assert_eq!(summary.backend.as_deref(), Some("vxlan"));
        assert_eq!(summary.config_namespace.as_deref(), Some("kube-flannel"));
    }

    #[test]
    fn test_missing_config_and_daemon_set() {
        let (findings, _) = check(&FlannelSnapshot::default());
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[1].severity, Severity::Warning);
    }

    #[test]
    fn test_invalid_net_conf() {
        let (findings, _) = check(&FlannelSnapshot {
            config_maps: vec![config_map("{not json")],
            daemon_sets: vec![daemon_set(1, 1)],
            nodes: vec![],
        });
        assert_eq!(findings.len(), 1);
        assert!(findings[0].summary.contains("not valid JSON"));
    }

    #[test]
    fn test_udp_backend_and_degraded_daemon_set() {
        let (findings, _) = check(&FlannelSnapshot {
            config_maps: vec![config_map(r#"{"Network": "10.244.0.0/16", "Backend": {"Type": "udp"}}"#)],
            daemon_sets: vec![daemon_set(2, 3)],
            nodes: vec![],
        });
        let summaries: Vec<&str> = findings.iter().map(|f| f.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec!["Flannel uses the deprecated udp backend", "DaemonSet kube-flannel-ds has 2/3 pods ready"]
        );
    }

    #[test]
    fn test_node_checks() {
        let mut unregistered = node("worker-3", Some("10.244.3.0/24"));
        unregistered.metadata.annotations = None;
        let (findings, _) = check(&FlannelSnapshot {
            config_maps: vec![config_map(r#"{"Network": "10.244.0.0/16", "Backend": {"Type": "vxlan"}}"#)],
            daemon_sets: vec![daemon_set(3, 3)],
            nodes: vec![node("worker-1", Some("10.96.0.0/24")), node("worker-2", None), unregistered],
        });
        assert_eq!(findings.len(), 3);
        assert!(findings.iter().any(|f| f.severity == Severity::Critical && f.summary.contains("outside the flannel network")));
        assert!(findings.iter().any(|f| f.summary == "Node worker-2 has no podCIDR"));
        assert!(findings.iter().any(|f| f.summary.contains("worker-3 has no flannel.alpha.coreos.com/public-ip")));
    }
}
