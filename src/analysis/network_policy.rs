//! Kubernetes NetworkPolicy analysis.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{in_namespace, pod_is_terminated};
use crate::findings::{Category, Finding};
use crate::k8s::fields::ObjectExt;
use crate::k8s::selectors::LabelSelector;
use crate::k8s::ResourceKind;

#[derive(Debug, Default)]
pub struct NetworkPolicySnapshot {
    pub policies: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
    pub namespaces: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetworkPolicySpec {
    #[serde(default)]
    pod_selector: LabelSelector,
    #[serde(default)]
    policy_types: Vec<String>,
    ingress: Option<Vec<IngressRule>>,
    egress: Option<Vec<EgressRule>>,
}

#[derive(Debug, Default, Deserialize)]
struct IngressRule {
    #[serde(default)]
    from: Vec<Peer>,
}

#[derive(Debug, Default, Deserialize)]
struct EgressRule {
    #[serde(default)]
    to: Vec<Peer>,
    #[serde(default)]
    ports: Vec<PolicyPort>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Peer {
    namespace_selector: Option<LabelSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyPort {
    port: Option<Value>,
    end_port: Option<i64>,
}

impl PolicyPort {
    fn allows_dns(&self) -> bool {
        match &self.port {
            None => true,
            Some(Value::Number(n)) => {
                let start = n.as_i64().unwrap_or_default();
                start == 53 || (start < 53 && self.end_port.is_some_and(|end| end >= 53))
            }
            Some(Value::String(name)) => name == "53" || name.starts_with("dns"),
            Some(_) => false,
        }
    }
}

impl NetworkPolicySpec {
    fn allows_dns(&self) -> bool {
        self.egress.iter().flatten().any(|rule| {
            rule.ports.is_empty() || rule.ports.iter().any(PolicyPort::allows_dns)
        })
    }

    /// Declared policy types, defaulting the way the API server does.
    fn types(&self) -> (bool, bool) {
        if self.policy_types.is_empty() {
            (true, self.egress.is_some())
        } else {
            (
                self.policy_types.iter().any(|t| t == "Ingress"),
                self.policy_types.iter().any(|t| t == "Egress"),
            )
        }
    }
}

/// Default-deny state of one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespacePolicyState {
    pub policies: usize,
    pub default_deny_ingress: bool,
    pub default_deny_egress: bool,
}

pub fn namespace_states(policies: &[DynamicObject]) -> BTreeMap<String, NamespacePolicyState> {
    let mut states: BTreeMap<String, NamespacePolicyState> = BTreeMap::new();
    for policy in policies {
        let spec: NetworkPolicySpec = policy.spec_as();
        let state = states.entry(policy.namespace_or_default()).or_default();
        state.policies += 1;
        if spec.pod_selector.is_empty() {
            let (ingress, egress) = spec.types();
            state.default_deny_ingress |= ingress && spec.ingress.as_ref().is_none_or(Vec::is_empty);
            state.default_deny_egress |= egress && spec.egress.as_ref().is_none_or(Vec::is_empty);
        }
    }
    states
}

/// Pod selectors of the Egress policies that admit DNS, per namespace. Policies are additive, so
/// a pod can resolve names when any of these selects it.
fn dns_selectors(policies: &[DynamicObject]) -> BTreeMap<String, Vec<LabelSelector>> {
    let mut selectors: BTreeMap<String, Vec<LabelSelector>> = BTreeMap::new();
    for policy in policies {
        let spec: NetworkPolicySpec = policy.spec_as();
        if spec.types().1 && spec.allows_dns() {
            selectors.entry(policy.namespace_or_default()).or_default().push(spec.pod_selector);
        }
    }
    selectors
}

pub fn analyze(snapshot: &NetworkPolicySnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    let dns_selectors = dns_selectors(&snapshot.policies);

    for (namespace, state) in namespace_states(&snapshot.policies) {
        if state.default_deny_ingress || state.default_deny_egress {
            let directions = match (state.default_deny_ingress, state.default_deny_egress) {
                (true, true) => "ingress and egress",
                (true, false) => "ingress",
                _ => "egress",
            };
            findings.push(Finding::info(
                Category::Policy,
                format!("Namespace {} has a default-deny {} policy", namespace, directions),
            ));
        }
    }

    for policy in &snapshot.policies {
        let spec: NetworkPolicySpec = policy.spec_as();
        let namespace = policy.namespace_or_default();
        let name = policy.name_any();

        if !spec.pod_selector.is_empty()
            && !in_namespace(&snapshot.pods, Some(namespace.as_str()))
                .any(|pod| spec.pod_selector.matches(pod.labels()))
        {
            findings.push(
                Finding::warning(
                    Category::Policy,
                    format!("NetworkPolicy {}/{} podSelector matches no pods", namespace, name),
                )
                .on(ResourceKind::NetworkPolicy, policy)
                .suggestion("Check the podSelector labels against the workload's pod template labels"),
            );
        }

        let peers = spec
            .ingress
            .iter()
            .flatten()
            .flat_map(|rule| rule.from.iter())
            .chain(spec.egress.iter().flatten().flat_map(|rule| rule.to.iter()));
        for selector in peers.filter_map(|peer| peer.namespace_selector.as_ref()) {
            if !selector.is_empty()
                && !snapshot.namespaces.iter().any(|ns| selector.matches(ns.labels()))
            {
                findings.push(
                    Finding::warning(
                        Category::Policy,
                        format!(
                            "NetworkPolicy {}/{} has a namespaceSelector that matches no namespace",
                            namespace, name
                        ),
                    )
                    .on(ResourceKind::NetworkPolicy, policy)
                    .detail(format!("matchLabels: {:?}", selector.match_labels))
                    .suggestion("Label the peer namespace or use kubernetes.io/metadata.name"),
                );
            }
        }

        if spec.types().1 && !spec.allows_dns() {
            let dns_selectors = dns_selectors.get(&namespace).map(Vec::as_slice).unwrap_or(&[]);
            let selected: Vec<&DynamicObject> = in_namespace(&snapshot.pods, Some(namespace.as_str()))
                .filter(|pod| !pod_is_terminated(pod))
                .filter(|pod| spec.pod_selector.matches(pod.labels()))
                .collect();
            let stranded: Vec<String> = selected
                .iter()
                .filter(|pod| !dns_selectors.iter().any(|s| s.matches(pod.labels())))
                .map(|pod| pod.name_any())
                .collect();
            let blocked = if selected.is_empty() {
                !dns_selectors.iter().any(LabelSelector::is_empty)
            } else {
                !stranded.is_empty()
            };
            if blocked {
                let detail = if stranded.is_empty() {
                    "No egress policy in the namespace permits port 53".to_string()
                } else {
                    format!(
                        "No egress policy selecting these pods permits port 53: {}",
                        stranded.iter().take(10).cloned().collect::<Vec<_>>().join(", ")
                    )
                };
                findings.push(
                    Finding::warning(
                        Category::Connectivity,
                        format!("NetworkPolicy {}/{} restricts egress without allowing DNS", namespace, name),
                    )
                    .on(ResourceKind::NetworkPolicy, policy)
                    .detail(detail)
                    .suggestion("Add an egress rule to kube-dns on UDP and TCP port 53"),
                );
            }
        }
    }

    check_unselected_pods(snapshot, &mut findings);
    findings
}

fn check_unselected_pods(snapshot: &NetworkPolicySnapshot, findings: &mut Vec<Finding>) {
    let mut selectors: BTreeMap<String, Vec<LabelSelector>> = BTreeMap::new();
    for policy in &snapshot.policies {
        let spec: NetworkPolicySpec = policy.spec_as();
        selectors.entry(policy.namespace_or_default()).or_default().push(spec.pod_selector);
    }

    for (namespace, selectors) in selectors {
        let unselected: Vec<String> = in_namespace(&snapshot.pods, Some(namespace.as_str()))
            .filter(|pod| !pod_is_terminated(pod))
            .filter(|pod| !selectors.iter().any(|s| s.matches(pod.labels())))
            .map(|pod| pod.name_any())
            .collect();
        if !unselected.is_empty() {
            findings.push(
                Finding::info(
                    Category::Policy,
                    format!(
                        "{} pod(s) in namespace {} are not selected by any NetworkPolicy",
                        unselected.len(),
                        namespace
                    ),
                )
                .detail(format!("Pods: {}", unselected.iter().take(10).cloned().collect::<Vec<_>>().join(", ")))
                .suggestion("These pods accept all traffic; add a default-deny policy if that is unintended"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{namespace, obj, pod};
    use crate::findings::Severity;
    use serde_json::json;

    fn policy(name: &str, spec: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "networking.k8s.io/v1",
            "kind": "NetworkPolicy",
            "metadata": {"name": name, "namespace": "shop"},
            "spec": spec
        }))
    }

    fn snapshot(policies: Vec<DynamicObject>) -> NetworkPolicySnapshot {
        NetworkPolicySnapshot {
            policies,
            pods: vec![
                pod("shop", "web-1", json!({"app": "web"}), true),
                pod("shop", "db-1", json!({"app": "db"}), true),
            ],
            namespaces: vec![namespace("shop", json!({"kubernetes.io/metadata.name": "shop"}))],
        }
    }

    #[test]
    fn test_default_deny_detection() {
        let states = namespace_states(&[policy("deny-all", json!({"podSelector": {}, "policyTypes": ["Ingress", "Egress"]}))]);
        let state = &states["shop"];
        assert!(state.default_deny_ingress);
        assert!(state.default_deny_egress);

        let findings = analyze(&snapshot(vec![policy("deny-all", json!({"podSelector": {}, "policyTypes": ["Ingress"]}))]));
        assert!(findings.iter().any(|f| f.summary == "Namespace shop has a default-deny ingress policy"));
        assert!(!findings.iter().any(|f| f.summary.contains("not selected")));
    }

    #[test]
    fn test_pod_selector_matching_nothing() {
        let findings = analyze(&snapshot(vec![policy("cache", json!({"podSelector": {"matchLabels": {"app": "cache"}}}))]));
        assert!(findings
            .iter()
            .any(|f| f.severity == Severity::Warning && f.summary.contains("podSelector matches no pods")));
        let unselected: Vec<_> = findings.iter().filter(|f| f.summary.contains("not selected")).collect();
        assert_eq!(unselected.len(), 1);
        assert!(unselected[0].summary.starts_with("2 pod(s)"));
    }

    #[test]
    fn test_namespace_selector_matching_nothing() {
        let findings = analyze(&snapshot(vec![policy(
            "from-monitoring",
            json!({
                "podSelector": {"matchLabels": {"app": "web"}},
                "ingress": [{"from": [{"namespaceSelector": {"matchLabels": {"team": "monitoring"}}}]}]
            }),
        )]));
        assert!(findings.iter().any(|f| f.summary.contains("namespaceSelector that matches no namespace")));
    }

    #[test]
    fn test_egress_without_dns() {
        let blocked = analyze(&snapshot(vec![policy(
            "egress-db",
            json!({
                "podSelector": {"matchLabels": {"app": "web"}},
                "policyTypes": ["Egress"],
                "egress": [{"ports": [{"port": 5432, "protocol": "TCP"}]}]
            }),
        )]));
        assert!(blocked.iter().any(|f| f.summary.contains("without allowing DNS")));

        let allowed = analyze(&snapshot(vec![policy(
            "egress-db",
            json!({
                "podSelector": {"matchLabels": {"app": "web"}},
                "policyTypes": ["Egress"],
                "egress": [
                    {"ports": [{"port": 5432, "protocol": "TCP"}]},
                    {"ports": [{"port": 53, "protocol": "UDP"}]}
                ]
            }),
        )]));
        assert!(!allowed.iter().any(|f| f.summary.contains("without allowing DNS")));
    }

    #[test]
    fn test_dns_allowed_by_another_policy() {
        let deny_all = policy("deny-all", json!({"podSelector": {}, "policyTypes": ["Ingress", "Egress"]}));
        let allow_dns = |selector: Value| {
            policy(
                "allow-dns",
                json!({
                    "podSelector": selector,
                    "policyTypes": ["Egress"],
                    "egress": [{"ports": [{"port": 53, "protocol": "UDP"}, {"port": 53, "protocol": "TCP"}]}]
                }),
            )
        };

        let findings = analyze(&snapshot(vec![deny_all.clone(), allow_dns(json!({}))]));
        assert!(!findings.iter().any(|f| f.summary.contains("DNS")));

        let findings = analyze(&snapshot(vec![deny_all, allow_dns(json!({"matchLabels": {"app": "web"}}))]));
        let dns: Vec<_> = findings.iter().filter(|f| f.summary.contains("without allowing DNS")).collect();
        assert_eq!(dns.len(), 1);
        assert_eq!(dns[0].summary, "NetworkPolicy shop/deny-all restricts egress without allowing DNS");
        assert!(dns[0].detail.as_deref().is_some_and(|d| d.ends_with("db-1")));
    }

    #[test]
    fn test_ingress_only_policy_does_not_need_dns() {
        let findings = analyze(&snapshot(vec![policy(
            "web",
            json!({"podSelector": {"matchLabels": {"app": "web"}}, "ingress": [{}]}),
        )]));
        assert!(!findings.iter().any(|f| f.summary.contains("DNS")));
    }
}
