//! Calico policy and IP pool analysis (`projectcalico.org/v3`).

use ipnet::IpNet;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;

use super::pod_is_terminated;
use crate::findings::{Category, Finding};
use crate::k8s::fields::ObjectExt;
use crate::k8s::selectors::{CalicoSelector, Labels};
use crate::k8s::ResourceKind;

const NAMESPACE_LABEL: &str = "projectcalico.org/namespace";
const ORCHESTRATOR_LABEL: &str = "projectcalico.org/orchestrator";

#[derive(Debug, Default)]
pub struct CalicoSnapshot {
    pub policies: Vec<DynamicObject>,
    pub global_policies: Vec<DynamicObject>,
    pub ip_pools: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicySpec {
    #[serde(default)]
    selector: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    ingress: Vec<Rule>,
    #[serde(default)]
    egress: Vec<Rule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Rule {
    #[serde(default)]
    action: String,
    #[serde(default)]
    source: EntityRule,
    #[serde(default)]
    destination: EntityRule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityRule {
    selector: Option<String>,
    namespace_selector: Option<String>,
    #[serde(default)]
    nets: Vec<String>,
    #[serde(default)]
    ports: Vec<serde_json::Value>,
}

impl EntityRule {
    fn is_unrestricted(&self) -> bool {
        self.selector.as_deref().is_none_or(|s| s.trim().is_empty() || s.trim() == "all()")
            && self.namespace_selector.is_none()
            && self.nets.is_empty()
            && self.ports.is_empty()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpPoolSpec {
    #[serde(default)]
    cidr: String,
    ipip_mode: Option<String>,
    vxlan_mode: Option<String>,
    #[serde(default)]
    disabled: bool,
}

/// Pod labels as Calico's selector engine sees them.
fn calico_labels(pod: &DynamicObject) -> Labels {
    let mut labels = pod.labels_map();
    labels.insert(NAMESPACE_LABEL.to_string(), pod.namespace_or_default());
    labels.insert(ORCHESTRATOR_LABEL.to_string(), "k8s".to_string());
    labels
}

struct Workloads {
    pods: Vec<(String, Labels)>,
}

impl Workloads {
    fn new(pods: &[DynamicObject]) -> Self {
        Self {
            pods: pods
                .iter()
                .filter(|pod| !pod_is_terminated(pod))
                .map(|pod| (pod.namespace_or_default(), calico_labels(pod)))
                .collect(),
        }
    }

    fn any_match(&self, selector: &CalicoSelector, namespace: Option<&str>) -> bool {
        self.pods
            .iter()
            .filter(|(ns, _)| namespace.is_none_or(|wanted| ns == wanted))
            .any(|(_, labels)| selector.matches(labels))
    }
}

pub fn analyze(snapshot: &CalicoSnapshot) -> Vec<Finding> {
    let workloads = Workloads::new(&snapshot.pods);
    let mut findings = Vec::new();

    for policy in &snapshot.policies {
        let namespace = policy.namespace_or_default();
        check_policy(
            policy,
            ResourceKind::CalicoNetworkPolicy,
            Some(namespace.as_str()),
            &workloads,
            &mut findings,
        );
    }
    for policy in &snapshot.global_policies {
        check_policy(policy, ResourceKind::CalicoGlobalNetworkPolicy, None, &workloads, &mut findings);
        check_cluster_wide_deny(policy, &mut findings);
    }

    check_ip_pools(&snapshot.ip_pools, &mut findings);
    findings
}

fn check_policy(
    policy: &DynamicObject,
    kind: ResourceKind,
    namespace: Option<&str>,
    workloads: &Workloads,
    findings: &mut Vec<Finding>,
) {
    let spec: PolicySpec = policy.spec_as();
    let label = format!("{} {}", kind.kind(), policy.name_any());

    match CalicoSelector::parse(&spec.selector) {
        Ok(selector) => {
            if !selector.is_all() && !workloads.any_match(&selector, namespace) {
                findings.push(
                    Finding::warning(Category::Policy, format!("{} selector matches no pods", label))
                        .on(kind, policy)
                        .detail(format!("selector: {}", spec.selector))
                        .suggestion("Host endpoints may still match; otherwise check the selector labels"),
                );
            }
        }
        Err(e) => findings.push(
            Finding::warning(Category::Policy, format!("{} has an invalid selector", label))
                .on(kind, policy)
                .detail(format!("'{}': {}", spec.selector, e)),
        ),
    }

    let rules = spec
        .ingress
        .iter()
        .chain(spec.egress.iter())
        .flat_map(|rule| [&rule.source, &rule.destination]);
    for entity in rules {
        let Some(expression) = entity.selector.as_deref() else {
            continue;
        };
        match CalicoSelector::parse(expression) {
            Ok(selector) => {
                // A namespaceSelector widens the scope beyond the policy namespace.
                let scope = if entity.namespace_selector.is_some() { None } else { namespace };
                if !selector.is_all() && !workloads.any_match(&selector, scope) {
                    findings.push(
                        Finding::warning(
                            Category::Policy,
                            format!("{} has a rule selector that matches no pods", label),
                        )
                        .on(kind, policy)
                        .detail(format!("selector: {}", expression)),
                    );
                }
            }
            Err(e) => findings.push(
                Finding::warning(Category::Policy, format!("{} has an invalid rule selector", label))
                    .on(kind, policy)
                    .detail(format!("'{}': {}", expression, e)),
            ),
        }
    }

    for (direction, rules) in [("Ingress", &spec.ingress), ("Egress", &spec.egress)] {
        if spec.types.iter().any(|t| t == direction) && rules.is_empty() {
            findings.push(
                Finding::info(
                    Category::Policy,
                    format!("{} denies all {} for the pods it selects", label, direction.to_lowercase()),
                )
                .on(kind, policy)
                .detail(format!("types includes {} but no {} rules are defined", direction, direction.to_lowercase())),
            );
        }
    }
}

fn check_cluster_wide_deny(policy: &DynamicObject, findings: &mut Vec<Finding>) {
    let spec: PolicySpec = policy.spec_as();
    let selects_everything = matches!(CalicoSelector::parse(&spec.selector), Ok(CalicoSelector::All));
    if !selects_everything {
        return;
    }
    let denies_all = spec
        .ingress
        .iter()
        .chain(spec.egress.iter())
        .any(|rule| rule.action == "Deny" && rule.source.is_unrestricted() && rule.destination.is_unrestricted());
    if denies_all {
        findings.push(
            Finding::warning(
                Category::Policy,
                format!("GlobalNetworkPolicy {} denies traffic cluster-wide", policy.name_any()),
            )
            .on(ResourceKind::CalicoGlobalNetworkPolicy, policy)
            .detail("Selector is all() and a Deny rule has no source or destination restriction")
            .suggestion("Make sure higher-priority (lower order) Allow policies cover system traffic such as DNS"),
        );
    }
}

fn check_ip_pools(pools: &[DynamicObject], findings: &mut Vec<Finding>) {
    let mut parsed: Vec<(&DynamicObject, IpNet)> = Vec::new();

    for pool in pools {
        let spec: IpPoolSpec = pool.spec_as();
        match spec.cidr.parse::<IpNet>() {
            Ok(net) => parsed.push((pool, net)),
            Err(_) => findings.push(
                Finding::warning(
                    Category::Cni,
                    format!("IPPool {} has an invalid CIDR '{}'", pool.name_any(), spec.cidr),
                )
                .on(ResourceKind::CalicoIpPool, pool),
            ),
        }

        let encapsulated = |mode: &Option<String>| mode.as_deref().is_some_and(|m| m != "Never");
        if encapsulated(&spec.ipip_mode) && encapsulated(&spec.vxlan_mode) {
            findings.push(
                Finding::warning(
                    Category::Cni,
                    format!("IPPool {} enables both IPIP and VXLAN encapsulation", pool.name_any()),
                )
                .on(ResourceKind::CalicoIpPool, pool)
                .suggestion("Set one of ipipMode or vxlanMode to Never"),
            );
        }
    }

    for (i, (pool, net)) in parsed.iter().enumerate() {
        for (other, other_net) in &parsed[i + 1..] {
            if net.contains(other_net) || other_net.contains(net) {
                findings.push(
                    Finding::critical(
                        Category::Cni,
                        format!("IPPools {} and {} overlap", pool.name_any(), other.name_any()),
                    )
                    .on(ResourceKind::CalicoIpPool, pool)
                    .detail(format!("{} overlaps {}", net, other_net)),
                );
            }
        }
    }

    if !pools.is_empty() && pools.iter().all(|p| p.spec_as::<IpPoolSpec>().disabled) {
        findings.push(
            Finding::critical(Category::Cni, "All Calico IPPools are disabled")
                .detail("New pods cannot be assigned addresses")
                .suggestion("Enable at least one IPPool"),
        );
    }
}
