//! Istio configuration validation: gateway bindings, host conflicts, mTLS consistency,
//! authorization policy pitfalls and gateway TLS settings.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::istio_routing::{destination_rules_by_host, HostRegistry, VirtualServiceSpec};
use super::{find_named, format_labels, fqdn, in_namespace, service_of_fqdn};
use crate::findings::{Category, Finding};
use crate::k8s::fields::{array_at, str_at, string_map_at, ObjectExt};
use crate::k8s::selectors::{is_subset, map_matches, Labels};
use crate::k8s::ResourceKind;

/// Namespace whose PeerAuthentications apply mesh-wide.
pub const ROOT_NAMESPACE: &str = "istio-system";

#[derive(Debug, Default)]
pub struct IstioConfigSnapshot {
    pub virtual_services: Vec<DynamicObject>,
    pub destination_rules: Vec<DynamicObject>,
    pub gateways: Vec<DynamicObject>,
    pub service_entries: Vec<DynamicObject>,
    pub peer_authentications: Vec<DynamicObject>,
    pub authorization_policies: Vec<DynamicObject>,
    pub services: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorizationPolicySpec {
    selector: Option<WorkloadSelector>,
    action: Option<String>,
    #[serde(default)]
    rules: Vec<Value>,
    provider: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkloadSelector {
    #[serde(default, rename = "matchLabels")]
    match_labels: Labels,
}

pub fn validate_config(snapshot: &IstioConfigSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_gateway_bindings(snapshot, &mut findings);
    check_destination_rule_hosts(snapshot, &mut findings);
    check_mtls_conflicts(snapshot, &mut findings);
    check_authorization_policies(snapshot, &mut findings);
    check_gateways(snapshot, &mut findings);
    findings
}

/// `ns/name` key of a VirtualService gateway reference; `mesh` stays as is.
fn gateway_key(reference: &str, namespace: &str) -> String {
    match reference.split_once('/') {
        Some(_) => reference.to_string(),
        None if reference == "mesh" => "mesh".to_string(),
        None => format!("{}/{}", namespace, reference),
    }
}

fn check_gateway_bindings(snapshot: &IstioConfigSnapshot, findings: &mut Vec<Finding>) {
    let mut claims: BTreeMap<(String, String), Vec<&DynamicObject>> = BTreeMap::new();

    for vs in &snapshot.virtual_services {
        let spec: VirtualServiceSpec = vs.spec_as();
        let namespace = vs.namespace_or_default();
        let gateways: Vec<String> = if spec.gateways.is_empty() {
            vec!["mesh".to_string()]
        } else {
            spec.gateways.iter().map(|g| gateway_key(g, &namespace)).collect()
        };

        for gateway in &gateways {
            if gateway == "mesh" {
                continue;
            }
            let (gw_namespace, gw_name) =
                gateway.split_once('/').unwrap_or((namespace.as_str(), gateway.as_str()));
            if find_named(&snapshot.gateways, Some(gw_namespace), gw_name).is_none() {
                findings.push(
                    Finding::critical(
                        Category::Configuration,
                        format!(
                            "VirtualService {}/{} is bound to Gateway '{}' which does not exist",
                            namespace,
                            vs.name_any(),
                            gateway
                        ),
                    )
                    .on(ResourceKind::VirtualService, vs)
                    .suggestion("Create the Istio Gateway or fix the gateways reference (use namespace/name for other namespaces)"),
                );
            }
        }

        for host in &spec.hosts {
            let host = fqdn(host, &namespace);
            for gateway in &gateways {
                claims
                    .entry((gateway.clone(), host.clone()))
                    .or_default()
                    .push(vs);
            }
        }
    }

    for ((gateway, host), owners) in claims {
        if owners.len() < 2 {
            continue;
        }
        let names = qualified_names(&owners);
        for owner in first_per_namespace(&owners) {
            findings.push(
                Finding::warning(
                    Category::Routing,
                    format!(
                        "{} VirtualServices claim host '{}' on gateway '{}'",
                        owners.len(),
                        host,
                        gateway
                    ),
                )
                .on(ResourceKind::VirtualService, owner)
                .detail(format!("VirtualServices: {}", names))
                .suggestion("Merge the routes into one VirtualService; Istio merges conflicting hosts unpredictably"),
            );
        }
    }
}

/// `ns/name, ns/name` of the objects.
fn qualified_names(objects: &[&DynamicObject]) -> String {
    objects
        .iter()
        .map(|obj| format!("{}/{}", obj.namespace_or_default(), obj.name_any()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The first object of every namespace among `objects`. A conflict is reported once per
/// namespace involved, against that namespace's first object.
fn first_per_namespace<'a>(objects: &[&'a DynamicObject]) -> Vec<&'a DynamicObject> {
    let mut seen = BTreeSet::new();
    objects.iter().copied().filter(|obj| seen.insert(obj.namespace_or_default())).collect()
}

fn check_destination_rule_hosts(snapshot: &IstioConfigSnapshot, findings: &mut Vec<Finding>) {
    let hosts = HostRegistry::new(&snapshot.services, &snapshot.service_entries);

    for (host, rules) in destination_rules_by_host(&snapshot.destination_rules) {
        for (dr, _) in &rules {
            if !host.starts_with('*') && !hosts.resolves(&host) {
                findings.push(
                    Finding::warning(
                        Category::Configuration,
                        format!(
                            "DestinationRule {}/{} targets host '{}' which matches no Service or ServiceEntry",
                            dr.namespace_or_default(),
                            dr.name_any(),
                            host
                        ),
                    )
                    .on(ResourceKind::DestinationRule, dr),
                );
            }
        }

        let unscoped: Vec<&DynamicObject> = rules
            .iter()
            .filter(|(_, spec)| spec.workload_selector.is_none())
            .map(|(dr, _)| *dr)
            .collect();
        if unscoped.len() > 1 {
            let names = qualified_names(&unscoped);
            for owner in first_per_namespace(&unscoped) {
                findings.push(
                    Finding::warning(
                        Category::Configuration,
                        format!("{} DestinationRules apply to host '{}'", unscoped.len(), host),
                    )
                    .on(ResourceKind::DestinationRule, owner)
                    .detail(format!("DestinationRules: {}", names))
                    .suggestion("Keep a single DestinationRule per host; only one of them takes effect"),
                );
            }
        }
    }
}

fn tls_mode(traffic_policy: Option<&Value>) -> Option<&str> {
    traffic_policy.and_then(|tp| str_at(tp, &["tls", "mode"]))
}

fn check_mtls_conflicts(snapshot: &IstioConfigSnapshot, findings: &mut Vec<Finding>) {
    let strict_namespaces: BTreeSet<String> = snapshot
        .peer_authentications
        .iter()
        .filter(|pa| str_at(pa.spec(), &["mtls", "mode"]) == Some("STRICT"))
        .filter(|pa| string_map_at(pa.spec(), &["selector", "matchLabels"]).is_empty())
        .map(|pa| pa.namespace_or_default())
        .collect();
    if strict_namespaces.is_empty() {
        return;
    }
    let mesh_wide = strict_namespaces.contains(ROOT_NAMESPACE);

    for (host, rules) in destination_rules_by_host(&snapshot.destination_rules) {
        let Some((service_namespace, _)) = service_of_fqdn(&host) else {
            continue;
        };
        if !mesh_wide && !strict_namespaces.contains(service_namespace) {
            continue;
        }
        for (dr, spec) in &rules {
            if tls_mode(spec.traffic_policy.as_ref()) == Some("DISABLE") {
                findings.push(
                    Finding::critical(
                        Category::Tls,
                        format!(
                            "DestinationRule {}/{} disables TLS to '{}' while STRICT mTLS is enforced",
                            dr.namespace_or_default(),
                            dr.name_any(),
                            host
                        ),
                    )
                    .on(ResourceKind::DestinationRule, dr)
                    .detail(if mesh_wide {
                        "A mesh-wide STRICT PeerAuthentication exists in istio-system".to_string()
                    } else {
                        format!("Namespace {} has a STRICT PeerAuthentication", service_namespace)
                    })
                    .suggestion("Set trafficPolicy.tls.mode to ISTIO_MUTUAL or remove the override"),
                );
            }
        }
    }
}

fn check_authorization_policies(snapshot: &IstioConfigSnapshot, findings: &mut Vec<Finding>) {
    for policy in &snapshot.authorization_policies {
        let spec: AuthorizationPolicySpec = policy.spec_as();
        let namespace = policy.namespace_or_default();
        let action = spec.action.as_deref().unwrap_or("ALLOW");
        let selector = spec.selector.map(|s| s.match_labels).unwrap_or_default();

        match action {
            "ALLOW" if spec.rules.is_empty() => {
                findings.push(
                    Finding::warning(
                        Category::Security,
                        format!(
                            "AuthorizationPolicy {}/{} is an ALLOW policy with no rules and denies all requests",
                            namespace,
                            policy.name_any()
                        ),
                    )
                    .on(ResourceKind::AuthorizationPolicy, policy)
                    .detail(if selector.is_empty() {
                        "Applies to every workload in the namespace".to_string()
                    } else {
                        format!("Applies to workloads labelled {}", format_labels(&selector))
                    })
                    .suggestion("Add rules describing the allowed traffic, or delete the policy if allow-nothing is not intended"),
                );
            }
            // Without rules a DENY policy matches no request. An empty selector covers every
            // workload in the namespace.
            "DENY" if !spec.rules.is_empty() => {
                for service in in_namespace(&snapshot.services, Some(namespace.as_str())) {
                    let service_selector = string_map_at(service.spec(), &["selector"]);
                    if !service_selector.is_empty() && is_subset(&selector, &service_selector) {
                        findings.push(
                            Finding::warning(
                                Category::Security,
                                format!(
                                    "DENY AuthorizationPolicy {}/{} selects every pod of Service {}",
                                    namespace,
                                    policy.name_any(),
                                    service.name_any()
                                ),
                            )
                            .on(ResourceKind::AuthorizationPolicy, policy)
                            .detail(if selector.is_empty() {
                                format!("Policy has no selector and applies to every workload in namespace {}", namespace)
                            } else {
                                format!(
                                    "Policy selector {} is contained in the Service selector {}",
                                    format_labels(&selector),
                                    format_labels(&service_selector)
                                )
                            })
                            .suggestion("Confirm the rules are narrow enough; matching requests to the whole Service are blocked"),
                        );
                    }
                }
            }
            "CUSTOM" if spec.provider.is_none() => {
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "CUSTOM AuthorizationPolicy {}/{} has no provider",
                            namespace,
                            policy.name_any()
                        ),
                    )
                    .on(ResourceKind::AuthorizationPolicy, policy)
                    .suggestion("Set spec.provider.name to an extension provider from the mesh config"),
                );
            }
            _ => {}
        }
    }
}

fn check_gateways(snapshot: &IstioConfigSnapshot, findings: &mut Vec<Finding>) {
    for gateway in &snapshot.gateways {
        let selector = string_map_at(gateway.spec(), &["selector"]);
        if !selector.is_empty() && !snapshot.pods.iter().any(|pod| map_matches(&selector, pod.labels())) {
            findings.push(
                Finding::warning(
                    Category::Configuration,
                    format!(
                        "Istio Gateway {}/{} selector matches no gateway pods",
                        gateway.namespace_or_default(),
                        gateway.name_any()
                    ),
                )
                .on(ResourceKind::IstioGateway, gateway)
                .detail(format!("Selector: {}", format_labels(&selector)))
                .suggestion("Point the selector at the ingress gateway deployment labels (e.g. istio=ingressgateway)"),
            );
        }

        for server in array_at(gateway.spec(), &["servers"]) {
            let mode = str_at(server, &["tls", "mode"]);
            let has_credentials = str_at(server, &["tls", "credentialName"]).is_some()
                || str_at(server, &["tls", "serverCertificate"]).is_some();
            if matches!(mode, Some("SIMPLE") | Some("MUTUAL")) && !has_credentials {
                let port = server.get("port").and_then(|p| p.get("number")).and_then(Value::as_i64);
                findings.push(
                    Finding::critical(
                        Category::Tls,
                        format!(
                            "Istio Gateway {}/{} server on port {} uses TLS mode {} without credentialName",
                            gateway.namespace_or_default(),
                            gateway.name_any(),
                            port.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string()),
                            mode.unwrap_or_default()
                        ),
                    )
                    .on(ResourceKind::IstioGateway, gateway)
                    .suggestion("Set tls.credentialName to a TLS Secret in the gateway's namespace"),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::{obj, pod, service};
    use crate::findings::Severity;
    use serde_json::json;

    fn vs(name: &str, hosts: Value, gateways: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "networking.istio.io/v1",
            "kind": "VirtualService",
            "metadata": {"name": name, "namespace": "shop"},
            "spec": {"hosts": hosts, "gateways": gateways, "http": []}
        }))
    }

    fn gateway(servers: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "networking.istio.io/v1",
            "kind": "Gateway",
            "metadata": {"name": "public", "namespace": "shop"},
            "spec": {"selector": {"istio": "ingressgateway"}, "servers": servers}
        }))
    }

    fn base() -> IstioConfigSnapshot {
        IstioConfigSnapshot {
            services: vec![service("shop", "cart", json!({"app": "cart"}), json!([{"port": 80}]))],
            pods: vec![
                pod("shop", "cart-1", json!({"app": "cart"}), true),
                pod("istio-system", "ingress-1", json!({"istio": "ingressgateway"}), true),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_gateway_reference() {
        let mut snapshot = base();
        snapshot.virtual_services = vec![vs("cart", json!(["cart.example.com"]), json!(["public", "mesh"]))];
        let findings = validate_config(&snapshot);
        assert_eq!(findings.iter().filter(|f| f.severity == Severity::Critical).count(), 1);
        assert!(findings[0].summary.contains("shop/public"));
    }

    #[test]
    fn test_duplicate_host_on_same_gateway() {
        let mut snapshot = base();
        snapshot.gateways = vec![gateway(json!([]))];
        snapshot.virtual_services = vec![
            vs("cart-a", json!(["cart.example.com"]), json!(["public"])),
            vs("cart-b", json!(["cart.example.com"]), json!(["shop/public"])),
            vs("cart-mesh", json!(["cart.example.com"]), json!([])),
        ];
        let findings = validate_config(&snapshot);
        let conflicts: Vec<_> = findings.iter().filter(|f| f.summary.contains("claim host")).collect();
        assert_eq!(conflicts.len(), 1);
        assert!(conflicts[0].summary.starts_with("2 VirtualServices"));
    }

    #[test]
    fn test_strict_peer_authentication_with_tls_disabled() {
        let mut snapshot = base();
        snapshot.peer_authentications = vec![obj(json!({
            "apiVersion": "security.istio.io/v1",
            "kind": "PeerAuthentication",
            "metadata": {"name": "default", "namespace": "istio-system"},
            "spec": {"mtls": {"mode": "STRICT"}}
        }))];
        snapshot.destination_rules = vec![obj(json!({
            "apiVersion": "networking.istio.io/v1",
            "kind": "DestinationRule",
            "metadata": {"name": "cart", "namespace": "shop"},
            "spec": {"host": "cart", "trafficPolicy": {"tls": {"mode": "DISABLE"}}}
        }))];
        let findings = validate_config(&snapshot);
        let tls: Vec<_> = findings.iter().filter(|f| f.category == Category::Tls).collect();
        assert_eq!(tls.len(), 1);
        assert_eq!(tls[0].severity, Severity::Critical);
    }

    #[test]
    fn test_authorization_policy_pitfalls() {
        let mut snapshot = base();
        snapshot.authorization_policies = vec![
            obj(json!({
                "apiVersion": "security.istio.io/v1",
                "kind": "AuthorizationPolicy",
                "metadata": {"name": "allow-nothing", "namespace": "shop"},
                "spec": {}
            })),
            obj(json!({
                "apiVersion": "security.istio.io/v1",
                "kind": "AuthorizationPolicy",
                "metadata": {"name": "deny-cart", "namespace": "shop"},
                "spec": {"action": "DENY", "selector": {"matchLabels": {"app": "cart"}}, "rules": [{}]}
            })),
        ];
        let findings = validate_config(&snapshot);
        assert!(findings.iter().any(|f| f.summary.contains("allow-nothing") && f.summary.contains("denies all")));
        assert!(findings.iter().any(|f| f.summary.contains("deny-cart") && f.summary.contains("Service cart")));
    }

    #[test]
    fn test_namespace_wide_deny_policy() {
        let deny = |name: &str, rules: Value| {
            obj(json!({
                "apiVersion": "security.istio.io/v1",
                "kind": "AuthorizationPolicy",
                "metadata": {"name": name, "namespace": "shop"},
                "spec": {"action": "DENY", "rules": rules}
            }))
        };
        let mut snapshot = base();
        snapshot.authorization_policies = vec![deny("deny-any", json!([{}])), deny("deny-none", json!([]))];
        let findings = validate_config(&snapshot);

        let deny: Vec<_> = findings.iter().filter(|f| f.summary.starts_with("DENY")).collect();
        assert_eq!(deny.len(), 1);
        assert_eq!(deny[0].summary, "DENY AuthorizationPolicy shop/deny-any selects every pod of Service cart");
        assert!(deny[0].detail.as_deref().is_some_and(|d| d.contains("every workload in namespace shop")));
    }

    #[test]
    fn test_conflicts_are_attributed_to_each_namespace() {
        let vs_in = |namespace: &str, name: &str| {
            obj(json!({
                "apiVersion": "networking.istio.io/v1",
                "kind": "VirtualService",
                "metadata": {"name": name, "namespace": namespace},
                "spec": {"hosts": ["api.example.com"], "http": []}
            }))
        };
        let mut snapshot = base();
        snapshot.virtual_services = vec![vs_in("other", "api-a"), vs_in("other", "api-b")];
        let findings = validate_config(&snapshot);
        let conflicts: Vec<_> = findings.iter().filter(|f| f.summary.contains("claim host")).collect();
        assert_eq!(conflicts.len(), 1);
        let resource = conflicts[0].resource.as_ref().unwrap();
        assert_eq!(resource.namespace.as_deref(), Some("other"));
        assert_eq!(resource.name, "api-a");

        snapshot.virtual_services.push(vs_in("shop", "api-c"));
        let findings = validate_config(&snapshot);
        let namespaces: Vec<_> = findings
            .iter()
            .filter(|f| f.summary.starts_with("3 VirtualServices claim host"))
            .filter_map(|f| f.resource.as_ref().and_then(|r| r.namespace.clone()))
            .collect();
        assert_eq!(namespaces, vec!["other".to_string(), "shop".to_string()]);
    }

    #[test]
    fn test_gateway_tls_without_credentials_and_selector() {
        let mut snapshot = base();
        snapshot.pods.retain(|p| p.name_any() != "ingress-1");
        snapshot.gateways = vec![gateway(json!([
            {"port": {"number": 443, "name": "https", "protocol": "HTTPS"}, "hosts": ["*"], "tls": {"mode": "SIMPLE"}},
            {"port": {"number": 8443, "name": "https-2", "protocol": "HTTPS"}, "hosts": ["*"], "tls": {"mode": "SIMPLE", "credentialName": "cert"}}
        ]))];
        let findings = validate_config(&snapshot);
        let tls: Vec<_> = findings.iter().filter(|f| f.summary.contains("without credentialName")).collect();
        assert_eq!(tls.len(), 1);
        assert!(tls[0].summary.contains("port 443"));
        assert!(findings.iter().any(|f| f.summary.contains("matches no gateway pods")));
    }

    #[test]
    fn test_destination_rule_for_unknown_host_and_duplicates() {
        let mut snapshot = base();
        let dr = |name: &str, host: &str| {
            obj(json!({
                "apiVersion": "networking.istio.io/v1",
                "kind": "DestinationRule",
                "metadata": {"name": name, "namespace": "shop"},
                "spec": {"host": host}
            }))
        };
        snapshot.destination_rules = vec![dr("cart-a", "cart"), dr("cart-b", "cart.shop.svc.cluster.local"), dr("ghost", "ghost")];
        let findings = validate_config(&snapshot);
        assert!(findings.iter().any(|f| f.summary.contains("2 DestinationRules apply to host 'cart.shop.svc.cluster.local'")));
        assert!(findings.iter().any(|f| f.summary.contains("ghost") && f.summary.contains("matches no Service")));
    }
}
