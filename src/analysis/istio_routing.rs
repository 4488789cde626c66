//! Istio traffic routing analysis.
//!
//! Cross-references VirtualService routes with DestinationRule subsets, Services and
//! ServiceEntries: weight totals, missing subsets, unresolvable hosts, shadowed and unreachable
//! HTTP routes, subsets that select no pods and subsets nobody routes to.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use super::{format_labels, fqdn, hosts_intersect, pods_selected_by, service_of_fqdn};
use crate::findings::{Category, Finding};
use crate::k8s::fields::{string_map_at, ObjectExt};
use crate::k8s::selectors::Labels;
use crate::k8s::ResourceKind;

#[derive(Debug, Default)]
pub struct IstioSnapshot {
    pub virtual_services: Vec<DynamicObject>,
    pub destination_rules: Vec<DynamicObject>,
    pub service_entries: Vec<DynamicObject>,
    pub services: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub gateways: Vec<String>,
    #[serde(default)]
    pub http: Vec<HttpRoute>,
    #[serde(default)]
    pub tcp: Vec<L4Route>,
    #[serde(default)]
    pub tls: Vec<L4Route>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HttpRoute {
    pub name: Option<String>,
    #[serde(default, rename = "match")]
    pub matches: Vec<Map<String, Value>>,
    #[serde(default)]
    pub route: Vec<RouteDestination>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct L4Route {
    #[serde(default)]
    pub route: Vec<RouteDestination>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RouteDestination {
    pub destination: Destination,
    pub weight: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Destination {
    #[serde(default)]
    pub host: String,
    pub subset: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DestinationRuleSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub subsets: Vec<Subset>,
    #[serde(rename = "trafficPolicy")]
    pub traffic_policy: Option<Value>,
    #[serde(rename = "workloadSelector")]
    pub workload_selector: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Subset {
    pub name: String,
    #[serde(default)]
    pub labels: Labels,
}

/// Route kinds carried by a VirtualService.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Http,
    Tcp,
    Tls,
}

impl Protocol {
    fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Tcp => "tcp",
            Protocol::Tls => "tls",
        }
    }
}

/// Hosts known to the mesh: in-cluster Services plus ServiceEntry hosts.
pub(crate) struct HostRegistry<'a> {
    services: BTreeMap<(String, String), &'a DynamicObject>,
    entry_hosts: Vec<String>,
}

impl<'a> HostRegistry<'a> {
    pub fn new(services: &'a [DynamicObject], service_entries: &'a [DynamicObject]) -> Self {
        let services = services
            .iter()
            .map(|svc| ((svc.namespace_or_default(), svc.name_any()), svc))
            .collect();
        let entry_hosts = service_entries
            .iter()
            .flat_map(|se| {
                let namespace = se.namespace_or_default();
                crate::k8s::fields::array_at(se.spec(), &["hosts"])
                    .iter()
                    .filter_map(Value::as_str)
                    .map(move |host| fqdn(host, &namespace))
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { services, entry_hosts }
    }

    /// The Service an FQDN names, if it exists.
    pub fn service(&self, host_fqdn: &str) -> Option<&'a DynamicObject> {
        let (namespace, name) = service_of_fqdn(host_fqdn)?;
        self.services.get(&(namespace.to_string(), name.to_string())).copied()
    }

    pub fn resolves(&self, host_fqdn: &str) -> bool {
        self.service(host_fqdn).is_some()
            || self.entry_hosts.iter().any(|entry| hosts_intersect(entry, host_fqdn))
    }
}

/// `(dr, spec)` pairs for DestinationRules, keyed by the host FQDN they apply to.
pub(crate) type RulesByHost<'a> = BTreeMap<String, Vec<(&'a DynamicObject, DestinationRuleSpec)>>;

pub(crate) fn destination_rules_by_host(destination_rules: &[DynamicObject]) -> RulesByHost<'_> {
    let mut by_host: BTreeMap<String, Vec<_>> = BTreeMap::new();
    for dr in destination_rules {
        let spec: DestinationRuleSpec = dr.spec_as();
        if spec.host.is_empty() {
            continue;
        }
        by_host.entry(fqdn(&spec.host, &dr.namespace_or_default())).or_default().push((dr, spec));
    }
    by_host
}

pub fn analyze_routing(snapshot: &IstioSnapshot) -> Vec<Finding> {
    let hosts = HostRegistry::new(&snapshot.services, &snapshot.service_entries);
    let rules_by_host = destination_rules_by_host(&snapshot.destination_rules);
    let mut findings = Vec::new();
    let mut referenced_subsets: BTreeSet<(String, String)> = BTreeSet::new();

    for vs in &snapshot.virtual_services {
        let spec: VirtualServiceSpec = vs.spec_as();
        let namespace = vs.namespace_or_default();
        let mut unresolved_reported: BTreeSet<String> = BTreeSet::new();

        let routes = spec
            .http
            .iter()
            .enumerate()
            .map(|(i, r)| (Protocol::Http, i, r.name.as_deref(), r.route.as_slice()))
            .chain(spec.tcp.iter().enumerate().map(|(i, r)| (Protocol::Tcp, i, None, r.route.as_slice())))
            .chain(spec.tls.iter().enumerate().map(|(i, r)| (Protocol::Tls, i, None, r.route.as_slice())));

        for (protocol, index, route_name, destinations) in routes {
            let label = route_label(protocol, index, route_name);
            check_weights(vs, &label, destinations, &mut findings);

            for destination in destinations.iter().map(|d| &d.destination) {
                if destination.host.is_empty() {
                    continue;
                }
                let host = fqdn(&destination.host, &namespace);

                if !hosts.resolves(&host) && unresolved_reported.insert(host.clone()) {
                    findings.push(
                        Finding::warning(
                            Category::Routing,
                            format!(
                                "VirtualService {}/{} routes to host '{}' which matches no Service or ServiceEntry",
                                namespace,
                                vs.name_any(),
                                destination.host
                            ),
                        )
                        .on(ResourceKind::VirtualService, vs)
                        .suggestion("Create the Service, fix the host name, or add a ServiceEntry for external hosts"),
                    );
                }

                if let Some(subset) = &destination.subset {
                    referenced_subsets.insert((host.clone(), subset.clone()));
                    if let Some(finding) = check_subset(vs, &label, &destination.host, &host, subset, &rules_by_host) {
                        findings.push(finding);
                    }
                }
            }
        }

        check_http_order(vs, &spec.http, &mut findings);
    }

    check_subsets(snapshot, &hosts, &rules_by_host, &referenced_subsets, &mut findings);
    findings
}

fn route_label(protocol: Protocol, index: usize, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{} route '{}'", protocol.as_str(), name),
        None => format!("{} route #{}", protocol.as_str(), index + 1),
    }
}

/// Weights of a multi-destination route must total 100; an omitted weight counts as 0.
fn check_weights(
    vs: &DynamicObject,
    label: &str,
    destinations: &[RouteDestination],
    findings: &mut Vec<Finding>,
) {
    if destinations.len() < 2 {
        return;
    }
    let total = destinations
        .iter()
        .fold(0i64, |total, d| total.saturating_add(d.weight.unwrap_or(0)));
    if total != 100 {
        let weights: Vec<String> = destinations
            .iter()
            .map(|d| format!("{}={}", destination_label(&d.destination), d.weight.unwrap_or(0)))
            .collect();
        findings.push(
            Finding::warning(
                Category::Routing,
                format!(
                    "VirtualService {} {} has destination weights totalling {} instead of 100",
                    vs.name_any(),
                    label,
                    total
                ),
            )
            .on(ResourceKind::VirtualService, vs)
            .detail(weights.join(", "))
            .suggestion("Adjust the weights so they add up to 100"),
        );
    }
}

fn destination_label(destination: &Destination) -> String {
    match &destination.subset {
        Some(subset) => format!("{}/{}", destination.host, subset),
        None => destination.host.clone(),
    }
}

fn check_subset(
    vs: &DynamicObject,
    label: &str,
    written_host: &str,
    host: &str,
    subset: &str,
    rules_by_host: &RulesByHost<'_>,
) -> Option<Finding> {
    let rules = rules_by_host.get(host).map(Vec::as_slice).unwrap_or(&[]);
    if rules.iter().any(|(_, spec)| spec.subsets.iter().any(|s| s.name == subset)) {
        return None;
    }

    let detail = if rules.is_empty() {
        format!("No DestinationRule exists for host {}", host)
    } else {
        let defined: Vec<&str> =
            rules.iter().flat_map(|(_, spec)| spec.subsets.iter().map(|s| s.name.as_str())).collect();
        format!("Subsets defined for {}: [{}]", host, defined.join(", "))
    };

    Some(
        Finding::critical(
            Category::Routing,
            format!(
                "VirtualService {} {} references subset '{}' of host '{}' which is not defined",
                vs.name_any(),
                label,
                subset,
                written_host
            ),
        )
        .on(ResourceKind::VirtualService, vs)
        .detail(detail)
        .suggestion(format!(
            "Add subset '{}' to the DestinationRule for {} or route to an existing subset",
            subset, host
        )),
    )
}

/// A match condition that selects every request.
fn is_catch_all(m: &Map<String, Value>) -> bool {
    m.iter().filter(|(key, _)| key.as_str() != "name").all(|(key, value)| {
        key == "uri" && value.get("prefix").and_then(Value::as_str) == Some("/")
    })
}

fn route_matches_everything(route: &HttpRoute) -> bool {
    route.matches.is_empty() || route.matches.iter().any(is_catch_all)
}

/// Whether string match `a` accepts every value string match `b` accepts.
fn string_match_covers(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    let a_prefix = a.get("prefix").and_then(Value::as_str);
    let a_regex = a.get("regex").and_then(Value::as_str);
    if a_regex == Some(".*") {
        return true;
    }
    match a_prefix {
        Some(prefix) => ["exact", "prefix"]
            .iter()
            .any(|key| b.get(*key).and_then(Value::as_str).is_some_and(|v| v.starts_with(prefix))),
        None => false,
    }
}

fn string_map_covers(a: &Value, b: &Value) -> bool {
    match (a.as_object(), b.as_object()) {
        (Some(a), Some(b)) => {
            a.iter().all(|(key, am)| b.get(key).is_some_and(|bm| string_match_covers(am, bm)))
        }
        _ => a == b,
    }
}

/// Whether match request `a` accepts every request `b` accepts: each condition of `a` must be
/// implied by a condition of `b`.
fn match_covers(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.iter().filter(|(key, _)| key.as_str() != "name").all(|(key, a_value)| {
        let Some(b_value) = b.get(key) else {
            return key == "uri" && a_value.get("prefix").and_then(Value::as_str) == Some("/");
        };
        match key.as_str() {
            "uri" | "scheme" | "method" | "authority" => string_match_covers(a_value, b_value),
            "headers" | "queryParams" => string_map_covers(a_value, b_value),
            _ => a_value == b_value,
        }
    })
}

/// Shadowed and unreachable HTTP routes. Istio evaluates routes in order and the first match
/// wins.
fn check_http_order(vs: &DynamicObject, routes: &[HttpRoute], findings: &mut Vec<Finding>) {
    let mut catch_all: Option<String> = None;

    for (index, route) in routes.iter().enumerate() {
        let label = route_label(Protocol::Http, index, route.name.as_deref());

        if let Some(catch_all_label) = &catch_all {
            findings.push(
                Finding::warning(
                    Category::Routing,
                    format!(
                        "VirtualService {} {} is unreachable: it follows catch-all {}",
                        vs.name_any(),
                        label,
                        catch_all_label
                    ),
                )
                .on(ResourceKind::VirtualService, vs)
                .suggestion("Move the catch-all route to the end of the http list"),
            );
            continue;
        }

        if !route.matches.is_empty() && index > 0 {
            let shadowing = route.matches.iter().map(|m| {
                routes[..index]
                    .iter()
                    .enumerate()
                    .find(|(_, earlier)| earlier.matches.iter().any(|em| match_covers(em, m)))
                    .map(|(i, earlier)| route_label(Protocol::Http, i, earlier.name.as_deref()))
            });
            let covering: Option<Vec<String>> = shadowing.collect();
            if let Some(mut covering) = covering {
                covering.dedup();
                findings.push(
                    Finding::warning(
                        Category::Routing,
                        format!(
                            "VirtualService {} {} is shadowed by earlier {}",
                            vs.name_any(),
                            label,
                            covering.join(", ")
                        ),
                    )
                    .on(ResourceKind::VirtualService, vs)
                    .detail("Every match condition of this route is already accepted by an earlier route")
                    .suggestion("Reorder the routes so more specific matches come first"),
                );
            }
        }

        if route_matches_everything(route) {
            catch_all = Some(label);
        }
    }
}

fn check_subsets(
    snapshot: &IstioSnapshot,
    hosts: &HostRegistry<'_>,
    rules_by_host: &RulesByHost<'_>,
    referenced: &BTreeSet<(String, String)>,
    findings: &mut Vec<Finding>,
) {
    for (host, rules) in rules_by_host {
        let service = hosts.service(host);
        for (dr, spec) in rules {
            for subset in &spec.subsets {
                if let Some(service) = service {
                    let selector = string_map_at(service.spec(), &["selector"]);
                    if !selector.is_empty() {
                        let namespace = service.namespace_or_default();
                        let mut combined = selector.clone();
                        combined.extend(subset.labels.clone());
                        if pods_selected_by(&snapshot.pods, &namespace, &combined).next().is_none() {
                            findings.push(
                                Finding::warning(
                                    Category::Routing,
                                    format!(
                                        "DestinationRule {} subset '{}' selects no pods of Service {}/{}",
                                        dr.name_any(),
                                        subset.name,
                                        namespace,
                                        service.name_any()
                                    ),
                                )
                                .on(ResourceKind::DestinationRule, dr)
                                .detail(format!("Subset labels: {}", format_labels(&subset.labels)))
                                .suggestion("Fix the subset labels to match a deployed version of the workload"),
                            );
                        }
                    }
                }

                if !referenced.contains(&(host.clone(), subset.name.clone())) {
                    findings.push(
                        Finding::info(
                            Category::Routing,
                            format!(
                                "DestinationRule {} subset '{}' is not referenced by any VirtualService",
                                dr.name_any(),
                                subset.name
                            ),
                        )
                        .on(ResourceKind::DestinationRule, dr),
                    );
                }
            }
        }
    }
}
