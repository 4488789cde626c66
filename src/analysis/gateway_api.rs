//! Gateway API misconfiguration scan.
//!
//! Walks GatewayClasses, Gateways, HTTPRoutes and GRPCRoutes the way the Gateway API attaches
//! them: class → gateway → listener → route → backend, checking every reference along the way.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use super::{find_named, hosts_intersect};
use crate::findings::{Category, Finding};
use crate::k8s::fields::{array_at, ObjectExt};
use crate::k8s::selectors::LabelSelector;
use crate::k8s::ResourceKind;

pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

#[derive(Debug, Default)]
pub struct GatewayApiSnapshot {
    pub gateway_classes: Vec<DynamicObject>,
    pub gateways: Vec<DynamicObject>,
    pub http_routes: Vec<DynamicObject>,
    pub grpc_routes: Vec<DynamicObject>,
    pub reference_grants: Vec<DynamicObject>,
    pub services: Vec<DynamicObject>,
    pub namespaces: Vec<DynamicObject>,
    /// `(namespace, name)` of certificate Secrets that exist.
    pub existing_secrets: BTreeSet<(String, String)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewaySpec {
    #[serde(default)]
    gateway_class_name: String,
    #[serde(default)]
    listeners: Vec<Listener>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Listener {
    #[serde(default)]
    name: String,
    hostname: Option<String>,
    #[serde(default)]
    port: i64,
    #[serde(default)]
    protocol: String,
    tls: Option<ListenerTls>,
    allowed_routes: Option<AllowedRoutes>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListenerTls {
    mode: Option<String>,
    #[serde(default)]
    certificate_refs: Vec<ObjectReference>,
}

#[derive(Debug, Default, Deserialize)]
struct AllowedRoutes {
    namespaces: Option<RouteNamespaces>,
    #[serde(default)]
    kinds: Vec<RouteGroupKind>,
}

#[derive(Debug, Default, Deserialize)]
struct RouteNamespaces {
    from: Option<String>,
    selector: Option<LabelSelector>,
}

#[derive(Debug, Default, Deserialize)]
struct RouteGroupKind {
    #[serde(default)]
    kind: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectReference {
    #[serde(default)]
    name: String,
    namespace: Option<String>,
    kind: Option<String>,
    group: Option<String>,
    port: Option<i64>,
    section_name: Option<String>,
    weight: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteSpec {
    #[serde(default)]
    parent_refs: Vec<ObjectReference>,
    #[serde(default)]
    hostnames: Vec<String>,
    #[serde(default)]
    rules: Vec<RouteRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteRule {
    #[serde(default)]
    backend_refs: Vec<ObjectReference>,
}

/// `(namespace, name)` of every Secret referenced by a Gateway listener certificate.
pub fn certificate_secret_refs(gateways: &[DynamicObject]) -> BTreeSet<(String, String)> {
    gateways
        .iter()
        .flat_map(|gateway| {
            let namespace = gateway.namespace_or_default();
            let spec: GatewaySpec = gateway.spec_as();
            spec.listeners
                .into_iter()
                .filter_map(|l| l.tls)
                .flat_map(|tls| tls.certificate_refs)
                .filter(is_secret_ref)
                .map(|r| (r.namespace.unwrap_or_else(|| namespace.clone()), r.name))
                .collect::<Vec<_>>()
        })
        .collect()
}

fn is_secret_ref(reference: &ObjectReference) -> bool {
    reference.group.as_deref().unwrap_or("").is_empty()
        && reference.kind.as_deref().unwrap_or("Secret") == "Secret"
}

/// A cross-namespace reference `from` → `to` is permitted by a ReferenceGrant in the target
/// namespace.
fn reference_granted(
    grants: &[DynamicObject],
    from_kind: &str,
    from_namespace: &str,
    to_group: &str,
    to_kind: &str,
    to_namespace: &str,
    to_name: &str,
) -> bool {
    grants.iter().filter(|g| g.namespace().as_deref() == Some(to_namespace)).any(|grant| {
        let from_ok = array_at(grant.spec(), &["from"]).iter().any(|from| {
            from.get("group").and_then(|v| v.as_str()) == Some(GATEWAY_GROUP)
                && from.get("kind").and_then(|v| v.as_str()) == Some(from_kind)
                && from.get("namespace").and_then(|v| v.as_str()) == Some(from_namespace)
        });
        let to_ok = array_at(grant.spec(), &["to"]).iter().any(|to| {
            to.get("group").and_then(|v| v.as_str()).unwrap_or("") == to_group
                && to.get("kind").and_then(|v| v.as_str()) == Some(to_kind)
                && to.get("name").and_then(|v| v.as_str()).is_none_or(|name| name == to_name)
        });
        from_ok && to_ok
    })
}

pub fn scan(snapshot: &GatewayApiSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for class in &snapshot.gateway_classes {
        report_false_conditions(ResourceKind::GatewayClass, class, &class.status_conditions(), &mut findings);
    }

    let mut gateways: BTreeMap<(String, String), (&DynamicObject, GatewaySpec)> = BTreeMap::new();
    for gateway in &snapshot.gateways {
        let spec: GatewaySpec = gateway.spec_as();
        check_gateway(snapshot, gateway, &spec, &mut findings);
        gateways.insert((gateway.namespace_or_default(), gateway.name_any()), (gateway, spec));
    }

    for (kind, routes) in [
        (ResourceKind::HttpRoute, &snapshot.http_routes),
        (ResourceKind::GrpcRoute, &snapshot.grpc_routes),
    ] {
        for route in routes {
            check_route(snapshot, &gateways, kind, route, &mut findings);
        }
    }

    findings
}

fn report_false_conditions(
    kind: ResourceKind,
    obj: &DynamicObject,
    conditions: &[crate::k8s::fields::Condition],
    findings: &mut Vec<Finding>,
) {
    for condition in conditions.iter().filter(|c| c.is_false()) {
        findings.push(
            Finding::warning(
                Category::Configuration,
                format!(
                    "{} {} reports {}=False{}",
                    kind.kind(),
                    crate::k8s::fields::qualified_name(obj),
                    condition.type_,
                    condition.reason.as_deref().map(|r| format!(" ({})", r)).unwrap_or_default()
                ),
            )
            .on(kind, obj)
            .detail(condition.message.clone().unwrap_or_default()),
        );
    }
}

fn check_gateway(
    snapshot: &GatewayApiSnapshot,
    gateway: &DynamicObject,
    spec: &GatewaySpec,
    findings: &mut Vec<Finding>,
) {
    let namespace = gateway.namespace_or_default();
    let name = gateway.name_any();

    if find_named(&snapshot.gateway_classes, None, &spec.gateway_class_name).is_none() {
        findings.push(
            Finding::critical(
                Category::Configuration,
                format!(
                    "Gateway {}/{} uses GatewayClass '{}' which does not exist",
                    namespace, name, spec.gateway_class_name
                ),
            )
            .on(ResourceKind::Gateway, gateway)
            .suggestion("Install the gateway controller or set gatewayClassName to an existing GatewayClass"),
        );
    }

    report_false_conditions(ResourceKind::Gateway, gateway, &gateway.status_conditions(), findings);
    for listener_status in array_at(gateway.status(), &["listeners"]) {
        let conditions = crate::k8s::fields::conditions(array_at(listener_status, &["conditions"]));
        report_false_conditions(ResourceKind::Gateway, gateway, &conditions, findings);
    }

    let mut seen: BTreeMap<(i64, String, String), &str> = BTreeMap::new();
    for listener in &spec.listeners {
        let key = (
            listener.port,
            listener.protocol.to_ascii_uppercase(),
            listener.hostname.clone().unwrap_or_default(),
        );
        if let Some(previous) = seen.insert(key, listener.name.as_str()) {
            findings.push(
                Finding::critical(
                    Category::Configuration,
                    format!(
                        "Gateway {}/{} listeners '{}' and '{}' conflict on port {} {} hostname '{}'",
                        namespace,
                        name,
                        previous,
                        listener.name,
                        listener.port,
                        listener.protocol,
                        listener.hostname.as_deref().unwrap_or("*")
                    ),
                )
                .on(ResourceKind::Gateway, gateway)
                .suggestion("Give each listener a distinct port, protocol or hostname"),
            );
        }

        check_listener_tls(snapshot, gateway, listener, findings);
    }
}

fn check_listener_tls(
    snapshot: &GatewayApiSnapshot,
    gateway: &DynamicObject,
    listener: &Listener,
    findings: &mut Vec<Finding>,
) {
    let protocol = listener.protocol.to_ascii_uppercase();
    if protocol != "HTTPS" && protocol != "TLS" {
        return;
    }
    let namespace = gateway.namespace_or_default();
    let mode = listener.tls.as_ref().and_then(|t| t.mode.as_deref()).unwrap_or("Terminate");
    if mode != "Terminate" {
        return;
    }

    let refs = listener.tls.as_ref().map(|t| t.certificate_refs.as_slice()).unwrap_or(&[]);
    if refs.is_empty() {
        findings.push(
            Finding::critical(
                Category::Tls,
                format!(
                    "Gateway {}/{} listener '{}' terminates TLS but has no certificateRefs",
                    namespace,
                    gateway.name_any(),
                    listener.name
                ),
            )
            .on(ResourceKind::Gateway, gateway)
            .suggestion("Add tls.certificateRefs pointing at a kubernetes.io/tls Secret"),
        );
        return;
    }

    for reference in refs.iter().filter(|r| is_secret_ref(r)) {
        let secret_namespace = reference.namespace.clone().unwrap_or_else(|| namespace.clone());
        if !snapshot.existing_secrets.contains(&(secret_namespace.clone(), reference.name.clone())) {
            findings.push(
                Finding::critical(
                    Category::Tls,
                    format!(
                        "Gateway {}/{} listener '{}' references Secret {}/{} which does not exist",
                        namespace,
                        gateway.name_any(),
                        listener.name,
                        secret_namespace,
                        reference.name
                    ),
                )
                .on(ResourceKind::Gateway, gateway)
                .suggestion("Create the TLS Secret or fix the certificateRef"),
            );
        }
        if secret_namespace != namespace
            && !reference_granted(
                &snapshot.reference_grants,
                "Gateway",
                &namespace,
                "",
                "Secret",
                &secret_namespace,
                &reference.name,
            )
        {
            findings.push(
                Finding::critical(
                    Category::Security,
                    format!(
                        "Gateway {}/{} listener '{}' references Secret {}/{} across namespaces without a ReferenceGrant",
                        namespace,
                        gateway.name_any(),
                        listener.name,
                        secret_namespace,
                        reference.name
                    ),
                )
                .on(ResourceKind::Gateway, gateway)
                .suggestion(format!(
                    "Create a ReferenceGrant in namespace {} allowing Gateways from {} to reference Secrets",
                    secret_namespace, namespace
                )),
            );
        }
    }
}

/// Whether a listener accepts routes of `route_kind` from `route_namespace`.
fn listener_allows(
    snapshot: &GatewayApiSnapshot,
    listener: &Listener,
    gateway_namespace: &str,
    route_kind: ResourceKind,
    route_namespace: &str,
) -> bool {
    let allowed = listener.allowed_routes.as_ref();
    let kinds = allowed.map(|a| a.kinds.as_slice()).unwrap_or(&[]);
    let kind_ok = if kinds.is_empty() {
        matches!(listener.protocol.to_ascii_uppercase().as_str(), "HTTP" | "HTTPS")
    } else {
        kinds.iter().any(|k| k.kind == route_kind.kind())
    };

    let namespaces = allowed.and_then(|a| a.namespaces.as_ref());
    let namespace_ok = match namespaces.and_then(|n| n.from.as_deref()).unwrap_or("Same") {
        "All" => true,
        "Selector" => {
            let selector = namespaces.and_then(|n| n.selector.clone()).unwrap_or_default();
            find_named(&snapshot.namespaces, None, route_namespace)
                .is_some_and(|ns| selector.matches(ns.labels()))
        }
        _ => route_namespace == gateway_namespace,
    };

    kind_ok && namespace_ok
}

fn check_route(
    snapshot: &GatewayApiSnapshot,
    gateways: &BTreeMap<(String, String), (&DynamicObject, GatewaySpec)>,
    kind: ResourceKind,
    route: &DynamicObject,
    findings: &mut Vec<Finding>,
) {
    let spec: RouteSpec = route.spec_as();
    let namespace = route.namespace_or_default();
    let route_name = format!("{} {}/{}", kind.kind(), namespace, route.name_any());

    for parent_status in array_at(route.status(), &["parents"]) {
        let conditions = crate::k8s::fields::conditions(array_at(parent_status, &["conditions"]));
        report_false_conditions(kind, route, &conditions, findings);
    }

    for parent in &spec.parent_refs {
        if parent.kind.as_deref().unwrap_or("Gateway") != "Gateway" {
            continue;
        }
        let parent_namespace = parent.namespace.clone().unwrap_or_else(|| namespace.clone());
        let Some((_, gateway_spec)) = gateways.get(&(parent_namespace.clone(), parent.name.clone())) else {
            findings.push(
                Finding::critical(
                    Category::Routing,
                    format!(
                        "{} references parent Gateway {}/{} which does not exist",
                        route_name, parent_namespace, parent.name
                    ),
                )
                .on(kind, route)
                .suggestion("Fix parentRefs or create the Gateway"),
            );
            continue;
        };

        let listeners: Vec<&Listener> = match &parent.section_name {
            Some(section) => {
                let matching: Vec<&Listener> =
                    gateway_spec.listeners.iter().filter(|l| &l.name == section).collect();
                if matching.is_empty() {
                    findings.push(
                        Finding::critical(
                            Category::Routing,
                            format!(
                                "{} references listener '{}' which Gateway {}/{} does not define",
                                route_name, section, parent_namespace, parent.name
                            ),
                        )
                        .on(kind, route)
                        .detail(format!(
                            "Listeners: {}",
                            gateway_spec.listeners.iter().map(|l| l.name.as_str()).collect::<Vec<_>>().join(", ")
                        )),
                    );
                    continue;
                }
                matching
            }
            None => gateway_spec
                .listeners
                .iter()
                .filter(|l| parent.port.is_none_or(|port| port == l.port))
                .collect(),
        };

        let allowed: Vec<&Listener> = listeners
            .into_iter()
            .filter(|l| listener_allows(snapshot, l, &parent_namespace, kind, &namespace))
            .collect();
        if allowed.is_empty() {
            findings.push(
                Finding::critical(
                    Category::Routing,
                    format!(
                        "{} is not allowed to attach to Gateway {}/{}",
                        route_name, parent_namespace, parent.name
                    ),
                )
                .on(kind, route)
                .detail("No listener's allowedRoutes admits this route's namespace and kind")
                .suggestion("Set allowedRoutes.namespaces.from to All or Selector on the listener, or move the route"),
            );
            continue;
        }

        if !spec.hostnames.is_empty() {
            let intersects = allowed.iter().any(|l| match &l.hostname {
                None => true,
                Some(listener_host) => spec.hostnames.iter().any(|h| hosts_intersect(h, listener_host)),
            });
            if !intersects {
                findings.push(
                    Finding::warning(
                        Category::Routing,
                        format!(
                            "{} hostnames do not intersect any listener hostname of Gateway {}/{}",
                            route_name, parent_namespace, parent.name
                        ),
                    )
                    .on(kind, route)
                    .detail(format!("Route hostnames: {}", spec.hostnames.join(", ")))
                    .suggestion("Align the route hostnames with the listener hostnames"),
                );
            }
        }
    }

    check_backends(snapshot, kind, route, &spec, &route_name, findings);
}

fn check_backends(
    snapshot: &GatewayApiSnapshot,
    kind: ResourceKind,
    route: &DynamicObject,
    spec: &RouteSpec,
    route_name: &str,
    findings: &mut Vec<Finding>,
) {
    let namespace = route.namespace_or_default();

    for (index, rule) in spec.rules.iter().enumerate() {
        if !rule.backend_refs.is_empty() && rule.backend_refs.iter().all(|b| b.weight == Some(0)) {
            findings.push(
                Finding::warning(
                    Category::Routing,
                    format!("{} rule #{} has only zero-weight backends", route_name, index + 1),
                )
                .on(kind, route)
                .detail("Requests matching this rule receive a 500 response")
                .suggestion("Give at least one backendRef a non-zero weight"),
            );
        }

        for backend in &rule.backend_refs {
            let is_service = backend.group.as_deref().unwrap_or("").is_empty()
                && backend.kind.as_deref().unwrap_or("Service") == "Service";
            if !is_service {
                continue;
            }
            let backend_namespace = backend.namespace.clone().unwrap_or_else(|| namespace.clone());

            if backend_namespace != namespace
                && !reference_granted(
                    &snapshot.reference_grants,
                    kind.kind(),
                    &namespace,
                    "",
                    "Service",
                    &backend_namespace,
                    &backend.name,
                )
            {
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "{} references Service {}/{} across namespaces without a ReferenceGrant",
                            route_name, backend_namespace, backend.name
                        ),
                    )
                    .on(kind, route)
                    .suggestion(format!(
                        "Create a ReferenceGrant in namespace {} allowing {}s from {} to reference Services",
                        backend_namespace,
                        kind.kind(),
                        namespace
                    )),
                );
            }

            let Some(service) = find_named(&snapshot.services, Some(backend_namespace.as_str()), &backend.name) else {
                findings.push(
                    Finding::critical(
                        Category::Connectivity,
                        format!(
                            "{} routes to Service {}/{} which does not exist",
                            route_name, backend_namespace, backend.name
                        ),
                    )
                    .on(kind, route)
                    .suggestion("Create the Service or fix the backendRef name"),
                );
                continue;
            };

            let service_ports: Vec<i64> = array_at(service.spec(), &["ports"])
                .iter()
                .filter_map(|p| p.get("port").and_then(|v| v.as_i64()))
                .collect();
            match backend.port {
                None => findings.push(
                    Finding::critical(
                        Category::Connectivity,
                        format!(
                            "{} backendRef to Service {}/{} has no port",
                            route_name, backend_namespace, backend.name
                        ),
                    )
                    .on(kind, route)
                    .suggestion("Set backendRefs[].port; it is required for Service backends"),
                ),
                Some(port) if !service_ports.contains(&port) => findings.push(
                    Finding::critical(
                        Category::Connectivity,
                        format!(
                            "{} backendRef port {} is not exposed by Service {}/{}",
                            route_name, port, backend_namespace, backend.name
                        ),
                    )
                    .on(kind, route)
                    .detail(format!(
                        "Service ports: {}",
                        service_ports.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(", ")
                    )),
                ),
                Some(_) => {}
            }
        }
    }
}
