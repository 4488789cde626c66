//! # Remediation Manifests
//!
//! Builders behind the `design_*` tools. Every builder validates its input, assembles the
//! Kubernetes objects as structured values and renders them as multi-document YAML. Nothing is
//! applied to the cluster.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::k8s::names::{is_dns1123_label, is_dns1123_subdomain};
use crate::k8s::selectors::Labels;
use crate::k8s::ResourceKind;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RemediationError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("failed to render YAML: {0}")]
    Render(String),
}

fn invalid(message: impl Into<String>) -> RemediationError {
    RemediationError::InvalidInput(message.into())
}

/// Generated objects plus what a reviewer should know about them.
#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    pub summary: String,
    pub warnings: Vec<String>,
    pub documents: Vec<Value>,
}

impl Remediation {
    fn new(summary: impl Into<String>) -> Self {
        Self { summary: summary.into(), warnings: Vec::new(), documents: Vec::new() }
    }

    /// `---`-separated YAML, one document per object.
    pub fn to_yaml(&self) -> Result<String, RemediationError> {
        let mut rendered = Vec::with_capacity(self.documents.len());
        for document in &self.documents {
            rendered.push(
                serde_yaml::to_string(document)
                    .map_err(|e| RemediationError::Render(e.to_string()))?,
            );
        }
        Ok(rendered.join("---\n"))
    }
}

fn object(kind: ResourceKind, name: &str, namespace: &str, spec: Value) -> Value {
    json!({
        "apiVersion": kind.api_version(),
        "kind": kind.kind(),
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": {"app.kubernetes.io/managed-by": "kubenet-mcp"}
        },
        "spec": spec
    })
}

fn require_label(field: &str, value: &str) -> Result<(), RemediationError> {
    if is_dns1123_label(value) {
        Ok(())
    } else {
        Err(invalid(format!("{} '{}' is not a valid DNS-1123 label", field, value)))
    }
}

fn require_name(field: &str, value: &str) -> Result<(), RemediationError> {
    if is_dns1123_subdomain(value) {
        Ok(())
    } else {
        Err(invalid(format!("{} '{}' is not a valid Kubernetes name", field, value)))
    }
}

fn require_port(field: &str, port: u32) -> Result<(), RemediationError> {
    if (1..=65535).contains(&port) {
        Ok(())
    } else {
        Err(invalid(format!("{} {} must be between 1 and 65535", field, port)))
    }
}

fn labels_value(labels: &Labels) -> Value {
    Value::Object(labels.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect())
}

// -----------------------------------------------------------------------------
// Gateway API HTTPRoute
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathMatch {
    #[default]
    Prefix,
    Exact,
}

impl PathMatch {
    fn gateway_api_type(&self) -> &'static str {
        match self {
            PathMatch::Prefix => "PathPrefix",
            PathMatch::Exact => "Exact",
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRouteParams {
    pub name: String,
    pub namespace: String,
    pub gateway: String,
    pub gateway_namespace: Option<String>,
    pub section_name: Option<String>,
    #[serde(default)]
    pub hostnames: Vec<String>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub path_match: PathMatch,
    pub backend_service: String,
    pub backend_namespace: Option<String>,
    pub backend_port: u32,
}

/// HTTPRoute attaching to a Gateway, with a ReferenceGrant when the backend lives in another
/// namespace.
pub fn gateway_api_route(params: &GatewayRouteParams) -> Result<Remediation, RemediationError> {
    require_name("name", &params.name)?;
    require_label("namespace", &params.namespace)?;
    require_name("gateway", &params.gateway)?;
    require_label("backend_service", &params.backend_service)?;
    require_port("backend_port", params.backend_port)?;
    if let Some(ns) = &params.gateway_namespace {
        require_label("gateway_namespace", ns)?;
    }
    if let Some(ns) = &params.backend_namespace {
        require_label("backend_namespace", ns)?;
    }
    if !params.path.starts_with('/') {
        return Err(invalid(format!("path '{}' must start with '/'", params.path)));
    }
    for hostname in &params.hostnames {
        let bare = hostname.strip_prefix("*.").unwrap_or(hostname);
        if !is_dns1123_subdomain(bare) {
            return Err(invalid(format!("hostname '{}' is not a valid DNS name", hostname)));
        }
    }

    let mut parent = Map::new();
    parent.insert("name".into(), json!(params.gateway));
    if let Some(ns) = &params.gateway_namespace {
        parent.insert("namespace".into(), json!(ns));
    }
    if let Some(section) = &params.section_name {
        parent.insert("sectionName".into(), json!(section));
    }

    let mut backend = Map::new();
    backend.insert("name".into(), json!(params.backend_service));
    backend.insert("port".into(), json!(params.backend_port));
    let cross_namespace_backend =
        params.backend_namespace.as_deref().filter(|ns| *ns != params.namespace);
    if let Some(ns) = cross_namespace_backend {
        backend.insert("namespace".into(), json!(ns));
    }

    let mut spec = json!({
        "parentRefs": [parent],
        "rules": [{
            "matches": [{"path": {"type": params.path_match.gateway_api_type(), "value": params.path}}],
            "backendRefs": [backend]
        }]
    });
    if !params.hostnames.is_empty() {
        spec["hostnames"] = json!(params.hostnames);
    }

    let mut remediation = Remediation::new(format!(
        "HTTPRoute {}/{} sends {} to Service {}:{} through Gateway {}",
        params.namespace,
        params.name,
        params.path,
        params.backend_service,
        params.backend_port,
        params.gateway
    ));
    remediation.documents.push(object(ResourceKind::HttpRoute, &params.name, &params.namespace, spec));

    if let Some(backend_ns) = cross_namespace_backend {
        remediation.documents.push(object(
            ResourceKind::ReferenceGrant,
            &format!("allow-{}-routes", params.namespace),
            backend_ns,
            json!({
                "from": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "namespace": params.namespace}],
                "to": [{"group": "", "kind": "Service", "name": params.backend_service}]
            }),
        ));
    }

    if params.gateway_namespace.as_deref().is_some_and(|ns| ns != params.namespace) {
        remediation.warnings.push(format!(
            "The Gateway listener must allow routes from namespace '{}' (allowedRoutes.namespaces)",
            params.namespace
        ));
    }
    Ok(remediation)
}

// -----------------------------------------------------------------------------
// Istio weighted traffic split
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SubsetWeight {
    pub name: String,
    pub weight: u32,
    /// Pod labels of the subset; defaults to `{<version_label>: <name>}`.
    #[serde(default)]
    pub labels: Labels,
}

fn default_version_label() -> String {
    "version".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficSplitParams {
    pub namespace: String,
    /// Short Service name, the VirtualService and DestinationRule are named after it.
    pub host: String,
    pub subsets: Vec<SubsetWeight>,
    #[serde(default = "default_version_label")]
    pub version_label: String,
}

/// VirtualService splitting traffic across DestinationRule subsets.
pub fn istio_traffic_split(params: &TrafficSplitParams) -> Result<Remediation, RemediationError> {
    require_label("namespace", &params.namespace)?;
    require_label("host", &params.host)?;
    if params.subsets.is_empty() {
        return Err(invalid("at least one subset is required"));
    }

    let mut seen = BTreeSet::new();
    for subset in &params.subsets {
        require_label("subset name", &subset.name)?;
        if !seen.insert(subset.name.as_str()) {
            return Err(invalid(format!("subset '{}' is listed twice", subset.name)));
        }
        if subset.weight > 100 {
            return Err(invalid(format!(
                "subset '{}' weight must be between 0 and 100, got {}",
                subset.name, subset.weight
            )));
        }
    }
    let total: u32 = params.subsets.iter().map(|s| s.weight).sum();
    if total != 100 {
        return Err(invalid(format!("subset weights must total 100, got {}", total)));
    }

    let host = format!("{}.{}.svc.cluster.local", params.host, params.namespace);
    let subsets: Vec<Value> = params
        .subsets
        .iter()
        .map(|subset| {
            let labels = if subset.labels.is_empty() {
                Labels::from([(params.version_label.clone(), subset.name.clone())])
            } else {
                subset.labels.clone()
            };
            json!({"name": subset.name, "labels": labels_value(&labels)})
        })
        .collect();
    let routes: Vec<Value> = params
        .subsets
        .iter()
        .map(|subset| {
            json!({"destination": {"host": host, "subset": subset.name}, "weight": subset.weight})
        })
        .collect();

    let split = params
        .subsets
        .iter()
        .map(|s| format!("{} {}%", s.name, s.weight))
        .collect::<Vec<_>>()
        .join(", ");
    let mut remediation =
        Remediation::new(format!("Traffic split for {}: {}", host, split));
    remediation.documents.push(object(
        ResourceKind::DestinationRule,
        &params.host,
        &params.namespace,
        json!({"host": host, "subsets": subsets}),
    ));
    remediation.documents.push(object(
        ResourceKind::VirtualService,
        &params.host,
        &params.namespace,
        json!({"hosts": [host], "http": [{"route": routes}]}),
    ));

    if params.subsets.iter().any(|s| s.weight == 0) {
        remediation.warnings.push("Subsets with weight 0 receive no traffic".to_string());
    }
    Ok(remediation)
}

// -----------------------------------------------------------------------------
// NetworkPolicy
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyPort {
    pub port: u32,
    #[serde(default)]
    pub protocol: PortProtocol,
}

impl PolicyPort {
    fn value(&self) -> Value {
        let protocol = match self.protocol {
            PortProtocol::Tcp => "TCP",
            PortProtocol::Udp => "UDP",
            PortProtocol::Sctp => "SCTP",
        };
        json!({"port": self.port, "protocol": protocol})
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkPolicyParams {
    pub name: String,
    pub namespace: String,
    /// Pods the policy protects; empty selects every pod in the namespace.
    #[serde(default)]
    pub pod_selector: Labels,
    /// Allowed client pods (same namespace unless `from_namespaces` is set).
    pub from_pods: Option<Labels>,
    /// Allowed client namespaces by label.
    pub from_namespaces: Option<Labels>,
    #[serde(default)]
    pub ports: Vec<PolicyPort>,
    /// Also emit a namespace-wide default-deny ingress policy.
    #[serde(default)]
    pub default_deny: bool,
}

pub fn network_policy(params: &NetworkPolicyParams) -> Result<Remediation, RemediationError> {
    require_name("name", &params.name)?;
    require_label("namespace", &params.namespace)?;
    for port in &params.ports {
        require_port("port", port.port)?;
    }

    let mut peer = Map::new();
    if let Some(pods) = &params.from_pods {
        peer.insert("podSelector".into(), json!({"matchLabels": labels_value(pods)}));
    }
    if let Some(namespaces) = &params.from_namespaces {
        peer.insert("namespaceSelector".into(), json!({"matchLabels": labels_value(namespaces)}));
    }

    let mut rule = Map::new();
    if !peer.is_empty() {
        rule.insert("from".into(), json!([peer]));
    }
    if !params.ports.is_empty() {
        rule.insert(
            "ports".into(),
            Value::Array(params.ports.iter().map(PolicyPort::value).collect()),
        );
    }

    let mut remediation = Remediation::new(format!(
        "NetworkPolicy {}/{} allows ingress to {}",
        params.namespace,
        params.name,
        if params.pod_selector.is_empty() {
            "all pods".to_string()
        } else {
            crate::analysis::format_labels(&params.pod_selector)
        }
    ));

    if params.default_deny {
        remediation.documents.push(object(
            ResourceKind::NetworkPolicy,
            "default-deny-ingress",
            &params.namespace,
            json!({"podSelector": {}, "policyTypes": ["Ingress"]}),
        ));
    }
    remediation.documents.push(object(
        ResourceKind::NetworkPolicy,
        &params.name,
        &params.namespace,
        json!({
            "podSelector": {"matchLabels": labels_value(&params.pod_selector)},
            "policyTypes": ["Ingress"],
            "ingress": [rule]
        }),
    ));

    if peer.is_empty() {
        remediation
            .warnings
            .push("No from_pods or from_namespaces given: any source may connect".to_string());
    }
    if params.from_namespaces.is_some() && params.from_pods.is_some() {
        remediation.warnings.push(
            "from_pods and from_namespaces are combined in one peer: both must match".to_string(),
        );
    }
    Ok(remediation)
}

// -----------------------------------------------------------------------------
// Istio AuthorizationPolicy
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthorizationAction {
    #[default]
    Allow,
    Deny,
}

impl AuthorizationAction {
    fn as_str(&self) -> &'static str {
        match self {
            AuthorizationAction::Allow => "ALLOW",
            AuthorizationAction::Deny => "DENY",
        }
    }
}

const HTTP_METHODS: [&str; 9] =
    ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "CONNECT", "TRACE"];

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationPolicyParams {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub selector: Labels,
    #[serde(default)]
    pub action: AuthorizationAction,
    /// SPIFFE principals, e.g. `cluster.local/ns/shop/sa/frontend`.
    #[serde(default)]
    pub principals: Vec<String>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub ports: Vec<u32>,
}

pub fn authorization_policy(
    params: &AuthorizationPolicyParams,
) -> Result<Remediation, RemediationError> {
    require_name("name", &params.name)?;
    require_label("namespace", &params.namespace)?;
    for namespace in &params.namespaces {
        require_label("source namespace", namespace)?;
    }
    for port in &params.ports {
        require_port("port", *port)?;
    }
    let methods: Vec<String> = params.methods.iter().map(|m| m.to_ascii_uppercase()).collect();
    if let Some(method) = methods.iter().find(|m| !HTTP_METHODS.contains(&m.as_str())) {
        return Err(invalid(format!("'{}' is not an HTTP method", method)));
    }
    if let Some(path) = params.paths.iter().find(|p| !p.starts_with('/') && p.as_str() != "*") {
        return Err(invalid(format!("path '{}' must start with '/'", path)));
    }

    let mut source = Map::new();
    if !params.principals.is_empty() {
        source.insert("principals".into(), json!(params.principals));
    }
    if !params.namespaces.is_empty() {
        source.insert("namespaces".into(), json!(params.namespaces));
    }
    let mut operation = Map::new();
    if !methods.is_empty() {
        operation.insert("methods".into(), json!(methods));
    }
    if !params.paths.is_empty() {
        operation.insert("paths".into(), json!(params.paths));
    }
    if !params.ports.is_empty() {
        let ports: Vec<String> = params.ports.iter().map(u32::to_string).collect();
        operation.insert("ports".into(), json!(ports));
    }

    let mut rule = Map::new();
    if !source.is_empty() {
        rule.insert("from".into(), json!([{"source": source}]));
    }
    if !operation.is_empty() {
        rule.insert("to".into(), json!([{"operation": operation}]));
    }
    let unconstrained = rule.is_empty();

    let mut spec = json!({"action": params.action.as_str(), "rules": [rule]});
    if !params.selector.is_empty() {
        spec["selector"] = json!({"matchLabels": labels_value(&params.selector)});
    }

    let target = if params.selector.is_empty() {
        format!("every workload in {}", params.namespace)
    } else {
        crate::analysis::format_labels(&params.selector)
    };
    let mut remediation = Remediation::new(format!(
        "AuthorizationPolicy {}/{} ({}) for {}",
        params.namespace,
        params.name,
        params.action.as_str(),
        target
    ));
    remediation.documents.push(object(
        ResourceKind::AuthorizationPolicy,
        &params.name,
        &params.namespace,
        spec,
    ));

    if unconstrained {
        remediation.warnings.push(match params.action {
            AuthorizationAction::Allow => {
                "The rule has no source or operation: it allows every request".to_string()
            }
            AuthorizationAction::Deny => {
                "The rule has no source or operation: it denies every request".to_string()
            }
        });
    }
    Ok(remediation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_params() -> GatewayRouteParams {
        GatewayRouteParams {
            name: "reviews".to_string(),
            namespace: "bookinfo".to_string(),
            gateway: "public".to_string(),
            gateway_namespace: None,
            section_name: None,
            hostnames: vec!["reviews.example.com".to_string()],
            path: "/reviews".to_string(),
            path_match: PathMatch::Prefix,
            backend_service: "reviews".to_string(),
            backend_namespace: None,
            backend_port: 9080,
        }
    }

    #[test]
    fn test_gateway_route_single_document() {
        let remediation = gateway_api_route(&route_params()).unwrap();
        assert_eq!(remediation.documents.len(), 1);
        let route = &remediation.documents[0];
        assert_eq!(route["apiVersion"], "gateway.networking.k8s.io/v1");
        assert_eq!(route["kind"], "HTTPRoute");
        assert_eq!(route["spec"]["rules"][0]["matches"][0]["path"]["type"], "PathPrefix");
        assert_eq!(route["spec"]["rules"][0]["backendRefs"][0]["port"], 9080);
        assert!(remediation.warnings.is_empty());

        let yaml = remediation.to_yaml().unwrap();
        assert!(yaml.contains("kind: HTTPRoute"));
        assert!(!yaml.contains("---"));
    }

    #[test]
    fn test_gateway_route_cross_namespace() {
        let mut params = route_params();
        params.gateway_namespace = Some("infra".to_string());
        params.backend_namespace = Some("reviews-ns".to_string());

        let remediation = gateway_api_route(&params).unwrap();
        assert_eq!(remediation.documents.len(), 2);
        let grant = &remediation.documents[1];
        assert_eq!(grant["kind"], "ReferenceGrant");
        assert_eq!(grant["metadata"]["namespace"], "reviews-ns");
        assert_eq!(remediation.warnings.len(), 1);
        assert_eq!(remediation.to_yaml().unwrap().matches("---").count(), 1);
    }

    #[test]
    fn test_gateway_route_rejects_bad_input() {
        let mut params = route_params();
        params.backend_port = 0;
        assert!(gateway_api_route(&params).is_err());

        let mut params = route_params();
        params.path = "reviews".to_string();
        assert!(gateway_api_route(&params).is_err());

        let mut params = route_params();
        params.namespace = "Book_Info".to_string();
        assert!(matches!(gateway_api_route(&params), Err(RemediationError::InvalidInput(_))));
    }

    fn split(weights: &[(&str, u32)]) -> TrafficSplitParams {
        TrafficSplitParams {
            namespace: "bookinfo".to_string(),
            host: "reviews".to_string(),
            subsets: weights
                .iter()
                .map(|(name, weight)| SubsetWeight {
                    name: name.to_string(),
                    weight: *weight,
                    labels: Labels::new(),
                })
                .collect(),
            version_label: default_version_label(),
        }
    }

    #[test]
    fn test_traffic_split() {
        let remediation = istio_traffic_split(&split(&[("v1", 80), ("v2", 20)])).unwrap();
        assert_eq!(remediation.documents.len(), 2);

        let rule = &remediation.documents[0];
        assert_eq!(rule["kind"], "DestinationRule");
        assert_eq!(rule["spec"]["subsets"][1]["labels"]["version"], "v2");

        let vs = &remediation.documents[1];
        assert_eq!(vs["kind"], "VirtualService");
        assert_eq!(vs["spec"]["http"][0]["route"][0]["weight"], 80);
        assert_eq!(
            vs["spec"]["http"][0]["route"][1]["destination"]["host"],
            "reviews.bookinfo.svc.cluster.local"
        );
        assert!(remediation.summary.contains("v1 80%, v2 20%"));
    }

    #[test]
    fn test_traffic_split_weights_must_total_100() {
        let err = istio_traffic_split(&split(&[("v1", 80), ("v2", 30)])).unwrap_err();
        assert_eq!(err, RemediationError::InvalidInput("subset weights must total 100, got 110".into()));
        assert!(istio_traffic_split(&split(&[])).is_err());
        assert!(istio_traffic_split(&split(&[("v1", 50), ("v1", 50)])).is_err());
    }

    #[test]
    fn test_traffic_split_rejects_out_of_range_weight() {
        let err = istio_traffic_split(&split(&[("v1", u32::MAX), ("v2", 101)])).unwrap_err();
        assert_eq!(
            err,
            RemediationError::InvalidInput(
                "subset 'v1' weight must be between 0 and 100, got 4294967295".into()
            )
        );
        assert!(istio_traffic_split(&split(&[("v1", 101), ("v2", 0)])).is_err());
    }

    #[test]
    fn test_network_policy_with_default_deny() {
        let params: NetworkPolicyParams = serde_json::from_value(json!({
            "name": "allow-frontend",
            "namespace": "shop",
            "pod_selector": {"app": "api"},
            "from_pods": {"app": "frontend"},
            "ports": [{"port": 8080}],
            "default_deny": true
        }))
        .unwrap();

        let remediation = network_policy(&params).unwrap();
        assert_eq!(remediation.documents.len(), 2);
        assert_eq!(remediation.documents[0]["metadata"]["name"], "default-deny-ingress");

        let allow = &remediation.documents[1];
        assert_eq!(allow["spec"]["podSelector"]["matchLabels"]["app"], "api");
        assert_eq!(allow["spec"]["ingress"][0]["from"][0]["podSelector"]["matchLabels"]["app"], "frontend");
        assert_eq!(allow["spec"]["ingress"][0]["ports"][0]["protocol"], "TCP");
        assert!(remediation.warnings.is_empty());
    }

    #[test]
    fn test_network_policy_without_peers_warns() {
        let params: NetworkPolicyParams =
            serde_json::from_value(json!({"name": "open", "namespace": "shop"})).unwrap();
        let remediation = network_policy(&params).unwrap();
        assert_eq!(remediation.documents.len(), 1);
        assert_eq!(remediation.warnings.len(), 1);
        assert!(remediation.summary.ends_with("all pods"));
    }

    #[test]
    fn test_authorization_policy() {
        let params: AuthorizationPolicyParams = serde_json::from_value(json!({
            "name": "reviews-viewer",
            "namespace": "bookinfo",
            "selector": {"app": "reviews"},
            "principals": ["cluster.local/ns/bookinfo/sa/productpage"],
            "methods": ["get"],
            "paths": ["/reviews/*"]
        }))
        .unwrap();

        let remediation = authorization_policy(&params).unwrap();
        let policy = &remediation.documents[0];
        assert_eq!(policy["apiVersion"], "security.istio.io/v1");
        assert_eq!(policy["spec"]["action"], "ALLOW");
        assert_eq!(policy["spec"]["rules"][0]["to"][0]["operation"]["methods"][0], "GET");
        assert_eq!(policy["spec"]["selector"]["matchLabels"]["app"], "reviews");
        assert!(remediation.warnings.is_empty());
    }

    #[test]
    fn test_authorization_policy_validation() {
        let params: AuthorizationPolicyParams = serde_json::from_value(json!({
            "name": "deny-all",
            "namespace": "bookinfo",
            "action": "DENY"
        }))
        .unwrap();
        let remediation = authorization_policy(&params).unwrap();
        assert!(remediation.warnings[0].contains("denies every request"));

        let params: AuthorizationPolicyParams = serde_json::from_value(json!({
            "name": "bad",
            "namespace": "bookinfo",
            "methods": ["FETCH"]
        }))
        .unwrap();
        assert!(authorization_policy(&params).is_err());
    }
}
