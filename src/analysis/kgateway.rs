//! kgateway control plane and policy attachment checks.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;

use super::find_named;
use crate::findings::{Category, Finding};
use crate::k8s::fields::{i64_at, qualified_name, ObjectExt};
use crate::k8s::ResourceKind;

pub const CONTROLLER_NAME: &str = "kgateway.dev/kgateway";
pub const CONTROLLER_DEPLOYMENT: &str = "kgateway";
pub const CONTROLLER_NAMESPACE: &str = "kgateway-system";

#[derive(Debug, Default)]
pub struct KgatewaySnapshot {
    pub gateway_classes: Vec<DynamicObject>,
    pub gateways: Vec<DynamicObject>,
    pub http_routes: Vec<DynamicObject>,
    pub gateway_parameters: Vec<DynamicObject>,
    pub traffic_policies: Vec<DynamicObject>,
    pub http_listener_policies: Vec<DynamicObject>,
    pub backends: Vec<DynamicObject>,
    pub deployments: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayClassSpec {
    #[serde(default)]
    controller_name: String,
    parameters_ref: Option<ParametersRef>,
}

#[derive(Debug, Default, Deserialize)]
struct ParametersRef {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
    namespace: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicySpec {
    #[serde(default)]
    target_refs: Vec<TargetRef>,
    target_ref: Option<TargetRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TargetRef {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct BackendSpec {
    #[serde(rename = "type", default)]
    backend_type: String,
    #[serde(rename = "static")]
    static_backend: Option<StaticBackend>,
}

#[derive(Debug, Default, Deserialize)]
struct StaticBackend {
    #[serde(default)]
    hosts: Vec<serde_json::Value>,
}

pub fn check_health(snapshot: &KgatewaySnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    let classes: Vec<(&DynamicObject, GatewayClassSpec)> = snapshot
        .gateway_classes
        .iter()
        .map(|class| (class, class.spec_as::<GatewayClassSpec>()))
        .filter(|(_, spec)| spec.controller_name == CONTROLLER_NAME)
        .collect();
    if classes.is_empty() {
        findings.push(
            Finding::warning(
                Category::Configuration,
                format!("No GatewayClass uses controller {}", CONTROLLER_NAME),
            )
            .suggestion("Install kgateway or create its GatewayClass"),
        );
    }

    for (class, spec) in &classes {
        let Some(reference) = &spec.parameters_ref else {
            continue;
        };
        let resolves = reference.kind == "GatewayParameters"
            && find_named(&snapshot.gateway_parameters, reference.namespace.as_deref(), &reference.name).is_some();
        if !resolves {
            findings.push(
                Finding::critical(
                    Category::Configuration,
                    format!(
                        "GatewayClass {} parametersRef {} {} does not resolve",
                        class.name_any(),
                        reference.kind,
                        reference.name
                    ),
                )
                .on(ResourceKind::GatewayClass, class)
                .suggestion("Create the GatewayParameters or fix the reference"),
            );
        }
    }

    check_controller(snapshot, &mut findings);

    for (kind, policies) in [
        (ResourceKind::TrafficPolicy, &snapshot.traffic_policies),
        (ResourceKind::HttpListenerPolicy, &snapshot.http_listener_policies),
    ] {
        for policy in policies {
            check_target_refs(snapshot, kind, policy, &mut findings);
        }
    }

    for backend in &snapshot.backends {
        let spec: BackendSpec = backend.spec_as();
        if spec.backend_type == "Static" && spec.static_backend.is_none_or(|s| s.hosts.is_empty()) {
            findings.push(
                Finding::warning(
                    Category::Configuration,
                    format!("Static Backend {} has no hosts", qualified_name(backend)),
                )
                .on(ResourceKind::KgatewayBackend, backend),
            );
        }
    }

    findings
}

fn check_controller(snapshot: &KgatewaySnapshot, findings: &mut Vec<Finding>) {
    let deployment = find_named(&snapshot.deployments, Some(CONTROLLER_NAMESPACE), CONTROLLER_DEPLOYMENT)
        .or_else(|| find_named(&snapshot.deployments, None, CONTROLLER_DEPLOYMENT));
    let Some(deployment) = deployment else {
        findings.push(Finding::warning(
            Category::Configuration,
            format!("kgateway controller Deployment '{}' not found", CONTROLLER_DEPLOYMENT),
        ));
        return;
    };

    let desired = i64_at(deployment.spec(), &["replicas"]).unwrap_or(1);
    let ready = i64_at(deployment.status(), &["readyReplicas"]).unwrap_or_default();
    if ready < desired.max(1) {
        findings.push(
            Finding::critical(
                Category::Configuration,
                format!("kgateway controller {} has {}/{} replicas ready", qualified_name(deployment), ready, desired),
            )
            .on(ResourceKind::Deployment, deployment)
            .suggestion("Check the controller pod logs and events"),
        );
    }
}

fn check_target_refs(
    snapshot: &KgatewaySnapshot,
    kind: ResourceKind,
    policy: &DynamicObject,
    findings: &mut Vec<Finding>,
) {
    let spec: PolicySpec = policy.spec_as();
    let namespace = policy.namespace_or_default();
    let targets = spec.target_refs.iter().chain(spec.target_ref.iter());

    for target in targets {
        let candidates = match target.kind.as_str() {
            "Gateway" => &snapshot.gateways,
            "HTTPRoute" => &snapshot.http_routes,
            _ => continue,
        };
        if find_named(candidates, Some(namespace.as_str()), &target.name).is_none() {
            findings.push(
                Finding::critical(
                    Category::Policy,
                    format!(
                        "{} {} targets missing {} '{}'",
                        kind.kind(),
                        qualified_name(policy),
                        target.kind,
                        target.name
                    ),
                )
                .on(kind, policy)
                .detail("Policies attach only to targets in their own namespace"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::obj;
    use crate::findings::Severity;
    use serde_json::{json, Value};

    fn class(parameters_ref: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "GatewayClass",
            "metadata": {"name": "kgateway"},
            "spec": {"controllerName": "kgateway.dev/kgateway", "parametersRef": parameters_ref}
        }))
    }

    fn controller(ready: i64) -> DynamicObject {
        obj(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "kgateway", "namespace": "kgateway-system"},
            "spec": {"replicas": 1},
            "status": {"readyReplicas": ready}
        }))
    }

    fn healthy() -> KgatewaySnapshot {
        KgatewaySnapshot {
            gateway_classes: vec![class(json!({
                "group": "gateway.kgateway.dev", "kind": "GatewayParameters",
                "name": "kgateway", "namespace": "kgateway-system"
            }))],
            gateway_parameters: vec![obj(json!({
                "apiVersion": "gateway.kgateway.dev/v1alpha1",
                "kind": "GatewayParameters",
                "metadata": {"name": "kgateway", "namespace": "kgateway-system"},
                "spec": {}
            }))],
            gateways: vec![obj(json!({
                "apiVersion": "gateway.networking.k8s.io/v1",
                "kind": "Gateway",
                "metadata": {"name": "http", "namespace": "shop"},
                "spec": {"gatewayClassName": "kgateway", "listeners": []}
            }))],
            deployments: vec![controller(1)],
            ..Default::default()
        }
    }

    fn policy(kind: &str, targets: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "gateway.kgateway.dev/v1alpha1",
            "kind": kind,
            "metadata": {"name": "p", "namespace": "shop"},
            "spec": {"targetRefs": targets}
        }))
    }

    #[test]
    fn test_healthy_install() {
        assert!(check_health(&healthy()).is_empty());
    }

    #[test]
    fn test_missing_class_and_controller() {
        let findings = check_health(&KgatewaySnapshot::default());
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().all(|f| f.severity == Severity::Warning));
    }

    #[test]
    fn test_controller_not_ready() {
        let mut snapshot = healthy();
        snapshot.deployments = vec![controller(0)];
        let findings = check_health(&snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[test]
    fn test_unresolved_parameters_ref() {
        let mut snapshot = healthy();
        snapshot.gateway_parameters.clear();
        let findings = check_health(&snapshot);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].summary.contains("parametersRef"));
    }

    #[test]
    fn test_policy_targets() {
        let mut snapshot = healthy();
        snapshot.traffic_policies = vec![policy(
            "TrafficPolicy",
            json!([
                {"group": "gateway.networking.k8s.io", "kind": "Gateway", "name": "http"},
                {"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "checkout"}
            ]),
        )];
        snapshot.http_listener_policies =
            vec![policy("HTTPListenerPolicy", json!([{"group": "gateway.networking.k8s.io", "kind": "Gateway", "name": "edge"}]))];
        let findings = check_health(&snapshot);
        let summaries: Vec<&str> = findings.iter().map(|f| f.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec![
                "TrafficPolicy shop/p targets missing HTTPRoute 'checkout'",
                "HTTPListenerPolicy shop/p targets missing Gateway 'edge'"
            ]
        );
    }

    #[test]
    fn test_static_backend_without_hosts() {
        let mut snapshot = healthy();
        snapshot.backends = vec![obj(json!({
            "apiVersion": "gateway.kgateway.dev/v1alpha1",
            "kind": "Backend",
            "metadata": {"name": "httpbin", "namespace": "shop"},
            "spec": {"type": "Static", "static": {"hosts": []}}
        }))];
        let findings = check_health(&snapshot);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].summary, "Static Backend shop/httpbin has no hosts");
    }
}
