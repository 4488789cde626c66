//! Linkerd policy checks (`policy.linkerd.io`).

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::Value;

use super::{container_ports, find_named, in_namespace, pod_is_terminated, pods_matching};
use crate::findings::{Category, Finding};
use crate::k8s::fields::{qualified_name, ObjectExt};
use crate::k8s::selectors::LabelSelector;
use crate::k8s::ResourceKind;

#[derive(Debug, Default)]
pub struct LinkerdSnapshot {
    pub servers: Vec<DynamicObject>,
    pub server_authorizations: Vec<DynamicObject>,
    pub authorization_policies: Vec<DynamicObject>,
    pub mesh_tls_authentications: Vec<DynamicObject>,
    pub pods: Vec<DynamicObject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSpec {
    #[serde(default)]
    pod_selector: LabelSelector,
    port: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerAuthorizationSpec {
    #[serde(default)]
    server: ServerTarget,
}

#[derive(Debug, Default, Deserialize)]
struct ServerTarget {
    name: Option<String>,
    selector: Option<LabelSelector>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationPolicySpec {
    #[serde(default)]
    target_ref: PolicyRef,
    #[serde(default)]
    required_authentication_refs: Vec<PolicyRef>,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyRef {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    name: String,
    namespace: Option<String>,
}

pub fn analyze(snapshot: &LinkerdSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();
    check_servers(snapshot, &mut findings);
    check_server_authorizations(snapshot, &mut findings);
    check_authorization_policies(snapshot, &mut findings);
    findings
}

fn check_servers(snapshot: &LinkerdSnapshot, findings: &mut Vec<Finding>) {
    for server in &snapshot.servers {
        let spec: ServerSpec = server.spec_as();
        let namespace = server.namespace_or_default();
        let selected: Vec<&DynamicObject> = pods_matching(&snapshot.pods, &namespace, &spec.pod_selector)
            .filter(|pod| !pod_is_terminated(pod))
            .collect();

        if selected.is_empty() {
            findings.push(
                Finding::warning(
                    Category::Mesh,
                    format!("Server {} podSelector matches no pods", qualified_name(server)),
                )
                .on(ResourceKind::LinkerdServer, server)
                .suggestion("Check the podSelector against the workload labels"),
            );
            continue;
        }

        let Some(port) = spec.port.as_ref() else {
            continue;
        };
        let exposed = selected.iter().flat_map(|pod| container_ports(pod)).any(|p| match port {
            Value::Number(n) => n.as_i64() == Some(p.port),
            Value::String(name) => p.name.as_deref() == Some(name.as_str()),
            _ => false,
        });
        if !exposed {
            findings.push(
                Finding::warning(
                    Category::Mesh,
                    format!(
                        "Server {} port {} is not exposed by any selected pod",
                        qualified_name(server),
                        port_display(port)
                    ),
                )
                .on(ResourceKind::LinkerdServer, server)
                .suggestion("Match the Server port to a containerPort number or name"),
            );
        }
    }
}

fn port_display(port: &Value) -> String {
    match port {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn check_server_authorizations(snapshot: &LinkerdSnapshot, findings: &mut Vec<Finding>) {
    for authorization in &snapshot.server_authorizations {
        let spec: ServerAuthorizationSpec = authorization.spec_as();
        let namespace = authorization.namespace_or_default();

        if let Some(name) = spec.server.name.as_deref() {
            if find_named(&snapshot.servers, Some(namespace.as_str()), name).is_none() {
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "ServerAuthorization {} targets missing Server '{}'",
                            qualified_name(authorization),
                            name
                        ),
                    )
                    .on(ResourceKind::LinkerdServerAuthorization, authorization),
                );
            }
        } else if let Some(selector) = &spec.server.selector {
            if !in_namespace(&snapshot.servers, Some(namespace.as_str())).any(|s| selector.matches(s.labels())) {
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "ServerAuthorization {} server selector matches no Servers",
                            qualified_name(authorization)
                        ),
                    )
                    .on(ResourceKind::LinkerdServerAuthorization, authorization),
                );
            }
        }
    }
}

fn check_authorization_policies(snapshot: &LinkerdSnapshot, findings: &mut Vec<Finding>) {
    for policy in &snapshot.authorization_policies {
        let spec: AuthorizationPolicySpec = policy.spec_as();
        let namespace = policy.namespace_or_default();

        if spec.target_ref.kind == "Server"
            && find_named(&snapshot.servers, Some(namespace.as_str()), &spec.target_ref.name).is_none()
        {
            findings.push(
                Finding::critical(
                    Category::Security,
                    format!(
                        "AuthorizationPolicy {} targets missing Server '{}'",
                        qualified_name(policy),
                        spec.target_ref.name
                    ),
                )
                .on(ResourceKind::LinkerdAuthorizationPolicy, policy),
            );
        }

        for reference in spec
            .required_authentication_refs
            .iter()
            .filter(|r| r.kind == "MeshTLSAuthentication")
        {
            let ref_namespace = reference.namespace.as_deref().unwrap_or(namespace.as_str());
            if find_named(&snapshot.mesh_tls_authentications, Some(ref_namespace), &reference.name).is_none() {
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "AuthorizationPolicy {} requires missing MeshTLSAuthentication {}/{}",
                            qualified_name(policy),
                            ref_namespace,
                            reference.name
                        ),
                    )
                    .on(ResourceKind::LinkerdAuthorizationPolicy, policy)
                    .detail("Requests are denied until the authentication exists"),
                );
            }
        }
    }
}
