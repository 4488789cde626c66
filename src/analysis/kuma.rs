//! Kuma mesh checks.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Deserialize;

use crate::findings::{Category, Finding};
use crate::k8s::fields::ObjectExt;
use crate::k8s::ResourceKind;

pub const MESH_LABEL: &str = "kuma.io/mesh";
pub const DEFAULT_MESH: &str = "default";

#[derive(Debug, Default)]
pub struct KumaSnapshot {
    pub meshes: Vec<DynamicObject>,
    /// Mesh-scoped policies of every kind, tagged with their kind.
    pub policies: Vec<(ResourceKind, DynamicObject)>,
}

#[derive(Debug, Default, Deserialize)]
struct MeshSpec {
    mtls: Option<Mtls>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mtls {
    #[serde(default)]
    enabled_backend: String,
    #[serde(default)]
    backends: Vec<Backend>,
}

#[derive(Debug, Default, Deserialize)]
struct Backend {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrafficPermissionSpec {
    target_ref: Option<TargetRef>,
    #[serde(default)]
    from: Vec<FromEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct TargetRef {
    #[serde(default)]
    kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FromEntry {
    target_ref: Option<TargetRef>,
    #[serde(default)]
    default: Conf,
}

#[derive(Debug, Default, Deserialize)]
struct Conf {
    #[serde(default)]
    action: String,
}

/// Mesh a policy belongs to.
pub fn mesh_of(obj: &DynamicObject) -> String {
    obj.labels().get(MESH_LABEL).cloned().unwrap_or_else(|| DEFAULT_MESH.to_string())
}

fn mtls_enabled(mesh: &DynamicObject) -> bool {
    mesh.spec_as::<MeshSpec>().mtls.is_some_and(|m| !m.enabled_backend.is_empty())
}

pub fn check_mesh(snapshot: &KumaSnapshot) -> Vec<Finding> {
    let mut findings = Vec::new();

    for mesh in &snapshot.meshes {
        let spec: MeshSpec = mesh.spec_as();
        if let Some(mtls) = spec.mtls {
            if !mtls.enabled_backend.is_empty()
                && !mtls.backends.iter().any(|b| b.name == mtls.enabled_backend)
            {
                let declared: Vec<&str> = mtls.backends.iter().map(|b| b.name.as_str()).collect();
                findings.push(
                    Finding::critical(
                        Category::Security,
                        format!(
                            "Mesh {} enables mTLS backend '{}' which is not declared",
                            mesh.name_any(),
                            mtls.enabled_backend
                        ),
                    )
                    .on(ResourceKind::KumaMesh, mesh)
                    .detail(format!("Declared backends: [{}]", declared.join(", ")))
                    .suggestion("Point enabledBackend at one of spec.mtls.backends"),
                );
            }
        }
    }

    for (kind, policy) in &snapshot.policies {
        let mesh_name = mesh_of(policy);
        let label = format!("{} {}/{}", kind.kind(), policy.namespace_or_default(), policy.name_any());

        let Some(mesh) = snapshot.meshes.iter().find(|m| m.name_any() == mesh_name) else {
            findings.push(
                Finding::critical(
                    Category::Mesh,
                    format!("{} belongs to mesh '{}' which does not exist", label, mesh_name),
                )
                .on(*kind, policy)
                .suggestion(format!("Create the Mesh or fix the {} label", MESH_LABEL)),
            );
            continue;
        };

        if *kind != ResourceKind::MeshTrafficPermission {
            continue;
        }

        if !mtls_enabled(mesh) {
            findings.push(
                Finding::warning(
                    Category::Security,
                    format!("{} has no effect: mesh '{}' does not enable mTLS", label, mesh_name),
                )
                .on(*kind, policy)
                .detail("Traffic permissions are enforced only when mutual TLS identifies the caller")
                .suggestion("Enable mtls on the Mesh"),
            );
        }

        let spec: TrafficPermissionSpec = policy.spec_as();
        let targets_mesh = spec.target_ref.as_ref().is_none_or(|t| t.kind == "Mesh");
        let denies_mesh = spec.from.iter().any(|entry| {
            entry.target_ref.as_ref().is_some_and(|t| t.kind == "Mesh") && entry.default.action == "Deny"
        });
        if targets_mesh && denies_mesh {
            findings.push(
                Finding::warning(
                    Category::Policy,
                    format!("{} denies all traffic in mesh '{}'", label, mesh_name),
                )
                .on(*kind, policy)
                .suggestion("Add more specific Allow permissions for the services that must talk"),
            );
        }
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fixtures::obj;
    use crate::findings::Severity;
    use serde_json::{json, Value};

    fn mesh(name: &str, spec: Value) -> DynamicObject {
        obj(json!({
            "apiVersion": "kuma.io/v1alpha1",
            "kind": "Mesh",
            "metadata": {"name": name},
            "spec": spec
        }))
    }

    fn mtp(name: &str, mesh: &str, spec: Value) -> (ResourceKind, DynamicObject) {
        (
            ResourceKind::MeshTrafficPermission,
            obj(json!({
                "apiVersion": "kuma.io/v1alpha1",
                "kind": "MeshTrafficPermission",
                "metadata": {"name": name, "namespace": "kuma-system", "labels": {"kuma.io/mesh": mesh}},
                "spec": spec
            })),
        )
    }

    fn mtls_mesh() -> DynamicObject {
        mesh("default", json!({"mtls": {"enabledBackend": "ca-1", "backends": [{"name": "ca-1", "type": "builtin"}]}}))
    }

    #[test]
    fn test_enabled_backend_must_be_declared() {
        let findings = check_mesh(&KumaSnapshot {
            meshes: vec![mesh("default", json!({"mtls": {"enabledBackend": "ca-2", "backends": [{"name": "ca-1"}]}}))],
            policies: vec![],
        });
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].detail.as_deref().unwrap_or_default().contains("ca-1"));
    }

    #[test]
    fn test_permission_without_mtls() {
        let findings = check_mesh(&KumaSnapshot {
            meshes: vec![mesh("default", json!({}))],
            policies: vec![mtp("allow", "default", json!({"targetRef": {"kind": "Mesh"}, "from": [{"targetRef": {"kind": "Mesh"}, "default": {"action": "Allow"}}]}))],
        });
        assert_eq!(findings.len(), 1);
        assert!(findings[0].summary.contains("does not enable mTLS"));
    }

    #[test]
    fn test_unknown_mesh_label() {
        let findings = check_mesh(&KumaSnapshot {
            meshes: vec![mtls_mesh()],
            policies: vec![mtp("allow", "payments", json!({}))],
        });
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].summary.contains("mesh 'payments' which does not exist"));
    }

    #[test]
    fn test_deny_all_permission() {
        let findings = check_mesh(&KumaSnapshot {
            meshes: vec![mtls_mesh()],
            policies: vec![mtp("deny-all", "default", json!({"targetRef": {"kind": "Mesh"}, "from": [{"targetRef": {"kind": "Mesh"}, "default": {"action": "Deny"}}]}))],
        });
        assert_eq!(findings.len(), 1);
        assert!(findings[0].summary.contains("denies all traffic"));
    }

    #[test]
    fn test_policy_without_label_uses_default_mesh() {
        let (_, timeout) = mtp("ignored", "default", json!({}));
        let mut unlabelled = timeout.clone();
        unlabelled.metadata.labels = None;
        assert_eq!(mesh_of(&unlabelled), "default");

        let findings = check_mesh(&KumaSnapshot {
            meshes: vec![mtls_mesh()],
            policies: vec![(ResourceKind::MeshTimeout, unlabelled)],
        });
        assert!(findings.is_empty());
    }
}
