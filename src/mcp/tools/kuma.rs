//! Kuma tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::instrument;

use super::{kind_property, list_definition, list_tool, Args, ToolContext, ToolProvider};
use crate::analysis::kuma::{self, KumaSnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct KumaTools;

/// Mesh-scoped policy kinds.
const POLICY_KINDS: [ResourceKind; 5] = [
    ResourceKind::MeshTrafficPermission,
    ResourceKind::MeshTimeout,
    ResourceKind::MeshRetry,
    ResourceKind::MeshCircuitBreaker,
    ResourceKind::MeshHealthCheck,
];

#[async_trait]
impl ToolProvider for KumaTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            list_definition(
                "list_kuma_meshes",
                "List Kuma Meshes with their mTLS backends and enabled backend.",
            ),
            list_kuma_policies_tool(),
            check_kuma_mesh_tool(),
        ]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "list_kuma_meshes" => {
                let namespace = Args::new(&args).namespace(ctx)?;
                list_tool(ctx, name, &[ResourceKind::KumaMesh], namespace.as_deref()).await
            }
            "list_kuma_policies" => execute_list_kuma_policies(ctx, args).await,
            "check_kuma_mesh" => execute_check_kuma_mesh(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn list_kuma_policies_tool() -> Tool {
    Tool::new(
        "list_kuma_policies",
        "List Kuma policies of one kind with the mesh each belongs to.",
        super::namespaced_schema(json!({ "kind": kind_property(&POLICY_KINDS) }), &["kind"]),
    )
}

pub fn check_kuma_mesh_tool() -> Tool {
    Tool::new(
        "check_kuma_mesh",
        "Check Kuma meshes and policies: undeclared mTLS backends, traffic permissions on meshes without mTLS, policies labelled with a mesh that does not exist and deny-all traffic permissions.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_list_kuma_policies")]
pub async fn execute_list_kuma_policies(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let kind = args.kind(Some(Provider::Kuma))?;
    if !POLICY_KINDS.contains(&kind) {
        return Err(McpError::InvalidInput(format!("{} is not a Kuma policy kind", kind.kind())));
    }
    let namespace = args.namespace(ctx)?;
    list_tool(ctx, "list_kuma_policies", &[kind], namespace.as_deref()).await
}

#[instrument(skip(ctx, args), name = "mcp_execute_check_kuma_mesh")]
pub async fn execute_check_kuma_mesh(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Kuma).await?;

    let meshes = ctx.list(ResourceKind::KumaMesh, None).await?;
    let mut policies = Vec::new();
    for kind in POLICY_KINDS {
        for policy in ctx.list_optional(kind, namespace.as_deref()).await? {
            policies.push((kind, policy));
        }
    }
    let snapshot = KumaSnapshot { meshes, policies };
    let findings = kuma::check_mesh(&snapshot);

    let mut per_mesh: BTreeMap<String, usize> = BTreeMap::new();
    for (_, policy) in &snapshot.policies {
        *per_mesh.entry(kuma::mesh_of(policy)).or_default() += 1;
    }

    tracing::info!(
        namespace = ?namespace,
        meshes = snapshot.meshes.len(),
        policies = snapshot.policies.len(),
        findings = findings.len(),
        "Checked Kuma meshes"
    );

    StandardResponse::new("check_kuma_mesh", namespace.as_deref(), findings)
        .with_data(&json!({ "meshes": snapshot.meshes.len(), "policiesPerMesh": per_mesh }))?
        .into_tool_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::{call, cluster, context, summaries};

    fn objects() -> Vec<Value> {
        vec![
            json!({
                "apiVersion": "kuma.io/v1alpha1", "kind": "Mesh",
                "metadata": {"name": "default"},
                "spec": {"mtls": {"enabledBackend": "ca-1", "backends": [{"name": "ca-1", "type": "builtin"}]}}
            }),
            json!({
                "apiVersion": "kuma.io/v1alpha1", "kind": "MeshTrafficPermission",
                "metadata": {"name": "allow-orders", "namespace": "kuma-system",
                             "labels": {"kuma.io/mesh": "payments"}},
                "spec": {}
            }),
            json!({
                "apiVersion": "kuma.io/v1alpha1", "kind": "MeshTimeout",
                "metadata": {"name": "slow", "namespace": "kuma-system"},
                "spec": {}
            }),
        ]
    }

    #[tokio::test]
    async fn test_check_reports_unknown_mesh() {
        let ctx = context(cluster(objects()));
        let body = call(&KumaTools, &ctx, "check_kuma_mesh", json!({})).await;
        assert_eq!(body["counts"]["critical"], 1);
        assert!(summaries(&body)[0].contains("mesh 'payments' which does not exist"));
        assert_eq!(body["data"]["policiesPerMesh"]["default"], 1);
    }

    #[tokio::test]
    async fn test_list_policies_rejects_non_policy_kind() {
        let ctx = context(cluster(objects()));
        let err =
            KumaTools.call("list_kuma_policies", json!({"kind": "Mesh"}), &ctx).await.unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");

        let body =
            call(&KumaTools, &ctx, "list_kuma_policies", json!({"kind": "MeshTimeout"})).await;
        assert_eq!(body["data"]["items"][0]["name"], "slow");
    }
}
