//! Calico tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{list_definition, list_tool, Args, ToolContext, ToolProvider};
use crate::analysis::calico::{self, CalicoSnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct CalicoTools;

#[async_trait]
impl ToolProvider for CalicoTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            list_definition(
                "list_calico_policies",
                "List Calico NetworkPolicies in the namespace and all GlobalNetworkPolicies with their order, selector and types.",
            ),
            list_definition(
                "list_calico_ip_pools",
                "List Calico IPPools with their CIDR, encapsulation and NAT settings.",
            ),
            analyze_calico_policies_tool(),
        ]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        let kinds: &[ResourceKind] = match name {
            "analyze_calico_policies" => return execute_analyze_calico_policies(ctx, args).await,
            "list_calico_policies" => {
                &[ResourceKind::CalicoNetworkPolicy, ResourceKind::CalicoGlobalNetworkPolicy]
            }
            "list_calico_ip_pools" => &[ResourceKind::CalicoIpPool],
            _ => return Err(McpError::ToolNotFound(name.to_string())),
        };
        let namespace = Args::new(&args).namespace(ctx)?;
        list_tool(ctx, name, kinds, namespace.as_deref()).await
    }
}

pub fn analyze_calico_policies_tool() -> Tool {
    Tool::new(
        "analyze_calico_policies",
        "Analyze Calico policies and IP pools: selectors that do not parse or match no pods, deny-all policies, cluster-wide deny GlobalNetworkPolicies, overlapping or disabled IPPools and pools with both IPIP and VXLAN enabled.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_analyze_calico_policies")]
pub async fn execute_analyze_calico_policies(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Calico).await?;

    // Global policies select pods in every namespace, so pods are always read cluster-wide.
    let snapshot = CalicoSnapshot {
        policies: ctx.list_optional(ResourceKind::CalicoNetworkPolicy, namespace.as_deref()).await?,
        global_policies: ctx.list_optional(ResourceKind::CalicoGlobalNetworkPolicy, None).await?,
        ip_pools: ctx.list(ResourceKind::CalicoIpPool, None).await?,
        pods: ctx.list(ResourceKind::Pod, None).await?,
    };
    let findings = calico::analyze(&snapshot);

    tracing::info!(
        namespace = ?namespace,
        policies = snapshot.policies.len(),
        global_policies = snapshot.global_policies.len(),
        ip_pools = snapshot.ip_pools.len(),
        findings = findings.len(),
        "Analyzed Calico policies"
    );

    StandardResponse::new("analyze_calico_policies", namespace.as_deref(), findings)
        .with_data(&json!({
            "policies": snapshot.policies.len(),
            "globalPolicies": snapshot.global_policies.len(),
            "ipPools": snapshot.ip_pools.len(),
        }))?
        .into_tool_result()
}
