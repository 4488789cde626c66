//! Flannel tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{ToolContext, ToolProvider};
use crate::analysis::flannel::{self, FlannelSnapshot, NAMESPACES};
use crate::k8s::ResourceKind;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct FlannelTools;

#[async_trait]
impl ToolProvider for FlannelTools {
    fn tools(&self) -> Vec<Tool> {
        vec![check_flannel_tool()]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "check_flannel" => execute_check_flannel(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn check_flannel_tool() -> Tool {
    Tool::new(
        "check_flannel",
        "Check the flannel CNI: the kube-flannel-cfg network configuration, the kube-flannel-ds DaemonSet and node pod CIDRs and public-ip annotations.",
        json!({"type": "object", "properties": {}}),
    )
}

#[instrument(skip(ctx, _args), name = "mcp_execute_check_flannel")]
pub async fn execute_check_flannel(
    ctx: &ToolContext,
    _args: Value,
) -> Result<ToolCallResult, McpError> {
    let mut snapshot = FlannelSnapshot {
        nodes: ctx.list(ResourceKind::Node, None).await?,
        ..Default::default()
    };
    for namespace in NAMESPACES {
        snapshot.config_maps.extend(ctx.list(ResourceKind::ConfigMap, Some(namespace)).await?);
        snapshot.daemon_sets.extend(ctx.list(ResourceKind::DaemonSet, Some(namespace)).await?);
    }

    let (findings, summary) = flannel::check(&snapshot);

    tracing::info!(
        network = ?summary.network,
        backend = ?summary.backend,
        nodes = summary.nodes,
        findings = findings.len(),
        "Checked flannel"
    );

    StandardResponse::new("check_flannel", None, findings).with_data(&summary)?.into_tool_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::{call, cluster, context, summaries};

    #[tokio::test]
    async fn test_check_flannel_reports_node_outside_network() {
        let ctx = context(cluster(vec![
            json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": "kube-flannel-cfg", "namespace": "kube-system"},
                "data": {"net-conf.json": "{\"Network\": \"10.244.0.0/16\", \"Backend\": {\"Type\": \"vxlan\"}}"}
            }),
            json!({
                "apiVersion": "apps/v1", "kind": "DaemonSet",
                "metadata": {"name": "kube-flannel-ds", "namespace": "kube-system"},
                "status": {"numberReady": 1, "desiredNumberScheduled": 1}
            }),
            json!({
                "apiVersion": "v1", "kind": "Node",
                "metadata": {"name": "worker-1",
                             "annotations": {"flannel.alpha.coreos.com/public-ip": "192.168.1.10"}},
                "spec": {"podCIDR": "10.96.1.0/24"}
            }),
        ]));
        let body = call(&FlannelTools, &ctx, "check_flannel", json!({})).await;
        assert_eq!(body["counts"]["critical"], 1);
        assert!(summaries(&body)[0].contains("outside the flannel network"));
        assert_eq!(body["data"]["configNamespace"], "kube-system");
        assert_eq!(body["data"]["backend"], "vxlan");
    }

    #[tokio::test]
    async fn test_check_flannel_without_install() {
        let ctx = context(cluster(vec![]));
        let body = call(&FlannelTools, &ctx, "check_flannel", json!({})).await;
        assert_eq!(body["counts"]["critical"], 1);
        assert_eq!(body["counts"]["warning"], 1);
        assert_eq!(body["data"]["nodes"], 0);
    }
}
