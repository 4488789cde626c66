//! kgateway tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{kind_property, list_tool, retain_in_namespace, Args, ToolContext, ToolProvider};
use crate::analysis::kgateway::{self, KgatewaySnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct KgatewayTools;

#[async_trait]
impl ToolProvider for KgatewayTools {
    fn tools(&self) -> Vec<Tool> {
        vec![list_kgateway_resources_tool(), check_kgateway_health_tool()]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "list_kgateway_resources" => execute_list_kgateway_resources(ctx, args).await,
            "check_kgateway_health" => execute_check_kgateway_health(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn list_kgateway_resources_tool() -> Tool {
    Tool::new(
        "list_kgateway_resources",
        "List kgateway resources of one kind: GatewayParameters, TrafficPolicy, Backend, HTTPListenerPolicy or DirectResponse.",
        super::namespaced_schema(
            json!({ "kind": kind_property(&ResourceKind::of_provider(Provider::Kgateway)) }),
            &["kind"],
        ),
    )
}

pub fn check_kgateway_health_tool() -> Tool {
    Tool::new(
        "check_kgateway_health",
        "Check kgateway health: its GatewayClass and controller Deployment, GatewayParameters references, policy targetRefs and static Backends without hosts.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_list_kgateway_resources")]
pub async fn execute_list_kgateway_resources(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let kind = args.kind(Some(Provider::Kgateway))?;
    let namespace = args.namespace(ctx)?;
    list_tool(ctx, "list_kgateway_resources", &[kind], namespace.as_deref()).await
}

#[instrument(skip(ctx, args), name = "mcp_execute_check_kgateway_health")]
pub async fn execute_check_kgateway_health(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Kgateway).await?;

    let snapshot = KgatewaySnapshot {
        gateway_classes: ctx.list_optional(ResourceKind::GatewayClass, None).await?,
        gateways: ctx.list_optional(ResourceKind::Gateway, None).await?,
        http_routes: ctx.list_optional(ResourceKind::HttpRoute, None).await?,
        gateway_parameters: ctx.list(ResourceKind::GatewayParameters, None).await?,
        traffic_policies: ctx.list_optional(ResourceKind::TrafficPolicy, None).await?,
        http_listener_policies: ctx.list_optional(ResourceKind::HttpListenerPolicy, None).await?,
        backends: ctx.list_optional(ResourceKind::KgatewayBackend, None).await?,
        deployments: ctx.list(ResourceKind::Deployment, None).await?,
    };
    let mut findings = kgateway::check_health(&snapshot);
    retain_in_namespace(&mut findings, namespace.as_deref());

    tracing::info!(
        namespace = ?namespace,
        gateway_parameters = snapshot.gateway_parameters.len(),
        findings = findings.len(),
        "Checked kgateway health"
    );

    StandardResponse::new("check_kgateway_health", namespace.as_deref(), findings)
        .into_tool_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;
    use crate::mcp::tools::test_support::{call, cluster, context, summaries};

    fn install() -> Vec<Value> {
        vec![
            json!({
                "apiVersion": "gateway.networking.k8s.io/v1", "kind": "GatewayClass",
                "metadata": {"name": "kgateway"},
                "spec": {"controllerName": "kgateway.dev/kgateway", "parametersRef": {
                    "group": "gateway.kgateway.dev", "kind": "GatewayParameters",
                    "name": "kgateway", "namespace": "kgateway-system"
                }}
            }),
            json!({
                "apiVersion": "gateway.kgateway.dev/v1alpha1", "kind": "GatewayParameters",
                "metadata": {"name": "kgateway", "namespace": "kgateway-system"}, "spec": {}
            }),
            json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "kgateway", "namespace": "kgateway-system"},
                "spec": {"replicas": 1}, "status": {"readyReplicas": 1}
            }),
            json!({
                "apiVersion": "gateway.kgateway.dev/v1alpha1", "kind": "TrafficPolicy",
                "metadata": {"name": "timeouts", "namespace": "shop"},
                "spec": {"targetRefs": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "checkout"}]}
            }),
        ]
    }

    #[tokio::test]
    async fn test_health_reports_dangling_policy_target() {
        let ctx = context(cluster(install()));
        let body = call(&KgatewayTools, &ctx, "check_kgateway_health", json!({})).await;
        assert_eq!(body["counts"]["critical"], 1);
        assert!(summaries(&body)[0].contains("targets missing HTTPRoute 'checkout'"));
    }

    #[tokio::test]
    async fn test_health_without_kgateway() {
        let ctx = context(InMemoryCluster::new());
        let err = KgatewayTools.call("check_kgateway_health", json!({}), &ctx).await.unwrap_err();
        assert_eq!(err.code_name(), "CRD_NOT_AVAILABLE");
    }

    #[tokio::test]
    async fn test_list_by_kind() {
        let ctx = context(cluster(install()));
        let body = call(
            &KgatewayTools,
            &ctx,
            "list_kgateway_resources",
            json!({"kind": "TrafficPolicy", "namespace": "shop"}),
        )
        .await;
        assert_eq!(body["data"]["items"][0]["name"], "timeouts");

        let err = KgatewayTools
            .call("list_kgateway_resources", json!({"kind": "VirtualService"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");
    }
}
