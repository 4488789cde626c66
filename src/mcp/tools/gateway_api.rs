//! Gateway API tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::instrument;

use super::{list_definition, list_tool, retain_in_namespace, Args, ToolContext, ToolProvider};
use crate::analysis::gateway_api::{self, GatewayApiSnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct GatewayApiTools;

const LISTS: [(&str, ResourceKind, &str); 5] = [
    ("list_gateway_classes", ResourceKind::GatewayClass, "List GatewayClasses with their controller and acceptance status."),
    ("list_gateways", ResourceKind::Gateway, "List Gateway API Gateways with their class, listeners and status conditions."),
    ("list_httproutes", ResourceKind::HttpRoute, "List HTTPRoutes with their parent Gateways, hostnames and rules."),
    ("list_grpcroutes", ResourceKind::GrpcRoute, "List GRPCRoutes with their parent Gateways, hostnames and rules."),
    ("list_reference_grants", ResourceKind::ReferenceGrant, "List ReferenceGrants that permit cross-namespace references."),
];

#[async_trait]
impl ToolProvider for GatewayApiTools {
    fn tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> =
            LISTS.iter().map(|(name, _, description)| list_definition(name, description)).collect();
        tools.push(scan_gateway_misconfigs_tool());
        tools
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        if name == "scan_gateway_misconfigs" {
            return execute_scan_gateway_misconfigs(ctx, args).await;
        }
        let (_, kind, _) = LISTS
            .iter()
            .find(|(tool, _, _)| *tool == name)
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        let namespace = Args::new(&args).namespace(ctx)?;
        list_tool(ctx, name, &[*kind], namespace.as_deref()).await
    }
}

pub fn scan_gateway_misconfigs_tool() -> Tool {
    Tool::new(
        "scan_gateway_misconfigs",
        "Scan Gateway API resources for misconfigurations: unknown GatewayClasses, failing status conditions, TLS listeners without valid certificates, conflicting listeners, routes that cannot attach to their Gateway and broken or ungranted backendRefs.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_scan_gateway_misconfigs")]
pub async fn execute_scan_gateway_misconfigs(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::GatewayApi).await?;

    // References cross namespaces, so the whole cluster is read and findings filtered after.
    let mut snapshot = GatewayApiSnapshot {
        gateway_classes: ctx.list(ResourceKind::GatewayClass, None).await?,
        gateways: ctx.list(ResourceKind::Gateway, None).await?,
        http_routes: ctx.list_optional(ResourceKind::HttpRoute, None).await?,
        grpc_routes: ctx.list_optional(ResourceKind::GrpcRoute, None).await?,
        reference_grants: ctx.list_optional(ResourceKind::ReferenceGrant, None).await?,
        services: ctx.list(ResourceKind::Service, None).await?,
        namespaces: ctx.list(ResourceKind::Namespace, None).await?,
        existing_secrets: BTreeSet::new(),
    };
    for (secret_ns, secret_name) in gateway_api::certificate_secret_refs(&snapshot.gateways) {
        if ctx.cluster.exists(ResourceKind::Secret, Some(&secret_ns), &secret_name).await? {
            snapshot.existing_secrets.insert((secret_ns, secret_name));
        }
    }

    let mut findings = gateway_api::scan(&snapshot);
    retain_in_namespace(&mut findings, namespace.as_deref());

    tracing::info!(
        namespace = ?namespace,
        gateways = snapshot.gateways.len(),
        routes = snapshot.http_routes.len() + snapshot.grpc_routes.len(),
        findings = findings.len(),
        "Scanned Gateway API configuration"
    );

    StandardResponse::new("scan_gateway_misconfigs", namespace.as_deref(), findings)
        .with_data(&json!({
            "gatewayClasses": snapshot.gateway_classes.len(),
            "gateways": snapshot.gateways.len(),
            "httpRoutes": snapshot.http_routes.len(),
            "grpcRoutes": snapshot.grpc_routes.len(),
        }))?
        .into_tool_result()
}
