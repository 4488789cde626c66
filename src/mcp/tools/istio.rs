//! Istio tools: listings, routing analysis, configuration validation and sidecar injection.

use async_trait::async_trait;
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::instrument;

use super::{list_definition, list_tool, retain_in_namespace, Args, ToolContext, ToolProvider};
use crate::analysis::injection::{self, InjectionSnapshot};
use crate::analysis::istio_config::{self, IstioConfigSnapshot};
use crate::analysis::istio_routing::{self, IstioSnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct IstioTools;

const LISTS: [(&str, ResourceKind, &str); 7] = [
    ("list_virtual_services", ResourceKind::VirtualService, "List Istio VirtualServices with their hosts, gateways and routes."),
    ("list_destination_rules", ResourceKind::DestinationRule, "List Istio DestinationRules with their host, subsets and traffic policy."),
    ("list_istio_gateways", ResourceKind::IstioGateway, "List Istio Gateways (networking.istio.io) with their selector and servers."),
    ("list_service_entries", ResourceKind::ServiceEntry, "List Istio ServiceEntries that add external hosts to the mesh."),
    ("list_sidecars", ResourceKind::Sidecar, "List Istio Sidecar resources that scope proxy configuration."),
    ("list_peer_authentications", ResourceKind::PeerAuthentication, "List Istio PeerAuthentications and their mTLS modes."),
    ("list_authorization_policies", ResourceKind::AuthorizationPolicy, "List Istio AuthorizationPolicies with their action, selector and rules."),
];

#[async_trait]
impl ToolProvider for IstioTools {
    fn tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> =
            LISTS.iter().map(|(name, _, description)| list_definition(name, description)).collect();
        tools.push(analyze_istio_routing_tool());
        tools.push(validate_istio_config_tool());
        tools.push(check_sidecar_injection_tool());
        tools
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "analyze_istio_routing" => execute_analyze_istio_routing(ctx, args).await,
            "validate_istio_config" => execute_validate_istio_config(ctx, args).await,
            "check_sidecar_injection" => execute_check_sidecar_injection(ctx, args).await,
            _ => {
                let (_, kind, _) = LISTS
                    .iter()
                    .find(|(tool, _, _)| *tool == name)
                    .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
                let namespace = Args::new(&args).namespace(ctx)?;
                list_tool(ctx, name, &[*kind], namespace.as_deref()).await
            }
        }
    }
}

pub fn analyze_istio_routing_tool() -> Tool {
    Tool::new(
        "analyze_istio_routing",
        "Analyze Istio VirtualService routing: weights that do not total 100, subsets missing from DestinationRules, destinations that resolve to no Service or ServiceEntry, shadowed or unreachable routes and subsets that select no pods.",
        super::namespaced_schema(json!({}), &[]),
    )
}

pub fn validate_istio_config_tool() -> Tool {
    Tool::new(
        "validate_istio_config",
        "Validate Istio configuration across resources: missing Gateway references, conflicting hosts, duplicate or dangling DestinationRules, STRICT mTLS conflicts, risky AuthorizationPolicies and Gateway TLS without credentials.",
        super::namespaced_schema(json!({}), &[]),
    )
}

pub fn check_sidecar_injection_tool() -> Tool {
    Tool::new(
        "check_sidecar_injection",
        "Check Istio and Linkerd sidecar injection: pods in injection-enabled namespaces that run without the proxy container, and pods that explicitly opt out.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_analyze_istio_routing")]
pub async fn execute_analyze_istio_routing(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Istio).await?;

    let snapshot = IstioSnapshot {
        virtual_services: ctx.list(ResourceKind::VirtualService, None).await?,
        destination_rules: ctx.list_optional(ResourceKind::DestinationRule, None).await?,
        service_entries: ctx.list_optional(ResourceKind::ServiceEntry, None).await?,
        services: ctx.list(ResourceKind::Service, None).await?,
        pods: ctx.list(ResourceKind::Pod, None).await?,
    };
    let mut findings = istio_routing::analyze_routing(&snapshot);
    retain_in_namespace(&mut findings, namespace.as_deref());

    tracing::info!(
        namespace = ?namespace,
        virtual_services = snapshot.virtual_services.len(),
        destination_rules = snapshot.destination_rules.len(),
        findings = findings.len(),
        "Analyzed Istio routing"
    );

    StandardResponse::new("analyze_istio_routing", namespace.as_deref(), findings)
        .with_data(&json!({
            "virtualServices": snapshot.virtual_services.len(),
            "destinationRules": snapshot.destination_rules.len(),
        }))?
        .into_tool_result()
}

#[instrument(skip(ctx, args), name = "mcp_execute_validate_istio_config")]
pub async fn execute_validate_istio_config(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Istio).await?;

    let snapshot = IstioConfigSnapshot {
        virtual_services: ctx.list(ResourceKind::VirtualService, None).await?,
        destination_rules: ctx.list_optional(ResourceKind::DestinationRule, None).await?,
        gateways: ctx.list_optional(ResourceKind::IstioGateway, None).await?,
        service_entries: ctx.list_optional(ResourceKind::ServiceEntry, None).await?,
        peer_authentications: ctx.list_optional(ResourceKind::PeerAuthentication, None).await?,
        authorization_policies: ctx.list_optional(ResourceKind::AuthorizationPolicy, None).await?,
        services: ctx.list(ResourceKind::Service, None).await?,
        pods: ctx.list(ResourceKind::Pod, None).await?,
    };
    let mut findings = istio_config::validate_config(&snapshot);
    retain_in_namespace(&mut findings, namespace.as_deref());

    tracing::info!(
        namespace = ?namespace,
        gateways = snapshot.gateways.len(),
        findings = findings.len(),
        "Validated Istio configuration"
    );

    StandardResponse::new("validate_istio_config", namespace.as_deref(), findings)
        .into_tool_result()
}

#[instrument(skip(ctx, args), name = "mcp_execute_check_sidecar_injection")]
pub async fn execute_check_sidecar_injection(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;

    let mut namespaces = ctx.list(ResourceKind::Namespace, None).await?;
    if let Some(ns) = namespace.as_deref() {
        namespaces.retain(|n| n.name_any() == ns);
    }
    let snapshot = InjectionSnapshot {
        namespaces,
        pods: ctx.list(ResourceKind::Pod, namespace.as_deref()).await?,
    };
    let (findings, coverage) = injection::check(&snapshot);

    tracing::info!(
        namespace = ?namespace,
        injected_namespaces = coverage.len(),
        findings = findings.len(),
        "Checked sidecar injection"
    );

    let mut response =
        StandardResponse::new("check_sidecar_injection", namespace.as_deref(), findings);
    if coverage.is_empty() {
        response = response.with_summary("No namespace has Istio or Linkerd injection enabled");
    }
    response.with_data(&json!({ "namespaces": coverage }))?.into_tool_result()
}
