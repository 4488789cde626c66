//! Remediation design tools.
//!
//! These tools never read the cluster. They validate their arguments, build the manifests with
//! [`crate::remediation`] and return them as multi-document YAML in `remediation`, with an info
//! finding describing the result and one warning finding per caveat.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{parse_args, ToolContext, ToolProvider};
use crate::findings::{Category, Finding};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;
use crate::remediation::{
    self, AuthorizationPolicyParams, GatewayRouteParams, NetworkPolicyParams, Remediation,
    TrafficSplitParams,
};

pub struct DesignTools;

#[async_trait]
impl ToolProvider for DesignTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            design_gateway_api_route_tool(),
            design_istio_traffic_split_tool(),
            design_network_policy_tool(),
            design_authorization_policy_tool(),
        ]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        _ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "design_gateway_api_route" => execute_design_gateway_api_route(args),
            "design_istio_traffic_split" => execute_design_istio_traffic_split(args),
            "design_network_policy" => execute_design_network_policy(args),
            "design_authorization_policy" => execute_design_authorization_policy(args),
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

fn labels_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "additionalProperties": {"type": "string"},
        "description": description
    })
}

fn string_list(description: &str) -> Value {
    json!({"type": "array", "items": {"type": "string"}, "description": description})
}

pub fn design_gateway_api_route_tool() -> Tool {
    Tool::new(
        "design_gateway_api_route",
        "Generate an HTTPRoute that attaches to a Gateway and forwards a path to a Service, plus a ReferenceGrant when the Service lives in another namespace.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "HTTPRoute name"},
                "namespace": {"type": "string", "description": "Namespace of the HTTPRoute"},
                "gateway": {"type": "string", "description": "Parent Gateway name"},
                "gateway_namespace": {"type": "string", "description": "Namespace of the Gateway when different"},
                "section_name": {"type": "string", "description": "Listener to attach to"},
                "hostnames": string_list("Hostnames the route answers for"),
                "path": {"type": "string", "description": "Path to match (default /)"},
                "path_match": {"type": "string", "enum": ["prefix", "exact"]},
                "backend_service": {"type": "string", "description": "Backend Service name"},
                "backend_namespace": {"type": "string", "description": "Namespace of the Service when different"},
                "backend_port": {"type": "integer", "minimum": 1, "maximum": 65535}
            },
            "required": ["name", "namespace", "gateway", "backend_service", "backend_port"]
        }),
    )
}

pub fn design_istio_traffic_split_tool() -> Tool {
    Tool::new(
        "design_istio_traffic_split",
        "Generate a DestinationRule with one subset per version and a VirtualService that splits traffic across them. Weights must total 100.",
        json!({
            "type": "object",
            "properties": {
                "namespace": {"type": "string", "description": "Namespace of the Service"},
                "host": {"type": "string", "description": "Short Service name"},
                "subsets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "weight": {"type": "integer", "minimum": 0, "maximum": 100},
                            "labels": labels_schema("Pod labels of the subset (default {version_label: name})")
                        },
                        "required": ["name", "weight"]
                    }
                },
                "version_label": {"type": "string", "description": "Label key that tells versions apart (default version)"}
            },
            "required": ["namespace", "host", "subsets"]
        }),
    )
}

pub fn design_network_policy_tool() -> Tool {
    Tool::new(
        "design_network_policy",
        "Generate a Kubernetes NetworkPolicy that admits traffic to selected pods from given pods or namespaces on given ports, optionally with a namespace-wide default-deny ingress policy.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "namespace": {"type": "string"},
                "pod_selector": labels_schema("Pods to protect; empty selects every pod"),
                "from_pods": labels_schema("Labels of the allowed client pods"),
                "from_namespaces": labels_schema("Labels of the allowed client namespaces"),
                "ports": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "port": {"type": "integer", "minimum": 1, "maximum": 65535},
                            "protocol": {"type": "string", "enum": ["TCP", "UDP", "SCTP"]}
                        },
                        "required": ["port"]
                    }
                },
                "default_deny": {"type": "boolean", "description": "Also emit default-deny-ingress"}
            },
            "required": ["name", "namespace"]
        }),
    )
}

pub fn design_authorization_policy_tool() -> Tool {
    Tool::new(
        "design_authorization_policy",
        "Generate an Istio AuthorizationPolicy that allows or denies requests to selected workloads by source principal or namespace, HTTP method, path and port.",
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "namespace": {"type": "string"},
                "selector": labels_schema("Workload labels; empty applies to the whole namespace"),
                "action": {"type": "string", "enum": ["ALLOW", "DENY"]},
                "principals": string_list("Source principals, e.g. cluster.local/ns/shop/sa/frontend"),
                "namespaces": string_list("Source namespaces"),
                "methods": string_list("HTTP methods"),
                "paths": string_list("Request paths, '/' prefixed"),
                "ports": {"type": "array", "items": {"type": "integer", "minimum": 1, "maximum": 65535}}
            },
            "required": ["name", "namespace"]
        }),
    )
}

/// Render a remediation into the standard response.
fn respond(
    tool: &str,
    namespace: &str,
    remediation: Remediation,
) -> Result<ToolCallResult, McpError> {
    let yaml = remediation.to_yaml()?;

    let mut findings = vec![Finding::info(Category::Configuration, remediation.summary.clone())
        .detail(format!("{} manifest(s) generated", remediation.documents.len()))];
    findings.extend(
        remediation
            .warnings
            .iter()
            .map(|warning| Finding::warning(Category::Configuration, warning.clone())),
    );

    tracing::info!(
        tool = %tool,
        namespace = %namespace,
        documents = remediation.documents.len(),
        warnings = remediation.warnings.len(),
        "Generated remediation"
    );

    let kinds: Vec<&str> =
        remediation.documents.iter().filter_map(|doc| doc["kind"].as_str()).collect();
    StandardResponse::new(tool, Some(namespace), findings)
        .with_summary(remediation.summary.clone())
        .with_data(&json!({ "kinds": kinds }))?
        .with_remediation(yaml)
        .into_tool_result()
}

#[instrument(skip(args), name = "mcp_execute_design_gateway_api_route")]
pub fn execute_design_gateway_api_route(args: Value) -> Result<ToolCallResult, McpError> {
    let params: GatewayRouteParams = parse_args(args)?;
    let remediation = remediation::gateway_api_route(&params)?;
    respond("design_gateway_api_route", &params.namespace, remediation)
}

#[instrument(skip(args), name = "mcp_execute_design_istio_traffic_split")]
pub fn execute_design_istio_traffic_split(args: Value) -> Result<ToolCallResult, McpError> {
    let params: TrafficSplitParams = parse_args(args)?;
    let remediation = remediation::istio_traffic_split(&params)?;
    respond("design_istio_traffic_split", &params.namespace, remediation)
}

#[instrument(skip(args), name = "mcp_execute_design_network_policy")]
pub fn execute_design_network_policy(args: Value) -> Result<ToolCallResult, McpError> {
    let params: NetworkPolicyParams = parse_args(args)?;
    let remediation = remediation::network_policy(&params)?;
    respond("design_network_policy", &params.namespace, remediation)
}

#[instrument(skip(args), name = "mcp_execute_design_authorization_policy")]
pub fn execute_design_authorization_policy(args: Value) -> Result<ToolCallResult, McpError> {
    let params: AuthorizationPolicyParams = parse_args(args)?;
    let remediation = remediation::authorization_policy(&params)?;
    respond("design_authorization_policy", &params.namespace, remediation)
}
