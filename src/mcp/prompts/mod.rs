//! MCP Prompts Module
//!
//! Templated troubleshooting workflows that walk a client through the tools in order.

pub mod templates;

use crate::mcp::error::McpError;
use crate::mcp::protocol::{Prompt, PromptArgument, PromptGetResult};
use serde_json::Value;

/// One prompt: its listing metadata plus the function that fills in the template.
struct PromptTemplate {
    name: &'static str,
    description: &'static str,
    arguments: fn() -> Vec<PromptArgument>,
    render: fn(Option<Value>) -> Result<PromptGetResult, McpError>,
}

/// Sorted by name; `prompts/list` returns them in this order.
const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        name: "diagnose_service_connectivity",
        description: "Find out why a Service is unreachable: endpoints, network policy, mesh routing and proxy logs",
        arguments: templates::diagnose_service_connectivity_arguments,
        render: templates::render_diagnose_service_connectivity,
    },
    PromptTemplate {
        name: "review_mesh_security",
        description: "Review mTLS, authorization and network policy coverage of a namespace",
        arguments: templates::review_mesh_security_arguments,
        render: templates::render_review_mesh_security,
    },
    PromptTemplate {
        name: "troubleshoot_gateway",
        description: "Trace a Gateway API ingress path from Gateway to listener, route, Service and endpoints",
        arguments: templates::troubleshoot_gateway_arguments,
        render: templates::render_troubleshoot_gateway,
    },
];

pub fn get_all_prompts() -> Vec<Prompt> {
    PROMPTS
        .iter()
        .map(|template| Prompt {
            name: template.name.to_string(),
            description: Some(template.description.to_string()),
            arguments: Some((template.arguments)()),
        })
        .collect()
}

/// Render `name` with the client's arguments.
pub fn get_prompt(name: &str, arguments: Option<Value>) -> Result<PromptGetResult, McpError> {
    let template = PROMPTS
        .iter()
        .find(|template| template.name == name)
        .ok_or_else(|| McpError::PromptNotFound(name.to_string()))?;
    (template.render)(arguments)
}
