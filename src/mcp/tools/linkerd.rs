//! Linkerd tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{kind_property, list_tool, Args, ToolContext, ToolProvider};
use crate::analysis::linkerd::{self, LinkerdSnapshot};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct LinkerdTools;

#[async_trait]
impl ToolProvider for LinkerdTools {
    fn tools(&self) -> Vec<Tool> {
        vec![list_linkerd_policies_tool(), analyze_linkerd_policies_tool()]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "list_linkerd_policies" => execute_list_linkerd_policies(ctx, args).await,
            "analyze_linkerd_policies" => execute_analyze_linkerd_policies(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn list_linkerd_policies_tool() -> Tool {
    Tool::new(
        "list_linkerd_policies",
        "List Linkerd policy resources of one kind: Server, ServerAuthorization, AuthorizationPolicy or MeshTLSAuthentication.",
        super::namespaced_schema(
            json!({ "kind": kind_property(&ResourceKind::of_provider(Provider::Linkerd)) }),
            &["kind"],
        ),
    )
}

pub fn analyze_linkerd_policies_tool() -> Tool {
    Tool::new(
        "analyze_linkerd_policies",
        "Analyze Linkerd policy: Servers whose podSelector or port matches nothing, authorizations targeting missing Servers and AuthorizationPolicies referencing missing MeshTLSAuthentications.",
        super::namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_list_linkerd_policies")]
pub async fn execute_list_linkerd_policies(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let kind = args.kind(Some(Provider::Linkerd))?;
    let namespace = args.namespace(ctx)?;
    list_tool(ctx, "list_linkerd_policies", &[kind], namespace.as_deref()).await
}

#[instrument(skip(ctx, args), name = "mcp_execute_analyze_linkerd_policies")]
pub async fn execute_analyze_linkerd_policies(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    ctx.require_provider(Provider::Linkerd).await?;

    let ns = namespace.as_deref();
    let snapshot = LinkerdSnapshot {
        servers: ctx.list(ResourceKind::LinkerdServer, ns).await?,
        server_authorizations: ctx.list_optional(ResourceKind::LinkerdServerAuthorization, ns).await?,
        authorization_policies: ctx.list_optional(ResourceKind::LinkerdAuthorizationPolicy, ns).await?,
        mesh_tls_authentications: ctx.list_optional(ResourceKind::MeshTlsAuthentication, ns).await?,
        pods: ctx.list(ResourceKind::Pod, ns).await?,
    };
    let findings = linkerd::analyze(&snapshot);

    tracing::info!(
        namespace = ?namespace,
        servers = snapshot.servers.len(),
        authorization_policies = snapshot.authorization_policies.len(),
        findings = findings.len(),
        "Analyzed Linkerd policies"
    );

    StandardResponse::new("analyze_linkerd_policies", ns, findings)
        .with_data(&json!({
            "servers": snapshot.servers.len(),
            "serverAuthorizations": snapshot.server_authorizations.len(),
            "authorizationPolicies": snapshot.authorization_policies.len(),
        }))?
        .into_tool_result()
}
