//! Built-in Prompt Templates
//!
//! Troubleshooting workflows that walk the calling model through the server's tools.

use crate::mcp::error::McpError;
use crate::mcp::protocol::{PromptArgument, PromptContent, PromptGetResult, PromptMessage};
use serde_json::Value;

/// Helper to extract required string argument
fn get_required_arg(args: &Option<Value>, name: &str) -> Result<String, McpError> {
    get_optional_arg(args, name)
        .ok_or_else(|| McpError::InvalidParams(format!("Missing required argument: {}", name)))
}

fn get_optional_arg(args: &Option<Value>, name: &str) -> Option<String> {
    args.as_ref()
        .and_then(|v| v.get(name))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn argument(name: &str, description: &str, required: bool) -> PromptArgument {
    PromptArgument {
        name: name.to_string(),
        description: Some(description.to_string()),
        required: Some(required),
    }
}

fn user_prompt(description: String, text: String) -> PromptGetResult {
    PromptGetResult {
        description: Some(description),
        messages: vec![PromptMessage::User { content: PromptContent::Text { text } }],
    }
}

// -----------------------------------------------------------------------------
// Prompt 1: Service connectivity
// -----------------------------------------------------------------------------

pub fn diagnose_service_connectivity_arguments() -> Vec<PromptArgument> {
    vec![
        argument("service", "Name of the Service that cannot be reached", true),
        argument("namespace", "Namespace of the Service", true),
        argument("client", "Pod or workload that fails to connect, if known", false),
    ]
}

pub fn render_diagnose_service_connectivity(
    args: Option<Value>,
) -> Result<PromptGetResult, McpError> {
    let service = get_required_arg(&args, "service")?;
    let namespace = get_required_arg(&args, "namespace")?;
    let client = get_optional_arg(&args, "client");

    let client_step = match &client {
        Some(client) => format!(
            "   - Run `analyze_proxy_logs` for the client pod '{}' and look for UH, UF and NR flags\n",
            client
        ),
        None => "   - Pick a failing client pod and run `analyze_proxy_logs` on it\n".to_string(),
    };

    let prompt_text = format!(
        r#"Traffic to Service '{service}' in namespace '{namespace}' is failing. Find out why.

Work through these steps and stop as soon as the cause is clear:

1. **Networking stack**:
   - Run `detect_networking_stack` to learn which meshes and CNIs are installed

2. **Service and endpoints**:
   - Run `check_service_endpoints` with namespace '{namespace}' and service '{service}'
   - A selector that matches no pods, unready pods or a targetPort that no container exposes
     explains most outages

3. **Network policy**:
   - Run `analyze_network_policies` for '{namespace}'; a default-deny policy without a matching
     allow rule blocks the traffic
   - If Calico is installed, also run `analyze_calico_policies`

4. **Service mesh**:
   - Istio: `check_sidecar_injection`, then `analyze_istio_routing` and `validate_istio_config`
   - Linkerd: `analyze_linkerd_policies`
   - Kuma: `check_kuma_mesh`

5. **Proxy logs**:
{client_step}
Summarize each finding with its severity, then propose a fix. When a manifest is needed, generate
it with `design_network_policy` or `design_authorization_policy` instead of writing YAML by hand."#
    );

    Ok(user_prompt(
        format!("Diagnose why Service '{}/{}' is unreachable", namespace, service),
        prompt_text,
    ))
}

// -----------------------------------------------------------------------------
// Prompt 2: Gateway troubleshooting
// -----------------------------------------------------------------------------

pub fn troubleshoot_gateway_arguments() -> Vec<PromptArgument> {
    vec![
        argument("gateway", "Name of the Gateway", true),
        argument("namespace", "Namespace of the Gateway", true),
        argument("hostname", "Hostname requests are sent to, if known", false),
    ]
}

pub fn render_troubleshoot_gateway(args: Option<Value>) -> Result<PromptGetResult, McpError> {
    let gateway = get_required_arg(&args, "gateway")?;
    let namespace = get_required_arg(&args, "namespace")?;
    let hostname = get_optional_arg(&args, "hostname")
        .map(|host| format!(" for hostname '{}'", host))
        .unwrap_or_default();

    let prompt_text = format!(
        r#"Requests{hostname} through Gateway '{gateway}' in namespace '{namespace}' are not reaching their backends.

1. **Gateway and class**:
   - Run `list_gateway_classes` and `list_gateways` and check that the class exists and the
     Gateway reports Accepted and Programmed
   - Check listener ports, protocols and TLS certificate references

2. **Routes**:
   - Run `list_httproutes` and `list_grpcroutes` with namespace '*'
   - Confirm each route's parentRefs name this Gateway and the listener allows the route's
     namespace

3. **Misconfiguration scan**:
   - Run `scan_gateway_misconfigs` with namespace '*'; treat critical findings first
   - Cross-namespace backends need a ReferenceGrant (`list_reference_grants`)

4. **Implementation**:
   - If the GatewayClass is served by kgateway, run `check_kgateway_health`
   - If it is served by Istio, run `analyze_istio_routing`

5. **Backends**:
   - Run `check_service_endpoints` for every backend Service the routes use

Report the broken link in the chain Gateway → listener → route → Service → endpoints and
propose a fix. Generate corrected routes with `design_gateway_api_route`."#
    );

    Ok(user_prompt(
        format!("Troubleshoot Gateway '{}/{}'", namespace, gateway),
        prompt_text,
    ))
}

// -----------------------------------------------------------------------------
// Prompt 3: Mesh security review
// -----------------------------------------------------------------------------

pub fn review_mesh_security_arguments() -> Vec<PromptArgument> {
    vec![
        argument("namespace", "Namespace to review, or '*' for the whole cluster", true),
        argument("mesh", "Mesh to review: istio, linkerd or kuma (detected when omitted)", false),
    ]
}

pub fn render_review_mesh_security(args: Option<Value>) -> Result<PromptGetResult, McpError> {
    let namespace = get_required_arg(&args, "namespace")?;
    let mesh = get_optional_arg(&args, "mesh").map(|m| m.to_lowercase());

    let mesh_steps = match mesh.as_deref() {
        Some("istio") => concat!(
            "   - Run `list_peer_authentications` and confirm mTLS is STRICT where required\n",
            "   - Run `list_authorization_policies` and `validate_istio_config`\n",
            "   - Run `check_sidecar_injection`; pods without a sidecar bypass every policy\n",
        ),
        Some("linkerd") => concat!(
            "   - Run `list_linkerd_policies` for Server and AuthorizationPolicy\n",
            "   - Run `analyze_linkerd_policies`\n",
            "   - Run `check_sidecar_injection`; pods without a proxy bypass every policy\n",
        ),
        Some("kuma") => concat!(
            "   - Run `list_kuma_meshes` and confirm mTLS has an enabled backend\n",
            "   - Run `list_kuma_policies` for MeshTrafficPermission and `check_kuma_mesh`\n",
        ),
        Some(other) => {
            return Err(McpError::InvalidParams(format!(
                "Unsupported mesh '{}': expected istio, linkerd or kuma",
                other
            )))
        }
        None => concat!(
            "   - Run `detect_networking_stack` to find the installed mesh\n",
            "   - Istio: `list_peer_authentications`, `list_authorization_policies`, `validate_istio_config`\n",
            "   - Linkerd: `analyze_linkerd_policies`\n",
            "   - Kuma: `check_kuma_mesh`\n",
            "   - Run `check_sidecar_injection` for Istio and Linkerd\n",
        ),
    };

    let prompt_text = format!(
        r#"Review the service mesh security posture of namespace '{namespace}'.

1. **Mesh policy**:
{mesh_steps}
2. **Network policy**:
   - Run `analyze_network_policies`; namespaces without any policy accept all traffic
   - If Calico is installed, run `analyze_calico_policies`

3. **Report**:
   - List unauthenticated or unauthorized paths into workloads, ordered by severity
   - Propose least-privilege policies generated with `design_authorization_policy` and
     `design_network_policy`

Do not suggest changes that would open access wider than it is today."#
    );

    Ok(user_prompt(format!("Security review of namespace '{}'", namespace), prompt_text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(result: &PromptGetResult) -> &str {
        match &result.messages[0] {
            PromptMessage::User { content: PromptContent::Text { text } } => text,
            PromptMessage::Assistant { .. } => panic!("expected a user message"),
        }
    }

    #[test]
    fn test_connectivity_mentions_client() {
        let result = render_diagnose_service_connectivity(Some(json!({
            "service": "reviews",
            "namespace": "bookinfo",
            "client": "productpage-7d9f"
        })))
        .unwrap();
        assert!(text(&result).contains("productpage-7d9f"));
        assert!(text(&result).contains("check_service_endpoints"));
    }

    #[test]
    fn test_gateway_requires_namespace() {
        let err = render_troubleshoot_gateway(Some(json!({"gateway": "edge"}))).unwrap_err();
        assert!(err.to_string().contains("namespace"));
    }

    #[test]
    fn test_mesh_security_selects_mesh_steps() {
        let result = render_review_mesh_security(Some(json!({
            "namespace": "shop",
            "mesh": "Linkerd"
        })))
        .unwrap();
        assert!(text(&result).contains("analyze_linkerd_policies"));
        assert!(!text(&result).contains("list_peer_authentications"));

        let err = render_review_mesh_security(Some(json!({"namespace": "shop", "mesh": "consul"})))
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidParams(_)));
    }
}
