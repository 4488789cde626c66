//! MCP Request Handler
//!
//! Routes incoming JSON-RPC requests to the appropriate method handlers.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};

use crate::mcp::error::McpError;
use crate::mcp::prompts;
use crate::mcp::protocol::*;
use crate::mcp::tool_registry::ToolRegistry;
use crate::mcp::tools::ToolContext;
use crate::tool_span;

const INSTRUCTIONS: &str = "Read-only diagnostics for Kubernetes networking. Start with \
detect_networking_stack, then use the analyze_*, check_* and scan_* tools of the installed \
stacks. Every tool answers with findings (severity, summary, suggestion); design_* tools return \
remediation YAML for the user to review and apply. Pass namespace '*' to inspect all namespaces.";

/// Negotiate MCP protocol version
///
/// Finds the highest version we support that is <= client's version.
fn negotiate_version(client_version: &str) -> Result<String, McpError> {
    let negotiated = SUPPORTED_VERSIONS.iter().rev().find(|&&v| v <= client_version).copied();

    match negotiated {
        Some(v) => Ok(v.to_string()),
        None => Err(McpError::UnsupportedProtocolVersion {
            client: client_version.to_string(),
            supported: SUPPORTED_VERSIONS.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

pub struct McpHandler {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    initialized: bool,
    log_level: Option<LogLevel>,
}

impl McpHandler {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self { registry, ctx, initialized: false, log_level: None }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Level most recently requested with `logging/setLevel`
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> JsonRpcResponse {
        let method = request.method.clone();
        let id = request.id.clone();

        debug!(method = %method, id = ?id, "Handling MCP request");

        // Initialization is not enforced: the HTTP transport builds a handler per request.
        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params).await,
            "initialized" | "notifications/initialized" => self.handle_initialized(request.id),
            "notifications/cancelled" => {
                debug!("Received cancellation notification");
                self.empty_result(request.id)
            }
            "ping" => {
                debug!("Received ping request");
                self.empty_result(request.id)
            }
            "tools/list" => self.handle_tools_list(request.id),
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            "prompts/list" => self.handle_prompts_list(request.id),
            "prompts/get" => self.handle_prompts_get(request.id, request.params),
            "logging/setLevel" => self.handle_logging_set_level(request.id, request.params),
            _ => self.method_not_found(request.id, &request.method),
        };

        debug!(method = %method, id = ?id, has_error = response.error.is_some(), "Completed MCP request");

        response
    }

    async fn handle_initialize(&mut self, id: Option<JsonRpcId>, params: Value) -> JsonRpcResponse {
        let params: InitializeRequest = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse initialize params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse initialize params: {}", e)),
                );
            }
        };

        debug!(
            protocol_version = %params.protocol_version,
            client_name = %params.client_info.name,
            "Received initialize request"
        );

        let client_version = if params.protocol_version.is_empty() {
            "2024-11-05"
        } else {
            &params.protocol_version
        };

        let negotiated_version = match negotiate_version(client_version) {
            Ok(v) => v,
            Err(e) => {
                error!(client_version = %client_version, error = %e, "Protocol version negotiation failed");
                return self.error_response(id, e);
            }
        };

        info!(
            client_name = %params.client_info.name,
            client_version = %client_version,
            negotiated_version = %negotiated_version,
            "MCP session initialized"
        );

        self.initialized = true;

        let result = InitializeResponse {
            protocol_version: negotiated_version,
            capabilities: Capabilities {
                tools: Some(ToolCapabilities { list_changed: Some(false) }),
                prompts: Some(PromptsCapability { list_changed: Some(false) }),
                logging: Some(LoggingCapability {}),
                ..Default::default()
            },
            server_info: ServerInfo {
                name: "kubenet-mcp".to_string(),
                version: crate::VERSION.to_string(),
                title: Some("Kubernetes networking diagnostics".to_string()),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        };

        self.result_response(id, result)
    }

    fn handle_initialized(&mut self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        debug!("Received initialized notification");
        self.empty_result(id)
    }

    fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        let tools = self.registry.list();
        debug!(count = tools.len(), "Listing available tools");
        self.result_response(id, ToolsListResult { tools, next_cursor: None })
    }

    async fn handle_tools_call(&self, id: Option<JsonRpcId>, params: Value) -> JsonRpcResponse {
        let params: ToolCallRequest = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse tool call params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse tool call params: {}", e)),
                );
            }
        };

        if !self.registry.contains(&params.name) {
            return self.error_response(id, McpError::ToolNotFound(params.name));
        }

        let args = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        let timeout = self.ctx.config.tools.timeout();
        let span = tool_span!(params.name);

        let outcome = tokio::time::timeout(
            timeout,
            self.registry.call(&params.name, args, &self.ctx).instrument(span),
        )
        .await
        .unwrap_or_else(|_| {
            Err(McpError::Timeout { tool: params.name.clone(), seconds: timeout.as_secs() })
        });

        let result = match outcome {
            Ok(result) => result,
            // Unknown tools are handled above; anything here is an execution failure the
            // calling model should see.
            Err(e) => {
                warn!(tool = %params.name, code = e.code_name(), error = %e, "Tool call failed");
                e.to_tool_result()
            }
        };

        self.result_response(id, result)
    }

    fn handle_prompts_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        debug!("Listing available prompts");
        let prompts = prompts::get_all_prompts();
        self.result_response(id, PromptsListResult { prompts, next_cursor: None })
    }

    fn handle_prompts_get(&self, id: Option<JsonRpcId>, params: Value) -> JsonRpcResponse {
        let params: PromptGetParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse prompt get params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse prompt get params: {}", e)),
                );
            }
        };

        debug!(prompt_name = %params.name, "Getting prompt");

        match prompts::get_prompt(&params.name, params.arguments) {
            Ok(result) => self.result_response(id, result),
            Err(e) => self.error_response(id, e),
        }
    }

    fn handle_logging_set_level(&mut self, id: Option<JsonRpcId>, params: Value) -> JsonRpcResponse {
        let params: SetLogLevelParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "Failed to parse logging set level params");
                return self.error_response(
                    id,
                    McpError::InvalidParams(format!("Failed to parse logging params: {}", e)),
                );
            }
        };

        info!(level = ?params.level, filter = params.level.as_filter(), "Client set log level");
        self.log_level = Some(params.level);

        self.empty_result(id)
    }

    fn result_response<T: Serialize>(&self, id: Option<JsonRpcId>, result: T) -> JsonRpcResponse {
        match serde_json::to_value(result) {
            Ok(value) => {
                JsonRpcResponse { jsonrpc: "2.0".to_string(), id, result: Some(value), error: None }
            }
            Err(e) => self.error_response(id, McpError::SerializationError(e)),
        }
    }

    fn empty_result(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(serde_json::json!({})),
            error: None,
        }
    }

    fn method_not_found(&self, id: Option<JsonRpcId>, method: &str) -> JsonRpcResponse {
        error!(method = %method, "Method not found");

        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {}", method),
                data: None,
            }),
        }
    }

    fn error_response(&self, id: Option<JsonRpcId>, error: McpError) -> JsonRpcResponse {
        error!(error = %error, "MCP error");

        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error.to_json_rpc_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::k8s::InMemoryCluster;
    use serde_json::json;

    fn create_test_handler() -> McpHandler {
        let config = Arc::new(AppConfig::default());
        let registry = Arc::new(ToolRegistry::new(&config.tools));
        let ctx = ToolContext::new(Arc::new(InMemoryCluster::new()), config);
        McpHandler::new(registry, ctx)
    }

    fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(JsonRpcId::Number(id)),
            method: method.to_string(),
            params,
        }
    }

    fn initialize_params(version: &str) -> Value {
        json!({
            "protocolVersion": version,
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0.0"}
        })
    }

    #[tokio::test]
    async fn test_initialize() {
        let mut handler = create_test_handler();

        let response =
            handler.handle_request(request(1, "initialize", initialize_params("2025-11-25"))).await;

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "kubenet-mcp");
        assert!(result["capabilities"]["tools"].is_object());
        assert!(result["instructions"].as_str().unwrap().contains("detect_networking_stack"));
        assert!(handler.is_initialized());
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let mut handler = create_test_handler();

        let response = handler.handle_request(request(1, "unknown/method", json!({}))).await;

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_list_without_initialize() {
        let mut handler = create_test_handler();

        let response = handler.handle_request(request(1, "tools/list", json!({}))).await;

        assert!(response.error.is_none());
        let tools = response.result.unwrap()["tools"].as_array().cloned().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "analyze_istio_routing"));
        assert!(tools.iter().all(|t| t["inputSchema"]["type"] == "object"));
    }

    #[tokio::test]
    async fn test_ping_and_notifications() {
        let mut handler = create_test_handler();

        for method in ["ping", "notifications/initialized", "notifications/cancelled"] {
            let response = handler.handle_request(request(1, method, json!({}))).await;
            assert_eq!(response.result, Some(json!({})), "{}", method);
        }
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool_is_protocol_error() {
        let mut handler = create_test_handler();

        let response = handler
            .handle_request(request(1, "tools/call", json!({"name": "cp_list_clusters"})))
            .await;

        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_call_invalid_params() {
        let mut handler = create_test_handler();

        let response = handler.handle_request(request(1, "tools/call", json!({"args": 1}))).await;

        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::INVALID_PARAMS);
        assert!(error.message.contains("Failed to parse tool call params"));
    }

    #[tokio::test]
    async fn test_tools_call_failure_is_tool_error() {
        let mut handler = create_test_handler();

        let response = handler
            .handle_request(request(
                1,
                "tools/call",
                json!({"name": "analyze_istio_routing", "arguments": {}}),
            ))
            .await;

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        let body: Value =
            serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
        assert_eq!(body["error"]["code"], "CRD_NOT_AVAILABLE");
    }

    #[tokio::test]
    async fn test_prompts_get() {
        let mut handler = create_test_handler();

        let response = handler
            .handle_request(request(
                1,
                "prompts/get",
                json!({"name": "review_mesh_security", "arguments": {"namespace": "shop"}}),
            ))
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["messages"][0]["role"], "user");

        let response = handler
            .handle_request(request(2, "prompts/get", json!({"name": "missing"})))
            .await;
        assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_logging_set_level() {
        let mut handler = create_test_handler();

        let response =
            handler.handle_request(request(1, "logging/setLevel", json!({"level": "warning"}))).await;
        assert!(response.error.is_none());
        assert_eq!(handler.log_level(), Some(LogLevel::Warning));

        let response =
            handler.handle_request(request(2, "logging/setLevel", json!({"level": "verbose"}))).await;
        assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_version_negotiation_exact_match() {
        assert_eq!(negotiate_version("2025-11-25").unwrap(), "2025-11-25");
    }

    #[test]
    fn test_version_negotiation_newer_client() {
        // Client has newer version than we support - should get our newest
        assert_eq!(negotiate_version("2026-01-01").unwrap(), "2025-11-25");
    }

    #[test]
    fn test_version_negotiation_older_client() {
        assert_eq!(negotiate_version("2025-03-26").unwrap(), "2025-03-26");
        assert_eq!(negotiate_version("2024-11-05").unwrap(), "2024-11-05");
    }

    #[test]
    fn test_version_negotiation_failure() {
        match negotiate_version("2024-01-01").unwrap_err() {
            McpError::UnsupportedProtocolVersion { client, supported } => {
                assert_eq!(client, "2024-01-01");
                assert_eq!(supported.len(), 4);
                assert!(supported.contains(&"2024-11-05".to_string()));
                assert!(supported.contains(&"2025-11-25".to_string()));
            }
            _ => panic!("Expected UnsupportedProtocolVersion error"),
        }
    }

    #[test]
    fn test_unsupported_version_json_rpc_error() {
        let json_rpc_error = negotiate_version("2020-01-01").unwrap_err().to_json_rpc_error();

        assert_eq!(json_rpc_error.code, error_codes::INVALID_REQUEST);
        assert!(json_rpc_error.message.contains("Unsupported protocol version"));
        assert!(json_rpc_error.message.contains("2020-01-01"));

        let data = json_rpc_error.data.unwrap();
        assert_eq!(data["supportedVersions"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_initialize_with_unsupported_version() {
        let mut handler = create_test_handler();

        let response =
            handler.handle_request(request(1, "initialize", initialize_params("2023-01-01"))).await;

        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, error_codes::INVALID_REQUEST);
        assert!(error.data.is_some());

        // Handler should not be initialized after failed negotiation
        assert!(!handler.is_initialized());
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let mut handler = create_test_handler();

        let response =
            handler.handle_request(request(1, "initialize", initialize_params("2025-06-18"))).await;
        assert_eq!(response.result.unwrap()["protocolVersion"], "2025-06-18");

        let response =
            handler.handle_request(request(2, "initialize", initialize_params("2026-12-31"))).await;
        assert_eq!(response.result.unwrap()["protocolVersion"], "2025-11-25");

        let response = handler.handle_request(request(3, "initialize", initialize_params(""))).await;
        assert_eq!(response.result.unwrap()["protocolVersion"], "2024-11-05");
    }
}
