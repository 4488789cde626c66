//! MCP Error Types

use crate::k8s::ClusterError;
use crate::mcp::protocol::{error_codes, JsonRpcError, ToolCallResult};
use crate::remediation::RemediationError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Unsupported protocol version: {client}. Supported versions: {}", .supported.join(", "))]
    UnsupportedProtocolVersion { client: String, supported: Vec<String> },

    // Tool execution failures, surfaced as `isError` tool results.
    #[error("{0}")]
    CrdNotAvailable(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Kubernetes API error: {0}")]
    KubernetesApi(String),

    #[error("Tool '{tool}' timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            McpError::ParseError(_) => error_codes::PARSE_ERROR,
            McpError::InvalidRequest(_) | McpError::UnsupportedProtocolVersion { .. } => {
                error_codes::INVALID_REQUEST
            }
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) | McpError::PromptNotFound(_) => {
                error_codes::METHOD_NOT_FOUND
            }
            McpError::InvalidParams(_) | McpError::InvalidInput(_) => error_codes::INVALID_PARAMS,
            McpError::CrdNotAvailable(_)
            | McpError::NotFound(_)
            | McpError::KubernetesApi(_)
            | McpError::Timeout { .. }
            | McpError::InternalError(_)
            | McpError::SerializationError(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Machine-readable code carried in tool error results
    pub fn code_name(&self) -> &'static str {
        match self {
            McpError::CrdNotAvailable(_) => "CRD_NOT_AVAILABLE",
            McpError::InvalidInput(_) | McpError::InvalidParams(_) => "INVALID_INPUT",
            McpError::NotFound(_) | McpError::ToolNotFound(_) | McpError::PromptNotFound(_) => {
                "NOT_FOUND"
            }
            McpError::KubernetesApi(_) => "KUBERNETES_API_ERROR",
            McpError::Timeout { .. } => "TIMEOUT",
            _ => "INTERNAL",
        }
    }

    /// Convert to JsonRpcError
    pub fn to_json_rpc_error(&self) -> JsonRpcError {
        let data = match self {
            McpError::UnsupportedProtocolVersion { supported, .. } => {
                Some(json!({ "supportedVersions": supported }))
            }
            _ => None,
        };
        JsonRpcError { code: self.error_code(), message: self.to_string(), data }
    }

    /// Tool result with `isError` set and a `{error: {code, message}}` body.
    pub fn to_tool_result(&self) -> ToolCallResult {
        let body = json!({ "error": { "code": self.code_name(), "message": self.to_string() } });
        ToolCallResult::error_text(body.to_string())
    }
}

/// Implement Into<JsonRpcError> for McpError
impl From<McpError> for JsonRpcError {
    fn from(error: McpError) -> Self {
        error.to_json_rpc_error()
    }
}

impl From<ClusterError> for McpError {
    fn from(error: ClusterError) -> Self {
        match error {
            ClusterError::NotInstalled { .. } => McpError::CrdNotAvailable(error.to_string()),
            ClusterError::NotFound { .. } => McpError::NotFound(error.to_string()),
            ClusterError::Forbidden { .. } | ClusterError::Decode { .. } => {
                McpError::KubernetesApi(error.to_string())
            }
            ClusterError::Api(message) => McpError::KubernetesApi(message),
        }
    }
}

impl From<RemediationError> for McpError {
    fn from(error: RemediationError) -> Self {
        match error {
            RemediationError::InvalidInput(message) => McpError::InvalidInput(message),
            RemediationError::Render(message) => McpError::InternalError(message),
        }
    }
}
