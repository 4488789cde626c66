//! # Configuration Settings
//!
//! Defines the configuration structure for kubenet-mcp.

use crate::errors::{Error, Result};
use crate::k8s::names::is_dns1123_label;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// MCP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Kubernetes client configuration
    #[validate(nested)]
    pub kubernetes: KubernetesConfig,

    /// Tool execution configuration
    #[validate(nested)]
    pub tools: ToolsConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    fn validate_custom(&self) -> Result<()> {
        if let Some(namespace) = &self.kubernetes.default_namespace {
            if !is_dns1123_label(namespace) {
                return Err(Error::validation_field(
                    format!("Default namespace '{}' is not a valid namespace name", namespace),
                    "kubernetes.default_namespace",
                ));
            }
        }

        if self.kubernetes.request_timeout_seconds > self.tools.timeout_seconds {
            return Err(Error::validation(
                "Kubernetes request timeout cannot exceed the tool timeout",
            ));
        }

        Ok(())
    }
}

/// MCP transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Line-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST
    Http,
}

impl std::str::FromStr for Transport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            other => Err(Error::config(format!(
                "Unsupported transport '{}'. Use 'stdio' or 'http'.",
                other
            ))),
        }
    }
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Transport to serve on
    pub transport: Transport,

    /// HTTP bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// HTTP port
    #[validate(range(min = 1, max = 65535, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Maximum HTTP request body size in bytes
    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::Stdio,
            host: "127.0.0.1".to_string(),
            port: 8765,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

impl ServerConfig {
    /// Get the HTTP bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Kubernetes client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct KubernetesConfig {
    /// Explicit kubeconfig path (otherwise `KUBECONFIG`, `~/.kube/config` or in-cluster)
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    pub context: Option<String>,

    /// Namespace used when a tool call omits one (None = all namespaces)
    pub default_namespace: Option<String>,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Per-request read timeout in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Request timeout must be between 1 and 300 seconds"
    ))]
    pub request_timeout_seconds: u64,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            context: None,
            default_namespace: None,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
        }
    }
}

impl KubernetesConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ToolsConfig {
    /// Upper bound for a single tool call in seconds
    #[validate(range(
        min = 1,
        max = 600,
        message = "Tool timeout must be between 1 and 600 seconds"
    ))]
    pub timeout_seconds: u64,

    /// Default number of log lines fetched by `analyze_proxy_logs`
    #[validate(range(min = 1, max = 10000, message = "Tail lines must be between 1 and 10000"))]
    pub default_tail_lines: i64,

    /// Tools that are not registered
    pub disabled: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { timeout_seconds: 60, default_tail_lines: 200, disabled: vec![] }
    }
}

impl ToolsConfig {
    /// Get tool timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn is_disabled(&self, tool: &str) -> bool {
        self.disabled.iter().any(|name| name == tool)
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Service name attached to startup events
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            service_name: "kubenet-mcp".to_string(),
        }
    }
}
