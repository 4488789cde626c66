//! # Configuration Management
//!
//! Configuration is read from `KUBENET_MCP_*` environment variables (a `.env` file is loaded by
//! the binary first) and then overridden by CLI flags.

pub mod settings;

pub use settings::{
    AppConfig, KubernetesConfig, ObservabilityConfig, ServerConfig, ToolsConfig, Transport,
};

use crate::errors::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "KUBENET_MCP_";

impl AppConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source. Unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|value| !value.trim().is_empty())
        };
        let mut config = AppConfig::default();

        if let Some(transport) = var("TRANSPORT") {
            config.server.transport = Transport::from_str(&transport)?;
        }
        if let Some(host) = var("HOST") {
            config.server.host = host;
        }
        if let Some(port) = var("PORT") {
            config.server.port = parse_var("PORT", &port)?;
        }
        if let Some(size) = var("MAX_BODY_SIZE") {
            config.server.max_body_size = parse_var("MAX_BODY_SIZE", &size)?;
        }

        config.kubernetes.kubeconfig = var("KUBECONFIG").map(PathBuf::from);
        config.kubernetes.context = var("CONTEXT");
        config.kubernetes.default_namespace = var("NAMESPACE");
        if let Some(secs) = var("CONNECT_TIMEOUT_SECONDS") {
            config.kubernetes.connect_timeout_seconds =
                parse_var("CONNECT_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(secs) = var("REQUEST_TIMEOUT_SECONDS") {
            config.kubernetes.request_timeout_seconds =
                parse_var("REQUEST_TIMEOUT_SECONDS", &secs)?;
        }

        if let Some(secs) = var("TOOL_TIMEOUT_SECONDS") {
            config.tools.timeout_seconds = parse_var("TOOL_TIMEOUT_SECONDS", &secs)?;
        }
        if let Some(lines) = var("LOG_TAIL_LINES") {
            config.tools.default_tail_lines = parse_var("LOG_TAIL_LINES", &lines)?;
        }
        if let Some(disabled) = var("DISABLED_TOOLS") {
            config.tools.disabled = disabled
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(level) = var("LOG_LEVEL") {
            config.observability.log_level = level;
        }
        if let Some(json) = var("JSON_LOGGING") {
            config.observability.json_logging = json.to_lowercase() == "true" || json == "1";
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| {
        Error::config(format!("Invalid {}{} value '{}': {}", ENV_PREFIX, name, value, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_from_lookup_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.port, 8765);
        assert_eq!(config.kubernetes.default_namespace, None);
        assert_eq!(config.tools.default_tail_lines, 200);
    }

    #[test]
    fn test_config_from_lookup_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("KUBENET_MCP_TRANSPORT", "http"),
            ("KUBENET_MCP_PORT", "9090"),
            ("KUBENET_MCP_CONTEXT", "kind-dev"),
            ("KUBENET_MCP_NAMESPACE", "bookinfo"),
            ("KUBENET_MCP_DISABLED_TOOLS", "check_flannel, analyze_proxy_logs,"),
            ("KUBENET_MCP_JSON_LOGGING", "1"),
        ]))
        .unwrap();

        assert_eq!(config.server.transport, Transport::Http);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.kubernetes.context.as_deref(), Some("kind-dev"));
        assert_eq!(config.kubernetes.default_namespace.as_deref(), Some("bookinfo"));
        assert_eq!(config.tools.disabled, vec!["check_flannel", "analyze_proxy_logs"]);
        assert!(config.observability.json_logging);
    }

    #[test]
    fn test_config_from_lookup_invalid_number() {
        let result = AppConfig::from_lookup(lookup(&[("KUBENET_MCP_PORT", "eighty")]));
        let error = result.unwrap_err().to_string();
        assert!(error.contains("KUBENET_MCP_PORT"));
    }
}
