//! # Structured Logging
//!
//! Span macros and startup logging on top of the tracing ecosystem. Every event goes to stderr;
//! stdout belongs to the stdio transport.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for a tool invocation.
///
/// ```rust,ignore
/// let span = tool_span!("analyze_istio_routing");
/// let span = tool_span!("list_services", namespace = "bookinfo");
/// ```
#[macro_export]
macro_rules! tool_span {
    ($tool:expr) => {
        tracing::info_span!(
            "tool_call",
            tool = %$tool,
            call_id = %uuid::Uuid::new_v4()
        )
    };
    ($tool:expr, $($field:tt)*) => {
        tracing::info_span!(
            "tool_call",
            tool = %$tool,
            call_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for an MCP request.
#[macro_export]
macro_rules! mcp_request_span {
    ($method:expr, $transport:expr) => {
        tracing::debug_span!(
            "mcp_request",
            method = %$method,
            transport = %$transport,
            request_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the configured level.
/// Installing twice (tests, embedded use) is not an error.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(true);

    // An already installed subscriber stays in place.
    if config.json_logging {
        builder.json().try_init().ok();
    } else {
        builder.with_ansi(false).try_init().ok();
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        service_name = %config.observability.service_name,
        transport = ?config.server.transport,
        http_address = %config.server.bind_address(),
        context = config.kubernetes.context.as_deref().unwrap_or("<current>"),
        default_namespace = config.kubernetes.default_namespace.as_deref().unwrap_or("<all>"),
        tool_timeout_seconds = config.tools.timeout_seconds,
        disabled_tools = config.tools.disabled.len(),
        "kubenet-mcp configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = tool_span!("list_services");
        let _span = tool_span!("list_services", namespace = "bookinfo");
        let _span = mcp_request_span!("tools/call", "stdio");
    }

    #[test]
    fn test_init_logging_twice_is_ok() {
        let config = ObservabilityConfig::default();
        assert!(init_logging(&config).is_ok());
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_log_config_info() {
        let config = AppConfig::default();

        // This should not panic
        log_config_info(&config);
    }
}
