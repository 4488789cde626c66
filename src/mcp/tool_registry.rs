//! MCP Tool Registry
//!
//! Maps tool names to their definition and the [`ToolProvider`] that executes them. The map is
//! populated once at startup from [`all_providers`] and only read afterwards.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::ToolsConfig;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::tools::{all_providers, ToolContext, ToolProvider};

struct RegisteredTool {
    definition: Tool,
    provider: Arc<dyn ToolProvider>,
}

pub struct ToolRegistry {
    tools: DashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// Registry of every shipped tool minus those disabled in `config`.
    pub fn new(config: &ToolsConfig) -> Self {
        Self::from_providers(all_providers(), config)
    }

    pub fn from_providers(providers: Vec<Arc<dyn ToolProvider>>, config: &ToolsConfig) -> Self {
        let tools = DashMap::new();
        for provider in providers {
            for definition in provider.tools() {
                if config.is_disabled(&definition.name) {
                    debug!(tool = %definition.name, "Tool disabled by configuration");
                    continue;
                }
                tools.insert(
                    definition.name.clone(),
                    RegisteredTool { definition, provider: Arc::clone(&provider) },
                );
            }
        }
        Self { tools }
    }

    /// Tool definitions sorted by name.
    pub fn list(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> =
            self.tools.iter().map(|entry| entry.value().definition.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute `name`. Unknown or disabled tools fail with [`McpError::ToolNotFound`].
    pub async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        // Clone the provider out so no map guard is held across the await.
        let provider = self
            .tools
            .get(name)
            .map(|entry| Arc::clone(&entry.value().provider))
            .ok_or_else(|| McpError::ToolNotFound(name.to_string()))?;
        provider.call(name, args, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::context;
    use crate::k8s::InMemoryCluster;
    use serde_json::json;

    #[test]
    fn test_registry_lists_tools_sorted() {
        let registry = ToolRegistry::new(&ToolsConfig::default());
        let names: Vec<String> = registry.list().into_iter().map(|t| t.name).collect();

        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(registry.contains("analyze_istio_routing"));
        assert!(registry.contains("scan_gateway_misconfigs"));
        assert!(registry.contains("design_network_policy"));
        assert_eq!(registry.len(), names.len());
    }

    #[test]
    fn test_disabled_tools_are_not_registered() {
        let config = ToolsConfig {
            disabled: vec!["check_flannel".to_string(), "analyze_proxy_logs".to_string()],
            ..Default::default()
        };
        let all = ToolRegistry::new(&ToolsConfig::default());
        let registry = ToolRegistry::new(&config);

        assert!(!registry.contains("check_flannel"));
        assert!(!registry.contains("analyze_proxy_logs"));
        assert_eq!(registry.len(), all.len() - 2);
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let registry = ToolRegistry::new(&ToolsConfig::default());
        let ctx = context(InMemoryCluster::new());
        let err = registry.call("delete_everything", json!({}), &ctx).await.unwrap_err();
        assert!(matches!(err, McpError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_call_dispatches_to_provider() {
        let registry = ToolRegistry::new(&ToolsConfig::default());
        let ctx = context(InMemoryCluster::new());
        let result = registry
            .call(
                "design_network_policy",
                json!({"name": "allow-web", "namespace": "shop"}),
                &ctx,
            )
            .await
            .unwrap();
        assert!(result.is_error.is_none());
        assert!(result.joined_text().contains("NetworkPolicy"));
    }
}
