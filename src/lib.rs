//! # kubenet-mcp
//!
//! An MCP (Model Context Protocol) server that inspects the networking configuration of a
//! Kubernetes cluster and answers with structured findings and remediation YAML. Covered stacks:
//! Gateway API, Istio, kgateway, Calico, Kuma, Linkerd, Flannel, NetworkPolicies and Services.
//!
//! ## Architecture
//!
//! ```text
//! stdio | HTTP → McpHandler (JSON-RPC) → ToolRegistry → ToolProvider
//!                                           ↓
//!        ClusterReader (kube client | in-memory manifests) → analysis → Findings
//! ```
//!
//! Every tool call is a stateless read: objects are listed through [`k8s::ClusterReader`], handed
//! to a pure function in [`analysis`] and rendered as a [`mcp::StandardResponse`]. The server never
//! writes to the cluster.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use kubenet_mcp::config::AppConfig;
//! use kubenet_mcp::k8s::InMemoryCluster;
//! use kubenet_mcp::mcp::{ToolContext, ToolRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut cluster = InMemoryCluster::new();
//! cluster.load_yaml(&std::fs::read_to_string("bookinfo.yaml")?)?;
//!
//! let config = Arc::new(AppConfig::default());
//! let registry = ToolRegistry::new(&config.tools);
//! let ctx = ToolContext::new(Arc::new(cluster), config);
//! let result = registry
//!     .call("analyze_istio_routing", serde_json::json!({"namespace": "bookinfo"}), &ctx)
//!     .await?;
//! println!("{}", result.joined_text());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod errors;
pub mod findings;
pub mod k8s;
pub mod mcp;
pub mod observability;
pub mod remediation;

pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "kubenet-mcp");
    }
}
