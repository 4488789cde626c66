//! Proxy log triage tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::instrument;

use super::{Args, ToolContext, ToolProvider};
use crate::analysis::logs;
use crate::findings::ResourceRef;
use crate::k8s::ResourceKind;
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub const DEFAULT_CONTAINER: &str = "istio-proxy";
const MAX_TAIL_LINES: i64 = 10_000;

pub struct LogTools;

#[async_trait]
impl ToolProvider for LogTools {
    fn tools(&self) -> Vec<Tool> {
        vec![analyze_proxy_logs_tool()]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "analyze_proxy_logs" => execute_analyze_proxy_logs(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn analyze_proxy_logs_tool() -> Tool {
    Tool::new(
        "analyze_proxy_logs",
        "Fetch recent logs of a proxy container (istio-proxy by default) and categorize failures: Envoy response flags such as NR, UH, UF, UT and URX, RBAC denials, TLS handshake and DNS failures and 5xx responses.",
        super::namespaced_schema(
            json!({
                "pod": {"type": "string", "description": "Pod name"},
                "container": {
                    "type": "string",
                    "description": "Container to read (default istio-proxy; linkerd-proxy for Linkerd)"
                },
                "tail_lines": {
                    "type": "integer",
                    "minimum": 1,
                    "maximum": MAX_TAIL_LINES,
                    "description": "Number of most recent lines to analyze"
                }
            }),
            &["namespace", "pod"],
        ),
    )
}

#[instrument(skip(ctx, args), name = "mcp_execute_analyze_proxy_logs")]
pub async fn execute_analyze_proxy_logs(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let namespace = args.required_namespace(ctx)?;
    let pod = args.name("pod")?;
    let container = args.optional_str("container")?.unwrap_or(DEFAULT_CONTAINER);
    let tail_lines = args.optional_i64("tail_lines")?.unwrap_or(ctx.config.tools.default_tail_lines);
    if !(1..=MAX_TAIL_LINES).contains(&tail_lines) {
        return Err(McpError::InvalidInput(format!(
            "tail_lines must be between 1 and {}, got {}",
            MAX_TAIL_LINES, tail_lines
        )));
    }

    let text = ctx.cluster.pod_logs(&namespace, pod, Some(container), tail_lines).await?;
    let report = logs::scan(&text);

    let source = format!("{}/{} ({})", namespace, pod, container);
    let resource = ResourceRef::new(ResourceKind::Pod, pod, Some(namespace.as_str()));
    let findings: Vec<_> = logs::findings(&report, &source)
        .into_iter()
        .map(|finding| finding.resource(resource.clone()))
        .collect();

    tracing::info!(
        namespace = %namespace,
        pod = %pod,
        container = %container,
        lines = report.lines_scanned,
        categories = report.categories.len(),
        "Analyzed proxy logs"
    );

    let mut response = StandardResponse::new("analyze_proxy_logs", Some(namespace.as_str()), findings);
    if report.categories.is_empty() {
        response = response.with_summary(format!(
            "No known failure patterns in {} line(s) of {}",
            report.lines_scanned, source
        ));
    }
    response.with_data(&report)?.into_tool_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;
    use crate::mcp::tools::test_support::{call, context, summaries};

    fn cluster_with_logs(logs: &str) -> InMemoryCluster {
        let mut cluster = InMemoryCluster::new();
        cluster.set_pod_logs("bookinfo", "productpage-1", Some("istio-proxy"), logs);
        cluster
    }

    #[tokio::test]
    async fn test_categorizes_no_healthy_upstream() {
        let ctx = context(cluster_with_logs(concat!(
            "[2025-05-01T10:00:01.000Z] \"GET /reviews HTTP/1.1\" 503 UH no_healthy_upstream - \"-\" 0 19 0 - \"-\"\n",
            "[2025-05-01T10:00:02.000Z] \"GET /reviews HTTP/1.1\" 503 UH no_healthy_upstream - \"-\" 0 19 0 - \"-\"\n",
        )));
        let body = call(
            &LogTools,
            &ctx,
            "analyze_proxy_logs",
            json!({"namespace": "bookinfo", "pod": "productpage-1"}),
        )
        .await;
        let summaries = summaries(&body);
        assert!(summaries.iter().any(|s| s.starts_with("2 line(s) in bookinfo/productpage-1 (istio-proxy)")));
        assert_eq!(body["data"]["linesScanned"], 2);
        assert_eq!(body["findings"][0]["resource"]["name"], "productpage-1");
    }

    #[tokio::test]
    async fn test_clean_logs() {
        let ctx = context(cluster_with_logs("\"GET / HTTP/1.1\" 200 - via_upstream\n"));
        let body = call(
            &LogTools,
            &ctx,
            "analyze_proxy_logs",
            json!({"namespace": "bookinfo", "pod": "productpage-1"}),
        )
        .await;
        assert_eq!(body["counts"]["critical"], 0);
        assert!(body["summary"].as_str().unwrap().starts_with("No known failure patterns in 1 line(s)"));
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let ctx = context(cluster_with_logs(""));
        let err = LogTools
            .call("analyze_proxy_logs", json!({"namespace": "*", "pod": "productpage-1"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");

        let err = LogTools
            .call(
                "analyze_proxy_logs",
                json!({"namespace": "bookinfo", "pod": "productpage-1", "tail_lines": 0}),
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tail_lines"));

        let err = LogTools
            .call("analyze_proxy_logs", json!({"namespace": "bookinfo", "pod": "missing"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code_name(), "NOT_FOUND");
    }
}
