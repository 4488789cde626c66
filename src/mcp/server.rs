//! MCP Stdio Server
//!
//! Implements the stdio transport for MCP: reads line-delimited JSON-RPC messages from stdin and
//! writes responses to stdout. Logs go to stderr.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn, Instrument};

use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::mcp_request_span;

pub struct McpStdioServer {
    handler: McpHandler,
}

impl McpStdioServer {
    pub fn new(handler: McpHandler) -> Self {
        Self { handler }
    }

    /// Serve stdin until EOF.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!("Starting MCP stdio server");
        let reader = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        self.serve(reader, &mut stdout).await?;
        info!("MCP stdio server shutting down (EOF received)");
        Ok(())
    }

    /// Process every line of `reader`, writing one response line per request. Notifications
    /// (requests without an id) get no response.
    pub async fn serve<R, W>(&mut self, reader: R, writer: &mut W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            debug!(bytes = line.len(), "Received input line");

            let request: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(req) => req,
                Err(e) => {
                    warn!(error = %e, "Failed to parse JSON-RPC request");

                    let error_response = JsonRpcResponse {
                        jsonrpc: "2.0".to_string(),
                        id: None,
                        result: None,
                        error: Some(JsonRpcError {
                            code: error_codes::PARSE_ERROR,
                            message: format!("Parse error: {}", e),
                            data: None,
                        }),
                    };

                    write_response(writer, &error_response).await?;
                    continue;
                }
            };

            let is_notification = request.id.is_none();
            let span = mcp_request_span!(request.method, "stdio");
            let response = self.handler.handle_request(request).instrument(span).await;

            if !is_notification {
                write_response(writer, &response).await?;
            }
        }

        Ok(())
    }
}

async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &JsonRpcResponse,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(response)?;
    debug!(bytes = json.len(), "Writing response");

    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::k8s::InMemoryCluster;
    use crate::mcp::tool_registry::ToolRegistry;
    use crate::mcp::tools::ToolContext;
    use serde_json::Value;
    use std::sync::Arc;

    fn create_test_server() -> McpStdioServer {
        let config = Arc::new(AppConfig::default());
        let registry = Arc::new(ToolRegistry::new(&config.tools));
        let ctx = ToolContext::new(Arc::new(InMemoryCluster::new()), config);
        McpStdioServer::new(McpHandler::new(registry, ctx))
    }

    async fn exchange(input: &str) -> Vec<Value> {
        let mut server = create_test_server();
        let mut output: Vec<u8> = Vec::new();
        server.serve(BufReader::new(input.as_bytes()), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_one_response_per_request() {
        let responses = exchange(concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-06-18","capabilities":{},"clientInfo":{"name":"t","version":"1"}}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n",
        ))
        .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[0]["result"]["protocolVersion"], "2025-06-18");
        assert_eq!(responses[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let responses = exchange("{not json\n").await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["error"]["code"], error_codes::PARSE_ERROR);
        assert!(responses[0]["id"].is_null());
    }
}
