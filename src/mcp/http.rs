//! MCP HTTP Transport
//!
//! `POST /mcp` accepts one JSON-RPC 2.0 request and answers with its response; notifications are
//! acknowledged with `202 Accepted`. `GET /healthz` reports liveness. The transport is stateless:
//! every request gets a fresh [`McpHandler`].

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Instrument};

use crate::config::ServerConfig;
use crate::errors::{Error, Result};
use crate::mcp::handler::McpHandler;
use crate::mcp::protocol::{error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::mcp::tool_registry::ToolRegistry;
use crate::mcp::tools::ToolContext;
use crate::mcp_request_span;

#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<ToolRegistry>,
    pub ctx: ToolContext,
}

pub fn build_router(state: HttpState, max_body_size: usize) -> Router {
    Router::new()
        .route("/mcp", post(mcp_http_handler))
        .route("/healthz", get(health_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// POST /mcp
pub async fn mcp_http_handler(State(state): State<HttpState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Failed to parse JSON-RPC request");
            let response = JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: Some(JsonRpcError {
                    code: error_codes::PARSE_ERROR,
                    message: format!("Parse error: {}", e),
                    data: None,
                }),
            };
            return (StatusCode::BAD_REQUEST, Json(response)).into_response();
        }
    };

    debug!(method = %request.method, id = ?request.id, "Received MCP HTTP request");

    let is_notification = request.id.is_none();
    let span = mcp_request_span!(request.method, "http");
    let mut handler = McpHandler::new(state.registry, state.ctx);
    let response = handler.handle_request(request).instrument(span).await;

    if is_notification {
        StatusCode::ACCEPTED.into_response()
    } else {
        Json(response).into_response()
    }
}

/// GET /healthz
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

/// Bind `config.bind_address()` and serve until Ctrl-C.
pub async fn serve_http(config: &ServerConfig, state: HttpState) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;

    let router = build_router(state, config.max_body_size);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind MCP HTTP server: {}", e)))?;

    info!(address = %addr, "Starting MCP HTTP server");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "MCP HTTP server shutdown listener failed");
            }
        })
        .await
        .map_err(|e| Error::transport(format!("MCP HTTP server error: {}", e)))?;

    info!("MCP HTTP server shutdown completed");
    Ok(())
}
