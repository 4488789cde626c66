//! MCP (Model Context Protocol) Server Implementation
//!
//! Provides stdio-based and HTTP-based MCP servers exposing the Kubernetes networking tools.

pub mod error;
pub mod handler;
pub mod http;
pub mod prompts;
pub mod protocol;
pub mod response;
pub mod server;
pub mod tool_registry;
pub mod tools;

pub use error::McpError;
pub use handler::McpHandler;
pub use http::{build_router, serve_http, HttpState};
pub use protocol::*;
pub use response::StandardResponse;
pub use server::McpStdioServer;
pub use tool_registry::ToolRegistry;
pub use tools::{ToolContext, ToolProvider};
