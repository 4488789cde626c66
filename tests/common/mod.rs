//! Common test utilities for all integration tests.
//!
//! Manifest fixtures plus helpers that drive the MCP handler against an in-memory cluster.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

use kubenet_mcp::config::AppConfig;
use kubenet_mcp::k8s::InMemoryCluster;
use kubenet_mcp::mcp::protocol::{JsonRpcId, JsonRpcRequest, JsonRpcResponse};
use kubenet_mcp::mcp::{McpHandler, ToolContext, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

/// Istio bookinfo slice: `reviews` VirtualService routes half its traffic to a subset that the
/// DestinationRule does not define, and `reviews-v2` runs without a sidecar.
pub const BOOKINFO: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: bookinfo
  labels:
    istio-injection: enabled
---
apiVersion: v1
kind: Service
metadata:
  name: reviews
  namespace: bookinfo
spec:
  selector:
    app: reviews
  ports:
    - port: 9080
---
apiVersion: v1
kind: Pod
metadata:
  name: reviews-v1
  namespace: bookinfo
  labels:
    app: reviews
    version: v1
spec:
  containers:
    - name: reviews
    - name: istio-proxy
status:
  phase: Running
  conditions:
    - type: Ready
      status: "True"
---
apiVersion: v1
kind: Pod
metadata:
  name: reviews-v2
  namespace: bookinfo
  labels:
    app: reviews
    version: v2
spec:
  containers:
    - name: reviews
status:
  phase: Running
  conditions:
    - type: Ready
      status: "True"
---
apiVersion: networking.istio.io/v1
kind: DestinationRule
metadata:
  name: reviews
  namespace: bookinfo
spec:
  host: reviews
  subsets:
    - name: v1
      labels:
        version: v1
    - name: v2
      labels:
        version: v2
---
apiVersion: networking.istio.io/v1
kind: VirtualService
metadata:
  name: reviews
  namespace: bookinfo
spec:
  hosts:
    - reviews
  http:
    - route:
        - destination:
            host: reviews
            subset: v1
          weight: 50
        - destination:
            host: reviews
            subset: v3
          weight: 50
"#;

/// Gateway API ingress whose HTTPRoute points at a port the backend Service does not expose.
pub const GATEWAY: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: infra
---
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: istio
spec:
  controllerName: istio.io/gateway-controller
---
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: edge
  namespace: infra
spec:
  gatewayClassName: istio
  listeners:
    - name: http
      port: 80
      protocol: HTTP
      allowedRoutes:
        namespaces:
          from: All
---
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: shop
spec:
  selector:
    app: web
  ports:
    - port: 8080
---
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: shop
  namespace: shop
spec:
  parentRefs:
    - name: edge
      namespace: infra
  rules:
    - backendRefs:
        - name: web
          port: 9090
"#;

/// Plain workloads: one healthy Service and one whose selector matches nothing.
pub const WORKLOADS: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: shop
---
apiVersion: v1
kind: Service
metadata:
  name: cart
  namespace: shop
spec:
  selector:
    app: cart
  ports:
    - port: 80
      targetPort: 8080
---
apiVersion: v1
kind: Service
metadata:
  name: orphan
  namespace: shop
spec:
  selector:
    app: gone
  ports:
    - port: 80
---
apiVersion: v1
kind: Pod
metadata:
  name: cart-1
  namespace: shop
  labels:
    app: cart
spec:
  containers:
    - name: app
      ports:
        - containerPort: 8080
status:
  phase: Running
  conditions:
    - type: Ready
      status: "True"
"#;

pub fn cluster_from_yaml(documents: &[&str]) -> InMemoryCluster {
    let mut cluster = InMemoryCluster::new();
    for yaml in documents {
        let skipped = cluster.load_yaml(yaml).expect("fixture YAML should load");
        assert!(skipped.is_empty(), "fixture contains unsupported kinds: {:?}", skipped);
    }
    cluster
}

pub fn create_handler_with(cluster: InMemoryCluster, config: AppConfig) -> McpHandler {
    let config = Arc::new(config);
    let registry = Arc::new(ToolRegistry::new(&config.tools));
    let ctx = ToolContext::new(Arc::new(cluster), config);
    McpHandler::new(registry, ctx)
}

pub fn create_handler(cluster: InMemoryCluster) -> McpHandler {
    create_handler_with(cluster, AppConfig::default())
}

pub async fn rpc(handler: &mut McpHandler, id: i64, method: &str, params: Value) -> JsonRpcResponse {
    handler
        .handle_request(JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(JsonRpcId::Number(id)),
            method: method.to_string(),
            params,
        })
        .await
}

/// `tools/call` result: (`isError`, parsed JSON body)
pub async fn call_tool_raw(handler: &mut McpHandler, name: &str, arguments: Value) -> (bool, Value) {
    let response =
        rpc(handler, 1, "tools/call", json!({"name": name, "arguments": arguments})).await;
    assert!(response.error.is_none(), "unexpected JSON-RPC error: {:?}", response.error);

    let result = response.result.expect("tools/call should return a result");
    let text = result["content"][0]["text"].as_str().expect("tool result should be text");
    let body = serde_json::from_str(text).expect("tool result should be JSON");
    (result["isError"] == json!(true), body)
}

/// Successful tool call body.
pub async fn call_tool(handler: &mut McpHandler, name: &str, arguments: Value) -> Value {
    let (is_error, body) = call_tool_raw(handler, name, arguments).await;
    assert!(!is_error, "tool {} failed: {}", name, body);
    body
}

pub fn summaries(body: &Value) -> Vec<String> {
    body["findings"]
        .as_array()
        .map(|findings| {
            findings.iter().filter_map(|f| f["summary"].as_str().map(str::to_string)).collect()
        })
        .unwrap_or_default()
}
