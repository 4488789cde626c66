//! MCP protocol flows through the handler: session setup, discovery and error surfaces.

mod common;

use common::{call_tool_raw, cluster_from_yaml, create_handler, create_handler_with, rpc, BOOKINFO};
use kubenet_mcp::config::AppConfig;
use kubenet_mcp::k8s::InMemoryCluster;
use kubenet_mcp::mcp::protocol::error_codes;
use serde_json::json;

#[tokio::test]
async fn test_session_lifecycle() {
    let mut handler = create_handler(cluster_from_yaml(&[BOOKINFO]));

    let response = rpc(
        &mut handler,
        1,
        "initialize",
        json!({
            "protocolVersion": "2025-03-26",
            "capabilities": {"roots": {"listChanged": true}},
            "clientInfo": {"name": "inspector", "version": "0.9.0"}
        }),
    )
    .await;
    let result = response.result.expect("initialize should succeed");
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["version"], kubenet_mcp::VERSION);
    assert!(result["capabilities"]["prompts"].is_object());
    assert!(result["capabilities"]["logging"].is_object());
    assert!(handler.is_initialized());

    let response = rpc(&mut handler, 2, "notifications/initialized", json!({})).await;
    assert!(response.error.is_none());

    let response = rpc(&mut handler, 3, "ping", json!({})).await;
    assert_eq!(response.result, Some(json!({})));
}

#[tokio::test]
async fn test_tools_list_is_sorted_and_complete() {
    let mut handler = create_handler(InMemoryCluster::new());

    let response = rpc(&mut handler, 1, "tools/list", json!({})).await;
    let tools = response.result.unwrap()["tools"].as_array().cloned().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();

    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    for expected in [
        "detect_networking_stack",
        "scan_gateway_misconfigs",
        "analyze_istio_routing",
        "validate_istio_config",
        "check_kgateway_health",
        "analyze_calico_policies",
        "check_kuma_mesh",
        "analyze_linkerd_policies",
        "check_flannel",
        "analyze_proxy_logs",
        "design_istio_traffic_split",
    ] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
    assert!(tools.iter().all(|t| t["description"].as_str().is_some_and(|d| !d.is_empty())));
}

#[tokio::test]
async fn test_disabled_tool_is_hidden_and_uncallable() {
    let mut config = AppConfig::default();
    config.tools.disabled = vec!["check_flannel".to_string()];
    let mut handler = create_handler_with(InMemoryCluster::new(), config);

    let response = rpc(&mut handler, 1, "tools/list", json!({})).await;
    let tools = response.result.unwrap()["tools"].as_array().cloned().unwrap();
    assert!(tools.iter().all(|t| t["name"] != "check_flannel"));

    let response =
        rpc(&mut handler, 2, "tools/call", json!({"name": "check_flannel", "arguments": {}})).await;
    assert_eq!(response.error.unwrap().code, error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn test_tool_errors_are_results_not_protocol_errors() {
    let mut handler = create_handler(InMemoryCluster::new());

    let (is_error, body) = call_tool_raw(&mut handler, "check_kuma_mesh", json!({})).await;
    assert!(is_error);
    assert_eq!(body["error"]["code"], "CRD_NOT_AVAILABLE");

    let (is_error, body) =
        call_tool_raw(&mut handler, "list_services", json!({"namespace": "Not_A_Namespace"})).await;
    assert!(is_error);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");

    let (is_error, body) = call_tool_raw(
        &mut handler,
        "get_resource",
        json!({"kind": "Service", "name": "missing", "namespace": "default"}),
    )
    .await;
    assert!(is_error);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_malformed_tool_call_params() {
    let mut handler = create_handler(InMemoryCluster::new());

    let response = rpc(&mut handler, 1, "tools/call", json!({"arguments": {}})).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_prompts_list_and_get() {
    let mut handler = create_handler(InMemoryCluster::new());

    let response = rpc(&mut handler, 1, "prompts/list", json!({})).await;
    let prompts = response.result.unwrap()["prompts"].as_array().cloned().unwrap();
    assert_eq!(prompts.len(), 3);

    let response = rpc(
        &mut handler,
        2,
        "prompts/get",
        json!({
            "name": "diagnose_service_connectivity",
            "arguments": {"service": "reviews", "namespace": "bookinfo"}
        }),
    )
    .await;
    let result = response.result.unwrap();
    let text = result["messages"][0]["content"]["text"].as_str().unwrap();
    assert!(text.contains("'reviews'"));
    assert!(text.contains("analyze_network_policies"));

    let response = rpc(
        &mut handler,
        3,
        "prompts/get",
        json!({"name": "diagnose_service_connectivity", "arguments": {}}),
    )
    .await;
    assert_eq!(response.error.unwrap().code, error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn test_unsupported_protocol_version() {
    let mut handler = create_handler(InMemoryCluster::new());

    let response = rpc(
        &mut handler,
        1,
        "initialize",
        json!({
            "protocolVersion": "2023-01-01",
            "capabilities": {},
            "clientInfo": {"name": "legacy", "version": "0.1.0"}
        }),
    )
    .await;
    let error = response.error.unwrap();
    assert_eq!(error.code, error_codes::INVALID_REQUEST);
    assert_eq!(error.data.unwrap()["supportedVersions"].as_array().unwrap().len(), 4);
    assert!(!handler.is_initialized());
}
