//! Core Kubernetes tools: stack detection, Services, NetworkPolicies and raw object access.

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::instrument;

use super::{list_tool, namespaced_schema, Args, ToolContext, ToolProvider};
use crate::analysis::{network_policy, services, stack};
use crate::k8s::{Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

pub struct CoreTools;

#[async_trait]
impl ToolProvider for CoreTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            detect_networking_stack_tool(),
            list_services_tool(),
            get_resource_tool(),
            check_service_endpoints_tool(),
            list_network_policies_tool(),
            analyze_network_policies_tool(),
        ]
    }

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError> {
        match name {
            "detect_networking_stack" => execute_detect_networking_stack(ctx).await,
            "list_services" => {
                let namespace = Args::new(&args).namespace(ctx)?;
                list_tool(ctx, name, &[ResourceKind::Service], namespace.as_deref()).await
            }
            "get_resource" => execute_get_resource(ctx, args).await,
            "check_service_endpoints" => execute_check_service_endpoints(ctx, args).await,
            "list_network_policies" => {
                let namespace = Args::new(&args).namespace(ctx)?;
                list_tool(ctx, name, &[ResourceKind::NetworkPolicy], namespace.as_deref()).await
            }
            "analyze_network_policies" => execute_analyze_network_policies(ctx, args).await,
            _ => Err(McpError::ToolNotFound(name.to_string())),
        }
    }
}

pub fn detect_networking_stack_tool() -> Tool {
    Tool::new(
        "detect_networking_stack",
        "Detect which networking stacks run in the cluster: installed CRDs (Gateway API, Istio, kgateway, Calico, Kuma, Linkerd), the CNI DaemonSet and mesh control planes.",
        json!({"type": "object", "properties": {}}),
    )
}

pub fn list_services_tool() -> Tool {
    Tool::new(
        "list_services",
        "List Services with their type, cluster IP, selector and ports.",
        namespaced_schema(json!({}), &[]),
    )
}

pub fn get_resource_tool() -> Tool {
    Tool::new(
        "get_resource",
        "Get one object of any supported kind (Service, Gateway, VirtualService, ...). Secrets cannot be read.",
        namespaced_schema(
            json!({
                "kind": {
                    "type": "string",
                    "description": "Kind, plural or short name (e.g. HTTPRoute, virtualservices, vs)"
                },
                "name": {"type": "string", "description": "Object name"},
                "provider": {
                    "type": "string",
                    "description": "Disambiguates shared kind names such as Gateway or AuthorizationPolicy",
                    "enum": Provider::ALL.iter().map(|p| p.as_str()).collect::<Vec<_>>()
                }
            }),
            &["kind", "name"],
        ),
    )
}

pub fn check_service_endpoints_tool() -> Tool {
    Tool::new(
        "check_service_endpoints",
        "Check that Services select ready pods and that their target ports exist on those pods.",
        namespaced_schema(
            json!({"name": {"type": "string", "description": "Only check this Service"}}),
            &[],
        ),
    )
}

pub fn list_network_policies_tool() -> Tool {
    Tool::new(
        "list_network_policies",
        "List Kubernetes NetworkPolicies with their pod selectors and policy types.",
        namespaced_schema(json!({}), &[]),
    )
}

pub fn analyze_network_policies_tool() -> Tool {
    Tool::new(
        "analyze_network_policies",
        "Analyze NetworkPolicies: default-deny coverage, selectors that match nothing, egress rules that block DNS and pods left unprotected.",
        namespaced_schema(json!({}), &[]),
    )
}

#[instrument(skip(ctx), name = "mcp_execute_detect_networking_stack")]
pub async fn execute_detect_networking_stack(
    ctx: &ToolContext,
) -> Result<ToolCallResult, McpError> {
    let probes = Provider::ALL.map(|provider| ctx.cluster.is_installed(provider.probe_kind()));
    let mut installed = Vec::new();
    for (provider, probe) in Provider::ALL.into_iter().zip(join_all(probes).await) {
        if probe? {
            installed.push(provider);
        }
    }

    let snapshot = stack::StackSnapshot {
        installed,
        daemon_sets: ctx.list(ResourceKind::DaemonSet, None).await?,
        deployments: ctx.list(ResourceKind::Deployment, None).await?,
    };
    let (networking, findings) = stack::detect(&snapshot);

    tracing::info!(
        crds = networking.crds.len(),
        cni = networking.cni.len(),
        control_planes = networking.control_planes.len(),
        "Detected networking stack"
    );

    let cni: Vec<&str> = networking.cni.iter().map(|c| c.name.as_str()).collect();
    let summary = format!(
        "CNI: {}; CRDs: {}",
        if cni.is_empty() { "unknown".to_string() } else { cni.join(", ") },
        if networking.crds.is_empty() {
            "none".to_string()
        } else {
            networking.crds.iter().map(|p| p.as_str()).collect::<Vec<_>>().join(", ")
        }
    );
    StandardResponse::new("detect_networking_stack", None, findings)
        .with_summary(summary)
        .with_data(&networking)?
        .into_tool_result()
}

#[instrument(skip(ctx, args), name = "mcp_execute_get_resource")]
pub async fn execute_get_resource(ctx: &ToolContext, args: Value) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let provider = match args.optional_str("provider")? {
        Some(name) => Some(
            Provider::ALL
                .into_iter()
                .find(|p| p.as_str() == name)
                .ok_or_else(|| McpError::InvalidInput(format!("Unknown provider '{}'", name)))?,
        ),
        None => None,
    };
    let kind = args.kind(provider)?;
    if kind == ResourceKind::Secret {
        return Err(McpError::InvalidInput("Secrets cannot be read through this server".into()));
    }
    let name = args.name("name")?;
    let namespace = if kind.namespaced() {
        Some(args.namespace(ctx)?.ok_or_else(|| {
            McpError::InvalidInput(format!("namespace is required for {}", kind.kind()))
        })?)
    } else {
        None
    };

    let mut object = ctx.cluster.get(kind, namespace.as_deref(), name).await?;
    object.metadata.managed_fields = None;

    StandardResponse::new("get_resource", namespace.as_deref(), vec![])
        .with_summary(format!("{} {}", kind.kind(), name))
        .with_data(&object)?
        .into_tool_result()
}

#[instrument(skip(ctx, args), name = "mcp_execute_check_service_endpoints")]
pub async fn execute_check_service_endpoints(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let args = Args::new(&args);
    let namespace = args.namespace(ctx)?;
    let only = match args.optional_str("name")? {
        Some(_) => Some(args.name("name")?),
        None => None,
    };

    let mut service_list = ctx.list(ResourceKind::Service, namespace.as_deref()).await?;
    if let Some(name) = only {
        service_list.retain(|svc| svc.metadata.name.as_deref() == Some(name));
        if service_list.is_empty() {
            return Err(McpError::NotFound(format!(
                "Service '{}' not found{}",
                name,
                namespace.as_deref().map(|ns| format!(" in namespace '{}'", ns)).unwrap_or_default()
            )));
        }
    }

    let snapshot = services::ServiceSnapshot {
        services: service_list,
        pods: ctx.list(ResourceKind::Pod, namespace.as_deref()).await?,
    };
    let (findings, endpoints) = services::check_endpoints(&snapshot);

    tracing::info!(
        namespace = ?namespace,
        services = endpoints.len(),
        findings = findings.len(),
        "Checked service endpoints"
    );

    let response = StandardResponse::new("check_service_endpoints", namespace.as_deref(), findings);
    let summary = format!("{} Service(s) checked: {}", endpoints.len(), response.summary);
    response.with_summary(summary).with_data(&json!({ "services": endpoints }))?.into_tool_result()
}

#[instrument(skip(ctx, args), name = "mcp_execute_analyze_network_policies")]
pub async fn execute_analyze_network_policies(
    ctx: &ToolContext,
    args: Value,
) -> Result<ToolCallResult, McpError> {
    let namespace = Args::new(&args).namespace(ctx)?;
    let snapshot = network_policy::NetworkPolicySnapshot {
        policies: ctx.list(ResourceKind::NetworkPolicy, namespace.as_deref()).await?,
        pods: ctx.list(ResourceKind::Pod, namespace.as_deref()).await?,
        namespaces: ctx.list(ResourceKind::Namespace, None).await?,
    };
    let findings = network_policy::analyze(&snapshot);
    let states = network_policy::namespace_states(&snapshot.policies);

    tracing::info!(
        namespace = ?namespace,
        policies = snapshot.policies.len(),
        findings = findings.len(),
        "Analyzed network policies"
    );

    StandardResponse::new("analyze_network_policies", namespace.as_deref(), findings)
        .with_data(&json!({ "namespaces": states }))?
        .into_tool_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::{call, cluster, context, summaries};

    fn workloads() -> Vec<Value> {
        vec![
            json!({
                "apiVersion": "v1", "kind": "Namespace",
                "metadata": {"name": "shop", "labels": {"kubernetes.io/metadata.name": "shop"}}
            }),
            json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "cart", "namespace": "shop"},
                "spec": {"selector": {"app": "cart"}, "ports": [{"port": 80, "targetPort": 8080}]}
            }),
            json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "orphan", "namespace": "shop"},
                "spec": {"selector": {"app": "gone"}, "ports": [{"port": 80}]}
            }),
            json!({
                "apiVersion": "v1", "kind": "Pod",
                "metadata": {"name": "cart-1", "namespace": "shop", "labels": {"app": "cart"}},
                "spec": {"containers": [{"name": "app", "ports": [{"containerPort": 8080}]}]},
                "status": {"phase": "Running", "conditions": [{"type": "Ready", "status": "True"}]}
            }),
            json!({
                "apiVersion": "apps/v1", "kind": "DaemonSet",
                "metadata": {"name": "calico-node", "namespace": "kube-system"},
                "status": {"numberReady": 2, "desiredNumberScheduled": 2}
            }),
        ]
    }

    #[tokio::test]
    async fn test_detect_networking_stack() {
        let mut fixture = cluster(workloads());
        fixture.install_provider(Provider::GatewayApi);
        let ctx = context(fixture);

        let body = call(&CoreTools, &ctx, "detect_networking_stack", json!({})).await;
        assert_eq!(body["data"]["cni"][0]["name"], "calico");
        assert_eq!(body["data"]["crds"], json!(["gateway-api"]));
        assert_eq!(body["summary"], "CNI: calico; CRDs: gateway-api");
    }

    #[tokio::test]
    async fn test_list_services() {
        let ctx = context(cluster(workloads()));
        let body = call(&CoreTools, &ctx, "list_services", json!({"namespace": "shop"})).await;
        assert_eq!(body["data"]["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["namespace"], "shop");
    }

    #[tokio::test]
    async fn test_check_service_endpoints() {
        let ctx = context(cluster(workloads()));
        let body = call(&CoreTools, &ctx, "check_service_endpoints", json!({})).await;
        assert_eq!(body["counts"]["critical"], 1);
        assert_eq!(summaries(&body), vec!["Service shop/orphan selector matches no pods"]);

        let only = call(&CoreTools, &ctx, "check_service_endpoints", json!({"name": "cart"})).await;
        assert_eq!(only["counts"]["critical"], 0);
    }

    #[tokio::test]
    async fn test_check_missing_service_is_not_found() {
        let ctx = context(cluster(workloads()));
        let err = CoreTools
            .call("check_service_endpoints", json!({"name": "nope"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code_name(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_get_resource() {
        let ctx = context(cluster(workloads()));
        let body = call(
            &CoreTools,
            &ctx,
            "get_resource",
            json!({"kind": "svc", "name": "cart", "namespace": "shop"}),
        )
        .await;
        assert_eq!(body["data"]["spec"]["selector"]["app"], "cart");

        let err = CoreTools
            .call("get_resource", json!({"kind": "Secret", "name": "tls", "namespace": "shop"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_analyze_network_policies() {
        let mut objects = workloads();
        objects.push(json!({
            "apiVersion": "networking.k8s.io/v1", "kind": "NetworkPolicy",
            "metadata": {"name": "default-deny", "namespace": "shop"},
            "spec": {"podSelector": {}, "policyTypes": ["Ingress"]}
        }));
        let ctx = context(cluster(objects));
        let body = call(&CoreTools, &ctx, "analyze_network_policies", json!({"namespace": "shop"})).await;
        assert_eq!(body["data"]["namespaces"]["shop"]["defaultDenyIngress"], true);
        assert!(summaries(&body).contains(&"Namespace shop has a default-deny ingress policy".to_string()));
    }
}
