//! MCP Tools Module
//!
//! Every tool reads the cluster through [`ToolContext::cluster`], hands the objects to a pure
//! analysis from [`crate::analysis`] and answers with a
//! [`StandardResponse`](crate::mcp::response::StandardResponse). Tools are grouped by networking
//! stack; each group implements [`ToolProvider`].

pub mod calico;
pub mod core;
pub mod design;
pub mod flannel;
pub mod gateway_api;
pub mod istio;
pub mod kgateway;
pub mod kuma;
pub mod linkerd;
pub mod logs;

use async_trait::async_trait;
use chrono::Utc;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::findings::Finding;
use crate::k8s::fields::ObjectExt;
use crate::k8s::names::{is_dns1123_label, is_dns1123_subdomain};
use crate::k8s::{ClusterReader, Provider, ResourceKind};
use crate::mcp::error::McpError;
use crate::mcp::protocol::{Tool, ToolCallResult};
use crate::mcp::response::StandardResponse;

/// Everything a tool needs to run.
#[derive(Clone)]
pub struct ToolContext {
    pub cluster: Arc<dyn ClusterReader>,
    pub config: Arc<AppConfig>,
}

impl ToolContext {
    pub fn new(cluster: Arc<dyn ClusterReader>, config: Arc<AppConfig>) -> Self {
        Self { cluster, config }
    }

    /// List a kind whose CRD must be installed; a missing CRD fails the call.
    pub async fn list(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, McpError> {
        Ok(self.cluster.list(kind, namespace).await?)
    }

    /// List a kind that may be absent; a missing CRD yields no objects.
    pub async fn list_optional(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, McpError> {
        Ok(self.cluster.list_optional(kind, namespace).await?)
    }

    /// Fail with `CRD_NOT_AVAILABLE` unless `provider`'s CRDs are served.
    pub async fn require_provider(&self, provider: Provider) -> Result<(), McpError> {
        if self.cluster.is_installed(provider.probe_kind()).await? {
            Ok(())
        } else {
            Err(McpError::CrdNotAvailable(format!(
                "{} CRDs are not installed in this cluster",
                provider
            )))
        }
    }
}

/// A group of tools served by one networking stack.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    fn tools(&self) -> Vec<Tool>;

    async fn call(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<ToolCallResult, McpError>;
}

/// Every tool provider shipped with the server.
pub fn all_providers() -> Vec<Arc<dyn ToolProvider>> {
    vec![
        Arc::new(core::CoreTools),
        Arc::new(gateway_api::GatewayApiTools),
        Arc::new(istio::IstioTools),
        Arc::new(kgateway::KgatewayTools),
        Arc::new(calico::CalicoTools),
        Arc::new(kuma::KumaTools),
        Arc::new(linkerd::LinkerdTools),
        Arc::new(flannel::FlannelTools),
        Arc::new(logs::LogTools),
        Arc::new(design::DesignTools),
    ]
}

// -----------------------------------------------------------------------------
// Arguments
// -----------------------------------------------------------------------------

/// Typed access to a tool's `arguments` object.
pub struct Args<'a> {
    value: &'a Value,
}

impl<'a> Args<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn optional_str(&self, key: &str) -> Result<Option<&'a str>, McpError> {
        match self.value.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(McpError::InvalidInput(format!("'{}' must be a string", key))),
        }
    }

    pub fn required_str(&self, key: &str) -> Result<&'a str, McpError> {
        self.optional_str(key)?
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| McpError::InvalidInput(format!("Missing required argument: {}", key)))
    }

    pub fn optional_i64(&self, key: &str) -> Result<Option<i64>, McpError> {
        match self.value.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| McpError::InvalidInput(format!("'{}' must be an integer", key))),
        }
    }

    /// Object name, validated as a DNS-1123 subdomain.
    pub fn name(&self, key: &str) -> Result<&'a str, McpError> {
        let name = self.required_str(key)?;
        if is_dns1123_subdomain(name) {
            Ok(name)
        } else {
            Err(McpError::InvalidInput(format!("'{}' is not a valid Kubernetes name", name)))
        }
    }

    /// Namespace scope of the call. An omitted or empty namespace falls back to the configured
    /// default; `*` always means all namespaces.
    pub fn namespace(&self, ctx: &ToolContext) -> Result<Option<String>, McpError> {
        match self.optional_str("namespace")?.map(str::trim) {
            Some("*") => Ok(None),
            None | Some("") => Ok(ctx.config.kubernetes.default_namespace.clone()),
            Some(ns) if is_dns1123_label(ns) => Ok(Some(ns.to_string())),
            Some(ns) => {
                Err(McpError::InvalidInput(format!("'{}' is not a valid namespace name", ns)))
            }
        }
    }

    /// A concrete namespace is required (pod logs).
    pub fn required_namespace(&self, ctx: &ToolContext) -> Result<String, McpError> {
        self.namespace(ctx)?
            .ok_or_else(|| McpError::InvalidInput("Missing required argument: namespace".into()))
    }

    /// A resource kind of `provider` named by the `kind` argument.
    pub fn kind(&self, provider: Option<Provider>) -> Result<ResourceKind, McpError> {
        let name = self.required_str("kind")?;
        ResourceKind::lookup(name, provider).ok_or_else(|| {
            McpError::InvalidInput(format!("Unknown resource kind '{}'", name))
        })
    }
}

/// Deserialize tool arguments into a parameter struct.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, McpError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| McpError::InvalidInput(format!("Invalid arguments: {}", e)))
}

// -----------------------------------------------------------------------------
// Schemas
// -----------------------------------------------------------------------------

pub fn namespace_property() -> Value {
    json!({
        "type": "string",
        "description": "Namespace to inspect. Omit for the configured default, '*' for all namespaces"
    })
}

/// Input schema with an optional `namespace` property plus `properties`.
pub fn namespaced_schema(properties: Value, required: &[&str]) -> Value {
    let mut props = Map::new();
    props.insert("namespace".to_string(), namespace_property());
    if let Value::Object(extra) = properties {
        props.extend(extra);
    }
    json!({"type": "object", "properties": props, "required": required})
}

/// Definition of a `list_*` tool that only takes a namespace.
pub fn list_definition(name: &str, description: &str) -> Tool {
    Tool::new(name, description, namespaced_schema(json!({}), &[]))
}

pub fn kind_property(kinds: &[ResourceKind]) -> Value {
    let names: Vec<&str> = kinds.iter().map(|k| k.kind()).collect();
    json!({
        "type": "string",
        "description": format!("Resource kind: {}", names.join(", ")),
        "enum": names
    })
}

// -----------------------------------------------------------------------------
// Shared tool bodies
// -----------------------------------------------------------------------------

/// Keep findings about objects in `namespace`; findings without a namespace always stay.
pub fn retain_in_namespace(findings: &mut Vec<Finding>, namespace: Option<&str>) {
    if let Some(ns) = namespace {
        findings.retain(|f| {
            f.resource.as_ref().and_then(|r| r.namespace.as_deref()).is_none_or(|n| n == ns)
        });
    }
}

/// `3d4h`-style age of an object.
pub fn age(obj: &DynamicObject) -> Option<String> {
    let created = obj.metadata.creation_timestamp.as_ref()?.0;
    let elapsed = Utc::now().signed_duration_since(created);
    let (days, hours, minutes) =
        (elapsed.num_days(), elapsed.num_hours() % 24, elapsed.num_minutes() % 60);
    Some(if days > 0 {
        format!("{}d{}h", days, hours)
    } else if hours > 0 {
        format!("{}h{}m", hours, minutes)
    } else {
        format!("{}m", minutes.max(0))
    })
}

/// Compact listing row: identity plus the fields that matter for the kind.
pub fn resource_summary(kind: ResourceKind, obj: &DynamicObject) -> Value {
    let mut row = Map::new();
    row.insert("name".into(), json!(obj.name_any()));
    if let Some(ns) = obj.namespace() {
        row.insert("namespace".into(), json!(ns));
    }
    if let Some(age) = age(obj) {
        row.insert("age".into(), json!(age));
    }

    let spec = obj.spec();
    let pick = |keys: &[&str]| -> Map<String, Value> {
        keys.iter()
            .filter_map(|k| spec.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect()
    };
    let fields = match kind {
        ResourceKind::Service => pick(&["type", "clusterIP", "selector", "ports"]),
        ResourceKind::GatewayClass => pick(&["controllerName", "parametersRef"]),
        ResourceKind::Gateway => pick(&["gatewayClassName", "listeners"]),
        ResourceKind::HttpRoute | ResourceKind::GrpcRoute => {
            pick(&["parentRefs", "hostnames", "rules"])
        }
        ResourceKind::VirtualService => pick(&["hosts", "gateways", "http", "tcp", "tls"]),
        ResourceKind::DestinationRule => pick(&["host", "subsets", "trafficPolicy"]),
        ResourceKind::NetworkPolicy => pick(&["podSelector", "policyTypes"]),
        ResourceKind::CalicoNetworkPolicy | ResourceKind::CalicoGlobalNetworkPolicy => {
            pick(&["order", "selector", "types"])
        }
        ResourceKind::CalicoIpPool => {
            pick(&["cidr", "ipipMode", "vxlanMode", "natOutgoing", "disabled"])
        }
        _ => spec.as_object().cloned().unwrap_or_default(),
    };
    row.extend(fields);

    let conditions = obj.status_conditions();
    if !conditions.is_empty() {
        let rendered: Vec<Value> = conditions
            .iter()
            .map(|c| json!({"type": c.type_, "status": c.status, "reason": c.reason}))
            .collect();
        row.insert("conditions".into(), Value::Array(rendered));
    }
    Value::Object(row)
}

/// Body of every `list_*` tool.
pub async fn list_tool(
    ctx: &ToolContext,
    tool: &str,
    kinds: &[ResourceKind],
    namespace: Option<&str>,
) -> Result<ToolCallResult, McpError> {
    let mut rows: Map<String, Value> = Map::new();
    let mut total = 0;
    for kind in kinds {
        let items = ctx.list(*kind, namespace).await?;
        total += items.len();
        let summaries: Vec<Value> = items.iter().map(|obj| resource_summary(*kind, obj)).collect();
        rows.insert(kind.kind().to_string(), Value::Array(summaries));
    }

    tracing::info!(tool = %tool, namespace = ?namespace, count = total, "Listed resources");

    let data = if kinds.len() == 1 {
        json!({"items": rows.into_iter().next().map(|(_, v)| v).unwrap_or_default()})
    } else {
        Value::Object(rows)
    };
    let kind_names: Vec<&str> = kinds.iter().map(|k| k.kind()).collect();
    StandardResponse::new(tool, namespace, vec![])
        .with_summary(format!("{} {} resource(s)", total, kind_names.join("/")))
        .with_data(&data)?
        .into_tool_result()
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::InMemoryCluster;

    fn ctx_with_default(namespace: Option<&str>) -> ToolContext {
        let mut config = AppConfig::default();
        config.kubernetes.default_namespace = namespace.map(str::to_string);
        ToolContext::new(Arc::new(InMemoryCluster::new()), Arc::new(config))
    }

    #[test]
    fn test_namespace_resolution() {
        let ctx = ctx_with_default(None);
        assert_eq!(Args::new(&json!({})).namespace(&ctx).unwrap(), None);
        assert_eq!(Args::new(&json!({"namespace": ""})).namespace(&ctx).unwrap(), None);
        assert_eq!(
            Args::new(&json!({"namespace": "shop"})).namespace(&ctx).unwrap().as_deref(),
            Some("shop")
        );

        let ctx = ctx_with_default(Some("bookinfo"));
        assert_eq!(Args::new(&json!({})).namespace(&ctx).unwrap().as_deref(), Some("bookinfo"));
        assert_eq!(Args::new(&json!({"namespace": "*"})).namespace(&ctx).unwrap(), None);
    }

    #[test]
    fn test_invalid_arguments_are_invalid_input() {
        let ctx = ctx_with_default(None);
        let err = Args::new(&json!({"namespace": "Bad_NS"})).namespace(&ctx).unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");

        let err = Args::new(&json!({"name": 42})).name("name").unwrap_err();
        assert_eq!(err.code_name(), "INVALID_INPUT");

        let err = Args::new(&json!({})).required_namespace(&ctx).unwrap_err();
        assert!(err.to_string().contains("namespace"));
    }

    #[test]
    fn test_kind_lookup_within_provider() {
        let args = json!({"kind": "authorizationpolicy"});
        assert_eq!(
            Args::new(&args).kind(Some(Provider::Linkerd)).unwrap(),
            ResourceKind::LinkerdAuthorizationPolicy
        );
        assert!(Args::new(&json!({"kind": "Widget"})).kind(None).is_err());
    }

    #[test]
    fn test_retain_in_namespace() {
        use crate::findings::{Category, ResourceRef};
        let mut findings = vec![
            Finding::info(Category::Mesh, "cluster-wide"),
            Finding::warning(Category::Routing, "in shop")
                .resource(ResourceRef::new(ResourceKind::VirtualService, "a", Some("shop"))),
            Finding::warning(Category::Routing, "elsewhere")
                .resource(ResourceRef::new(ResourceKind::VirtualService, "b", Some("other"))),
        ];
        retain_in_namespace(&mut findings, Some("shop"));
        let summaries: Vec<&str> = findings.iter().map(|f| f.summary.as_str()).collect();
        assert_eq!(summaries, vec!["cluster-wide", "in shop"]);
    }

    #[test]
    fn test_parse_args_null_is_empty_object() {
        #[derive(serde::Deserialize)]
        struct Params {
            #[serde(default)]
            flag: bool,
        }
        let params: Params = parse_args(Value::Null).unwrap();
        assert!(!params.flag);
    }
}
