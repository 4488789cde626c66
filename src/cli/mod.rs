//! # Command Line Interface
//!
//! `serve` runs the MCP server against the live cluster, `tools` prints the tool registry and
//! `analyze` runs any tool offline against manifest files.

pub mod output;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, Transport};
use crate::k8s::{InMemoryCluster, KubeClusterReader};
use crate::mcp::{serve_http, HttpState, McpHandler, McpStdioServer, ToolContext, ToolRegistry};
use crate::observability::{init_logging, log_config_info};
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "kubenet-mcp")]
#[command(about = "MCP server that diagnoses Kubernetes networking")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve MCP over stdio or HTTP
    Serve(ServeArgs),

    /// Print the registered tools
    Tools {
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Run one tool against manifest files instead of a live cluster
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,

    /// HTTP bind host
    #[arg(long)]
    pub host: Option<String>,

    /// HTTP port
    #[arg(long)]
    pub port: Option<u16>,

    /// Kubeconfig file (default: in-cluster config or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Kubeconfig context
    #[arg(long)]
    pub context: Option<String>,

    /// Namespace used when a tool call names none
    #[arg(short, long)]
    pub namespace: Option<String>,
}

impl ServeArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.kubernetes.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(context) = &self.context {
            config.kubernetes.context = Some(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.kubernetes.default_namespace = Some(namespace.clone());
        }
    }
}

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Manifest file (YAML, multi-document YAML or JSON); repeatable
    #[arg(short, long = "file", required = true)]
    pub files: Vec<PathBuf>,

    /// Tool to run
    #[arg(short, long)]
    pub tool: String,

    /// Tool arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    pub args: String,

    /// Namespace used when the arguments name none
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Pod log fixture for analyze_proxy_logs; repeatable
    #[arg(long = "pod-logs", value_name = "NAMESPACE/POD[/CONTAINER]=FILE")]
    pub pod_logs: Vec<String>,

    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()?;
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    if cli.json_logs {
        config.observability.json_logging = true;
    }

    match cli.command.unwrap_or_else(|| Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            args.apply(&mut config);
            config.validate()?;
            init_logging(&config.observability)?;
            log_config_info(&config);
            serve(config).await
        }
        Commands::Tools { output } => {
            init_logging(&config.observability)?;
            let tools = ToolRegistry::new(&config.tools).list();
            match output {
                OutputFormat::Table => {
                    output::print_tools_table(&tools);
                    Ok(())
                }
                format => output::print_output(&tools, format),
            }
        }
        Commands::Analyze(args) => {
            init_logging(&config.observability)?;
            let body = run_analyze(&args, config).await?;
            output::print_output(&body, args.output)
        }
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let cluster = KubeClusterReader::connect(&config.kubernetes)
        .await
        .context("Failed to create Kubernetes client")?;

    let registry = Arc::new(ToolRegistry::new(&config.tools));
    info!(tools = registry.len(), "Registered tools");
    let ctx = ToolContext::new(Arc::new(cluster), Arc::clone(&config));

    match config.server.transport {
        Transport::Stdio => McpStdioServer::new(McpHandler::new(registry, ctx)).run().await,
        Transport::Http => Ok(serve_http(&config.server, HttpState { registry, ctx }).await?),
    }
}

/// Execute `args.tool` against the manifests and return its response body.
pub async fn run_analyze(args: &AnalyzeArgs, mut config: AppConfig) -> anyhow::Result<Value> {
    if let Some(namespace) = &args.namespace {
        config.kubernetes.default_namespace = Some(namespace.clone());
    }
    config.validate()?;

    let mut cluster = InMemoryCluster::new();
    for kind in cluster.load_files(&args.files)? {
        warn!(kind = %kind, "Skipping manifest of unsupported kind");
    }
    for spec in &args.pod_logs {
        let fixture = PodLogsFixture::parse(spec)?;
        let logs = std::fs::read_to_string(&fixture.path)
            .with_context(|| format!("Failed to read pod logs {}", fixture.path.display()))?;
        cluster.set_pod_logs(&fixture.namespace, &fixture.pod, fixture.container.as_deref(), logs);
    }
    info!(objects = cluster.object_count(), files = args.files.len(), "Loaded manifests");

    let tool_args: Value =
        serde_json::from_str(&args.args).context("--args must be a JSON object")?;
    if !tool_args.is_object() {
        bail!("--args must be a JSON object");
    }

    let registry = ToolRegistry::new(&config.tools);
    let ctx = ToolContext::new(Arc::new(cluster), Arc::new(config));
    let result = registry.call(&args.tool, tool_args, &ctx).await?;

    let body: Value = serde_json::from_str(&result.joined_text())
        .context("Tool returned a non-JSON response")?;
    if result.is_error == Some(true) {
        bail!(
            "{} failed: {}",
            args.tool,
            body["error"]["message"].as_str().unwrap_or("unknown error")
        );
    }
    Ok(body)
}

/// `NAMESPACE/POD[/CONTAINER]=FILE`
#[derive(Debug, PartialEq)]
struct PodLogsFixture {
    namespace: String,
    pod: String,
    container: Option<String>,
    path: PathBuf,
}

impl PodLogsFixture {
    fn parse(spec: &str) -> anyhow::Result<Self> {
        let Some((target, path)) = spec.split_once('=') else {
            bail!("Invalid --pod-logs '{}': expected NAMESPACE/POD[/CONTAINER]=FILE", spec);
        };
        let parts: Vec<&str> = target.split('/').collect();
        let (namespace, pod, container) = match parts.as_slice() {
            [namespace, pod] => (*namespace, *pod, None),
            [namespace, pod, container] => (*namespace, *pod, Some(container.to_string())),
            _ => bail!("Invalid --pod-logs '{}': expected NAMESPACE/POD[/CONTAINER]=FILE", spec),
        };
        if namespace.is_empty() || pod.is_empty() || path.is_empty() {
            bail!("Invalid --pod-logs '{}': namespace, pod and file are required", spec);
        }
        Ok(Self {
            namespace: namespace.to_string(),
            pod: pod.to_string(),
            container,
            path: PathBuf::from(path),
        })
    }
}
