//! Standard tool response
//!
//! Every tool answers with the same envelope: `{tool, namespace?, summary, counts, findings,
//! data?, remediation?}` rendered as pretty JSON into one text content block.

use serde::Serialize;
use serde_json::Value;

use crate::findings::{sort_findings, Finding, SeverityCounts};
use crate::mcp::error::McpError;
use crate::mcp::protocol::ToolCallResult;

#[derive(Debug, Clone, Serialize)]
pub struct StandardResponse {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub summary: String,
    pub counts: SeverityCounts,
    pub findings: Vec<Finding>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Multi-document YAML for `design_*` tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl StandardResponse {
    /// Findings are ordered critical first and counted.
    pub fn new(tool: &str, namespace: Option<&str>, mut findings: Vec<Finding>) -> Self {
        sort_findings(&mut findings);
        let counts = SeverityCounts::tally(&findings);
        Self {
            tool: tool.to_string(),
            namespace: namespace.map(str::to_string),
            summary: default_summary(&counts),
            counts,
            findings,
            data: None,
            remediation: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_data<T: Serialize>(mut self, data: &T) -> Result<Self, McpError> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }

    pub fn with_remediation(mut self, yaml: String) -> Self {
        self.remediation = Some(yaml);
        self
    }

    pub fn into_tool_result(self) -> Result<ToolCallResult, McpError> {
        let text = serde_json::to_string_pretty(&self)?;
        Ok(ToolCallResult::text(text))
    }
}

fn default_summary(counts: &SeverityCounts) -> String {
    if counts.total() == 0 {
        "No issues found".to_string()
    } else {
        format!(
            "{} critical, {} warning, {} info finding(s)",
            counts.critical, counts.warning, counts.info
        )
    }
}
