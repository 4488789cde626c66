//! # Findings
//!
//! The output record of every analysis: a severity, a category, an optional pointer to the
//! offending resource, and human-readable text.

use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::Serialize;
use std::fmt;

use crate::k8s::ResourceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Routing,
    Connectivity,
    Security,
    Policy,
    Configuration,
    Tls,
    Mesh,
    Cni,
    Observability,
}

/// Pointer to the resource a finding is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            kind: kind.kind().to_string(),
            name: name.into(),
            namespace: if kind.namespaced() { namespace.map(str::to_string) } else { None },
        }
    }

    pub fn of(kind: ResourceKind, obj: &DynamicObject) -> Self {
        Self::new(kind, obj.name_any(), obj.namespace().as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceRef>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Finding {
    pub fn new(severity: Severity, category: Category, summary: impl Into<String>) -> Self {
        Self {
            severity,
            category,
            resource: None,
            summary: summary.into(),
            detail: None,
            suggestion: None,
        }
    }

    pub fn critical(category: Category, summary: impl Into<String>) -> Self {
        Self::new(Severity::Critical, category, summary)
    }

    pub fn warning(category: Category, summary: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, summary)
    }

    pub fn info(category: Category, summary: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, summary)
    }

    pub fn resource(mut self, resource: ResourceRef) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Attach the object the finding is about.
    pub fn on(self, kind: ResourceKind, obj: &DynamicObject) -> Self {
        self.resource(ResourceRef::of(kind, obj))
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Per-severity totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn tally(findings: &[Finding]) -> Self {
        findings.iter().fold(Self::default(), |mut counts, finding| {
            match finding.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.critical + self.warning + self.info
    }
}

/// Order findings critical first. The sort is stable so analysis order survives within a
/// severity.
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by_key(|finding| finding.severity);
}
