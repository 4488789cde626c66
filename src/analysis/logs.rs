//! Proxy log triage.
//!
//! Lines from an Envoy-based proxy (Istio sidecars, gateways, Kuma) or the Linkerd proxy are
//! matched against a fixed set of patterns. Each category that matches at least once becomes a
//! single finding carrying the hit count and a few sample lines.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::findings::{Category, Finding, Severity};

const SAMPLE_LINES: usize = 3;
const SAMPLE_WIDTH: usize = 300;

lazy_static! {
    // Text access log: `"GET / HTTP/1.1" 503 UH ...`; JSON access log: `"response_flags":"UH"`.
    static ref RESPONSE_FLAGS: Regex =
        Regex::new(r#"(?:"\s\d{3}\s([A-Z]{2,4}(?:,[A-Z]{2,4})*)\s)|(?:"response_flags"\s*:\s*"([A-Z,]+)")"#)
            .expect("RESPONSE_FLAGS should be a valid regex pattern");
    static ref SERVER_ERROR: Regex = Regex::new(r#"(?:"\s5\d{2}\s)|(?:"response_code"\s*:\s*"?5\d{2})"#)
        .expect("SERVER_ERROR should be a valid regex pattern");
    static ref RBAC_DENIED: Regex = Regex::new(r"(?i)rbac_access_denied|rbac: access denied|enforced denied|unauthorized by policy")
        .expect("RBAC_DENIED should be a valid regex pattern");
    static ref TLS_FAILURE: Regex =
        Regex::new(r"(?i)tls.{0,20}handshake|ssl.{0,20}handshake|certificate_verify_failed|tls_error|x509:")
            .expect("TLS_FAILURE should be a valid regex pattern");
    static ref DNS_FAILURE: Regex =
        Regex::new(r"(?i)dns resolution failed|no such host|could not resolve|nxdomain|dns.{0,20}timed? ?out")
            .expect("DNS_FAILURE should be a valid regex pattern");
}

/// A log category the triage recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    NoRoute,
    NoHealthyUpstream,
    UpstreamConnectionFailure,
    UpstreamTimeout,
    RetryLimitExceeded,
    ExternalAuthDenied,
    RateLimited,
    DownstreamTermination,
    UpstreamTermination,
    RbacDenied,
    TlsHandshakeFailure,
    DnsFailure,
    ServerError,
}

impl LogCategory {
    pub const ALL: [LogCategory; 13] = [
        LogCategory::NoRoute,
        LogCategory::NoHealthyUpstream,
        LogCategory::UpstreamConnectionFailure,
        LogCategory::UpstreamTimeout,
        LogCategory::RetryLimitExceeded,
        LogCategory::ExternalAuthDenied,
        LogCategory::RateLimited,
        LogCategory::DownstreamTermination,
        LogCategory::UpstreamTermination,
        LogCategory::RbacDenied,
        LogCategory::TlsHandshakeFailure,
        LogCategory::DnsFailure,
        LogCategory::ServerError,
    ];

    fn from_flag(flag: &str) -> Option<LogCategory> {
        Some(match flag {
            "NR" => LogCategory::NoRoute,
            "UH" => LogCategory::NoHealthyUpstream,
            "UF" => LogCategory::UpstreamConnectionFailure,
            "UT" => LogCategory::UpstreamTimeout,
            "URX" => LogCategory::RetryLimitExceeded,
            "UAEX" => LogCategory::ExternalAuthDenied,
            "RL" => LogCategory::RateLimited,
            "DC" => LogCategory::DownstreamTermination,
            "UC" => LogCategory::UpstreamTermination,
            _ => return None,
        })
    }

    fn describe(&self) -> (Severity, Category, &'static str, &'static str) {
        match self {
            LogCategory::NoRoute => (
                Severity::Warning,
                Category::Routing,
                "no route matched (NR)",
                "Check VirtualService/HTTPRoute hosts and matches for the requested authority and path",
            ),
            LogCategory::NoHealthyUpstream => (
                Severity::Critical,
                Category::Connectivity,
                "no healthy upstream (UH)",
                "The destination has no ready endpoints; run check_service_endpoints for the target Service",
            ),
            LogCategory::UpstreamConnectionFailure => (
                Severity::Critical,
                Category::Connectivity,
                "upstream connection failures (UF)",
                "Verify the target port and any mTLS mode mismatch between client and server",
            ),
            LogCategory::UpstreamTimeout => (
                Severity::Warning,
                Category::Connectivity,
                "upstream request timeouts (UT)",
                "Review route timeouts and the latency of the destination workload",
            ),
            LogCategory::RetryLimitExceeded => (
                Severity::Warning,
                Category::Routing,
                "retry limit exceeded (URX)",
                "Retries are masking a failing upstream; inspect the destination before raising attempts",
            ),
            LogCategory::ExternalAuthDenied => (
                Severity::Warning,
                Category::Security,
                "external authorization denials (UAEX)",
                "Check the ext_authz provider and the CUSTOM AuthorizationPolicy that routes to it",
            ),
            LogCategory::RateLimited => (
                Severity::Info,
                Category::Policy,
                "rate limited requests (RL)",
                "Confirm the rate limit configuration matches expected traffic",
            ),
            LogCategory::DownstreamTermination => (
                Severity::Info,
                Category::Connectivity,
                "downstream connection terminations (DC)",
                "Clients closed connections early; usually client timeouts",
            ),
            LogCategory::UpstreamTermination => (
                Severity::Warning,
                Category::Connectivity,
                "upstream connection terminations (UC)",
                "The upstream closed connections; compare idle timeouts between proxy and application",
            ),
            LogCategory::RbacDenied => (
                Severity::Warning,
                Category::Security,
                "RBAC denials",
                "An authorization policy rejected requests; review ALLOW/DENY policies for this workload",
            ),
            LogCategory::TlsHandshakeFailure => (
                Severity::Critical,
                Category::Tls,
                "TLS handshake failures",
                "Check PeerAuthentication modes, DestinationRule TLS settings and certificate validity",
            ),
            LogCategory::DnsFailure => (
                Severity::Warning,
                Category::Connectivity,
                "DNS resolution failures",
                "Verify egress to kube-dns is allowed and the hostname is correct",
            ),
            LogCategory::ServerError => (
                Severity::Warning,
                Category::Observability,
                "5xx responses",
                "Correlate with the response flags above or the application's own logs",
            ),
        }
    }
}

/// Categories hit by a single line.
fn classify(line: &str) -> Vec<LogCategory> {
    let mut hits = Vec::new();
    for captures in RESPONSE_FLAGS.captures_iter(line) {
        let flags = captures.get(1).or_else(|| captures.get(2)).map(|m| m.as_str()).unwrap_or_default();
        hits.extend(flags.split(',').filter_map(LogCategory::from_flag));
    }
    if RBAC_DENIED.is_match(line) {
        hits.push(LogCategory::RbacDenied);
    }
    if TLS_FAILURE.is_match(line) {
        hits.push(LogCategory::TlsHandshakeFailure);
    }
    if DNS_FAILURE.is_match(line) {
        hits.push(LogCategory::DnsFailure);
    }
    if SERVER_ERROR.is_match(line) {
        hits.push(LogCategory::ServerError);
    }
    hits.sort();
    hits.dedup();
    hits
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    pub category: LogCategory,
    pub count: usize,
    pub samples: Vec<String>,
}

/// Totals of a log scan.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogReport {
    pub lines_scanned: usize,
    pub categories: Vec<CategoryStats>,
}

pub fn scan(logs: &str) -> LogReport {
    let mut stats: Vec<CategoryStats> = LogCategory::ALL
        .iter()
        .map(|category| CategoryStats { category: *category, count: 0, samples: Vec::new() })
        .collect();
    let mut lines_scanned = 0;

    for line in logs.lines().filter(|l| !l.trim().is_empty()) {
        lines_scanned += 1;
        for category in classify(line) {
            if let Some(entry) = stats.iter_mut().find(|s| s.category == category) {
                entry.count += 1;
                if entry.samples.len() < SAMPLE_LINES {
                    entry.samples.push(truncate(line.trim()));
                }
            }
        }
    }

    stats.retain(|s| s.count > 0);
    LogReport { lines_scanned, categories: stats }
}

fn truncate(line: &str) -> String {
    if line.chars().count() <= SAMPLE_WIDTH {
        line.to_string()
    } else {
        let cut: String = line.chars().take(SAMPLE_WIDTH).collect();
        format!("{}...", cut)
    }
}

/// One finding per category that matched.
pub fn findings(report: &LogReport, source: &str) -> Vec<Finding> {
    report
        .categories
        .iter()
        .map(|stats| {
            let (severity, finding_category, label, suggestion) = stats.category.describe();
            Finding::new(
                severity,
                finding_category,
                format!("{} line(s) in {} show {}", stats.count, source, label),
            )
            .detail(stats.samples.join("\n"))
            .suggestion(suggestion)
        })
        .collect()
}
