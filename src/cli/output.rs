//! Output formatting for CLI commands: JSON, YAML or a plain table.

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::mcp::protocol::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
    Table,
}

/// Print `data` as JSON or YAML. Only the tool listing has a table form.
pub fn print_output<T: Serialize>(data: &T, format: OutputFormat) -> Result<()> {
    let rendered = match format {
        OutputFormat::Json => render_json(data)?,
        OutputFormat::Yaml => render_yaml(data)?,
        OutputFormat::Table => bail!("Table output is only available for `tools`"),
    };
    println!("{}", rendered);
    Ok(())
}

pub fn render_json<T: Serialize>(data: &T) -> Result<String> {
    serde_json::to_string_pretty(data).context("Failed to serialize to JSON")
}

pub fn render_yaml<T: Serialize>(data: &T) -> Result<String> {
    serde_yaml::to_string(data).context("Failed to serialize to YAML")
}

/// Cut `s` to `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

const NAME_WIDTH: usize = 30;
const DESCRIPTION_WIDTH: usize = 90;

pub fn render_tools_table(tools: &[Tool]) -> String {
    let mut lines = vec![
        format!("{:<width$} DESCRIPTION", "NAME", width = NAME_WIDTH),
        "-".repeat(NAME_WIDTH + 1 + DESCRIPTION_WIDTH),
    ];
    lines.extend(tools.iter().map(|tool| {
        format!(
            "{:<width$} {}",
            tool.name,
            truncate(tool.description.as_deref().unwrap_or(""), DESCRIPTION_WIDTH),
            width = NAME_WIDTH
        )
    }));
    lines.push(String::new());
    lines.push(format!("{} tool(s)", tools.len()));
    lines.join("\n")
}

pub fn print_tools_table(tools: &[Tool]) {
    println!("{}", render_tools_table(tools));
}
