//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! resource states, validation results and type listings in text or JSON.

use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::provider::ResourceState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Attribute row for table display.
#[derive(Tabled)]
struct AttributeRow {
    #[tabled(rename = "Attribute")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Registered type row for table display.
#[derive(Tabled)]
struct TypeRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Type")]
    type_name: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a resource state for display.
    #[must_use]
    pub fn format_state(&self, state: &ResourceState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => Self::format_state_text(state),
        }
    }

    fn format_state_text(state: &ResourceState) -> String {
        let Some(id) = state.id.as_deref() else {
            return format!(
                "{} {} no longer exists.\n",
                "✗".red(),
                state.type_name
            );
        };

        let mut output = String::new();
        if state.tainted {
            let _ = write!(
                output,
                "\n{} {} ({}) {}\n\n",
                "⚠".yellow(),
                state.type_name,
                id.bold(),
                "tainted".yellow()
            );
        } else {
            let _ = write!(output, "\n{} {} ({})\n\n", "●".green(), state.type_name, id.bold());
        }

        let rows: Vec<AttributeRow> = state
            .attributes
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| AttributeRow {
                name: k.clone(),
                value: Self::truncate(&Self::format_value(v), 60),
            })
            .collect();

        if rows.is_empty() {
            output.push_str("   No attributes.\n");
        } else {
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a deletion result.
    #[must_use]
    pub fn format_deleted(&self, type_name: &str, id: &str) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "type": type_name,
                "id": id,
                "deleted": true,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => format!("{} Deleted {type_name} ({id})\n", "✓".green()),
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&ValidationJson::from(result))
                .unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid!\n", "✓".green())
                } else {
                    let mut output = format!(
                        "{} Validation failed with {} error(s):\n",
                        "✗".red(),
                        result.error_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && result.warning_count() > 0 {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    /// Formats the registered resource and data source types.
    #[must_use]
    pub fn format_types<'a>(
        &self,
        resources: impl Iterator<Item = &'a str>,
        data_sources: impl Iterator<Item = &'a str>,
    ) -> String {
        let resources: Vec<&str> = resources.collect();
        let data_sources: Vec<&str> = data_sources.collect();

        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                "resources": resources,
                "data_sources": data_sources,
            }))
            .unwrap_or_default(),
            OutputFormat::Text => {
                let rows: Vec<TypeRow> = resources
                    .iter()
                    .map(|t| TypeRow {
                        kind: "resource".to_string(),
                        type_name: (*t).to_string(),
                    })
                    .chain(data_sources.iter().map(|t| TypeRow {
                        kind: "data source".dimmed().to_string(),
                        type_name: (*t).to_string(),
                    }))
                    .collect();

                let mut output = Table::new(rows).to_string();
                output.push('\n');
                output
            }
        }
    }

    /// Renders an attribute value on one line.
    fn format_value(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{head}...")
        }
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct ValidationJson {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl From<&ValidationResult> for ValidationJson {
    fn from(result: &ValidationResult) -> Self {
        Self {
            valid: result.is_valid(),
            errors: result.errors.iter().map(ToString::to_string).collect(),
            warnings: result.warnings.clone(),
        }
    }
}
