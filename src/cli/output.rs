//! CLI Output Formatting.
//!
//! Text output is styled with `console`; JSON output is written through
//! `serde_json` writers so raw `u128` amounts survive intact.

use console::style;
use serde::Serialize;

use crate::cli::scenario::{PositionSummary, SimulationReport, StepReport};
use crate::protocol::ProtocolEvent;
use crate::risk::HealthReport;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// Compact JSON
    Json,
    /// Pretty JSON
    JsonPretty,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT FORMATTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Output formatter for CLI
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    /// Create new formatter
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Get format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Whether output is machine-readable
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json | OutputFormat::JsonPretty)
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if !self.is_json() {
            println!("{} {}", style("✓").green(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if !self.is_json() {
            println!("{} {}", style("⚠").yellow(), message);
        }
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if !self.is_json() {
            println!("{} {}", style("→").cyan(), message);
        }
    }

    /// Print key-value pair
    pub fn kv(&self, key: &str, value: &str) {
        if !self.is_json() {
            println!("  {:<22} {}", style(format!("{}:", key)).bold(), value);
        }
    }

    /// Print section header
    pub fn section(&self, title: &str) {
        if !self.is_json() {
            println!();
            println!("{}", style(format!("=== {} ===", title)).cyan().bold());
        }
    }

    /// Print serializable data as JSON
    pub fn data<T: Serialize>(&self, data: &T) -> Result<(), serde_json::Error> {
        let json = self.to_json(data)?;
        println!("{}", json);
        Ok(())
    }

    /// Serialize according to the format (pretty unless `Json`)
    pub fn to_json<T: Serialize>(&self, data: &T) -> Result<String, serde_json::Error> {
        if matches!(self.format, OutputFormat::Json) {
            serde_json::to_string(data)
        } else {
            serde_json::to_string_pretty(data)
        }
    }

    /// Print a text table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.is_json() || headers.is_empty() {
            return;
        }
        for line in render_table(headers, rows) {
            println!("{}", line);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DOMAIN VIEWS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Print a solvency report
    pub fn health_report(&self, report: &HealthReport) {
        let hf = if report.health_factor.is_max() {
            style("∞".to_string()).green()
        } else if report.liquidatable {
            style(report.health_factor.to_string()).red().bold()
        } else {
            style(report.health_factor.to_string()).green()
        };
        self.kv("Collateral value", &report.collateral_value.to_string());
        self.kv("Effective factor", &report.effective_factor.to_string());
        self.kv("Borrowing capacity", &report.borrowing_capacity.to_string());
        self.kv("Debt value", &report.debt_value.to_string());
        self.kv("Health factor", &hf.to_string());
        self.kv("Max extra borrow", &report.max_additional_borrow.to_string());
    }

    /// Print a full replay report
    pub fn simulation_report(&self, report: &SimulationReport) {
        self.section(&format!("Scenario {}", display_name(&report.name)));
        self.table(
            &["#", "action", "result", "detail"],
            &report.steps.iter().map(step_row).collect::<Vec<_>>(),
        );

        self.section("Events");
        self.table(
            &["block", "time", "event", "position"],
            &report.events.iter().map(event_row).collect::<Vec<_>>(),
        );

        self.section("Positions");
        self.table(
            &["id", "owner", "asset", "collateral", "debt", "status", "health"],
            &report.positions.iter().map(position_row).collect::<Vec<_>>(),
        );

        self.section("Summary");
        self.kv("Block", &report.block_height.to_string());
        self.kv("Time", &format_timestamp(report.timestamp));
        self.kv("Failed steps", &report.failures().to_string());
        self.kv("Liquidatable", &report.liquidatable.len().to_string());
        self.kv("Bad debt", &report.bad_debt.to_string());
        self.kv("State hash", &report.state_hash);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROWS
// ═══════════════════════════════════════════════════════════════════════════════

fn display_name(name: &str) -> &str {
    if name.is_empty() {
        "(unnamed)"
    } else {
        name
    }
}

fn step_row(step: &StepReport) -> Vec<String> {
    let result = if step.ok {
        "ok".to_string()
    } else {
        format!("FAIL {}", step.error_code.unwrap_or_default())
    };
    vec![step.index.to_string(), step.action.clone(), result, step.detail.clone()]
}

fn event_row(event: &ProtocolEvent) -> Vec<String> {
    vec![
        event.block_height().to_string(),
        format_timestamp(event.timestamp()),
        event.event_type().to_string(),
        event.position_id().map(|id| id.to_string()).unwrap_or_default(),
    ]
}

fn position_row(summary: &PositionSummary) -> Vec<String> {
    let position = &summary.position;
    let health = match (&summary.report, &summary.note) {
        (Some(report), _) if report.health_factor.is_max() => "∞".to_string(),
        (Some(report), _) => report.health_factor.to_string(),
        (None, Some(note)) => note.clone(),
        (None, None) => String::new(),
    };
    vec![
        position.id.to_string(),
        position.owner.short(),
        position.asset.to_string(),
        position.collateral.to_string(),
        position.debt.to_string(),
        format!("{:?}", position.status),
        health,
    ]
}

/// Lay out a table as padded lines
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let pad = |cells: Vec<String>| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(pad(headers.iter().map(|h| h.to_string()).collect()));
    lines.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    lines.extend(rows.iter().map(|row| pad(row.clone())));
    lines
}

/// Render a unix timestamp as RFC 3339
pub fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| chrono::DateTime::<chrono::Utc>::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
