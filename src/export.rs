//! Export Module
//!
//! Renders the beacon ranking and the domain fan-out ranking as text tables,
//! JSON, or JSON Lines for integration with other security tools. Only rows
//! above the respective floor are rendered.

use serde::Serialize;

use crate::domain::{DomainReport, DomainSnapshot};
use crate::ingest::IngestStats;
use crate::scoring::{BeaconReport, BeaconRow};
use crate::session::NormalizeStats;

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// JSON-serializable beacon report
#[derive(Serialize)]
pub struct JsonBeaconReport<'a> {
    pub version: &'static str,
    pub timestamp: String,
    pub score_floor: f64,
    pub sessions_scored: usize,
    pub reported_count: usize,
    pub normalize: &'a NormalizeStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<&'a IngestStats>,
    pub sessions: Vec<BeaconRow>,
}

impl<'a> From<&'a BeaconReport> for JsonBeaconReport<'a> {
    fn from(report: &'a BeaconReport) -> Self {
        let sessions = report.rows();
        Self {
            version: "1.0",
            timestamp: report.timestamp.to_rfc3339(),
            score_floor: report.score_floor,
            sessions_scored: report.sessions.len(),
            reported_count: sessions.len(),
            normalize: &report.normalize_stats,
            ingest: report.ingest_stats.as_ref(),
            sessions,
        }
    }
}

/// JSON-serializable domain report
#[derive(Serialize)]
pub struct JsonDomainReport<'a> {
    pub version: &'static str,
    pub timestamp: String,
    pub fanout_floor: usize,
    pub unique_domains: usize,
    pub allow_listed: usize,
    pub reported_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<&'a IngestStats>,
    pub domains: Vec<&'a DomainSnapshot>,
}

impl<'a> From<&'a DomainReport> for JsonDomainReport<'a> {
    fn from(report: &'a DomainReport) -> Self {
        let domains: Vec<_> = report.reported().collect();
        Self {
            version: "1.0",
            timestamp: report.timestamp.to_rfc3339(),
            fanout_floor: report.fanout_floor,
            unique_domains: report.unique_domains,
            allow_listed: report.allow_listed,
            reported_count: domains.len(),
            ingest: report.ingest_stats.as_ref(),
            domains,
        }
    }
}

/// Exports a beacon report in the specified format
pub fn export_beacon_report(report: &BeaconReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => beacon_text(report),
        OutputFormat::Json => to_pretty_json(&JsonBeaconReport::from(report)),
        OutputFormat::JsonLines => beacon_jsonl(report),
    }
}

/// Exports a domain report in the specified format
pub fn export_domain_report(report: &DomainReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => domain_text(report),
        OutputFormat::Json => to_pretty_json(&JsonDomainReport::from(report)),
        OutputFormat::JsonLines => domain_jsonl(report),
    }
}

fn to_pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Summary line followed by one line per reported session
fn beacon_jsonl(report: &BeaconReport) -> String {
    let rows = report.rows();
    let mut lines = Vec::with_capacity(rows.len() + 1);

    let summary = serde_json::json!({
        "type": "summary",
        "timestamp": report.timestamp.to_rfc3339(),
        "score_floor": report.score_floor,
        "sessions_scored": report.sessions.len(),
        "reported_count": rows.len(),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for row in &rows {
        if let Ok(line) = serde_json::to_string(row) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Summary line followed by one line per reported domain
fn domain_jsonl(report: &DomainReport) -> String {
    let mut lines = Vec::new();

    let summary = serde_json::json!({
        "type": "summary",
        "timestamp": report.timestamp.to_rfc3339(),
        "fanout_floor": report.fanout_floor,
        "unique_domains": report.unique_domains,
        "reported_count": report.reported_count(),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for snapshot in report.reported() {
        if let Ok(line) = serde_json::to_string(snapshot) {
            lines.push(line);
        }
    }

    lines.join("\n")
}

/// Exports the beacon ranking as a formatted table
pub fn beacon_text(report: &BeaconReport) -> String {
    let mut output = String::new();
    let rows = report.rows();

    output.push_str(&format!(
        "--- Beacon Analysis ---\nTime: {}\nSessions Scored: {}\nScore Floor: {:.2}\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S"),
        report.sessions.len(),
        report.score_floor,
    ));

    if rows.is_empty() {
        output.push_str("Beacon Sessions: None above floor\n");
        return output;
    }

    output.push_str(&format!("\nBeacon Sessions ({}):\n", rows.len()));
    output.push_str(&format!(
        "{:>7} {:<40} {:<40} {:>6} {:>11} {:>14}\n",
        "Score", "Source", "Destination", "Port", "Connections", "TotalTime (s)"
    ));
    output.push_str(&"-".repeat(123));
    output.push('\n');

    for row in rows {
        output.push_str(&format!(
            "{:>7.4} {:<40} {:<40} {:>6} {:>11} {:>14}\n",
            row.score,
            row.source,
            row.destination,
            row.port,
            row.connections,
            row.total_time_secs,
        ));
    }

    output
}

/// Exports the domain fan-out ranking as a formatted table
pub fn domain_text(report: &DomainReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Domain Fan-out Analysis ---\nTime: {}\nUnique Domains: {}\nFan-out Floor: {}\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S"),
        report.unique_domains,
        report.fanout_floor,
    ));

    let reported: Vec<_> = report.reported().collect();
    if reported.is_empty() {
        output.push_str("Domains: None above floor\n");
        return output;
    }

    output.push_str(&format!("\nDomains ({}):\n", reported.len()));
    output.push_str(&format!("{:<60} {:>12}\n", "Domain", "FanoutCount"));
    output.push_str(&"-".repeat(73));
    output.push('\n');

    for snapshot in reported {
        output.push_str(&format!(
            "{:<60} {:>12}\n",
            truncate(&snapshot.domain, 60),
            snapshot.fanout
        ));
    }

    output
}

/// Shortens long names for fixed-width columns
fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
