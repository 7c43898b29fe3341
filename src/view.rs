//! Plain-text renderings of the dashboard and health pages.
//!
//! Pure functions of a [`PollerState`]; the binary prints them on every
//! state change.

use chrono::{DateTime, Local, TimeZone};
use std::fmt::{self, Display};

use crate::api::HealthData;
use crate::poller::PollerState;

/// Command shown in the disconnected banner.
pub const START_SERVER_COMMAND: &str = "python skypydb/api/server.py";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

impl StatusLevel {
    pub fn from_status(status: &str) -> Self {
        match status {
            "healthy" | "connected" => Self::Healthy,
            "degraded" => Self::Degraded,
            _ => Self::Unhealthy,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            Self::Healthy => "✔",
            Self::Degraded => "▲",
            Self::Unhealthy => "✖",
        }
    }
}

impl Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Healthy => "Healthy",
            Self::Degraded => "Degraded",
            Self::Unhealthy => "Unhealthy",
        })
    }
}

/// Nanosecond epoch timestamp as local time, "Never" when absent.
pub fn format_timestamp(nanos: Option<i64>) -> String {
    format_timestamp_in(nanos, &Local)
}

pub fn format_timestamp_in<Tz>(nanos: Option<i64>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    nanos
        .and_then(|ns| {
            let secs = ns.div_euclid(1_000_000_000);
            let sub = ns.rem_euclid(1_000_000_000) as u32;
            DateTime::from_timestamp(secs, sub)
        })
        .map(|utc| utc.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Never".to_string())
}

/// The dashboard page: four summary cards, with a banner when disconnected.
pub fn render_dashboard(state: &PollerState) -> String {
    let mut lines = Vec::new();

    if let Some(message) = &state.connection_error {
        lines.push("━━ Connection Error ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".to_string());
        lines.push(message.clone());
        lines.push("To start the API server, run:".to_string());
        lines.push(format!("    {}", START_SERVER_COMMAND));
        lines.push("Press 'r' + Enter to retry the connection.".to_string());
        lines.push(String::new());
    }

    if state.loading {
        lines.push("Loading…".to_string());
        return join_lines(lines);
    }

    if state.connection_error.is_some() {
        lines.push("Total Tables          -".to_string());
        lines.push("Collections           -".to_string());
        lines.push("System Status         Disconnected".to_string());
        lines.push("Database Connections  No connection".to_string());
        return join_lines(lines);
    }

    let summary = state.summary.as_ref();
    let tables = summary.map(|s| s.summary.tables).unwrap_or_default();
    let collections = summary.map(|s| s.summary.collections).unwrap_or_default();
    let status = summary
        .map(|s| s.status.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("Unknown");
    let health = state.health.as_ref();
    let main = health.and_then(|h| h.databases.main.as_ref()).map(|m| m.status.as_str());
    let vector = health.and_then(|h| h.databases.vector.as_ref()).map(|v| v.status.as_str());

    lines.push(format!(
        "Total Tables          {} ({} total rows)",
        tables.count, tables.total_rows
    ));
    lines.push(format!(
        "Collections           {} ({} documents)",
        collections.count, collections.total_documents
    ));
    lines.push(format!(
        "System Status         {} (checked {})",
        status,
        format_timestamp(health.and_then(|h| h.timestamp))
    ));
    lines.push(format!(
        "Database Connections  {} Main DB  {} Vector DB",
        StatusLevel::from_status(main.unwrap_or("error")).marker(),
        StatusLevel::from_status(vector.unwrap_or("error")).marker(),
    ));
    join_lines(lines)
}

/// The health page: overall badge, one card per database, raw payload.
pub fn render_health(state: &PollerState) -> String {
    if state.loading {
        return join_lines(vec!["System Health  Checking status…".to_string()]);
    }

    let health = state.health.as_ref();
    let overall = health.map(|h| h.status.as_str()).unwrap_or("unknown");
    let mut lines = vec![
        format!(
            "System Health  {}  (last checked: {})",
            StatusLevel::from_status(overall),
            format_timestamp(health.and_then(|h| h.timestamp))
        ),
        String::new(),
    ];

    lines.extend(database_card(
        "Main Database",
        health.and_then(|h| h.databases.main.as_ref()).map(|m| {
            (m.status.as_str(), m.tables.map(|n| ("Tables", n)), m.error.as_deref())
        }),
    ));
    lines.extend(database_card(
        "Vector Database",
        health.and_then(|h| h.databases.vector.as_ref()).map(|v| {
            (v.status.as_str(), v.collections.map(|n| ("Collections", n)), v.error.as_deref())
        }),
    ));

    lines.push("Raw Health Data".to_string());
    lines.push(raw_health(health));
    join_lines(lines)
}

type DatabaseCard<'a> = (&'a str, Option<(&'static str, u64)>, Option<&'a str>);

fn database_card(title: &str, card: Option<DatabaseCard<'_>>) -> Vec<String> {
    let mut lines = vec![title.to_string()];
    match card {
        Some((status, metric, error)) => {
            lines.push(format!("  {} {}", StatusLevel::from_status(status).marker(), status));
            if let Some((label, n)) = metric {
                lines.push(format!("  {}: {}", label, n));
            }
            if let Some(error) = error {
                lines.push(format!("  error: {}", error));
            }
        }
        None => lines.push("  No data available".to_string()),
    }
    lines.push(String::new());
    lines
}

/// Every line, including the last, is newline-terminated.
fn join_lines(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn raw_health(health: Option<&HealthData>) -> String {
    health
        .and_then(|h| serde_json::to_string_pretty(h).ok())
        .unwrap_or_else(|| "No data available".to_string())
}
