//! SkypyDB API contract — the three endpoints the poller consumes.
//!
//! The poller only ever talks to a [`DashboardApi`]; the HTTP client in
//! [`http`] is one implementation, tests provide scripted ones.
//! Payloads are treated as loose JSON contracts: every field that may be
//! missing or `null` defaults instead of failing the decode.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

pub mod http;

pub use self::http::HttpDashboardApi;

// ── Summary ─────────────────────────────────────────────────────────

/// Response of the summary endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: SummaryCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub tables: TableCounts,
    #[serde(default, deserialize_with = "null_as_default")]
    pub collections: CollectionCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_rows: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts {
    #[serde(default, deserialize_with = "null_as_default")]
    pub count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_documents: u64,
}

// ── Health ──────────────────────────────────────────────────────────

/// Response of the health endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthData {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Nanoseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub databases: Databases,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Databases {
    #[serde(default)]
    pub main: Option<MainDatabaseHealth>,
    #[serde(default)]
    pub vector: Option<VectorDatabaseHealth>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainDatabaseHealth {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorDatabaseHealth {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Treat an explicit JSON `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ── API Trait ───────────────────────────────────────────────────────

/// The backend as seen by the poller.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Lightweight reachability check. Any error means "unreachable".
    async fn probe(&self) -> Result<(), ApiError>;

    /// Fetch the table/collection summary.
    async fn summary(&self) -> Result<SummaryData, ApiError>;

    /// Fetch per-database health.
    async fn health(&self) -> Result<HealthData, ApiError>;
}
