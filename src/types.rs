//! Types for the market snapshot service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One asset's market data at fetch time
///
/// All price-like fields are denominated in the quote currency of the
/// snapshot the record belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct MarketRecord {
    /// Display name
    pub name: String,

    /// Ticker symbol (not guaranteed unique within a snapshot)
    pub symbol: String,

    /// Price in the quote currency
    pub price: f64,

    /// Market capitalization in the quote currency
    pub market_cap: f64,

    /// Traded volume over the last 24 hours in the quote currency
    pub volume_24h: f64,

    /// Signed price change over the last 24 hours, in percent
    pub percent_change_24h: f64,
}

/// The complete set of records served at a given moment
///
/// Snapshots are immutable once built; the store swaps whole snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Commit counter, 0 for the initial empty snapshot
    pub sequence: u64,

    /// When the records were fetched, `None` before the first commit
    pub fetched_at: Option<DateTime<Utc>>,

    /// Quote currency shared by every record
    pub quote_currency: String,

    /// Records in upstream rank order
    pub records: Vec<MarketRecord>,
}

impl Snapshot {
    /// Creates the empty snapshot installed at process start
    pub fn empty(quote_currency: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            fetched_at: None,
            quote_currency: quote_currency.into(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Age of the snapshot, `None` if nothing was ever committed
    pub fn age(&self) -> Option<std::time::Duration> {
        let fetched_at = self.fetched_at?;
        let age = Utc::now().signed_duration_since(fetched_at);
        Some(std::time::Duration::from_secs(age.num_seconds().max(0) as u64))
    }

    /// Check if the snapshot is older than `threshold_seconds` (or was never filled)
    pub fn is_stale(&self, threshold_seconds: u64) -> bool {
        match self.age() {
            Some(age) => age.as_secs() > threshold_seconds,
            None => true,
        }
    }
}

/// What caused a refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTrigger {
    /// The periodic timer elapsed
    Timer,
    /// A client asked for a refresh through the front door
    Manual,
}

impl RefreshTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshTrigger::Timer => "timer",
            RefreshTrigger::Manual => "manual",
        }
    }
}

/// Externally visible scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Waiting for the next tick or a manual trigger
    Idle,
    /// An upstream call is outstanding
    Refreshing,
}

/// Result of a successful refresh cycle
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub trigger: RefreshTrigger,
    pub sequence: u64,
    pub count: usize,
    pub fetched_at: DateTime<Utc>,
    pub latency_ms: u64,
}

/// Overall component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data and the last refresh succeeded
    Healthy,
    /// Serving data, but it is stale or the last refresh failed
    Degraded,
    /// No data to serve
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: std::collections::HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
