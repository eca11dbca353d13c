//! # Market Snapshot Service
//!
//! Periodically pulls the top cryptocurrency listings from CoinMarketCap,
//! keeps the latest result as a single immutable snapshot, and serves it over
//! HTTP so downstream consumers never hit the upstream rate limits.
//!
//! ## Architecture
//!
//! ```text
//! RefreshScheduler (timer task, every 5 min)   GET /api/fetch
//!            ↓                                        ↓
//!            └──────────── refresh_now() ─────────────┘
//!                               ↓
//!             ListingsProvider (CoinMarketCap)
//!                               ↓
//!             SnapshotStore::replace (atomic swap) → SnapshotRepository (optional)
//!                               ↓
//!                    GET /api/market_data
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use market_snapshot::{CoinMarketCapProvider, RefreshScheduler, RefreshTrigger, ServiceConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServiceConfig::new("my-api-key");
//! let provider =
//!     CoinMarketCapProvider::new(&config.api_url, &config.api_key, config.fetch_timeout)?;
//! let scheduler = Arc::new(RefreshScheduler::new(Arc::new(provider), (&config).into()));
//!
//! match scheduler.refresh_now(RefreshTrigger::Manual).await {
//!     Ok(report) => println!("stored {} records", report.count),
//!     Err(e) => eprintln!("refresh failed ({}): {}", e.kind(), e),
//! }
//!
//! for record in scheduler.records().await {
//!     println!("{}: {:.2}", record.symbol, record.price);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod repository;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use error::{ConfigError, FetchError, StoreError};
pub use metrics::RefreshMetrics;
pub use provider::ListingsProvider;
pub use providers::CoinMarketCapProvider;
pub use repository::{SnapshotRepository, SqliteSnapshotRepository};
pub use scheduler::{RefreshScheduler, RefreshSettings, SchedulerHandle};
pub use server::AppState;
pub use store::SnapshotStore;
pub use types::{
    ComponentHealth, HealthStatus, MarketRecord, RefreshReport, RefreshTrigger, SchedulerState,
    Snapshot,
};
