//! Refresh scheduler
//!
//! Owns the refresh cycle: fetch from the provider, then commit the result
//! into the [`SnapshotStore`] or discard it. The same cycle backs the
//! periodic timer task and client-triggered refreshes.

use crate::{
    config::ServiceConfig,
    error::{FetchError, StoreError},
    metrics::{MetricsCollector, RefreshMetrics},
    provider::ListingsProvider,
    repository::SnapshotRepository,
    store::SnapshotStore,
    types::{
        ComponentHealth, HealthStatus, MarketRecord, RefreshReport, RefreshTrigger,
        SchedulerState, Snapshot,
    },
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};

/// Settings the refresh cycle needs from the service configuration
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub listings_limit: u32,
    pub quote_currency: String,
    pub refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub stale_threshold: Duration,
}

impl From<&ServiceConfig> for RefreshSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            listings_limit: config.listings_limit,
            quote_currency: config.quote_currency.clone(),
            refresh_interval: config.refresh_interval,
            fetch_timeout: config.fetch_timeout,
            stale_threshold: config.stale_threshold,
        }
    }
}

/// Drives refresh cycles and serves the resulting snapshot
///
/// Refreshes are serialized: a manual trigger that arrives while another
/// refresh is running waits for it and then runs its own cycle.
///
/// # Example
/// ```no_run
/// use market_snapshot::{CoinMarketCapProvider, RefreshScheduler, ServiceConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ServiceConfig::from_env()?;
/// let provider =
///     CoinMarketCapProvider::new(&config.api_url, &config.api_key, config.fetch_timeout)?;
/// let scheduler = Arc::new(RefreshScheduler::new(Arc::new(provider), (&config).into()));
///
/// let handle = scheduler.spawn();
/// let records = scheduler.records().await;
/// println!("serving {} records", records.len());
/// handle.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct RefreshScheduler {
    provider: Arc<dyn ListingsProvider>,
    store: Arc<SnapshotStore>,
    repository: Option<Arc<dyn SnapshotRepository>>,
    metrics: Arc<MetricsCollector>,
    settings: RefreshSettings,
    refresh_lock: Arc<Mutex<()>>,
    refreshing: Arc<AtomicBool>,
}

/// Resets the refreshing flag even if the cycle's future is dropped
struct RefreshingGuard(Arc<AtomicBool>);

impl RefreshingGuard {
    fn enter(flag: Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything a commit needs once the fetch has succeeded
///
/// Runs on its own task and keeps the refresh lock until the outcome is
/// fully recorded.
struct Commit {
    store: Arc<SnapshotStore>,
    repository: Option<Arc<dyn SnapshotRepository>>,
    metrics: Arc<MetricsCollector>,
    _serial: OwnedMutexGuard<()>,
    _refreshing: RefreshingGuard,
}

impl Commit {
    async fn run(
        self,
        trigger: RefreshTrigger,
        records: Vec<MarketRecord>,
        start: Instant,
    ) -> RefreshReport {
        let snapshot = self.store.replace(records).await;
        let latency = start.elapsed();

        tracing::info!(
            trigger = trigger.as_str(),
            sequence = snapshot.sequence,
            count = snapshot.len(),
            latency_ms = latency.as_millis() as u64,
            "Refreshed market snapshot"
        );

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(&snapshot).await {
                tracing::error!(
                    error = %e,
                    sequence = snapshot.sequence,
                    "Failed to persist snapshot"
                );
                self.metrics.record_persist_failure().await;
            }
        }

        self.metrics.record_success(trigger, latency).await;

        RefreshReport {
            trigger,
            sequence: snapshot.sequence,
            count: snapshot.len(),
            fetched_at: snapshot.fetched_at.unwrap_or_else(chrono::Utc::now),
            latency_ms: latency.as_millis() as u64,
        }
    }
}

impl RefreshScheduler {
    /// Creates a scheduler with its own empty store
    pub fn new(provider: Arc<dyn ListingsProvider>, settings: RefreshSettings) -> Self {
        let store = Arc::new(SnapshotStore::new(settings.quote_currency.clone()));
        let metrics = Arc::new(MetricsCollector::new(provider.provider_name()));

        Self {
            provider,
            store,
            repository: None,
            metrics,
            settings,
            refresh_lock: Arc::new(Mutex::new(())),
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mirrors every committed snapshot into `repository`
    pub fn with_repository(mut self, repository: Arc<dyn SnapshotRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Fills an empty store from the repository, if one is configured
    ///
    /// Returns the number of restored records. A stored snapshot quoted in a
    /// different currency is ignored.
    pub async fn restore(&self) -> Result<Option<usize>, StoreError> {
        let Some(repository) = &self.repository else {
            return Ok(None);
        };

        let _guard = self.refresh_lock.lock().await;
        if self.store.read().await.sequence > 0 {
            return Ok(None);
        }

        let Some(stored) = repository.load().await? else {
            tracing::info!("No persisted snapshot to restore");
            return Ok(None);
        };

        if stored.quote_currency != self.settings.quote_currency {
            tracing::warn!(
                stored = %stored.quote_currency,
                configured = %self.settings.quote_currency,
                "Ignoring persisted snapshot quoted in another currency"
            );
            return Ok(None);
        }

        let snapshot = self.store.restore(stored.records, stored.fetched_at).await;
        tracing::info!(
            count = snapshot.len(),
            fetched_at = %stored.fetched_at,
            "Restored persisted snapshot"
        );
        Ok(Some(snapshot.len()))
    }

    /// Starts the periodic refresh task
    ///
    /// The first refresh runs immediately, then one per `refresh_interval`.
    /// Dropping the returned handle also stops the task.
    pub fn spawn(self: &Arc<Self>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);

        let task = tokio::spawn(async move {
            tracing::info!(
                refresh_interval_secs = scheduler.settings.refresh_interval.as_secs(),
                fetch_timeout_secs = scheduler.settings.fetch_timeout.as_secs(),
                provider = scheduler.provider_name(),
                "Starting refresh scheduler"
            );

            let mut ticker = interval(scheduler.settings.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tokio::select! {
                            // errors are logged and counted inside refresh_now
                            _ = scheduler.refresh_now(RefreshTrigger::Timer) => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::info!("Refresh scheduler stopped");
        });

        SchedulerHandle {
            shutdown: shutdown_tx,
            task,
            refresh_lock: Arc::clone(&self.refresh_lock),
        }
    }

    /// Runs one refresh cycle now
    ///
    /// On success the fetched records replace the snapshot; on failure the
    /// snapshot is left untouched and the error is returned. Dropping the
    /// returned future before the fetch completes discards the cycle; once
    /// the fetch has succeeded the commit runs to completion regardless.
    pub async fn refresh_now(&self, trigger: RefreshTrigger) -> Result<RefreshReport, FetchError> {
        let serial = Arc::clone(&self.refresh_lock).lock_owned().await;
        let refreshing = RefreshingGuard::enter(Arc::clone(&self.refreshing));
        let start = Instant::now();

        let fetched = match timeout(
            self.settings.fetch_timeout,
            self.provider
                .fetch_latest(self.settings.listings_limit, &self.settings.quote_currency),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::unreachable(format!(
                "fetch timed out after {:?}",
                self.settings.fetch_timeout
            ))),
        };

        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                let elapsed = start.elapsed();
                self.log_failure(trigger, &e);
                self.metrics.record_failure(trigger, elapsed, &e).await;
                return Err(e);
            }
        };

        let commit = Commit {
            store: Arc::clone(&self.store),
            repository: self.repository.clone(),
            metrics: Arc::clone(&self.metrics),
            _serial: serial,
            _refreshing: refreshing,
        };

        match tokio::spawn(commit.run(trigger, records, start)).await {
            Ok(report) => Ok(report),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(FetchError::unreachable(format!("commit task cancelled: {}", e))),
        }
    }

    fn log_failure(&self, trigger: RefreshTrigger, error: &FetchError) {
        if error.is_contract_violation() {
            tracing::error!(
                trigger = trigger.as_str(),
                kind = error.kind(),
                contract_violation = true,
                error = %error,
                "Upstream response no longer matches the expected shape"
            );
            return;
        }

        match error {
            FetchError::UpstreamRejected { status, .. } => {
                tracing::error!(
                    trigger = trigger.as_str(),
                    kind = error.kind(),
                    status = *status,
                    error = %error,
                    "Upstream rejected refresh, check credentials and plan limits"
                );
            }
            _ => {
                tracing::warn!(
                    trigger = trigger.as_str(),
                    kind = error.kind(),
                    error = %error,
                    "Refresh failed, keeping current snapshot"
                );
            }
        }
    }

    /// Returns the current snapshot
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.store.read().await
    }

    /// Returns an owned copy of the current records
    pub async fn records(&self) -> Vec<MarketRecord> {
        self.store.records().await
    }

    pub fn state(&self) -> SchedulerState {
        if self.refreshing.load(Ordering::SeqCst) {
            SchedulerState::Refreshing
        } else {
            SchedulerState::Idle
        }
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.settings
    }

    /// Returns the name of the current provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    /// Gets refresh metrics including latency percentiles and success rates
    pub async fn metrics(&self) -> RefreshMetrics {
        self.metrics.get_metrics().await
    }

    /// Perform a health check on the refresh pipeline
    pub async fn health_check(&self) -> ComponentHealth {
        let mut details = std::collections::HashMap::new();
        let stale = self
            .store
            .is_stale(self.settings.stale_threshold.as_secs())
            .await;
        let snapshot = self.snapshot().await;
        let metrics = self.metrics().await;

        details.insert("records".to_string(), serde_json::json!(snapshot.len()));
        details.insert("sequence".to_string(), serde_json::json!(snapshot.sequence));
        details.insert(
            "age_secs".to_string(),
            serde_json::json!(snapshot.age().map(|a| a.as_secs())),
        );
        details.insert("stale".to_string(), serde_json::json!(stale));
        details.insert(
            "provider_name".to_string(),
            serde_json::json!(self.provider_name()),
        );
        details.insert(
            "consecutive_failures".to_string(),
            serde_json::json!(metrics.consecutive_failures),
        );

        let status = if snapshot.sequence == 0 {
            HealthStatus::Unhealthy
        } else if stale || metrics.consecutive_failures > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let message = match status {
            HealthStatus::Healthy => "Serving a fresh market snapshot".to_string(),
            HealthStatus::Degraded if stale => format!(
                "Snapshot is stale (threshold {}s)",
                self.settings.stale_threshold.as_secs()
            ),
            HealthStatus::Degraded => format!(
                "Serving last good snapshot after {} failed refreshes",
                metrics.consecutive_failures
            ),
            HealthStatus::Unhealthy => "No market snapshot has been committed yet".to_string(),
        };

        ComponentHealth {
            name: "market_snapshot".to_string(),
            status,
            message: Some(message),
            details,
            last_checked: chrono::Utc::now(),
        }
    }
}

/// Handle to the periodic refresh task
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    refresh_lock: Arc<Mutex<()>>,
}

impl SchedulerHandle {
    /// Signals the task to stop and waits for it
    ///
    /// A timer fetch still in flight is abandoned and never commits. A
    /// commit that already started is awaited, so the persisted copy matches
    /// the served snapshot once this returns.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Refresh scheduler task ended abnormally");
        }
        let _settled = self.refresh_lock.lock().await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
