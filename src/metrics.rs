//! Refresh cycle metrics collection and reporting
//!
//! Tracks latency percentiles, success rates and failure kinds for the
//! refresh scheduler.

use crate::{error::FetchError, types::RefreshTrigger};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

/// Point-in-time view of refresh metrics
#[derive(Debug, Clone, Serialize)]
pub struct RefreshMetrics {
    /// Name of the upstream provider
    pub provider_name: String,
    /// 50th percentile latency of successful refreshes in milliseconds
    pub latency_p50_ms: f64,
    /// 99th percentile latency of successful refreshes in milliseconds
    pub latency_p99_ms: f64,
    /// Success rate (0.0 to 1.0)
    pub success_rate: f64,
    /// Total number of refresh attempts
    pub total_refreshes: u64,
    /// Number of failed refresh attempts
    pub failed_refreshes: u64,
    /// Attempts started by the timer
    pub timer_refreshes: u64,
    /// Attempts started by a client
    pub manual_refreshes: u64,
    /// Failures since the last success
    pub consecutive_failures: u64,
    /// Failure counts keyed by [`FetchError::kind`]
    pub failures_by_kind: HashMap<String, u64>,
    /// Failed writes to the durable repository
    pub persist_failures: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Internal sample for latency tracking
#[derive(Debug, Clone)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Counters {
    samples: VecDeque<LatencySample>,
    total: u64,
    failed: u64,
    timer: u64,
    manual: u64,
    consecutive_failures: u64,
    failures_by_kind: HashMap<String, u64>,
    persist_failures: u64,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Counters {
    fn record_attempt(&mut self, trigger: RefreshTrigger, duration: Duration, success: bool) {
        self.total += 1;
        match trigger {
            RefreshTrigger::Timer => self.timer += 1,
            RefreshTrigger::Manual => self.manual += 1,
        }

        if self.samples.len() >= MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }
}

/// Collects and computes metrics for refresh cycles
pub struct MetricsCollector {
    provider_name: String,
    counters: RwLock<Counters>,
}

impl MetricsCollector {
    /// Creates a new metrics collector for a provider
    pub fn new(provider_name: &str) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            counters: RwLock::new(Counters {
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                ..Counters::default()
            }),
        }
    }

    /// Records a refresh that committed a new snapshot
    pub async fn record_success(&self, trigger: RefreshTrigger, duration: Duration) {
        let mut counters = self.counters.write().await;
        counters.record_attempt(trigger, duration, true);
        counters.consecutive_failures = 0;
        counters.last_success = Some(Utc::now());
    }

    /// Records a refresh that left the snapshot untouched
    pub async fn record_failure(
        &self,
        trigger: RefreshTrigger,
        duration: Duration,
        error: &FetchError,
    ) {
        let mut counters = self.counters.write().await;
        counters.record_attempt(trigger, duration, false);
        counters.failed += 1;
        counters.consecutive_failures += 1;
        *counters
            .failures_by_kind
            .entry(error.kind().to_string())
            .or_insert(0) += 1;
        counters.last_failure = Some(Utc::now());
        counters.last_error = Some(error.to_string());
    }

    /// Records a failed write to the durable repository
    pub async fn record_persist_failure(&self) {
        self.counters.write().await.persist_failures += 1;
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> RefreshMetrics {
        let counters = self.counters.read().await;

        let mut latencies: Vec<f64> = counters
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();

        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let success_rate = if counters.total > 0 {
            (counters.total - counters.failed) as f64 / counters.total as f64
        } else {
            1.0
        };

        RefreshMetrics {
            provider_name: self.provider_name.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate,
            total_refreshes: counters.total,
            failed_refreshes: counters.failed,
            timer_refreshes: counters.timer,
            manual_refreshes: counters.manual,
            consecutive_failures: counters.consecutive_failures,
            failures_by_kind: counters.failures_by_kind.clone(),
            persist_failures: counters.persist_failures,
            last_success: counters.last_success,
            last_failure: counters.last_failure,
            last_error: counters.last_error.clone(),
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_collector() {
        let collector = MetricsCollector::new("test");

        collector
            .record_success(RefreshTrigger::Timer, Duration::from_millis(100))
            .await;
        collector
            .record_success(RefreshTrigger::Manual, Duration::from_millis(200))
            .await;
        collector
            .record_failure(
                RefreshTrigger::Timer,
                Duration::from_millis(150),
                &FetchError::rejected(401, "bad key"),
            )
            .await;

        let metrics = collector.get_metrics().await;

        assert_eq!(metrics.provider_name, "test");
        assert_eq!(metrics.total_refreshes, 3);
        assert_eq!(metrics.failed_refreshes, 1);
        assert_eq!(metrics.timer_refreshes, 2);
        assert_eq!(metrics.manual_refreshes, 1);
        assert_eq!(metrics.consecutive_failures, 1);
        assert_eq!(metrics.failures_by_kind.get("upstream_rejected"), Some(&1));
        assert!(metrics.success_rate > 0.6 && metrics.success_rate < 0.7);
        assert!(metrics.last_error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let collector = MetricsCollector::new("test");
        let err = FetchError::unreachable("connection refused");

        collector
            .record_failure(RefreshTrigger::Timer, Duration::from_millis(5), &err)
            .await;
        collector
            .record_failure(RefreshTrigger::Timer, Duration::from_millis(5), &err)
            .await;
        assert_eq!(collector.get_metrics().await.consecutive_failures, 2);

        collector
            .record_success(RefreshTrigger::Timer, Duration::from_millis(5))
            .await;
        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.consecutive_failures, 0);
        assert!(metrics.last_success.is_some());
    }

    #[tokio::test]
    async fn test_empty_collector_reports_full_success_rate() {
        let metrics = MetricsCollector::new("test").get_metrics().await;
        assert_eq!(metrics.total_refreshes, 0);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.latency_p50_ms, 0.0);
    }

    #[test]
    fn test_percentile() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        assert_eq!(percentile(&values, 50.0), 5.0);
        assert_eq!(percentile(&values, 99.0), 9.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }
}
