//! Resolution metrics for engine observability

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How a resolution attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved,
    Forbidden,
    Failed,
}

/// Engine metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Completed resolution attempts (any outcome)
    pub total_resolutions: u64,

    /// Resolutions served from a principal's memoized result
    pub memo_hits: u64,

    /// Legacy walks short-circuited by the role cache
    pub cache_hits: u64,

    /// Legacy walks that missed the role cache
    pub cache_misses: u64,

    /// Resolutions rejected with OPERATION_FORBIDDEN
    pub forbidden: u64,

    /// Resolutions that failed on a store or internal error
    pub errors: u64,

    pub legacy_resolutions: u64,
    pub custom_resolutions: u64,

    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,
    pub avg_latency_ms: f64,
}

impl EngineMetrics {
    /// Calculate role cache hit rate
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }
}

/// Metrics collector shared by every principal of an engine
pub struct MetricsCollector {
    metrics: Arc<RwLock<EngineMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(EngineMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    pub async fn record_memo_hit(&self) {
        self.metrics.write().await.memo_hits += 1;
    }

    pub async fn record_cache_hit(&self) {
        self.metrics.write().await.cache_hits += 1;
    }

    pub async fn record_cache_miss(&self) {
        self.metrics.write().await.cache_misses += 1;
    }

    pub async fn record_mode(&self, custom: bool) {
        let mut metrics = self.metrics.write().await;
        if custom {
            metrics.custom_resolutions += 1;
        } else {
            metrics.legacy_resolutions += 1;
        }
    }

    /// Record a finished resolution and its latency
    pub async fn record_resolution(&self, outcome: ResolutionOutcome, latency: Duration) {
        {
            let mut metrics = self.metrics.write().await;
            metrics.total_resolutions += 1;
            match outcome {
                ResolutionOutcome::Resolved => {}
                ResolutionOutcome::Forbidden => metrics.forbidden += 1,
                ResolutionOutcome::Failed => metrics.errors += 1,
            }
        }
        self.record_latency(latency).await;
    }

    async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut metrics = self.metrics.write().await;

        let sum: f64 = samples.iter().sum();
        metrics.avg_latency_ms = sum / samples.len() as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> EngineMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = EngineMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP authz_role_resolutions_total Completed role resolutions
# TYPE authz_role_resolutions_total counter
authz_role_resolutions_total {}

# HELP authz_role_memo_hits_total Resolutions served from a principal's memoized roles
# TYPE authz_role_memo_hits_total counter
authz_role_memo_hits_total {}

# HELP authz_role_cache_hits_total Role cache hits
# TYPE authz_role_cache_hits_total counter
authz_role_cache_hits_total {}

# HELP authz_role_cache_misses_total Role cache misses
# TYPE authz_role_cache_misses_total counter
authz_role_cache_misses_total {}

# HELP authz_role_forbidden_total Resolutions rejected as forbidden
# TYPE authz_role_forbidden_total counter
authz_role_forbidden_total {}

# HELP authz_role_errors_total Resolutions failed on store errors
# TYPE authz_role_errors_total counter
authz_role_errors_total {}

# HELP authz_role_latency_seconds Resolution latency percentiles
# TYPE authz_role_latency_seconds summary
authz_role_latency_seconds{{quantile="0.5"}} {}
authz_role_latency_seconds{{quantile="0.9"}} {}
authz_role_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.total_resolutions,
            metrics.memo_hits,
            metrics.cache_hits,
            metrics.cache_misses,
            metrics.forbidden,
            metrics.errors,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        let idx = idx.min(sorted.len() - 1);
        sorted[idx]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_outcomes() {
        let collector = MetricsCollector::new();

        collector
            .record_resolution(ResolutionOutcome::Resolved, Duration::from_millis(5))
            .await;
        collector
            .record_resolution(ResolutionOutcome::Forbidden, Duration::from_millis(10))
            .await;
        collector
            .record_resolution(ResolutionOutcome::Failed, Duration::from_millis(15))
            .await;

        let metrics = collector.get_metrics().await;
        assert_eq!(metrics.total_resolutions, 3);
        assert_eq!(metrics.forbidden, 1);
        assert_eq!(metrics.errors, 1);
        assert!((metrics.avg_latency_ms - 10.0).abs() < 1.0);
        assert!(metrics.latency_p99_ms > 0.0);
    }

    #[tokio::test]
    async fn test_cache_hit_rate() {
        let collector = MetricsCollector::new();

        collector.record_cache_hit().await;
        collector.record_cache_hit().await;
        collector.record_cache_miss().await;

        let metrics = collector.get_metrics().await;
        assert!((metrics.cache_hit_rate() - 0.666).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_prometheus_export_and_reset() {
        let collector = MetricsCollector::new();
        collector
            .record_resolution(ResolutionOutcome::Resolved, Duration::from_millis(1))
            .await;
        collector.record_memo_hit().await;

        let exported = collector.export_prometheus().await;
        assert!(exported.contains("authz_role_resolutions_total 1"));
        assert!(exported.contains("authz_role_memo_hits_total 1"));

        collector.reset().await;
        assert_eq!(collector.get_metrics().await.total_resolutions, 0);
    }
}
