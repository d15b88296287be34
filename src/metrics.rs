//! Boundary metrics for monitoring and observability.
//!
//! Counters for wrapper construction and for every operation kind crossing
//! the engine boundary, plus query timing. Counters are atomics so they
//! can be read through shared handles while a session is live.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for a single facade
#[derive(Debug, Default)]
pub struct BoundaryMetrics {
    wraps: AtomicU64,
    gets: AtomicU64,
    puts: AtomicU64,
    has_checks: AtomicU64,
    deletes: AtomicU64,
    calls: AtomicU64,
    constructs: AtomicU64,
    queries: AtomicU64,
    query_time_us: AtomicU64,
}

impl BoundaryMetrics {
    /// Create a new collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a wrapper construction
    pub fn record_wrap(&self) {
        self.wraps.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a property read crossing the boundary
    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a property write crossing the boundary
    pub fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a membership check crossing the boundary
    pub fn record_has(&self) {
        self.has_checks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a property deletion crossing the boundary
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call through a wrapped callable
    pub fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a construct through a wrapped callable
    pub fn record_construct(&self) {
        self.constructs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed public query operation
    pub fn record_query(&self, duration: Duration) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.query_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Total wrapper constructions
    pub fn wraps(&self) -> u64 {
        self.wraps.load(Ordering::Relaxed)
    }

    /// Total completed queries
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Average query time in microseconds
    pub fn avg_query_time_us(&self) -> f64 {
        let total = self.queries.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            self.query_time_us.load(Ordering::Relaxed) as f64 / total as f64
        }
    }

    /// Snapshot the current counters
    pub fn snapshot(&self) -> BoundarySnapshot {
        BoundarySnapshot {
            wraps: self.wraps.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            has_checks: self.has_checks.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            calls: self.calls.load(Ordering::Relaxed),
            constructs: self.constructs.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            avg_query_time_us: self.avg_query_time_us(),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.wraps.store(0, Ordering::Relaxed);
        self.gets.store(0, Ordering::Relaxed);
        self.puts.store(0, Ordering::Relaxed);
        self.has_checks.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.calls.store(0, Ordering::Relaxed);
        self.constructs.store(0, Ordering::Relaxed);
        self.queries.store(0, Ordering::Relaxed);
        self.query_time_us.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time view of the boundary counters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundarySnapshot {
    /// Wrapper constructions
    pub wraps: u64,
    /// Property reads
    pub gets: u64,
    /// Property writes
    pub puts: u64,
    /// Membership checks
    pub has_checks: u64,
    /// Property deletions
    pub deletes: u64,
    /// Calls through wrapped callables
    pub calls: u64,
    /// Constructs through wrapped callables
    pub constructs: u64,
    /// Completed public queries
    pub queries: u64,
    /// Average query time in microseconds
    pub avg_query_time_us: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = BoundaryMetrics::new();
        metrics.record_wrap();
        metrics.record_wrap();
        metrics.record_get();
        metrics.record_query(Duration::from_micros(100));
        metrics.record_query(Duration::from_micros(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.wraps, 2);
        assert_eq!(snapshot.gets, 1);
        assert_eq!(snapshot.queries, 2);
        assert!((snapshot.avg_query_time_us - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset() {
        let metrics = BoundaryMetrics::new();
        metrics.record_call();
        metrics.reset();
        assert_eq!(metrics.snapshot().calls, 0);
    }

    #[test]
    fn test_snapshot_serialization() {
        let metrics = BoundaryMetrics::new();
        metrics.record_has();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("hasChecks"));
    }

    #[test]
    fn test_avg_with_no_queries() {
        let metrics = BoundaryMetrics::new();
        assert_eq!(metrics.avg_query_time_us(), 0.0);
    }
}
