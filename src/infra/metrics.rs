//! Lock-free metrics collection
//!
//! Plain relaxed atomic counters; hot paths never take a lock. A periodic
//! reporter task logs the summary.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Push events received from the feed
    events_received: AtomicU64,
    /// Events dropped because the session channel was full
    events_dropped: AtomicU64,
    /// Events processed by the session task
    events_processed: AtomicU64,
    /// Updates rejected as stale by version ordering
    stale_dropped: AtomicU64,
    /// Session phase transitions
    transitions: AtomicU64,
    /// Poll passes that corrected drifted derived state
    poll_corrections: AtomicU64,
    /// Poll passes that failed to read the backend
    poll_failures: AtomicU64,
    /// Backend writes completed / failed
    writes_ok: AtomicU64,
    writes_failed: AtomicU64,
}

/// Point-in-time snapshot of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSummary {
    pub events_received: u64,
    pub events_dropped: u64,
    pub events_processed: u64,
    pub stale_dropped: u64,
    pub transitions: u64,
    pub poll_corrections: u64,
    pub poll_failures: u64,
    pub writes_ok: u64,
    pub writes_failed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_received = %self.events_received,
            events_processed = %self.events_processed,
            events_dropped = %self.events_dropped,
            stale_dropped = %self.stale_dropped,
            transitions = %self.transitions,
            poll_corrections = %self.poll_corrections,
            poll_failures = %self.poll_failures,
            writes_ok = %self.writes_ok,
            writes_failed = %self.writes_failed,
            "metrics"
        );
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_dropped(&self) {
        self.stale_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_correction(&self) {
        self.poll_corrections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_ok(&self) {
        self.writes_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failed(&self) {
        self.writes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSummary {
        MetricsSummary {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            poll_corrections: self.poll_corrections.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            writes_ok: self.writes_ok.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = Metrics::new();
        let summary = metrics.snapshot();
        assert_eq!(summary.events_received, 0);
        assert_eq!(summary.writes_failed, 0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = Metrics::new();
        metrics.record_event_received();
        metrics.record_event_received();
        metrics.record_event_processed();
        metrics.record_stale_dropped();
        metrics.record_poll_correction();

        let summary = metrics.snapshot();
        assert_eq!(summary.events_received, 2);
        assert_eq!(summary.events_processed, 1);
        assert_eq!(summary.stale_dropped, 1);
        assert_eq!(summary.poll_corrections, 1);
    }
}
