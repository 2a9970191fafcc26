//! Tracing setup and in-process counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Counters for the client's remote traffic
#[derive(Debug, Default)]
pub struct Metrics {
    polls_issued: AtomicU64,
    polls_failed: AtomicU64,
    snapshots_applied: AtomicU64,
    stale_discarded: AtomicU64,
    submissions: AtomicU64,
    validations_superseded: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn poll_issued(&self) {
        self.polls_issued.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "polls_issued", "Metric incremented");
    }

    pub fn poll_failed(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "polls_failed", "Metric incremented");
    }

    pub fn snapshot_applied(&self) {
        self.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "snapshots_applied", "Metric incremented");
    }

    pub fn stale_discarded(&self) {
        self.stale_discarded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "stale_discarded", "Metric incremented");
    }

    pub fn submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submissions", "Metric incremented");
    }

    pub fn validation_superseded(&self) {
        self.validations_superseded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "validations_superseded", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            polls_issued: self.polls_issued.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            snapshots_applied: self.snapshots_applied.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            validations_superseded: self.validations_superseded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub polls_issued: u64,
    pub polls_failed: u64,
    pub snapshots_applied: u64,
    pub stale_discarded: u64,
    pub submissions: u64,
    pub validations_superseded: u64,
}
