//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Coordinator metrics.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Quote requests received.
    pub quotes_requested: AtomicU64,
    /// Offers issued.
    pub quotes_issued: AtomicU64,
    /// Quote requests that failed.
    pub quotes_rejected: AtomicU64,
    /// Acceptance requests received.
    pub accepts_requested: AtomicU64,
    /// Conversions applied to the ledger.
    pub accepts_succeeded: AtomicU64,
    /// Acceptances that failed.
    pub accepts_failed: AtomicU64,
    /// Acceptances currently in flight.
    pub accepts_active: AtomicU64,
    /// Registration wallets provisioned.
    pub accounts_provisioned: AtomicU64,
    /// Offers removed by the sweep task.
    pub offers_swept: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote_requested(&self) {
        self.quotes_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quote_issued(&self) {
        self.quotes_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quote_rejected(&self) {
        self.quotes_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Acceptance started.
    pub fn accept_started(&self) {
        self.accepts_requested.fetch_add(1, Ordering::Relaxed);
        self.accepts_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accept_succeeded(&self) {
        self.accepts_succeeded.fetch_add(1, Ordering::Relaxed);
        self.accepts_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn accept_failed(&self) {
        self.accepts_failed.fetch_add(1, Ordering::Relaxed);
        self.accepts_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn account_provisioned(&self) {
        self.accounts_provisioned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn offers_swept(&self, count: u64) {
        self.offers_swept.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            quotes_requested: self.quotes_requested.load(Ordering::Relaxed),
            quotes_issued: self.quotes_issued.load(Ordering::Relaxed),
            quotes_rejected: self.quotes_rejected.load(Ordering::Relaxed),
            accepts_requested: self.accepts_requested.load(Ordering::Relaxed),
            accepts_succeeded: self.accepts_succeeded.load(Ordering::Relaxed),
            accepts_failed: self.accepts_failed.load(Ordering::Relaxed),
            accepts_active: self.accepts_active.load(Ordering::Relaxed),
            accounts_provisioned: self.accounts_provisioned.load(Ordering::Relaxed),
            offers_swept: self.offers_swept.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let series: [(&str, &str, &str, u64); 9] = [
            ("quotes_requested", "counter", "Total quote requests", snapshot.quotes_requested),
            ("quotes_issued", "counter", "Total offers issued", snapshot.quotes_issued),
            ("quotes_rejected", "counter", "Total rejected quote requests", snapshot.quotes_rejected),
            ("accepts_requested", "counter", "Total acceptance requests", snapshot.accepts_requested),
            ("accepts_succeeded", "counter", "Total applied conversions", snapshot.accepts_succeeded),
            ("accepts_failed", "counter", "Total failed acceptances", snapshot.accepts_failed),
            ("accepts_active", "gauge", "Acceptances in flight", snapshot.accepts_active),
            ("accounts_provisioned", "counter", "Registration wallets provisioned", snapshot.accounts_provisioned),
            ("offers_swept", "counter", "Offers removed by the sweep", snapshot.offers_swept),
        ];

        let mut out = String::new();
        for (name, kind, help, value) in series {
            out.push_str(&format!(
                "# HELP fxwallet_{name} {help}\n# TYPE fxwallet_{name} {kind}\nfxwallet_{name} {value}\n\n"
            ));
        }
        out
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub quotes_requested: u64,
    pub quotes_issued: u64,
    pub quotes_rejected: u64,
    pub accepts_requested: u64,
    pub accepts_succeeded: u64,
    pub accepts_failed: u64,
    pub accepts_active: u64,
    pub accounts_provisioned: u64,
    pub offers_swept: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
