//! Prometheus metrics
//!
//! - `transactions_total{type}` - transactions that reached `completed`
//! - `transactions_failed_total` - transactions that ended `failed` or `rolled_back`
//! - `settlement_queue_depth` - jobs submitted but not yet picked up by a worker
//!
//! Collectors live in a per-instance [`Registry`] so several engines can
//! coexist in one process.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::domain::{TransactionStatus, TransactionType};

/// Metrics collector
#[derive(Clone)]
pub struct LedgerMetrics {
    transactions_total: IntCounterVec,
    transactions_failed_total: IntCounter,
    queue_depth: IntGauge,
    registry: Arc<Registry>,
}

impl LedgerMetrics {
    /// Create and register all collectors
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounterVec::new(
            Opts::new("transactions_total", "Transactions completed, by type"),
            &["type"],
        )?;
        registry.register(Box::new(transactions_total.clone()))?;

        let transactions_failed_total = IntCounter::with_opts(Opts::new(
            "transactions_failed_total",
            "Transactions that ended failed or rolled back",
        ))?;
        registry.register(Box::new(transactions_failed_total.clone()))?;

        let queue_depth = IntGauge::with_opts(Opts::new(
            "settlement_queue_depth",
            "Settlement jobs waiting for a worker",
        ))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            transactions_total,
            transactions_failed_total,
            queue_depth,
            registry,
        })
    }

    pub fn record_completed(&self, kind: TransactionType) {
        self.transactions_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn record_failed(&self) {
        self.transactions_failed_total.inc();
    }

    /// Count a settled transaction by the terminal status it reached
    pub fn record_outcome(&self, kind: TransactionType, status: TransactionStatus) {
        match status {
            TransactionStatus::Completed => self.record_completed(kind),
            TransactionStatus::Failed | TransactionStatus::RolledBack => self.record_failed(),
            TransactionStatus::Pending => {}
        }
    }

    pub fn job_enqueued(&self) {
        self.queue_depth.inc();
    }

    pub fn job_dequeued(&self) {
        self.queue_depth.dec();
    }

    pub fn completed_count(&self, kind: TransactionType) -> u64 {
        self.transactions_total
            .with_label_values(&[kind.as_str()])
            .get()
    }

    pub fn failed_count(&self) -> u64 {
        self.transactions_failed_total.get()
    }

    pub fn queue_depth(&self) -> i64 {
        self.queue_depth.get()
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all collectors in the text exposition format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
