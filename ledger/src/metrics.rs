//! # Prometheus Metrics
//!
//! Operational counters for a ledger instance: committed operations by
//! kind, rejected operations by kind and reason, and the size of the global
//! asset registry. Attach with [`Ledger::with_metrics`](crate::Ledger::with_metrics).
//!
//! All metrics live in a dedicated [`prometheus::Registry`] so that several
//! ledgers in one process never collide on the default global registry.

use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::config::METRICS_NAMESPACE;
use crate::error::LedgerError;

/// Metric handles for one ledger. Cheap to clone.
#[derive(Clone)]
pub struct LedgerMetrics {
    registry: Registry,
    /// Committed operations, labelled by `kind`.
    pub operations_total: IntCounterVec,
    /// Rejected operations, labelled by `kind` and `reason`.
    pub rejections_total: IntCounterVec,
    /// Distinct assets ever deposited.
    pub registered_assets: IntGauge,
}

impl LedgerMetrics {
    /// Creates and registers all metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some(METRICS_NAMESPACE.into()), None)?;

        let operations_total = IntCounterVec::new(
            Opts::new("operations_total", "Committed ledger operations"),
            &["kind"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("rejections_total", "Ledger operations rejected before commit"),
            &["kind", "reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let registered_assets = IntGauge::new(
            "registered_assets",
            "Distinct assets ever deposited into the ledger",
        )?;
        registry.register(Box::new(registered_assets.clone()))?;

        Ok(Self {
            registry,
            operations_total,
            rejections_total,
            registered_assets,
        })
    }

    pub(crate) fn record_commit(&self, kind: &str, registered_assets: usize) {
        self.operations_total.with_label_values(&[kind]).inc();
        self.registered_assets.set(registered_assets as i64);
    }

    pub(crate) fn record_rejection(&self, kind: &str, err: &LedgerError) {
        self.rejections_total
            .with_label_values(&[kind, reason_label(err)])
            .inc();
    }

    /// Encodes all registered metrics in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn reason_label(err: &LedgerError) -> &'static str {
    match err {
        LedgerError::ZeroAmount => "zero_amount",
        LedgerError::NotAuthorized { .. } => "not_authorized",
        LedgerError::InsufficientBalance { .. } => "insufficient_balance",
        LedgerError::ArithmeticOverflow { .. } => "arithmetic_overflow",
        LedgerError::AggregateUnderflow { .. } => "aggregate_underflow",
        LedgerError::SameKey(_) => "same_key",
    }
}
