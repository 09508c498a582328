//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the registry ledger.
//!
//! # Metrics
//!
//! - `ledger_commands_total` - Commands processed, by outcome
//! - `ledger_facts_total` - Facts applied, by kind
//! - `ledger_apply_duration_seconds` - Histogram of command latencies
//! - `ledger_buffer_used_total` - Buffer credits consumed by reversals

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Commands processed, labelled accepted/rejected
    pub commands_total: IntCounterVec,

    /// Facts applied, labelled by fact kind
    pub facts_total: IntCounterVec,

    /// Command apply latency histogram
    pub apply_duration: Histogram,

    /// Buffer credits consumed by reversals
    pub buffer_used_total: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector backed by its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let commands_total = IntCounterVec::new(
            Opts::new("ledger_commands_total", "Commands processed"),
            &["outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let facts_total = IntCounterVec::new(
            Opts::new("ledger_facts_total", "Facts applied to the ledger"),
            &["kind"],
        )?;
        registry.register(Box::new(facts_total.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_apply_duration_seconds",
                "Histogram of command apply latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let buffer_used_total = IntCounter::new(
            "ledger_buffer_used_total",
            "Buffer credits consumed by reversals",
        )?;
        registry.register(Box::new(buffer_used_total.clone()))?;

        Ok(Self {
            commands_total,
            facts_total,
            apply_duration,
            buffer_used_total,
            registry,
        })
    }

    /// Record an accepted command and the facts it produced
    pub fn record_accepted(&self, fact_kinds: impl IntoIterator<Item = &'static str>) {
        self.commands_total.with_label_values(&["accepted"]).inc();
        for kind in fact_kinds {
            self.facts_total.with_label_values(&[kind]).inc();
        }
    }

    /// Record a rejected command
    pub fn record_rejected(&self) {
        self.commands_total.with_label_values(&["rejected"]).inc();
    }

    /// Record command apply latency
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Record buffer consumption by a reversal
    pub fn record_buffer_used(&self, credits: u64) {
        self.buffer_used_total.inc_by(credits);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}
