/// Metrics Module - Prometheus Instrumentation
///
/// Engine metrics:
/// - Selection latency, outcome and slice counts
/// - Balance query and per-address error counters
/// - Block reads by source (cache or ledger)
///
/// Metrics are process-wide. `init_metrics()` registers them once; recording
/// into an unregistered metric is harmless, it just never gets exported.

use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Standard latency buckets for histograms (seconds)
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Slices scanned per selection call
const SLICE_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 5.0, 10.0, 25.0, 50.0, 100.0, 500.0];

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Selection call duration
    /// Labels: mode (random, minimal)
    pub static ref SELECTION_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("rustyledger_selection_duration_seconds", "UTXO selection latency")
            .buckets(LATENCY_BUCKETS.to_vec()),
        &["mode"]
    ).unwrap();

    /// Selection results
    /// Labels: outcome (solved, insufficient, timed_out, no_utxos, error)
    pub static ref SELECTION_OUTCOMES: IntCounterVec = IntCounterVec::new(
        Opts::new("rustyledger_selection_outcomes_total", "UTXO selection results by outcome"),
        &["outcome"]
    ).unwrap();

    /// Slices fetched per selection call
    pub static ref SELECTION_SLICES: Histogram = Histogram::with_opts(
        HistogramOpts::new("rustyledger_selection_slices", "Unspent slices scanned per selection")
            .buckets(SLICE_BUCKETS.to_vec())
    ).unwrap();

    /// Balance batch requests
    pub static ref BALANCE_QUERIES: IntCounter = IntCounter::new(
        "rustyledger_balance_queries_total",
        "Balance batch requests served"
    ).unwrap();

    /// Per-address failures inside batches
    /// Labels: code (InvalidAddress, ...)
    pub static ref ADDRESS_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("rustyledger_address_errors_total", "Per-address batch errors by code"),
        &["code"]
    ).unwrap();

    /// Block reads
    /// Labels: source (cache, ledger)
    pub static ref BLOCK_READS: IntCounterVec = IntCounterVec::new(
        Opts::new("rustyledger_block_reads_total", "Block reads by source"),
        &["source"]
    ).unwrap();
}

static REGISTERED: OnceCell<()> = OnceCell::new();

/// Initialize metrics registry
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTERED
        .get_or_try_init(|| {
            REGISTRY.register(Box::new(SELECTION_DURATION.clone()))?;
            REGISTRY.register(Box::new(SELECTION_OUTCOMES.clone()))?;
            REGISTRY.register(Box::new(SELECTION_SLICES.clone()))?;
            REGISTRY.register(Box::new(BALANCE_QUERIES.clone()))?;
            REGISTRY.register(Box::new(ADDRESS_ERRORS.clone()))?;
            REGISTRY.register(Box::new(BLOCK_READS.clone()))?;

            #[cfg(target_os = "linux")]
            REGISTRY.register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))?;

            Ok(())
        })
        .map(|_| ())
}

/// Gather metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Timer for measuring durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Record one finished selection call
pub fn record_selection(mode: &str, outcome: &str, slices: usize, duration_secs: f64) {
    SELECTION_DURATION.with_label_values(&[mode]).observe(duration_secs);
    SELECTION_OUTCOMES.with_label_values(&[outcome]).inc();
    SELECTION_SLICES.observe(slices as f64);
}

/// Record a per-address batch error
pub fn increment_address_errors(code: &str) {
    ADDRESS_ERRORS.with_label_values(&[code]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent_and_exports() {
        init_metrics().unwrap();
        init_metrics().unwrap();

        record_selection("minimal", "solved", 2, 0.01);
        increment_address_errors("InvalidAddress");
        BALANCE_QUERIES.inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("rustyledger_selection_outcomes_total"));
        assert!(text.contains("rustyledger_address_errors_total"));
        assert!(text.contains("rustyledger_balance_queries_total"));
    }
}
