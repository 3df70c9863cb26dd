//! Prometheus metrics for analysis runs, external calls and retrieval.

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Analysis metrics
    // ============================================================================

    /// Files that produced a report
    pub static ref FILES_ANALYZED: Counter = Counter::with_opts(
        Opts::new("codequal_files_analyzed_total", "Files that produced a report")
    ).expect("Failed to create FILES_ANALYZED counter");

    /// Files whose analysis failed or timed out
    pub static ref FILES_FAILED: Counter = Counter::with_opts(
        Opts::new("codequal_files_failed_total", "Files whose analysis failed or timed out")
    ).expect("Failed to create FILES_FAILED counter");

    /// Findings emitted, duplication findings included
    pub static ref FINDINGS_TOTAL: Counter = Counter::with_opts(
        Opts::new("codequal_findings_total", "Findings emitted")
    ).expect("Failed to create FINDINGS_TOTAL counter");

    /// Wall time of one file's analysis
    pub static ref FILE_ANALYSIS_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "codequal_file_analysis_seconds",
            "Wall time of one file's analysis in seconds"
        ).buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0])
    ).expect("Failed to create FILE_ANALYSIS_LATENCY histogram");

    // ============================================================================
    // External service metrics
    // ============================================================================

    /// External calls abandoned after their time budget
    pub static ref SERVICE_TIMEOUTS: Counter = Counter::with_opts(
        Opts::new("codequal_service_timeouts_total", "External calls abandoned after their time budget")
    ).expect("Failed to create SERVICE_TIMEOUTS counter");

    /// Embedding generation requests
    pub static ref EMBEDDING_REQUESTS: Counter = Counter::with_opts(
        Opts::new("codequal_embedding_requests_total", "Embedding generation requests")
    ).expect("Failed to create EMBEDDING_REQUESTS counter");

    // ============================================================================
    // Retrieval metrics
    // ============================================================================

    /// Fragments currently held by the retrieval index
    pub static ref INDEXED_FRAGMENTS: Gauge = Gauge::with_opts(
        Opts::new("codequal_indexed_fragments", "Fragments held by the retrieval index")
    ).expect("Failed to create INDEXED_FRAGMENTS gauge");

    /// Retrieval queries served
    pub static ref RETRIEVAL_QUERIES: Counter = Counter::with_opts(
        Opts::new("codequal_retrieval_queries_total", "Retrieval queries served")
    ).expect("Failed to create RETRIEVAL_QUERIES counter");

    /// Retrieval query latency
    pub static ref RETRIEVAL_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "codequal_retrieval_latency_seconds",
            "Retrieval query latency in seconds"
        ).buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("Failed to create RETRIEVAL_LATENCY histogram");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(FILES_ANALYZED.clone()),
            Box::new(FILES_FAILED.clone()),
            Box::new(FINDINGS_TOTAL.clone()),
            Box::new(FILE_ANALYSIS_LATENCY.clone()),
            Box::new(SERVICE_TIMEOUTS.clone()),
            Box::new(EMBEDDING_REQUESTS.clone()),
            Box::new(INDEXED_FRAGMENTS.clone()),
            Box::new(RETRIEVAL_QUERIES.clone()),
            Box::new(RETRIEVAL_LATENCY.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register metric: {}", e);
            }
        }
    });
}

/// Encode all registered metrics in the Prometheus text format.
///
/// Returns an empty string if encoding fails.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increment() {
        let initial = FINDINGS_TOTAL.get();
        FINDINGS_TOTAL.inc_by(3.0);
        assert!(FINDINGS_TOTAL.get() - initial >= 3.0);
    }

    #[test]
    fn test_histogram_observe() {
        let before = RETRIEVAL_LATENCY.get_sample_count();
        RETRIEVAL_LATENCY.observe(0.02);
        assert!(RETRIEVAL_LATENCY.get_sample_count() > before);
    }

    #[test]
    fn test_register_and_gather() {
        register_metrics();
        register_metrics();
        SERVICE_TIMEOUTS.inc();
        let output = gather_metrics();
        assert!(output.contains("codequal_service_timeouts_total"));
    }
}
