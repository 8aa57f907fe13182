//! Structured JSON output for benchmark runs.

use std::time::Duration;

use serde::Serialize;

use crate::types::UploadReport;

/// Top-level run result.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub timestamp: String,
    pub target: String,
    pub config: RunConfig,
    pub upload: UploadSummary,
    pub queries: Vec<QueryRound>,
}

/// Configuration snapshot for reproducibility.
#[derive(Debug, Serialize)]
pub struct RunConfig {
    pub metric: String,
    pub class_name: String,
    pub vectors: usize,
    pub dimensions: usize,
    pub batch_size: usize,
    pub ef_construction: u32,
    pub max_connections: u32,
    pub top_k: usize,
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub chunks: usize,
    pub retries: usize,
    pub elapsed_secs: f64,
    pub vectors_per_sec: f64,
    /// First few failures, for diagnosis.
    pub sample_failures: Vec<crate::types::UploadFailure>,
}

impl UploadSummary {
    pub fn new(report: &UploadReport, elapsed_secs: f64) -> Self {
        let vectors_per_sec = if elapsed_secs > 0.0 {
            report.succeeded as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            succeeded: report.succeeded,
            failed: report.failed.len(),
            chunks: report.chunks,
            retries: report.retries,
            elapsed_secs,
            vectors_per_sec,
            sample_failures: report.failed.iter().take(10).cloned().collect(),
        }
    }
}

/// One `ef` setting and the query latencies measured under it.
#[derive(Debug, Serialize)]
pub struct QueryRound {
    pub ef: u64,
    pub queries: usize,
    pub errors: usize,
    pub latency: LatencyStats,
}

impl RunResult {
    pub fn new(
        target: &str,
        config: RunConfig,
        upload: UploadSummary,
        queries: Vec<QueryRound>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            target: target.to_string(),
            config,
            upload,
            queries,
        }
    }
}

/// Query latency summary in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

impl LatencyStats {
    /// Summarize `hist`, whose samples were recorded as multiples of `unit`.
    pub fn from_histogram(hist: &hdrhistogram::Histogram<u64>, unit: Duration) -> Self {
        let ms = unit.as_secs_f64() * 1000.0;
        let at = |q: f64| hist.value_at_quantile(q) as f64 * ms;
        Self {
            count: hist.len(),
            mean_ms: hist.mean() * ms,
            p50_ms: at(0.50),
            p95_ms: at(0.95),
            p99_ms: at(0.99),
            max_ms: hist.max() as f64 * ms,
        }
    }
}
