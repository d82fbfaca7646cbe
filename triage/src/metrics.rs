//! Batch-level reduction of per-incident stage logs.

use serde::Serialize;
use thiserror::Error;

use crate::logs::{RunLogs, StageDetail};

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("no incident runs to aggregate")]
    EmptyBatch,
}

/// Fleet metrics over one batch of incident runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedMetrics {
    pub total_cost: f64,
    pub total_llm_calls: u64,
    pub total_time_ms: u64,
    pub total_items: usize,
    pub success_rate: f64,
    pub throughput_per_min: f64,
}

/// Folds every stage log of every run into totals. An item is one incident
/// run (one `RunLogs` bundle), and a success is a worker log whose action
/// succeeded; runs that never reached a worker count against the rate.
/// Elapsed minutes are floored at 1 so short batches cannot divide by zero
/// or inflate throughput.
pub fn aggregate(runs: &[RunLogs]) -> Result<ProcessedMetrics, MetricsError> {
    if runs.is_empty() {
        return Err(MetricsError::EmptyBatch);
    }

    let mut total_cost = 0.0;
    let mut total_llm_calls: u64 = 0;
    let mut total_time_ms: u64 = 0;
    let mut successes: usize = 0;

    for run in runs {
        for logs in run.values() {
            for log in logs {
                total_cost += log.total_cost;
                total_llm_calls += u64::from(log.llm_calls);
                total_time_ms += log.processing_ms;
                if matches!(log.detail, StageDetail::Worker { succeeded: true, .. }) {
                    successes += 1;
                }
            }
        }
    }

    let total_items = runs.len();
    let minutes = (total_time_ms / 60_000).max(1);
    Ok(ProcessedMetrics {
        total_cost,
        total_llm_calls,
        total_time_ms,
        total_items,
        success_rate: successes as f64 / total_items as f64 * 100.0,
        throughput_per_min: total_items as f64 / minutes as f64,
    })
}
