//! Sequential batch processing.

use tracing::{info, warn};

use triage::{aggregate, Incident, ProcessedMetrics, RunLogs};

use crate::config::TriageConfig;
use crate::incidents;
use crate::pipeline::TriagePipeline;
use crate::summary;

/// Runs up to `config.limit` incidents from the configured file through the
/// pipeline, one at a time, then aggregates and renders the batch summary.
/// A failed run is logged and skipped; the batch fails only when the
/// incident file is unusable or no run produced logs.
pub async fn run_batch(
    config: &TriageConfig,
    pipeline: &TriagePipeline,
) -> anyhow::Result<ProcessedMetrics> {
    let incidents = incidents::load_incidents(&config.incidents_path)?;
    let available = incidents.len();
    let batch: Vec<Incident> = incidents.into_iter().take(config.limit).collect();
    info!(selected = batch.len(), available, "processing incident batch");

    let mut batch_logs: Vec<RunLogs> = Vec::new();
    for incident in batch {
        let incident_id = incident.id.clone();
        match pipeline.run(incident).await {
            Ok(outcome) => {
                if let Some(directive) = outcome.final_directive() {
                    info!(incident = %incident_id, action = %directive.action, "incident processed");
                }
                batch_logs.push(outcome.context.into_logs());
            }
            Err(err) => {
                warn!(incident = %incident_id, error = %err, "incident run failed, skipping");
            }
        }
    }

    let metrics = aggregate(&batch_logs)?;
    summary::render(&metrics, config.style);
    Ok(metrics)
}
