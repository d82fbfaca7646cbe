//! Orchestrator for the incident triage pipeline.
//!
//! Wires the deterministic `triage` core to the outside world: the
//! OpenAI-compatible scoring oracle, the four remediation workers, the
//! five-stage pipeline walk, batch processing and summary rendering.

pub mod config;
pub mod incidents;
pub mod oracle;
pub mod pipeline;
pub mod prompts;
pub mod runner;
mod stages;
pub mod summary;
pub mod workers;

pub use config::{OracleConfig, TriageConfig};
pub use oracle::{HttpOracle, OracleError, TriageOracle, UsageMeter};
pub use pipeline::{PipelineError, RunOutcome, StageId, Transition, TriagePipeline};
pub use runner::run_batch;
pub use summary::SummaryStyle;
pub use workers::{ExecutionRecord, RemediationWorker, WorkerError, WorkerRegistry};
