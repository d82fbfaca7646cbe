//! The four remediation workers behind the tool supervisor.
//!
//! Each worker is an idempotent opaque action: it takes the directive text
//! and id, performs (or forwards) the remediation, and reports an execution
//! record. A non-success record or an error never aborts the run; the
//! supervisor just skips the worker log.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use triage::ToolKind;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("remediation action failed: {0}")]
    ActionFailed(String),

    #[error("no worker registered for tool {0}")]
    UnknownTool(ToolKind),
}

/// What a worker reports back after acting on a directive.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub tool: ToolKind,
    pub directive_id: Uuid,
    pub detail: String,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl ExecutionRecord {
    fn completed(tool: ToolKind, directive_id: Uuid, detail: &str, started: Instant) -> Self {
        Self {
            tool,
            directive_id,
            detail: detail.to_string(),
            success: true,
            completed_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
pub trait RemediationWorker: Send + Sync {
    fn tool(&self) -> ToolKind;

    async fn execute(
        &self,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError>;
}

/// Restart a failing component named by the directive.
pub struct RestartWorker;

#[async_trait]
impl RemediationWorker for RestartWorker {
    fn tool(&self) -> ToolKind {
        ToolKind::Restart
    }

    async fn execute(
        &self,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError> {
        let started = Instant::now();
        info!(id = %directive_id, directive = %directive, "restart issued");
        Ok(ExecutionRecord::completed(
            self.tool(),
            directive_id,
            "service restart issued",
            started,
        ))
    }
}

/// Collect diagnostics as requested by the directive.
pub struct DiagnosticsWorker;

#[async_trait]
impl RemediationWorker for DiagnosticsWorker {
    fn tool(&self) -> ToolKind {
        ToolKind::Diagnostics
    }

    async fn execute(
        &self,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError> {
        let started = Instant::now();
        info!(id = %directive_id, directive = %directive, "diagnostics collection started");
        Ok(ExecutionRecord::completed(
            self.tool(),
            directive_id,
            "diagnostics collection started",
            started,
        ))
    }
}

/// Notify the on-call team.
pub struct NotifyTeamWorker;

#[async_trait]
impl RemediationWorker for NotifyTeamWorker {
    fn tool(&self) -> ToolKind {
        ToolKind::NotifyTeam
    }

    async fn execute(
        &self,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError> {
        let started = Instant::now();
        info!(id = %directive_id, directive = %directive, "on-call team notified");
        Ok(ExecutionRecord::completed(
            self.tool(),
            directive_id,
            "on-call team notified",
            started,
        ))
    }
}

/// Append a work note to the incident record.
pub struct WorkNoteWorker;

#[async_trait]
impl RemediationWorker for WorkNoteWorker {
    fn tool(&self) -> ToolKind {
        ToolKind::LogWorkNote
    }

    async fn execute(
        &self,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError> {
        let started = Instant::now();
        info!(id = %directive_id, directive = %directive, "work note appended");
        Ok(ExecutionRecord::completed(
            self.tool(),
            directive_id,
            "work note appended to incident",
            started,
        ))
    }
}

/// Dispatch table from tool to worker.
pub struct WorkerRegistry {
    workers: BTreeMap<ToolKind, Box<dyn RemediationWorker>>,
}

impl WorkerRegistry {
    pub fn empty() -> Self {
        Self {
            workers: BTreeMap::new(),
        }
    }

    /// Registry with the four built-in workers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RestartWorker));
        registry.register(Box::new(DiagnosticsWorker));
        registry.register(Box::new(NotifyTeamWorker));
        registry.register(Box::new(WorkNoteWorker));
        registry
    }

    pub fn register(&mut self, worker: Box<dyn RemediationWorker>) {
        self.workers.insert(worker.tool(), worker);
    }

    pub async fn execute(
        &self,
        tool: ToolKind,
        directive: &str,
        directive_id: Uuid,
    ) -> Result<ExecutionRecord, WorkerError> {
        let worker = self
            .workers
            .get(&tool)
            .ok_or(WorkerError::UnknownTool(tool))?;
        worker.execute(directive, directive_id).await
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builtin_registry_covers_every_tool() {
        let registry = WorkerRegistry::with_builtin();
        for tool in ToolKind::ALL {
            let record = registry
                .execute(tool, "do the thing", Uuid::new_v4())
                .await
                .unwrap();
            assert_eq!(record.tool, tool);
            assert!(record.success);
        }
    }

    #[tokio::test]
    async fn test_record_carries_directive_id() {
        let id = Uuid::new_v4();
        let record = RestartWorker.execute("service=orders restart-now", id).await.unwrap();
        assert_eq!(record.directive_id, id);
        assert_eq!(record.detail, "service restart issued");
    }

    #[tokio::test]
    async fn test_unregistered_tool_is_an_error() {
        let registry = WorkerRegistry::empty();
        let err = registry
            .execute(ToolKind::Restart, "x", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::UnknownTool(ToolKind::Restart)));
    }

    #[tokio::test]
    async fn test_custom_worker_failure_propagates() {
        struct BrokenWorker;

        #[async_trait]
        impl RemediationWorker for BrokenWorker {
            fn tool(&self) -> ToolKind {
                ToolKind::Diagnostics
            }

            async fn execute(
                &self,
                _directive: &str,
                _directive_id: Uuid,
            ) -> Result<ExecutionRecord, WorkerError> {
                Err(WorkerError::ActionFailed("collector offline".into()))
            }
        }

        let mut registry = WorkerRegistry::empty();
        registry.register(Box::new(BrokenWorker));
        let err = registry
            .execute(ToolKind::Diagnostics, "collect", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::ActionFailed(_)));
    }
}
