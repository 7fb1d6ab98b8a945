//! Restore progress reporting

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Step of a restore, as recorded in the status `phase` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePhase {
    Idle,
    Initializing,
    Starting,
    Decrypting,
    Decompressing,
    Validating,
    Preparing,
    RestoringTable,
    TableRestored,
    Finalizing,
    Completed,
    Failed,
    /// The lock expired before the restore reported an outcome
    Interrupted,
}

impl RestorePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestorePhase::Idle => "idle",
            RestorePhase::Initializing => "initializing",
            RestorePhase::Starting => "starting",
            RestorePhase::Decrypting => "decrypting",
            RestorePhase::Decompressing => "decompressing",
            RestorePhase::Validating => "validating",
            RestorePhase::Preparing => "preparing",
            RestorePhase::RestoringTable => "restoring_table",
            RestorePhase::TableRestored => "table_restored",
            RestorePhase::Finalizing => "finalizing",
            RestorePhase::Completed => "completed",
            RestorePhase::Failed => "failed",
            RestorePhase::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RestorePhase::Completed | RestorePhase::Failed | RestorePhase::Interrupted
        )
    }
}

impl fmt::Display for RestorePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One progress report emitted during an import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: RestorePhase,
    pub message: String,
    pub table_count: Option<usize>,
    pub tables_processed: Option<usize>,
    pub rows_processed: Option<u64>,
    pub current_table: Option<String>,
}

impl Progress {
    pub fn new(phase: RestorePhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            table_count: None,
            tables_processed: None,
            rows_processed: None,
            current_table: None,
        }
    }

    pub fn with_counts(mut self, table_count: usize, tables_processed: usize, rows: u64) -> Self {
        self.table_count = Some(table_count);
        self.tables_processed = Some(tables_processed);
        self.rows_processed = Some(rows);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.current_table = Some(table.into());
        self
    }
}

/// Receiver of import progress
///
/// Reports are informational. A sink must not fail the restore, so
/// `report` has no error channel.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: &Progress);
}

/// Sink that discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _progress: &Progress) {}
}
