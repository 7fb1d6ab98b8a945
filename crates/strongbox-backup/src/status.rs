//! Restore lock and progress tracking in the shared cache
//!
//! Two records live in the cache: a lock (`{prefix}.lock`) created with an
//! atomic add-if-absent, and a status (`{prefix}.status`) updated as a
//! restore progresses. The lock carries its own expiry, so a process that
//! dies mid-restore leaves a lock that lapses; the next status read notices
//! and records the restore as interrupted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strongbox_cache::SharedCache;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{StatusError, StatusResult};
use crate::progress::{Progress, ProgressSink, RestorePhase};

const IDLE_MESSAGE: &str = "No restore currently running.";
const STARTING_MESSAGE: &str = "Restore operation starting.";
const INTERRUPTED_MESSAGE: &str = "Restore lock expired before completion.";

/// Overall restore state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestoreState::Idle => "idle",
            RestoreState::Running => "running",
            RestoreState::Completed => "completed",
            RestoreState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Caller-supplied fields merged into the lock and status records
///
/// Only the fields that are set overwrite what is stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusContext {
    pub message: Option<String>,
    pub source: Option<String>,
    pub backup_id: Option<String>,
    pub actor: Option<String>,
    pub table_count: Option<usize>,
    pub tables_processed: Option<usize>,
    pub row_count: Option<u64>,
    pub rows_processed: Option<u64>,
    pub current_table: Option<String>,
}

impl StatusContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_backup_id(mut self, backup_id: impl Into<String>) -> Self {
        self.backup_id = Some(backup_id.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_table_count(mut self, count: usize) -> Self {
        self.table_count = Some(count);
        self
    }

    pub fn with_row_count(mut self, count: u64) -> Self {
        self.row_count = Some(count);
        self
    }

    pub fn with_tables_processed(mut self, count: usize) -> Self {
        self.tables_processed = Some(count);
        self
    }

    pub fn with_rows_processed(mut self, count: u64) -> Self {
        self.rows_processed = Some(count);
        self
    }
}

impl From<&Progress> for StatusContext {
    fn from(progress: &Progress) -> Self {
        Self {
            table_count: progress.table_count,
            tables_processed: progress.tables_processed,
            rows_processed: progress.rows_processed,
            current_table: progress.current_table.clone(),
            ..Self::default()
        }
    }
}

/// Lock record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreLock {
    pub locked: bool,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub backup_id: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
}

impl RestoreLock {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Status record as exposed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreStatus {
    pub locked: bool,
    pub status: RestoreState,
    pub phase: RestorePhase,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub backup_id: Option<String>,
    pub actor: Option<String>,
    pub table_count: Option<usize>,
    pub tables_processed: usize,
    pub row_count: Option<u64>,
    pub rows_processed: u64,
    pub current_table: Option<String>,
}

impl Default for RestoreStatus {
    fn default() -> Self {
        Self {
            locked: false,
            status: RestoreState::Idle,
            phase: RestorePhase::Idle,
            message: IDLE_MESSAGE.to_string(),
            started_at: None,
            updated_at: None,
            completed_at: None,
            expires_at: None,
            source: None,
            backup_id: None,
            actor: None,
            table_count: None,
            tables_processed: 0,
            row_count: None,
            rows_processed: 0,
            current_table: None,
        }
    }
}

impl RestoreStatus {
    fn merge(&mut self, context: &StatusContext) {
        if let Some(source) = &context.source {
            self.source = Some(source.clone());
        }
        if let Some(backup_id) = &context.backup_id {
            self.backup_id = Some(backup_id.clone());
        }
        if let Some(actor) = &context.actor {
            self.actor = Some(actor.clone());
        }
        if let Some(count) = context.table_count {
            self.table_count = Some(count);
        }
        if let Some(count) = context.tables_processed {
            self.tables_processed = count;
        }
        if let Some(count) = context.row_count {
            self.row_count = Some(count);
        }
        if let Some(count) = context.rows_processed {
            self.rows_processed = count;
        }
        if let Some(table) = &context.current_table {
            self.current_table = Some(table.clone());
        }
    }

    fn finish(&mut self, state: RestoreState, message: &str, now: DateTime<Utc>) {
        self.locked = false;
        self.status = state;
        self.phase = match state {
            RestoreState::Completed => RestorePhase::Completed,
            _ => RestorePhase::Failed,
        };
        self.message = message.to_string();
        self.updated_at = Some(now);
        self.completed_at = Some(now);
        self.expires_at = None;
    }
}

/// Restore lock and status tracker
pub struct RestoreStatusService {
    cache: Arc<dyn SharedCache>,
    config: TrackerConfig,
}

impl fmt::Debug for RestoreStatusService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestoreStatusService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RestoreStatusService {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self::with_config(cache, TrackerConfig::default())
    }

    pub fn with_config(cache: Arc<dyn SharedCache>, config: TrackerConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Try to take the restore lock.
    ///
    /// Returns `false` when a live lock already exists. On success the
    /// status record is reset to `running`/`initializing`.
    pub async fn acquire_lock(
        &self,
        context: &StatusContext,
        ttl: Option<Duration>,
    ) -> StatusResult<bool> {
        self.read_active_lock().await?;

        let ttl = ttl
            .unwrap_or_else(|| self.config.default_lock_ttl())
            .max(self.config.min_lock_ttl());
        let lifetime = TimeDelta::from_std(ttl).map_err(|_| StatusError::InvalidTtl(ttl))?;

        let started_at = Utc::now();
        let expires_at = started_at
            .checked_add_signed(lifetime)
            .ok_or(StatusError::InvalidTtl(ttl))?;

        let lock = RestoreLock {
            locked: true,
            started_at,
            expires_at,
            source: context.source.clone(),
            backup_id: context.backup_id.clone(),
            actor: context.actor.clone(),
        };
        let payload = serde_json::to_string(&lock)?;

        if !self
            .cache
            .add(&self.config.lock_key(), payload, Some(ttl))
            .await?
        {
            debug!("Restore lock is already held");
            return Ok(false);
        }

        let mut status = RestoreStatus::default();
        status.merge(context);
        status.locked = true;
        status.status = RestoreState::Running;
        status.phase = RestorePhase::Initializing;
        status.message = context
            .message
            .clone()
            .unwrap_or_else(|| STARTING_MESSAGE.to_string());
        status.started_at = Some(started_at);
        status.updated_at = Some(started_at);
        status.expires_at = Some(expires_at);
        self.write_status(&status).await?;

        info!(
            ttl_secs = ttl.as_secs(),
            backup_id = context.backup_id.as_deref().unwrap_or(""),
            "Restore lock acquired"
        );
        Ok(true)
    }

    /// Delete the lock without touching the status record
    pub async fn release_lock(&self) -> StatusResult<()> {
        self.cache.delete(&self.config.lock_key()).await?;
        Ok(())
    }

    /// Record progress of a running restore
    pub async fn update_status(
        &self,
        phase: RestorePhase,
        message: &str,
        context: &StatusContext,
    ) -> StatusResult<()> {
        let mut status = self.read_status().await?;
        status.merge(context);
        status.locked = self.is_locked().await?;
        status.status = RestoreState::Running;
        status.phase = phase;
        status.message = message.to_string();
        status.updated_at = Some(Utc::now());
        self.write_status(&status).await
    }

    /// Clear the lock and record a successful restore
    pub async fn mark_completed(&self, message: &str, context: &StatusContext) -> StatusResult<()> {
        self.finish(RestoreState::Completed, message, context).await
    }

    /// Clear the lock and record a failed restore
    pub async fn mark_failed(&self, message: &str, context: &StatusContext) -> StatusResult<()> {
        self.finish(RestoreState::Failed, message, context).await
    }

    /// Current status, with `locked` derived from the live lock.
    ///
    /// A status still marked `running` without a live lock belongs to a
    /// restore that died; it is rewritten as failed/interrupted.
    pub async fn get_status(&self) -> StatusResult<RestoreStatus> {
        let mut status = self.read_status().await?;

        if let Some(lock) = self.read_active_lock().await? {
            status.locked = true;
            status.status = RestoreState::Running;
            status.started_at = status.started_at.or(Some(lock.started_at));
            status.expires_at = Some(lock.expires_at);
            return Ok(status);
        }

        if status.status == RestoreState::Running {
            let now = Utc::now();
            status.finish(RestoreState::Failed, INTERRUPTED_MESSAGE, now);
            status.phase = RestorePhase::Interrupted;
            self.write_status(&status).await?;
            warn!(
                backup_id = status.backup_id.as_deref().unwrap_or(""),
                "Restore lock expired before completion, marked as interrupted"
            );
            return Ok(status);
        }

        status.locked = false;
        Ok(status)
    }

    /// True iff an unexpired lock exists
    pub async fn is_locked(&self) -> StatusResult<bool> {
        Ok(self.read_active_lock().await?.is_some())
    }

    async fn finish(
        &self,
        state: RestoreState,
        message: &str,
        context: &StatusContext,
    ) -> StatusResult<()> {
        self.cache.delete(&self.config.lock_key()).await?;

        let mut status = self.read_status().await?;
        status.merge(context);
        status.finish(state, message, Utc::now());
        self.write_status(&status).await?;

        info!(status = %state, "Restore finished");
        Ok(())
    }

    /// Live lock, purging a lapsed or unreadable one
    async fn read_active_lock(&self) -> StatusResult<Option<RestoreLock>> {
        let key = self.config.lock_key();
        let Some(raw) = self.cache.read(&key).await? else {
            return Ok(None);
        };

        let lock = match serde_json::from_str::<RestoreLock>(&raw) {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable restore lock");
                self.cache.delete(&key).await?;
                return Ok(None);
            }
        };

        if lock.is_expired(Utc::now()) {
            debug!(expires_at = %lock.expires_at, "Purging expired restore lock");
            self.cache.delete(&key).await?;
            return Ok(None);
        }

        Ok(Some(lock))
    }

    async fn read_status(&self) -> StatusResult<RestoreStatus> {
        let Some(raw) = self.cache.read(&self.config.status_key()).await? else {
            return Ok(RestoreStatus::default());
        };

        match serde_json::from_str(&raw) {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable restore status");
                Ok(RestoreStatus::default())
            }
        }
    }

    async fn write_status(&self, status: &RestoreStatus) -> StatusResult<()> {
        let payload = serde_json::to_string(status)?;
        self.cache
            .write(
                &self.config.status_key(),
                payload,
                Some(self.config.status_retention()),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for RestoreStatusService {
    async fn report(&self, progress: &Progress) {
        let context = StatusContext::from(progress);
        if let Err(e) = self
            .update_status(progress.phase, &progress.message, &context)
            .await
        {
            warn!(phase = %progress.phase, error = %e, "Failed to record restore progress");
        }
    }
}
