//! Storage-backed backup creation and locked restores

use chrono::{DateTime, Utc};
use strongbox_core::Passphrase;
use strongbox_storage::BackupStorage;
use tracing::{error, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::progress::RestorePhase;
use crate::service::{BackupService, ExportStats, ImportStats};
use crate::status::{RestoreStatusService, StatusContext};

/// Extension of every archive written by [`create_backup`]
pub const BACKUP_EXTENSION: &str = "sbk";

/// `strongbox-backup-YYYYMMDD-HHMMSS.sbk`, in UTC
pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!(
        "strongbox-backup-{}.{BACKUP_EXTENSION}",
        at.format("%Y%m%d-%H%M%S")
    )
}

/// Export the database and write the archive to storage.
///
/// Nothing is written when the export fails.
pub async fn create_backup(
    service: &BackupService,
    storage: &dyn BackupStorage,
    passphrase: &Passphrase,
) -> BackupResult<(String, ExportStats)> {
    let output = service.export(passphrase).await?;
    let name = backup_file_name(Utc::now());

    storage.write(&name, &output.data).await?;
    info!(file = %name, bytes = output.stats.size_bytes, "Backup stored");

    Ok((name, output.stats))
}

/// Restore the named archive while holding the restore lock.
///
/// Returns [`BackupError::AlreadyRunning`] without touching anything when
/// another restore holds the lock. The outcome is recorded in the tracker
/// and the lock is released in every case, exactly once.
pub async fn restore_from_storage(
    service: &BackupService,
    tracker: &RestoreStatusService,
    storage: &dyn BackupStorage,
    name: &str,
    passphrase: &Passphrase,
    context: &StatusContext,
) -> BackupResult<ImportStats> {
    let context = StatusContext {
        backup_id: context.backup_id.clone().or_else(|| Some(name.to_string())),
        ..context.clone()
    };

    if !tracker.acquire_lock(&context, None).await? {
        let status = tracker.get_status().await?;
        return Err(BackupError::AlreadyRunning {
            message: status.message,
        });
    }

    let result = run_locked(service, tracker, storage, name, passphrase, &context).await;

    let outcome = match &result {
        Ok(stats) => {
            let done = StatusContext::new()
                .with_table_count(stats.table_count)
                .with_tables_processed(stats.table_count)
                .with_row_count(stats.row_count)
                .with_rows_processed(stats.row_count);
            tracker
                .mark_completed(
                    &format!(
                        "Restore completed: {} tables, {} rows.",
                        stats.table_count, stats.row_count
                    ),
                    &done,
                )
                .await
        }
        Err(e) => {
            error!(file = %name, error = %e, "Restore failed");
            tracker.mark_failed(&e.to_string(), &StatusContext::new()).await
        }
    };
    // Recording the outcome already dropped the lock. Deleting it again
    // could remove a lock another process took in the meantime.
    if let Err(e) = outcome {
        warn!(error = %e, "Could not record restore outcome");
        if let Err(e) = tracker.release_lock().await {
            warn!(error = %e, "Could not release restore lock");
        }
    }

    result
}

async fn run_locked(
    service: &BackupService,
    tracker: &RestoreStatusService,
    storage: &dyn BackupStorage,
    name: &str,
    passphrase: &Passphrase,
    context: &StatusContext,
) -> BackupResult<ImportStats> {
    let data = storage.read(name).await?;
    tracker
        .update_status(
            RestorePhase::Starting,
            &format!("Restoring from {name}."),
            context,
        )
        .await?;

    service.import(&data, passphrase, tracker).await
}
