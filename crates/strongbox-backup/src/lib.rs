//! # Strongbox Backup
//!
//! Encrypted whole-database backups and single-writer restores.
//!
//! - [`BackupService`] exports every non-excluded table into an encrypted
//!   archive and imports one back inside a single transaction.
//! - [`RestoreStatusService`] holds the cross-process restore lock and the
//!   progress record that operators poll.
//! - [`create_backup`] and [`restore_from_storage`] tie both to a
//!   [`BackupStorage`](strongbox_storage::BackupStorage) backend.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strongbox_backup::{BackupConfig, BackupService, RestoreStatusService, StatusContext};
//! use strongbox_backup::{create_backup, restore_from_storage};
//! use strongbox_cache::InMemoryCache;
//! use strongbox_core::Passphrase;
//! use strongbox_db::SqliteDatabase;
//! use strongbox_storage::LocalStorage;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(SqliteDatabase::open("app.db")?);
//! let service = BackupService::new(db, BackupConfig::default())?;
//! let tracker = RestoreStatusService::new(Arc::new(InMemoryCache::new()));
//! let storage = LocalStorage::new("backups")?;
//! let key = Passphrase::new("correct horse battery staple");
//!
//! let (name, _stats) = create_backup(&service, &storage, &key).await?;
//! restore_from_storage(&service, &tracker, &storage, &name, &key, &StatusContext::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod progress;
pub mod restore;
pub mod service;
pub mod status;

pub use config::{BackupConfig, TrackerConfig};
pub use error::{BackupError, BackupResult, ExportCause, StatusError, StatusResult};
pub use progress::{NoProgress, Progress, ProgressSink, RestorePhase};
pub use restore::{BACKUP_EXTENSION, backup_file_name, create_backup, restore_from_storage};
pub use service::{BackupService, CacheInvalidation, ExportOutput, ExportStats, ImportStats};
pub use status::{RestoreLock, RestoreState, RestoreStatus, RestoreStatusService, StatusContext};
