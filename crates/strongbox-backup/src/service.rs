//! Whole-database export and import

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use strongbox_cache::SharedCache;
use strongbox_core::{BackupBlob, Passphrase, Row, archive, crypto};
use strongbox_db::{Database, DbResult, DialectAdapter, TableReaderRegistry, dialect_for};
use tracing::{debug, info, warn};

use crate::config::{BackupConfig, TrackerConfig};
use crate::error::{BackupError, BackupResult};
use crate::progress::{Progress, ProgressSink, RestorePhase};

/// Counters for a finished export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub table_count: usize,
    pub row_count: u64,
    pub size_bytes: usize,
}

/// Encrypted archive plus its counters
#[derive(Clone)]
pub struct ExportOutput {
    pub data: Vec<u8>,
    pub stats: ExportStats,
}

impl fmt::Debug for ExportOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOutput")
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Counters for a committed import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ImportStats {
    pub table_count: usize,
    pub row_count: u64,
}

/// Application cache emptied once a restore has committed
///
/// The restore tracker's keys always survive, so operators can still read
/// the outcome.
#[derive(Clone)]
pub struct CacheInvalidation {
    cache: Arc<dyn SharedCache>,
    keep_prefixes: Vec<String>,
}

impl CacheInvalidation {
    pub fn new(cache: Arc<dyn SharedCache>, tracker: &TrackerConfig) -> Self {
        Self {
            cache,
            keep_prefixes: vec![tracker.key_namespace()],
        }
    }

    /// Also keep keys starting with `prefix`
    pub fn keep_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keep_prefixes.push(prefix.into());
        self
    }

    pub fn keep_prefixes(&self) -> &[String] {
        &self.keep_prefixes
    }

    /// Failures are logged and never fail the restore
    async fn run(&self) {
        let keep: Vec<&str> = self.keep_prefixes.iter().map(String::as_str).collect();
        match self.cache.clear(&keep).await {
            Ok(cleared) => info!(keys = cleared, "Application cache cleared after restore"),
            Err(e) => warn!(error = %e, "Could not clear application cache after restore"),
        }
    }
}

impl fmt::Debug for CacheInvalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheInvalidation")
            .field("keep_prefixes", &self.keep_prefixes)
            .finish_non_exhaustive()
    }
}

/// Exports a database into an encrypted archive and restores it back
pub struct BackupService {
    db: Arc<dyn Database>,
    dialect: Box<dyn DialectAdapter>,
    readers: TableReaderRegistry,
    config: BackupConfig,
    invalidation: Option<CacheInvalidation>,
}

impl fmt::Debug for BackupService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupService")
            .field("dialect", &self.dialect.name())
            .field("readers", &self.readers)
            .field("config", &self.config)
            .field("invalidation", &self.invalidation)
            .finish_non_exhaustive()
    }
}

impl BackupService {
    /// Create a service, picking the SQL dialect from the driver name
    pub fn new(db: Arc<dyn Database>, config: BackupConfig) -> BackupResult<Self> {
        let driver = db.driver_name().to_string();
        let dialect = dialect_for(&driver).map_err(|_| BackupError::UnsupportedDialect(driver))?;

        Ok(Self {
            db,
            dialect,
            readers: TableReaderRegistry::new(),
            config,
            invalidation: None,
        })
    }

    /// Use typed readers for the tables registered in `readers`
    pub fn with_readers(mut self, readers: TableReaderRegistry) -> Self {
        self.readers = readers;
        self
    }

    /// Clear an application cache after every committed restore
    pub fn with_cache_invalidation(mut self, invalidation: CacheInvalidation) -> Self {
        self.invalidation = Some(invalidation);
        self
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn dialect_name(&self) -> &'static str {
        self.dialect.name()
    }

    /// Snapshot every non-excluded table into an encrypted archive.
    ///
    /// Fails as a whole; no partial archive is ever returned.
    pub async fn export(&self, passphrase: &Passphrase) -> BackupResult<ExportOutput> {
        let mut names = self
            .db
            .list_tables()
            .await
            .map_err(BackupError::export)?;
        names.retain(|name| !self.config.is_excluded(name));
        names.sort();

        let mut tables = BTreeMap::new();
        for name in names {
            let rows = self
                .readers
                .reader_for(&name)
                .read_all(self.db.as_ref(), &name)
                .await
                .map_err(BackupError::export)?;
            debug!(table = %name, rows = rows.len(), "Read table");
            tables.insert(name, rows);
        }

        let blob = BackupBlob::new(tables);
        let data = archive::seal(&blob, passphrase).map_err(BackupError::export)?;

        let stats = ExportStats {
            table_count: blob.meta.table_count,
            row_count: blob.row_count(),
            size_bytes: data.len(),
        };
        info!(
            tables = stats.table_count,
            rows = stats.row_count,
            bytes = stats.size_bytes,
            "Backup exported"
        );

        Ok(ExportOutput { data, stats })
    }

    /// Replace the database contents with the archive's, in one transaction.
    ///
    /// Nothing is touched unless the archive opens with `passphrase`. Any
    /// failure after that rolls the whole restore back.
    pub async fn import(
        &self,
        data: &[u8],
        passphrase: &Passphrase,
        progress: &dyn ProgressSink,
    ) -> BackupResult<ImportStats> {
        progress
            .report(&Progress::new(RestorePhase::Decrypting, "Decrypting backup file."))
            .await;
        let compressed = crypto::decrypt(data, passphrase).map_err(BackupError::invalid_backup)?;

        progress
            .report(&Progress::new(
                RestorePhase::Decompressing,
                "Decompressing backup payload.",
            ))
            .await;
        let blob = archive::deserialize(&compressed).map_err(BackupError::invalid_backup)?;

        progress
            .report(&Progress::new(RestorePhase::Validating, "Validating backup payload."))
            .await;
        let tables: Vec<(String, Vec<Row>)> = blob
            .tables
            .into_iter()
            .filter(|(name, _)| {
                let excluded = self.config.is_excluded(name);
                if excluded {
                    debug!(table = %name, "Skipping excluded table in backup");
                }
                !excluded
            })
            .collect();

        let table_count = tables.len();
        progress
            .report(
                &Progress::new(
                    RestorePhase::Preparing,
                    "Preparing database restore transaction.",
                )
                .with_counts(table_count, 0, 0),
            )
            .await;

        self.db
            .begin()
            .await
            .map_err(|source| BackupError::RestoreFailed { source })?;

        match self.restore_tables(&tables, progress).await {
            Ok(row_count) => {
                if let Some(invalidation) = &self.invalidation {
                    invalidation.run().await;
                }
                progress
                    .report(
                        &Progress::new(RestorePhase::Completed, "Restore transaction committed.")
                            .with_counts(table_count, table_count, row_count),
                    )
                    .await;
                info!(tables = table_count, rows = row_count, "Backup restored");
                Ok(ImportStats {
                    table_count,
                    row_count,
                })
            }
            Err(source) => {
                self.abort_restore().await;
                warn!(error = %source, "Restore rolled back");
                Err(BackupError::RestoreFailed { source })
            }
        }
    }

    /// Transaction body, ending with COMMIT
    async fn restore_tables(
        &self,
        tables: &[(String, Vec<Row>)],
        progress: &dyn ProgressSink,
    ) -> DbResult<u64> {
        let table_count = tables.len();

        self.db
            .execute(self.dialect.disable_foreign_keys(), &[])
            .await?;

        // Clear everything first: a cascading clear must not reach rows
        // already loaded into another table.
        for (name, _) in tables {
            self.db.execute(&self.dialect.clear_table(name), &[]).await?;
        }

        let mut rows_processed = 0u64;
        for (index, (name, rows)) in tables.iter().enumerate() {
            progress
                .report(
                    &Progress::new(
                        RestorePhase::RestoringTable,
                        format!("Restoring table {name} ({}/{table_count}).", index + 1),
                    )
                    .with_counts(table_count, index, rows_processed)
                    .with_table(name),
                )
                .await;

            rows_processed += self.insert_rows(name, rows).await?;

            progress
                .report(
                    &Progress::new(
                        RestorePhase::TableRestored,
                        format!("Restored table {name} ({}/{table_count}).", index + 1),
                    )
                    .with_counts(table_count, index + 1, rows_processed)
                    .with_table(name),
                )
                .await;
        }

        progress
            .report(
                &Progress::new(
                    RestorePhase::Finalizing,
                    "Finalizing restore and enabling constraints.",
                )
                .with_counts(table_count, table_count, rows_processed),
            )
            .await;

        if let Some(sql) = self.dialect.enable_foreign_keys() {
            self.db.execute(sql, &[]).await?;
        }

        for (name, rows) in tables {
            let Some(max_id) = max_integer_id(rows) else {
                continue;
            };
            if let Some(statement) = self.dialect.reset_sequence(name, max_id) {
                self.db.query(&statement.sql, &statement.params).await?;
            }
        }

        self.db.commit().await?;
        Ok(rows_processed)
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> DbResult<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let columns: Vec<String> = first.keys().cloned().collect();

        let batch_size = self
            .config
            .batch_size
            .min(self.dialect.max_rows_per_insert(columns.len()))
            .max(1);

        let mut inserted = 0u64;
        for batch in rows.chunks(batch_size) {
            let statement = self.dialect.insert_batch(table, &columns, batch)?;
            self.db.execute(&statement.sql, &statement.params).await?;
            inserted += batch.len() as u64;
        }
        debug!(table, rows = inserted, "Inserted rows");
        Ok(inserted)
    }

    /// Roll back and restore FK enforcement, keeping the original failure
    async fn abort_restore(&self) {
        if let Err(e) = self.db.rollback().await {
            warn!(error = %e, "Rollback after failed restore reported an error");
        }
        if let Some(sql) = self.dialect.enable_foreign_keys()
            && let Err(e) = self.db.execute(sql, &[]).await
        {
            warn!(error = %e, "Could not re-enable foreign key checks after rollback");
        }
    }
}

/// Largest integer `id` in the rows, if the table has one
fn max_integer_id(rows: &[Row]) -> Option<i64> {
    rows.iter()
        .filter_map(|row| row.get("id").and_then(|v| v.as_i64()))
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use std::time::Duration;

    use async_trait::async_trait;
    use strongbox_cache::{CacheError, CacheResult, InMemoryCache};
    use strongbox_core::Value;
    use strongbox_db::SqliteDatabase;

    use crate::progress::NoProgress;

    #[derive(Default)]
    struct RecordingSink {
        phases: Mutex<Vec<RestorePhase>>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, progress: &Progress) {
            self.phases.lock().unwrap().push(progress.phase);
        }
    }

    async fn seeded_db() -> Arc<SqliteDatabase> {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();
        db.execute(
            "CREATE TABLE queued_jobs (id INTEGER PRIMARY KEY, payload TEXT)",
            &[],
        )
        .await
        .unwrap();
        db.execute(
            "INSERT INTO users (id, name) VALUES (1, 'ada'), (2, 'grace')",
            &[],
        )
        .await
        .unwrap();
        db.execute("INSERT INTO queued_jobs (payload) VALUES ('x')", &[])
            .await
            .unwrap();
        Arc::new(db)
    }

    fn passphrase() -> Passphrase {
        Passphrase::new("secret")
    }

    #[tokio::test]
    async fn test_unknown_driver_is_rejected() {
        struct Mystery;

        #[async_trait]
        impl Database for Mystery {
            fn driver_name(&self) -> &str {
                "oracle"
            }
            async fn list_tables(&self) -> DbResult<Vec<String>> {
                Ok(vec![])
            }
            async fn query(&self, _: &str, _: &[Value]) -> DbResult<Vec<Row>> {
                Ok(vec![])
            }
            async fn execute(&self, _: &str, _: &[Value]) -> DbResult<u64> {
                Ok(0)
            }
            async fn begin(&self) -> DbResult<()> {
                Ok(())
            }
            async fn commit(&self) -> DbResult<()> {
                Ok(())
            }
            async fn rollback(&self) -> DbResult<()> {
                Ok(())
            }
        }

        let err = BackupService::new(Arc::new(Mystery), BackupConfig::default()).unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedDialect(name) if name == "oracle"));
    }

    #[tokio::test]
    async fn test_export_skips_excluded_tables() {
        let service = BackupService::new(seeded_db().await, BackupConfig::default()).unwrap();

        let output = service.export(&passphrase()).await.unwrap();
        assert_eq!(output.stats.table_count, 1);
        assert_eq!(output.stats.row_count, 2);
        assert_eq!(output.stats.size_bytes, output.data.len());

        let blob = archive::open(&output.data, &passphrase()).unwrap();
        assert_eq!(blob.meta.tables, vec!["users"]);
        assert!(!blob.tables.contains_key("queued_jobs"));
    }

    #[tokio::test]
    async fn test_import_reports_phases_in_order() {
        let service = BackupService::new(seeded_db().await, BackupConfig::default()).unwrap();
        let output = service.export(&passphrase()).await.unwrap();

        let sink = RecordingSink::default();
        let stats = service
            .import(&output.data, &passphrase(), &sink)
            .await
            .unwrap();
        assert_eq!(stats, ImportStats { table_count: 1, row_count: 2 });

        let phases = sink.phases.lock().unwrap().clone();
        assert_eq!(
            phases,
            vec![
                RestorePhase::Decrypting,
                RestorePhase::Decompressing,
                RestorePhase::Validating,
                RestorePhase::Preparing,
                RestorePhase::RestoringTable,
                RestorePhase::TableRestored,
                RestorePhase::Finalizing,
                RestorePhase::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_import_with_wrong_key_is_invalid_backup() {
        let db = seeded_db().await;
        let service = BackupService::new(db.clone(), BackupConfig::default()).unwrap();
        let output = service.export(&passphrase()).await.unwrap();

        let err = service
            .import(&output.data, &Passphrase::new("nope"), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidBackup { .. }));

        let users = db.query("SELECT * FROM users", &[]).await.unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn test_import_batches_rows() {
        let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
        db.execute("CREATE TABLE items (id INTEGER PRIMARY KEY, n INTEGER)", &[])
            .await
            .unwrap();
        for i in 1..=7 {
            db.execute(
                "INSERT INTO items (id, n) VALUES (?, ?)",
                &[Value::Integer(i), Value::Integer(i * 10)],
            )
            .await
            .unwrap();
        }

        let service =
            BackupService::new(db.clone(), BackupConfig::default().with_batch_size(3)).unwrap();
        let output = service.export(&passphrase()).await.unwrap();
        db.execute("DELETE FROM items", &[]).await.unwrap();

        let stats = service
            .import(&output.data, &passphrase(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.row_count, 7);

        let rows = db
            .query("SELECT n FROM items ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[6].get("n"), Some(&Value::Integer(70)));
    }

    #[tokio::test]
    async fn test_import_wide_table_stays_under_variable_limit() {
        let db = Arc::new(SqliteDatabase::open_in_memory().unwrap());
        let columns: Vec<String> = (0..400).map(|i| format!("c{i}")).collect();
        let definitions: Vec<String> = columns.iter().map(|c| format!("{c} INTEGER")).collect();
        db.execute(
            &format!(
                "CREATE TABLE wide (id INTEGER PRIMARY KEY, {})",
                definitions.join(", ")
            ),
            &[],
        )
        .await
        .unwrap();

        let insert = format!(
            "INSERT INTO wide (id, {}) VALUES (?{})",
            columns.join(", "),
            ", ?".repeat(columns.len())
        );
        for id in 1..=100 {
            let mut params = vec![Value::Integer(id)];
            params.extend((0..400).map(|i| Value::Integer(id * 1000 + i)));
            db.execute(&insert, &params).await.unwrap();
        }

        let service = BackupService::new(db.clone(), BackupConfig::default()).unwrap();
        let output = service.export(&passphrase()).await.unwrap();

        let stats = service
            .import(&output.data, &passphrase(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.row_count, 100);

        let rows = db
            .query("SELECT c399 FROM wide WHERE id = 100", &[])
            .await
            .unwrap();
        assert_eq!(rows[0].get("c399"), Some(&Value::Integer(100_399)));
    }

    async fn stale_cache() -> (Arc<InMemoryCache>, CacheInvalidation) {
        let cache = Arc::new(InMemoryCache::new());
        for key in ["users.1", "restore.status", "restore.lock"] {
            cache.write(key, "cached".to_string(), None).await.unwrap();
        }
        let invalidation = CacheInvalidation::new(cache.clone(), &TrackerConfig::default());
        (cache, invalidation)
    }

    #[tokio::test]
    async fn test_committed_import_clears_application_cache() {
        let (cache, invalidation) = stale_cache().await;
        let service = BackupService::new(seeded_db().await, BackupConfig::default())
            .unwrap()
            .with_cache_invalidation(invalidation);
        let output = service.export(&passphrase()).await.unwrap();

        service
            .import(&output.data, &passphrase(), &NoProgress)
            .await
            .unwrap();

        assert_eq!(cache.read("users.1").await.unwrap(), None);
        assert!(cache.read("restore.status").await.unwrap().is_some());
        assert!(cache.read("restore.lock").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_import_leaves_application_cache() {
        let (cache, invalidation) = stale_cache().await;
        let service = BackupService::new(seeded_db().await, BackupConfig::default())
            .unwrap()
            .with_cache_invalidation(invalidation);
        let output = service.export(&passphrase()).await.unwrap();

        service
            .import(&output.data, &Passphrase::new("nope"), &NoProgress)
            .await
            .unwrap_err();
        assert!(cache.read("users.1").await.unwrap().is_some());

        // Rolled back inside the transaction
        let invalidation = CacheInvalidation::new(cache.clone(), &TrackerConfig::default());
        let doomed = BackupService::new(seeded_db().await, BackupConfig::default())
            .unwrap()
            .with_cache_invalidation(invalidation);
        let broken = archive::seal(
            &BackupBlob::new(BTreeMap::from([(
                "users".to_string(),
                vec![Row::from([("missing_column".to_string(), Value::Integer(1))])],
            )])),
            &passphrase(),
        )
        .unwrap();
        let err = doomed
            .import(&broken, &passphrase(), &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::RestoreFailed { .. }));
        assert!(cache.read("users.1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_restore() {
        struct Unreachable;

        #[async_trait]
        impl SharedCache for Unreachable {
            async fn write(&self, _: &str, _: String, _: Option<Duration>) -> CacheResult<()> {
                Err(CacheError::ConnectionFailed("down".into()))
            }
            async fn read(&self, _: &str) -> CacheResult<Option<String>> {
                Err(CacheError::ConnectionFailed("down".into()))
            }
            async fn delete(&self, _: &str) -> CacheResult<()> {
                Err(CacheError::ConnectionFailed("down".into()))
            }
            async fn add(&self, _: &str, _: String, _: Option<Duration>) -> CacheResult<bool> {
                Err(CacheError::ConnectionFailed("down".into()))
            }
            async fn clear(&self, _: &[&str]) -> CacheResult<usize> {
                Err(CacheError::ConnectionFailed("down".into()))
            }
        }

        let service = BackupService::new(seeded_db().await, BackupConfig::default())
            .unwrap()
            .with_cache_invalidation(CacheInvalidation::new(
                Arc::new(Unreachable),
                &TrackerConfig::default(),
            ));
        let output = service.export(&passphrase()).await.unwrap();

        let stats = service
            .import(&output.data, &passphrase(), &NoProgress)
            .await
            .unwrap();
        assert_eq!(stats.row_count, 2);
    }

    #[test]
    fn test_max_integer_id() {
        let rows = vec![
            Row::from([("id".to_string(), Value::Integer(3))]),
            Row::from([("id".to_string(), Value::Integer(9))]),
            Row::from([("id".to_string(), Value::Null)]),
        ];
        assert_eq!(max_integer_id(&rows), Some(9));

        let uuid_rows = vec![Row::from([("id".to_string(), Value::Text("a".into()))])];
        assert_eq!(max_integer_id(&uuid_rows), None);
    }
}
