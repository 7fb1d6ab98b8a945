//! Subcommand implementations

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use strongbox_backup::{
    BackupError, BackupService, CacheInvalidation, RestoreState, RestoreStatus,
    RestoreStatusService, StatusContext, create_backup, restore_from_storage,
};
use strongbox_cache::{InMemoryCache, SharedCache};
use strongbox_core::Passphrase;
use strongbox_db::{Database, SqliteDatabase};
use strongbox_storage::{BackupStorage, BackupStorageService};

use crate::KEY_ENV;
use crate::config::StrongboxConfig;
use crate::error::CliError;

const CONFIRMATION: &str = "RESTORE";

/// Explicit key first, then the environment
fn passphrase(key: Option<String>) -> Result<Passphrase, CliError> {
    key.as_deref()
        .and_then(Passphrase::from_input)
        .or_else(|| Passphrase::from_env(KEY_ENV))
        .ok_or(CliError::MissingKey(KEY_ENV))
}

fn is_confirmed(input: &str) -> bool {
    input.trim() == CONFIRMATION
}

async fn open_database(config: &StrongboxConfig) -> Result<Arc<dyn Database>, CliError> {
    let database = &config.database;
    match database.driver.as_str() {
        "sqlite" | "sqlite3" => Ok(Arc::new(SqliteDatabase::open(&database.path)?)),
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" | "pgsql" => {
            let url = database.url.as_deref().ok_or_else(|| {
                CliError::Config("database.url is required for postgres".to_string())
            })?;
            let pg = strongbox_db::PostgresConfig::from_url(url)?;
            Ok(Arc::new(strongbox_db::PostgresDatabase::connect(&pg).await?))
        }
        other => Err(BackupError::UnsupportedDialect(other.to_string()).into()),
    }
}

async fn open_cache(config: &StrongboxConfig) -> Result<Arc<dyn SharedCache>, CliError> {
    match config.cache.url.as_deref() {
        #[cfg(feature = "redis")]
        Some(url) => {
            let mut redis = strongbox_cache::RedisCacheConfig::new(url);
            if let Some(prefix) = &config.cache.key_prefix {
                redis = redis.with_key_prefix(prefix.clone());
            }
            Ok(Arc::new(strongbox_cache::RedisCache::connect(&redis).await?))
        }
        #[cfg(not(feature = "redis"))]
        Some(_) => {
            tracing::warn!("Built without Redis support, restore lock only covers this process");
            Ok(Arc::new(InMemoryCache::new()))
        }
        None => Ok(Arc::new(InMemoryCache::new())),
    }
}

async fn tracker(config: &StrongboxConfig) -> Result<RestoreStatusService, CliError> {
    let cache = open_cache(config).await?;
    Ok(RestoreStatusService::with_config(cache, config.restore.clone()))
}

/// Post-restore clear of the shared application cache, if one is configured
fn cache_invalidation(
    config: &StrongboxConfig,
    cache: &Arc<dyn SharedCache>,
) -> Option<CacheInvalidation> {
    if config.cache.url.is_none() || !config.cache.clear_after_restore {
        return None;
    }
    let invalidation = config.cache.keep_prefixes.iter().fold(
        CacheInvalidation::new(cache.clone(), &config.restore),
        |invalidation, prefix| invalidation.keep_prefix(prefix.clone()),
    );
    Some(invalidation)
}

pub async fn create(config: &StrongboxConfig, key: Option<String>) -> Result<(), CliError> {
    let passphrase = passphrase(key)?;
    let service = BackupService::new(open_database(config).await?, config.backup.clone())?;
    let storage = BackupStorageService::from_config(&config.storage)?;

    let (name, stats) = create_backup(&service, &storage, &passphrase).await?;
    println!(
        "Created {name} on {} storage: {} tables, {} rows, {} bytes",
        storage.adapter_type(),
        stats.table_count,
        stats.row_count,
        stats.size_bytes
    );
    Ok(())
}

pub async fn restore(
    config: &StrongboxConfig,
    key: Option<String>,
    file: &str,
    yes: bool,
) -> Result<(), CliError> {
    let passphrase = passphrase(key)?;
    let storage = BackupStorageService::from_config(&config.storage)?;
    if !storage.exists(file).await? {
        return Err(strongbox_storage::StorageError::NotFound(file.to_string()).into());
    }

    if !yes {
        print!(
            "This replaces every table in the database with the contents of {file}.\n\
             Type {CONFIRMATION} to continue: "
        );
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !is_confirmed(&answer) {
            return Err(CliError::Aborted);
        }
    }

    let cache = open_cache(config).await?;
    let tracker = RestoreStatusService::with_config(cache.clone(), config.restore.clone());
    let mut service = BackupService::new(open_database(config).await?, config.backup.clone())?;
    if let Some(invalidation) = cache_invalidation(config, &cache) {
        service = service.with_cache_invalidation(invalidation);
    }

    let mut context = StatusContext::new()
        .with_source(storage.adapter_type().as_str())
        .with_backup_id(file);
    if let Ok(user) = std::env::var("USER") {
        context = context.with_actor(user);
    }

    let stats =
        restore_from_storage(&service, &tracker, &storage, file, &passphrase, &context).await?;
    println!(
        "Restored {file}: {} tables, {} rows",
        stats.table_count, stats.row_count
    );
    Ok(())
}

pub async fn list(config: &StrongboxConfig) -> Result<(), CliError> {
    let storage = BackupStorageService::from_config(&config.storage)?;
    let names = storage.list().await?;
    if names.is_empty() {
        println!("No backups found on {} storage", storage.adapter_type());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

pub async fn delete(config: &StrongboxConfig, file: &str) -> Result<(), CliError> {
    let storage = BackupStorageService::from_config(&config.storage)?;
    storage.delete(file).await?;
    println!("Deleted {file}");
    Ok(())
}

pub async fn status(config: &StrongboxConfig, json: bool) -> Result<(), CliError> {
    let status = tracker(config).await?.get_status().await?;
    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| CliError::Config(format!("Failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        println!("{}", describe_status(&status));
    }
    Ok(())
}

pub async fn prune(config: &StrongboxConfig, retain: usize) -> Result<(), CliError> {
    let storage = BackupStorageService::from_config(&config.storage)?;
    let deleted = storage.prune(retain).await?;
    println!("Pruned {} backups, kept the newest {retain}", deleted.len());
    for name in deleted {
        println!("  {name}");
    }
    Ok(())
}

/// Whole seconds, so durations print without sub-second noise
fn rounded(delta: chrono::TimeDelta) -> Option<Duration> {
    delta.to_std().ok().map(|d| Duration::from_secs(d.as_secs()))
}

fn describe_status(status: &RestoreStatus) -> String {
    let now = Utc::now();
    let mut lines = vec![
        format!("Status:  {} ({})", status.status, status.phase),
        format!("Message: {}", status.message),
    ];

    if let Some(started) = status.started_at
        && let Some(elapsed) = rounded(now - started)
    {
        lines.push(format!(
            "Started: {} ago",
            humantime::format_duration(elapsed)
        ));
    }

    if status.status == RestoreState::Running {
        if let Some(expires) = status.expires_at
            && let Some(left) = rounded(expires - now)
        {
            lines.push(format!(
                "Lock:    expires in {}",
                humantime::format_duration(left)
            ));
        }
        let tables = status
            .table_count
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        lines.push(format!(
            "Tables:  {}/{tables}, {} rows",
            status.tables_processed, status.rows_processed
        ));
        if let Some(table) = &status.current_table {
            lines.push(format!("Current: {table}"));
        }
    }

    if let Some(backup) = &status.backup_id {
        lines.push(format!("Backup:  {backup}"));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_backup::RestorePhase;

    #[test]
    fn test_explicit_key_wins() {
        let key = passphrase(Some("hunter2".to_string())).unwrap();
        assert!(!key.is_empty());
    }

    #[test]
    fn test_key_whitespace_is_ignored() {
        let typed = passphrase(Some("  hunter2\n".to_string())).unwrap();
        let clean = Passphrase::new("hunter2");

        let sealed = strongbox_core::crypto::encrypt(b"payload", &typed).unwrap();
        let opened = strongbox_core::crypto::decrypt(&sealed, &clean).unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_confirmation_requires_exact_word() {
        assert!(is_confirmed("RESTORE\n"));
        assert!(is_confirmed("  RESTORE  "));
        assert!(!is_confirmed("restore"));
        assert!(!is_confirmed("yes"));
        assert!(!is_confirmed(""));
    }

    #[tokio::test]
    async fn test_unknown_driver_is_rejected() {
        let mut config = StrongboxConfig::default();
        config.database.driver = "mssql".to_string();

        let Err(err) = open_database(&config).await else {
            panic!("mssql should not be accepted");
        };
        assert!(matches!(
            err,
            CliError::Backup(BackupError::UnsupportedDialect(name)) if name == "mssql"
        ));
    }

    #[tokio::test]
    async fn test_sqlite_database_opens() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = StrongboxConfig::default();
        config.database.path = dir.path().join("app.db");

        let db = open_database(&config).await.unwrap();
        assert_eq!(db.driver_name(), "sqlite");
    }

    #[test]
    fn test_cache_invalidation_needs_shared_cache() {
        let cache: Arc<dyn SharedCache> = Arc::new(InMemoryCache::new());
        let mut config = StrongboxConfig::default();
        assert!(cache_invalidation(&config, &cache).is_none());

        config.cache.url = Some("redis://cache:6379".to_string());
        config.cache.keep_prefixes = vec!["sessions.".to_string()];
        let invalidation = cache_invalidation(&config, &cache).unwrap();
        assert_eq!(invalidation.keep_prefixes(), ["restore.", "sessions."]);

        config.cache.clear_after_restore = false;
        assert!(cache_invalidation(&config, &cache).is_none());
    }

    #[test]
    fn test_describe_running_status() {
        let now = Utc::now();
        let status = RestoreStatus {
            status: RestoreState::Running,
            phase: RestorePhase::RestoringTable,
            message: "Restoring table users (2/3).".to_string(),
            started_at: Some(now - chrono::TimeDelta::seconds(90)),
            expires_at: Some(now + chrono::TimeDelta::seconds(600)),
            table_count: Some(3),
            tables_processed: 1,
            rows_processed: 120,
            current_table: Some("users".to_string()),
            ..RestoreStatus::default()
        };

        let text = describe_status(&status);
        assert!(text.contains("running (restoring_table)"));
        assert!(text.contains("Started: 1m 30s ago") || text.contains("Started: 1m 31s ago"));
        assert!(text.contains("Tables:  1/3, 120 rows"));
        assert!(text.contains("Current: users"));
    }

    #[test]
    fn test_describe_idle_status() {
        let text = describe_status(&RestoreStatus::default());
        assert!(text.contains("idle (idle)"));
        assert!(text.contains("No restore currently running."));
        assert!(!text.contains("Lock:"));
    }
}
