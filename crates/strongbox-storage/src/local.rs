//! Local filesystem backend

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::{BackupStorage, validate_name};

const TEMP_PREFIX: &str = ".tmp-";

/// Archives stored as plain files in one directory
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Open the backup directory, creating it (mode 0750) if absent
    ///
    /// # Errors
    ///
    /// Returns `StorageError::StorageUnavailable` if the directory cannot be
    /// created or the path exists but is not a directory.
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        create_backup_dir(&root).map_err(|e| {
            StorageError::StorageUnavailable(format!(
                "cannot create backup directory {}: {e}",
                root.display()
            ))
        })?;

        if !root.is_dir() {
            return Err(StorageError::StorageUnavailable(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> StorageResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[cfg(unix)]
fn create_backup_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o750)
        .create(path)
}

#[cfg(not(unix))]
fn create_backup_dir(path: &Path) -> std::io::Result<()> {
    std::fs::DirBuilder::new().recursive(true).create(path)
}

#[async_trait]
impl BackupStorage for LocalStorage {
    async fn write(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.path_for(name)?;
        let temp = self.root.join(format!("{TEMP_PREFIX}{name}"));

        tokio::fs::write(&temp, data).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::debug!(name, bytes = data.len(), "Wrote backup to local storage");
        Ok(())
    }

    async fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_for(name)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            names.push(name);
        }

        names.sort();
        Ok(names)
    }
}
