//! Object storage backends (S3-compatible and Azure Blob)

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::path::Path as ObjectPath;

use crate::config::{AzureConfig, S3Config};
use crate::error::{StorageError, StorageResult};
use crate::{BackupStorage, validate_name};

/// Key prefix isolating archives from other content in the same bucket
pub const BACKUP_PREFIX: &str = "backups";

/// Archives stored as objects under the `backups/` prefix
#[derive(Debug, Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
}

impl ObjectStorage {
    /// Wrap any object store; archives live under [`BACKUP_PREFIX`]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            prefix: ObjectPath::from(BACKUP_PREFIX),
        }
    }

    /// Build an S3 (or S3-compatible) backend
    ///
    /// # Errors
    ///
    /// `StorageError::InvalidConfig` when no bucket is set, or the builder's
    /// error when the client cannot be constructed.
    pub fn s3(config: &S3Config) -> StorageResult<Self> {
        let bucket = config
            .bucket()
            .ok_or_else(|| StorageError::InvalidConfig("S3 bucket is not set".to_string()))?;

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&config.region);

        if let (Some(key), Some(secret)) = (&config.key, &config.secret) {
            builder = builder
                .with_access_key_id(key)
                .with_secret_access_key(secret);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(Self::new(Arc::new(builder.build()?)))
    }

    /// Build an Azure Blob Storage backend from a connection string
    pub fn azure(config: &AzureConfig) -> StorageResult<Self> {
        let connection_string = config.connection_string().ok_or_else(|| {
            StorageError::InvalidConfig("Azure connection string is not set".to_string())
        })?;
        let parts = parse_connection_string(connection_string)?;

        let mut builder = MicrosoftAzureBuilder::new().with_container_name(&config.container);

        if parts
            .get("UseDevelopmentStorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            builder = builder.with_use_emulator(true);
        } else {
            let account = parts.get("AccountName").ok_or_else(|| {
                StorageError::InvalidConfig("connection string has no AccountName".to_string())
            })?;
            let key = parts.get("AccountKey").ok_or_else(|| {
                StorageError::InvalidConfig("connection string has no AccountKey".to_string())
            })?;
            builder = builder.with_account(account).with_access_key(key);
        }

        Ok(Self::new(Arc::new(builder.build()?)))
    }

    fn path_for(&self, name: &str) -> StorageResult<ObjectPath> {
        validate_name(name)?;
        Ok(self.prefix.child(name))
    }
}

/// Split a `Key=Value;Key=Value` connection string
fn parse_connection_string(raw: &str) -> StorageResult<HashMap<String, String>> {
    let mut parts = HashMap::new();
    for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            StorageError::InvalidConfig(format!("malformed connection string segment: {segment}"))
        })?;
        parts.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(parts)
}

#[async_trait]
impl BackupStorage for ObjectStorage {
    async fn write(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.path_for(name)?;
        self.store
            .put(&path, Bytes::copy_from_slice(data).into())
            .await?;
        tracing::debug!(name, bytes = data.len(), "Wrote backup to object storage");
        Ok(())
    }

    async fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(name)?;
        match self.store.get(&path).await {
            Ok(result) => Ok(result.bytes().await?.to_vec()),
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        let path = self.path_for(name)?;
        // Object stores treat deleting a missing key as success
        if !self.exists(name).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }
        self.store.delete(&path).await?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        let path = self.path_for(name)?;
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        let mut stream = self.store.list(Some(&self.prefix));
        let mut names = Vec::new();

        while let Some(result) = stream.next().await {
            let meta = result?;
            // Only direct children of the prefix
            let mut parts = meta.location.prefix_match(&self.prefix).into_iter().flatten();
            if let (Some(part), None) = (parts.next(), parts.next()) {
                names.push(part.as_ref().to_string());
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::PutPayload;
    use object_store::memory::InMemory;

    fn storage() -> (ObjectStorage, Arc<InMemory>) {
        let store = Arc::new(InMemory::new());
        (ObjectStorage::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_objects_live_under_backup_prefix() {
        let (storage, store) = storage();

        storage.write("a.sbk", b"payload").await.unwrap();

        let raw = store
            .get(&ObjectPath::from("backups/a.sbk"))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap();
        assert_eq!(raw.as_ref(), b"payload");
        assert_eq!(storage.read("a.sbk").await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_list_ignores_content_outside_namespace() {
        let (storage, store) = storage();

        storage.write("b.sbk", b"b").await.unwrap();
        storage.write("a.sbk", b"a").await.unwrap();
        store
            .put(&ObjectPath::from("documents/report.pdf"), PutPayload::from_static(b"doc"))
            .await
            .unwrap();
        store
            .put(&ObjectPath::from("backups/old/nested.sbk"), PutPayload::from_static(b"n"))
            .await
            .unwrap();

        assert_eq!(storage.list().await.unwrap(), vec!["a.sbk", "b.sbk"]);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let (storage, _) = storage();

        assert!(!storage.exists("nope.sbk").await.unwrap());
        assert!(storage.read("nope.sbk").await.unwrap_err().is_not_found());
        assert!(storage.delete("nope.sbk").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_removes_object() {
        let (storage, _) = storage();

        storage.write("a.sbk", b"a").await.unwrap();
        storage.delete("a.sbk").await.unwrap();
        assert!(!storage.exists("a.sbk").await.unwrap());
    }

    #[test]
    fn test_s3_requires_bucket() {
        let err = ObjectStorage::s3(&S3Config::default()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }

    #[test]
    fn test_s3_builds_without_network() {
        let config = S3Config::new("backups-bucket")
            .with_region("eu-west-1")
            .with_credentials("AKIAEXAMPLE", "secret")
            .with_endpoint("http://localhost:9000");
        assert!(ObjectStorage::s3(&config).is_ok());
    }

    #[test]
    fn test_azure_connection_string_parsing() {
        let parts = parse_connection_string(
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5PT0=;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(parts["AccountName"], "acct");
        // Base64 padding survives the split on the first '='
        assert_eq!(parts["AccountKey"], "a2V5PT0=");

        assert!(parse_connection_string("garbage").is_err());
    }

    #[test]
    fn test_azure_requires_account_key() {
        let err = ObjectStorage::azure(&AzureConfig::new("AccountName=acct")).unwrap_err();
        assert!(matches!(err, StorageError::InvalidConfig(_)));
    }
}
