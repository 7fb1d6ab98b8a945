//! Storage backend configuration

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which backend holds the archives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    #[default]
    Local,
    S3,
    Azure,
}

impl AdapterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterType::Local => "local",
            AdapterType::S3 => "s3",
            AdapterType::Azure => "azure",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Requested backend. Remote backends fall back to local when unusable.
    pub adapter: AdapterType,
    pub local: LocalConfig,
    pub s3: S3Config,
    pub azure: AzureConfig,
}

impl StorageConfig {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            adapter: AdapterType::Local,
            local: LocalConfig { path: path.into() },
            ..Self::default()
        }
    }

    pub fn with_adapter(mut self, adapter: AdapterType) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn with_s3(mut self, s3: S3Config) -> Self {
        self.s3 = s3;
        self
    }

    pub fn with_azure(mut self, azure: AzureConfig) -> Self {
        self.azure = azure;
        self
    }
}

/// Local filesystem backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalConfig {
    /// Directory holding the archives, created with mode 0750 if absent
    pub path: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("backups"),
        }
    }
}

/// S3-compatible object storage backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: String,
    pub key: Option<String>,
    pub secret: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...)
    pub endpoint: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "us-east-1".to_string(),
            key: None,
            secret: None,
            endpoint: None,
        }
    }
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_credentials(mut self, key: impl Into<String>, secret: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.secret = Some(secret.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Bucket name, if one is configured
    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref().filter(|b| !b.trim().is_empty())
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("key", &self.key)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Azure Blob Storage backend
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Standard `Key=Value;...` storage account connection string
    pub connection_string: Option<String>,
    pub container: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            container: "documents".to_string(),
        }
    }
}

impl AzureConfig {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Self::default()
        }
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    pub fn connection_string(&self) -> Option<&str> {
        self.connection_string
            .as_deref()
            .filter(|c| !c.trim().is_empty())
    }
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "***"),
            )
            .field("container", &self.container)
            .finish()
    }
}
