//! PostgreSQL connection configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_postgres::Config;
use tokio_postgres::config::Host;

use crate::error::{DbError, DbResult};

/// PostgreSQL connection configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout: u64,
    pub application_name: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "strongbox".to_string(),
            user: "strongbox".to_string(),
            password: None,
            connect_timeout: 30,
            application_name: "strongbox".to_string(),
        }
    }
}

impl std::fmt::Debug for PostgresConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("connect_timeout", &self.connect_timeout)
            .field("application_name", &self.application_name)
            .finish()
    }
}

impl PostgresConfig {
    /// Parse a `postgres://` URL or a `key=value` connection string
    pub fn from_url(url: &str) -> DbResult<Self> {
        let config: Config = url
            .parse()
            .map_err(|e| DbError::InvalidConfig(format!("Invalid database URL: {e}")))?;
        let defaults = Self::default();

        Ok(Self {
            host: config
                .get_hosts()
                .first()
                .map(|h| match h {
                    Host::Tcp(s) => s.clone(),
                    #[cfg(unix)]
                    Host::Unix(path) => path.to_string_lossy().to_string(),
                })
                .unwrap_or(defaults.host),
            port: config.get_ports().first().copied().unwrap_or(defaults.port),
            database: config
                .get_dbname()
                .map(str::to_string)
                .unwrap_or(defaults.database),
            user: config.get_user().map(str::to_string).unwrap_or(defaults.user),
            password: config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).to_string()),
            connect_timeout: config
                .get_connect_timeout()
                .map(|d| d.as_secs())
                .unwrap_or(defaults.connect_timeout),
            application_name: config
                .get_application_name()
                .map(str::to_string)
                .unwrap_or(defaults.application_name),
        })
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.host.is_empty() {
            return Err(DbError::InvalidConfig("Host cannot be empty".to_string()));
        }
        if self.database.is_empty() {
            return Err(DbError::InvalidConfig(
                "Database name cannot be empty".to_string(),
            ));
        }
        if self.user.is_empty() {
            return Err(DbError::InvalidConfig("Username cannot be empty".to_string()));
        }
        if !self
            .database
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
        {
            return Err(DbError::InvalidConfig(
                "Database name contains invalid characters".to_string(),
            ));
        }
        Ok(())
    }

    /// Build tokio_postgres Config
    pub fn build_pg_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name(&self.application_name)
            .connect_timeout(Duration::from_secs(self.connect_timeout));

        if let Some(ref password) = self.password {
            config.password(password);
        }

        config
    }
}
