//! SQLite adapter backed by a single rusqlite connection

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use strongbox_core::{Row, Value};

use crate::Database;
use crate::error::{DbError, DbResult};

/// SQLite connection tuning
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub wal_mode: bool,
    pub busy_timeout_ms: u32,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }
}

/// A SQLite database
///
/// All statements run on one connection so a transaction opened with
/// [`Database::begin`] covers every later call until commit or rollback.
pub struct SqliteDatabase {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").finish_non_exhaustive()
    }
}

impl SqliteDatabase {
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::open_with_config(path, &SqliteConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<Path>, config: &SqliteConfig) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        Self::from_connection(conn, config)
    }

    pub fn open_in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        Self::from_connection(conn, &SqliteConfig::default())
    }

    fn from_connection(conn: Connection, config: &SqliteConfig) -> DbResult<Self> {
        let timeout_pragma = format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms);
        let mut pragmas = Vec::new();

        if config.wal_mode {
            pragmas.push("PRAGMA journal_mode = WAL;");
        }
        pragmas.push("PRAGMA synchronous = NORMAL;");
        pragmas.push(&timeout_pragma);
        if config.foreign_keys {
            pragmas.push("PRAGMA foreign_keys = ON;");
        }

        conn.execute_batch(&pragmas.join("\n"))
            .map_err(|e| DbError::ConnectionFailed(format!("Failed to configure SQLite: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::ConnectionFailed(format!("SQLite connection poisoned: {e}")))
    }

    fn run_batch(&self, sql: &str) -> DbResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> DbResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(bytes) => Value::Text(
            std::str::from_utf8(bytes)
                .map_err(|e| DbError::ConversionFailed(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    })
}

#[async_trait]
impl Database for SqliteDatabase {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, name) in columns.iter().enumerate() {
                record.insert(name.clone(), from_value_ref(row.get_ref(index)?)?);
            }
            result.push(record);
        }
        Ok(result)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let conn = self.lock()?;
        let changed = conn.execute(
            sql,
            rusqlite::params_from_iter(params.iter().map(to_sql_value)),
        )?;
        Ok(changed as u64)
    }

    async fn begin(&self) -> DbResult<()> {
        self.run_batch("BEGIN")
    }

    async fn commit(&self) -> DbResult<()> {
        self.run_batch("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.run_batch("ROLLBACK")
    }
}
