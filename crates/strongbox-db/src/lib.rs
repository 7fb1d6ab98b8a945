//! # Strongbox DB
//!
//! The narrow view of a relational database that whole-database backup and
//! restore need: enumerate tables, read rows as untyped maps, run
//! parameterized statements and control one transaction. Engine-specific SQL
//! lives behind [`DialectAdapter`].

pub mod dialect;
pub mod error;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod reader;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use strongbox_core::{Row, Value};

pub use dialect::{DialectAdapter, PostgresDialect, SqliteDialect, Statement, dialect_for};
pub use error::{DbError, DbResult};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresDatabase};
pub use reader::{ColumnType, RawSqlTableReader, TableReader, TableReaderRegistry, TypedTableReader};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConfig, SqliteDatabase};

/// A database connection usable for export and restore
///
/// Implementations run every call on the same session, so a transaction
/// opened with [`begin`](Database::begin) spans all later statements.
#[async_trait]
pub trait Database: Send + Sync {
    /// Driver identifier used to pick a [`DialectAdapter`]
    fn driver_name(&self) -> &str;

    /// User tables in the current schema, sorted
    async fn list_tables(&self) -> DbResult<Vec<String>>;

    /// Run a query and return every row as a column-name map
    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64>;

    async fn begin(&self) -> DbResult<()>;

    async fn commit(&self) -> DbResult<()>;

    async fn rollback(&self) -> DbResult<()>;
}
