//! SQL dialect strategies for bulk restore
//!
//! The restore routine never branches on the database engine itself. It
//! picks one [`DialectAdapter`] from the driver name up front and asks it for
//! every engine-specific statement.

use strongbox_core::{Row, Value};

use crate::error::{DbError, DbResult};

/// A SQL string with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Quote an identifier with ANSI double quotes, doubling embedded quotes
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Engine-specific statements used by a full-database restore
pub trait DialectAdapter: Send + Sync {
    /// Driver name this adapter was selected for
    fn name(&self) -> &'static str;

    fn quote_identifier(&self, ident: &str) -> String {
        quote_identifier(ident)
    }

    /// Suspend referential-integrity checks for the current transaction
    fn disable_foreign_keys(&self) -> &'static str;

    /// Restore referential-integrity checks.
    ///
    /// `None` when the engine restores them on its own at transaction end.
    fn enable_foreign_keys(&self) -> Option<&'static str>;

    /// Remove every row from a table
    fn clear_table(&self, table: &str) -> String;

    /// Insert `rows` into `table` as one statement.
    ///
    /// Values missing from a row are inserted as NULL.
    fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<Statement>;

    /// Most rows one [`insert_batch`](Self::insert_batch) statement may carry
    fn max_rows_per_insert(&self, _column_count: usize) -> usize {
        usize::MAX
    }

    /// Move the table's `id` sequence so the next generated id is `max_id + 1`
    fn reset_sequence(&self, table: &str, max_id: i64) -> Option<Statement>;
}

/// Pick the adapter for a driver name such as `sqlite` or `postgres`
pub fn dialect_for(driver_name: &str) -> DbResult<Box<dyn DialectAdapter>> {
    match driver_name.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Ok(Box::new(SqliteDialect)),
        "postgres" | "postgresql" | "pgsql" => Ok(Box::new(PostgresDialect)),
        other => Err(DbError::UnsupportedDialect(other.to_string())),
    }
}

/// Bound-parameter ceiling of a SQLite statement (`SQLITE_MAX_VARIABLE_NUMBER`)
pub const SQLITE_MAX_VARIABLES: usize = 32766;

/// SQLite
///
/// `PRAGMA foreign_keys` is a no-op inside a transaction, so checks are
/// deferred to COMMIT instead. The pragma resets itself when the
/// transaction ends.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl DialectAdapter for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn disable_foreign_keys(&self) -> &'static str {
        "PRAGMA defer_foreign_keys = ON"
    }

    fn enable_foreign_keys(&self) -> Option<&'static str> {
        None
    }

    fn clear_table(&self, table: &str) -> String {
        format!("DELETE FROM {}", quote_identifier(table))
    }

    fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<Statement> {
        if columns.is_empty() {
            return Err(DbError::QueryFailed(format!(
                "cannot insert into {table} without columns"
            )));
        }

        let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
        let values = vec![placeholders.as_str(); rows.len()].join(", ");

        let params = rows
            .iter()
            .flat_map(|row| {
                columns
                    .iter()
                    .map(move |c| row.get(c).cloned().unwrap_or(Value::Null))
            })
            .collect();

        Ok(Statement::new(
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_identifier(table),
                quoted_list(columns),
                values
            ),
            params,
        ))
    }

    fn max_rows_per_insert(&self, column_count: usize) -> usize {
        (SQLITE_MAX_VARIABLES / column_count.max(1)).max(1)
    }

    fn reset_sequence(&self, _table: &str, _max_id: i64) -> Option<Statement> {
        // INTEGER PRIMARY KEY allocation follows max(rowid) on its own
        None
    }
}

/// PostgreSQL
///
/// Rows are shipped as one JSON document per batch and typed by the server
/// against the table's own row type.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl DialectAdapter for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn disable_foreign_keys(&self) -> &'static str {
        "SET session_replication_role = replica"
    }

    fn enable_foreign_keys(&self) -> Option<&'static str> {
        Some("SET session_replication_role = DEFAULT")
    }

    fn clear_table(&self, table: &str) -> String {
        format!("TRUNCATE TABLE {} CASCADE", quote_identifier(table))
    }

    fn insert_batch(&self, table: &str, columns: &[String], rows: &[Row]) -> DbResult<Statement> {
        if columns.is_empty() {
            return Err(DbError::QueryFailed(format!(
                "cannot insert into {table} without columns"
            )));
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mut record = serde_json::Map::with_capacity(columns.len());
            for column in columns {
                let value = row.get(column).unwrap_or(&Value::Null);
                let json = value.to_json().ok_or_else(|| {
                    DbError::ConversionFailed(format!(
                        "{table}.{column}: {} values cannot be restored",
                        value.type_name()
                    ))
                })?;
                record.insert(column.clone(), json);
            }
            records.push(serde_json::Value::Object(record));
        }

        let payload = serde_json::to_string(&records)?;
        let quoted_table = quote_identifier(table);
        let column_list = quoted_list(columns);

        Ok(Statement::new(
            format!(
                "INSERT INTO {quoted_table} ({column_list}) \
                 SELECT {column_list} FROM json_populate_recordset(NULL::{quoted_table}, $1::text::json)"
            ),
            vec![Value::Text(payload)],
        ))
    }

    fn reset_sequence(&self, table: &str, max_id: i64) -> Option<Statement> {
        Some(Statement::new(
            "SELECT setval(pg_get_serial_sequence($1, 'id'), $2, true)",
            vec![
                Value::Text(quote_identifier(table)),
                Value::Integer(max_id),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rows() -> Vec<Row> {
        vec![
            Row::from([
                ("id".to_string(), Value::Integer(1)),
                ("name".to_string(), Value::Text("Ada".into())),
            ]),
            Row::from([("id".to_string(), Value::Integer(2))]),
        ]
    }

    fn columns() -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    #[rstest]
    #[case("sqlite", "sqlite")]
    #[case("SQLite3", "sqlite")]
    #[case("postgres", "postgres")]
    #[case("postgresql", "postgres")]
    fn test_dialect_selection(#[case] driver: &str, #[case] expected: &str) {
        assert_eq!(dialect_for(driver).unwrap().name(), expected);
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        assert!(matches!(
            dialect_for("mysql"),
            Err(DbError::UnsupportedDialect(name)) if name == "mysql"
        ));
    }

    #[test]
    fn test_identifier_quoting() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[rstest]
    #[case(&SqliteDialect as &dyn DialectAdapter, "DELETE FROM \"users\"")]
    #[case(&PostgresDialect as &dyn DialectAdapter, "TRUNCATE TABLE \"users\" CASCADE")]
    fn test_clear_table(#[case] dialect: &dyn DialectAdapter, #[case] expected: &str) {
        assert_eq!(dialect.clear_table("users"), expected);
    }

    #[test]
    fn test_foreign_key_toggles() {
        assert_eq!(
            SqliteDialect.disable_foreign_keys(),
            "PRAGMA defer_foreign_keys = ON"
        );
        assert!(SqliteDialect.enable_foreign_keys().is_none());
        assert_eq!(
            PostgresDialect.disable_foreign_keys(),
            "SET session_replication_role = replica"
        );
        assert_eq!(
            PostgresDialect.enable_foreign_keys(),
            Some("SET session_replication_role = DEFAULT")
        );
    }

    #[test]
    fn test_sqlite_insert_fills_missing_columns_with_null() {
        let statement = SqliteDialect
            .insert_batch("users", &columns(), &rows())
            .unwrap();

        assert_eq!(
            statement.sql,
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (?, ?), (?, ?)"
        );
        assert_eq!(
            statement.params,
            vec![
                Value::Integer(1),
                Value::Text("Ada".into()),
                Value::Integer(2),
                Value::Null
            ]
        );
    }

    #[rstest]
    #[case(2, 16383)]
    #[case(400, 81)]
    #[case(32766, 1)]
    #[case(40000, 1)]
    fn test_sqlite_rows_per_insert_respect_variable_limit(
        #[case] columns: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(SqliteDialect.max_rows_per_insert(columns), expected);
    }

    #[test]
    fn test_postgres_rows_per_insert_unbounded() {
        assert_eq!(PostgresDialect.max_rows_per_insert(400), usize::MAX);
    }

    #[test]
    fn test_postgres_insert_uses_json_recordset() {
        let statement = PostgresDialect
            .insert_batch("users", &columns(), &rows())
            .unwrap();

        assert!(statement.sql.starts_with("INSERT INTO \"users\" (\"id\", \"name\") SELECT"));
        assert!(statement
            .sql
            .contains("json_populate_recordset(NULL::\"users\", $1::text::json)"));
        assert_eq!(
            statement.params,
            vec![Value::Text(
                r#"[{"id":1,"name":"Ada"},{"id":2,"name":null}]"#.to_string()
            )]
        );
    }

    #[test]
    fn test_postgres_insert_rejects_blobs() {
        let rows = vec![Row::from([("data".to_string(), Value::Blob(vec![1]))])];
        let err = PostgresDialect
            .insert_batch("files", &["data".to_string()], &rows)
            .unwrap_err();
        assert!(matches!(err, DbError::ConversionFailed(_)));
    }

    #[test]
    fn test_sequence_reset() {
        assert!(SqliteDialect.reset_sequence("users", 10).is_none());

        let statement = PostgresDialect.reset_sequence("users", 10).unwrap();
        assert_eq!(
            statement.sql,
            "SELECT setval(pg_get_serial_sequence($1, 'id'), $2, true)"
        );
        assert_eq!(
            statement.params,
            vec![Value::Text("\"users\"".into()), Value::Integer(10)]
        );
    }

    #[test]
    fn test_insert_without_columns_fails() {
        assert!(SqliteDialect.insert_batch("t", &[], &rows()).is_err());
    }
}
