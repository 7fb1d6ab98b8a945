//! PostgreSQL adapter backed by a single tokio-postgres client
//!
//! Reads go through `row_to_json` so the server does the type mapping and
//! every column arrives as a JSON scalar (or nested document, kept as text).
//! Numbers are taken from their literal text, so NUMERIC columns keep every
//! digit.

mod config;
mod value;

pub use config::PostgresConfig;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::value::RawValue;
use strongbox_core::{Row, Value};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::Database;
use crate::error::{DbError, DbResult};
use value::PgValue;

/// A PostgreSQL database reached over one connection
pub struct PostgresDatabase {
    client: Client,
}

impl std::fmt::Debug for PostgresDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDatabase").finish_non_exhaustive()
    }
}

impl PostgresDatabase {
    /// Connect and spawn the connection driver task
    pub async fn connect(config: &PostgresConfig) -> DbResult<Self> {
        config.validate()?;

        let (client, connection) = config
            .build_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        tracing::info!(
            host = %config.host,
            database = %config.database,
            "Connected to PostgreSQL"
        );
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn bind(params: &[Value]) -> Vec<PgValue<'_>> {
    params.iter().map(PgValue).collect()
}

fn as_refs<'a>(bound: &'a [PgValue<'a>]) -> Vec<&'a (dyn ToSql + Sync)> {
    bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

/// Wrap a query so each result row comes back as one JSON text column
fn json_rows_query(sql: &str) -> String {
    format!(
        "SELECT row_to_json(q)::text FROM ({}) q",
        sql.trim().trim_end_matches(';')
    )
}

fn parse_json_row(text: &str) -> DbResult<Row> {
    let columns: BTreeMap<String, Box<RawValue>> = serde_json::from_str(text)
        .map_err(|e| DbError::ConversionFailed(format!("expected a JSON object row: {e}")))?;

    columns
        .into_iter()
        .map(|(column, raw)| Ok((column, column_value(&raw)?)))
        .collect()
}

fn column_value(raw: &RawValue) -> DbResult<Value> {
    let literal = raw.get();
    if literal.starts_with(|c: char| c == '-' || c.is_ascii_digit()) {
        return Ok(Value::from_number_text(literal));
    }
    Ok(Value::from_json(serde_json::from_str(literal)?))
}

#[async_trait]
impl Database for PostgresDatabase {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[],
            )
            .await?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(DbError::from))
            .collect()
    }

    async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let bound = bind(params);
        let wrapped = json_rows_query(sql);
        let rows = self
            .client
            .query(wrapped.as_str(), &as_refs(&bound))
            .await?;

        rows.iter()
            .map(|row| {
                let text: String = row.try_get(0)?;
                parse_json_row(&text)
            })
            .collect()
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let bound = bind(params);
        Ok(self.client.execute(sql, &as_refs(&bound)).await?)
    }

    async fn begin(&self) -> DbResult<()> {
        self.client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    async fn commit(&self) -> DbResult<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    async fn rollback(&self) -> DbResult<()> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rows_query() {
        assert_eq!(
            json_rows_query("SELECT * FROM \"users\";"),
            "SELECT row_to_json(q)::text FROM (SELECT * FROM \"users\") q"
        );
    }

    #[test]
    fn test_parse_json_row() {
        let row = parse_json_row(r#"{"id": 1, "tags": ["a"], "deleted_at": null}"#).unwrap();
        assert_eq!(row["id"], Value::Integer(1));
        assert_eq!(row["tags"], Value::Text(r#"["a"]"#.into()));
        assert!(row["deleted_at"].is_null());

        assert!(parse_json_row("[1, 2]").is_err());
    }

    #[test]
    fn test_parse_json_row_keeps_numeric_digits() {
        let row =
            parse_json_row(r#"{"amount": 12345678901234567.89, "rate": 0.25, "qty": -3}"#).unwrap();
        assert_eq!(row["amount"], Value::Text("12345678901234567.89".into()));
        assert_eq!(row["rate"], Value::Real(0.25));
        assert_eq!(row["qty"], Value::Integer(-3));
    }
}
