//! Per-table row readers used by export
//!
//! Most tables are read with a plain `SELECT *`. Tables whose driver
//! representation needs normalizing (booleans stored as integers, timestamps
//! as epoch seconds, ...) register a [`TypedTableReader`] instead.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strongbox_core::{Row, Value};

use crate::Database;
use crate::dialect::quote_identifier;
use crate::error::{DbError, DbResult};

/// Reads every row of one table
#[async_trait]
pub trait TableReader: Send + Sync {
    async fn read_all(&self, db: &dyn Database, table: &str) -> DbResult<Vec<Row>>;
}

/// Fallback reader: `SELECT * FROM table`, values as the driver returns them
#[derive(Debug, Clone, Copy, Default)]
pub struct RawSqlTableReader;

#[async_trait]
impl TableReader for RawSqlTableReader {
    async fn read_all(&self, db: &dyn Database, table: &str) -> DbResult<Vec<Row>> {
        db.query(&format!("SELECT * FROM {}", quote_identifier(table)), &[])
            .await
    }
}

/// Declared type of a column, used to normalize driver values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Boolean,
    Integer,
    Real,
    Text,
    /// JSON document, archived as its serialized text
    Json,
    /// Archived as an RFC 3339 string
    Timestamp,
}

impl ColumnType {
    /// Normalize a driver value to this column type
    pub fn coerce(&self, column: &str, value: Value) -> DbResult<Value> {
        let mismatch = |value: &Value| {
            DbError::ConversionFailed(format!(
                "column {column}: cannot read {} as {:?}",
                value.type_name(),
                self
            ))
        };

        if value.is_null() {
            return Ok(Value::Null);
        }

        Ok(match (self, value) {
            (ColumnType::Boolean, Value::Bool(b)) => Value::Bool(b),
            (ColumnType::Boolean, Value::Integer(i)) => Value::Bool(i != 0),
            (ColumnType::Boolean, Value::Text(s)) => match s.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "yes" | "on" => Value::Bool(true),
                "0" | "f" | "false" | "no" | "off" => Value::Bool(false),
                _ => return Err(mismatch(&Value::Text(s))),
            },

            (ColumnType::Integer, Value::Integer(i)) => Value::Integer(i),
            (ColumnType::Integer, Value::Bool(b)) => Value::Integer(i64::from(b)),
            (ColumnType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },

            (ColumnType::Real, Value::Real(f)) => Value::Real(f),
            (ColumnType::Real, Value::Integer(i)) => Value::Real(i as f64),
            (ColumnType::Real, Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Value::Real(f),
                Err(_) => return Err(mismatch(&Value::Text(s))),
            },

            (ColumnType::Text, Value::Text(s)) => Value::Text(s),
            (ColumnType::Text, Value::Integer(i)) => Value::Text(i.to_string()),
            (ColumnType::Text, Value::Real(f)) => Value::Text(f.to_string()),
            (ColumnType::Text, Value::Bool(b)) => Value::Text(b.to_string()),
            (ColumnType::Text, Value::Blob(bytes)) => match String::from_utf8(bytes) {
                Ok(s) => Value::Text(s),
                Err(e) => return Err(mismatch(&Value::Blob(e.into_bytes()))),
            },

            (ColumnType::Json, Value::Text(s)) => {
                // Validate, then keep the original text
                serde_json::from_str::<serde_json::Value>(&s)?;
                Value::Text(s)
            }
            (ColumnType::Json, other @ (Value::Bool(_) | Value::Integer(_) | Value::Real(_))) => {
                match other.to_json() {
                    Some(json) => Value::Text(json.to_string()),
                    None => return Err(mismatch(&other)),
                }
            }

            (ColumnType::Timestamp, Value::Text(s)) => Value::Text(s),
            (ColumnType::Timestamp, Value::Integer(secs)) => {
                match DateTime::<Utc>::from_timestamp(secs, 0) {
                    Some(ts) => Value::Text(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
                    None => return Err(mismatch(&Value::Integer(secs))),
                }
            }

            (_, other) => return Err(mismatch(&other)),
        })
    }
}

/// Reader for a table with a declared column list
#[derive(Debug, Clone, Default)]
pub struct TypedTableReader {
    columns: Vec<(String, ColumnType)>,
}

impl TypedTableReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push((name.into(), column_type));
        self
    }

    pub fn columns(&self) -> &[(String, ColumnType)] {
        &self.columns
    }
}

#[async_trait]
impl TableReader for TypedTableReader {
    async fn read_all(&self, db: &dyn Database, table: &str) -> DbResult<Vec<Row>> {
        if self.columns.is_empty() {
            return RawSqlTableReader.read_all(db, table).await;
        }

        let column_list = self
            .columns
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        let raw = db
            .query(
                &format!("SELECT {column_list} FROM {}", quote_identifier(table)),
                &[],
            )
            .await?;

        raw.into_iter()
            .map(|mut row| {
                let mut typed = Row::new();
                for (name, column_type) in &self.columns {
                    let value = row.remove(name).unwrap_or_default();
                    typed.insert(name.clone(), column_type.coerce(name, value)?);
                }
                Ok(typed)
            })
            .collect()
    }
}

/// Table name to reader lookup, with a raw `SELECT *` fallback
#[derive(Clone, Default)]
pub struct TableReaderRegistry {
    readers: HashMap<String, Arc<dyn TableReader>>,
    fallback: RawSqlTableReader,
}

impl std::fmt::Debug for TableReaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tables: Vec<_> = self.readers.keys().collect();
        tables.sort();
        f.debug_struct("TableReaderRegistry")
            .field("tables", &tables)
            .finish()
    }
}

impl TableReaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, table: impl Into<String>, reader: Arc<dyn TableReader>) {
        self.readers.insert(table.into(), reader);
    }

    pub fn with_reader(mut self, table: impl Into<String>, reader: Arc<dyn TableReader>) -> Self {
        self.register(table, reader);
        self
    }

    pub fn has_reader(&self, table: &str) -> bool {
        self.readers.contains_key(table)
    }

    /// The registered reader for `table`, or the raw reader
    pub fn reader_for(&self, table: &str) -> &dyn TableReader {
        match self.readers.get(table) {
            Some(reader) => reader.as_ref(),
            None => &self.fallback,
        }
    }
}
