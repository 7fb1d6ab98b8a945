//! In-memory representation of a full database snapshot

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::value::Row;

/// Current backup format version
pub const FORMAT_VERSION: u32 = 1;

/// Snapshot metadata stored alongside the table data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMeta {
    pub version: u32,
    /// ISO-8601 creation timestamp
    pub created_at: String,
    /// Included table names, sorted
    pub tables: Vec<String>,
    pub table_count: usize,
    #[serde(default)]
    pub row_count: u64,
}

/// A full snapshot: metadata plus every row of every included table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupBlob {
    pub meta: BackupMeta,
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl BackupBlob {
    /// Build a blob from table data, deriving the metadata from it
    pub fn new(tables: BTreeMap<String, Vec<Row>>) -> Self {
        Self::with_created_at(tables, Utc::now())
    }

    pub fn with_created_at(tables: BTreeMap<String, Vec<Row>>, created_at: DateTime<Utc>) -> Self {
        let names: Vec<String> = tables.keys().cloned().collect();
        let row_count = tables.values().map(|rows| rows.len() as u64).sum();

        Self {
            meta: BackupMeta {
                version: FORMAT_VERSION,
                created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                table_count: names.len(),
                tables: names,
                row_count,
            },
            tables,
        }
    }

    /// Number of rows across all tables
    pub fn row_count(&self) -> u64 {
        self.tables.values().map(|rows| rows.len() as u64).sum()
    }

    /// True when `tables` keys match `meta.tables` as sets
    pub fn is_consistent(&self) -> bool {
        let mut listed = self.meta.tables.clone();
        listed.sort();
        listed.dedup();
        listed.len() == self.tables.len() && listed.iter().all(|t| self.tables.contains_key(t))
    }
}
