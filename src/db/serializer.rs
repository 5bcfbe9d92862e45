//! Schema-agnostic query-to-JSON serialization.
//!
//! Column names and types are discovered from each result at run time, so
//! any query can be rendered as a JSON array of objects.

use std::time::Instant;

use serde_json::{Map, Value};
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::{Column, Row};
use tracing::{debug, instrument, warn};

use crate::db::value::{decode_cell, Cell};
use crate::error::QueryError;
use crate::metrics;

/// One row rendered as a JSON object, keys in column order.
pub type RowRecord = Map<String, Value>;

/// Column headers plus positionally aligned rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl ResultSet {
    /// Create an empty result set with the given headers.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. Its width must match the header.
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), QueryError> {
        if row.len() != self.columns.len() {
            return Err(QueryError::Encode(format!(
                "row has {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build from fetched MySQL rows, reading headers from the row metadata.
    ///
    /// Every MySQL row carries the full column list of its result, so the
    /// first row supplies the headers. Zero rows yield no headers, which
    /// still renders as `[]`, and no extra describe round trip is made.
    pub fn from_mysql_rows(rows: &[MySqlRow]) -> Result<Self, QueryError> {
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut set = Self::new(columns);
        for row in rows {
            let count = row.columns().len();
            let mut cells = Vec::with_capacity(count);
            for index in 0..count {
                cells.push(decode_cell(row, index)?);
            }
            set.push_row(cells)?;
        }
        Ok(set)
    }

    /// Column names in order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render every row as a record.
    ///
    /// A repeated column name keeps its first position and the last value.
    pub fn records(&self) -> Result<Vec<RowRecord>, QueryError> {
        self.rows
            .iter()
            .map(|row| -> Result<RowRecord, QueryError> {
                let mut record = RowRecord::with_capacity(self.columns.len());
                for (name, cell) in self.columns.iter().zip(row) {
                    record.insert(name.clone(), cell.to_json()?);
                }
                Ok(record)
            })
            .collect()
    }

    /// Render as a JSON array string. Zero rows yield `[]`.
    pub fn to_json(&self) -> Result<String, QueryError> {
        let records = self.records()?;
        serde_json::to_string(&records).map_err(|e| QueryError::Encode(e.to_string()))
    }
}

/// Run `sql` and return the result as a JSON array of objects.
///
/// The statement text is sent as-is with no bound parameters. Only pass
/// fixed, trusted queries; anything built from request input needs a
/// parameterized query instead.
#[instrument(skip(pool))]
pub async fn query_json(pool: &MySqlPool, sql: &str) -> Result<String, QueryError> {
    let start = Instant::now();

    let result: Result<String, QueryError> = async {
        let rows = sqlx::query(sql).fetch_all(pool).await?;
        let set = ResultSet::from_mysql_rows(&rows)?;
        debug!(rows = set.len(), columns = set.columns().len(), "Query returned");
        set.to_json()
    }
    .await;

    metrics::record_query_latency(start);
    if let Err(e) = &result {
        warn!(error = %e, "Query serialization failed");
        metrics::inc_query_failures();
    }
    result
}
