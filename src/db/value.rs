//! Tagged cell values decoded from MySQL rows.

use serde_json::{Number, Value};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

use crate::error::QueryError;

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// SQL NULL.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// Boolean (`TINYINT(1)`).
    Bool(bool),
    /// Character data.
    Text(String),
    /// Raw bytes. Rendered as (lossy) text, never base64.
    Bytes(Vec<u8>),
}

impl Cell {
    /// Convert to a JSON value.
    ///
    /// Bytes are decoded as text. Non-finite floats have no JSON form and fail.
    pub fn to_json(&self) -> Result<Value, QueryError> {
        Ok(match self {
            Cell::Null => Value::Null,
            Cell::Int(v) => Value::from(*v),
            Cell::UInt(v) => Value::from(*v),
            Cell::Float(v) => Number::from_f64(*v)
                .map(Value::Number)
                .ok_or_else(|| QueryError::Encode(format!("unsupported float value {v}")))?,
            Cell::Bool(v) => Value::Bool(*v),
            Cell::Text(v) => Value::String(v.clone()),
            Cell::Bytes(v) => Value::String(String::from_utf8_lossy(v).into_owned()),
        })
    }
}

/// How a MySQL column type is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Bool,
    Int,
    UInt,
    Year,
    Float,
    Double,
    Text,
    Date,
    Time,
    DateTime,
    Bytes,
}

/// Pick a decoding strategy from the type name sqlx reports.
pub fn classify(type_name: &str) -> CellKind {
    match type_name {
        "BOOLEAN" => CellKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => CellKind::Int,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => CellKind::UInt,
        "YEAR" => CellKind::Year,
        "FLOAT" => CellKind::Float,
        "DOUBLE" => CellKind::Double,
        "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => CellKind::Text,
        "DATE" => CellKind::Date,
        "TIME" => CellKind::Time,
        "DATETIME" | "TIMESTAMP" => CellKind::DateTime,
        // DECIMAL, JSON, ENUM, SET, BIT and the binary/blob family
        _ => CellKind::Bytes,
    }
}

/// Decode the cell at `index` of `row`.
pub fn decode_cell(row: &MySqlRow, index: usize) -> Result<Cell, QueryError> {
    let column = row.column(index).name().to_string();
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Cell::Null);
    }
    let kind = classify(raw.type_info().name());

    let decode_err = |e: sqlx::Error| QueryError::Decode {
        column: column.clone(),
        reason: e.to_string(),
    };

    let cell = match kind {
        CellKind::Bool => Cell::Bool(row.try_get::<bool, _>(index).map_err(decode_err)?),
        CellKind::Int => Cell::Int(row.try_get::<i64, _>(index).map_err(decode_err)?),
        CellKind::UInt => Cell::UInt(row.try_get::<u64, _>(index).map_err(decode_err)?),
        CellKind::Year => Cell::UInt(u64::from(
            row.try_get_unchecked::<u16, _>(index).map_err(decode_err)?,
        )),
        CellKind::Float => Cell::Float(f64::from(
            row.try_get::<f32, _>(index).map_err(decode_err)?,
        )),
        CellKind::Double => Cell::Float(row.try_get::<f64, _>(index).map_err(decode_err)?),
        CellKind::Text => Cell::Text(row.try_get::<String, _>(index).map_err(decode_err)?),
        CellKind::Date => match row.try_get::<chrono::NaiveDate, _>(index) {
            Ok(date) => Cell::Text(date.format("%Y-%m-%d").to_string()),
            Err(e) => zero_date_or(row, index, ZERO_DATE, e).map_err(decode_err)?,
        },
        // Signed, up to 838 hours
        CellKind::Time => Cell::Text(
            row.try_get::<MySqlTime, _>(index)
                .map_err(decode_err)?
                .to_string(),
        ),
        CellKind::DateTime => match row.try_get::<chrono::NaiveDateTime, _>(index) {
            Ok(datetime) => Cell::Text(datetime.format("%Y-%m-%d %H:%M:%S").to_string()),
            Err(e) => zero_date_or(row, index, ZERO_DATETIME, e).map_err(decode_err)?,
        },
        CellKind::Bytes => Cell::Bytes(
            row.try_get_unchecked::<Vec<u8>, _>(index)
                .map_err(decode_err)?,
        ),
    };

    Ok(cell)
}

/// MySQL's zero `DATE`, which chrono cannot represent.
const ZERO_DATE: &str = "0000-00-00";
/// MySQL's zero `DATETIME` / `TIMESTAMP`.
const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

/// Render a zero date as text, or hand back the original decode error.
fn zero_date_or(
    row: &MySqlRow,
    index: usize,
    zero: &str,
    err: sqlx::Error,
) -> Result<Cell, sqlx::Error> {
    let bytes = row.try_get_unchecked::<Vec<u8>, _>(index)?;
    if is_zero_date(&bytes) {
        Ok(Cell::Text(zero.to_string()))
    } else {
        Err(err)
    }
}

/// Whether raw date bytes hold the zero date, in text or binary form.
fn is_zero_date(bytes: &[u8]) -> bool {
    if bytes.starts_with(ZERO_DATE.as_bytes()) {
        return true;
    }
    // Binary values start with a length byte; the zero date has no fields set.
    match bytes.split_first() {
        Some((_, fields)) => fields.iter().all(|b| *b == 0),
        None => true,
    }
}
