//! Document → relational row mapping for the export path.
//!
//! A [`TableMapping`] names the destination table, its key column, and an
//! ordered list of [`FieldMapping`]s. Each mapping pulls one value out of
//! a stored document through a [`FieldPath`] and converts it to the
//! column's declared type.

use std::str::FromStr;

use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::field_path::FieldPath;
use crate::models::StoredRecord;
use crate::normalize::parse_timestamp;

/// Text columns without an explicit length are capped at this many characters.
pub const DEFAULT_TEXT_LIMIT: usize = 4000;

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

/// Declared column type, parsed from strings like `VARCHAR2(200)` or `NUMBER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text { max_len: usize },
    Number,
    Date,
}

impl ColumnType {
    /// SQLite column affinity used when creating the destination table.
    pub fn sqlite_affinity(&self) -> &'static str {
        match self {
            ColumnType::Text { .. } | ColumnType::Date => "TEXT",
            ColumnType::Number => "NUMERIC",
        }
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let (name, arg) = match upper.split_once('(') {
            Some((name, rest)) => (
                name.trim(),
                Some(
                    rest.strip_suffix(')')
                        .ok_or_else(|| format!("unclosed type argument in '{}'", s))?
                        .trim(),
                ),
            ),
            None => (upper.as_str(), None),
        };
        match name {
            "VARCHAR2" | "VARCHAR" | "NVARCHAR2" | "CHAR" | "TEXT" | "CLOB" => {
                let max_len = match arg {
                    Some(n) => n
                        .split_whitespace()
                        .next()
                        .and_then(|n| n.parse::<usize>().ok())
                        .filter(|n| *n > 0)
                        .ok_or_else(|| format!("invalid length in '{}'", s))?,
                    None => DEFAULT_TEXT_LIMIT,
                };
                Ok(ColumnType::Text { max_len })
            }
            "NUMBER" | "INTEGER" | "INT" | "FLOAT" | "REAL" | "NUMERIC" => Ok(ColumnType::Number),
            "DATE" | "TIMESTAMP" => Ok(ColumnType::Date),
            _ => Err(format!("unsupported column type '{}'", s)),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One source path → one destination column.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub path: FieldPath,
    pub column: String,
    pub data_type: ColumnType,
}

impl FieldMapping {
    pub fn extract(&self, doc: &Value) -> std::result::Result<SqlValue, String> {
        match self.path.resolve(doc) {
            None => Ok(SqlValue::Null),
            Some(v) => convert(v, self.data_type),
        }
    }
}

fn convert(value: &Value, ty: ColumnType) -> std::result::Result<SqlValue, String> {
    match ty {
        ColumnType::Text { max_len } => {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(SqlValue::Text(truncate_chars(text, max_len)))
        }
        ColumnType::Number => match value {
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(n.as_f64().unwrap_or_default()),
            }),
            Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Ok(SqlValue::Integer(i))
                } else if let Ok(f) = s.parse::<f64>() {
                    Ok(SqlValue::Real(f))
                } else {
                    Err(format!("'{}' is not a number", s))
                }
            }
            other => Err(format!("cannot store {} in a numeric column", other)),
        },
        ColumnType::Date => parse_timestamp(value)
            .map(|dt| SqlValue::Text(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .ok_or_else(|| format!("'{}' is not a timestamp", value)),
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s,
    }
}

/// An ordered set of column values for one destination row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Identifier of the document the row came from.
    pub source_id: String,
    pub values: Vec<SqlValue>,
}

/// Destination table layout for one export.
#[derive(Debug, Clone)]
pub struct TableMapping {
    pub table: String,
    pub key_column: String,
    pub fields: Vec<FieldMapping>,
}

impl TableMapping {
    /// Check identifiers and that the key column is mapped exactly once.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !is_sql_identifier(&self.table) {
            return Err(format!("invalid table name '{}'", self.table));
        }
        if self.fields.is_empty() {
            return Err(format!("export to '{}' maps no fields", self.table));
        }
        let mut seen = std::collections::HashSet::new();
        for f in &self.fields {
            if !is_sql_identifier(&f.column) {
                return Err(format!("invalid column name '{}'", f.column));
            }
            if !seen.insert(f.column.to_ascii_uppercase()) {
                return Err(format!("column '{}' is mapped twice", f.column));
            }
        }
        if self.key_index().is_none() {
            return Err(format!(
                "key column '{}' is not among the mapped columns",
                self.key_column
            ));
        }
        Ok(())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.column.as_str())
    }

    pub fn key_index(&self) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.column.eq_ignore_ascii_case(&self.key_column))
    }

    /// Map a stored document to a row.
    ///
    /// Fails when a value cannot be converted to its column type or the
    /// key column resolves to nothing.
    pub fn map_record(&self, record: &StoredRecord) -> Result<Row> {
        let doc = Value::Object(record.payload.clone());
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let v = field.extract(&doc).map_err(|e| {
                SyncError::InvalidRecord(format!("{} ({}): {}", record.id, field.column, e))
            })?;
            values.push(v);
        }
        if let Some(k) = self.key_index() {
            if values[k] == SqlValue::Null {
                return Err(SyncError::InvalidRecord(format!(
                    "{}: key column {} is empty",
                    record.id, self.key_column
                )));
            }
        }
        Ok(Row {
            source_id: record.id.clone(),
            values,
        })
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, the only names spliced into SQL text.
pub fn is_sql_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use chrono::DateTime;
    use serde_json::json;

    fn field(path: &str, column: &str, ty: &str) -> FieldMapping {
        FieldMapping {
            path: path.parse().unwrap(),
            column: column.into(),
            data_type: ty.parse().unwrap(),
        }
    }

    fn stored(v: Value) -> StoredRecord {
        StoredRecord::inserted(
            Record::from_value(v, "_id").unwrap(),
            DateTime::from_timestamp(0, 0).unwrap(),
        )
    }

    fn mapping() -> TableMapping {
        TableMapping {
            table: "ACTIVITY".into(),
            key_column: "ID".into(),
            fields: vec![
                field("_id", "ID", "VARCHAR2(64)"),
                field("stats.views", "VIEWS", "NUMBER"),
                field("tags[0]", "FIRST_TAG", "VARCHAR2(3)"),
                field("updated_at", "UPDATED_AT", "DATE"),
            ],
        }
    }

    #[test]
    fn parses_column_types() {
        assert_eq!(
            "varchar2(200)".parse::<ColumnType>(),
            Ok(ColumnType::Text { max_len: 200 })
        );
        assert_eq!(
            "VARCHAR2(100 CHAR)".parse::<ColumnType>(),
            Ok(ColumnType::Text { max_len: 100 })
        );
        assert_eq!(
            "CLOB".parse::<ColumnType>(),
            Ok(ColumnType::Text { max_len: DEFAULT_TEXT_LIMIT })
        );
        assert_eq!("NUMBER".parse::<ColumnType>(), Ok(ColumnType::Number));
        assert!("BLOB".parse::<ColumnType>().is_err());
        assert!("VARCHAR2(0)".parse::<ColumnType>().is_err());
    }

    #[test]
    fn maps_record_to_row() {
        let row = mapping()
            .map_record(&stored(json!({
                "_id": "A1",
                "stats": {"views": "12"},
                "tags": ["summer", "beach"],
                "updated_at": "2024-05-01T12:00:00+02:00"
            })))
            .unwrap();
        assert_eq!(
            row.values,
            vec![
                SqlValue::Text("A1".into()),
                SqlValue::Integer(12),
                SqlValue::Text("sum".into()),
                SqlValue::Text("2024-05-01T10:00:00Z".into()),
            ]
        );
    }

    #[test]
    fn missing_paths_become_null() {
        let row = mapping().map_record(&stored(json!({"_id": "A1"}))).unwrap();
        assert_eq!(row.values[1], SqlValue::Null);
        assert_eq!(row.values[2], SqlValue::Null);
    }

    #[test]
    fn unconvertible_value_is_rejected() {
        let err = mapping()
            .map_record(&stored(json!({"_id": "A1", "stats": {"views": "many"}})))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord(_)));
    }

    #[test]
    fn validate_requires_mapped_key_and_identifiers() {
        let mut m = mapping();
        assert!(m.validate().is_ok());
        m.key_column = "PK".into();
        assert!(m.validate().is_err());

        let mut m = mapping();
        m.table = "ACTIVITY; DROP TABLE x".into();
        assert!(m.validate().is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo".into(), 2), "hé");
        assert_eq!(truncate_chars("hi".into(), 5), "hi");
    }
}
