//! Tabular backends feeding records into the mapper and PII detector
//!
//! A [`Table`] is an in-memory, row-oriented set of JSON records with a stable
//! column order. A [`Backend`] knows how to read and write tables for one file
//! format; the column operations have default implementations over [`Table`].

pub mod json;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

use crate::domain::{ColumnMetadata, DataType, EhrglotError, Result, SchemaDefinition};

pub use json::JsonBackend;

/// Row-oriented table with columns in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Map<String, Value>>,
}

impl Table {
    /// Build a table from JSON records
    ///
    /// Non-object records cannot be addressed by column and are skipped.
    pub fn from_records(records: Vec<Value>) -> Self {
        let mut table = Table::default();
        for record in records {
            match record {
                Value::Object(map) => table.push_row(map),
                other => {
                    tracing::warn!(kind = %json_kind(&other), "Skipping non-object record");
                }
            }
        }
        table
    }

    fn push_row(&mut self, row: Map<String, Value>) {
        for key in row.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, with nulls where a row lacks it
    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn to_records(&self) -> Vec<Value> {
        self.rows.iter().cloned().map(Value::Object).collect()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Logical type of a single JSON value
pub fn infer_value_type(value: &Value) -> Option<DataType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(DataType::Boolean),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(DataType::Integer),
        Value::Number(_) => Some(DataType::Float),
        Value::String(s) => {
            if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() {
                Some(DataType::Date)
            } else if DateTime::parse_from_rfc3339(s).is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
            {
                Some(DataType::Datetime)
            } else {
                Some(DataType::String)
            }
        }
        Value::Array(_) => Some(DataType::Array),
        Value::Object(_) => Some(DataType::Object),
    }
}

/// Logical type of a column from its non-null values
///
/// Integers mixed with floats widen to float; any other mix, or an all-null
/// column, is a string.
pub fn infer_column_type(values: &[Value]) -> DataType {
    let mut seen: Option<DataType> = None;
    for ty in values.iter().filter_map(infer_value_type) {
        seen = match (seen, ty) {
            (None, t) => Some(t),
            (Some(a), b) if a == b => Some(a),
            (Some(DataType::Integer), DataType::Float)
            | (Some(DataType::Float), DataType::Integer) => Some(DataType::Float),
            _ => return DataType::String,
        };
    }
    seen.unwrap_or(DataType::String)
}

/// A file format that tables can be read from and written to
pub trait Backend: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    fn read(&self, path: &Path) -> Result<Table>;

    fn write(&self, table: &Table, path: &Path) -> Result<()>;

    /// Untagged schema with inferred column types
    fn get_schema(&self, table: &Table) -> SchemaDefinition {
        let columns = table
            .columns()
            .iter()
            .map(|name| {
                let values = table.column_values(name);
                let nullable = values.iter().any(Value::is_null);
                ColumnMetadata::new(name.clone(), infer_column_type(&values))
                    .with_nullable(nullable)
            })
            .collect();
        SchemaDefinition::new(self.name(), columns)
    }

    fn to_records(&self, table: &Table) -> Vec<Value> {
        table.to_records()
    }

    fn from_records(&self, records: Vec<Value>) -> Table {
        Table::from_records(records)
    }

    fn select_columns(&self, table: &Table, columns: &[&str]) -> Result<Table> {
        let known = table.columns();
        if let Some(missing) = columns.iter().find(|c| !known.iter().any(|t| t == *c)) {
            return Err(EhrglotError::Validation(format!("Column not found: {missing}")));
        }

        let records = table
            .rows()
            .iter()
            .map(|row| {
                let selected: Map<String, Value> = columns
                    .iter()
                    .filter_map(|c| row.get(*c).map(|v| (c.to_string(), v.clone())))
                    .collect();
                Value::Object(selected)
            })
            .collect();
        Ok(Table::from_records(records))
    }

    fn rename_columns(&self, table: &Table, renames: &HashMap<String, String>) -> Table {
        let records = table
            .rows()
            .iter()
            .map(|row| {
                let renamed: Map<String, Value> = row
                    .iter()
                    .map(|(k, v)| {
                        let name = renames.get(k).cloned().unwrap_or_else(|| k.clone());
                        (name, v.clone())
                    })
                    .collect();
                Value::Object(renamed)
            })
            .collect();
        Table::from_records(records)
    }

    /// First `n` rows
    fn sample(&self, table: &Table, n: usize) -> Table {
        Table::from_records(table.to_records().into_iter().take(n).collect())
    }

    fn column_values(&self, table: &Table, column: &str) -> Vec<Value> {
        table.column_values(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patients() -> Table {
        Table::from_records(vec![
            json!({"PAT_ID": 1, "NAME": "Ann", "DOB": "1980-01-02"}),
            json!({"PAT_ID": 2, "NAME": "Bob", "WEIGHT": 70.5}),
            json!("not a row"),
            json!({"PAT_ID": 3, "NAME": null, "WEIGHT": 81}),
        ])
    }

    #[test]
    fn test_table_columns_in_first_seen_order() {
        let table = patients();
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns(), &["PAT_ID", "NAME", "DOB", "WEIGHT"]);
        assert_eq!(
            table.column_values("DOB"),
            vec![json!("1980-01-02"), json!(null), json!(null)]
        );
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type(&[json!(1), json!(2)]), DataType::Integer);
        assert_eq!(infer_column_type(&[json!(1), json!(2.5)]), DataType::Float);
        assert_eq!(infer_column_type(&[json!("2024-01-01"), json!(null)]), DataType::Date);
        assert_eq!(infer_column_type(&[json!("2024-01-01T10:00:00Z")]), DataType::Datetime);
        assert_eq!(infer_column_type(&[json!(1), json!("x")]), DataType::String);
        assert_eq!(infer_column_type(&[json!(null)]), DataType::String);
    }

    #[test]
    fn test_default_schema_and_column_ops() {
        let backend = JsonBackend::new();
        let table = patients();

        let schema = backend.get_schema(&table);
        assert_eq!(schema.column_names(), vec!["PAT_ID", "NAME", "DOB", "WEIGHT"]);
        assert_eq!(schema.column("WEIGHT").map(|c| c.data_type), Some(DataType::Float));
        assert_eq!(schema.column("PAT_ID").map(|c| c.nullable), Some(false));

        let selected = backend.select_columns(&table, &["PAT_ID"]).unwrap();
        assert_eq!(selected.columns(), &["PAT_ID"]);
        assert!(backend.select_columns(&table, &["NOPE"]).is_err());

        let renames = HashMap::from([("PAT_ID".to_string(), "id".to_string())]);
        let renamed = backend.rename_columns(&table, &renames);
        assert_eq!(renamed.columns()[0], "id");

        assert_eq!(backend.sample(&table, 2).len(), 2);
        assert_eq!(backend.sample(&table, 10).len(), 3);
    }
}
