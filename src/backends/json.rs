//! JSON and newline-delimited JSON backend

use serde_json::Value;
use std::fs;
use std::path::Path;

use super::{Backend, Table};
use crate::domain::{EhrglotError, Result};

/// Reads a JSON array, a single JSON object, or NDJSON (`.jsonl`/`.ndjson`)
#[derive(Debug, Default, Clone)]
pub struct JsonBackend;

impl JsonBackend {
    pub fn new() -> Self {
        Self
    }

    fn is_line_delimited(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("jsonl") | Some("ndjson")
        )
    }
}

impl Backend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn read(&self, path: &Path) -> Result<Table> {
        let content = fs::read_to_string(path).map_err(|e| {
            EhrglotError::Io(format!("Failed to read {}: {e}", path.display()))
        })?;

        let records = if Self::is_line_delimited(path) {
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str::<Value>)
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            match serde_json::from_str::<Value>(&content)? {
                Value::Array(items) => items,
                single => vec![single],
            }
        };

        tracing::debug!(path = %path.display(), records = records.len(), "Read JSON records");
        Ok(Table::from_records(records))
    }

    fn write(&self, table: &Table, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let body = if Self::is_line_delimited(path) {
            let mut out = String::new();
            for record in table.to_records() {
                out.push_str(&serde_json::to_string(&record)?);
                out.push('\n');
            }
            out
        } else {
            serde_json::to_string_pretty(&Value::Array(table.to_records()))?
        };

        fs::write(path, body)?;
        tracing::debug!(path = %path.display(), records = table.len(), "Wrote JSON records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_read_array_and_ndjson() {
        let dir = tempdir().unwrap();
        let array_path = dir.path().join("rows.json");
        fs::write(&array_path, r#"[{"a": 1}, {"a": 2, "b": "x"}]"#).unwrap();
        let ndjson_path = dir.path().join("rows.jsonl");
        fs::write(&ndjson_path, "{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();

        let backend = JsonBackend::new();
        let table = backend.read(&array_path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), &["a", "b"]);

        let table = backend.read(&ndjson_path).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_single_object_is_one_row() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("one.json");
        fs::write(&path, r#"{"id": "x"}"#).unwrap();
        let table = JsonBackend::new().read(&path).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.jsonl");
        let backend = JsonBackend::new();
        let table = Table::from_records(vec![json!({"id": "1"}), json!({"id": "2"})]);

        backend.write(&table, &path).unwrap();
        let back = backend.read(&path).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = JsonBackend::new().read(Path::new("/nonexistent/rows.json")).unwrap_err();
        assert!(matches!(err, EhrglotError::Io(_)));
    }

    #[test]
    fn test_read_invalid_json_is_serialization_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = JsonBackend::new().read(&path).unwrap_err();
        assert!(matches!(err, EhrglotError::Serialization(_)));
    }
}
