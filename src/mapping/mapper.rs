//! Schema mapper: applies ordered field-mapping rules to records
//!
//! [`SchemaMapper::map_row`] never fails. Every problem it meets is recorded as
//! a string on the row: a source that is not a record, an unknown transform, a
//! transform returning `Err`, or a target path that runs into the wrong kind of
//! container. The row still produces its best-effort target record. Whether a
//! row-error count is acceptable is the caller's call.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::path;
use super::transforms::{self, value_to_string, TransformFn};
use crate::domain::{FieldMapping, SchemaMapping};

/// Reference tables keyed by table name, then by source code
pub type LookupTables = HashMap<String, HashMap<String, Value>>;

/// Row-level failures from a dataset run: `(row_index, errors)`
pub type RowErrors = Vec<(usize, Vec<String>)>;

/// Transform names of the form `lookup:<table>` resolve through a lookup table
const LOOKUP_PREFIX: &str = "lookup:";

/// Per-row mapping state
///
/// Created when a row starts mapping and dropped when it finishes.
#[derive(Debug)]
pub struct TransformContext<'a> {
    pub source_row: &'a Value,
    pub target_row: Value,
    pub lookup_tables: &'a LookupTables,
    pub errors: Vec<String>,
}

impl<'a> TransformContext<'a> {
    pub fn new(source_row: &'a Value, lookup_tables: &'a LookupTables) -> Self {
        Self {
            source_row,
            target_row: Value::Object(Map::new()),
            lookup_tables,
            errors: Vec::new(),
        }
    }
}

/// Maps records from a source schema to a target schema
#[derive(Clone)]
pub struct SchemaMapper {
    mapping: SchemaMapping,
    custom_transforms: HashMap<String, TransformFn>,
}

impl std::fmt::Debug for SchemaMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut custom: Vec<&String> = self.custom_transforms.keys().collect();
        custom.sort();
        f.debug_struct("SchemaMapper")
            .field("mapping", &self.mapping)
            .field("custom_transforms", &custom)
            .finish()
    }
}

impl SchemaMapper {
    /// Create a mapper that knows only the built-in transforms
    pub fn new(mapping: SchemaMapping) -> Self {
        Self {
            mapping,
            custom_transforms: HashMap::new(),
        }
    }

    /// Create a mapper with additional transforms layered over the built-ins
    pub fn with_transforms(
        mapping: SchemaMapping,
        transforms: HashMap<String, TransformFn>,
    ) -> Self {
        Self {
            mapping,
            custom_transforms: transforms,
        }
    }

    pub fn mapping(&self) -> &SchemaMapping {
        &self.mapping
    }

    /// Register a transform on this mapper only
    ///
    /// A custom transform shadows a built-in of the same name.
    pub fn register_transform<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.custom_transforms.insert(name.into(), Arc::new(func));
    }

    pub(crate) fn register_shared_transform(&mut self, name: String, func: TransformFn) {
        self.custom_transforms.insert(name, func);
    }

    fn resolve_transform(&self, name: &str) -> Option<TransformFn> {
        self.custom_transforms
            .get(name)
            .cloned()
            .or_else(|| transforms::builtin(name))
    }

    fn apply_transform(&self, value: Value, name: &str, ctx: &mut TransformContext<'_>) -> Value {
        if let Some(table_name) = name.strip_prefix(LOOKUP_PREFIX) {
            let Some(table) = ctx.lookup_tables.get(table_name) else {
                ctx.errors.push(format!("Unknown lookup table: {table_name}"));
                return value;
            };
            if value.is_null() {
                return value;
            }
            return table
                .get(&value_to_string(&value))
                .cloned()
                .unwrap_or(value);
        }

        let Some(func) = self.resolve_transform(name) else {
            ctx.errors.push(format!("Unknown transform: {name}"));
            return value;
        };

        match func(&value) {
            Ok(transformed) => transformed,
            Err(message) => {
                ctx.errors.push(format!("Transform error ({name}): {message}"));
                value
            }
        }
    }

    fn resolve_source(rule: &FieldMapping, source_row: &Value) -> Value {
        let value = if rule.source.is_empty() {
            rule.default_value.clone().unwrap_or(Value::Null)
        } else {
            path::get(source_row, &rule.source)
                .cloned()
                .unwrap_or(Value::Null)
        };

        match (&value, &rule.default_value) {
            (Value::Null, Some(default)) => default.clone(),
            _ => value,
        }
    }

    /// Map one record, returning the target record and this row's errors
    ///
    /// Rules apply in order, so a later rule overwrites an earlier one that
    /// targets the same path. Null results are never written.
    pub fn map_row(
        &self,
        source_row: &Value,
        lookup_tables: Option<&LookupTables>,
    ) -> (Value, Vec<String>) {
        let empty = LookupTables::new();
        let mut ctx = TransformContext::new(source_row, lookup_tables.unwrap_or(&empty));
        if !source_row.is_object() {
            ctx.errors
                .push(format!("Source row is not a record: {}", json_kind(source_row)));
        }

        for rule in &self.mapping.field_mappings {
            let mut value = Self::resolve_source(rule, ctx.source_row);

            if let Some(name) = rule.transform.as_deref() {
                value = self.apply_transform(value, name, &mut ctx);
            }

            if !value.is_null() && !path::set(&mut ctx.target_row, &rule.target, value) {
                ctx.errors
                    .push(format!("Cannot write target path: {}", rule.target));
            }
        }

        (ctx.target_row, ctx.errors)
    }

    /// Map every row in input order
    ///
    /// Only rows with at least one error appear in the returned error list,
    /// tagged with their 0-based input index. No row aborts the batch.
    pub fn map_dataset(
        &self,
        source_rows: &[Value],
        lookup_tables: Option<&LookupTables>,
    ) -> (Vec<Value>, RowErrors) {
        let mut mapped_rows = Vec::with_capacity(source_rows.len());
        let mut errors_by_row = Vec::new();

        for (index, row) in source_rows.iter().enumerate() {
            let (mapped, errors) = self.map_row(row, lookup_tables);
            mapped_rows.push(mapped);
            if !errors.is_empty() {
                errors_by_row.push((index, errors));
            }
        }

        tracing::debug!(
            source_system = %self.mapping.source_system,
            target_resource = %self.mapping.target_resource,
            rows = mapped_rows.len(),
            rows_with_errors = errors_by_row.len(),
            "Mapped dataset"
        );

        (mapped_rows, errors_by_row)
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

/// Derive reverse rules by swapping source and target
///
/// Rules with an empty source, an indexed source (`[`), or a composite source
/// (`+`) cannot be inverted and are dropped. Transforms and defaults are not
/// carried over.
pub fn generate_reverse_mappings(forward: &[FieldMapping]) -> Vec<FieldMapping> {
    forward
        .iter()
        .filter(|fm| {
            !fm.source.is_empty()
                && !fm.target.is_empty()
                && !fm.source.contains('+')
                && !fm.source.contains('[')
        })
        .map(|fm| FieldMapping::new(fm.target.clone(), fm.source.clone()))
        .collect()
}
