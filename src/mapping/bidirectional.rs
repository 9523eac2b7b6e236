//! Bidirectional mapping between two schemas
//!
//! Wraps a forward and a reverse [`SchemaMapper`] built from one
//! [`BidirectionalMapping`]. Every operation delegates to one side.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::mapper::{generate_reverse_mappings, LookupTables, RowErrors, SchemaMapper};
use super::transforms::TransformFn;
use crate::domain::{BidirectionalMapping, SchemaMapping};

/// Maps rows source → target with [`forward`](Self::forward) and back with
/// [`reverse`](Self::reverse)
#[derive(Debug, Clone)]
pub struct BidirectionalMapper {
    mapping: BidirectionalMapping,
    forward: SchemaMapper,
    reverse: SchemaMapper,
}

impl BidirectionalMapper {
    pub fn new(mapping: BidirectionalMapping) -> Self {
        Self::with_transforms(mapping, HashMap::new())
    }

    /// Build both directions, sharing `transforms` between them
    ///
    /// An explicit reverse rule list wins. Otherwise, with `auto_reverse` set,
    /// the reverse rules are derived from the forward ones.
    pub fn with_transforms(
        mapping: BidirectionalMapping,
        transforms: HashMap<String, TransformFn>,
    ) -> Self {
        let forward_mapping = SchemaMapping {
            source_system: mapping.source_schema.clone(),
            source_table: String::new(),
            target_resource: mapping.target_schema.clone(),
            field_mappings: mapping.field_mappings.clone(),
            description: mapping.description.clone(),
        };

        let reverse_rules = if !mapping.reverse_field_mappings.is_empty() {
            mapping.reverse_field_mappings.clone()
        } else if mapping.auto_reverse {
            generate_reverse_mappings(&mapping.field_mappings)
        } else {
            Vec::new()
        };

        let reverse_mapping = SchemaMapping {
            source_system: mapping.target_schema.clone(),
            source_table: String::new(),
            target_resource: mapping.source_schema.clone(),
            field_mappings: reverse_rules,
            description: format!("Reverse of: {}", mapping.description),
        };

        Self {
            forward: SchemaMapper::with_transforms(forward_mapping, transforms.clone()),
            reverse: SchemaMapper::with_transforms(reverse_mapping, transforms),
            mapping,
        }
    }

    pub fn mapping(&self) -> &BidirectionalMapping {
        &self.mapping
    }

    /// The rules used for the reverse direction, explicit or derived
    pub fn reverse_mapping(&self) -> &SchemaMapping {
        self.reverse.mapping()
    }

    pub fn forward(
        &self,
        row: &Value,
        lookup_tables: Option<&LookupTables>,
    ) -> (Value, Vec<String>) {
        self.forward.map_row(row, lookup_tables)
    }

    pub fn reverse(
        &self,
        row: &Value,
        lookup_tables: Option<&LookupTables>,
    ) -> (Value, Vec<String>) {
        self.reverse.map_row(row, lookup_tables)
    }

    pub fn forward_dataset(
        &self,
        rows: &[Value],
        lookup_tables: Option<&LookupTables>,
    ) -> (Vec<Value>, RowErrors) {
        self.forward.map_dataset(rows, lookup_tables)
    }

    pub fn reverse_dataset(
        &self,
        rows: &[Value],
        lookup_tables: Option<&LookupTables>,
    ) -> (Vec<Value>, RowErrors) {
        self.reverse.map_dataset(rows, lookup_tables)
    }

    /// Register a transform on both directions
    pub fn register_transform<F>(&mut self, name: impl Into<String>, func: F)
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        let name = name.into();
        let shared: TransformFn = Arc::new(func);
        self.forward.register_shared_transform(name.clone(), Arc::clone(&shared));
        self.reverse.register_shared_transform(name, shared);
    }
}
