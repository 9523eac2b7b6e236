//! Schema, mapping and override loading
//!
//! - [`loader`]: FHIR resource schemas, source mappings and custom schemas
//! - [`overrides`]: organization-specific PII overrides with a fixed whitelist

pub mod loader;
pub mod overrides;

pub use loader::{FhirField, FhirResourceSchema, SchemaLoader};
pub use overrides::{
    apply_overrides, FieldOverride, SchemaOverride, SchemaOverrideLoader, OVERRIDABLE_PROPERTIES,
};
