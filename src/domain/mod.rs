//! Domain models and types for EHRglot.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Value types** shared by every subsystem ([`ColumnMetadata`], [`SchemaDefinition`],
//!   [`FieldMapping`], [`SchemaMapping`], [`CustomSchema`])
//! - **Classification enums** ([`PiiLevel`], [`PiiCategory`], [`HipaaIdentifier`],
//!   [`MaskingStrategy`], [`DataType`])
//! - **Error types** ([`EhrglotError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, EhrglotError>`]:
//!
//! ```rust
//! use ehrglot::domain::{EhrglotError, Result};
//!
//! fn example(resource: &str) -> Result<()> {
//!     if resource.is_empty() {
//!         return Err(EhrglotError::Validation("resource is required".to_string()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod result;
pub mod types;

pub use errors::EhrglotError;
pub use result::Result;
pub use types::{
    BidirectionalMapping, ColumnMetadata, CustomSchema, CustomSchemaField, DataType, FieldMapping,
    HipaaIdentifier, MaskingParams, MaskingStrategy, PiiCategory, PiiLevel, SchemaDefinition,
    SchemaMapping,
};
