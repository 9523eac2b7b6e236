//! Source-to-FHIR conversion pipeline
//!
//! - [`engine`]: [`ConversionEngine`] running load, map, tag, validate, mask and write
//! - [`validator`]: [`FhirValidator`] checking resources against loaded FHIR schemas
//! - [`flatten`]: nested resources to single-level rows for tabular output

pub mod engine;
pub mod flatten;
pub mod validator;

pub use engine::{ConversionEngine, ConversionOptions, ConversionResult};
pub use flatten::flatten_record;
pub use validator::{
    summarize, FhirValidator, ValidationIssue, ValidationResult, ValidationSummary,
};
