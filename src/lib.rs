// EHRglot - EHR Schema Mapping and PHI Masking Toolkit
// Copyright (c) 2025 EHRglot Contributors
// Licensed under the MIT License

//! # EHRglot - EHR Schema Mapping and PHI Masking
//!
//! EHRglot converts records from source EHR systems (Epic, Cerner, HL7 v2.x
//! feeds) into FHIR R4 resources, classifies their columns against the 18
//! HIPAA Safe Harbor identifiers, and generates column-masking SQL for
//! analytics platforms.
//!
//! ## Architecture
//!
//! - [`mapping`] - Path-addressed schema mapper and transform registry
//! - [`pii`] - HIPAA PII detection, tagging and audit trail
//! - [`masking`] - Masking policies and per-platform SQL generators
//! - [`schemas`] - YAML schema, mapping and override loading
//! - [`conversion`] - End-to-end conversion engine and FHIR validation
//! - [`parsers`] - HL7 v2.x message parsing
//! - [`backends`] - Table read/write backends
//! - [`domain`] - Core types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//! - [`cli`] - Command-line interface
//!
//! ## Mapping a row
//!
//! ```rust
//! use ehrglot::domain::{FieldMapping, SchemaMapping};
//! use ehrglot::mapping::SchemaMapper;
//! use serde_json::json;
//!
//! let mapping = SchemaMapping {
//!     source_system: "epic".to_string(),
//!     source_table: "PATIENT".to_string(),
//!     target_resource: "Patient".to_string(),
//!     field_mappings: vec![
//!         FieldMapping::new("PAT_ID", "id"),
//!         FieldMapping::new("PAT_LAST_NAME", "name[0].family"),
//!         FieldMapping::new("SEX_C", "gender").with_transform("epic_sex_to_fhir_gender"),
//!     ],
//!     description: String::new(),
//! };
//!
//! let mapper = SchemaMapper::new(mapping);
//! let row = json!({"PAT_ID": "E1001", "PAT_LAST_NAME": "Smith", "SEX_C": "1"});
//! let (patient, errors) = mapper.map_row(&row, None);
//!
//! assert!(errors.is_empty());
//! assert_eq!(patient["name"][0]["family"], "Smith");
//! ```
//!
//! ## Tagging PII and generating masking SQL
//!
//! ```rust
//! use ehrglot::domain::{ColumnMetadata, DataType, SchemaDefinition};
//! use ehrglot::masking::MaskingPlatform;
//! use ehrglot::pii::PiiTagger;
//!
//! let schema = SchemaDefinition::new(
//!     "patients",
//!     vec![
//!         ColumnMetadata::new("ssn", DataType::String),
//!         ColumnMetadata::new("email", DataType::String),
//!         ColumnMetadata::new("visit_count", DataType::Integer),
//!     ],
//! );
//!
//! let (tagged, _report) = PiiTagger::default().tag_schema_auto(&schema);
//!
//! let generator = MaskingPlatform::Snowflake.generator(None);
//! let policy = generator.create_policy_from_schema(&tagged, "patients", Some("healthcare"), None);
//! let script = generator.generate_sql(&policy).to_script(false);
//!
//! assert_eq!(policy.rules.len(), 2);
//! assert!(script.contains("MASKING POLICY"));
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::Result`], whose error type is
//! [`domain::EhrglotError`]. Per-row mapping problems are not errors: they
//! are collected alongside each mapped row.
//!
//! ## Logging
//!
//! EHRglot logs with `tracing`; see [`logging::init_logging`].

pub mod backends;
pub mod cli;
pub mod config;
pub mod conversion;
pub mod domain;
pub mod logging;
pub mod mapping;
pub mod masking;
pub mod parsers;
pub mod pii;
pub mod schemas;
