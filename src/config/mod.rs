//! Configuration management for EHRglot.
//!
//! # Overview
//!
//! EHRglot uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `EHRGLOT_<SECTION>_<KEY>` environment overrides
//! - Default values for every setting
//! - Validation on load
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`SchemasConfig`] - Schema and override directories
//! - [`DetectionConfig`] - PII detection thresholds
//! - [`MaskingConfig`] - Masking platform and access roles
//! - [`ConversionConfig`] - Conversion pipeline switches
//! - [`LoggingConfig`] - Local log files
//! - [`AuditConfig`] - PII audit trail
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! log_level = "info"
//!
//! [schemas]
//! schema_dir = "./schemas"
//! override_dir = "${EHRGLOT_OVERRIDES}"
//!
//! [detection]
//! sample_size = 100
//! confidence_threshold = 0.5
//!
//! [masking]
//! platform = "snowflake"
//! full_access_roles = ["PHI_ADMIN"]
//! partial_access_roles = ["ANALYST"]
//!
//! [conversion]
//! fail_on_validation_error = false
//!
//! [audit]
//! enabled = true
//! log_path = "./logs/pii_audit.jsonl"
//! ```

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config};
pub use schema::{
    ApplicationConfig, AuditConfig, ConversionConfig, DetectionConfig, EhrglotConfig,
    LoggingConfig, MaskingConfig, SchemasConfig,
};
