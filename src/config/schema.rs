//! Configuration schema types
//!
//! Every section and every key has a default, so an empty file (or no file at
//! all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::conversion::ConversionOptions;
use crate::masking::{AccessRoles, MaskingPlatform};
use crate::pii::PiiDetector;

/// Main EHRglot configuration
///
/// This is the root configuration structure that maps to the TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EhrglotConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Schema, mapping and override locations
    #[serde(default)]
    pub schemas: SchemasConfig,

    /// PII detection thresholds
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Masking policy generation
    #[serde(default)]
    pub masking: MaskingConfig,

    /// Conversion pipeline switches
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// PII audit trail
    #[serde(default)]
    pub audit: AuditConfig,
}

impl EhrglotConfig {
    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.schemas.validate()?;
        self.detection.validate()?;
        self.logging.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Pipeline options assembled from the conversion, detection and masking sections
    pub fn conversion_options(&self) -> ConversionOptions {
        ConversionOptions {
            validate: self.conversion.validate,
            fail_on_validation_error: self.conversion.fail_on_validation_error,
            auto_detect_pii: self.conversion.auto_detect_pii,
            pii_sample_size: self.detection.sample_size,
            generate_masking_policies: self.conversion.generate_masking_policies,
            masking_platform: self.masking.platform,
            roles: self.masking.roles(),
            schema_name: self.masking.schema_name.clone(),
            database_name: self.masking.database_name.clone(),
        }
    }
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Schema directory layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemasConfig {
    /// Root holding `fhir_r4/`, per-system mapping directories and custom schemas
    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    /// Optional root of PII override files
    #[serde(default)]
    pub override_dir: Option<PathBuf>,
}

impl Default for SchemasConfig {
    fn default() -> Self {
        Self {
            schema_dir: default_schema_dir(),
            override_dir: None,
        }
    }
}

impl SchemasConfig {
    fn validate(&self) -> Result<(), String> {
        if self.schema_dir.as_os_str().is_empty() {
            return Err("schemas.schema_dir cannot be empty".to_string());
        }
        Ok(())
    }
}

/// PII detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Non-null values sampled per column
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Minimum confidence for a detection to count
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Share of sampled values that must match a pattern
    #[serde(default = "default_value_match_threshold")]
    pub value_match_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            confidence_threshold: default_confidence_threshold(),
            value_match_threshold: default_value_match_threshold(),
        }
    }
}

impl DetectionConfig {
    fn validate(&self) -> Result<(), String> {
        if self.sample_size == 0 {
            return Err("detection.sample_size must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "detection.confidence_threshold must be between 0.0 and 1.0, got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.value_match_threshold) {
            return Err(format!(
                "detection.value_match_threshold must be between 0.0 and 1.0, got {}",
                self.value_match_threshold
            ));
        }
        Ok(())
    }

    /// Detector built from these thresholds
    pub fn detector(&self) -> PiiDetector {
        PiiDetector::new()
            .with_sample_size(self.sample_size)
            .with_confidence_threshold(self.confidence_threshold)
            .with_value_match_threshold(self.value_match_threshold)
    }
}

/// Masking policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// Target platform; no SQL is generated during conversion when unset
    #[serde(default)]
    pub platform: Option<MaskingPlatform>,

    /// Roles that see raw values (platform defaults when empty)
    #[serde(default)]
    pub full_access_roles: Vec<String>,

    /// Roles that see partially masked values (platform defaults when empty)
    #[serde(default)]
    pub partial_access_roles: Vec<String>,

    /// Roles that only see masked values
    #[serde(default)]
    pub no_access_roles: Vec<String>,

    /// Emit drop statements ahead of the apply statements
    #[serde(default)]
    pub include_drops: bool,

    #[serde(default = "default_masking_schema")]
    pub schema_name: Option<String>,

    #[serde(default)]
    pub database_name: Option<String>,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        Self {
            platform: None,
            full_access_roles: Vec::new(),
            partial_access_roles: Vec::new(),
            no_access_roles: Vec::new(),
            include_drops: false,
            schema_name: default_masking_schema(),
            database_name: None,
        }
    }
}

impl MaskingConfig {
    /// Configured roles, or `None` when every tier is left to the platform defaults
    pub fn roles(&self) -> Option<AccessRoles> {
        if self.full_access_roles.is_empty()
            && self.partial_access_roles.is_empty()
            && self.no_access_roles.is_empty()
        {
            return None;
        }
        Some(AccessRoles {
            full_access: self.full_access_roles.clone(),
            partial_access: self.partial_access_roles.clone(),
            no_access: self.no_access_roles.clone(),
        })
    }
}

/// Conversion pipeline switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default = "default_true")]
    pub validate: bool,

    #[serde(default)]
    pub fail_on_validation_error: bool,

    #[serde(default = "default_true")]
    pub auto_detect_pii: bool,

    #[serde(default = "default_true")]
    pub generate_masking_policies: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            validate: true,
            fail_on_validation_error: false,
            auto_detect_pii: true,
            generate_masking_policies: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default)]
    pub local_enabled: bool,

    /// Local log directory
    #[serde(default = "default_local_path")]
    pub local_path: String,

    /// Log rotation strategy
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }

        if self.local_enabled && self.local_path.trim().is_empty() {
            return Err("logging.local_path cannot be empty when local logging is enabled"
                .to_string());
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: false,
            local_path: default_local_path(),
            local_rotation: default_local_rotation(),
        }
    }
}

/// PII audit trail configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default)]
    pub enabled: bool,

    /// JSON-lines file receiving one entry per detection run
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: default_audit_log_path(),
        }
    }
}

impl AuditConfig {
    fn validate(&self) -> Result<(), String> {
        if self.enabled && self.log_path.as_os_str().is_empty() {
            return Err("audit.log_path cannot be empty when auditing is enabled".to_string());
        }
        Ok(())
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas")
}

fn default_sample_size() -> usize {
    100
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_value_match_threshold() -> f64 {
    0.3
}

fn default_masking_schema() -> Option<String> {
    Some("healthcare".to_string())
}

fn default_local_path() -> String {
    "./logs".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("./logs/pii_audit.jsonl")
}
