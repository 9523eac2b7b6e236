//! Domain error types
//!
//! This module defines the error hierarchy for EHRglot. Row-level mapping
//! problems are not errors in this sense: they are collected as strings on the
//! row and never abort a dataset. Everything here is fatal to the operation
//! that produced it.

use thiserror::Error;

/// Main EHRglot error type
#[derive(Debug, Error)]
pub enum EhrglotError {
    /// Configuration-related errors, including invalid override documents
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A schema, mapping or override file that was requested does not exist
    #[error("{0}")]
    NotFound(String),

    /// Mapping definition errors (not row-level transform failures)
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Source message parse errors (HL7 v2.x)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl EhrglotError {
    /// Returns true for the not-found variant
    pub fn is_not_found(&self) -> bool {
        matches!(self, EhrglotError::NotFound(_))
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for EhrglotError {
    fn from(err: std::io::Error) -> Self {
        EhrglotError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for EhrglotError {
    fn from(err: serde_json::Error) -> Self {
        EhrglotError::Serialization(err.to_string())
    }
}

// YAML documents are authored by hand, so a parse failure is a configuration mistake
impl From<serde_yaml::Error> for EhrglotError {
    fn from(err: serde_yaml::Error) -> Self {
        EhrglotError::Configuration(format!("YAML parse error: {err}"))
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for EhrglotError {
    fn from(err: toml::de::Error) -> Self {
        EhrglotError::Configuration(format!("TOML parse error: {err}"))
    }
}
