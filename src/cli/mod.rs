//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for EHRglot using clap.

pub mod commands;

use crate::config::{default_config, load_config, EhrglotConfig};
use crate::domain::EhrglotError;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Exit code for a clean run
pub const EXIT_OK: i32 = 0;
/// Exit code when some rows or resources failed
pub const EXIT_PARTIAL: i32 = 1;
/// Exit code for configuration, schema or mapping problems
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for anything else
pub const EXIT_FATAL: i32 = 5;

/// EHRglot - EHR schema mapping and PHI masking toolkit
#[derive(Parser, Debug)]
#[command(name = "ehrglot")]
#[command(version, about, long_about = None)]
#[command(author = "EHRglot Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "ehrglot.toml", env = "EHRGLOT_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EHRGLOT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Schema directory, overriding `[schemas] schema_dir`
    #[arg(long, global = true)]
    pub schema_dir: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration for this invocation
    ///
    /// A missing file is not an error: defaults plus environment overrides
    /// are used instead. `--schema-dir` wins over the file.
    pub fn resolve_config(&self) -> crate::domain::Result<EhrglotConfig> {
        let mut config = if Path::new(&self.config).exists() {
            load_config(&self.config)?
        } else {
            tracing::debug!(config_path = %self.config, "No configuration file, using defaults");
            default_config()?
        };

        if let Some(schema_dir) = &self.schema_dir {
            config.schemas.schema_dir = schema_dir.clone();
        }
        Ok(config)
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert a source EHR extract to a FHIR resource
    Convert(commands::convert::ConvertArgs),

    /// Validate FHIR resources against their schemas
    Validate(commands::validate::ValidateArgs),

    /// List source systems that have mappings
    ListSources(commands::list::ListSourcesArgs),

    /// List available FHIR resource schemas
    ListResources(commands::list::ListResourcesArgs),

    /// Show the field mappings from a source system to a resource
    ShowMappings(commands::show_mappings::ShowMappingsArgs),

    /// Detect PII in a data file or FHIR resource schema
    DetectPii(commands::detect_pii::DetectPiiArgs),

    /// Generate masking policy SQL for an analytics platform
    GenerateMasking(commands::generate_masking::GenerateMaskingArgs),

    /// Parse HL7 v2.x messages and convert segments to FHIR
    ParseHl7(commands::hl7::ParseHl7Args),
}

/// Exit code for an error that escaped a command
///
/// Configuration and missing schema or mapping errors map to
/// [`EXIT_CONFIG`]; everything else is fatal.
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<EhrglotError>() {
        Some(EhrglotError::Configuration(_)) | Some(EhrglotError::NotFound(_)) => EXIT_CONFIG,
        _ => EXIT_FATAL,
    }
}
