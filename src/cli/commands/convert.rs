//! Convert command implementation
//!
//! Runs the full pipeline (map, detect PII, validate, generate masking,
//! write) for one source file and prints a run summary.

use super::{build_engine, write_or_print};
use crate::cli::{EXIT_FATAL, EXIT_OK, EXIT_PARTIAL};
use crate::config::EhrglotConfig;
use crate::conversion::{ConversionOptions, ConversionResult};
use crate::masking::MaskingPlatform;
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the convert command
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Source data file (JSON array or NDJSON)
    pub source: PathBuf,

    /// Source EHR system (e.g. epic, cerner)
    #[arg(short, long)]
    pub source_system: String,

    /// Target FHIR resource (e.g. patient)
    #[arg(short, long)]
    pub resource: String,

    /// Where to write the converted, flattened rows
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Masking platform, overriding `[masking] platform`
    #[arg(long)]
    pub platform: Option<MaskingPlatform>,

    /// Write the masking SQL script here instead of stdout
    #[arg(long)]
    pub sql_output: Option<PathBuf>,

    /// Write the full run result as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Skip FHIR validation
    #[arg(long)]
    pub no_validate: bool,

    /// Stop without writing output when any resource fails validation
    #[arg(long)]
    pub fail_on_validation_error: bool,

    /// Skip PII detection and masking
    #[arg(long)]
    pub no_pii: bool,
}

impl ConvertArgs {
    /// Execute the convert command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        tracing::info!(
            source = %self.source.display(),
            source_system = %self.source_system,
            resource = %self.resource,
            "Convert command"
        );

        let engine = build_engine(config)?;
        // Surface a missing mapping as a configuration error before running
        engine
            .schema_loader()
            .load_mapping(&self.source_system, &self.resource)?;

        let options = self.options(config);
        let source = self.source.clone();
        let system = self.source_system.clone();
        let resource = self.resource.clone();
        let output = self.output.clone();

        let result = tokio::task::spawn_blocking(move || {
            engine.convert(&source, &system, &resource, output.as_deref(), &options)
        })
        .await
        .context("Conversion task failed")?;

        print_summary(&result);

        if let Some(sql) = &result.masking_sql {
            let script = sql.to_script(config.masking.include_drops);
            if self.sql_output.is_none() {
                println!();
            }
            write_or_print(self.sql_output.as_deref(), &script)?;
        }

        if let Some(report) = &self.report {
            let body = serde_json::to_string_pretty(&result)?;
            write_or_print(Some(report), &body)?;
        }

        Ok(exit_code(&result))
    }

    /// Options from configuration with command-line flags applied
    fn options(&self, config: &EhrglotConfig) -> ConversionOptions {
        let mut options = config.conversion_options();
        if self.no_validate {
            options.validate = false;
        }
        if self.fail_on_validation_error {
            options.fail_on_validation_error = true;
        }
        if self.no_pii {
            options.auto_detect_pii = false;
            options.generate_masking_policies = false;
        }
        if self.platform.is_some() {
            options.masking_platform = self.platform;
        }
        options
    }
}

fn print_summary(result: &ConversionResult) {
    let status = if result.success { "✅" } else { "❌" };
    println!(
        "{status} {} -> {} (run {})",
        result.source_system, result.target_resource, result.run_id
    );
    println!("  Rows processed: {}", result.rows_processed);
    println!("  Rows converted: {}", result.rows_converted);
    println!("  Rows written: {}", result.rows_written);
    if !result.conversion_errors.is_empty() {
        println!("  Rows with mapping errors: {}", result.conversion_errors.len());
    }
    if !result.validation_results.is_empty() {
        println!(
            "  Validation: {} valid, {} invalid",
            result.valid_count(),
            result.invalid_count()
        );
    }
    if let Some(report) = &result.pii_report {
        println!(
            "  PII columns: {} of {} ({} critical)",
            report.columns_with_pii,
            report.total_columns,
            report.critical_columns.len()
        );
    }
    if let Some(policy) = &result.masking_policy {
        println!("  Masking rules: {} on {}", policy.rules.len(), policy.qualified_table());
    }
    println!("  Duration: {:.2}s", result.duration.as_secs_f64());
    if let Some(error) = &result.error {
        println!("  Error: {error}");
    }
}

fn exit_code(result: &ConversionResult) -> i32 {
    if result.error.is_some() {
        EXIT_FATAL
    } else if !result.success || !result.is_clean() {
        EXIT_PARTIAL
    } else {
        EXIT_OK
    }
}
