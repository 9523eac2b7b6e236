//! Validate command implementation
//!
//! Checks FHIR resources in a JSON or NDJSON file against the loaded FHIR
//! schemas and reports per-resource errors.

use super::read_records;
use crate::cli::{EXIT_OK, EXIT_PARTIAL};
use crate::config::EhrglotConfig;
use crate::conversion::{summarize, FhirValidator};
use crate::schemas::SchemaLoader;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// File of FHIR resources (JSON array, single object or NDJSON)
    pub input: PathBuf,

    /// Resource type to validate against, when resources lack `resourceType`
    #[arg(short, long)]
    pub resource: Option<String>,

    /// Print the results and summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    /// Execute the validate command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        tracing::info!(input = %self.input.display(), "Validating FHIR resources");

        let resources = read_records(&self.input)?;
        let loader = SchemaLoader::new(&config.schemas.schema_dir);
        let validator = FhirValidator::new(&loader);
        let results = validator.validate_batch(&resources, self.resource.as_deref());
        let summary = summarize(&results);

        if self.json {
            let body = serde_json::json!({ "summary": summary, "results": results });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!("🔍 Validating {}", self.input.display());
            println!();
            for (index, result) in results.iter().enumerate() {
                if result.is_valid {
                    println!("✅ [{index}] {}", result.resource_type);
                } else {
                    println!("❌ [{index}] {}", result.resource_type);
                    for error in &result.errors {
                        println!("   {} ({}): {}", error.field, error.error_type, error.message);
                    }
                }
                for warning in &result.warnings {
                    println!("   ⚠️  {}", warning.message);
                }
            }
            println!();
            println!(
                "Validated {} resources: {} valid, {} invalid ({:.1}%)",
                summary.total_resources,
                summary.valid_resources,
                summary.invalid_resources,
                summary.validation_rate * 100.0
            );
        }

        tracing::info!(
            total = summary.total_resources,
            invalid = summary.invalid_resources,
            "Validation finished"
        );

        if summary.invalid_resources > 0 {
            Ok(EXIT_PARTIAL)
        } else {
            Ok(EXIT_OK)
        }
    }
}
