//! Show-mappings command implementation

use super::build_engine;
use crate::cli::{EXIT_OK, EXIT_PARTIAL};
use crate::config::EhrglotConfig;
use anyhow::Context;
use clap::Args;
use serde_json::Value;

/// Arguments for the show-mappings command
#[derive(Args, Debug)]
pub struct ShowMappingsArgs {
    /// Source EHR system
    pub source_system: String,

    /// Target FHIR resource
    pub resource: String,

    /// Map this JSON row and print the result
    #[arg(long)]
    pub preview: Option<String>,
}

impl ShowMappingsArgs {
    /// Execute the show-mappings command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let engine = build_engine(config)?;
        let mapping = engine
            .schema_loader()
            .load_mapping(&self.source_system, &self.resource)?;

        println!(
            "{} -> {} ({} rules)",
            mapping.source_system,
            mapping.target_resource,
            mapping.field_mappings.len()
        );
        if !mapping.description.is_empty() {
            println!("  {}", mapping.description);
        }
        println!();

        let width = mapping
            .field_mappings
            .iter()
            .map(|m| m.source.len())
            .max()
            .unwrap_or(0)
            .max(6);
        for rule in &mapping.field_mappings {
            let source = if rule.source.is_empty() { "-" } else { &rule.source };
            let mut line = format!("  {source:<width$} -> {}", rule.target);
            if let Some(transform) = &rule.transform {
                line.push_str(&format!("  [{transform}]"));
            }
            if let Some(default) = &rule.default_value {
                line.push_str(&format!("  (default {default})"));
            }
            println!("{line}");
        }

        let Some(preview) = &self.preview else {
            return Ok(EXIT_OK);
        };

        let row: Value = serde_json::from_str(preview).context("--preview is not valid JSON")?;
        let (mapped, errors) =
            engine.preview_mapping(&self.source_system, &self.resource, &row)?;

        println!();
        println!("Preview:");
        println!("{}", serde_json::to_string_pretty(&mapped)?);
        if errors.is_empty() {
            Ok(EXIT_OK)
        } else {
            for error in &errors {
                println!("❌ {error}");
            }
            Ok(EXIT_PARTIAL)
        }
    }
}
