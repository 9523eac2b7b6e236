//! `list-sources` and `list-resources` command implementations

use crate::cli::EXIT_OK;
use crate::config::EhrglotConfig;
use crate::schemas::{SchemaLoader, SchemaOverrideLoader};
use clap::Args;

/// Arguments for the list-sources command
#[derive(Args, Debug)]
pub struct ListSourcesArgs {}

impl ListSourcesArgs {
    /// Execute the list-sources command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let loader = SchemaLoader::new(&config.schemas.schema_dir);
        let systems = loader.list_source_systems();

        if systems.is_empty() {
            println!(
                "No source systems found under {}",
                config.schemas.schema_dir.display()
            );
            return Ok(EXIT_OK);
        }

        println!("Source systems:");
        for system in &systems {
            let resources = loader.list_mappings(system);
            println!("  {system}: {}", resources.join(", "));
        }
        Ok(EXIT_OK)
    }
}

/// Arguments for the list-resources command
#[derive(Args, Debug)]
pub struct ListResourcesArgs {
    /// Also list custom schemas and override files
    #[arg(long)]
    pub all: bool,
}

impl ListResourcesArgs {
    /// Execute the list-resources command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let loader = SchemaLoader::new(&config.schemas.schema_dir);

        println!("FHIR resources:");
        for resource in loader.list_fhir_resources() {
            println!("  {resource}");
        }

        if self.all {
            let custom = loader.list_custom_schemas();
            if !custom.is_empty() {
                println!();
                println!("Custom schemas:");
                for name in custom {
                    println!("  {name}");
                }
            }

            if let Some(override_dir) = &config.schemas.override_dir {
                let overrides = SchemaOverrideLoader::new(override_dir).list_overrides();
                if !overrides.is_empty() {
                    println!();
                    println!("Overrides ({}):", override_dir.display());
                    for name in overrides {
                        println!("  {name}");
                    }
                }
            }
        }
        Ok(EXIT_OK)
    }
}
