//! Generate-masking command implementation
//!
//! Tags the target, builds a masking policy for the chosen platform and
//! writes the SQL script (or the policy as JSON).

use super::{tag_target, write_or_print, TagTarget};
use crate::cli::{EXIT_CONFIG, EXIT_OK};
use crate::config::EhrglotConfig;
use crate::masking::MaskingPlatform;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the generate-masking command
#[derive(Args, Debug)]
pub struct GenerateMaskingArgs {
    #[command(flatten)]
    pub target: TagTarget,

    /// Target platform, overriding `[masking] platform`
    #[arg(short, long)]
    pub platform: Option<MaskingPlatform>,

    /// Table the policy applies to (defaults to the resource or file name)
    #[arg(short, long)]
    pub table: Option<String>,

    /// Schema holding the table, overriding `[masking] schema_name`
    #[arg(long)]
    pub schema: Option<String>,

    /// Database holding the table, overriding `[masking] database_name`
    #[arg(long)]
    pub database: Option<String>,

    /// Write here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit drop statements ahead of the policies
    #[arg(long)]
    pub include_drops: bool,

    /// Print the policy as JSON instead of SQL
    #[arg(long)]
    pub json: bool,
}

impl GenerateMaskingArgs {
    /// Execute the generate-masking command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let Some(platform) = self.platform.or(config.masking.platform) else {
            println!("❌ No masking platform selected");
            println!(
                "   Pass --platform or set [masking] platform to one of: {}",
                MaskingPlatform::ALL.map(|p| p.as_str()).join(", ")
            );
            return Ok(EXIT_CONFIG);
        };

        let tagged = tag_target(config, &self.target)?;
        let table = self
            .table
            .clone()
            .unwrap_or_else(|| tagged.name.to_lowercase());
        let schema_name = self.schema.clone().or_else(|| config.masking.schema_name.clone());
        let database_name = self
            .database
            .clone()
            .or_else(|| config.masking.database_name.clone());

        let generator = platform.generator(config.masking.roles());
        let policy = generator.create_policy_from_schema(
            &tagged.schema,
            &table,
            schema_name.as_deref(),
            database_name.as_deref(),
        );

        tracing::info!(
            platform = %platform,
            table = %policy.qualified_table(),
            rules = policy.rules.len(),
            "Generated masking policy"
        );

        if policy.rules.is_empty() {
            println!("⚠️  No columns of {} require masking", tagged.name);
            return Ok(EXIT_OK);
        }

        let contents = if self.json {
            serde_json::to_string_pretty(&policy)?
        } else {
            let include_drops = self.include_drops || config.masking.include_drops;
            generator.generate_sql(&policy).to_script(include_drops)
        };
        write_or_print(self.output.as_deref(), &contents)?;
        Ok(EXIT_OK)
    }
}
