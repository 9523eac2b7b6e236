//! Detect-PII command implementation

use super::{tag_target, TagTarget};
use crate::cli::EXIT_OK;
use crate::config::EhrglotConfig;
use crate::domain::PiiLevel;
use crate::pii::PiiTagger;
use clap::Args;

/// Arguments for the detect-pii command
#[derive(Args, Debug)]
pub struct DetectPiiArgs {
    #[command(flatten)]
    pub target: TagTarget,

    /// Print the report and tagged schema as JSON
    #[arg(long)]
    pub json: bool,

    /// Also list columns without PII
    #[arg(long)]
    pub show_all: bool,
}

impl DetectPiiArgs {
    /// Execute the detect-pii command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let tagged = tag_target(config, &self.target)?;
        let summary = PiiTagger::default().get_pii_summary(&tagged.schema);

        tracing::info!(
            dataset = %tagged.name,
            columns = tagged.report.total_columns,
            pii_columns = tagged.report.columns_with_pii,
            "PII detection finished"
        );

        if self.json {
            let body = serde_json::json!({
                "dataset": tagged.name,
                "report": tagged.report,
                "summary": summary,
                "schema": tagged.schema,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            return Ok(EXIT_OK);
        }

        println!("🔍 PII detection: {}", tagged.name);
        println!(
            "  {} of {} columns contain PII ({} critical, {} high)",
            tagged.report.columns_with_pii,
            tagged.report.total_columns,
            tagged.report.critical_columns.len(),
            tagged.report.high_risk_columns.len()
        );
        println!();

        for column in &tagged.schema.columns {
            if column.pii_level == PiiLevel::None && !self.show_all {
                continue;
            }
            let identifier = column
                .hipaa_identifier
                .map(|id| id.as_str().to_string())
                .unwrap_or_else(|| "-".to_string());
            let method = tagged
                .report
                .result(&column.name)
                .map(|r| format!("{} {:.2}", r.detection_method.as_str(), r.confidence))
                .unwrap_or_default();
            println!(
                "  {:<32} {:<9} {:<24} {:<12} {}",
                column.name,
                column.pii_level.as_str(),
                identifier,
                column.masking_strategy.as_str(),
                method
            );
        }

        if !summary.masking_required.is_empty() {
            println!();
            println!("Masking required: {}", summary.masking_required.join(", "));
        }
        Ok(EXIT_OK)
    }
}
