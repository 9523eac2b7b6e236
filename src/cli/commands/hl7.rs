//! Parse-HL7 command implementation

use super::write_or_print;
use crate::cli::{EXIT_OK, EXIT_PARTIAL};
use crate::config::EhrglotConfig;
use crate::parsers::Hl7v2Parser;
use crate::schemas::SchemaLoader;
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

/// Arguments for the parse-hl7 command
#[derive(Args, Debug)]
pub struct ParseHl7Args {
    /// File of HL7 v2.x messages separated by blank lines
    pub input: PathBuf,

    /// FHIR resource to build (patient, encounter, observation, ...)
    #[arg(short, long)]
    pub resource: Option<String>,

    /// Segment to read instead of the resource's usual one
    #[arg(long)]
    pub segment: Option<String>,

    /// Map every matching segment rather than the first
    #[arg(long)]
    pub all: bool,

    /// Source system whose `<resource>_mapping.yaml` replaces the built-in
    /// segment mapping
    #[arg(long, requires = "resource")]
    pub mapping: Option<String>,

    /// Write resources here as a JSON array instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl ParseHl7Args {
    /// Execute the parse-hl7 command
    pub async fn execute(&self, config: &EhrglotConfig) -> anyhow::Result<i32> {
        let parser = self.parser(config)?;
        let messages = parser.parse_file(&self.input)?;

        tracing::info!(
            input = %self.input.display(),
            messages = messages.len(),
            "Parsed HL7 messages"
        );

        let Some(resource) = &self.resource else {
            for message in &messages {
                println!(
                    "{} {} v{} ({} segments)",
                    message.message_type().unwrap_or("?"),
                    message.control_id().unwrap_or("-"),
                    message.version().unwrap_or("?"),
                    message.segments.len()
                );
            }
            return Ok(EXIT_OK);
        };

        let segment = self.segment.as_deref();
        let mut resources = Vec::new();
        let mut missing = 0usize;
        for message in &messages {
            if self.all {
                resources.extend(parser.to_fhir_all(message, resource, segment));
                continue;
            }
            match parser.to_fhir(message, resource, segment) {
                Ok(converted) => resources.push(converted),
                Err(e) => {
                    missing += 1;
                    tracing::warn!(
                        control_id = message.control_id().unwrap_or("-"),
                        error = %e,
                        "Message skipped"
                    );
                }
            }
        }

        let body = serde_json::to_string_pretty(&Value::Array(resources))?;
        write_or_print(self.output.as_deref(), &body)?;

        if missing > 0 || messages.is_empty() {
            Ok(EXIT_PARTIAL)
        } else {
            Ok(EXIT_OK)
        }
    }

    fn parser(&self, config: &EhrglotConfig) -> anyhow::Result<Hl7v2Parser> {
        let parser = Hl7v2Parser::new();
        let (Some(system), Some(resource)) = (&self.mapping, &self.resource) else {
            return Ok(parser);
        };

        let loader = SchemaLoader::new(&config.schemas.schema_dir);
        let mapping = loader.load_mapping(system, resource)?;
        let segment = match &self.segment {
            Some(segment) => segment.clone(),
            None if !mapping.source_table.is_empty() => mapping.source_table.to_uppercase(),
            None => anyhow::bail!("--segment is required when the mapping has no source_table"),
        };
        Ok(parser.with_mapping(segment, mapping))
    }
}
