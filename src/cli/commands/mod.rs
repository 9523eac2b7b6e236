//! CLI command implementations
//!
//! Each command owns its clap `Args` struct and an async `execute` that
//! returns the process exit code.

pub mod convert;
pub mod detect_pii;
pub mod generate_masking;
pub mod hl7;
pub mod list;
pub mod show_mappings;
pub mod validate;

use crate::backends::{Backend, JsonBackend};
use crate::config::EhrglotConfig;
use crate::conversion::ConversionEngine;
use crate::domain::SchemaDefinition;
use crate::pii::{DatasetPiiReport, PiiAuditLogger, PiiTagger};
use crate::schemas::{apply_overrides, SchemaOverrideLoader};
use anyhow::Context;
use clap::Args;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// What to tag: a data file, a FHIR resource schema, or a data file with
/// the mapping overrides of a source system and resource
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = true)]
pub struct TagTarget {
    /// Data file whose columns and values are scanned
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// FHIR resource whose schema is tagged
    #[arg(short, long)]
    pub resource: Option<String>,

    /// Source system whose mapping overrides apply to `--input`
    #[arg(short, long, requires = "input")]
    pub source_system: Option<String>,
}

/// A tagged schema with the detection report behind it
pub(crate) struct TaggedTarget {
    pub name: String,
    pub schema: SchemaDefinition,
    pub report: DatasetPiiReport,
}

/// Engine wired from the schema, detection and audit sections
pub(crate) fn build_engine(config: &EhrglotConfig) -> anyhow::Result<ConversionEngine> {
    let mut engine = ConversionEngine::new(
        Box::new(JsonBackend::new()),
        config.schemas.schema_dir.clone(),
        config.schemas.override_dir.clone(),
    )
    .with_detector(config.detection.detector());

    if config.audit.enabled {
        let audit = PiiAuditLogger::new(&config.audit.log_path, true)
            .context("Failed to open PII audit log")?;
        engine = engine.with_audit_logger(audit);
    }

    Ok(engine)
}

/// Records from a JSON array, a single JSON object or NDJSON file
pub(crate) fn read_records(path: &Path) -> anyhow::Result<Vec<Value>> {
    let backend = JsonBackend::new();
    let table = backend
        .read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(backend.to_records(&table))
}

/// Write `contents` to `path`, or to stdout when no path is given
pub(crate) fn write_or_print(path: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Wrote {}", path.display());
        }
        None => println!("{contents}"),
    }
    Ok(())
}

/// Detect and tag PII for a [`TagTarget`]
///
/// With `--input`, columns are scanned by name and sampled values. Without
/// it, the FHIR schema for `--resource` is tagged from its declarations and
/// column names. Detections are written to the audit log when enabled.
pub(crate) fn tag_target(
    config: &EhrglotConfig,
    target: &TagTarget,
) -> anyhow::Result<TaggedTarget> {
    let tagged = match (&target.input, &target.resource) {
        (Some(input), resource) => tag_data_file(config, input, target, resource.as_deref())?,
        (None, Some(resource)) => {
            let engine = build_engine(config)?;
            let (schema, report) =
                engine.tagged_resource_schema(resource, config.detection.sample_size)?;
            TaggedTarget {
                name: resource.clone(),
                schema,
                report,
            }
        }
        (None, None) => anyhow::bail!("Either --input or --resource is required"),
    };

    if config.audit.enabled {
        let audit = PiiAuditLogger::new(&config.audit.log_path, true)
            .context("Failed to open PII audit log")?;
        audit.log_detection(&tagged.name, &tagged.report, Some(&tagged.schema))?;
    }

    Ok(tagged)
}

fn tag_data_file(
    config: &EhrglotConfig,
    input: &Path,
    target: &TagTarget,
    resource: Option<&str>,
) -> anyhow::Result<TaggedTarget> {
    let backend = JsonBackend::new();
    let table = backend
        .read(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let detector = config.detection.detector();
    let report = detector.detect_dataframe(&table, &backend);
    let tagger = PiiTagger::new(detector, true);

    let name = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| backend.name().to_string());
    let mut schema = tagger.tag_schema(&backend.get_schema(&table), &report);
    schema.name = name.clone();

    if let (Some(system), Some(resource), Some(dir)) =
        (&target.source_system, resource, &config.schemas.override_dir)
    {
        schema.source_system = Some(system.clone());
        schema.target_resource = Some(resource.to_string());
        let overrides = SchemaOverrideLoader::new(dir);
        if let Some(schema_override) = overrides.load_mapping_override(system, resource)? {
            tracing::info!(
                source_system = %system,
                resource = %resource,
                fields = schema_override.field_overrides.len(),
                "Applying mapping overrides"
            );
            schema = apply_overrides(&schema, &schema_override);
        }
    }

    Ok(TaggedTarget {
        name,
        schema,
        report,
    })
}
