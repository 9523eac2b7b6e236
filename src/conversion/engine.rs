//! Conversion pipeline orchestration
//!
//! [`ConversionEngine::convert`] runs one source file through the full pipeline:
//!
//! 1. Load source rows through the [`Backend`]
//! 2. Map rows to the FHIR resource with the system's mapping
//! 3. Tag the resource schema with PII classifications
//! 4. Validate mapped resources
//! 5. Render a masking policy for the target platform
//! 6. Write flattened resources
//!
//! Each step is appended to the result's timestamped audit log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::flatten::flatten_record;
use super::validator::{FhirValidator, ValidationResult};
use crate::backends::{Backend, Table};
use crate::domain::{PiiLevel, Result, SchemaDefinition};
use crate::mapping::{LookupTables, RowErrors, SchemaMapper};
use crate::masking::{AccessRoles, GeneratedSql, MaskingPlatform, MaskingPolicy};
use crate::pii::{DatasetPiiReport, PiiAuditLogger, PiiDetector, PiiTagger};
use crate::schemas::{apply_overrides, SchemaLoader, SchemaOverrideLoader};

const DEFAULT_SCHEMA_NAME: &str = "healthcare";

/// Per-run pipeline switches
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub validate: bool,
    pub fail_on_validation_error: bool,
    pub auto_detect_pii: bool,
    pub pii_sample_size: usize,
    pub generate_masking_policies: bool,
    /// Platform to render masking SQL for; no SQL is rendered without one
    pub masking_platform: Option<MaskingPlatform>,
    /// Roles for the masking tiers; empty tiers fall back to platform defaults
    pub roles: Option<AccessRoles>,
    pub schema_name: Option<String>,
    pub database_name: Option<String>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            validate: true,
            fail_on_validation_error: false,
            auto_detect_pii: true,
            pii_sample_size: 100,
            generate_masking_policies: true,
            masking_platform: None,
            roles: None,
            schema_name: Some(DEFAULT_SCHEMA_NAME.to_string()),
            database_name: None,
        }
    }
}

/// Outcome of one conversion run
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    pub run_id: Uuid,
    pub success: bool,
    pub source_system: String,
    pub target_resource: String,
    pub rows_processed: usize,
    pub rows_converted: usize,
    pub rows_written: usize,
    /// `(row_index, messages)` for rows with mapping errors
    pub conversion_errors: RowErrors,
    pub validation_results: Vec<ValidationResult>,
    pub pii_report: Option<DatasetPiiReport>,
    pub tagged_schema: Option<SchemaDefinition>,
    pub masking_policy: Option<MaskingPolicy>,
    pub masking_sql: Option<GeneratedSql>,
    /// Message of the error that stopped the pipeline
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub audit_log: Vec<String>,
    #[serde(skip)]
    started: Option<Instant>,
}

impl ConversionResult {
    pub fn new(source_system: &str, target_resource: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            success: false,
            source_system: source_system.to_string(),
            target_resource: target_resource.to_string(),
            rows_processed: 0,
            rows_converted: 0,
            rows_written: 0,
            conversion_errors: Vec::new(),
            validation_results: Vec::new(),
            pii_report: None,
            tagged_schema: None,
            masking_policy: None,
            masking_sql: None,
            error: None,
            start_time: Utc::now(),
            end_time: None,
            duration: Duration::ZERO,
            audit_log: Vec::new(),
            started: Some(Instant::now()),
        }
    }

    /// Append a timestamped audit entry
    pub fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(run_id = %self.run_id, "{message}");
        self.audit_log
            .push(format!("[{}] {message}", Utc::now().to_rfc3339()));
    }

    /// Stamp the end time and duration
    pub fn finalize(&mut self) {
        self.end_time = Some(Utc::now());
        self.duration = self.started.map(|s| s.elapsed()).unwrap_or_default();
    }

    pub fn valid_count(&self) -> usize {
        self.validation_results.iter().filter(|r| r.is_valid).count()
    }

    pub fn invalid_count(&self) -> usize {
        self.validation_results.len() - self.valid_count()
    }

    /// Succeeded without row errors or invalid resources
    pub fn is_clean(&self) -> bool {
        self.success && self.conversion_errors.is_empty() && self.invalid_count() == 0
    }

    /// Log the summary
    pub fn log_summary(&self) {
        crate::log_conversion_complete!(
            &self.source_system,
            &self.target_resource,
            self.rows_converted,
            self.duration
        );
        if !self.conversion_errors.is_empty() {
            crate::log_row_errors!(self.conversion_errors.len(), self.rows_processed);
        }
        if let Some(error) = &self.error {
            tracing::error!(run_id = %self.run_id, error = %error, "Conversion failed");
        }
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

/// Orchestrates load, mapping, tagging, validation, masking and output
pub struct ConversionEngine {
    backend: Box<dyn Backend>,
    loader: SchemaLoader,
    overrides: Option<SchemaOverrideLoader>,
    detector: PiiDetector,
    audit: Option<PiiAuditLogger>,
    lookup_tables: LookupTables,
}

impl ConversionEngine {
    pub fn new(
        backend: Box<dyn Backend>,
        schema_dir: impl Into<PathBuf>,
        override_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            backend,
            loader: SchemaLoader::new(schema_dir),
            overrides: override_dir.map(SchemaOverrideLoader::new),
            detector: PiiDetector::default(),
            audit: None,
            lookup_tables: LookupTables::new(),
        }
    }

    /// Use a configured detector; its sample size is replaced per run
    pub fn with_detector(mut self, detector: PiiDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_audit_logger(mut self, audit: PiiAuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Lookup tables for `lookup:<table>` transforms
    pub fn with_lookup_tables(mut self, lookup_tables: LookupTables) -> Self {
        self.lookup_tables = lookup_tables;
        self
    }

    pub fn schema_loader(&self) -> &SchemaLoader {
        &self.loader
    }

    /// Convert a source file to a FHIR resource
    ///
    /// Pipeline failures do not return `Err`; they are recorded in the
    /// result's `error` and audit log with `success` left false.
    pub fn convert(
        &self,
        source_path: &Path,
        source_system: &str,
        target_resource: &str,
        output_path: Option<&Path>,
        options: &ConversionOptions,
    ) -> ConversionResult {
        let mut result = ConversionResult::new(source_system, target_resource);
        crate::log_conversion_start!(source_system, target_resource, result.run_id);
        result.log(format!("Starting conversion: {source_system} -> {target_resource}"));

        match self.run(source_path, output_path, options, &mut result) {
            Ok(true) => {
                result.success = true;
                result.log("Conversion completed successfully");
            }
            Ok(false) => {}
            Err(e) => {
                result.log(format!("Conversion failed: {e}"));
                result.error = Some(e.to_string());
            }
        }

        result.finalize();
        result.log_summary();
        result
    }

    /// Pipeline body; `Ok(false)` means a requested stop on validation errors
    fn run(
        &self,
        source_path: &Path,
        output_path: Option<&Path>,
        options: &ConversionOptions,
        result: &mut ConversionResult,
    ) -> Result<bool> {
        let source_system = result.source_system.clone();
        let resource = result.target_resource.clone();

        result.log(format!("Loading source data from {}", source_path.display()));
        let table = self.backend.read(source_path)?;
        let source_rows = self.backend.to_records(&table);
        result.rows_processed = source_rows.len();
        result.log(format!("Loaded {} rows", result.rows_processed));

        result.log(format!("Loading mapping for {source_system} -> {resource}"));
        let mapping = self.loader.load_mapping(&source_system, &resource)?;
        let mapper = SchemaMapper::new(mapping);

        result.log("Mapping data to FHIR R4");
        let (mapped_rows, errors) = mapper.map_dataset(&source_rows, Some(&self.lookup_tables));
        result.rows_converted = mapped_rows.len();
        result.log(format!(
            "Mapped {} rows, {} with errors",
            result.rows_converted,
            errors.len()
        ));
        result.conversion_errors = errors;

        if options.auto_detect_pii {
            result.log("Running PII detection");
            let (tagged, report) = self.tagged_resource_schema(&resource, options.pii_sample_size)?;
            if let Some(audit) = &self.audit {
                audit.log_detection(&resource, &report, Some(&tagged))?;
            }
            result.log(format!(
                "PII detection complete: {}/{} columns flagged",
                report.columns_with_pii, report.total_columns
            ));
            result.pii_report = Some(report);
            result.tagged_schema = Some(tagged);
        }

        if options.validate {
            result.log("Validating against FHIR R4 schema");
            let validator = FhirValidator::new(&self.loader);
            result.validation_results = validator.validate_batch(&mapped_rows, Some(&resource));
            let valid = result.valid_count();
            result.log(format!("Validation complete: {valid}/{} valid", mapped_rows.len()));

            if options.fail_on_validation_error && valid < mapped_rows.len() {
                result.log("Stopping due to validation errors");
                return Ok(false);
            }
        }

        if options.generate_masking_policies {
            self.generate_masking(options, result);
        }

        if let Some(output_path) = output_path {
            result.log(format!("Writing output to {}", output_path.display()));
            let flat_rows = mapped_rows
                .iter()
                .map(|row| Value::Object(flatten_record(row)))
                .collect();
            let output = Table::from_records(flat_rows);
            self.backend.write(&output, output_path)?;
            result.rows_written = output.len();
            result.log(format!(
                "Wrote {} rows to {}",
                result.rows_written,
                output_path.display()
            ));
        }

        Ok(true)
    }

    /// FHIR schema tagged from its YAML declarations, name detection and overrides
    ///
    /// Columns the YAML already classifies keep that classification; the rest
    /// take the auto-detected tag. Override files apply last.
    pub fn tagged_resource_schema(
        &self,
        resource: &str,
        sample_size: usize,
    ) -> Result<(SchemaDefinition, DatasetPiiReport)> {
        let base = self.loader.fhir_to_schema_definition(resource)?;
        let tagger = PiiTagger::new(self.detector.clone().with_sample_size(sample_size), true);
        let (auto, report) = tagger.tag_schema_auto(&base);

        let columns = base
            .columns
            .iter()
            .zip(auto.columns)
            .map(|(declared, detected)| {
                if declared.pii_level != PiiLevel::None {
                    declared.clone()
                } else {
                    detected
                }
            })
            .collect();
        let mut tagged = SchemaDefinition { columns, ..base };

        if let Some(overrides) = &self.overrides {
            if let Some(schema_override) = overrides.load_fhir_override(resource)? {
                tracing::info!(
                    resource = %resource,
                    fields = schema_override.field_overrides.len(),
                    "Applying PII overrides"
                );
                tagged = apply_overrides(&tagged, &schema_override);
            }
        }

        Ok((tagged, report))
    }

    fn generate_masking(&self, options: &ConversionOptions, result: &mut ConversionResult) {
        let Some(platform) = options.masking_platform else {
            result.log("No masking platform selected, skipping masking policies");
            return;
        };
        let Some(tagged) = result.tagged_schema.clone() else {
            result.log("No PII tags available, skipping masking policies");
            return;
        };

        result.log(format!("Generating masking policies for {platform}"));
        let generator = platform.generator(options.roles.clone());
        let policy = generator.create_policy_from_schema(
            &tagged,
            &result.target_resource.to_lowercase(),
            options.schema_name.as_deref(),
            options.database_name.as_deref(),
        );
        let sql = generator.generate_sql(&policy);
        result.log(format!("Generated {} masking rules", policy.rules.len()));
        result.masking_policy = Some(policy);
        result.masking_sql = Some(sql);
    }

    /// Map one sample row without running the rest of the pipeline
    pub fn preview_mapping(
        &self,
        source_system: &str,
        resource: &str,
        sample_row: &Value,
    ) -> Result<(Value, Vec<String>)> {
        let mapping = self.loader.load_mapping(source_system, resource)?;
        let mapper = SchemaMapper::new(mapping);
        Ok(mapper.map_row(sample_row, Some(&self.lookup_tables)))
    }

    pub fn supported_source_systems(&self) -> Vec<String> {
        self.loader.list_source_systems()
    }

    pub fn supported_resources(&self) -> Vec<String> {
        self.loader.list_fhir_resources()
    }
}
