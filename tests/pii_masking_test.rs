//! Integration tests for PII detection, overrides and masking SQL

mod common;

use common::Workspace;
use ehrglot::backends::{Backend, JsonBackend};
use ehrglot::domain::{HipaaIdentifier, MaskingStrategy, PiiLevel, SchemaDefinition};
use ehrglot::masking::{AccessRoles, MaskingPlatform};
use ehrglot::pii::audit::{hash_value, AuditEntry};
use ehrglot::pii::{PiiAuditLogger, PiiDetector, PiiTagger};
use ehrglot::schemas::{apply_overrides, SchemaLoader, SchemaOverrideLoader};
use std::fs;
use test_case::test_case;

fn tagged_epic_extract(ws: &Workspace) -> (SchemaDefinition, ehrglot::pii::DatasetPiiReport) {
    let backend = JsonBackend::new();
    let table = backend.read(&ws.path("data/epic_patients.json")).unwrap();
    let detector = PiiDetector::new();
    let report = detector.detect_dataframe(&table, &backend);
    let tagger = PiiTagger::new(detector, true);
    let schema = tagger.tag_schema(&backend.get_schema(&table), &report);
    (schema, report)
}

#[test]
fn test_detect_pii_in_extract() {
    let ws = Workspace::new();
    let (schema, report) = tagged_epic_extract(&ws);

    assert_eq!(report.total_columns, 7);
    assert!(report.critical_columns.contains(&"SSN".to_string()));
    assert!(report.critical_columns.contains(&"PAT_LAST_NAME".to_string()));

    let ssn = report.result("SSN").unwrap();
    assert_eq!(ssn.hipaa_identifiers[0], HipaaIdentifier::Ssn);
    assert!(!ssn.sample_matches.is_empty());

    let birth = report.result("BIRTH_DATE").unwrap();
    assert_eq!(birth.pii_level, PiiLevel::High);

    assert!(!report.result("SEX_C").unwrap().is_pii());

    let ssn_column = schema.column("SSN").unwrap();
    assert_eq!(ssn_column.masking_strategy, MaskingStrategy::Partial);
    assert_eq!(ssn_column.masking_params["show_last"], 4);
    assert!(report.summary.contains("CRITICAL"));
}

#[test]
fn test_mapping_override_applies_to_source_columns() {
    let ws = Workspace::new();
    ws.write(
        "overrides/epic/patient_mapping.yaml",
        "field_overrides:\n  SSN:\n    masking_strategy: redact\n    masking_params:\n      \
         replacement: '***'\n  SEX_C:\n    pii_level: low\n    pii_category: quasi_identifier\n",
    );

    let (schema, _) = tagged_epic_extract(&ws);
    let overrides = SchemaOverrideLoader::new(ws.override_dir());
    let schema_override = overrides.load_mapping_override("epic", "patient").unwrap().unwrap();
    let overridden = apply_overrides(&schema, &schema_override);

    let ssn = overridden.column("SSN").unwrap();
    assert_eq!(ssn.masking_strategy, MaskingStrategy::Redact);
    assert_eq!(ssn.pii_level, PiiLevel::Critical);
    // Existing params are kept alongside the override's
    assert_eq!(ssn.masking_params["replacement"], "***");
    assert_eq!(ssn.masking_params["show_last"], 4);

    assert_eq!(overridden.column("SEX_C").unwrap().pii_level, PiiLevel::Low);
    assert_eq!(schema.column("SEX_C").unwrap().pii_level, PiiLevel::None);
}

#[test]
fn test_invalid_override_is_rejected() {
    let ws = Workspace::new();
    ws.write(
        "overrides/fhir_r4/observation.yaml",
        "field_overrides:\n  status:\n    pii_level: low\n    required: true\n",
    );

    let overrides = SchemaOverrideLoader::new(ws.override_dir());
    let err = overrides.load_fhir_override("observation").unwrap_err();
    assert!(err
        .to_string()
        .contains("Invalid override properties for field 'status': [required]"));
    assert_eq!(
        overrides.list_overrides(),
        vec!["fhir_r4/observation.yaml", "fhir_r4/patient.yaml"]
    );
}

#[test]
fn test_fhir_schema_declarations_flatten_and_inherit() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());
    let schema = loader.fhir_to_schema_definition("Patient").unwrap();

    let names = schema.column_names();
    assert!(names.contains(&"name.family"));
    assert!(names.contains(&"telecom.value"));

    let family = schema.column("name.family").unwrap();
    assert_eq!(family.pii_level, PiiLevel::Critical);
    assert_eq!(family.hipaa_identifier, Some(HipaaIdentifier::Names));
    assert_eq!(family.masking_strategy, MaskingStrategy::Redact);
}

#[test_case(MaskingPlatform::Snowflake ; "snowflake")]
#[test_case(MaskingPlatform::Databricks ; "databricks")]
#[test_case(MaskingPlatform::BigQuery ; "bigquery")]
#[test_case(MaskingPlatform::Redshift ; "redshift")]
#[test_case(MaskingPlatform::Synapse ; "synapse")]
#[test_case(MaskingPlatform::Fabric ; "fabric")]
fn test_masking_sql_for_platform(platform: MaskingPlatform) {
    let ws = Workspace::new();
    let (schema, _) = tagged_epic_extract(&ws);

    let generator = platform.generator(None);
    let policy = generator.create_policy_from_schema(&schema, "patient", Some("clinical"), None);
    let masked: Vec<&str> = policy.rules.iter().map(|r| r.column_name.as_str()).collect();
    assert!(masked.contains(&"SSN"));
    assert!(!masked.contains(&"SEX_C"));

    let sql = generator.generate_sql(&policy);
    assert_eq!(sql.apply_statements.len(), policy.rules.len());
    assert_eq!(sql.drop_statements.len(), policy.rules.len());

    let script = sql.to_script(true);
    assert!(script.starts_with("-- EHRglot Generated Masking Policies"));
    assert!(script.contains("-- Drop existing policies"));
    assert!(!sql.to_script(false).contains("-- Drop existing policies"));
}

#[test]
fn test_custom_roles_replace_defaults() {
    let ws = Workspace::new();
    let (schema, _) = tagged_epic_extract(&ws);

    let roles = AccessRoles::new(&["PRIVACY_OFFICER"], &[], &[]);
    let generator = MaskingPlatform::Snowflake.generator(Some(roles));
    let policy = generator.create_policy_from_schema(&schema, "patient", None, None);

    let rule = &policy.rules[0];
    assert_eq!(rule.full_access_roles, vec!["PRIVACY_OFFICER"]);
    assert_eq!(
        rule.partial_access_roles,
        MaskingPlatform::Snowflake.default_roles().partial_access
    );
    let sql = generator.generate_sql(&policy).to_script(false);
    assert!(sql.contains("PRIVACY_OFFICER"));
}

#[test]
fn test_audit_log_hashes_samples() {
    let ws = Workspace::new();
    let (schema, report) = tagged_epic_extract(&ws);

    let log_path = ws.path("audit/pii_audit.jsonl");
    let audit = PiiAuditLogger::new(&log_path, true).unwrap();
    audit.log_detection("epic_patients", &report, Some(&schema)).unwrap();
    audit.log_detection("epic_patients", &report, Some(&schema)).unwrap();

    let content = fs::read_to_string(&log_path).unwrap();
    assert_eq!(content.lines().count(), 2);
    assert!(!content.contains("123-45-6789"));

    let entry: AuditEntry = serde_json::from_str(content.lines().next().unwrap()).unwrap();
    assert_eq!(entry.dataset, "epic_patients");
    assert_eq!(entry.columns_with_pii, report.columns_with_pii);

    let ssn = entry.columns.iter().find(|c| c.column == "SSN").unwrap();
    assert_eq!(ssn.masking_strategy, MaskingStrategy::Partial);
    assert!(ssn.sample_hashes.contains(&hash_value("123-45-6789")));
}

#[test]
fn test_disabled_audit_log_writes_nothing() {
    let ws = Workspace::new();
    let (_, report) = tagged_epic_extract(&ws);

    let log_path = ws.path("audit/off.jsonl");
    let audit = PiiAuditLogger::new(&log_path, false).unwrap();
    audit.log_detection("epic_patients", &report, None).unwrap();
    assert!(!log_path.exists());
}
