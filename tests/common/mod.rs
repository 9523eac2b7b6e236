//! Shared on-disk fixtures for integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const PATIENT_SCHEMA: &str = r#"
resource: Patient
description: Demographics and administrative information about a person
fields:
  - name: resourceType
    type: string
    required: true
  - name: id
    type: id
    required: true
  - name: active
    type: boolean
  - name: gender
    type: code
    enum: [male, female, other, unknown]
  - name: birthDate
    type: date
    pii_level: high
    hipaa_identifier: dates
    masking_strategy: generalize
    masking_params:
      precision: year
  - name: name
    type: HumanName[]
    pii_level: critical
    pii_category: direct_identifier
    hipaa_identifier: names
    masking_strategy: redact
    fields:
      - name: family
        type: string
      - name: given
        type: string[]
  - name: telecom
    type: ContactPoint[]
    fields:
      - name: system
        type: code
      - name: value
        type: string
  - name: maritalStatus
    type: CodeableConcept
"#;

pub const OBSERVATION_SCHEMA: &str = r#"
resource: Observation
fields:
  - name: resourceType
    type: string
    required: true
  - name: status
    type: code
    required: true
    enum: [registered, preliminary, final, amended, corrected, cancelled, entered-in-error, unknown]
  - name: valueQuantity
    type: Quantity
"#;

pub const EPIC_PATIENT_MAPPING: &str = r#"
source_system: epic
source_table: PATIENT
target_resource: Patient
description: Epic Clarity PATIENT to FHIR Patient
field_mappings:
  - source: ""
    target: resourceType
    default: Patient
  - source: PAT_ID
    target: id
    transform: to_string
  - source: PAT_LAST_NAME
    target: name[0].family
  - source: PAT_FIRST_NAME
    target: name[0].given[0]
  - source: SEX_C
    target: gender
    transform: epic_sex_to_fhir_gender
  - source: BIRTH_DATE
    target: birthDate
    transform: date_to_fhir_date
  - source: ""
    target: telecom[0].system
    default: phone
  - source: HOME_PHONE
    target: telecom[0].value
    transform: normalize_phone
  - source: ACTIVE_YN
    target: active
    default: true
"#;

pub const CERNER_PATIENT_MAPPING: &str = r#"
source_system: cerner
source_table: PERSON
target_resource: Patient
field_mappings:
  - source: ""
    target: resourceType
    default: Patient
  - source: PERSON_ID
    target: id
    transform: to_string
  - source: SEX_CD
    target: gender
    transform: cerner_sex_to_fhir_gender
  - source: MARITAL_CD
    target: maritalStatus.text
    transform: lookup:marital_status
"#;

pub const PATIENT_OVERRIDE: &str = r#"
description: Local policy treats birth dates as critical
field_overrides:
  birthDate:
    pii_level: critical
    masking_strategy: redact
  gender:
    pii_level: low
    pii_category: quasi_identifier
    masking_strategy: suppress
"#;

/// Temporary workspace with `schemas/`, `overrides/` and source data files
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let ws = Self { dir };
        ws.write("schemas/fhir_r4/patient.yaml", PATIENT_SCHEMA);
        ws.write("schemas/fhir_r4/observation.yaml", OBSERVATION_SCHEMA);
        ws.write("schemas/epic/patient_mapping.yaml", EPIC_PATIENT_MAPPING);
        ws.write("schemas/cerner/patient_mapping.yaml", CERNER_PATIENT_MAPPING);
        ws.write("overrides/fhir_r4/patient.yaml", PATIENT_OVERRIDE);
        ws.write_json("data/epic_patients.json", &epic_rows());
        ws
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn schema_dir(&self) -> PathBuf {
        self.path("schemas")
    }

    pub fn override_dir(&self) -> PathBuf {
        self.path("overrides")
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_json(&self, relative: &str, value: &Value) -> PathBuf {
        self.write(relative, &serde_json::to_string_pretty(value).unwrap())
    }

    pub fn read_json(&self, path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }
}

/// Epic PATIENT extract: three clean rows
pub fn epic_rows() -> Value {
    json!([
        {
            "PAT_ID": 1001,
            "PAT_LAST_NAME": "Smith",
            "PAT_FIRST_NAME": "Jane",
            "SEX_C": 2,
            "BIRTH_DATE": "1980-03-04",
            "HOME_PHONE": "(555) 123-4567",
            "SSN": "123-45-6789"
        },
        {
            "PAT_ID": 1002,
            "PAT_LAST_NAME": "Jones",
            "PAT_FIRST_NAME": "Robert",
            "SEX_C": 1,
            "BIRTH_DATE": "1975-11-30",
            "HOME_PHONE": "555.987.6543",
            "SSN": "987-65-4321"
        },
        {
            "PAT_ID": 1003,
            "PAT_LAST_NAME": "Garcia",
            "PAT_FIRST_NAME": "Maria",
            "SEX_C": "3",
            "BIRTH_DATE": "1990-07-15",
            "HOME_PHONE": "5551112222",
            "SSN": "111-22-3333"
        }
    ])
}
