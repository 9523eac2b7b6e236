//! Integration tests for schema loading and row mapping

mod common;

use common::{epic_rows, Workspace};
use ehrglot::mapping::{BidirectionalMapper, LookupTables, SchemaMapper};
use ehrglot::schemas::SchemaLoader;
use serde_json::json;
use std::collections::HashMap;

#[test]
fn test_epic_mapping_from_disk() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());
    let mapping = loader.load_mapping("epic", "Patient").unwrap();
    assert_eq!(mapping.source_table, "PATIENT");

    let mapper = SchemaMapper::new(mapping);
    let rows = epic_rows();
    let (patients, errors) = mapper.map_dataset(rows.as_array().unwrap(), None);

    assert!(errors.is_empty());
    assert_eq!(patients.len(), 3);

    let jane = &patients[0];
    assert_eq!(jane["resourceType"], "Patient");
    assert_eq!(jane["id"], "1001");
    assert_eq!(jane["gender"], "female");
    assert_eq!(jane["birthDate"], "1980-03-04");
    assert_eq!(jane["name"][0]["family"], "Smith");
    assert_eq!(jane["name"][0]["given"][0], "Jane");
    assert_eq!(jane["telecom"][0]["system"], "phone");
    assert_eq!(jane["telecom"][0]["value"], "(555) 123-4567");
    assert_eq!(jane["active"], true);

    assert_eq!(patients[1]["gender"], "male");
    assert_eq!(patients[1]["telecom"][0]["value"], "(555) 987-6543");
    assert_eq!(patients[2]["gender"], "other");
}

#[test]
fn test_unmapped_source_columns_are_dropped() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());
    let mapper = SchemaMapper::new(loader.load_mapping("epic", "patient").unwrap());

    let (patient, _) = mapper.map_row(&epic_rows()[0], None);
    assert!(patient.get("SSN").is_none());
    assert!(patient.get("PAT_ID").is_none());
}

#[test]
fn test_cerner_lookup_tables() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());
    let mapper = SchemaMapper::new(loader.load_mapping("cerner", "patient").unwrap());

    let mut lookups: LookupTables = HashMap::new();
    lookups.insert(
        "marital_status".to_string(),
        HashMap::from([
            ("M".to_string(), json!("Married")),
            ("S".to_string(), json!("Never Married")),
        ]),
    );

    let rows = vec![
        json!({"PERSON_ID": 77, "SEX_CD": 363, "MARITAL_CD": "M"}),
        json!({"PERSON_ID": 78, "SEX_CD": 362, "MARITAL_CD": "W"}),
    ];
    let (patients, errors) = mapper.map_dataset(&rows, Some(&lookups));

    assert!(errors.is_empty());
    assert_eq!(patients[0]["gender"], "female");
    assert_eq!(patients[0]["maritalStatus"]["text"], "Married");
    // Codes missing from the table pass through
    assert_eq!(patients[1]["maritalStatus"]["text"], "W");
    assert_eq!(patients[1]["gender"], "male");
}

#[test]
fn test_missing_lookup_table_is_a_row_error() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());
    let mapper = SchemaMapper::new(loader.load_mapping("cerner", "patient").unwrap());

    let rows = vec![
        json!({"PERSON_ID": 77, "MARITAL_CD": "M"}),
        json!({"PERSON_ID": 78}),
    ];
    let (patients, errors) = mapper.map_dataset(&rows, None);

    assert_eq!(patients.len(), 2);
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].0, 0);
    assert_eq!(errors[0].1, vec!["Unknown lookup table: marital_status"]);
    assert_eq!(patients[0]["id"], "77");
}

#[test]
fn test_bidirectional_mapping_from_disk() {
    let ws = Workspace::new();
    ws.write(
        "schemas/crm/contact_mapping.yaml",
        r#"
source_schema: crm.contact
target_schema: Patient
description: CRM contact sync
field_mappings:
  - source: contact_id
    target: id
  - source: surname
    target: name.family
  - source: ""
    target: resourceType
    default: Patient
"#,
    );

    let loader = SchemaLoader::new(ws.schema_dir());
    let mapping = loader.load_bidirectional_mapping("crm", "contact").unwrap();
    let mapper = BidirectionalMapper::new(mapping);

    let source = json!({"contact_id": "C-9", "surname": "Okafor"});
    let (patient, errors) = mapper.forward(&source, None);
    assert!(errors.is_empty());
    assert_eq!(patient["name"]["family"], "Okafor");
    assert_eq!(patient["resourceType"], "Patient");

    let (round_trip, errors) = mapper.reverse(&patient, None);
    assert!(errors.is_empty());
    assert_eq!(round_trip, source);
}

#[test]
fn test_missing_mapping_is_not_found() {
    let ws = Workspace::new();
    let loader = SchemaLoader::new(ws.schema_dir());

    let err = loader.load_mapping("meditech", "patient").unwrap_err();
    assert!(err.is_not_found());
    assert!(err.to_string().starts_with("Mapping not found"));
}

#[test]
fn test_listing() {
    let ws = Workspace::new();
    ws.write("schemas/acme/lab_result.yaml", "name: lab_result\nnamespace: acme\nfields: []\n");
    let loader = SchemaLoader::new(ws.schema_dir());

    assert_eq!(loader.list_source_systems(), vec!["cerner", "epic"]);
    assert_eq!(loader.list_fhir_resources(), vec!["observation", "patient"]);
    assert_eq!(loader.list_mappings("epic"), vec!["patient"]);
    assert!(loader.list_custom_schemas().contains(&"acme/lab_result".to_string()));
}
