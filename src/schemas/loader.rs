//! YAML schema and mapping loader
//!
//! Layout under the schema directory:
//!
//! ```text
//! <schema_dir>/fhir_r4/<resource>.yaml            FHIR resource schemas
//! <schema_dir>/<system>/<resource>_mapping.yaml   source-to-FHIR mappings
//! <schema_dir>/<namespace>/<name>.yaml            custom schemas
//! ```
//!
//! Every load is cached on the loader instance until [`SchemaLoader::clear_cache`].

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{
    BidirectionalMapping, ColumnMetadata, CustomSchema, DataType, EhrglotError, HipaaIdentifier,
    MaskingParams, MaskingStrategy, PiiCategory, PiiLevel, Result, SchemaDefinition,
    SchemaMapping,
};

/// Directory holding the FHIR R4 resource schemas
pub const FHIR_DIR: &str = "fhir_r4";

const MAPPING_SUFFIX: &str = "_mapping";

/// A field of a FHIR resource schema, with PII inheritance already resolved
#[derive(Debug, Clone, PartialEq)]
pub struct FhirField {
    pub name: String,
    /// Type name exactly as written in the schema (`string`, `HumanName[]`, ...)
    pub type_name: String,
    pub required: bool,
    pub pii_level: PiiLevel,
    pub pii_category: PiiCategory,
    pub hipaa_identifier: Option<HipaaIdentifier>,
    pub masking_strategy: MaskingStrategy,
    pub masking_params: MaskingParams,
    pub description: String,
    pub enum_values: Option<Vec<String>>,
    pub default_value: Option<Value>,
    /// Nested BackboneElement fields
    pub fields: Vec<FhirField>,
}

impl FhirField {
    pub fn data_type(&self) -> DataType {
        DataType::parse_lenient(&self.type_name)
    }
}

/// A FHIR R4 resource schema
#[derive(Debug, Clone, PartialEq)]
pub struct FhirResourceSchema {
    pub resource: String,
    pub version: String,
    pub fields: Vec<FhirField>,
    pub fhir_url: String,
    pub description: String,
}

impl FhirResourceSchema {
    pub fn field(&self, name: &str) -> Option<&FhirField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct RawResource {
    resource: String,
    #[serde(default = "default_fhir_version")]
    version: String,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    fhir_url: String,
    #[serde(default)]
    description: String,
}

/// PII properties are optional here so a child can tell "unset" from "none"
#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    required: bool,
    pii_level: Option<PiiLevel>,
    pii_category: Option<PiiCategory>,
    hipaa_identifier: Option<HipaaIdentifier>,
    masking_strategy: Option<MaskingStrategy>,
    masking_params: Option<MaskingParams>,
    #[serde(default)]
    description: String,
    #[serde(rename = "enum")]
    enum_values: Option<Vec<String>>,
    #[serde(rename = "default")]
    default_value: Option<Value>,
    #[serde(default)]
    fields: Vec<RawField>,
}

impl RawField {
    /// Resolve against the parent: unset PII properties are inherited
    fn resolve(self, parent: Option<&FhirField>) -> FhirField {
        let mut field = FhirField {
            name: self.name,
            type_name: self.type_name,
            required: self.required,
            pii_level: self.pii_level.or(parent.map(|p| p.pii_level)).unwrap_or_default(),
            pii_category: self
                .pii_category
                .or(parent.map(|p| p.pii_category))
                .unwrap_or_default(),
            hipaa_identifier: self.hipaa_identifier.or(parent.and_then(|p| p.hipaa_identifier)),
            masking_strategy: self
                .masking_strategy
                .or(parent.map(|p| p.masking_strategy))
                .unwrap_or_default(),
            masking_params: self
                .masking_params
                .or_else(|| parent.map(|p| p.masking_params.clone()))
                .unwrap_or_default(),
            description: self.description,
            enum_values: self.enum_values,
            default_value: self.default_value,
            fields: Vec::new(),
        };

        let children: Vec<FhirField> = self
            .fields
            .into_iter()
            .map(|child| child.resolve(Some(&field)))
            .collect();
        field.fields = children;
        field
    }
}

#[derive(Debug, Default)]
struct Cache {
    fhir: HashMap<String, FhirResourceSchema>,
    mappings: HashMap<String, SchemaMapping>,
    bidirectional: HashMap<String, BidirectionalMapping>,
    custom: HashMap<String, CustomSchema>,
}

/// Loads schema, mapping and custom-schema YAML files
#[derive(Debug)]
pub struct SchemaLoader {
    schema_dir: PathBuf,
    cache: Mutex<Cache>,
}

impl SchemaLoader {
    pub fn new(schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema_dir: schema_dir.into(),
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn schema_dir(&self) -> &Path {
        &self.schema_dir
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load `fhir_r4/<resource>.yaml`
    ///
    /// # Errors
    ///
    /// `NotFound` when the file does not exist, `Configuration` when it is not
    /// a valid resource schema.
    pub fn load_fhir_resource(&self, resource_name: &str) -> Result<FhirResourceSchema> {
        let key = resource_name.to_lowercase();
        if let Some(schema) = self.cache().fhir.get(&key) {
            return Ok(schema.clone());
        }

        let path = self.schema_dir.join(FHIR_DIR).join(format!("{key}.yaml"));
        if !path.is_file() {
            return Err(EhrglotError::NotFound(format!(
                "FHIR schema not found: {}",
                path.display()
            )));
        }

        let raw: RawResource = read_yaml(&path)?;
        let schema = FhirResourceSchema {
            resource: raw.resource,
            version: raw.version,
            fields: raw.fields.into_iter().map(|f| f.resolve(None)).collect(),
            fhir_url: raw.fhir_url,
            description: raw.description,
        };

        tracing::debug!(
            resource = %schema.resource,
            fields = schema.fields.len(),
            "Loaded FHIR schema"
        );
        self.cache().fhir.insert(key, schema.clone());
        Ok(schema)
    }

    /// Load `<system>/<resource>_mapping.yaml`
    pub fn load_mapping(&self, source_system: &str, resource_name: &str) -> Result<SchemaMapping> {
        let key = format!("{source_system}:{}", resource_name.to_lowercase());
        if let Some(mapping) = self.cache().mappings.get(&key) {
            return Ok(mapping.clone());
        }

        let path = self.mapping_path(source_system, resource_name);
        if !path.is_file() {
            return Err(EhrglotError::NotFound(format!(
                "Mapping not found: {}",
                path.display()
            )));
        }

        let mapping: SchemaMapping = read_yaml(&path)?;
        if let Some(rule) = mapping.field_mappings.iter().find(|m| m.target.is_empty()) {
            return Err(EhrglotError::Mapping(format!(
                "Field mapping with source '{}' has an empty target in {}",
                rule.source,
                path.display()
            )));
        }

        tracing::debug!(
            source_system,
            target = %mapping.target_resource,
            rules = mapping.field_mappings.len(),
            "Loaded mapping"
        );
        self.cache().mappings.insert(key, mapping.clone());
        Ok(mapping)
    }

    /// Load `<namespace>/<name>_mapping.yaml` as a bidirectional mapping
    pub fn load_bidirectional_mapping(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<BidirectionalMapping> {
        let key = format!("{namespace}/{name}");
        if let Some(mapping) = self.cache().bidirectional.get(&key) {
            return Ok(mapping.clone());
        }

        let path = self.mapping_path(namespace, name);
        if !path.is_file() {
            return Err(EhrglotError::NotFound(format!(
                "Mapping not found: {}",
                path.display()
            )));
        }

        let mapping: BidirectionalMapping = read_yaml(&path)?;
        self.cache().bidirectional.insert(key, mapping.clone());
        Ok(mapping)
    }

    /// Load a custom schema by its `namespace/name`
    ///
    /// Registered schemas are returned without touching the filesystem.
    pub fn load_custom_schema(&self, qualified_name: &str) -> Result<CustomSchema> {
        if let Some(schema) = self.get_custom_schema(qualified_name) {
            return Ok(schema);
        }

        let (namespace, name) = qualified_name.split_once('/').ok_or_else(|| {
            EhrglotError::Configuration(format!(
                "Custom schema name must be '<namespace>/<name>', got '{qualified_name}'"
            ))
        })?;

        let path = self.schema_dir.join(namespace).join(format!("{name}.yaml"));
        if !path.is_file() {
            return Err(EhrglotError::NotFound(format!(
                "Custom schema not found: {}",
                path.display()
            )));
        }

        let mut schema: CustomSchema = read_yaml(&path)?;
        if schema.namespace.is_empty() {
            schema.namespace = namespace.to_string();
        }
        self.register_custom_schema(schema.clone());
        Ok(schema)
    }

    /// Make a custom schema available under its qualified name
    pub fn register_custom_schema(&self, schema: CustomSchema) {
        self.cache().custom.insert(schema.qualified_name(), schema);
    }

    pub fn get_custom_schema(&self, qualified_name: &str) -> Option<CustomSchema> {
        self.cache().custom.get(qualified_name).cloned()
    }

    /// Flatten a FHIR resource schema into columns
    ///
    /// Nested fields become `parent.child` columns after their parent.
    pub fn fhir_to_schema_definition(&self, resource_name: &str) -> Result<SchemaDefinition> {
        let fhir = self.load_fhir_resource(resource_name)?;

        let mut columns = Vec::new();
        for field in &fhir.fields {
            flatten_field(field, None, &mut columns);
        }

        Ok(SchemaDefinition {
            name: fhir.resource.clone(),
            version: fhir.version,
            columns,
            description: fhir.description,
            source_system: None,
            target_resource: Some(fhir.resource),
        })
    }

    /// Resource names with a schema under `fhir_r4/`, sorted
    pub fn list_fhir_resources(&self) -> Vec<String> {
        yaml_stems(&self.schema_dir.join(FHIR_DIR))
    }

    /// Directories other than `fhir_r4/` that contain mapping files, sorted
    pub fn list_source_systems(&self) -> Vec<String> {
        self.namespaces()
            .into_iter()
            .filter(|system| !self.list_mappings(system).is_empty())
            .collect()
    }

    /// Target resources with a mapping from `source_system`, sorted
    pub fn list_mappings(&self, source_system: &str) -> Vec<String> {
        yaml_stems(&self.schema_dir.join(source_system))
            .into_iter()
            .filter_map(|stem| stem.strip_suffix(MAPPING_SUFFIX).map(str::to_string))
            .collect()
    }

    /// Qualified names of custom schemas found on disk or registered, sorted
    pub fn list_custom_schemas(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .namespaces()
            .into_iter()
            .flat_map(|namespace| {
                yaml_stems(&self.schema_dir.join(&namespace))
                    .into_iter()
                    .filter(|stem| !stem.ends_with(MAPPING_SUFFIX))
                    .map(move |stem| format!("{namespace}/{stem}"))
            })
            .collect();

        for name in self.cache().custom.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    pub fn clear_cache(&self) {
        *self.cache() = Cache::default();
    }

    fn mapping_path(&self, namespace: &str, name: &str) -> PathBuf {
        self.schema_dir
            .join(namespace)
            .join(format!("{}{MAPPING_SUFFIX}.yaml", name.to_lowercase()))
    }

    fn namespaces(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.schema_dir) else {
            return Vec::new();
        };
        let mut dirs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| name != FHIR_DIR)
            .collect();
        dirs.sort();
        dirs
    }
}

fn flatten_field(field: &FhirField, prefix: Option<&str>, columns: &mut Vec<ColumnMetadata>) {
    let name = match prefix {
        Some(parent) => format!("{parent}.{}", field.name),
        None => field.name.clone(),
    };

    columns.push(ColumnMetadata {
        name: name.clone(),
        data_type: field.data_type(),
        nullable: !field.required,
        description: field.description.clone(),
        pii_level: field.pii_level,
        pii_category: field.pii_category,
        hipaa_identifier: field.hipaa_identifier,
        masking_strategy: field.masking_strategy,
        masking_params: field.masking_params.clone(),
        source_column: None,
        transform: None,
    });

    for child in &field.fields {
        flatten_field(child, Some(&name), columns);
    }
}

fn yaml_stems(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut stems: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "yaml"))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    stems.sort();
    stems
}

pub(crate) fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| EhrglotError::Io(format!("Failed to read {}: {e}", path.display())))?;
    serde_yaml::from_str(&content).map_err(|e| {
        EhrglotError::Configuration(format!("Invalid YAML in {}: {e}", path.display()))
    })
}

fn default_fhir_version() -> String {
    "R4".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CustomSchemaField;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const LOCATION: &str = r#"
resource: Location
version: R4
fields:
  - name: id
    type: id
    required: true
  - name: position
    type: BackboneElement
    pii_level: medium
    pii_category: quasi_identifier
    masking_strategy: suppress
    fields:
      - name: longitude
        type: decimal
        required: true
      - name: altitude
        type: decimal
        pii_level: low
        masking_strategy: partial
  - name: hoursOfOperation
    type: BackboneElement[]
    fields:
      - name: allDay
        type: boolean
"#;

    #[test]
    fn test_nested_fields_inherit_parent_pii() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "fhir_r4/location.yaml", LOCATION);
        let loader = SchemaLoader::new(dir.path());

        let schema = loader.load_fhir_resource("Location").unwrap();
        let position = schema.field("position").unwrap();
        let longitude = &position.fields[0];
        assert_eq!(longitude.pii_level, PiiLevel::Medium);
        assert_eq!(longitude.pii_category, PiiCategory::QuasiIdentifier);
        assert_eq!(longitude.masking_strategy, MaskingStrategy::Suppress);

        let altitude = &position.fields[1];
        assert_eq!(altitude.pii_level, PiiLevel::Low);
        assert_eq!(altitude.pii_category, PiiCategory::QuasiIdentifier);
        assert_eq!(altitude.masking_strategy, MaskingStrategy::Partial);

        let hours = schema.field("hoursOfOperation").unwrap();
        assert_eq!(hours.fields[0].pii_level, PiiLevel::None);
    }

    #[test]
    fn test_schema_definition_flattens_nested_fields() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "fhir_r4/location.yaml", LOCATION);
        let loader = SchemaLoader::new(dir.path());

        let def = loader.fhir_to_schema_definition("location").unwrap();
        assert_eq!(
            def.column_names(),
            vec![
                "id",
                "position",
                "position.longitude",
                "position.altitude",
                "hoursOfOperation",
                "hoursOfOperation.allDay"
            ]
        );
        assert!(!def.column("id").unwrap().nullable);
        assert_eq!(def.column("hoursOfOperation").unwrap().data_type, DataType::Array);
        assert_eq!(
            def.column("position.longitude").unwrap().masking_strategy,
            MaskingStrategy::Suppress
        );
        assert_eq!(def.target_resource.as_deref(), Some("Location"));
    }

    #[test]
    fn test_missing_files_are_not_found() {
        let dir = TempDir::new().unwrap();
        let loader = SchemaLoader::new(dir.path());

        let err = loader.load_fhir_resource("patient").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("FHIR schema not found:"));

        let err = loader.load_mapping("epic_clarity", "patient").unwrap_err();
        assert!(err.to_string().starts_with("Mapping not found:"));
        assert!(err.to_string().ends_with("patient_mapping.yaml"));
    }

    #[test]
    fn test_load_mapping_and_listings() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "epic_clarity/patient_mapping.yaml",
            "source_system: epic_clarity\nsource_table: PATIENT\ntarget_resource: Patient\n\
             field_mappings:\n  - source: PAT_ID\n    target: id\n    transform: to_string\n",
        );
        write(dir.path(), "fhir_r4/patient.yaml", "resource: Patient\nfields: []\n");
        write(dir.path(), "custom/warehouse.yaml", "name: warehouse\nfields: []\n");
        write(
            dir.path(),
            "custom/patient_warehouse_mapping.yaml",
            "source_schema: fhir_r4/patient\ntarget_schema: custom/warehouse\n",
        );
        let loader = SchemaLoader::new(dir.path());

        let mapping = loader.load_mapping("epic_clarity", "Patient").unwrap();
        assert_eq!(mapping.source_table, "PATIENT");
        assert_eq!(mapping.field_mappings[0].transform.as_deref(), Some("to_string"));

        assert_eq!(loader.list_fhir_resources(), vec!["patient"]);
        assert_eq!(loader.list_source_systems(), vec!["custom", "epic_clarity"]);
        assert_eq!(loader.list_mappings("epic_clarity"), vec!["patient"]);
        assert_eq!(loader.list_custom_schemas(), vec!["custom/warehouse"]);

        let bimap = loader.load_bidirectional_mapping("custom", "patient_warehouse").unwrap();
        assert!(bimap.auto_reverse);
        assert_eq!(bimap.target_schema, "custom/warehouse");
    }

    #[test]
    fn test_custom_schema_register_and_load() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "custom/test_schema.yaml",
            "name: test_schema\nversion: \"2.0\"\nfields:\n  - name: patient_key\n    type: string\n    \
             required: true\n    pii_level: high\n",
        );
        let loader = SchemaLoader::new(dir.path());

        let schema = loader.load_custom_schema("custom/test_schema").unwrap();
        assert_eq!(schema.version, "2.0");
        assert_eq!(schema.namespace, "custom");
        assert_eq!(schema.fields[0].pii_level, PiiLevel::High);
        assert!(loader.get_custom_schema("custom/test_schema").is_some());

        loader.register_custom_schema(CustomSchema {
            name: "registered".to_string(),
            version: "1.0".to_string(),
            fields: vec![CustomSchemaField {
                name: "id".to_string(),
                data_type: DataType::String,
                required: true,
                pii_level: PiiLevel::None,
                pii_category: PiiCategory::None,
                hipaa_identifier: None,
                masking_strategy: MaskingStrategy::None,
                masking_params: MaskingParams::new(),
                description: String::new(),
            }],
            description: String::new(),
            namespace: "mem".to_string(),
        });
        assert!(loader.list_custom_schemas().contains(&"mem/registered".to_string()));

        assert!(matches!(
            loader.load_custom_schema("no-namespace"),
            Err(EhrglotError::Configuration(_))
        ));
    }

    #[test]
    fn test_cache_survives_file_removal_until_cleared() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "fhir_r4/patient.yaml", "resource: Patient\nfields: []\n");
        let loader = SchemaLoader::new(dir.path());

        loader.load_fhir_resource("patient").unwrap();
        fs::remove_file(dir.path().join("fhir_r4/patient.yaml")).unwrap();
        assert!(loader.load_fhir_resource("patient").is_ok());

        loader.clear_cache();
        assert!(loader.load_fhir_resource("patient").is_err());
    }
}
