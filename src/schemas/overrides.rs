//! Organization-specific PII overrides
//!
//! Override files mirror the schema layout under their own directory:
//!
//! ```yaml
//! description: Custom overrides for our organization
//! field_overrides:
//!   birthDate:
//!     pii_level: critical
//!     masking_strategy: redact
//!   address:
//!     masking_params:
//!       keep_state: true
//! ```
//!
//! Only the PII properties listed in [`OVERRIDABLE_PROPERTIES`] may be
//! overridden. Any other key rejects the whole file.

use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::loader::FHIR_DIR;
use crate::domain::{
    EhrglotError, HipaaIdentifier, MaskingParams, MaskingStrategy, PiiCategory, PiiLevel, Result,
    SchemaDefinition,
};

/// Properties an override may set
pub const OVERRIDABLE_PROPERTIES: [&str; 5] = [
    "pii_level",
    "pii_category",
    "hipaa_identifier",
    "masking_strategy",
    "masking_params",
];

/// Override for one field; `None` leaves the schema value alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldOverride {
    #[serde(skip)]
    pub field_name: String,
    pub pii_level: Option<PiiLevel>,
    pub pii_category: Option<PiiCategory>,
    pub hipaa_identifier: Option<HipaaIdentifier>,
    pub masking_strategy: Option<MaskingStrategy>,
    #[serde(default)]
    pub masking_params: MaskingParams,
}

impl FieldOverride {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            ..Self::default()
        }
    }

    pub fn has_overrides(&self) -> bool {
        self.pii_level.is_some()
            || self.pii_category.is_some()
            || self.hipaa_identifier.is_some()
            || self.masking_strategy.is_some()
            || !self.masking_params.is_empty()
    }
}

/// Overrides for one resource or mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaOverride {
    pub resource_name: String,
    /// Field overrides in file order
    pub field_overrides: Vec<FieldOverride>,
    pub description: String,
}

impl SchemaOverride {
    pub fn get_field_override(&self, field_name: &str) -> Option<&FieldOverride> {
        self.field_overrides.iter().find(|f| f.field_name == field_name)
    }
}

#[derive(Debug, Deserialize)]
struct RawOverride {
    #[serde(default)]
    description: String,
    #[serde(default)]
    field_overrides: serde_yaml::Mapping,
}

/// Loads override files from an override directory
#[derive(Debug)]
pub struct SchemaOverrideLoader {
    override_dir: PathBuf,
    cache: Mutex<HashMap<String, SchemaOverride>>,
}

impl SchemaOverrideLoader {
    pub fn new(override_dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: override_dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn override_dir(&self) -> &Path {
        &self.override_dir
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, SchemaOverride>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overrides for `fhir_r4/<resource>.yaml`, if the file exists
    pub fn load_fhir_override(&self, resource_name: &str) -> Result<Option<SchemaOverride>> {
        let path = self
            .override_dir
            .join(FHIR_DIR)
            .join(format!("{}.yaml", resource_name.to_lowercase()));
        self.load_cached(format!("{FHIR_DIR}:{resource_name}"), &path, resource_name)
    }

    /// Overrides for `<system>/<resource>_mapping.yaml`, if the file exists
    pub fn load_mapping_override(
        &self,
        source_system: &str,
        resource_name: &str,
    ) -> Result<Option<SchemaOverride>> {
        let path = self
            .override_dir
            .join(source_system)
            .join(format!("{}_mapping.yaml", resource_name.to_lowercase()));
        self.load_cached(
            format!("mapping:{source_system}:{resource_name}"),
            &path,
            resource_name,
        )
    }

    fn load_cached(
        &self,
        key: String,
        path: &Path,
        resource_name: &str,
    ) -> Result<Option<SchemaOverride>> {
        if let Some(cached) = self.cache().get(&key) {
            return Ok(Some(cached.clone()));
        }
        if !path.is_file() {
            return Ok(None);
        }

        let parsed = parse_override_file(path, resource_name)?;
        tracing::debug!(
            path = %path.display(),
            fields = parsed.field_overrides.len(),
            "Loaded schema override"
        );
        self.cache().insert(key, parsed.clone());
        Ok(Some(parsed))
    }

    /// Override files relative to the override directory, sorted
    pub fn list_overrides(&self) -> Vec<String> {
        let mut found = Vec::new();
        collect_yaml(&self.override_dir, &self.override_dir, &mut found);
        found.sort();
        found
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
    }
}

fn collect_yaml(root: &Path, dir: &Path, found: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        if path.is_dir() {
            collect_yaml(root, &path, found);
        } else if path.extension().is_some_and(|ext| ext == "yaml") {
            if let Ok(relative) = path.strip_prefix(root) {
                found.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
}

fn parse_override_file(path: &Path, resource_name: &str) -> Result<SchemaOverride> {
    let content = fs::read_to_string(path)
        .map_err(|e| EhrglotError::Io(format!("Failed to read {}: {e}", path.display())))?;
    let raw: RawOverride = serde_yaml::from_str(&content).map_err(|e| {
        EhrglotError::Configuration(format!("Invalid override file {}: {e}", path.display()))
    })?;

    let mut field_overrides = Vec::new();
    for (name, body) in raw.field_overrides {
        let field_name = yaml_key(&name)?;
        let body = match body {
            YamlValue::Null => YamlValue::Mapping(serde_yaml::Mapping::new()),
            other => other,
        };
        check_properties(&field_name, &body)?;

        let mut field: FieldOverride = serde_yaml::from_value(body).map_err(|e| {
            EhrglotError::Configuration(format!(
                "Invalid override for field '{field_name}' in {}: {e}",
                path.display()
            ))
        })?;
        field.field_name = field_name;
        field_overrides.push(field);
    }

    Ok(SchemaOverride {
        resource_name: resource_name.to_string(),
        field_overrides,
        description: raw.description,
    })
}

fn yaml_key(key: &YamlValue) -> Result<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        other => Err(EhrglotError::Configuration(format!(
            "Override field names must be strings, got {other:?}"
        ))),
    }
}

fn check_properties(field_name: &str, body: &YamlValue) -> Result<()> {
    let YamlValue::Mapping(map) = body else {
        return Err(EhrglotError::Configuration(format!(
            "Override for field '{field_name}' must be a mapping"
        )));
    };

    let mut invalid: Vec<String> = map
        .keys()
        .map(|k| k.as_str().map_or_else(|| format!("{k:?}"), str::to_string))
        .filter(|k| !OVERRIDABLE_PROPERTIES.contains(&k.as_str()))
        .collect();
    if invalid.is_empty() {
        return Ok(());
    }

    invalid.sort();
    Err(EhrglotError::Configuration(format!(
        "Invalid override properties for field '{field_name}': [{}]. \
         Only these properties can be overridden: [{}]",
        invalid.join(", "),
        OVERRIDABLE_PROPERTIES.join(", ")
    )))
}

/// New schema with the override applied; columns without an override are copied as-is
///
/// Override masking params are merged over the column's existing params.
pub fn apply_overrides(schema: &SchemaDefinition, overrides: &SchemaOverride) -> SchemaDefinition {
    let columns = schema
        .columns
        .iter()
        .map(|column| {
            let mut column = column.clone();
            let Some(o) = overrides.get_field_override(&column.name) else {
                return column;
            };
            if let Some(level) = o.pii_level {
                column.pii_level = level;
            }
            if let Some(category) = o.pii_category {
                column.pii_category = category;
            }
            if let Some(identifier) = o.hipaa_identifier {
                column.hipaa_identifier = Some(identifier);
            }
            if let Some(strategy) = o.masking_strategy {
                column.masking_strategy = strategy;
            }
            for (key, value) in &o.masking_params {
                column.masking_params.insert(key.clone(), value.clone());
            }
            column
        })
        .collect();

    SchemaDefinition {
        columns,
        ..schema.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ColumnMetadata, DataType};
    use serde_json::json;
    use tempfile::TempDir;

    fn write_override(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_override_is_none() {
        let dir = TempDir::new().unwrap();
        let loader = SchemaOverrideLoader::new(dir.path());
        assert!(loader.load_fhir_override("patient").unwrap().is_none());
        assert!(loader.load_mapping_override("epic", "patient").unwrap().is_none());
    }

    #[test]
    fn test_load_valid_override() {
        let dir = TempDir::new().unwrap();
        write_override(
            dir.path(),
            "fhir_r4/patient.yaml",
            "resource: Patient\ndescription: Test overrides\nfield_overrides:\n  birthDate:\n    \
             pii_level: critical\n    masking_strategy: redact\n  address:\n    pii_level: high\n    \
             masking_params:\n      keep_state: true\n",
        );
        let loader = SchemaOverrideLoader::new(dir.path());

        let o = loader.load_fhir_override("patient").unwrap().unwrap();
        assert_eq!(o.resource_name, "patient");
        assert_eq!(o.description, "Test overrides");

        let birth = o.get_field_override("birthDate").unwrap();
        assert_eq!(birth.pii_level, Some(PiiLevel::Critical));
        assert_eq!(birth.masking_strategy, Some(MaskingStrategy::Redact));
        assert!(birth.has_overrides());

        let address = o.get_field_override("address").unwrap();
        assert_eq!(address.masking_params.get("keep_state"), Some(&json!(true)));
        assert!(o.get_field_override("missing").is_none());
    }

    #[test]
    fn test_non_whitelisted_property_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_override(
            dir.path(),
            "epic_clarity/patient_mapping.yaml",
            "field_overrides:\n  ssn:\n    pii_level: critical\n    type: integer\n    required: true\n",
        );
        let loader = SchemaOverrideLoader::new(dir.path());

        let err = loader.load_mapping_override("epic_clarity", "patient").unwrap_err();
        assert!(matches!(err, EhrglotError::Configuration(_)));
        assert!(err
            .to_string()
            .contains("Invalid override properties for field 'ssn': [required, type]"));
    }

    #[test]
    fn test_empty_field_override_has_no_effect() {
        assert!(!FieldOverride::new("x").has_overrides());
    }

    #[test]
    fn test_list_overrides_sorted_relative() {
        let dir = TempDir::new().unwrap();
        write_override(dir.path(), "fhir_r4/patient.yaml", "field_overrides: {}\n");
        write_override(dir.path(), "epic/patient_mapping.yaml", "field_overrides: {}\n");
        write_override(dir.path(), "notes.txt", "ignored");
        let loader = SchemaOverrideLoader::new(dir.path());
        assert_eq!(
            loader.list_overrides(),
            vec!["epic/patient_mapping.yaml", "fhir_r4/patient.yaml"]
        );
    }

    #[test]
    fn test_apply_overrides_returns_new_schema() {
        let mut params = MaskingParams::new();
        params.insert("precision".to_string(), json!("year"));
        let schema = SchemaDefinition::new(
            "Patient",
            vec![
                ColumnMetadata::new("birthDate", DataType::Date)
                    .with_masking(MaskingStrategy::Generalize, params),
                ColumnMetadata::new("active", DataType::Boolean),
            ],
        );
        let mut birth = FieldOverride::new("birthDate");
        birth.pii_level = Some(PiiLevel::Critical);
        birth.masking_params.insert("show_last".to_string(), json!(2));
        let overrides = SchemaOverride {
            resource_name: "patient".to_string(),
            field_overrides: vec![birth],
            description: String::new(),
        };

        let tagged = apply_overrides(&schema, &overrides);
        let column = tagged.column("birthDate").unwrap();
        assert_eq!(column.pii_level, PiiLevel::Critical);
        assert_eq!(column.masking_strategy, MaskingStrategy::Generalize);
        assert_eq!(column.masking_params.len(), 2);
        assert_eq!(tagged.column("active"), schema.column("active"));
        assert_eq!(schema.column("birthDate").unwrap().pii_level, PiiLevel::None);
    }
}
