//! FHIR resource validation against loaded resource schemas
//!
//! Checks required fields, JSON types, primitive formats and enum membership.
//! A resource whose type has no schema is reported with a warning and counts
//! as valid.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::schemas::{FhirField, SchemaLoader};

static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\-.]{1,64}$").expect("valid id pattern"));
static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}(-\d{2}(-\d{2})?)?$").expect("valid date pattern"));
static DATETIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})?)?$")
        .expect("valid datetime pattern")
});

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    /// `required`, `type_error`, `format_error`, `enum_error` or `unknown`
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// Outcome of validating one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub resource_type: String,
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    fn add_error(
        &mut self,
        field: &str,
        error_type: &str,
        message: String,
        value: Option<&Value>,
    ) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            error_type: error_type.to_string(),
            message,
            value: value.cloned(),
        });
        self.is_valid = false;
    }

    fn add_warning(&mut self, field: &str, error_type: &str, message: String) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            error_type: error_type.to_string(),
            message,
            value: None,
        });
    }
}

/// Aggregate over a batch of validation results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSummary {
    pub total_resources: usize,
    pub valid_resources: usize,
    pub invalid_resources: usize,
    /// Fraction of valid resources, 0 for an empty batch
    pub validation_rate: f64,
    pub total_errors: usize,
    pub error_types: BTreeMap<String, usize>,
}

/// Validates resources against the FHIR schemas a [`SchemaLoader`] provides
#[derive(Debug, Clone, Copy)]
pub struct FhirValidator<'a> {
    loader: &'a SchemaLoader,
}

impl<'a> FhirValidator<'a> {
    pub fn new(loader: &'a SchemaLoader) -> Self {
        Self { loader }
    }

    /// Validate one resource
    ///
    /// `resource_type` defaults to the resource's own `resourceType`.
    pub fn validate_resource(
        &self,
        resource: &Value,
        resource_type: Option<&str>,
    ) -> ValidationResult {
        let resource_type = resource_type
            .or_else(|| resource.get("resourceType").and_then(Value::as_str))
            .unwrap_or_default()
            .to_string();
        let mut result = ValidationResult::new(&resource_type);

        if resource_type.is_empty() {
            result.add_error(
                "resourceType",
                "required",
                "resourceType is required".to_string(),
                None,
            );
            return result;
        }

        let schema = match self.loader.load_fhir_resource(&resource_type) {
            Ok(schema) => schema,
            Err(e) => {
                tracing::debug!(resource_type = %resource_type, error = %e, "No schema found");
                result.add_warning(
                    "resourceType",
                    "unknown",
                    format!("No schema found for {resource_type}"),
                );
                return result;
            }
        };

        validate_fields(resource, &schema.fields, None, &mut result);
        result
    }

    pub fn validate_batch(
        &self,
        resources: &[Value],
        resource_type: Option<&str>,
    ) -> Vec<ValidationResult> {
        resources
            .iter()
            .map(|r| self.validate_resource(r, resource_type))
            .collect()
    }

    pub fn get_validation_summary(&self, results: &[ValidationResult]) -> ValidationSummary {
        summarize(results)
    }
}

/// Summary statistics for a batch of results
pub fn summarize(results: &[ValidationResult]) -> ValidationSummary {
    let total = results.len();
    let valid = results.iter().filter(|r| r.is_valid).count();
    let mut error_types = BTreeMap::new();
    for error in results.iter().flat_map(|r| &r.errors) {
        *error_types.entry(error.error_type.clone()).or_insert(0) += 1;
    }

    ValidationSummary {
        total_resources: total,
        valid_resources: valid,
        invalid_resources: total - valid,
        validation_rate: if total > 0 { valid as f64 / total as f64 } else { 0.0 },
        total_errors: results.iter().map(ValidationResult::error_count).sum(),
        error_types,
    }
}

fn validate_fields(
    object: &Value,
    fields: &[FhirField],
    prefix: Option<&str>,
    result: &mut ValidationResult,
) {
    for field in fields {
        let name = match prefix {
            Some(parent) => format!("{parent}.{}", field.name),
            None => field.name.clone(),
        };
        let value = object.get(&field.name).filter(|v| !v.is_null());

        let Some(value) = value else {
            if field.required {
                result.add_error(
                    &name,
                    "required",
                    format!("Required field '{name}' is missing"),
                    None,
                );
            }
            continue;
        };

        validate_type(value, &field.type_name, &name, result);

        if let Some(allowed) = &field.enum_values {
            let ok = value.as_str().is_some_and(|s| allowed.iter().any(|a| a == s));
            if !ok {
                result.add_error(
                    &name,
                    "enum_error",
                    format!("Value must be one of: [{}]", allowed.join(", ")),
                    Some(value),
                );
            }
        }

        if !field.fields.is_empty() && value.is_object() {
            validate_fields(value, &field.fields, Some(&name), result);
        }
    }
}

fn is_array_type(type_name: &str) -> bool {
    let lower = type_name.to_lowercase();
    lower.ends_with("[]") || lower.starts_with("array<") || lower.starts_with("list<")
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_type(value: &Value, type_name: &str, field: &str, result: &mut ValidationResult) {
    if is_array_type(type_name) {
        if !value.is_array() {
            result.add_error(
                field,
                "type_error",
                format!("Expected array, got {}", json_type_name(value)),
                Some(value),
            );
        }
        return;
    }

    let type_error = |expected: &str, result: &mut ValidationResult| {
        result.add_error(
            field,
            "type_error",
            format!("Expected {expected}, got {}", json_type_name(value)),
            Some(value),
        );
    };

    match type_name.to_lowercase().as_str() {
        "string" if !value.is_string() => type_error("string", result),
        "integer" | "positiveint" | "unsignedint" if !(value.is_i64() || value.is_u64()) => {
            type_error("integer", result)
        }
        "decimal" | "float" if !value.is_number() => type_error("number", result),
        "boolean" if !value.is_boolean() => type_error("boolean", result),
        "date" => {
            if value.as_str().is_some_and(|s| !DATE_PATTERN.is_match(s)) {
                result.add_error(
                    field,
                    "format_error",
                    "Invalid date format (expected YYYY-MM-DD)".to_string(),
                    Some(value),
                );
            }
        }
        "datetime" | "instant" => {
            if value.as_str().is_some_and(|s| !DATETIME_PATTERN.is_match(s)) {
                result.add_error(
                    field,
                    "format_error",
                    "Invalid datetime format".to_string(),
                    Some(value),
                );
            }
        }
        "id" => {
            if value.as_str().is_some_and(|s| !ID_PATTERN.is_match(s)) {
                result.add_error(
                    field,
                    "format_error",
                    "Invalid FHIR id format".to_string(),
                    Some(value),
                );
            }
        }
        _ => {}
    }
}
