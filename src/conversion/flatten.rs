//! Flattening of nested FHIR resources into tabular rows
//!
//! Nested keys are joined with `_`:
//! - `{"name": {"family": "Doe"}}` → `"name_family"`
//! - `{"name": [{"given": ["Ann"]}]}` → `"name_0_given_0"`, `"name_0_given_count"`,
//!   `"name_count"`
//!
//! Keys that already contain `.` have it replaced with `_`.

use serde_json::{Map, Value};

/// Flatten a resource into a single-level record
///
/// Non-object input yields an empty record. Empty arrays produce no columns.
pub fn flatten_record(resource: &Value) -> Map<String, Value> {
    let mut flat = Map::new();
    if let Value::Object(map) = resource {
        flatten_into(map, "", &mut flat);
    }
    flat
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, flat: &mut Map<String, Value>) {
    for (key, value) in map {
        let full_key = format!("{prefix}{}", flatten_key(key));
        flatten_value(value, &full_key, flat);
    }
}

fn flatten_value(value: &Value, full_key: &str, flat: &mut Map<String, Value>) {
    match value {
        Value::Object(child) => flatten_into(child, &format!("{full_key}_"), flat),
        Value::Array(items) => {
            if items.is_empty() {
                return;
            }
            for (index, item) in items.iter().enumerate() {
                flatten_value(item, &format!("{full_key}_{index}"), flat);
            }
            flat.insert(format!("{full_key}_count"), Value::from(items.len()));
        }
        scalar => {
            flat.insert(full_key.to_string(), scalar.clone());
        }
    }
}

fn flatten_key(key: &str) -> String {
    key.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_patient() {
        let patient = json!({
            "resourceType": "Patient",
            "id": "123",
            "name": [
                {"family": "Doe", "given": ["John", "Q"]},
                {"family": "Smith"}
            ],
            "address": {"city": "Boston"},
            "telecom": []
        });

        let flat = flatten_record(&patient);

        assert_eq!(flat["resourceType"], "Patient");
        assert_eq!(flat["name_0_family"], "Doe");
        assert_eq!(flat["name_0_given_0"], "John");
        assert_eq!(flat["name_0_given_1"], "Q");
        assert_eq!(flat["name_0_given_count"], 2);
        assert_eq!(flat["name_1_family"], "Smith");
        assert_eq!(flat["name_count"], 2);
        assert_eq!(flat["address_city"], "Boston");
        assert!(!flat.contains_key("telecom_count"));
    }

    #[test]
    fn test_flatten_keeps_key_order_and_nulls() {
        let flat = flatten_record(&json!({"b": null, "a": 1, "meta.source": "epic"}));
        let keys: Vec<&String> = flat.keys().collect();
        assert_eq!(keys, vec!["b", "a", "meta_source"]);
        assert!(flat["b"].is_null());
    }

    #[test]
    fn test_flatten_non_object() {
        assert!(flatten_record(&json!([1, 2])).is_empty());
    }
}
