//! Named value transforms used by field-mapping rules
//!
//! A transform is a pure function from one JSON value to another. The
//! built-ins are total: malformed input passes through as a best-effort string
//! (or null) rather than producing an error. User-registered transforms may
//! return `Err`, which the mapper records against the row.
//!
//! The built-in table is built once on first use and shared read-only by every
//! mapper. Custom transforms are registered per mapper instance.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Signature shared by built-in and user-registered transforms
pub type TransformFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

static BUILTIN_TRANSFORMS: LazyLock<HashMap<&'static str, TransformFn>> = LazyLock::new(|| {
    let entries: [(&'static str, fn(&Value) -> Value); 14] = [
        ("to_string", to_string),
        ("date_to_fhir_date", date_to_fhir_date),
        ("datetime_to_fhir_datetime", datetime_to_fhir_datetime),
        ("normalize_phone", normalize_phone),
        ("epic_sex_to_fhir_gender", epic_sex_to_fhir_gender),
        ("cerner_sex_to_fhir_gender", cerner_sex_to_fhir_gender),
        ("hl7_datetime_to_fhir_date", hl7_datetime_to_fhir_date),
        ("hl7_datetime_to_fhir_datetime", hl7_datetime_to_fhir_datetime),
        ("hl7_datetime_to_fhir_instant", hl7_datetime_to_fhir_instant),
        ("hl7_sex_to_fhir_gender", hl7_sex_to_fhir_gender),
        ("hl7_abnormal_flag_to_fhir", hl7_abnormal_flag_to_fhir),
        ("hl7_result_status_to_fhir", hl7_result_status_to_fhir),
        ("hl7_yn_to_boolean", hl7_yn_to_boolean),
        ("hl7_coding_system_to_uri", hl7_coding_system_to_uri),
    ];

    entries
        .into_iter()
        .map(|(name, f)| {
            let wrapped: TransformFn = Arc::new(move |v: &Value| Ok(f(v)));
            (name, wrapped)
        })
        .collect()
});

/// Look up a built-in transform by name
pub fn builtin(name: &str) -> Option<TransformFn> {
    BUILTIN_TRANSFORMS.get(name).cloned()
}

/// Names of all built-in transforms, sorted
pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTIN_TRANSFORMS.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Render a value the way a human would write it: strings unquoted, everything else as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Null-preserving string coercion
pub fn to_string(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::String(value_to_string(other)),
    }
}

/// Normalize common date layouts to `YYYY-MM-DD`
pub fn date_to_fhir_date(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let raw = value_to_string(value);
    ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&raw, fmt).ok())
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::String(raw))
}

/// Normalize common datetime layouts to ISO 8601 (`YYYY-MM-DDTHH:MM:SS`)
pub fn datetime_to_fhir_datetime(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let raw = value_to_string(value);
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&raw, fmt).ok())
        .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
        .unwrap_or(Value::String(raw))
}

/// Format 10-digit and 1-prefixed 11-digit numbers as `(555) 123-4567`
pub fn normalize_phone(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let raw = value_to_string(value);
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        10 => Value::String(format!(
            "({}) {}-{}",
            &digits[..3],
            &digits[3..6],
            &digits[6..]
        )),
        11 if digits.starts_with('1') => Value::String(format!(
            "+1 ({}) {}-{}",
            &digits[1..4],
            &digits[4..7],
            &digits[7..]
        )),
        _ => Value::String(raw),
    }
}

fn numeric_code(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Epic `SEX_C` codes (1/2/3 or M/F) to FHIR administrative gender
pub fn epic_sex_to_fhir_gender(value: &Value) -> Value {
    let gender = match value {
        Value::Number(_) => match numeric_code(value) {
            Some(c) if c == 1.0 => "male",
            Some(c) if c == 2.0 => "female",
            Some(c) if c == 3.0 => "other",
            _ => "unknown",
        },
        Value::String(s) => match s.as_str() {
            "1" | "M" => "male",
            "2" | "F" => "female",
            "3" => "other",
            _ => "unknown",
        },
        _ => "unknown",
    };
    Value::String(gender.to_string())
}

/// Cerner `SEX_CD` code values to FHIR administrative gender
pub fn cerner_sex_to_fhir_gender(value: &Value) -> Value {
    let gender = match numeric_code(value) {
        Some(c) if c == 362.0 => "male",
        Some(c) if c == 363.0 => "female",
        _ => "unknown",
    };
    Value::String(gender.to_string())
}

fn hl7_chars(value: &Value) -> Option<Vec<char>> {
    if value.is_null() {
        return None;
    }
    Some(value_to_string(value).trim().chars().collect())
}

fn slice(chars: &[char], from: usize, to: usize) -> String {
    chars[from..to].iter().collect()
}

/// HL7 TS (`YYYYMMDD...`) to FHIR date; year-only stamps keep just the year
pub fn hl7_datetime_to_fhir_date(value: &Value) -> Value {
    let Some(s) = hl7_chars(value) else {
        return Value::Null;
    };
    if s.len() >= 8 {
        Value::String(format!(
            "{}-{}-{}",
            slice(&s, 0, 4),
            slice(&s, 4, 6),
            slice(&s, 6, 8)
        ))
    } else if s.len() >= 4 {
        Value::String(slice(&s, 0, 4))
    } else {
        Value::Null
    }
}

/// HL7 TS to FHIR dateTime; minute precision gets `:00` seconds
pub fn hl7_datetime_to_fhir_datetime(value: &Value) -> Value {
    let Some(s) = hl7_chars(value) else {
        return Value::Null;
    };
    let date = || {
        format!(
            "{}-{}-{}",
            slice(&s, 0, 4),
            slice(&s, 4, 6),
            slice(&s, 6, 8)
        )
    };
    if s.len() >= 14 {
        Value::String(format!(
            "{}T{}:{}:{}",
            date(),
            slice(&s, 8, 10),
            slice(&s, 10, 12),
            slice(&s, 12, 14)
        ))
    } else if s.len() >= 12 {
        Value::String(format!(
            "{}T{}:{}:00",
            date(),
            slice(&s, 8, 10),
            slice(&s, 10, 12)
        ))
    } else if s.len() >= 8 {
        Value::String(date())
    } else {
        Value::Null
    }
}

/// HL7 TS to FHIR instant, assuming UTC when a time part is present
pub fn hl7_datetime_to_fhir_instant(value: &Value) -> Value {
    match hl7_datetime_to_fhir_datetime(value) {
        Value::String(s) if s.contains('T') => Value::String(format!("{s}Z")),
        other => other,
    }
}

fn upper_code(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::String(s) => s.to_uppercase(),
        other => value_to_string(other).to_uppercase(),
    }
}

/// HL7 administrative sex (table 0001) to FHIR gender
pub fn hl7_sex_to_fhir_gender(value: &Value) -> Value {
    let gender = match upper_code(value).as_str() {
        "M" => "male",
        "F" => "female",
        "O" | "A" => "other",
        _ => "unknown",
    };
    Value::String(gender.to_string())
}

/// HL7 abnormal flag (OBX-8) to FHIR interpretation code
pub fn hl7_abnormal_flag_to_fhir(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let code = upper_code(value);
    match code.as_str() {
        "L" | "H" | "LL" | "HH" | "N" | "A" | "AA" => Value::String(code),
        "<" => Value::String("L".to_string()),
        ">" => Value::String("H".to_string()),
        _ => Value::String(value_to_string(value)),
    }
}

/// HL7 observation result status (OBX-11) to FHIR observation status
pub fn hl7_result_status_to_fhir(value: &Value) -> Value {
    let status = match upper_code(value).as_str() {
        "C" => "corrected",
        "D" | "X" => "cancelled",
        "F" => "final",
        "I" | "R" | "U" => "registered",
        "P" | "S" => "preliminary",
        "W" => "entered-in-error",
        _ => "unknown",
    };
    Value::String(status.to_string())
}

/// HL7 Y/N indicator to boolean; anything else is null
pub fn hl7_yn_to_boolean(value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match value_to_string(value).to_uppercase().as_str() {
        "Y" | "YES" | "1" | "TRUE" => Value::Bool(true),
        "N" | "NO" | "0" | "FALSE" => Value::Bool(false),
        _ => Value::Null,
    }
}

/// HL7 coding system identifier to a FHIR system URI, falling back to `urn:oid:`
pub fn hl7_coding_system_to_uri(value: &Value) -> Value {
    if value.is_null() {
        return Value::String(String::new());
    }
    let raw = value_to_string(value);
    let uri = match raw.to_uppercase().as_str() {
        "LN" | "LOINC" => "http://loinc.org".to_string(),
        "SCT" | "SNOMED" => "http://snomed.info/sct".to_string(),
        "I9C" => "http://hl7.org/fhir/sid/icd-9-cm".to_string(),
        "I10" | "ICD10" => "http://hl7.org/fhir/sid/icd-10-cm".to_string(),
        "CPT" | "CPT4" => "http://www.ama-assn.org/go/cpt".to_string(),
        "RXNORM" => "http://www.nlm.nih.gov/research/umls/rxnorm".to_string(),
        "NDC" => "http://hl7.org/fhir/sid/ndc".to_string(),
        "CVX" => "http://hl7.org/fhir/sid/cvx".to_string(),
        _ => format!("urn:oid:{raw}"),
    };
    Value::String(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test]
    fn test_builtin_registry_contents() {
        let names = builtin_names();
        assert_eq!(names.len(), 14);
        assert!(names.contains(&"epic_sex_to_fhir_gender"));
        assert!(builtin("hl7_yn_to_boolean").is_some());
        assert!(builtin("no_such_transform").is_none());
    }

    #[test]
    fn test_builtins_are_total_on_odd_input() {
        let inputs = [
            json!(null),
            json!(""),
            json!("garbage"),
            json!(12),
            json!(true),
            json!([1, 2]),
            json!({"a": 1}),
        ];
        for name in builtin_names() {
            let f = builtin(name).unwrap();
            for input in &inputs {
                assert!(f(input).is_ok(), "{name} failed on {input}");
            }
        }
    }

    #[test]
    fn test_to_string() {
        assert_eq!(to_string(&json!(12345)), json!("12345"));
        assert_eq!(to_string(&json!("abc")), json!("abc"));
        assert_eq!(to_string(&json!(null)), json!(null));
    }

    #[test_case(json!("2024-03-15"), json!("2024-03-15"); "iso")]
    #[test_case(json!("03/15/2024"), json!("2024-03-15"); "us")]
    #[test_case(json!("15-03-2024"), json!("2024-03-15"); "day first")]
    #[test_case(json!("March 15"), json!("March 15"); "unparseable passes through")]
    #[test_case(json!(null), json!(null); "null")]
    fn test_date_to_fhir_date(input: Value, expected: Value) {
        assert_eq!(date_to_fhir_date(&input), expected);
    }

    #[test]
    fn test_datetime_to_fhir_datetime() {
        assert_eq!(
            datetime_to_fhir_datetime(&json!("2024-03-15 08:30:00")),
            json!("2024-03-15T08:30:00")
        );
        assert_eq!(
            datetime_to_fhir_datetime(&json!("03/15/2024 08:30:00")),
            json!("2024-03-15T08:30:00")
        );
        assert_eq!(datetime_to_fhir_datetime(&json!("soon")), json!("soon"));
    }

    #[test_case(json!("555-123-4567"), json!("(555) 123-4567"); "ten digits")]
    #[test_case(json!("1 555 123 4567"), json!("+1 (555) 123-4567"); "eleven digits")]
    #[test_case(json!(5551234567_i64), json!("(555) 123-4567"); "numeric")]
    #[test_case(json!("12345"), json!("12345"); "short passes through")]
    fn test_normalize_phone(input: Value, expected: Value) {
        assert_eq!(normalize_phone(&input), expected);
    }

    #[test]
    fn test_epic_sex() {
        assert_eq!(epic_sex_to_fhir_gender(&json!(1)), json!("male"));
        assert_eq!(epic_sex_to_fhir_gender(&json!("2")), json!("female"));
        assert_eq!(epic_sex_to_fhir_gender(&json!(3)), json!("other"));
        assert_eq!(epic_sex_to_fhir_gender(&json!("F")), json!("female"));
        assert_eq!(epic_sex_to_fhir_gender(&json!(9)), json!("unknown"));
        assert_eq!(epic_sex_to_fhir_gender(&json!(null)), json!("unknown"));
    }

    #[test]
    fn test_cerner_sex() {
        assert_eq!(cerner_sex_to_fhir_gender(&json!(362)), json!("male"));
        assert_eq!(cerner_sex_to_fhir_gender(&json!(363)), json!("female"));
        assert_eq!(cerner_sex_to_fhir_gender(&json!(364)), json!("unknown"));
        assert_eq!(cerner_sex_to_fhir_gender(&json!("362")), json!("unknown"));
    }

    #[test]
    fn test_hl7_dates() {
        assert_eq!(hl7_datetime_to_fhir_date(&json!("19800115")), json!("1980-01-15"));
        assert_eq!(hl7_datetime_to_fhir_date(&json!("1980")), json!("1980"));
        assert_eq!(hl7_datetime_to_fhir_date(&json!("19")), json!(null));
        assert_eq!(
            hl7_datetime_to_fhir_datetime(&json!("20240115083000")),
            json!("2024-01-15T08:30:00")
        );
        assert_eq!(
            hl7_datetime_to_fhir_datetime(&json!("202401150830")),
            json!("2024-01-15T08:30:00")
        );
        assert_eq!(hl7_datetime_to_fhir_datetime(&json!("20240115")), json!("2024-01-15"));
        assert_eq!(
            hl7_datetime_to_fhir_instant(&json!("20240115083000")),
            json!("2024-01-15T08:30:00Z")
        );
        assert_eq!(hl7_datetime_to_fhir_instant(&json!("20240115")), json!("2024-01-15"));
    }

    #[test]
    fn test_hl7_codes() {
        assert_eq!(hl7_sex_to_fhir_gender(&json!("m")), json!("male"));
        assert_eq!(hl7_sex_to_fhir_gender(&json!("A")), json!("other"));
        assert_eq!(hl7_sex_to_fhir_gender(&json!("")), json!("unknown"));
        assert_eq!(hl7_abnormal_flag_to_fhir(&json!(">")), json!("H"));
        assert_eq!(hl7_abnormal_flag_to_fhir(&json!("hh")), json!("HH"));
        assert_eq!(hl7_abnormal_flag_to_fhir(&json!("weird")), json!("weird"));
        assert_eq!(hl7_result_status_to_fhir(&json!("F")), json!("final"));
        assert_eq!(hl7_result_status_to_fhir(&json!("W")), json!("entered-in-error"));
        assert_eq!(hl7_result_status_to_fhir(&json!("Z")), json!("unknown"));
        assert_eq!(hl7_yn_to_boolean(&json!("yes")), json!(true));
        assert_eq!(hl7_yn_to_boolean(&json!("N")), json!(false));
        assert_eq!(hl7_yn_to_boolean(&json!("maybe")), json!(null));
    }

    #[test]
    fn test_hl7_coding_system_to_uri() {
        assert_eq!(hl7_coding_system_to_uri(&json!("LN")), json!("http://loinc.org"));
        assert_eq!(
            hl7_coding_system_to_uri(&json!("sct")),
            json!("http://snomed.info/sct")
        );
        assert_eq!(
            hl7_coding_system_to_uri(&json!("2.16.840.1")),
            json!("urn:oid:2.16.840.1")
        );
        assert_eq!(hl7_coding_system_to_uri(&json!(null)), json!(""));
    }
}
