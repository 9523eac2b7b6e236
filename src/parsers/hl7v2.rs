//! HL7 v2.x pipe-delimited message parsing and FHIR conversion
//!
//! Separators come from the MSH segment: the character after `MSH` is the
//! field separator and the next four are the component, repetition, escape and
//! subcomponent separators. Field indices are 1-based as in the HL7 standard,
//! and MSH-1 is the field separator itself.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::domain::{EhrglotError, FieldMapping, Result, SchemaMapping};
use crate::mapping::SchemaMapper;

/// Source system name used for built-in segment mappings
pub const HL7V2_SOURCE_SYSTEM: &str = "hl7v2";

/// Delimiters declared in MSH-1 and MSH-2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Separators {
    /// Read separators from an MSH line, falling back to the defaults
    fn from_msh(line: &str) -> Self {
        let defaults = Self::default();
        let mut chars = line.chars().skip(3);
        let field = chars.next().unwrap_or(defaults.field);
        let encoding: Vec<char> = chars.take_while(|c| *c != field).take(4).collect();
        Self {
            field,
            component: encoding.first().copied().unwrap_or(defaults.component),
            repetition: encoding.get(1).copied().unwrap_or(defaults.repetition),
            escape: encoding.get(2).copied().unwrap_or(defaults.escape),
            subcomponent: encoding.get(3).copied().unwrap_or(defaults.subcomponent),
        }
    }

    /// MSH-2 text
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }
}

/// One field with its components and subcomponents
///
/// Components come from the first repetition; `value` keeps the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Field {
    pub value: String,
    pub repetitions: Vec<String>,
    pub components: Vec<String>,
    pub subcomponents: Vec<Vec<String>>,
}

impl Hl7Field {
    fn parse(raw: &str, separators: &Separators) -> Self {
        let repetitions: Vec<String> = raw
            .split(separators.repetition)
            .map(str::to_string)
            .collect();
        let first = repetitions.first().map(String::as_str).unwrap_or_default();
        let components: Vec<String> = first
            .split(separators.component)
            .map(str::to_string)
            .collect();
        let subcomponents = components
            .iter()
            .map(|c| c.split(separators.subcomponent).map(str::to_string).collect())
            .collect();
        Self {
            value: raw.to_string(),
            repetitions,
            components,
            subcomponents,
        }
    }

    /// Field taken verbatim, as MSH-1 and MSH-2 are
    fn literal(raw: &str) -> Self {
        Self {
            value: raw.to_string(),
            repetitions: vec![raw.to_string()],
            components: vec![raw.to_string()],
            subcomponents: vec![vec![raw.to_string()]],
        }
    }

    /// Component by 1-based index; empty components read as `None`
    pub fn component(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.components.get(i))
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Subcomponent by 1-based component and subcomponent index
    pub fn subcomponent(&self, component: usize, index: usize) -> Option<&str> {
        let comp = self.subcomponents.get(component.checked_sub(1)?)?;
        comp.get(index.checked_sub(1)?)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// One segment line such as `PID|1||12345^^^MRN`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Segment {
    pub segment_id: String,
    pub fields: Vec<Hl7Field>,
    pub raw: String,
}

impl Hl7Segment {
    fn parse(line: &str, separators: &Separators) -> Self {
        let mut parts = line.split(separators.field);
        let segment_id = parts.next().unwrap_or_default().to_string();

        let mut fields = Vec::new();
        if segment_id == "MSH" {
            fields.push(Hl7Field::literal(&separators.field.to_string()));
            if let Some(encoding) = parts.next() {
                fields.push(Hl7Field::literal(encoding));
            }
        }
        fields.extend(parts.map(|part| Hl7Field::parse(part, separators)));

        Self {
            segment_id,
            fields,
            raw: line.to_string(),
        }
    }

    /// Field by 1-based index
    pub fn field(&self, index: usize) -> Option<&Hl7Field> {
        self.fields.get(index.checked_sub(1)?)
    }

    /// Value at a field path such as `PID-3.1`, `3.1` or `3.1.2`
    ///
    /// Field 0 is the segment id. Empty values and malformed paths read as `None`.
    pub fn value(&self, field_path: &str) -> Option<&str> {
        let path = field_path
            .split_once('-')
            .map_or(field_path, |(_, rest)| rest);
        let mut parts = path.split('.').map(|p| p.trim().parse::<usize>().ok());

        let field_index = parts.next().flatten()?;
        if field_index == 0 {
            return Some(&self.segment_id);
        }
        let field = self.field(field_index)?;

        let Some(component) = parts.next() else {
            return Some(field.value.as_str()).filter(|v| !v.is_empty());
        };
        let component = component?;

        match parts.next() {
            Some(sub) => field.subcomponent(component, sub?),
            None => field.component(component),
        }
    }

    /// Flat record keyed `<SEG>-<n>` and `<SEG>-<n>.<m>`
    ///
    /// Empty fields and components are left out so they map as absent.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut record = Map::new();
        for (i, field) in self.fields.iter().enumerate() {
            let key = format!("{}-{}", self.segment_id, i + 1);
            if field.is_empty() {
                continue;
            }
            record.insert(key.clone(), Value::String(field.value.clone()));
            for (j, component) in field.components.iter().enumerate() {
                if !component.is_empty() {
                    record.insert(format!("{key}.{}", j + 1), Value::String(component.clone()));
                }
            }
        }
        record
    }
}

/// A parsed message: MSH first, then the remaining segments in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hl7Message {
    pub segments: Vec<Hl7Segment>,
    pub separators: Separators,
    pub raw: String,
}

impl Hl7Message {
    /// First segment with this id
    pub fn segment(&self, segment_id: &str) -> Option<&Hl7Segment> {
        self.segment_at(segment_id, 0)
    }

    /// `index`-th occurrence of a repeating segment
    pub fn segment_at(&self, segment_id: &str, index: usize) -> Option<&Hl7Segment> {
        self.segments
            .iter()
            .filter(|s| s.segment_id == segment_id)
            .nth(index)
    }

    pub fn segments_by_id<'a>(
        &'a self,
        segment_id: &'a str,
    ) -> impl Iterator<Item = &'a Hl7Segment> + 'a {
        self.segments.iter().filter(move |s| s.segment_id == segment_id)
    }

    /// MSH-9, e.g. `ADT^A01`
    pub fn message_type(&self) -> Option<&str> {
        self.segment("MSH").and_then(|msh| msh.value("9"))
    }

    /// MSH-10
    pub fn control_id(&self) -> Option<&str> {
        self.segment("MSH").and_then(|msh| msh.value("10"))
    }

    /// MSH-12
    pub fn version(&self) -> Option<&str> {
        self.segment("MSH").and_then(|msh| msh.value("12"))
    }
}

/// Parses HL7 v2.x messages and maps their segments to FHIR resources
#[derive(Debug, Default)]
pub struct Hl7v2Parser {
    custom_mappings: HashMap<String, SchemaMapping>,
}

impl Hl7v2Parser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the built-in mapping for a segment
    pub fn with_mapping(mut self, segment_id: impl Into<String>, mapping: SchemaMapping) -> Self {
        self.custom_mappings.insert(segment_id.into(), mapping);
        self
    }

    /// Parse one message; segments may be separated by `\r`, `\n` or `\r\n`
    pub fn parse_message(&self, raw: &str) -> Result<Hl7Message> {
        let normalized = raw.replace("\r\n", "\r").replace('\n', "\r");
        let lines: Vec<&str> = normalized
            .split('\r')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let Some(first) = lines.first() else {
            return Err(EhrglotError::Parse("Empty HL7 message".to_string()));
        };
        if !first.starts_with("MSH") {
            return Err(EhrglotError::Parse(
                "HL7 message must start with MSH segment".to_string(),
            ));
        }

        let separators = Separators::from_msh(first);
        let segments = lines
            .iter()
            .map(|line| Hl7Segment::parse(line, &separators))
            .collect();

        Ok(Hl7Message {
            segments,
            separators,
            raw: normalized,
        })
    }

    /// Parse every message in a file, skipping ones that fail to parse
    ///
    /// Messages are separated by blank lines.
    pub fn parse_file(&self, path: &Path) -> Result<Vec<Hl7Message>> {
        let content = fs::read_to_string(path).map_err(|e| {
            EhrglotError::Io(format!("Failed to read HL7 file {}: {e}", path.display()))
        })?;

        let mut messages = Vec::new();
        for (index, block) in split_messages(&content).iter().enumerate() {
            match self.parse_message(block) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        message_index = index,
                        error = %e,
                        "Skipping invalid HL7 message"
                    );
                }
            }
        }

        tracing::debug!(path = %path.display(), messages = messages.len(), "Parsed HL7 file");
        Ok(messages)
    }

    /// Map the first matching segment to a FHIR resource
    ///
    /// `segment_id` defaults to the resource's usual segment (PID for Patient,
    /// PV1 for Encounter, OBX for Observation, OBR for DiagnosticReport).
    pub fn to_fhir(
        &self,
        message: &Hl7Message,
        resource_type: &str,
        segment_id: Option<&str>,
    ) -> Result<Value> {
        let segment_id = segment_id.unwrap_or_else(|| default_segment(resource_type));
        let segment = message.segment(segment_id).ok_or_else(|| {
            EhrglotError::Parse(format!("Segment {segment_id} not found in message"))
        })?;
        Ok(self.segment_to_fhir(segment, resource_type))
    }

    /// Map every matching segment, e.g. one Observation per OBX
    pub fn to_fhir_all(
        &self,
        message: &Hl7Message,
        resource_type: &str,
        segment_id: Option<&str>,
    ) -> Vec<Value> {
        let segment_id = segment_id.unwrap_or_else(|| default_segment(resource_type));
        message
            .segments_by_id(segment_id)
            .map(|segment| self.segment_to_fhir(segment, resource_type))
            .collect()
    }

    fn segment_to_fhir(&self, segment: &Hl7Segment, resource_type: &str) -> Value {
        let mapping = self
            .custom_mappings
            .get(&segment.segment_id)
            .cloned()
            .unwrap_or_else(|| builtin_mapping(&segment.segment_id, resource_type));
        let mapper = SchemaMapper::new(mapping);

        let source = Value::Object(segment.to_dict());
        let (mut resource, errors) = mapper.map_row(&source, None);
        if !errors.is_empty() {
            tracing::warn!(
                segment = %segment.segment_id,
                errors = ?errors,
                "HL7 segment mapped with errors"
            );
        }

        if let Value::Object(map) = &mut resource {
            map.insert(
                "resourceType".to_string(),
                Value::String(canonical_resource_name(resource_type)),
            );
        }
        resource
    }
}

/// Blocks of non-blank lines
fn split_messages(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn default_segment(resource_type: &str) -> &'static str {
    match resource_type.to_lowercase().as_str() {
        "encounter" => "PV1",
        "observation" => "OBX",
        "diagnosticreport" => "OBR",
        _ => "PID",
    }
}

fn canonical_resource_name(resource_type: &str) -> String {
    match resource_type.to_lowercase().as_str() {
        "patient" => "Patient".to_string(),
        "encounter" => "Encounter".to_string(),
        "observation" => "Observation".to_string(),
        "diagnosticreport" => "DiagnosticReport".to_string(),
        _ => {
            let mut chars = resource_type.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// Built-in segment mapping; unknown segments fall back to PID
pub fn builtin_mapping(segment_id: &str, resource_type: &str) -> SchemaMapping {
    let rule = |source: &str, target: &str| FieldMapping::new(source, target);

    let field_mappings = match segment_id {
        "PV1" => vec![
            rule("PV1-19.1", "identifier[0].value"),
            rule("PV1-2", "class.code"),
            rule("PV1-3.1", "location[0].location.display"),
            rule("PV1-7.1", "participant[0].individual.identifier.value"),
            rule("PV1-44", "period.start").with_transform("hl7_datetime_to_fhir_datetime"),
            rule("PV1-45", "period.end").with_transform("hl7_datetime_to_fhir_datetime"),
        ],
        "OBX" => vec![
            rule("OBX-3.1", "code.coding[0].code"),
            rule("OBX-3.2", "code.coding[0].display"),
            rule("OBX-3.3", "code.coding[0].system").with_transform("hl7_coding_system_to_uri"),
            rule("OBX-5", "valueString"),
            rule("OBX-6.1", "valueQuantity.unit"),
            rule("OBX-8", "interpretation[0].coding[0].code")
                .with_transform("hl7_abnormal_flag_to_fhir"),
            rule("OBX-11", "status").with_transform("hl7_result_status_to_fhir"),
            rule("OBX-14", "effectiveDateTime").with_transform("hl7_datetime_to_fhir_datetime"),
        ],
        _ => vec![
            rule("PID-3.1", "identifier[0].value"),
            rule("PID-5.1", "name[0].family"),
            rule("PID-5.2", "name[0].given[0]"),
            rule("PID-7", "birthDate").with_transform("hl7_datetime_to_fhir_date"),
            rule("PID-8", "gender").with_transform("hl7_sex_to_fhir_gender"),
            rule("PID-11.1", "address[0].line[0]"),
            rule("PID-11.3", "address[0].city"),
            rule("PID-11.4", "address[0].state"),
            rule("PID-11.5", "address[0].postalCode"),
            rule("PID-13.1", "telecom[0].value").with_transform("normalize_phone"),
        ],
    };

    SchemaMapping {
        source_system: HL7V2_SOURCE_SYSTEM.to_string(),
        source_table: segment_id.to_string(),
        target_resource: resource_type.to_string(),
        field_mappings,
        description: format!("Built-in HL7 v2.x {segment_id} mapping"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ADT_A01: &str = "MSH|^~\\&|EPIC|HOSPITAL|RECEIVER|FACILITY|20240115083000||ADT^A01|MSG00001|P|2.5\r\
EVN|A01|20240115083000\r\
PID|1||12345678^^^MRN||DOE^JOHN^Q||19800515|M|||123 MAIN ST^^BOSTON^MA^02101||6175551234\r\
PV1|1|I|ICU^101^A||||||||||||||||V0001|||||||||||||||||||||||||20240115083000";

    const ORU_R01: &str = "MSH|^~\\&|LAB|HOSPITAL|||20240116||ORU^R01|MSG00002|P|2.5\n\
PID|1||87654321^^^MRN||ROE^JANE\n\
OBR|1|||CBC\n\
OBX|1|NM|2345-7^GLUCOSE^LN||95|mg/dL|70-99|N|||F|||20240116090000\n\
OBX|2|NM|2160-0^CREATININE^LN||1.8|mg/dL|0.6-1.2|H|||P";

    #[test]
    fn test_parse_adt_message() {
        let message = Hl7v2Parser::new().parse_message(ADT_A01).unwrap();

        assert_eq!(message.segments.len(), 4);
        assert_eq!(message.message_type(), Some("ADT^A01"));
        assert_eq!(message.control_id(), Some("MSG00001"));
        assert_eq!(message.version(), Some("2.5"));
        assert_eq!(message.separators, Separators::default());

        let msh = message.segment("MSH").unwrap();
        assert_eq!(msh.value("1"), Some("|"));
        assert_eq!(msh.value("2"), Some("^~\\&"));
        assert_eq!(msh.value("3"), Some("EPIC"));
        assert_eq!(msh.value("MSH-4"), Some("HOSPITAL"));

        let pid = message.segment("PID").unwrap();
        assert_eq!(pid.value("0"), Some("PID"));
        assert_eq!(pid.value("3.1"), Some("12345678"));
        assert_eq!(pid.value("PID-5.2"), Some("JOHN"));
        assert_eq!(pid.value("7"), Some("19800515"));
        assert_eq!(pid.value("2"), None);
        assert_eq!(pid.value("99"), None);
        assert_eq!(pid.value("x.1"), None);
    }

    #[test]
    fn test_custom_separators() {
        let raw = "MSH#*~\\@#APP#FAC\rPID#1##111*222@333";
        let message = Hl7v2Parser::new().parse_message(raw).unwrap();

        assert_eq!(message.separators.field, '#');
        assert_eq!(message.separators.component, '*');
        assert_eq!(message.separators.subcomponent, '@');
        assert_eq!(message.separators.encoding_characters(), "*~\\@");

        let pid = message.segment("PID").unwrap();
        assert_eq!(pid.value("3.2"), Some("222@333"));
        assert_eq!(pid.value("3.2.2"), Some("333"));
    }

    #[test]
    fn test_repetitions_use_first_for_components() {
        let raw = "MSH|^~\\&|APP\rPID|1||111^^^MRN~222^^^SSN";
        let message = Hl7v2Parser::new().parse_message(raw).unwrap();
        let field = message.segment("PID").unwrap().field(3).unwrap();

        assert_eq!(field.repetitions.len(), 2);
        assert_eq!(field.component(1), Some("111"));
        assert_eq!(field.component(4), Some("MRN"));
    }

    #[test]
    fn test_parse_errors() {
        let parser = Hl7v2Parser::new();
        assert!(matches!(parser.parse_message("  \r\n "), Err(EhrglotError::Parse(_))));
        assert!(matches!(parser.parse_message("PID|1"), Err(EhrglotError::Parse(_))));
    }

    #[test]
    fn test_segment_to_dict() {
        let message = Hl7v2Parser::new().parse_message(ADT_A01).unwrap();
        let record = message.segment("PID").unwrap().to_dict();

        assert_eq!(record["PID-5"], "DOE^JOHN^Q");
        assert_eq!(record["PID-5.1"], "DOE");
        assert_eq!(record["PID-3"], "12345678^^^MRN");
        assert!(!record.contains_key("PID-2"));
        assert!(!record.contains_key("PID-3.2"));
    }

    #[test]
    fn test_pid_to_patient() {
        let parser = Hl7v2Parser::new();
        let message = parser.parse_message(ADT_A01).unwrap();
        let patient = parser.to_fhir(&message, "patient", None).unwrap();

        assert_eq!(patient["resourceType"], "Patient");
        assert_eq!(patient["identifier"][0]["value"], "12345678");
        assert_eq!(patient["name"][0]["family"], "DOE");
        assert_eq!(patient["name"][0]["given"][0], "JOHN");
        assert_eq!(patient["birthDate"], "1980-05-15");
        assert_eq!(patient["gender"], "male");
        assert_eq!(patient["address"][0]["city"], "BOSTON");
        assert_eq!(patient["address"][0]["postalCode"], "02101");
        assert_eq!(patient["telecom"][0]["value"], "(617) 555-1234");
    }

    #[test]
    fn test_pv1_to_encounter() {
        let parser = Hl7v2Parser::new();
        let message = parser.parse_message(ADT_A01).unwrap();
        let encounter = parser.to_fhir(&message, "Encounter", None).unwrap();

        assert_eq!(encounter["resourceType"], "Encounter");
        assert_eq!(encounter["class"]["code"], "I");
        assert_eq!(encounter["location"][0]["location"]["display"], "ICU");
        assert_eq!(encounter["identifier"][0]["value"], "V0001");
        assert_eq!(encounter["period"]["start"], "2024-01-15T08:30:00");
    }

    #[test]
    fn test_obx_to_observations() {
        let parser = Hl7v2Parser::new();
        let message = parser.parse_message(ORU_R01).unwrap();
        assert_eq!(message.message_type(), Some("ORU^R01"));
        assert_eq!(message.segments_by_id("OBX").count(), 2);

        let observations = parser.to_fhir_all(&message, "Observation", None);
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0]["code"]["coding"][0]["code"], "2345-7");
        assert_eq!(observations[0]["code"]["coding"][0]["system"], "http://loinc.org");
        assert_eq!(observations[0]["valueString"], "95");
        assert_eq!(observations[0]["status"], "final");
        assert_eq!(observations[1]["status"], "preliminary");
        assert_eq!(observations[1]["interpretation"][0]["coding"][0]["code"], "H");

        let missing = parser.to_fhir(&message, "Encounter", None);
        assert!(matches!(missing, Err(EhrglotError::Parse(_))));
    }

    #[test]
    fn test_custom_mapping_replaces_builtin() {
        let mapping = SchemaMapping {
            source_system: "hl7v2".to_string(),
            source_table: "PID".to_string(),
            target_resource: "Patient".to_string(),
            field_mappings: vec![FieldMapping::new("PID-3.1", "id")],
            description: String::new(),
        };
        let parser = Hl7v2Parser::new().with_mapping("PID", mapping);
        let message = parser.parse_message(ADT_A01).unwrap();
        let patient = parser.to_fhir(&message, "Patient", None).unwrap();

        assert_eq!(patient, json!({"id": "12345678", "resourceType": "Patient"}));
    }

    #[test]
    fn test_parse_file_skips_invalid_messages() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}\n\nNOT A MESSAGE\n\n\n{}\n",
            ADT_A01.replace('\r', "\n"),
            ORU_R01
        )
        .unwrap();

        let messages = Hl7v2Parser::new().parse_file(file.path()).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_type(), Some("ADT^A01"));
        assert_eq!(messages[1].message_type(), Some("ORU^R01"));
    }
}
