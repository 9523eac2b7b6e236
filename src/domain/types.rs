//! Core value types shared by the mapper, PII engine and masking generators
//!
//! Every type here is a plain value object. Tagging a schema never mutates it
//! in place: the tagger and override layer always return a new
//! [`SchemaDefinition`], so an untagged schema can be reused for several targets.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::errors::EhrglotError;

/// Free-form parameters attached to a masking strategy (`show_last`, `replacement`, ...)
pub type MaskingParams = serde_json::Map<String, Value>;

/// Sensitivity level of a column
///
/// Variants are declared in ascending order so `Ord` gives
/// `None < Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PiiLevel {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl PiiLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiLevel::None => "none",
            PiiLevel::Low => "low",
            PiiLevel::Medium => "medium",
            PiiLevel::High => "high",
            PiiLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for PiiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PiiLevel {
    type Err = EhrglotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(EhrglotError::Configuration(format!(
                "Invalid PII level: {s}. Expected one of: none, low, medium, high, critical"
            ))),
        }
    }
}

/// Regulatory category of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    #[default]
    None,
    /// Identifies a person on its own
    DirectIdentifier,
    /// Identifying only in combination with other fields
    QuasiIdentifier,
    SensitiveData,
}

impl PiiCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiCategory::None => "none",
            PiiCategory::DirectIdentifier => "direct_identifier",
            PiiCategory::QuasiIdentifier => "quasi_identifier",
            PiiCategory::SensitiveData => "sensitive_data",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract masking operation applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskingStrategy {
    #[default]
    None,
    /// Replace with a fixed literal
    Redact,
    /// Deterministic `TKN_` pseudo-identifier
    Tokenize,
    /// One-way digest, optionally truncated
    Hash,
    /// Reduce precision (date to year, address to state, IP octets)
    Generalize,
    /// Always NULL
    Suppress,
    /// Reveal only the trailing characters
    Partial,
}

impl MaskingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaskingStrategy::None => "none",
            MaskingStrategy::Redact => "redact",
            MaskingStrategy::Tokenize => "tokenize",
            MaskingStrategy::Hash => "hash",
            MaskingStrategy::Generalize => "generalize",
            MaskingStrategy::Suppress => "suppress",
            MaskingStrategy::Partial => "partial",
        }
    }
}

impl fmt::Display for MaskingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The 18 HIPAA Safe Harbor identifier classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HipaaIdentifier {
    Names,
    Geographic,
    Dates,
    PhoneNumbers,
    FaxNumbers,
    EmailAddresses,
    Ssn,
    Mrn,
    HealthPlanId,
    AccountNumbers,
    LicenseNumbers,
    VehicleIdentifiers,
    DeviceIdentifiers,
    WebUrls,
    IpAddresses,
    Biometric,
    Photos,
    OtherUnique,
}

impl HipaaIdentifier {
    /// All identifiers in catalog declaration order
    pub const ALL: [HipaaIdentifier; 18] = [
        HipaaIdentifier::Names,
        HipaaIdentifier::Geographic,
        HipaaIdentifier::Dates,
        HipaaIdentifier::PhoneNumbers,
        HipaaIdentifier::FaxNumbers,
        HipaaIdentifier::EmailAddresses,
        HipaaIdentifier::Ssn,
        HipaaIdentifier::Mrn,
        HipaaIdentifier::HealthPlanId,
        HipaaIdentifier::AccountNumbers,
        HipaaIdentifier::LicenseNumbers,
        HipaaIdentifier::VehicleIdentifiers,
        HipaaIdentifier::DeviceIdentifiers,
        HipaaIdentifier::WebUrls,
        HipaaIdentifier::IpAddresses,
        HipaaIdentifier::Biometric,
        HipaaIdentifier::Photos,
        HipaaIdentifier::OtherUnique,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HipaaIdentifier::Names => "names",
            HipaaIdentifier::Geographic => "geographic",
            HipaaIdentifier::Dates => "dates",
            HipaaIdentifier::PhoneNumbers => "phone_numbers",
            HipaaIdentifier::FaxNumbers => "fax_numbers",
            HipaaIdentifier::EmailAddresses => "email_addresses",
            HipaaIdentifier::Ssn => "ssn",
            HipaaIdentifier::Mrn => "mrn",
            HipaaIdentifier::HealthPlanId => "health_plan_id",
            HipaaIdentifier::AccountNumbers => "account_numbers",
            HipaaIdentifier::LicenseNumbers => "license_numbers",
            HipaaIdentifier::VehicleIdentifiers => "vehicle_identifiers",
            HipaaIdentifier::DeviceIdentifiers => "device_identifiers",
            HipaaIdentifier::WebUrls => "web_urls",
            HipaaIdentifier::IpAddresses => "ip_addresses",
            HipaaIdentifier::Biometric => "biometric",
            HipaaIdentifier::Photos => "photos",
            HipaaIdentifier::OtherUnique => "other_unique",
        }
    }
}

impl fmt::Display for HipaaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HipaaIdentifier {
    type Err = EhrglotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        HipaaIdentifier::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == lowered)
            .ok_or_else(|| EhrglotError::Configuration(format!("Unknown HIPAA identifier: {s}")))
    }
}

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Timestamp,
    Binary,
    Array,
    Object,
}

impl DataType {
    /// Lenient mapping from the type names found in YAML schema files
    ///
    /// FHIR primitive names (`id`, `code`, `dateTime`, `positiveInt`, ...) are
    /// folded into the closest logical type. Capitalized names are complex FHIR
    /// datatypes (`HumanName`, `CodeableConcept`) and become objects.
    pub fn parse_lenient(raw: &str) -> DataType {
        let trimmed = raw.trim();
        let lower = trimmed.to_lowercase();
        if trimmed.ends_with("[]")
            || lower == "list"
            || lower.starts_with("array<")
            || lower.starts_with("list<")
        {
            return DataType::Array;
        }
        match lower.as_str() {
            "string" | "str" | "text" | "id" | "code" | "uri" | "url" | "canonical" | "oid"
            | "uuid" | "markdown" | "varchar" => DataType::String,
            "integer" | "int" | "positiveint" | "unsignedint" | "integer64" | "bigint" => {
                DataType::Integer
            }
            "float" | "decimal" | "number" | "double" => DataType::Float,
            "boolean" | "bool" => DataType::Boolean,
            "date" => DataType::Date,
            "datetime" | "instant" => DataType::Datetime,
            "timestamp" => DataType::Timestamp,
            "binary" | "base64binary" | "bytes" => DataType::Binary,
            "array" => DataType::Array,
            "object" | "dict" | "map" => DataType::Object,
            _ if trimmed.chars().next().is_some_and(|c| c.is_ascii_uppercase()) => {
                DataType::Object
            }
            _ => DataType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Datetime => "datetime",
            DataType::Timestamp => "timestamp",
            DataType::Binary => "binary",
            DataType::Array => "array",
            DataType::Object => "object",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column with its type and PII tagging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,

    #[serde(default)]
    pub data_type: DataType,

    #[serde(default = "default_true")]
    pub nullable: bool,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub pii_level: PiiLevel,

    #[serde(default)]
    pub pii_category: PiiCategory,

    #[serde(default)]
    pub hipaa_identifier: Option<HipaaIdentifier>,

    #[serde(default)]
    pub masking_strategy: MaskingStrategy,

    #[serde(default)]
    pub masking_params: MaskingParams,

    /// Source column this was mapped from, when known
    #[serde(default)]
    pub source_column: Option<String>,

    /// Transform applied on the way in, when known
    #[serde(default)]
    pub transform: Option<String>,
}

impl ColumnMetadata {
    /// Create an untagged, nullable column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            description: String::new(),
            pii_level: PiiLevel::None,
            pii_category: PiiCategory::None,
            hipaa_identifier: None,
            masking_strategy: MaskingStrategy::None,
            masking_params: MaskingParams::new(),
            source_column: None,
            transform: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_masking(mut self, strategy: MaskingStrategy, params: MaskingParams) -> Self {
        self.masking_strategy = strategy;
        self.masking_params = params;
        self
    }

    pub fn requires_masking(&self) -> bool {
        self.masking_strategy != MaskingStrategy::None
    }
}

/// An ordered list of columns plus identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub columns: Vec<ColumnMetadata>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub source_system: Option<String>,

    #[serde(default)]
    pub target_resource: Option<String>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            columns,
            description: String::new(),
            source_system: None,
            target_resource: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// One declarative field-mapping rule
///
/// `target` is always non-empty. An empty `source` makes the rule
/// default-value-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default)]
    pub source: String,

    pub target: String,

    #[serde(default)]
    pub transform: Option<String>,

    #[serde(default, rename = "default")]
    pub default_value: Option<Value>,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            transform: None,
            default_value: None,
        }
    }

    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

/// Ordered field-mapping rules from one source table to one target resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMapping {
    pub source_system: String,

    #[serde(default)]
    pub source_table: String,

    pub target_resource: String,

    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,

    #[serde(default)]
    pub description: String,
}

/// A mapping that can be applied in both directions
///
/// When `reverse_field_mappings` is empty and `auto_reverse` is set, the
/// reverse rules are derived by swapping source and target on every rule that
/// can be inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidirectionalMapping {
    pub source_schema: String,

    pub target_schema: String,

    #[serde(default)]
    pub field_mappings: Vec<FieldMapping>,

    #[serde(default, alias = "reverse_mappings")]
    pub reverse_field_mappings: Vec<FieldMapping>,

    #[serde(default = "default_true")]
    pub auto_reverse: bool,

    #[serde(default)]
    pub description: String,
}

/// A field of a user-defined (non-FHIR) schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSchemaField {
    pub name: String,

    #[serde(rename = "type", default)]
    pub data_type: DataType,

    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub pii_level: PiiLevel,

    #[serde(default)]
    pub pii_category: PiiCategory,

    #[serde(default)]
    pub hipaa_identifier: Option<HipaaIdentifier>,

    #[serde(default)]
    pub masking_strategy: MaskingStrategy,

    #[serde(default)]
    pub masking_params: MaskingParams,

    #[serde(default)]
    pub description: String,
}

/// A user-defined schema addressed as `namespace/name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSchema {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub fields: Vec<CustomSchemaField>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub namespace: String,
}

impl CustomSchema {
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    pub fn to_schema_definition(&self) -> SchemaDefinition {
        let columns = self
            .fields
            .iter()
            .map(|f| ColumnMetadata {
                name: f.name.clone(),
                data_type: f.data_type,
                nullable: !f.required,
                description: f.description.clone(),
                pii_level: f.pii_level,
                pii_category: f.pii_category,
                hipaa_identifier: f.hipaa_identifier,
                masking_strategy: f.masking_strategy,
                masking_params: f.masking_params.clone(),
                source_column: None,
                transform: None,
            })
            .collect();

        SchemaDefinition {
            name: self.name.clone(),
            version: self.version.clone(),
            columns,
            description: self.description.clone(),
            source_system: Some(self.namespace.clone()),
            target_resource: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> String {
    "1.0.0".to_string()
}
