//! Turns detection results into column-level PII tags

use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use super::detector::{DatasetPiiReport, PiiDetectionResult, PiiDetector};
use crate::domain::{
    ColumnMetadata, HipaaIdentifier, MaskingParams, MaskingStrategy, PiiCategory, PiiLevel,
    SchemaDefinition,
};

/// PII annotation applied to one column
#[derive(Debug, Clone, PartialEq)]
pub struct PiiTag {
    pub pii_level: PiiLevel,
    pub pii_category: PiiCategory,
    pub hipaa_identifier: Option<HipaaIdentifier>,
    pub masking_strategy: MaskingStrategy,
    pub masking_params: MaskingParams,
    pub notes: String,
}

impl PiiTag {
    /// Tag that marks a column as carrying no PII
    pub fn none() -> Self {
        Self {
            pii_level: PiiLevel::None,
            pii_category: PiiCategory::None,
            hipaa_identifier: None,
            masking_strategy: MaskingStrategy::None,
            masking_params: MaskingParams::new(),
            notes: String::new(),
        }
    }
}

fn params(value: Value) -> MaskingParams {
    match value {
        Value::Object(map) => map,
        _ => MaskingParams::new(),
    }
}

/// Default masking for an identifier
fn default_masking(identifier: HipaaIdentifier) -> (MaskingStrategy, MaskingParams) {
    use HipaaIdentifier as H;
    use MaskingStrategy as S;

    match identifier {
        H::Names => (S::Redact, params(json!({"replacement": "[REDACTED]"}))),
        H::Geographic => (S::Generalize, params(json!({"keep_state": true}))),
        H::Dates => (S::Generalize, params(json!({"precision": "year"}))),
        H::PhoneNumbers | H::FaxNumbers => {
            (S::Redact, params(json!({"replacement": "XXX-XXX-XXXX"})))
        }
        H::EmailAddresses => (S::Hash, params(json!({"algorithm": "sha256", "truncate": 8}))),
        H::Ssn => (S::Partial, params(json!({"show_last": 4, "mask_char": "X"}))),
        H::Mrn | H::HealthPlanId | H::OtherUnique => (S::Tokenize, MaskingParams::new()),
        H::AccountNumbers => (S::Partial, params(json!({"show_last": 4}))),
        H::LicenseNumbers | H::VehicleIdentifiers | H::WebUrls => {
            (S::Redact, MaskingParams::new())
        }
        H::DeviceIdentifiers => (S::Hash, MaskingParams::new()),
        H::IpAddresses => (S::Generalize, params(json!({"mask_octets": 2}))),
        H::Biometric | H::Photos => (S::Suppress, MaskingParams::new()),
    }
}

/// Default `(strategy, params)` for every HIPAA identifier
pub static DEFAULT_MASKING_STRATEGIES: LazyLock<
    HashMap<HipaaIdentifier, (MaskingStrategy, MaskingParams)>,
> = LazyLock::new(|| {
    HipaaIdentifier::ALL
        .iter()
        .map(|id| (*id, default_masking(*id)))
        .collect()
});

/// PII statistics for a tagged schema
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PiiSummary {
    pub total_columns: usize,
    pub by_pii_level: BTreeMap<String, usize>,
    pub by_hipaa_identifier: BTreeMap<String, usize>,
    pub masking_required: Vec<String>,
    pub no_pii: Vec<String>,
}

/// Tags schemas and columns with PII metadata
#[derive(Debug, Clone)]
pub struct PiiTagger {
    detector: PiiDetector,
    auto_assign_masking: bool,
}

impl Default for PiiTagger {
    fn default() -> Self {
        Self::new(PiiDetector::default(), true)
    }
}

impl PiiTagger {
    pub fn new(detector: PiiDetector, auto_assign_masking: bool) -> Self {
        Self {
            detector,
            auto_assign_masking,
        }
    }

    pub fn detector(&self) -> &PiiDetector {
        &self.detector
    }

    /// Build a tag from one column's detection result
    ///
    /// The first detected identifier becomes the column's canonical one.
    pub fn create_tag_from_detection(&self, detection: &PiiDetectionResult) -> PiiTag {
        if detection.pii_level == PiiLevel::None {
            return PiiTag::none();
        }

        let hipaa_identifier = detection.hipaa_identifiers.first().copied();
        let (masking_strategy, masking_params) = match hipaa_identifier {
            Some(id) if self.auto_assign_masking => DEFAULT_MASKING_STRATEGIES
                .get(&id)
                .cloned()
                .unwrap_or_else(|| default_masking(id)),
            _ => (MaskingStrategy::None, MaskingParams::new()),
        };

        PiiTag {
            pii_level: detection.pii_level,
            pii_category: detection.pii_category,
            hipaa_identifier,
            masking_strategy,
            masking_params,
            notes: format!(
                "Auto-detected via {} (confidence: {:.0}%)",
                detection.detection_method,
                detection.confidence * 100.0
            ),
        }
    }

    /// Copy of `column` with its PII fields replaced by `tag`
    pub fn tag_column(&self, column: &ColumnMetadata, tag: &PiiTag) -> ColumnMetadata {
        ColumnMetadata {
            pii_level: tag.pii_level,
            pii_category: tag.pii_category,
            hipaa_identifier: tag.hipaa_identifier,
            masking_strategy: tag.masking_strategy,
            masking_params: tag.masking_params.clone(),
            ..column.clone()
        }
    }

    /// New schema with every reported column tagged
    ///
    /// Columns missing from the report pass through unchanged.
    pub fn tag_schema(
        &self,
        schema: &SchemaDefinition,
        report: &DatasetPiiReport,
    ) -> SchemaDefinition {
        let columns = schema
            .columns
            .iter()
            .map(|column| match report.result(&column.name) {
                Some(detection) => {
                    let tag = self.create_tag_from_detection(detection);
                    self.tag_column(column, &tag)
                }
                None => column.clone(),
            })
            .collect();

        SchemaDefinition {
            columns,
            ..schema.clone()
        }
    }

    /// Detect PII from column names and tag the schema in one step
    pub fn tag_schema_auto(
        &self,
        schema: &SchemaDefinition,
    ) -> (SchemaDefinition, DatasetPiiReport) {
        let report = self.detector.detect_from_schema(&schema.column_names());
        let tagged = self.tag_schema(schema, &report);
        (tagged, report)
    }

    /// Tag chosen by hand
    ///
    /// Without an explicit strategy, the identifier's default masking applies.
    pub fn manual_tag(
        &self,
        column_name: &str,
        pii_level: PiiLevel,
        pii_category: PiiCategory,
        hipaa_identifier: Option<HipaaIdentifier>,
        masking_strategy: Option<MaskingStrategy>,
    ) -> PiiTag {
        let strategy = masking_strategy.unwrap_or(MaskingStrategy::None);
        let (masking_strategy, masking_params) = match hipaa_identifier {
            Some(id) if strategy == MaskingStrategy::None => default_masking(id),
            _ => (strategy, MaskingParams::new()),
        };

        PiiTag {
            pii_level,
            pii_category,
            hipaa_identifier,
            masking_strategy,
            masking_params,
            notes: format!("Manually tagged: {column_name}"),
        }
    }

    pub fn get_pii_summary(&self, schema: &SchemaDefinition) -> PiiSummary {
        let mut summary = PiiSummary {
            total_columns: schema.columns.len(),
            ..PiiSummary::default()
        };

        for column in &schema.columns {
            *summary
                .by_pii_level
                .entry(column.pii_level.as_str().to_string())
                .or_default() += 1;

            if let Some(id) = column.hipaa_identifier {
                *summary
                    .by_hipaa_identifier
                    .entry(id.as_str().to_string())
                    .or_default() += 1;
            }
            if column.masking_strategy != MaskingStrategy::None {
                summary.masking_required.push(column.name.clone());
            }
            if column.pii_level == PiiLevel::None {
                summary.no_pii.push(column.name.clone());
            }
        }

        summary
    }
}
