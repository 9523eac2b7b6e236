//! Column-level PII detection
//!
//! Combines column-name matching with sampled-value matching against the
//! HIPAA catalog. Ambiguity is resolved deterministically: the highest level
//! among all matches wins, and the category comes from the first match.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::catalog::{self, HipaaIdentifierSpec};
use crate::backends::{Backend, Table};
use crate::domain::{HipaaIdentifier, PiiCategory, PiiLevel};
use crate::mapping::transforms::value_to_string;

/// Number of matched sample values kept on a result
const MAX_SAMPLE_MATCHES: usize = 3;

/// Sample values are truncated to this many characters in reports
const SAMPLE_PREVIEW_CHARS: usize = 50;

/// How a column was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    None,
    ColumnName,
    ValuePattern,
    Both,
}

impl DetectionMethod {
    /// Confidence attached to each method
    pub fn confidence(&self) -> f64 {
        match self {
            DetectionMethod::None => 0.0,
            DetectionMethod::ColumnName => 0.7,
            DetectionMethod::ValuePattern => 0.8,
            DetectionMethod::Both => 0.95,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::None => "none",
            DetectionMethod::ColumnName => "column_name",
            DetectionMethod::ValuePattern => "value_pattern",
            DetectionMethod::Both => "both",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detection outcome for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiDetectionResult {
    pub column_name: String,
    pub pii_level: PiiLevel,
    pub pii_category: PiiCategory,
    pub hipaa_identifiers: Vec<HipaaIdentifier>,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    pub sample_matches: Vec<String>,
    pub notes: String,
}

impl PiiDetectionResult {
    fn none(column_name: &str) -> Self {
        Self {
            column_name: column_name.to_string(),
            pii_level: PiiLevel::None,
            pii_category: PiiCategory::None,
            hipaa_identifiers: Vec::new(),
            confidence: 0.0,
            detection_method: DetectionMethod::None,
            sample_matches: Vec::new(),
            notes: String::new(),
        }
    }

    pub fn is_pii(&self) -> bool {
        self.pii_level != PiiLevel::None
    }
}

/// Aggregate detection report for a dataset
///
/// `column_results` keeps the dataset's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPiiReport {
    pub total_columns: usize,
    pub columns_with_pii: usize,
    pub high_risk_columns: Vec<String>,
    pub critical_columns: Vec<String>,
    pub column_results: Vec<PiiDetectionResult>,
    pub summary: String,
}

impl DatasetPiiReport {
    fn from_results(column_results: Vec<PiiDetectionResult>) -> Self {
        let mut high_risk_columns = Vec::new();
        let mut critical_columns = Vec::new();
        for result in &column_results {
            match result.pii_level {
                PiiLevel::Critical => critical_columns.push(result.column_name.clone()),
                PiiLevel::High => high_risk_columns.push(result.column_name.clone()),
                _ => {}
            }
        }

        Self {
            total_columns: column_results.len(),
            columns_with_pii: column_results.iter().filter(|r| r.is_pii()).count(),
            high_risk_columns,
            critical_columns,
            column_results,
            summary: String::new(),
        }
    }

    /// Result for a column by name
    pub fn result(&self, column_name: &str) -> Option<&PiiDetectionResult> {
        self.column_results
            .iter()
            .find(|r| r.column_name == column_name)
    }
}

/// Detects PII in columns using the HIPAA catalog
#[derive(Debug, Clone)]
pub struct PiiDetector {
    sample_size: usize,
    confidence_threshold: f64,
    value_match_threshold: f64,
}

impl Default for PiiDetector {
    fn default() -> Self {
        Self {
            sample_size: 100,
            confidence_threshold: 0.5,
            value_match_threshold: 0.3,
        }
    }
}

impl PiiDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows sampled per column by [`detect_dataframe`](Self::detect_dataframe)
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Results below this confidence are reported as not PII
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Fraction of non-null samples an identifier must match to count
    pub fn with_value_match_threshold(mut self, threshold: f64) -> Self {
        self.value_match_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    pub fn value_match_threshold(&self) -> f64 {
        self.value_match_threshold
    }

    fn value_matches(
        &self,
        samples: &[Value],
        examples: &mut Vec<String>,
    ) -> Vec<&'static HipaaIdentifierSpec> {
        // first-seen order, so ties resolve by which identifier matched first
        let mut counts: Vec<(&'static HipaaIdentifierSpec, usize)> = Vec::new();
        let mut non_null = 0usize;

        for value in samples.iter().filter(|v| !v.is_null()) {
            non_null += 1;
            let text = value_to_string(value);
            for spec in catalog::match_value(&text) {
                match counts.iter_mut().find(|(s, _)| s.identifier == spec.identifier) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((spec, 1)),
                }
                if examples.len() < MAX_SAMPLE_MATCHES {
                    examples.push(text.chars().take(SAMPLE_PREVIEW_CHARS).collect());
                }
            }
        }

        if non_null == 0 {
            return Vec::new();
        }

        counts
            .into_iter()
            .filter(|(_, n)| *n as f64 / non_null as f64 >= self.value_match_threshold)
            .map(|(spec, _)| spec)
            .collect()
    }

    /// Classify one column from its name and optional sample values
    pub fn detect_column(
        &self,
        column_name: &str,
        samples: Option<&[Value]>,
    ) -> PiiDetectionResult {
        let name_matches = catalog::match_column_name(column_name);

        let mut sample_matches = Vec::new();
        let value_matches = match samples {
            Some(values) if !values.is_empty() => self.value_matches(values, &mut sample_matches),
            _ => Vec::new(),
        };

        let mut all_matches: Vec<&'static HipaaIdentifierSpec> = Vec::new();
        for spec in name_matches.iter().chain(value_matches.iter()) {
            if !all_matches.iter().any(|m| m.identifier == spec.identifier) {
                all_matches.push(spec);
            }
        }

        let Some(first) = all_matches.first() else {
            return PiiDetectionResult::none(column_name);
        };

        let method = match (!name_matches.is_empty(), !value_matches.is_empty()) {
            (true, true) => DetectionMethod::Both,
            (true, false) => DetectionMethod::ColumnName,
            _ => DetectionMethod::ValuePattern,
        };

        if method.confidence() < self.confidence_threshold {
            let mut result = PiiDetectionResult::none(column_name);
            result.notes = format!(
                "Below confidence threshold ({:.2} < {:.2})",
                method.confidence(),
                self.confidence_threshold
            );
            return result;
        }

        let pii_level = all_matches
            .iter()
            .map(|m| m.pii_level)
            .max()
            .unwrap_or(PiiLevel::None);

        PiiDetectionResult {
            column_name: column_name.to_string(),
            pii_level,
            pii_category: first.pii_category,
            hipaa_identifiers: all_matches.iter().map(|m| m.identifier).collect(),
            confidence: method.confidence(),
            detection_method: method,
            sample_matches,
            notes: String::new(),
        }
    }

    /// Classify every column of a table, sampling values through the backend
    pub fn detect_dataframe(&self, table: &Table, backend: &dyn Backend) -> DatasetPiiReport {
        let schema = backend.get_schema(table);
        let sampled = backend.sample(table, self.sample_size);

        let results: Vec<PiiDetectionResult> = schema
            .columns
            .iter()
            .map(|column| {
                let values = backend.column_values(&sampled, &column.name);
                self.detect_column(&column.name, Some(&values))
            })
            .collect();

        let mut report = DatasetPiiReport::from_results(results);
        let mut parts = vec![
            format!("Analyzed {} columns.", report.total_columns),
            format!("Found {} columns with potential PII.", report.columns_with_pii),
        ];
        if !report.critical_columns.is_empty() {
            parts.push(format!("CRITICAL: {}", report.critical_columns.join(", ")));
        }
        if !report.high_risk_columns.is_empty() {
            parts.push(format!("HIGH RISK: {}", report.high_risk_columns.join(", ")));
        }
        report.summary = parts.join(" ");

        tracing::info!(
            backend = backend.name(),
            columns = report.total_columns,
            flagged = report.columns_with_pii,
            critical = report.critical_columns.len(),
            "PII detection complete"
        );
        report
    }

    /// Classify columns by name only, for when no data is available
    pub fn detect_from_schema<S: AsRef<str>>(&self, column_names: &[S]) -> DatasetPiiReport {
        let results: Vec<PiiDetectionResult> = column_names
            .iter()
            .map(|name| self.detect_column(name.as_ref(), None))
            .collect();

        let mut report = DatasetPiiReport::from_results(results);
        report.summary = format!(
            "Schema-only analysis: {}/{} columns flagged.",
            report.columns_with_pii, report.total_columns
        );
        report
    }
}
