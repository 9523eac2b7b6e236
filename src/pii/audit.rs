//! Audit trail for PII detection and tagging decisions
//!
//! Entries are written as JSON lines. Sampled values are recorded only as
//! SHA-256 hashes; plaintext PII never reaches the log.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::detector::{DatasetPiiReport, DetectionMethod};
use crate::domain::{
    EhrglotError, HipaaIdentifier, MaskingStrategy, PiiLevel, Result, SchemaDefinition,
};

/// One audited column decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditColumn {
    pub column: String,
    pub pii_level: PiiLevel,
    pub hipaa_identifiers: Vec<HipaaIdentifier>,
    pub detection_method: DetectionMethod,
    pub confidence: f64,
    /// SHA-256 of each sampled match
    pub sample_hashes: Vec<String>,
    pub masking_strategy: MaskingStrategy,
}

/// One audit log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub dataset: String,
    pub columns_analyzed: usize,
    pub columns_with_pii: usize,
    pub columns: Vec<AuditColumn>,
}

/// Appends PII audit entries to a JSON-lines file
#[derive(Debug, Clone)]
pub struct PiiAuditLogger {
    log_path: PathBuf,
    enabled: bool,
}

impl PiiAuditLogger {
    pub fn new(log_path: impl Into<PathBuf>, enabled: bool) -> Result<Self> {
        let log_path = log_path.into();
        if enabled {
            if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    EhrglotError::Io(format!(
                        "Failed to create audit log directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        Ok(Self { log_path, enabled })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a detection report, with the masking chosen per column when known
    pub fn log_detection(
        &self,
        dataset: &str,
        report: &DatasetPiiReport,
        tagged: Option<&SchemaDefinition>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let columns = report
            .column_results
            .iter()
            .filter(|r| r.is_pii())
            .map(|r| AuditColumn {
                column: r.column_name.clone(),
                pii_level: r.pii_level,
                hipaa_identifiers: r.hipaa_identifiers.clone(),
                detection_method: r.detection_method,
                confidence: r.confidence,
                sample_hashes: r.sample_matches.iter().map(|s| hash_value(s)).collect(),
                masking_strategy: tagged
                    .and_then(|s| s.column(&r.column_name))
                    .map(|c| c.masking_strategy)
                    .unwrap_or(MaskingStrategy::None),
            })
            .collect();

        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            dataset: dataset.to_string(),
            columns_analyzed: report.total_columns,
            columns_with_pii: report.columns_with_pii,
            columns,
        };
        self.write_entry(&entry)
    }

    fn write_entry(&self, entry: &AuditEntry) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| {
                EhrglotError::Io(format!(
                    "Failed to open audit log {}: {e}",
                    self.log_path.display()
                ))
            })?;

        let line = serde_json::to_string(entry)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Hex SHA-256 of a value
pub fn hash_value(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}
