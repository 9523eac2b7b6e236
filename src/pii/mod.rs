//! HIPAA PII detection and tagging
//!
//! - [`catalog`] holds the 18 Safe Harbor identifier classes and their patterns
//! - [`detector`] classifies columns from names and sampled values
//! - [`tagger`] turns detections into column tags with default masking
//! - [`audit`] records detection decisions without plaintext values

pub mod audit;
pub mod catalog;
pub mod detector;
pub mod tagger;

pub use audit::PiiAuditLogger;
pub use catalog::{HipaaIdentifierSpec, HIPAA_IDENTIFIERS};
pub use detector::{DatasetPiiReport, DetectionMethod, PiiDetectionResult, PiiDetector};
pub use tagger::{PiiSummary, PiiTag, PiiTagger, DEFAULT_MASKING_STRATEGIES};
