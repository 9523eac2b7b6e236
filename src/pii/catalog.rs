//! HIPAA Safe Harbor identifier catalog and pattern matcher
//!
//! [`HIPAA_IDENTIFIERS`] is a static table of the 18 identifier classes. Its
//! regexes are compiled once, on first use, into a process-wide table that is
//! read-only afterwards. Column-name patterns are case-insensitive; value
//! patterns are case-sensitive. Every pattern must match the whole input.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

use crate::domain::{HipaaIdentifier, PiiCategory, PiiLevel};

/// Static description of one identifier class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HipaaIdentifierSpec {
    pub identifier: HipaaIdentifier,
    pub name: &'static str,
    pub description: &'static str,
    pub pii_level: PiiLevel,
    pub pii_category: PiiCategory,
    pub column_patterns: &'static [&'static str],
    pub value_patterns: &'static [&'static str],
    pub examples: &'static [&'static str],
}

const US_PHONE: &str = r"\+?1?\s*\(?[0-9]{3}\)?[\s.-]?[0-9]{3}[\s.-]?[0-9]{4}";

/// The 18 identifier classes, in declaration order
pub static HIPAA_IDENTIFIERS: [HipaaIdentifierSpec; 18] = [
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Names,
        name: "Names",
        description: "Names of individuals including first, last, and maiden names",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*name.*",
            ".*first.*name.*",
            ".*last.*name.*",
            ".*maiden.*",
            ".*surname.*",
            ".*given.*name.*",
            ".*family.*name.*",
            "pat_first.*",
            "pat_last.*",
            "patient.*name.*",
        ],
        // too varied to recognise by shape
        value_patterns: &[],
        examples: &["John Smith", "Jane Doe", "O'Connor"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Geographic,
        name: "Geographic Data",
        description: "All geographic subdivisions smaller than a state (street, city, ZIP)",
        pii_level: PiiLevel::High,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*address.*",
            ".*street.*",
            ".*city.*",
            ".*zip.*",
            ".*postal.*",
            ".*county.*",
            ".*geo.*",
            "add_line.*",
        ],
        value_patterns: &[r"\d{5}(-\d{4})?", r"[A-Z]\d[A-Z]\s?\d[A-Z]\d"],
        examples: &["123 Main St", "New York", "10001", "90210-1234"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Dates,
        name: "Dates",
        description: "All elements of dates except year (birth, admission, discharge, death)",
        pii_level: PiiLevel::High,
        pii_category: PiiCategory::QuasiIdentifier,
        column_patterns: &[
            ".*birth.*date.*",
            ".*dob.*",
            ".*death.*date.*",
            ".*admit.*date.*",
            ".*discharge.*date.*",
            ".*service.*date.*",
            ".*effective.*date.*",
            ".*dt_tm",
            ".*_date",
        ],
        value_patterns: &[r"\d{4}-\d{2}-\d{2}", r"\d{2}/\d{2}/\d{4}", r"\d{2}-\d{2}-\d{4}"],
        examples: &["1990-01-15", "03/15/1985", "12-25-2000"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::PhoneNumbers,
        name: "Phone Numbers",
        description: "Telephone numbers including area codes",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*phone.*", ".*tel.*", ".*mobile.*", ".*cell.*", ".*contact.*num.*"],
        value_patterns: &[US_PHONE, r"\+[0-9]{1,3}[\s.-]?[0-9]{6,14}"],
        examples: &["(555) 123-4567", "+1-555-123-4567", "5551234567"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::FaxNumbers,
        name: "Fax Numbers",
        description: "Fax numbers",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*fax.*"],
        value_patterns: &[US_PHONE],
        examples: &["(555) 123-4567", "555-123-4567"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::EmailAddresses,
        name: "Email Addresses",
        description: "Electronic mail addresses",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*email.*", ".*e_mail.*", ".*mail.*addr.*"],
        value_patterns: &[r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}"],
        examples: &["patient@example.com", "john.doe@hospital.org"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Ssn,
        name: "Social Security Numbers",
        description: "Social Security numbers",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*ssn.*", ".*social.*sec.*", ".*ss_num.*", ".*soc.*sec.*num.*"],
        value_patterns: &[r"\d{3}-?\d{2}-?\d{4}", r"\d{9}"],
        examples: &["123-45-6789", "123456789"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Mrn,
        name: "Medical Record Numbers",
        description: "Medical record numbers and health plan identifiers",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*mrn.*",
            ".*medical.*rec.*",
            ".*pat_id.*",
            ".*patient.*id.*",
            ".*chart.*num.*",
        ],
        // formats vary by institution
        value_patterns: &[],
        examples: &["MRN12345678", "00-123456"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::HealthPlanId,
        name: "Health Plan Beneficiary Numbers",
        description: "Health plan beneficiary numbers and insurance IDs",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*health.*plan.*",
            ".*insurance.*id.*",
            ".*member.*id.*",
            ".*beneficiary.*",
            ".*subscriber.*id.*",
            ".*policy.*num.*",
        ],
        value_patterns: &[],
        examples: &["HPB123456789", "INS-98765"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::AccountNumbers,
        name: "Account Numbers",
        description: "Account numbers including bank and billing accounts",
        pii_level: PiiLevel::High,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*account.*", ".*acct.*", ".*billing.*num.*", ".*fin.*num.*"],
        value_patterns: &[],
        examples: &["1234567890", "ACCT-12345"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::LicenseNumbers,
        name: "Certificate/License Numbers",
        description: "Certificate and license numbers (driver's license, professional)",
        pii_level: PiiLevel::High,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*license.*",
            ".*licence.*",
            ".*driver.*lic.*",
            ".*dl_num.*",
            ".*certificate.*",
        ],
        value_patterns: &[],
        examples: &["DL12345678", "LIC-2023-001"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::VehicleIdentifiers,
        name: "Vehicle Identifiers",
        description: "Vehicle identifiers and serial numbers including license plate numbers",
        pii_level: PiiLevel::Medium,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*vehicle.*", ".*vin.*", ".*plate.*", ".*car.*id.*"],
        value_patterns: &["[A-HJ-NPR-Z0-9]{17}"],
        examples: &["1HGCM82633A123456", "ABC-1234"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::DeviceIdentifiers,
        name: "Device Identifiers",
        description: "Device identifiers and serial numbers",
        pii_level: PiiLevel::Medium,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*device.*id.*",
            ".*serial.*",
            ".*imei.*",
            ".*mac.*addr.*",
            ".*equipment.*id.*",
        ],
        value_patterns: &["[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}", r"\d{15}"],
        examples: &["00:1A:2B:3C:4D:5E", "123456789012345"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::WebUrls,
        name: "Web URLs",
        description: "Web Universal Resource Locators (URLs)",
        pii_level: PiiLevel::Medium,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*url.*", ".*website.*", ".*web.*addr.*", ".*link.*"],
        value_patterns: &[r"https?://[^\s]+"],
        examples: &["https://patient-portal.example.com/user123"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::IpAddresses,
        name: "IP Addresses",
        description: "Internet Protocol (IP) address numbers",
        pii_level: PiiLevel::Medium,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*ip.*addr.*", ".*ip_address.*", ".*client.*ip.*", ".*source.*ip.*"],
        value_patterns: &[
            r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}",
            "([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}",
        ],
        examples: &["192.168.1.1", "2001:0db8:85a3:0000:0000:8a2e:0370:7334"],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Biometric,
        name: "Biometric Identifiers",
        description: "Biometric identifiers including finger/voice prints, retinal scans",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*biometric.*",
            ".*fingerprint.*",
            ".*retina.*",
            ".*iris.*",
            ".*voice.*print.*",
            ".*face.*id.*",
        ],
        // binary data
        value_patterns: &[],
        examples: &[],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::Photos,
        name: "Full-face Photographs",
        description: "Full-face photographic images and comparable images",
        pii_level: PiiLevel::Critical,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[
            ".*photo.*",
            ".*image.*",
            ".*picture.*",
            ".*portrait.*",
            ".*headshot.*",
            ".*avatar.*",
        ],
        // binary data
        value_patterns: &[],
        examples: &[],
    },
    HipaaIdentifierSpec {
        identifier: HipaaIdentifier::OtherUnique,
        name: "Other Unique Identifiers",
        description: "Any other unique identifying number, characteristic, or code",
        pii_level: PiiLevel::High,
        pii_category: PiiCategory::DirectIdentifier,
        column_patterns: &[".*unique.*id.*", ".*guid.*", ".*uuid.*", ".*external.*id.*"],
        value_patterns: &[
            "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        ],
        examples: &["550e8400-e29b-41d4-a716-446655440000"],
    },
];

/// Compiled regexes for one catalog entry
struct CompiledSpec {
    spec: &'static HipaaIdentifierSpec,
    column_patterns: Vec<Regex>,
    value_patterns: Vec<Regex>,
}

static COMPILED: LazyLock<Vec<CompiledSpec>> = LazyLock::new(|| {
    HIPAA_IDENTIFIERS
        .iter()
        .map(|spec| CompiledSpec {
            spec,
            column_patterns: compile_all(spec, spec.column_patterns, true),
            value_patterns: compile_all(spec, spec.value_patterns, false),
        })
        .collect()
});

fn compile_all(
    spec: &HipaaIdentifierSpec,
    patterns: &[&str],
    case_insensitive: bool,
) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| {
            RegexBuilder::new(&format!("^(?:{pattern})$"))
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|e| {
                    tracing::error!(
                        identifier = %spec.identifier,
                        pattern = %pattern,
                        error = %e,
                        "Skipping invalid HIPAA pattern"
                    );
                })
                .ok()
        })
        .collect()
}

/// Every spec with a column-name pattern matching the whole of `column_name`
pub fn match_column_name(column_name: &str) -> Vec<&'static HipaaIdentifierSpec> {
    COMPILED
        .iter()
        .filter(|c| c.column_patterns.iter().any(|re| re.is_match(column_name)))
        .map(|c| c.spec)
        .collect()
}

/// Every spec with a value pattern matching the whole of `value`
pub fn match_value(value: &str) -> Vec<&'static HipaaIdentifierSpec> {
    COMPILED
        .iter()
        .filter(|c| c.value_patterns.iter().any(|re| re.is_match(value)))
        .map(|c| c.spec)
        .collect()
}

/// Catalog entry for an identifier
pub fn get_spec(identifier: HipaaIdentifier) -> &'static HipaaIdentifierSpec {
    // ALL and HIPAA_IDENTIFIERS share declaration order
    &HIPAA_IDENTIFIERS[identifier as usize]
}
