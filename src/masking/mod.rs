//! Masking policy generation for analytics platforms
//!
//! A [`MaskingPolicy`] is built from a PII-tagged schema: one [`MaskingRule`]
//! per column whose masking strategy is not `none`. Each platform generator
//! renders the policy to native SQL as a [`GeneratedSql`] bundle.
//!
//! Every platform enforces the same three access tiers per column:
//!
//! - full-access roles see the raw value
//! - partial-access roles see the `partial` strategy output, whatever the
//!   column's configured strategy is
//! - every other principal sees the configured masking expression
//!
//! The set of platforms is closed: [`MaskingPlatform`] names each one and
//! [`MaskingPlatform::generator`] builds its [`MaskingPolicyGenerator`].

pub mod bigquery;
pub mod databricks;
pub mod fabric;
pub mod redshift;
pub mod snowflake;
pub mod synapse;
mod tsql;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::domain::{EhrglotError, MaskingParams, MaskingStrategy, SchemaDefinition};

pub use bigquery::BigQueryMaskingGenerator;
pub use databricks::DatabricksMaskingGenerator;
pub use fabric::FabricMaskingGenerator;
pub use redshift::RedshiftMaskingGenerator;
pub use snowflake::SnowflakeMaskingGenerator;
pub use synapse::SynapseMaskingGenerator;

/// Replacement literal used by `redact` when none is configured
pub const DEFAULT_REDACTION: &str = "***REDACTED***";

/// Characters revealed at the end of a value by the partial-access tier
pub const PARTIAL_TIER_SHOW_LAST: u64 = 4;

/// Role lists for the three access tiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRoles {
    pub full_access: Vec<String>,
    pub partial_access: Vec<String>,
    #[serde(default)]
    pub no_access: Vec<String>,
}

impl AccessRoles {
    pub fn new(full_access: &[&str], partial_access: &[&str], no_access: &[&str]) -> Self {
        let owned =
            |roles: &[&str]| -> Vec<String> { roles.iter().map(|r| r.to_string()).collect() };
        Self {
            full_access: owned(full_access),
            partial_access: owned(partial_access),
            no_access: owned(no_access),
        }
    }

    /// Replace empty tiers with the defaults
    pub fn or_defaults(self, defaults: &AccessRoles) -> Self {
        let pick = |roles: Vec<String>, fallback: &Vec<String>| {
            if roles.is_empty() {
                fallback.clone()
            } else {
                roles
            }
        };
        Self {
            full_access: pick(self.full_access, &defaults.full_access),
            partial_access: pick(self.partial_access, &defaults.partial_access),
            no_access: pick(self.no_access, &defaults.no_access),
        }
    }
}

/// Masking for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingRule {
    pub column_name: String,
    pub strategy: MaskingStrategy,
    #[serde(default)]
    pub params: MaskingParams,
    #[serde(default)]
    pub full_access_roles: Vec<String>,
    #[serde(default)]
    pub partial_access_roles: Vec<String>,
    #[serde(default)]
    pub no_access_roles: Vec<String>,
}

/// Masking rules for one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskingPolicy {
    pub table_name: String,
    pub schema_name: Option<String>,
    pub database_name: Option<String>,
    pub rules: Vec<MaskingRule>,
    #[serde(default)]
    pub description: String,
}

impl MaskingPolicy {
    /// Dotted name from whichever of database, schema and table are set
    pub fn qualified_table(&self) -> String {
        qualified(&[
            self.database_name.as_deref(),
            self.schema_name.as_deref(),
            Some(&self.table_name),
        ])
    }
}

/// Rendered SQL for a policy, grouped by purpose
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeneratedSql {
    pub create_statements: Vec<String>,
    pub apply_statements: Vec<String>,
    pub drop_statements: Vec<String>,
    pub grant_statements: Vec<String>,
    pub comments: Vec<String>,
}

impl GeneratedSql {
    /// Render a runnable script
    ///
    /// Drops come before creates so the script can be re-run.
    pub fn to_script(&self, include_drops: bool) -> String {
        let mut parts: Vec<String> = vec![
            "-- EHRglot Generated Masking Policies".to_string(),
            format!("-- {}", "=".repeat(50)),
            String::new(),
        ];

        if !self.comments.is_empty() {
            parts.extend(self.comments.iter().map(|c| format!("-- {c}")));
            parts.push(String::new());
        }

        let mut section = |title: &str, statements: &[String], spaced: bool| {
            if statements.is_empty() {
                return;
            }
            parts.push(format!("-- {title}"));
            for statement in statements {
                parts.push(statement.clone());
                if spaced {
                    parts.push(String::new());
                }
            }
            if !spaced {
                parts.push(String::new());
            }
        };

        if include_drops {
            section("Drop existing policies", &self.drop_statements, false);
        }
        section("Create masking policies", &self.create_statements, true);
        section("Apply policies to columns", &self.apply_statements, false);
        section("Grant permissions", &self.grant_statements, false);

        parts.join("\n")
    }
}

/// Target platforms for masking SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskingPlatform {
    Snowflake,
    Databricks,
    BigQuery,
    Redshift,
    Synapse,
    Fabric,
}

impl MaskingPlatform {
    pub const ALL: [MaskingPlatform; 6] = [
        MaskingPlatform::Snowflake,
        MaskingPlatform::Databricks,
        MaskingPlatform::BigQuery,
        MaskingPlatform::Redshift,
        MaskingPlatform::Synapse,
        MaskingPlatform::Fabric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MaskingPlatform::Snowflake => "snowflake",
            MaskingPlatform::Databricks => "databricks",
            MaskingPlatform::BigQuery => "bigquery",
            MaskingPlatform::Redshift => "redshift",
            MaskingPlatform::Synapse => "synapse",
            MaskingPlatform::Fabric => "fabric",
        }
    }

    /// Roles each platform uses when none are configured
    pub fn default_roles(&self) -> AccessRoles {
        const NO_ACCESS: &[&str] = &["PUBLIC", "VIEWER"];
        match self {
            MaskingPlatform::Snowflake => AccessRoles::new(
                &["PHI_ADMIN", "CLINICAL_ADMIN"],
                &["ANALYST", "RESEARCHER"],
                NO_ACCESS,
            ),
            MaskingPlatform::Databricks => AccessRoles::new(
                &["phi_admin", "clinical_admin"],
                &["analyst", "data_scientist"],
                NO_ACCESS,
            ),
            MaskingPlatform::BigQuery => AccessRoles::new(
                &["roles/bigquery.dataViewer", "roles/bigquery.admin"],
                &["roles/bigquery.maskedReader"],
                NO_ACCESS,
            ),
            MaskingPlatform::Redshift => AccessRoles::new(
                &["phi_admin", "data_admin"],
                &["analyst", "researcher"],
                NO_ACCESS,
            ),
            MaskingPlatform::Synapse => AccessRoles::new(
                &["db_owner", "phi_admin"],
                &["analyst", "researcher"],
                NO_ACCESS,
            ),
            MaskingPlatform::Fabric => AccessRoles::new(
                &["PHI_Admins", "Clinical_Staff"],
                &["Analysts", "Researchers"],
                NO_ACCESS,
            ),
        }
    }

    /// Generator for this platform; empty role tiers fall back to the defaults
    pub fn generator(&self, roles: Option<AccessRoles>) -> Box<dyn MaskingPolicyGenerator> {
        let defaults = self.default_roles();
        let roles = roles.map_or_else(|| defaults.clone(), |r| r.or_defaults(&defaults));
        match self {
            MaskingPlatform::Snowflake => Box::new(SnowflakeMaskingGenerator::new(roles)),
            MaskingPlatform::Databricks => Box::new(DatabricksMaskingGenerator::new(roles)),
            MaskingPlatform::BigQuery => Box::new(BigQueryMaskingGenerator::new(roles)),
            MaskingPlatform::Redshift => Box::new(RedshiftMaskingGenerator::new(roles)),
            MaskingPlatform::Synapse => Box::new(SynapseMaskingGenerator::new(roles)),
            MaskingPlatform::Fabric => Box::new(FabricMaskingGenerator::new(roles)),
        }
    }
}

impl fmt::Display for MaskingPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaskingPlatform {
    type Err = EhrglotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MaskingPlatform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                EhrglotError::Configuration(format!(
                    "Unknown masking platform '{s}'. Expected one of: {}",
                    MaskingPlatform::ALL.map(|p| p.as_str()).join(", ")
                ))
            })
    }
}

/// Renders masking policies for one platform
pub trait MaskingPolicyGenerator: Send + Sync {
    fn platform(&self) -> MaskingPlatform;

    /// Roles attached to every rule this generator creates
    fn roles(&self) -> &AccessRoles;

    /// Platform-native expression masking `column` with `strategy`
    ///
    /// # Arguments
    ///
    /// * `column` - Column or parameter name the expression reads
    /// * `data_type` - Platform SQL type of the column
    /// * `strategy` - Abstract masking strategy
    /// * `params` - Strategy parameters (`replacement`, `truncate`, `show_last`,
    ///   `mask_char`, `precision`, `mask_octets`, ...)
    fn generate_mask_expression(
        &self,
        column: &str,
        data_type: &str,
        strategy: MaskingStrategy,
        params: &MaskingParams,
    ) -> String;

    /// Render create, apply, drop and grant statements for a policy
    ///
    /// Produces exactly one apply statement and one drop statement per rule.
    fn generate_sql(&self, policy: &MaskingPolicy) -> GeneratedSql;

    /// Build a policy from a PII-tagged schema
    ///
    /// One rule per column with a masking strategy, in schema column order.
    fn create_policy_from_schema(
        &self,
        schema: &SchemaDefinition,
        table_name: &str,
        schema_name: Option<&str>,
        database_name: Option<&str>,
    ) -> MaskingPolicy {
        let roles = self.roles();
        let rules = schema
            .columns
            .iter()
            .filter(|c| c.masking_strategy != MaskingStrategy::None)
            .map(|c| MaskingRule {
                column_name: c.name.clone(),
                strategy: c.masking_strategy,
                params: c.masking_params.clone(),
                full_access_roles: roles.full_access.clone(),
                partial_access_roles: roles.partial_access.clone(),
                no_access_roles: roles.no_access.clone(),
            })
            .collect();

        MaskingPolicy {
            table_name: table_name.to_string(),
            schema_name: schema_name.map(str::to_string),
            database_name: database_name.map(str::to_string),
            rules,
            description: format!("Masking policy for {}", schema.name),
        }
    }

    /// Expression shown to partial-access roles
    fn partial_tier_expression(&self, column: &str, data_type: &str) -> String {
        let mut params = MaskingParams::new();
        params.insert("show_last".to_string(), Value::from(PARTIAL_TIER_SHOW_LAST));
        self.generate_mask_expression(column, data_type, MaskingStrategy::Partial, &params)
    }
}

pub(crate) fn param_u64(params: &MaskingParams, key: &str, default: u64) -> u64 {
    params.get(key).and_then(Value::as_u64).unwrap_or(default)
}

pub(crate) fn param_str<'a>(params: &'a MaskingParams, key: &str, default: &'a str) -> &'a str {
    params.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn param_bool(params: &MaskingParams, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Single-quoted SQL string literal
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Comma-separated quoted literals
pub(crate) fn quote_list(values: &[String]) -> String {
    values
        .iter()
        .map(|v| quote_literal(v))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn qualified(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(".")
}

/// Date truncation unit for a `precision` parameter
pub(crate) fn date_precision(params: &MaskingParams) -> &'static str {
    match param_str(params, "precision", "year") {
        "month" => "MONTH",
        "day" => "DAY",
        _ => "YEAR",
    }
}
