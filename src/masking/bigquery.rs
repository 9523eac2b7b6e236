//! BigQuery column-level data masking
//!
//! Columns are protected by policy tags in a Data Catalog taxonomy. Each rule
//! gets two masking rules: the configured one and a partial-view one. Access
//! tiers are granted per policy tag:
//!
//! - full-access principals get Fine-Grained Reader (raw values)
//! - partial-access principals get Masked Reader on the partial rule
//! - everyone else gets Masked Reader on the configured rule
//!
//! Taxonomy and tag creation is not expressible in SQL, so those steps are
//! emitted as `bq` commands in comments.

use super::{
    date_precision, param_bool, param_str, param_u64, quote_literal, AccessRoles, GeneratedSql,
    MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator, MaskingRule, DEFAULT_REDACTION,
};
use crate::domain::{MaskingParams, MaskingStrategy};

const VALUE_TYPE: &str = "STRING";
const DEFAULT_PROJECT: &str = "your-project-id";
const DEFAULT_DATASET: &str = "healthcare";

#[derive(Debug, Clone)]
pub struct BigQueryMaskingGenerator {
    roles: AccessRoles,
    location: String,
}

impl Default for BigQueryMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::BigQuery.default_roles())
    }
}

impl BigQueryMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self {
            roles,
            location: "us".to_string(),
        }
    }

    /// Data Catalog location for the taxonomy
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    fn policy_tag_path(&self, project: &str, taxonomy: &str, tag: &str) -> String {
        format!(
            "projects/{project}/locations/{}/taxonomies/{taxonomy}/policyTags/{tag}",
            self.location
        )
    }

    fn create_masking_rule(&self, target: &str, rule: &MaskingRule, expression: &str) -> String {
        format!(
            "-- Create masking rule for {column}\n\
             CREATE OR REPLACE MASKING RULE `{target}`\n\
             AS ({column} {VALUE_TYPE}) RETURNS {VALUE_TYPE} AS (\n  {expression}\n);",
            column = rule.column_name,
        )
    }

    /// View exposing masked expressions in place of the listed columns
    ///
    /// # Arguments
    ///
    /// * `columns_to_mask` - `(column, expression)` pairs, in select order
    /// * `reader_group` - Group granted read access to the view
    pub fn generate_authorized_view(
        &self,
        source_table: &str,
        view_name: &str,
        project: &str,
        dataset: &str,
        columns_to_mask: &[(String, String)],
        reader_group: &str,
    ) -> String {
        let select = columns_to_mask
            .iter()
            .map(|(column, expression)| format!("  {expression} AS {column},"))
            .collect::<Vec<_>>()
            .join("\n");
        let excluded = columns_to_mask
            .iter()
            .map(|(column, _)| column.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "-- Create authorized view with masking\n\
             CREATE OR REPLACE VIEW `{project}.{dataset}.{view_name}` AS\n\
             SELECT\n{select}\n  * EXCEPT({excluded})\n\
             FROM `{project}.{dataset}.{source_table}`;\n\n\
             -- Grant access to the view\n\
             GRANT `roles/bigquery.dataViewer`\n\
             ON TABLE `{project}.{dataset}.{view_name}`\n\
             TO \"group:{reader_group}\";\n"
        )
    }
}

impl MaskingPolicyGenerator for BigQueryMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::BigQuery
    }

    fn roles(&self) -> &AccessRoles {
        &self.roles
    }

    fn generate_mask_expression(
        &self,
        column: &str,
        data_type: &str,
        strategy: MaskingStrategy,
        params: &MaskingParams,
    ) -> String {
        let digest = format!("TO_HEX(SHA256(CAST({column} AS STRING)))");
        match strategy {
            MaskingStrategy::Redact => {
                if matches!(data_type, "INT64" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC") {
                    "NULL".to_string()
                } else {
                    quote_literal(param_str(params, "replacement", DEFAULT_REDACTION))
                }
            }
            MaskingStrategy::Hash => match param_u64(params, "truncate", 0) {
                0 => digest,
                n => format!("SUBSTR({digest}, 1, {n})"),
            },
            MaskingStrategy::Partial => {
                let show_last = param_u64(params, "show_last", 4);
                format!(
                    "CONCAT(REPEAT({}, GREATEST(LENGTH({column}) - {show_last}, 0)), \
                     RIGHT({column}, {show_last}))",
                    quote_literal(param_str(params, "mask_char", "X"))
                )
            }
            MaskingStrategy::Generalize => {
                if data_type == "DATE" || data_type.starts_with("TIMESTAMP") {
                    return format!("DATE_TRUNC({column}, {})", date_precision(params));
                }
                if param_bool(params, "keep_state") {
                    return format!(r"REGEXP_REPLACE({column}, r'.*,\s*', '')");
                }
                match param_u64(params, "mask_octets", 0) {
                    n @ 1..=3 => format!(
                        r"REGEXP_REPLACE({column}, r'(\.[0-9]+){{{n}}}$', '{}')",
                        ".XXX".repeat(n as usize)
                    ),
                    _ => quote_literal(DEFAULT_REDACTION),
                }
            }
            MaskingStrategy::Tokenize => format!("CONCAT('TKN_', SUBSTR({digest}, 1, 16))"),
            MaskingStrategy::Suppress => "NULL".to_string(),
            MaskingStrategy::None => column.to_string(),
        }
    }

    fn generate_sql(&self, policy: &MaskingPolicy) -> GeneratedSql {
        let project = policy.database_name.as_deref().unwrap_or(DEFAULT_PROJECT);
        let dataset = policy.schema_name.as_deref().unwrap_or(DEFAULT_DATASET);
        let table = &policy.table_name;
        let taxonomy = format!("phi_taxonomy_{table}");

        let mut sql = GeneratedSql {
            comments: vec![
                format!("Project: {project}"),
                format!("Dataset: {dataset}"),
                format!("Table: {table}"),
                "Platform: Google BigQuery".to_string(),
            ],
            ..GeneratedSql::default()
        };

        sql.create_statements.push(format!(
            "-- Create policy taxonomy for PHI data\n\
             -- Run with: bq mk --taxonomy --location={} \\\n\
             --   --description=\"PHI masking taxonomy for {table}\" \\\n\
             --   {taxonomy}",
            self.location
        ));

        for rule in &policy.rules {
            let column = &rule.column_name;
            let tag = format!("mask_{column}").to_lowercase();
            let masked_rule = format!("{project}.{dataset}.mask_{column}");
            let partial_rule = format!("{project}.{dataset}.mask_{column}_partial");

            sql.create_statements.push(format!(
                "-- Create policy tag for {column}\n\
                 -- Run with: bq mk --policy_tag --taxonomy={taxonomy} \\\n\
                 --   --description=\"Masking policy for {column}\" \\\n\
                 --   {tag}"
            ));
            let masked =
                self.generate_mask_expression(column, VALUE_TYPE, rule.strategy, &rule.params);
            sql.create_statements
                .push(self.create_masking_rule(&masked_rule, rule, &masked));
            let partial = self.partial_tier_expression(column, VALUE_TYPE);
            sql.create_statements
                .push(self.create_masking_rule(&partial_rule, rule, &partial));

            sql.apply_statements.push(format!(
                "ALTER TABLE `{project}.{dataset}.{table}`\n\
                 ALTER COLUMN {column}\n\
                 SET OPTIONS (policy_tags = ['{}']);",
                self.policy_tag_path(project, &taxonomy, &tag)
            ));
            sql.drop_statements.push(format!(
                "DROP MASKING RULE IF EXISTS `{masked_rule}`;\n\
                 DROP MASKING RULE IF EXISTS `{partial_rule}`;"
            ));

            for role in &rule.full_access_roles {
                sql.grant_statements.push(format!(
                    "-- GRANT Fine-Grained Reader on policy tag {tag} to {role}"
                ));
            }
            for role in &rule.partial_access_roles {
                sql.grant_statements.push(format!(
                    "-- GRANT Masked Reader on masking rule {partial_rule} to {role}"
                ));
            }
            for role in &rule.no_access_roles {
                sql.grant_statements.push(format!(
                    "-- GRANT Masked Reader on masking rule {masked_rule} to {role}"
                ));
            }
        }

        sql
    }
}
