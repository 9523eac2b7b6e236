//! Databricks Unity Catalog column masks
//!
//! Each rule becomes a SQL UDF branching on `is_member()`, attached with
//! `ALTER TABLE ... ALTER COLUMN ... SET MASK`. The policy's database name is
//! used as the Unity Catalog catalog.

use super::{
    date_precision, param_bool, param_str, param_u64, qualified, quote_list, quote_literal,
    AccessRoles, GeneratedSql, MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator,
    MaskingRule, DEFAULT_REDACTION,
};
use crate::domain::{MaskingParams, MaskingStrategy};

const VALUE_TYPE: &str = "STRING";

#[derive(Debug, Clone)]
pub struct DatabricksMaskingGenerator {
    roles: AccessRoles,
}

impl Default for DatabricksMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::Databricks.default_roles())
    }
}

fn member_checks(roles: &[String]) -> String {
    if roles.is_empty() {
        return "FALSE".to_string();
    }
    roles
        .iter()
        .map(|r| format!("is_member({})", quote_literal(r)))
        .collect::<Vec<_>>()
        .join(" OR ")
}

impl DatabricksMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self { roles }
    }

    fn function_name(policy: &MaskingPolicy, column: &str) -> String {
        let name = format!("mask_{}_{column}", policy.table_name).to_lowercase();
        qualified(&[
            policy.database_name.as_deref(),
            policy.schema_name.as_deref(),
            Some(&name),
        ])
    }

    fn create_function(&self, function: &str, rule: &MaskingRule) -> String {
        let column = &rule.column_name;
        let masked =
            self.generate_mask_expression(column, VALUE_TYPE, rule.strategy, &rule.params);
        let partial = self.partial_tier_expression(column, VALUE_TYPE);

        format!(
            "CREATE OR REPLACE FUNCTION {function}({column} {VALUE_TYPE})\n\
             RETURNS {VALUE_TYPE}\n\
             RETURN CASE\n  \
             WHEN {full} THEN {column}\n  \
             WHEN {partial_roles} THEN {partial}\n  \
             ELSE {masked}\n\
             END;",
            full = member_checks(&rule.full_access_roles),
            partial_roles = member_checks(&rule.partial_access_roles),
        )
    }

    /// Row filter letting `phi_admin` see every row and others only `allowed_values`
    pub fn generate_row_filter(
        &self,
        table_name: &str,
        filter_column: &str,
        allowed_values: &[String],
        schema_name: Option<&str>,
        catalog_name: Option<&str>,
    ) -> String {
        let table = qualified(&[catalog_name, schema_name, Some(table_name)]);
        let filter_name = format!("filter_{table_name}_{filter_column}").to_lowercase();
        let filter = qualified(&[catalog_name, schema_name, Some(&filter_name)]);
        let admins = self
            .roles
            .full_access
            .first()
            .map_or_else(|| "phi_admin".to_string(), |r| r.clone());

        format!(
            "-- Row-level security filter\n\
             CREATE OR REPLACE FUNCTION {filter}({filter_column} STRING)\n\
             RETURNS BOOLEAN\n\
             RETURN\n  \
             is_member({admins})\n  \
             OR {filter_column} IN ({values});\n\n\
             ALTER TABLE {table} SET ROW FILTER {filter} ON ({filter_column});\n",
            admins = quote_literal(&admins),
            values = quote_list(allowed_values),
        )
    }

    /// Audit table and 30-day summary view for PHI access
    pub fn generate_audit_log_table(
        &self,
        schema_name: &str,
        catalog_name: Option<&str>,
    ) -> String {
        let prefix = qualified(&[catalog_name, Some(schema_name)]);
        format!(
            "-- PHI Access Audit Log\n\
             CREATE TABLE IF NOT EXISTS {prefix}.phi_access_audit (\n    \
             audit_id STRING DEFAULT UUID(),\n    \
             table_name STRING,\n    \
             column_name STRING,\n    \
             access_user STRING DEFAULT CURRENT_USER(),\n    \
             access_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP(),\n    \
             access_type STRING,\n    \
             row_count BIGINT,\n    \
             query_id STRING\n\
             );\n\n\
             -- Create view for recent PHI access\n\
             CREATE OR REPLACE VIEW {prefix}.phi_access_summary AS\n\
             SELECT\n    table_name,\n    column_name,\n    access_user,\n    access_type,\n    \
             COUNT(*) as access_count,\n    MAX(access_time) as last_access\n\
             FROM {prefix}.phi_access_audit\n\
             WHERE access_time > CURRENT_TIMESTAMP() - INTERVAL 30 DAYS\n\
             GROUP BY table_name, column_name, access_user, access_type\n\
             ORDER BY last_access DESC;\n"
        )
    }
}

impl MaskingPolicyGenerator for DatabricksMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::Databricks
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
        match strategy {
            MaskingStrategy::Redact => {
                if matches!(data_type, "BIGINT" | "INT" | "DOUBLE" | "FLOAT") {
                    "NULL".to_string()
                } else {
                    quote_literal(param_str(params, "replacement", DEFAULT_REDACTION))
                }
            }
            MaskingStrategy::Hash => match param_u64(params, "truncate", 0) {
                0 => format!("SHA2({column}, 256)"),
                n => format!("LEFT(SHA2({column}, 256), {n})"),
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
                if matches!(data_type, "DATE" | "TIMESTAMP") {
                    return format!("DATE_TRUNC('{}', {column})", date_precision(params));
                }
                if param_bool(params, "keep_state") {
                    return format!(r"REGEXP_REPLACE({column}, '.*,\\s*', '')");
                }
                match param_u64(params, "mask_octets", 0) {
                    n @ 1..=3 => format!(
                        r"REGEXP_REPLACE({column}, '(\\.[0-9]+){{{n}}}$', '{}')",
                        ".XXX".repeat(n as usize)
                    ),
                    _ => quote_literal(DEFAULT_REDACTION),
                }
            }
            MaskingStrategy::Tokenize => format!("CONCAT('TKN_', LEFT(SHA2({column}, 256), 16))"),
            MaskingStrategy::Suppress => "NULL".to_string(),
            MaskingStrategy::None => column.to_string(),
        }
    }

    fn generate_sql(&self, policy: &MaskingPolicy) -> GeneratedSql {
        let table = policy.qualified_table();
        let mut sql = GeneratedSql {
            comments: vec![
                format!("Table: {table}"),
                format!("Columns with masking: {}", policy.rules.len()),
                "Platform: Databricks Unity Catalog".to_string(),
            ],
            ..GeneratedSql::default()
        };

        for rule in &policy.rules {
            let function = Self::function_name(policy, &rule.column_name);
            sql.create_statements.push(self.create_function(&function, rule));
            sql.apply_statements.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {} SET MASK {function};",
                rule.column_name
            ));
            sql.drop_statements
                .push(format!("DROP FUNCTION IF EXISTS {function};"));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(rules: Vec<MaskingRule>) -> MaskingPolicy {
        MaskingPolicy {
            table_name: "Patients".to_string(),
            schema_name: Some("clinical".to_string()),
            database_name: Some("main".to_string()),
            rules,
            description: String::new(),
        }
    }

    fn rule(column: &str, strategy: MaskingStrategy) -> MaskingRule {
        let roles = MaskingPlatform::Databricks.default_roles();
        MaskingRule {
            column_name: column.to_string(),
            strategy,
            params: MaskingParams::new(),
            full_access_roles: roles.full_access,
            partial_access_roles: roles.partial_access,
            no_access_roles: roles.no_access,
        }
    }

    #[test]
    fn test_generate_sql_uses_qualified_function() {
        let generator = DatabricksMaskingGenerator::default();
        let sql = generator.generate_sql(&policy(vec![rule("email", MaskingStrategy::Hash)]));

        let create = &sql.create_statements[0];
        assert!(create.starts_with(
            "CREATE OR REPLACE FUNCTION main.clinical.mask_patients_email(email STRING)"
        ));
        assert!(create.contains("WHEN is_member('phi_admin') OR is_member('clinical_admin') THEN email"));
        assert!(create.contains("WHEN is_member('analyst') OR is_member('data_scientist') THEN CONCAT("));
        assert!(create.contains("ELSE SHA2(email, 256)"));
        assert_eq!(
            sql.apply_statements[0],
            "ALTER TABLE main.clinical.Patients ALTER COLUMN email SET MASK main.clinical.mask_patients_email;"
        );
        assert_eq!(
            sql.drop_statements[0],
            "DROP FUNCTION IF EXISTS main.clinical.mask_patients_email;"
        );
        assert_eq!(sql.comments[2], "Platform: Databricks Unity Catalog");
    }

    #[test]
    fn test_empty_role_tier_never_matches() {
        let generator = DatabricksMaskingGenerator::default();
        let mut r = rule("dob", MaskingStrategy::Suppress);
        r.partial_access_roles.clear();
        let sql = generator.generate_sql(&policy(vec![r]));
        assert!(sql.create_statements[0].contains("WHEN FALSE THEN"));
    }

    #[test]
    fn test_row_filter_and_audit_table() {
        let generator = DatabricksMaskingGenerator::default();
        let filter = generator.generate_row_filter(
            "patients",
            "facility",
            &["north".to_string(), "south".to_string()],
            Some("clinical"),
            None,
        );
        assert!(filter.contains("CREATE OR REPLACE FUNCTION clinical.filter_patients_facility"));
        assert!(filter.contains("OR facility IN ('north', 'south')"));
        assert!(filter.contains("is_member('phi_admin')"));

        let audit = generator.generate_audit_log_table("audit", Some("main"));
        assert!(audit.contains("CREATE TABLE IF NOT EXISTS main.audit.phi_access_audit"));
    }
}
