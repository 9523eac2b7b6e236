//! Snowflake Dynamic Data Masking
//!
//! Each rule becomes a schema-level `MASKING POLICY` whose body branches on
//! `CURRENT_ROLE()`, bound to its column with `ALTER TABLE ... SET MASKING POLICY`.

use super::{
    date_precision, param_bool, param_str, param_u64, quote_list, quote_literal, AccessRoles,
    GeneratedSql, MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator, MaskingRule,
    DEFAULT_REDACTION,
};
use crate::domain::{MaskingParams, MaskingStrategy};

/// Type masked values are declared with
const VALUE_TYPE: &str = "VARCHAR";

#[derive(Debug, Clone)]
pub struct SnowflakeMaskingGenerator {
    roles: AccessRoles,
}

impl Default for SnowflakeMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::Snowflake.default_roles())
    }
}

impl SnowflakeMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self { roles }
    }

    fn policy_name(table: &str, column: &str) -> String {
        format!("mask_{table}_{column}").to_uppercase()
    }

    fn create_policy(&self, policy_name: &str, rule: &MaskingRule) -> String {
        let masked = self.generate_mask_expression("val", VALUE_TYPE, rule.strategy, &rule.params);
        let partial = self.partial_tier_expression("val", VALUE_TYPE);

        format!(
            "CREATE OR REPLACE MASKING POLICY {policy_name}\n\
             AS (val {VALUE_TYPE})\n\
             RETURNS {VALUE_TYPE} ->\n  \
             CASE\n    \
             WHEN CURRENT_ROLE() IN ({full}) THEN val\n    \
             WHEN CURRENT_ROLE() IN ({partial_roles}) THEN {partial}\n    \
             ELSE {masked}\n  \
             END;",
            full = quote_list(&rule.full_access_roles),
            partial_roles = quote_list(&rule.partial_access_roles),
        )
    }

    /// View over account query history for PHI access review
    pub fn generate_audit_view(&self, table_name: &str, schema_name: Option<&str>) -> String {
        format!(
            "-- Enable access history for PHI audit\n\
             ALTER ACCOUNT SET ENABLE_ACCOUNT_USAGE_FOR_PRIVACY_INFORMATION = TRUE;\n\n\
             -- Create view for PHI access audit\n\
             CREATE OR REPLACE VIEW {schema}.phi_access_log AS\n\
             SELECT\n    query_id,\n    user_name,\n    role_name,\n    query_text,\n    \
             start_time,\n    end_time\n\
             FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY\n\
             WHERE CONTAINS(query_text, {table})\n  \
             AND start_time > DATEADD(day, -90, CURRENT_TIMESTAMP())\n\
             ORDER BY start_time DESC;\n",
            schema = schema_name.unwrap_or("PUBLIC"),
            table = quote_literal(table_name),
        )
    }
}

impl MaskingPolicyGenerator for SnowflakeMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::Snowflake
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
                if matches!(data_type, "NUMBER" | "FLOAT") {
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
                let mask_char = param_str(params, "mask_char", "X");
                format!(
                    "CONCAT(REPEAT({}, GREATEST(LENGTH({column}) - {show_last}, 0)), \
                     RIGHT({column}, {show_last}))",
                    quote_literal(mask_char)
                )
            }
            MaskingStrategy::Generalize => {
                if data_type == "DATE" || data_type.starts_with("TIMESTAMP") {
                    format!("DATE_TRUNC('{}', {column})", date_precision(params))
                } else if param_bool(params, "keep_state") {
                    format!(r"REGEXP_REPLACE({column}, '.*,\\s*', '')")
                } else {
                    match param_u64(params, "mask_octets", 0) {
                        n @ 1..=3 => format!(
                            r"REGEXP_REPLACE({column}, '(\\.[0-9]+){{{n}}}$', '{}')",
                            ".XXX".repeat(n as usize)
                        ),
                        _ => quote_literal(DEFAULT_REDACTION),
                    }
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
            ],
            ..GeneratedSql::default()
        };

        for rule in &policy.rules {
            let policy_name = Self::policy_name(&policy.table_name, &rule.column_name);
            sql.create_statements.push(self.create_policy(&policy_name, rule));
            sql.apply_statements.push(format!(
                "ALTER TABLE {table} MODIFY COLUMN {} SET MASKING POLICY {policy_name};",
                rule.column_name
            ));
            sql.drop_statements
                .push(format!("DROP MASKING POLICY IF EXISTS {policy_name};"));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> MaskingParams {
        value.as_object().cloned().unwrap_or_default()
    }

    fn policy() -> MaskingPolicy {
        let roles = MaskingPlatform::Snowflake.default_roles();
        MaskingPolicy {
            table_name: "patients".to_string(),
            schema_name: Some("clinical".to_string()),
            database_name: Some("ehr".to_string()),
            rules: vec![MaskingRule {
                column_name: "ssn".to_string(),
                strategy: MaskingStrategy::Redact,
                params: MaskingParams::new(),
                full_access_roles: roles.full_access.clone(),
                partial_access_roles: roles.partial_access.clone(),
                no_access_roles: roles.no_access,
            }],
            description: String::new(),
        }
    }

    #[test]
    fn test_mask_expressions() {
        let generator = SnowflakeMaskingGenerator::default();
        let expr = |data_type: &str, strategy, p| {
            generator.generate_mask_expression("val", data_type, strategy, &params(p))
        };

        assert_eq!(expr("VARCHAR", MaskingStrategy::Redact, json!({})), "'***REDACTED***'");
        assert_eq!(expr("NUMBER", MaskingStrategy::Redact, json!({})), "NULL");
        assert_eq!(
            expr("VARCHAR", MaskingStrategy::Hash, json!({"truncate": 8})),
            "LEFT(SHA2(val, 256), 8)"
        );
        assert_eq!(
            expr("VARCHAR", MaskingStrategy::Partial, json!({"show_last": 4})),
            "CONCAT(REPEAT('X', GREATEST(LENGTH(val) - 4, 0)), RIGHT(val, 4))"
        );
        assert_eq!(
            expr("DATE", MaskingStrategy::Generalize, json!({"precision": "month"})),
            "DATE_TRUNC('MONTH', val)"
        );
        assert_eq!(
            expr("VARCHAR", MaskingStrategy::Generalize, json!({"mask_octets": 2})),
            r"REGEXP_REPLACE(val, '(\\.[0-9]+){2}$', '.XXX.XXX')"
        );
        assert_eq!(
            expr("VARCHAR", MaskingStrategy::Tokenize, json!({})),
            "CONCAT('TKN_', LEFT(SHA2(val, 256), 16))"
        );
    }

    #[test]
    fn test_generate_sql_three_tiers() {
        let sql = SnowflakeMaskingGenerator::default().generate_sql(&policy());

        assert_eq!(sql.comments[0], "Table: ehr.clinical.patients");
        let create = &sql.create_statements[0];
        assert!(create.starts_with("CREATE OR REPLACE MASKING POLICY MASK_PATIENTS_SSN"));
        assert!(create.contains("WHEN CURRENT_ROLE() IN ('PHI_ADMIN', 'CLINICAL_ADMIN') THEN val"));
        assert!(create.contains("WHEN CURRENT_ROLE() IN ('ANALYST', 'RESEARCHER') THEN CONCAT("));
        assert!(create.contains("ELSE '***REDACTED***'"));
        assert_eq!(
            sql.apply_statements[0],
            "ALTER TABLE ehr.clinical.patients MODIFY COLUMN ssn SET MASKING POLICY MASK_PATIENTS_SSN;"
        );
        assert_eq!(sql.drop_statements[0], "DROP MASKING POLICY IF EXISTS MASK_PATIENTS_SSN;");
    }

    #[test]
    fn test_audit_view() {
        let view = SnowflakeMaskingGenerator::default().generate_audit_view("patients", None);
        assert!(view.contains("CREATE OR REPLACE VIEW PUBLIC.phi_access_log"));
        assert!(view.contains("CONTAINS(query_text, 'patients')"));
    }
}
