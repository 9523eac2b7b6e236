//! Amazon Redshift Dynamic Data Masking

use super::{
    date_precision, param_bool, param_str, param_u64, quote_list, quote_literal, AccessRoles,
    GeneratedSql, MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator, MaskingRule,
    DEFAULT_REDACTION,
};
use crate::domain::{MaskingParams, MaskingStrategy};

const VALUE_TYPE: &str = "VARCHAR";
const DEFAULT_SCHEMA: &str = "public";

#[derive(Debug, Clone)]
pub struct RedshiftMaskingGenerator {
    roles: AccessRoles,
}

impl Default for RedshiftMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::Redshift.default_roles())
    }
}

fn membership(roles: &[String]) -> String {
    if roles.is_empty() {
        "FALSE".to_string()
    } else {
        format!("current_user_is_member({})", quote_list(roles))
    }
}

impl RedshiftMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self { roles }
    }

    fn create_policy(&self, policy_name: &str, rule: &MaskingRule) -> String {
        let masked = self.generate_mask_expression("val", VALUE_TYPE, rule.strategy, &rule.params);
        let partial = self.partial_tier_expression("val", VALUE_TYPE);

        format!(
            "CREATE MASKING POLICY {policy_name}\n\
             WITH (val {VALUE_TYPE})\n\
             USING (\n  \
             CASE\n    \
             WHEN {full} THEN val\n    \
             WHEN {partial_roles} THEN {partial}\n    \
             ELSE {masked}\n  \
             END\n\
             );",
            full = membership(&rule.full_access_roles),
            partial_roles = membership(&rule.partial_access_roles),
        )
    }

    /// Row-level security policy limiting rows to the current user
    pub fn generate_row_level_security(
        &self,
        table_name: &str,
        policy_name: &str,
        filter_column: &str,
        schema_name: Option<&str>,
    ) -> String {
        let schema = schema_name.unwrap_or(DEFAULT_SCHEMA);
        format!(
            "-- Create RLS policy\n\
             CREATE RLS POLICY {policy_name}\n\
             WITH ({filter_column} VARCHAR(256))\n\
             USING (\n  \
             {full}\n  \
             OR {filter_column} = current_user_name()\n\
             );\n\n\
             -- Attach RLS policy\n\
             ALTER TABLE {schema}.{table_name} ROW LEVEL SECURITY ON;\n\
             ATTACH RLS POLICY {policy_name} ON {schema}.{table_name} TO PUBLIC;\n",
            full = membership(&self.roles.full_access),
        )
    }
}

impl MaskingPolicyGenerator for RedshiftMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::Redshift
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
        let upper = data_type.to_uppercase();
        match strategy {
            MaskingStrategy::Redact => {
                let numeric = ["INTEGER", "BIGINT", "SMALLINT", "DECIMAL", "FLOAT", "REAL"];
                if numeric.contains(&upper.as_str()) {
                    "NULL".to_string()
                } else {
                    quote_literal(param_str(params, "replacement", DEFAULT_REDACTION))
                }
            }
            MaskingStrategy::Hash => match param_u64(params, "truncate", 0) {
                0 => format!("MD5({column}::VARCHAR)"),
                n => format!("LEFT(MD5({column}::VARCHAR), {n})"),
            },
            MaskingStrategy::Partial => {
                let show_last = param_u64(params, "show_last", 4);
                format!(
                    "REPEAT({}, GREATEST(LEN({column}) - {show_last}, 0)) \
                     || RIGHT({column}, {show_last})",
                    quote_literal(param_str(params, "mask_char", "X"))
                )
            }
            MaskingStrategy::Generalize => {
                if upper == "DATE" || upper.contains("TIMESTAMP") {
                    let unit = date_precision(params).to_lowercase();
                    return format!("DATE_TRUNC('{unit}', {column})");
                }
                if param_bool(params, "keep_state") {
                    return format!("REGEXP_REPLACE({column}, '.*,[[:space:]]*', '')");
                }
                match param_u64(params, "mask_octets", 0) {
                    n @ 1..=3 => format!(
                        "REGEXP_REPLACE({column}, '([.][0-9]+){{{n}}}$', '{}')",
                        ".XXX".repeat(n as usize)
                    ),
                    _ => quote_literal(DEFAULT_REDACTION),
                }
            }
            MaskingStrategy::Tokenize => format!("'TKN_' || LEFT(MD5({column}::VARCHAR), 16)"),
            MaskingStrategy::Suppress => "NULL".to_string(),
            MaskingStrategy::None => column.to_string(),
        }
    }

    fn generate_sql(&self, policy: &MaskingPolicy) -> GeneratedSql {
        let schema = policy.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let table = &policy.table_name;
        let mut sql = GeneratedSql {
            comments: vec![
                format!("Schema: {schema}"),
                format!("Table: {table}"),
                format!("Columns with masking: {}", policy.rules.len()),
                "Platform: Amazon Redshift".to_string(),
            ],
            ..GeneratedSql::default()
        };

        for rule in &policy.rules {
            let column = &rule.column_name;
            let policy_name = format!("mask_{table}_{column}").to_lowercase();
            sql.create_statements.push(self.create_policy(&policy_name, rule));
            sql.apply_statements.push(format!(
                "ATTACH MASKING POLICY {policy_name} ON {schema}.{table}({column}) TO PUBLIC;"
            ));
            sql.drop_statements.push(format!(
                "DETACH MASKING POLICY {policy_name} ON {schema}.{table}({column}) FROM PUBLIC;\n\
                 DROP MASKING POLICY IF EXISTS {policy_name};"
            ));
        }

        let mut roles: Vec<&String> = Vec::new();
        for role in self.roles.full_access.iter().chain(&self.roles.partial_access) {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        if !roles.is_empty() {
            let names = roles
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            sql.grant_statements.push("-- Create roles for PHI access".to_string());
            sql.grant_statements
                .extend(roles.iter().map(|r| format!("CREATE ROLE {r};")));
            sql.grant_statements.push(format!("GRANT USAGE ON SCHEMA {schema} TO {names};"));
            sql.grant_statements
                .push(format!("GRANT SELECT ON {schema}.{table} TO {names};"));
        }

        sql
    }
}
