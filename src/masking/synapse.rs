//! Azure Synapse Analytics Dynamic Data Masking

use super::tsql;
use super::{
    AccessRoles, GeneratedSql, MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator,
};
use crate::domain::{MaskingParams, MaskingStrategy};

const DEFAULT_SCHEMA: &str = "dbo";
const HASH_MASK: &str = "XXXXXXXXXXXXXXXX";

#[derive(Debug, Clone)]
pub struct SynapseMaskingGenerator {
    roles: AccessRoles,
}

impl Default for SynapseMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::Synapse.default_roles())
    }
}

impl SynapseMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self { roles }
    }

    /// Row-level security predicate and policy filtering on the current user
    pub fn generate_security_policy(
        &self,
        table_name: &str,
        filter_column: &str,
        schema_name: Option<&str>,
    ) -> String {
        let schema = schema_name.unwrap_or(DEFAULT_SCHEMA);
        let admin = self
            .roles
            .full_access
            .iter()
            .map(|r| format!("IS_MEMBER('{}') = 1", r.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join("\n    OR ");
        let admin = if admin.is_empty() { "1 = 0".to_string() } else { admin };
        let predicate = format!("fn_securitypredicate_{table_name}");

        format!(
            "-- Create security predicate function\n\
             CREATE FUNCTION [{schema}].[{predicate}](@{filter_column} AS NVARCHAR(256))\n\
             RETURNS TABLE\n\
             WITH SCHEMABINDING\n\
             AS\n\
             RETURN SELECT 1 AS result\n\
             WHERE\n    \
             {admin}\n    \
             OR @{filter_column} = USER_NAME();\n\
             GO\n\n\
             -- Create security policy\n\
             CREATE SECURITY POLICY [{schema}].[SecurityPolicy_{table_name}]\n\
             ADD FILTER PREDICATE [{schema}].[{predicate}]([{filter_column}])\n\
             ON [{schema}].[{table_name}]\n\
             WITH (STATE = ON);\n\
             GO\n"
        )
    }
}

impl MaskingPolicyGenerator for SynapseMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::Synapse
    }

    fn roles(&self) -> &AccessRoles {
        &self.roles
    }

    /// DDM function (`default()` or `partial(...)`) for the strategy
    fn generate_mask_expression(
        &self,
        _column: &str,
        data_type: &str,
        strategy: MaskingStrategy,
        params: &MaskingParams,
    ) -> String {
        tsql::ddm_function(strategy, data_type, params, HASH_MASK)
    }

    fn generate_sql(&self, policy: &MaskingPolicy) -> GeneratedSql {
        let schema = policy.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let table = &policy.table_name;
        let mut sql = GeneratedSql {
            comments: vec![
                format!("Schema: {schema}"),
                format!("Table: {table}"),
                format!("Columns with masking: {}", policy.rules.len()),
                "Platform: Azure Synapse Analytics".to_string(),
            ],
            ..GeneratedSql::default()
        };
        if tsql::has_generalized(&policy.rules) {
            sql.comments.push(tsql::GENERALIZE_NOTE.to_string());
        }

        for role in self.roles.full_access.iter().chain(&self.roles.partial_access) {
            sql.create_statements.push(tsql::ensure_role(role));
        }

        for rule in &policy.rules {
            let function = self.generate_mask_expression(
                &rule.column_name,
                "NVARCHAR",
                rule.strategy,
                &rule.params,
            );
            sql.apply_statements
                .push(tsql::add_mask(schema, table, &rule.column_name, &function));
            sql.drop_statements
                .push(tsql::drop_mask(schema, table, &rule.column_name));
        }

        if !policy.rules.is_empty() {
            sql.create_statements
                .push(tsql::partial_view(schema, table, &policy.rules));
            sql.grant_statements
                .extend(tsql::tier_grants(schema, table, &self.roles));
        }

        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::MaskingRule;

    fn policy() -> MaskingPolicy {
        let roles = MaskingPlatform::Synapse.default_roles();
        let rule = |column: &str, strategy| MaskingRule {
            column_name: column.to_string(),
            strategy,
            params: MaskingParams::new(),
            full_access_roles: roles.full_access.clone(),
            partial_access_roles: roles.partial_access.clone(),
            no_access_roles: roles.no_access.clone(),
        };
        MaskingPolicy {
            table_name: "patients".to_string(),
            schema_name: None,
            database_name: None,
            rules: vec![
                rule("ssn", MaskingStrategy::Partial),
                rule("email", MaskingStrategy::Generalize),
            ],
            description: String::new(),
        }
    }

    #[test]
    fn test_generate_sql() {
        let sql = SynapseMaskingGenerator::default().generate_sql(&policy());

        assert_eq!(
            sql.apply_statements[0],
            "ALTER TABLE [dbo].[patients] ALTER COLUMN [ssn] ADD MASKED WITH (FUNCTION = 'partial(0, \"XXXX\", 4)');"
        );
        assert_eq!(
            sql.apply_statements[1],
            "ALTER TABLE [dbo].[patients] ALTER COLUMN [email] ADD MASKED WITH (FUNCTION = 'default()');"
        );
        assert_eq!(sql.comments.last().unwrap(), tsql::GENERALIZE_NOTE);
        assert_eq!(
            sql.drop_statements[1],
            "ALTER TABLE [dbo].[patients] ALTER COLUMN [email] DROP MASKED;"
        );
        assert!(sql.create_statements[0].contains("CREATE ROLE [db_owner];"));
        assert!(sql
            .create_statements
            .last()
            .unwrap()
            .starts_with("CREATE OR ALTER VIEW [dbo].[patients_partial_access] AS"));
        assert!(sql.grant_statements.contains(&"GRANT UNMASK TO [phi_admin];".to_string()));
        assert!(sql
            .grant_statements
            .contains(&"DENY SELECT ON [dbo].[patients] TO [analyst];".to_string()));
    }

    #[test]
    fn test_security_policy() {
        let rls = SynapseMaskingGenerator::default().generate_security_policy(
            "encounters",
            "provider",
            Some("clinical"),
        );
        assert!(rls.contains("CREATE SECURITY POLICY [clinical].[SecurityPolicy_encounters]"));
        assert!(rls.contains("IS_MEMBER('db_owner') = 1\n    OR IS_MEMBER('phi_admin') = 1"));
        assert!(rls.contains("OR @provider = USER_NAME();"));
    }
}
