//! Microsoft Fabric warehouse masking
//!
//! The SQL endpoint takes T-SQL Dynamic Data Masking. Workspace roles and
//! sensitivity labels live outside SQL, so [`FabricMaskingGenerator`] also
//! renders them as setup notes.

use super::tsql;
use super::{AccessRoles, GeneratedSql, MaskingPlatform, MaskingPolicy, MaskingPolicyGenerator};
use crate::domain::{MaskingParams, MaskingStrategy};

const DEFAULT_LAKEHOUSE: &str = "healthcare_lakehouse";
const DEFAULT_SCHEMA: &str = "dbo";
const HASH_MASK: &str = "HASH_XXXXXXXXXXXXXX";

#[derive(Debug, Clone)]
pub struct FabricMaskingGenerator {
    roles: AccessRoles,
}

impl Default for FabricMaskingGenerator {
    fn default() -> Self {
        Self::new(MaskingPlatform::Fabric.default_roles())
    }
}

impl FabricMaskingGenerator {
    pub fn new(roles: AccessRoles) -> Self {
        Self { roles }
    }

    /// OneLake data access setup for a table, as Markdown
    pub fn generate_onelake_security(
        &self,
        workspace_name: &str,
        lakehouse_name: &str,
        table_name: &str,
    ) -> String {
        let mut workspace_roles = String::new();
        for role in &self.roles.full_access {
            workspace_roles.push_str(&format!("   - {role}: Admin/Member role\n"));
        }
        for role in &self.roles.partial_access {
            workspace_roles.push_str(&format!("   - {role}: Contributor/Viewer role\n"));
        }
        let admin = self.roles.full_access.first().map_or("PHI_Admins", |r| r.as_str());

        format!(
            "# OneLake Security Configuration for {table_name}\n\n\
             ## Workspace: {workspace_name}\n\
             ## Lakehouse: {lakehouse_name}\n\n\
             ### Step 1: Configure Workspace Roles\n\
             1. Navigate to Workspace Settings > Manage Access\n\
             2. Add Entra ID groups:\n\
             {workspace_roles}\n\
             ### Step 2: Enable Sensitivity Labels\n\
             1. Open Fabric Admin Portal\n\
             2. Navigate to Tenant Settings > Information Protection\n\
             3. Enable \"Allow sensitivity labels for content\"\n\
             4. Configure auto-labeling for PHI patterns\n\n\
             ### Step 3: Configure OneLake Data Access\n\
             1. In Lakehouse settings, enable \"OneLake data access roles\"\n\
             2. Create custom roles:\n\n\
             ```json\n\
             {{\n  \"roleName\": \"PHI_Full_Access\",\n  \"permissions\": [\"read\", \"write\"],\n  \
             \"tablePermissions\": {{\n    \"{table_name}\": [\"*\"]\n  }}\n}}\n\
             ```\n\n\
             ### Step 4: Apply Row-Level Security (Optional)\n\
             ```sql\n\
             CREATE FUNCTION dbo.fn_rls_{table_name}(@UserPrincipal NVARCHAR(256))\n\
             RETURNS TABLE\n\
             AS\n\
             RETURN\n  \
             SELECT 1 AS access\n  \
             WHERE IS_MEMBER('{admin}') = 1\n     \
             OR @UserPrincipal = SUSER_SNAME();\n\
             ```\n\n\
             ### Step 5: Monitor Access\n\
             - Enable Fabric audit logs\n\
             - Configure alerts for PHI access patterns\n\
             - Review access reports in Purview\n"
        )
    }

    /// Microsoft Purview classification notes for PHI columns, as Markdown
    pub fn generate_purview_classification(&self, table_name: &str, columns: &[String]) -> String {
        let column_list = columns
            .iter()
            .map(|c| format!("    - {c}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "# Microsoft Purview Classification Rules\n\n\
             ## Asset: {table_name}\n\n\
             ### Sensitive Information Types to Detect:\n\
             - U.S. Social Security Number (SSN)\n\
             - U.S. Individual Taxpayer Identification Number (ITIN)\n\
             - All Medical Terms (custom)\n\
             - Protected Health Information (PHI)\n\n\
             ### Columns Requiring Classification:\n\
             {column_list}\n\n\
             ### Auto-labeling Policy:\n\
             ```yaml\n\
             name: PHI_Auto_Label_{table_name}\n\
             scope:\n  - Microsoft Fabric\n\
             conditions:\n  - contentContains:\n      - sensitiveInfoTypes:\n          \
             - \"U.S. Social Security Number\"\n          - \"All Medical Terms\"\n\
             actions:\n  - applyLabel: \"Highly Confidential/PHI\"\n\
             ```\n"
        )
    }
}

impl MaskingPolicyGenerator for FabricMaskingGenerator {
    fn platform(&self) -> MaskingPlatform {
        MaskingPlatform::Fabric
    }

    fn roles(&self) -> &AccessRoles {
        &self.roles
    }

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
        let lakehouse = policy.database_name.as_deref().unwrap_or(DEFAULT_LAKEHOUSE);
        let schema = policy.schema_name.as_deref().unwrap_or(DEFAULT_SCHEMA);
        let table = &policy.table_name;
        let mut sql = GeneratedSql {
            comments: vec![
                format!("Lakehouse: {lakehouse}"),
                format!("Schema: {schema}"),
                format!("Table: {table}"),
                format!("Columns with masking: {}", policy.rules.len()),
                "Platform: Microsoft Fabric".to_string(),
                "Sensitivity labels (PHI, Confidential, Internal) are configured in the \
                 Microsoft Purview compliance portal"
                    .to_string(),
                format!(
                    "Workspace roles: {} as Admins/Members, {} as Contributors/Viewers",
                    self.roles.full_access.join(", "),
                    self.roles.partial_access.join(", ")
                ),
            ],
            ..GeneratedSql::default()
        };
        if tsql::has_generalized(&policy.rules) {
            sql.comments.push(tsql::GENERALIZE_NOTE.to_string());
        }

        for rule in &policy.rules {
            let function = self.generate_mask_expression(
                &rule.column_name,
                "VARCHAR",
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
            sql.grant_statements.push("-- SQL Endpoint Permissions".to_string());
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

    #[test]
    fn test_generate_sql() {
        let generator = FabricMaskingGenerator::default();
        let roles = generator.roles().clone();
        let policy = MaskingPolicy {
            table_name: "patients".to_string(),
            schema_name: None,
            database_name: None,
            rules: vec![MaskingRule {
                column_name: "email".to_string(),
                strategy: MaskingStrategy::Hash,
                params: MaskingParams::new(),
                full_access_roles: roles.full_access,
                partial_access_roles: roles.partial_access,
                no_access_roles: roles.no_access,
            }],
            description: String::new(),
        };
        let sql = generator.generate_sql(&policy);

        assert_eq!(sql.comments[0], "Lakehouse: healthcare_lakehouse");
        assert!(sql.apply_statements[0].contains("'partial(0, \"HASH_XXXXXXXXXXXXXX\", 0)'"));
        assert!(sql.grant_statements.contains(&"GRANT UNMASK TO [PHI_Admins];".to_string()));
        assert!(sql
            .grant_statements
            .contains(&"GRANT SELECT ON [dbo].[patients_partial_access] TO [Analysts];".to_string()));
    }

    #[test]
    fn test_onelake_and_purview_notes() {
        let generator = FabricMaskingGenerator::default();
        let onelake = generator.generate_onelake_security("clinical", "ehr_lake", "patients");
        assert!(onelake.contains("## Lakehouse: ehr_lake"));
        assert!(onelake.contains("   - Analysts: Contributor/Viewer role"));
        assert!(onelake.contains("\"patients\": [\"*\"]"));

        let purview =
            generator.generate_purview_classification("patients", &["ssn".to_string()]);
        assert!(purview.contains("    - ssn"));
        assert!(purview.contains("name: PHI_Auto_Label_patients"));
    }
}
