//! T-SQL Dynamic Data Masking shared by Synapse and Fabric
//!
//! DDM supports a single mask per column, so the three tiers map to:
//!
//! - full access: `GRANT UNMASK` plus `SELECT` on the table
//! - partial access: `UNMASK` but no table `SELECT`; reads go through a
//!   `<table>_partial_access` view that renders each masked column with the
//!   partial expression, or the generalized value for generalized columns
//! - everyone else: the column's DDM function
//!
//! DDM has no generalization function. Generalized columns are fully masked
//! with `default()` and only the partial access view applies the
//! generalization parameters.

use super::{
    date_precision, param_bool, param_str, param_u64, AccessRoles, MaskingRule,
    DEFAULT_REDACTION, PARTIAL_TIER_SHOW_LAST,
};
use crate::domain::{MaskingParams, MaskingStrategy};

/// Comment added to scripts that fully mask generalized columns
pub(super) const GENERALIZE_NOTE: &str =
    "DDM cannot generalize values; generalized columns use default() and the partial access \
     view applies the generalization";

/// DDM function for a strategy
///
/// `hash_mask` is the fixed padding used where DDM has no hashing.
pub(super) fn ddm_function(
    strategy: MaskingStrategy,
    data_type: &str,
    params: &MaskingParams,
    hash_mask: &str,
) -> String {
    let text = is_text(data_type);
    match strategy {
        MaskingStrategy::Partial => {
            let show_first = param_u64(params, "show_first", 0);
            let show_last = param_u64(params, "show_last", 4);
            let padding = param_str(params, "mask_char", "X")
                .repeat(param_u64(params, "padding", 4) as usize);
            format!("partial({show_first}, \"{}\", {show_last})", ddm_padding(&padding))
        }
        MaskingStrategy::Hash => format!("partial(0, \"{}\", 0)", ddm_padding(hash_mask)),
        MaskingStrategy::Tokenize => "partial(0, \"TKN_XXXXXXXXXXXX\", 0)".to_string(),
        MaskingStrategy::Redact if text => format!(
            "partial(0, \"{}\", 0)",
            ddm_padding(param_str(params, "replacement", DEFAULT_REDACTION))
        ),
        // Closest DDM gets to NULL for character data
        MaskingStrategy::Suppress if text => "partial(0, \"\", 0)".to_string(),
        _ => "default()".to_string(),
    }
}

fn is_text(data_type: &str) -> bool {
    let upper = data_type.to_uppercase();
    upper.contains("CHAR") || upper.contains("TEXT") || upper == "STRING"
}

/// Padding string safe inside `FUNCTION = '...'`
fn ddm_padding(value: &str) -> String {
    value.replace('"', "").replace('\'', "''")
}

pub(super) fn has_generalized(rules: &[MaskingRule]) -> bool {
    rules
        .iter()
        .any(|r| matches!(r.strategy, MaskingStrategy::Generalize))
}

pub(super) fn table_name(schema: &str, table: &str) -> String {
    format!("[{schema}].[{table}]")
}

pub(super) fn partial_view_name(schema: &str, table: &str) -> String {
    format!("[{schema}].[{table}_partial_access]")
}

pub(super) fn add_mask(schema: &str, table: &str, column: &str, function: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN [{column}] ADD MASKED WITH (FUNCTION = '{function}');",
        table_name(schema, table)
    )
}

pub(super) fn drop_mask(schema: &str, table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN [{column}] DROP MASKED;",
        table_name(schema, table)
    )
}

/// Partial-access expression over a bracketed column
pub(super) fn partial_expression(column: &str) -> String {
    let n = PARTIAL_TIER_SHOW_LAST;
    format!(
        "REPLICATE('X', CASE WHEN LEN([{column}]) > {n} THEN LEN([{column}]) - {n} ELSE 0 END) \
         + RIGHT([{column}], {n})"
    )
}

/// Generalized value of a column for the partial tier
///
/// Falls back to [`partial_expression`] when no generalization parameter is set.
pub(super) fn generalized_expression(rule: &MaskingRule) -> String {
    let column = &rule.column_name;
    if param_bool(&rule.params, "keep_state") {
        return format!(
            "LTRIM(RIGHT([{column}], CHARINDEX(',', REVERSE([{column}]) + ',') - 1))"
        );
    }
    if let n @ 1..=3 = param_u64(&rule.params, "mask_octets", 0) {
        let kept = (n + 1..=4)
            .rev()
            .map(|part| format!("PARSENAME([{column}], {part})"))
            .collect::<Vec<_>>()
            .join(" + '.' + ");
        return format!("{kept} + '{}'", ".XXX".repeat(n as usize));
    }
    if rule.params.contains_key("precision") {
        return match date_precision(&rule.params) {
            "DAY" => format!("CAST([{column}] AS DATE)"),
            "MONTH" => format!("DATEFROMPARTS(YEAR([{column}]), MONTH([{column}]), 1)"),
            _ => format!("DATEFROMPARTS(YEAR([{column}]), 1, 1)"),
        };
    }
    partial_expression(column)
}

/// View serving the partial tier
pub(super) fn partial_view(schema: &str, table: &str, rules: &[MaskingRule]) -> String {
    let columns = rules
        .iter()
        .map(|r| {
            let expression = match r.strategy {
                MaskingStrategy::Generalize => generalized_expression(r),
                _ => partial_expression(&r.column_name),
            };
            format!("    {expression} AS [{}]", r.column_name)
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!(
        "CREATE OR ALTER VIEW {} AS\nSELECT\n{columns}\nFROM {};",
        partial_view_name(schema, table),
        table_name(schema, table)
    )
}

pub(super) fn ensure_role(role: &str) -> String {
    format!(
        "IF NOT EXISTS (SELECT * FROM sys.database_principals WHERE name = '{}')\n    \
         CREATE ROLE [{role}];",
        role.replace('\'', "''")
    )
}

/// Grants implementing the full and partial tiers
pub(super) fn tier_grants(schema: &str, table: &str, roles: &AccessRoles) -> Vec<String> {
    let table_ref = table_name(schema, table);
    let view_ref = partial_view_name(schema, table);
    let mut grants = Vec::new();

    for role in &roles.full_access {
        grants.push(format!("GRANT UNMASK TO [{role}];"));
        grants.push(format!("GRANT SELECT ON {table_ref} TO [{role}];"));
    }
    for role in &roles.partial_access {
        grants.push(format!("GRANT UNMASK TO [{role}];"));
        grants.push(format!("DENY SELECT ON {table_ref} TO [{role}];"));
        grants.push(format!("GRANT SELECT ON {view_ref} TO [{role}];"));
    }
    grants
}
