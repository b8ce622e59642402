//! Canonical forms for constraint names, identifiers, enum values, and SQL
//! predicate text.
//!
//! Everything that enters the registry passes through here first, so the
//! comparator only ever sees canonical values.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::spec::{EnumValue, EnumValues};

/// Matches a `::type` cast suffix, including multi-word Postgres type names,
/// an optional length/precision modifier, and any number of `[]` suffixes.
static CAST_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)::\s*(?:character\s+varying|double\s+precision|bit\s+varying|timestamp\s+with(?:out)?\s+time\s+zone|time\s+with(?:out)?\s+time\s+zone|[a-z_][a-z0-9_]*)(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?(?:\s*\[\s*\])*",
    )
    .expect("cast suffix pattern is valid")
});

/// Canonicalize a constraint name: trimmed, uppercase, `[A-Z0-9_]+`.
pub fn normalize_constraint_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_uppercase();
    if !is_canonical_name(&normalized) {
        return Err(Error::Configuration(format!(
            "invalid constraint name {name:?}: expected letters, digits and underscores"
        )));
    }
    Ok(normalized)
}

/// Returns true when `name` is already in canonical constraint-name form.
pub fn is_canonical_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Canonicalize a column or table identifier: trimmed, lowercase, `[a-z0-9_]+`.
pub fn normalize_identifier(identifier: &str) -> Result<String> {
    let normalized = identifier.trim().to_lowercase();
    let valid = !normalized.is_empty()
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(Error::Configuration(format!(
            "invalid identifier {identifier:?}: expected letters, digits and underscores"
        )));
    }
    Ok(normalized)
}

/// Validate and canonicalize an enum value list.
///
/// The list must be non-empty and every entry must share one scalar type.
/// String entries are trimmed.
pub fn normalize_value_list(values: &[EnumValue]) -> Result<EnumValues> {
    let Some(first) = values.first() else {
        return Err(Error::Configuration(
            "enum check requires at least one value".to_string(),
        ));
    };

    match first {
        EnumValue::Text(_) => values
            .iter()
            .map(|value| match value {
                EnumValue::Text(text) => Ok(text.trim().to_string()),
                EnumValue::Int(int) => Err(mixed_types(&int.to_string())),
            })
            .collect::<Result<Vec<_>>>()
            .map(EnumValues::Text),
        EnumValue::Int(_) => values
            .iter()
            .map(|value| match value {
                EnumValue::Int(int) => Ok(*int),
                EnumValue::Text(text) => Err(mixed_types(text)),
            })
            .collect::<Result<Vec<_>>>()
            .map(EnumValues::Int),
    }
}

fn mixed_types(offending: &str) -> Error {
    Error::Configuration(format!(
        "enum check values must share one type, found mismatched value {offending:?}"
    ))
}

/// Reduce SQL predicate text to a form suitable for equality comparison.
///
/// Lowercases, drops a leading `check` keyword, removes `::type` casts, and
/// then strips whitespace, quotes, parentheses, and brackets. This is a
/// textual heuristic: equivalent predicates written differently still compare
/// unequal.
pub fn canonical_expression(sql: &str) -> String {
    let lowered = sql.trim().to_lowercase();
    let without_keyword = strip_check_keyword(&lowered);
    let without_casts = strip_type_casts(without_keyword);

    without_casts
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '"' | '\'' | '(' | ')' | '[' | ']'))
        .collect()
}

/// Remove `::type` and `::type[]` cast suffixes, keeping the casted operand.
pub fn strip_type_casts(sql: &str) -> Cow<'_, str> {
    CAST_SUFFIX.replace_all(sql, "")
}

fn strip_check_keyword(sql: &str) -> &str {
    match sql.strip_prefix("check") {
        Some(rest) if rest.starts_with(|c: char| c.is_whitespace() || c == '(') => rest,
        _ => sql,
    }
}
