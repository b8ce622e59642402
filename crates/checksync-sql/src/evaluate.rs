//! Row-level evaluation of rendered CHECK predicates.
//!
//! Covers the predicate shapes this tool renders (`= ANY(ARRAY[..])`,
//! `num_nonnulls(..) <= n`) plus the simple forms Postgres deparses them into
//! (`IN (..)`, comparisons, `IS NULL OR`, `AND`). Anything else evaluates to
//! [`CheckOutcome::Unsupported`].

use std::collections::HashMap;
use std::sync::LazyLock;

use checksync_core::strip_type_casts;
use regex::Regex;

use crate::generator::strip_wrapping_parens;

/// A column value as seen by a CHECK predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Result of evaluating a CHECK constraint expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Passed,
    Failed,
    Unsupported,
}

/// Row values keyed by lowercase column name.
#[derive(Debug)]
pub struct CheckContext<'a> {
    pub values: &'a HashMap<String, SqlValue>,
}

static NUM_NONNULLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^num_nonnulls\s*\(([^)]*)\)\s*(<=|>=|=|<|>)\s*(\d+)$")
        .expect("num_nonnulls pattern is valid")
});

static ANY_ARRAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(*\s*(\w+)\s*\)*\s*=\s*any\s*\(+\s*array\s*\[(.*)\]\s*\)+$")
        .expect("any array pattern is valid")
});

static IN_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(*\s*(\w+)\s*\)*\s+in\s*\((.*)\)$").expect("in list pattern is valid")
});

static IS_NULL_OR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(*\s*(\w+)\s*\)*\s+is\s+null\s+or\s+(.+)$")
        .expect("is null or pattern is valid")
});

static IS_NOT_NULL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\(*\s*(\w+)\s*\)*\s+is\s+not\s+null$").expect("is not null pattern is valid")
});

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(*\s*(\w+)\s*\)*\s*(<>|!=|>=|<=|=|>|<)\s*(\S+)$")
        .expect("comparison pattern is valid")
});

/// Evaluate `expression` against one row.
///
/// Follows CHECK semantics: a predicate that is unknown because an operand
/// is NULL counts as satisfied.
pub fn evaluate_check(expression: &str, ctx: &CheckContext<'_>) -> CheckOutcome {
    let expr = normalize_expression(expression);
    evaluate_normalized(&expr, ctx)
}

fn evaluate_normalized(expr: &str, ctx: &CheckContext<'_>) -> CheckOutcome {
    let expr = strip_wrapping_parens(expr);

    if let Some(parts) = split_and(expr) {
        for part in parts {
            match evaluate_normalized(part, ctx) {
                CheckOutcome::Passed => continue,
                CheckOutcome::Failed => return CheckOutcome::Failed,
                CheckOutcome::Unsupported => return CheckOutcome::Unsupported,
            }
        }
        return CheckOutcome::Passed;
    }

    if let Some(caps) = IS_NULL_OR.captures(expr) {
        return match get_value(&caps[1], ctx) {
            None => CheckOutcome::Unsupported,
            Some(value) if value.is_null() => CheckOutcome::Passed,
            Some(_) => evaluate_normalized(caps[2].trim(), ctx),
        };
    }

    if let Some(caps) = IS_NOT_NULL.captures(expr) {
        return match get_value(&caps[1], ctx) {
            None => CheckOutcome::Unsupported,
            Some(value) if value.is_null() => CheckOutcome::Failed,
            Some(_) => CheckOutcome::Passed,
        };
    }

    if let Some(caps) = NUM_NONNULLS.captures(expr) {
        return evaluate_num_nonnulls(&caps[1], &caps[2], &caps[3], ctx);
    }

    if let Some(caps) = ANY_ARRAY.captures(expr) {
        return evaluate_in(&caps[1], &split_list(&caps[2]), ctx);
    }

    if let Some(caps) = IN_LIST.captures(expr) {
        return evaluate_in(&caps[1], &split_list(&caps[2]), ctx);
    }

    if let Some(caps) = COMPARISON.captures(expr) {
        return evaluate_comparison(&caps[1], &caps[2], &caps[3], ctx);
    }

    CheckOutcome::Unsupported
}

fn normalize_expression(expression: &str) -> String {
    let mut expr = expression.trim();
    if let Some(head) = expr.get(..5)
        && head.eq_ignore_ascii_case("check")
        && expr[5..].starts_with(|c: char| c.is_whitespace() || c == '(')
    {
        expr = expr[5..].trim();
    }
    strip_type_casts(expr).replace('"', "")
}

/// Split on top-level `AND`, outside parentheses and literals.
fn split_and(expr: &str) -> Option<Vec<&str>> {
    let lower = expr.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_literal = false;
    let mut start = 0;
    let mut index = 0;

    while index < bytes.len() {
        match bytes[index] {
            b'\'' => in_literal = !in_literal,
            b'(' if !in_literal => depth += 1,
            b')' if !in_literal => depth = depth.saturating_sub(1),
            b' ' if !in_literal && depth == 0 && lower[index..].starts_with(" and ") => {
                parts.push(expr[start..index].trim());
                index += " and ".len();
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }

    if parts.is_empty() {
        return None;
    }
    parts.push(expr[start..].trim());
    Some(parts.into_iter().filter(|part| !part.is_empty()).collect())
}

/// Split a comma-separated list, ignoring commas inside literals.
fn split_list(list: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_literal = false;

    for c in list.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                current.push(c);
            }
            ',' if !in_literal => items.push(normalize_literal(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        items.push(normalize_literal(&current));
    }
    items
}

fn normalize_literal(value: &str) -> String {
    let stripped = strip_wrapping_parens(value.trim());
    if stripped.len() >= 2 && stripped.starts_with('\'') && stripped.ends_with('\'') {
        stripped[1..stripped.len() - 1].replace("''", "'")
    } else {
        stripped.to_string()
    }
}

fn evaluate_num_nonnulls(
    columns: &str,
    op: &str,
    rhs: &str,
    ctx: &CheckContext<'_>,
) -> CheckOutcome {
    let Ok(limit) = rhs.parse::<i64>() else {
        return CheckOutcome::Unsupported;
    };

    let mut count = 0i64;
    for column in columns.split(',') {
        match get_value(column.trim(), ctx) {
            Some(value) if !value.is_null() => count += 1,
            Some(_) => {}
            None => return CheckOutcome::Unsupported,
        }
    }

    compare_i64(count, limit, op)
}

fn evaluate_in(column: &str, values: &[String], ctx: &CheckContext<'_>) -> CheckOutcome {
    let value = match get_value(column, ctx) {
        Some(value) => value,
        None => return CheckOutcome::Unsupported,
    };

    let matched = match value {
        SqlValue::Null => return CheckOutcome::Passed,
        SqlValue::Text(text) => values.iter().any(|candidate| candidate == text),
        SqlValue::Int(int) => values
            .iter()
            .filter_map(|candidate| candidate.parse::<i64>().ok())
            .any(|candidate| candidate == *int),
    };

    if matched {
        CheckOutcome::Passed
    } else {
        CheckOutcome::Failed
    }
}

fn evaluate_comparison(column: &str, op: &str, rhs: &str, ctx: &CheckContext<'_>) -> CheckOutcome {
    let left = match get_value(column, ctx) {
        Some(value) => value,
        None => return CheckOutcome::Unsupported,
    };

    match left {
        SqlValue::Null => CheckOutcome::Passed,
        SqlValue::Int(int) => match rhs.parse::<i64>() {
            Ok(right) => compare_i64(*int, right, op),
            Err(_) => CheckOutcome::Unsupported,
        },
        SqlValue::Text(text) => {
            if !(rhs.len() >= 2 && rhs.starts_with('\'') && rhs.ends_with('\'')) {
                return CheckOutcome::Unsupported;
            }
            let right = normalize_literal(rhs);
            let pass = match op {
                "=" => *text == right,
                "<>" | "!=" => *text != right,
                _ => return CheckOutcome::Unsupported,
            };
            outcome(pass)
        }
    }
}

fn compare_i64(left: i64, right: i64, op: &str) -> CheckOutcome {
    let pass = match op {
        ">" => left > right,
        ">=" => left >= right,
        "<" => left < right,
        "<=" => left <= right,
        "=" => left == right,
        "<>" | "!=" => left != right,
        _ => return CheckOutcome::Unsupported,
    };
    outcome(pass)
}

fn outcome(pass: bool) -> CheckOutcome {
    if pass {
        CheckOutcome::Passed
    } else {
        CheckOutcome::Failed
    }
}

fn get_value<'a>(column: &str, ctx: &'a CheckContext<'_>) -> Option<&'a SqlValue> {
    let key = column.trim().to_lowercase();
    ctx.values.get(&key)
}
