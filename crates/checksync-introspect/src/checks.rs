//! CHECK constraint introspection.
//!
//! Checks are read with a single catalog query across every schema instead of
//! once per table, then grouped by table in catalog order.

use sqlx::PgPool;

use checksync_core::{
    CheckConstraint, ChecksByTable, Constraint, DatabaseSchema, Error, Result, TableRef,
    is_canonical_name,
};
use checksync_sql::{CheckGenerator, RawCheckRow};

#[derive(Debug, sqlx::FromRow)]
struct CheckRow {
    schema_name: String,
    table_name: String,
    constraint_name: String,
    definition: String,
}

impl From<CheckRow> for RawCheckRow {
    fn from(row: CheckRow) -> Self {
        Self {
            schema_name: row.schema_name,
            table_name: row.table_name,
            constraint_name: row.constraint_name,
            definition: row.definition,
        }
    }
}

/// Fetch every managed CHECK constraint, grouped by table.
pub async fn introspect_checks(
    pool: &PgPool,
    generator: &(dyn CheckGenerator + Sync),
) -> Result<ChecksByTable> {
    let rows = sqlx::query_as::<_, CheckRow>(generator.build_introspection_sql())
        .fetch_all(pool)
        .await
        .map_err(|err| Error::Introspection(err.to_string()))?;

    let fetched = rows.len();
    let checks = group_checks(rows.into_iter().map(RawCheckRow::from), generator);
    tracing::debug!(
        event = "checks_introspected",
        dialect = generator.dialect(),
        rows = fetched,
        tables = checks.len()
    );
    Ok(checks)
}

/// Map raw catalog rows through the dialect and group them by table,
/// preserving row order. Unmanaged rows are dropped by the mapper.
pub fn group_checks<I, G>(rows: I, generator: &G) -> ChecksByTable
where
    I: IntoIterator<Item = RawCheckRow>,
    G: CheckGenerator + ?Sized,
{
    let mut checks = ChecksByTable::new();
    for row in rows {
        if let Some(check) = generator.map_introspection_row(row) {
            checks
                .entry(check.table)
                .or_default()
                .insert(check.name, check.expression);
        }
    }
    checks
}

/// Replace the CHECK constraints recorded on each table of `schema` with the
/// introspected ones. Tables absent from `checks` end up with none.
pub fn annotate_schema(schema: &mut DatabaseSchema, checks: &ChecksByTable) {
    for schema_item in &mut schema.schemas {
        for table in &mut schema_item.tables {
            table
                .constraints
                .retain(|constraint| !matches!(constraint, Constraint::Check(_)));

            let table_ref = TableRef::new(&schema_item.name, &table.name);
            if let Some(expressions) = checks.get(&table_ref) {
                table
                    .constraints
                    .extend(expressions.iter().map(|(name, expression)| {
                        Constraint::Check(CheckConstraint {
                            name: name.clone(),
                            expression: expression.clone(),
                        })
                    }));
            }
        }
    }
}

/// Read managed CHECK constraints back out of an annotated snapshot.
pub fn checks_from_schema(schema: &DatabaseSchema) -> ChecksByTable {
    let mut checks = ChecksByTable::new();
    for (table_ref, table) in schema.tables() {
        let managed: Vec<&CheckConstraint> = table
            .check_constraints()
            .filter(|check| is_canonical_name(&check.name))
            .collect();
        if managed.is_empty() {
            continue;
        }
        let expressions = checks.entry(table_ref).or_default();
        for check in managed {
            expressions.insert(check.name.clone(), check.expression.clone());
        }
    }
    checks
}
