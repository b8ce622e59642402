//! Statement batches for a [`SchemaDiff`].
//!
//! CHECK statements always follow one fixed order per table: every ADD, then
//! DROP followed by ADD for every modified constraint, then every DROP. A
//! predicate cannot be altered in place, and a name cannot be reused until
//! the constraint holding it is gone. A changed index or foreign key follows
//! the same rule: its DROP is emitted right before the ADD that replaces it.

use checksync_core::{
    CheckSpec, DatabaseSchema, Result, Schema, SchemaComparisonContext, Table, TableRef,
    creation_order,
};
use checksync_sql::{CheckGenerator, Dialect};

use crate::comparator::{Change, CheckDiff, SchemaDiff, TableDiff};

/// CREATE TABLE path: one guarded ADD per declared spec.
pub fn append_checks_sql<G>(
    sql: &mut Vec<String>,
    table: &TableRef,
    specs: &[&CheckSpec],
    generator: &G,
) -> Result<()>
where
    G: CheckGenerator + ?Sized,
{
    for spec in specs {
        sql.push(generator.build_add_check_sql(table, spec)?);
    }
    Ok(())
}

/// ALTER TABLE path: ADD added, DROP+ADD modified, DROP dropped.
pub fn append_diff_checks_sql<G>(
    sql: &mut Vec<String>,
    table: &TableRef,
    checks: &CheckDiff,
    generator: &G,
) -> Result<()>
where
    G: CheckGenerator + ?Sized,
{
    for spec in &checks.added {
        sql.push(generator.build_add_check_sql(table, spec)?);
    }
    for spec in &checks.modified {
        sql.push(generator.build_drop_check_sql(table, spec.name()));
        sql.push(generator.build_add_check_sql(table, spec)?);
    }
    for spec in &checks.dropped {
        sql.push(generator.build_drop_check_sql(table, spec.name()));
    }
    Ok(())
}

/// Render the whole diff as an ordered statement batch.
///
/// New tables come first (in foreign-key order, each followed by its declared
/// checks, then their foreign keys), then changed tables, then dropped tables.
/// Within a changed table, additive changes run before checks and destructive
/// changes after them, except that an index or foreign key being replaced
/// under the same name is dropped immediately before its new definition.
pub fn render_schema_diff<D>(
    ctx: &SchemaComparisonContext,
    diff: &SchemaDiff,
    dialect: &D,
) -> Result<Vec<String>>
where
    D: Dialect + ?Sized,
{
    let mut sql = Vec::new();

    let created: Vec<&TableDiff> = diff.table_diffs.iter().filter(|d| d.creates_table()).collect();
    let created_refs: Vec<TableRef> = created.iter().map(|d| d.table.clone()).collect();
    let ordered = order_new_tables(&created, &created_refs);

    for table_ref in &ordered {
        let Some(table) = created
            .iter()
            .find(|d| &d.table == table_ref)
            .and_then(|d| created_table(d))
        else {
            continue;
        };
        sql.push(dialect.create_table_sql(table_ref, table));
        if table.accepts_checks() {
            append_checks_sql(&mut sql, table_ref, &ctx.declared_specs(table_ref), dialect)?;
        }
    }
    for table_ref in &ordered {
        if let Some(table) = created
            .iter()
            .find(|d| &d.table == table_ref)
            .and_then(|d| created_table(d))
        {
            for fk in table.foreign_keys() {
                sql.push(dialect.add_foreign_key_sql(table_ref, fk));
            }
        }
    }

    for table_diff in &diff.table_diffs {
        if table_diff.creates_table() || table_diff.drops_table() {
            continue;
        }
        let table = &table_diff.table;
        let mut replaced = Vec::new();
        for change in table_diff.changes.iter().filter(|c| c.is_additive()) {
            if let Some(drop) = replaced_drop(change, &table_diff.changes) {
                sql.push(render_change(dialect, table, drop));
                replaced.push(drop);
            }
            sql.push(render_change(dialect, table, change));
        }
        append_diff_checks_sql(&mut sql, table, &table_diff.checks, dialect)?;
        for change in table_diff.changes.iter().filter(|c| !c.is_additive()) {
            if !replaced.contains(&change) {
                sql.push(render_change(dialect, table, change));
            }
        }
    }

    for table_diff in diff.table_diffs.iter().filter(|d| d.drops_table()) {
        sql.push(dialect.drop_table_sql(&table_diff.table));
    }

    tracing::debug!(event = "diff_rendered", statements = sql.len());
    Ok(sql)
}

/// Join a batch into migration file text. Empty for an empty batch.
pub fn to_migration_sql(statements: &[String]) -> String {
    if statements.is_empty() {
        return String::new();
    }
    let mut out = statements.join("\n\n");
    out.push('\n');
    out
}

fn created_table(diff: &TableDiff) -> Option<&Table> {
    diff.changes.iter().find_map(|change| match change {
        Change::CreateTable(table) => Some(table),
        _ => None,
    })
}

/// New tables ordered so referenced tables come first. Falls back to diff
/// order when their foreign keys form a cycle; the foreign keys are added
/// after every table exists, so either order is valid.
fn order_new_tables(created: &[&TableDiff], refs: &[TableRef]) -> Vec<TableRef> {
    let mut snapshot = DatabaseSchema::empty("snapshot");
    for diff in created {
        let Some(table) = created_table(diff) else {
            continue;
        };
        match snapshot
            .schemas
            .iter_mut()
            .find(|schema| schema.name == diff.table.schema)
        {
            Some(schema) => schema.tables.push(table.clone()),
            None => snapshot.schemas.push(Schema {
                name: diff.table.schema.clone(),
                tables: vec![table.clone()],
            }),
        }
    }

    match creation_order(&snapshot, refs) {
        Ok(order) => order,
        Err(cycle) => {
            tracing::warn!(
                event = "foreign_key_cycle",
                tables = ?cycle.iter().map(ToString::to_string).collect::<Vec<_>>()
            );
            refs.to_vec()
        }
    }
}

/// The drop that frees `add`'s name, when `add` redefines an index or foreign
/// key that already exists.
fn replaced_drop<'a>(add: &Change, changes: &'a [Change]) -> Option<&'a Change> {
    changes.iter().find(|change| match (add, change) {
        (Change::AddIndex(index), Change::DropIndex { name }) => &index.name == name,
        (Change::AddForeignKey(fk), Change::DropForeignKey { name }) => &fk.name == name,
        _ => false,
    })
}

fn render_change<D>(dialect: &D, table: &TableRef, change: &Change) -> String
where
    D: Dialect + ?Sized,
{
    match change {
        Change::CreateTable(created) => dialect.create_table_sql(table, created),
        Change::DropTable => dialect.drop_table_sql(table),
        Change::AddColumn(column) => dialect.add_column_sql(table, column),
        Change::DropColumn { name } => dialect.drop_column_sql(table, name),
        Change::AlterColumnType { name, to, .. } => dialect.alter_column_type_sql(table, name, to),
        Change::AlterColumnNullable { name, to, .. } => {
            dialect.alter_column_nullable_sql(table, name, *to)
        }
        Change::AlterColumnDefault { name, to, .. } => {
            dialect.alter_column_default_sql(table, name, to.as_deref())
        }
        Change::AddIndex(index) => dialect.add_index_sql(table, index),
        Change::DropIndex { name } => dialect.drop_index_sql(table, name),
        Change::AddForeignKey(fk) => dialect.add_foreign_key_sql(table, fk),
        Change::DropForeignKey { name } => dialect.drop_foreign_key_sql(table, name),
    }
}
