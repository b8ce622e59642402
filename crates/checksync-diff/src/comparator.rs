//! Schema comparison.
//!
//! Compares a previous [`DatabaseSchema`] (usually introspected) against a
//! target one and produces the changes needed to move from the first to the
//! second. For every table present on both sides the CHECK constraints
//! declared in the [`SchemaComparisonContext`] are compared against the
//! introspected ones:
//!
//! - declared, not present: `added`
//! - declared and present with a different canonical predicate: `modified`
//! - present, not declared: `dropped` (as a tombstone)
//!
//! Predicates are compared with [`canonical_expression`], a textual
//! heuristic, so logically equivalent predicates spelled differently (for
//! example a reordered enum list) show up as `modified`.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::Serialize;

use checksync_core::{
    CheckSpec, Column, DatabaseSchema, ForeignKey, Index, Result, SchemaComparisonContext, Table,
    TableRef, canonical_expression,
};
use checksync_sql::CheckGenerator;

/// A diff between two schemas.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaDiff {
    /// Changes organized by table.
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    /// Count structural changes plus CHECK changes.
    pub fn change_count(&self) -> usize {
        self.table_diffs
            .iter()
            .map(|diff| diff.changes.len() + diff.checks.len())
            .sum()
    }

    pub fn table(&self, table: &TableRef) -> Option<&TableDiff> {
        self.table_diffs.iter().find(|diff| &diff.table == table)
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, Serialize)]
pub struct TableDiff {
    pub table: TableRef,
    /// Structural changes.
    pub changes: Vec<Change>,
    /// CHECK constraint changes.
    pub checks: CheckDiff,
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.checks.is_empty()
    }

    /// True when this diff creates the table.
    pub fn creates_table(&self) -> bool {
        self.changes
            .iter()
            .any(|change| matches!(change, Change::CreateTable(_)))
    }

    /// True when this diff drops the table.
    pub fn drops_table(&self) -> bool {
        self.changes
            .iter()
            .any(|change| matches!(change, Change::DropTable))
    }
}

/// CHECK constraint changes for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckDiff {
    /// Declared, not present. Declaration order.
    pub added: Vec<CheckSpec>,
    /// Present with a different predicate; carries the new spec.
    /// Declaration order.
    pub modified: Vec<CheckSpec>,
    /// Present, not declared. Tombstones in catalog order.
    pub dropped: Vec<CheckSpec>,
}

impl CheckDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.dropped.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.dropped.len()
    }
}

/// A single structural change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// Create a table that only the target has.
    CreateTable(Table),
    /// Drop a table that only the previous schema has.
    DropTable,
    AddColumn(Column),
    DropColumn {
        name: String,
    },
    AlterColumnType {
        name: String,
        from: String,
        to: String,
    },
    AlterColumnNullable {
        name: String,
        from: bool,
        to: bool,
    },
    AlterColumnDefault {
        name: String,
        from: Option<String>,
        to: Option<String>,
    },
    AddIndex(Index),
    DropIndex {
        name: String,
    },
    AddForeignKey(ForeignKey),
    DropForeignKey {
        name: String,
    },
}

impl Change {
    /// True for changes that only add or alter objects.
    pub fn is_additive(&self) -> bool {
        !matches!(
            self,
            Change::DropTable
                | Change::DropColumn { .. }
                | Change::DropIndex { .. }
                | Change::DropForeignKey { .. }
        )
    }
}

/// Compare `from` (current) with `to` (desired), structural changes first and
/// then the CHECK constraints recorded in `ctx`.
pub fn compare_schemas<G>(
    ctx: &SchemaComparisonContext,
    from: &DatabaseSchema,
    to: &DatabaseSchema,
    generator: &G,
) -> Result<SchemaDiff>
where
    G: CheckGenerator + ?Sized,
{
    let mut table_diffs = Vec::new();

    let current_tables: HashSet<TableRef> = from.tables().map(|(table_ref, _)| table_ref).collect();
    let desired_tables: HashSet<TableRef> = to.tables().map(|(table_ref, _)| table_ref).collect();
    let described_schemas: BTreeSet<&str> =
        to.schemas.iter().map(|schema| schema.name.as_str()).collect();

    for (table_ref, desired) in to.tables() {
        let Some(current) = from.table(&table_ref) else {
            // New tables get their declared checks from the CREATE TABLE path.
            table_diffs.push(TableDiff {
                table: table_ref,
                changes: vec![Change::CreateTable(desired.clone())],
                checks: CheckDiff::default(),
            });
            continue;
        };

        let changes = diff_table(desired, current);
        let checks = if desired.accepts_checks() {
            diff_checks(ctx, &table_ref, generator)?
        } else {
            CheckDiff::default()
        };

        let diff = TableDiff {
            table: table_ref,
            changes,
            checks,
        };
        if !diff.is_empty() {
            table_diffs.push(diff);
        }
    }

    for (table_ref, _) in from.tables() {
        if desired_tables.contains(&table_ref)
            || !described_schemas.contains(table_ref.schema.as_str())
        {
            continue;
        }
        table_diffs.push(TableDiff {
            table: table_ref,
            changes: vec![Change::DropTable],
            checks: CheckDiff::default(),
        });
    }

    table_diffs.sort_by(|left, right| left.table.cmp(&right.table));

    let diff = SchemaDiff { table_diffs };
    tracing::debug!(
        event = "schemas_compared",
        current_tables = current_tables.len(),
        desired_tables = desired_tables.len(),
        changed_tables = diff.table_diffs.len(),
        changes = diff.change_count()
    );
    Ok(diff)
}

/// CHECK constraint diff for one table that exists on both sides.
fn diff_checks<G>(
    ctx: &SchemaComparisonContext,
    table: &TableRef,
    generator: &G,
) -> Result<CheckDiff>
where
    G: CheckGenerator + ?Sized,
{
    let declared = ctx.declared_specs(table);
    let mut diff = CheckDiff::default();

    let Some(existing) = ctx.introspected_expressions(table) else {
        diff.added = declared.into_iter().cloned().collect();
        return Ok(diff);
    };

    let declared_names: HashSet<&str> = declared.iter().map(|spec| spec.name()).collect();

    for spec in &declared {
        match existing.get(spec.name()) {
            None => diff.added.push((*spec).clone()),
            Some(current) => {
                let desired = generator.build_expression_sql(spec)?;
                if canonical_expression(&desired) != canonical_expression(current) {
                    tracing::debug!(
                        event = "check_modified",
                        table = %table,
                        name = spec.name(),
                        current = %current,
                        desired = %desired
                    );
                    diff.modified.push((*spec).clone());
                }
            }
        }
    }

    for name in existing.keys() {
        if !declared_names.contains(name.as_str()) {
            diff.dropped.push(CheckSpec::tombstone_for(name)?);
        }
    }

    Ok(diff)
}

/// Diff two tables with the same name.
fn diff_table(desired: &Table, current: &Table) -> Vec<Change> {
    let mut changes = Vec::new();
    changes.extend(diff_columns(&desired.columns, &current.columns));
    changes.extend(diff_indexes(&desired.indexes, &current.indexes));
    changes.extend(diff_foreign_keys(desired, current));
    changes
}

fn diff_columns(desired: &[Column], current: &[Column]) -> Vec<Change> {
    let mut changes = Vec::new();

    let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();

    for desired_col in desired {
        let Some(current_col) = current.iter().find(|c| c.name == desired_col.name) else {
            changes.push(Change::AddColumn(desired_col.clone()));
            continue;
        };

        if desired_col.data_type != current_col.data_type {
            changes.push(Change::AlterColumnType {
                name: desired_col.name.clone(),
                from: current_col.data_type.clone(),
                to: desired_col.data_type.clone(),
            });
        }

        if desired_col.is_nullable != current_col.is_nullable {
            changes.push(Change::AlterColumnNullable {
                name: desired_col.name.clone(),
                from: current_col.is_nullable,
                to: desired_col.is_nullable,
            });
        }

        if desired_col.default != current_col.default {
            changes.push(Change::AlterColumnDefault {
                name: desired_col.name.clone(),
                from: current_col.default.clone(),
                to: desired_col.default.clone(),
            });
        }
    }

    for col in current {
        if !desired_names.contains(col.name.as_str()) {
            changes.push(Change::DropColumn {
                name: col.name.clone(),
            });
        }
    }

    changes
}

/// Indexes match on name; a changed definition is a drop plus an add.
fn diff_indexes(desired: &[Index], current: &[Index]) -> Vec<Change> {
    let mut changes = Vec::new();

    for idx in current {
        let unchanged = desired
            .iter()
            .any(|d| d.name == idx.name && d.definition == idx.definition);
        if !unchanged && !idx.is_primary {
            changes.push(Change::DropIndex {
                name: idx.name.clone(),
            });
        }
    }

    for idx in desired {
        let present = current
            .iter()
            .any(|c| c.name == idx.name && c.definition == idx.definition);
        if !present && !idx.is_primary {
            changes.push(Change::AddIndex(idx.clone()));
        }
    }

    changes
}

/// Foreign keys match on name; any other difference is a drop plus an add.
fn diff_foreign_keys(desired: &Table, current: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    for fk in current.foreign_keys() {
        if !desired.foreign_keys().any(|d| d == fk) {
            changes.push(Change::DropForeignKey {
                name: fk.name.clone(),
            });
        }
    }

    for fk in desired.foreign_keys() {
        if !current.foreign_keys().any(|c| c == fk) {
            changes.push(Change::AddForeignKey(fk.clone()));
        }
    }

    changes
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::CreateTable(table) => write!(f, "+ table {}", table.name),
            Change::DropTable => write!(f, "- table"),
            Change::AddColumn(col) => {
                let nullable = if col.is_nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.data_type, nullable)
            }
            Change::DropColumn { name } => write!(f, "- {name}"),
            Change::AlterColumnType { name, from, to } => write!(f, "~ {name}: {from} -> {to}"),
            Change::AlterColumnNullable { name, from, to } => {
                let label = |nullable: bool| if nullable { "nullable" } else { "not null" };
                write!(f, "~ {name}: {} -> {}", label(*from), label(*to))
            }
            Change::AlterColumnDefault { name, from, to } => {
                let from = from.as_deref().unwrap_or("(none)");
                let to = to.as_deref().unwrap_or("(none)");
                write!(f, "~ {name} default: {from} -> {to}")
            }
            Change::AddIndex(idx) => write!(f, "+ INDEX {}", idx.name),
            Change::DropIndex { name } => write!(f, "- INDEX {name}"),
            Change::AddForeignKey(fk) => write!(
                f,
                "+ FOREIGN KEY {} ({}) -> {}.{}",
                fk.name,
                fk.columns.join(", "),
                fk.referenced_schema,
                fk.referenced_table
            ),
            Change::DropForeignKey { name } => write!(f, "- FOREIGN KEY {name}"),
        }
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }

        writeln!(f, "Changes detected:\n")?;
        for table_diff in &self.table_diffs {
            writeln!(f, "  {}:", table_diff.table)?;
            for change in &table_diff.changes {
                writeln!(f, "    {change}")?;
            }
            for spec in &table_diff.checks.added {
                writeln!(f, "    + CHECK {}", spec.name())?;
            }
            for spec in &table_diff.checks.modified {
                writeln!(f, "    ~ CHECK {}", spec.name())?;
            }
            for spec in &table_diff.checks.dropped {
                writeln!(f, "    - CHECK {}", spec.name())?;
            }
        }
        Ok(())
    }
}
