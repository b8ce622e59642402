use checksync_core::{
    Column, Constraint, ForeignKey, Index, PrimaryKey, Table, TableKind, UniqueConstraint,
};

use crate::options::IntrospectOptions;
use crate::postgres::utils::{fk_action_from_code, relkind_to_table_kind};

use super::queries::{RawColumn, RawForeignKey, RawIndex, RawKey, RawTable};

pub fn filter_schemas(raw: Vec<String>, opts: &IntrospectOptions) -> Vec<String> {
    raw.into_iter()
        .filter(|schema| {
            let is_system = schema.starts_with("pg_") || schema == "information_schema";
            match &opts.schemas {
                Some(list) => list.iter().any(|item| item == schema),
                None => opts.include_system_schemas || !is_system,
            }
        })
        .collect()
}

pub fn map_tables(raw: Vec<RawTable>, opts: &IntrospectOptions) -> Vec<Table> {
    raw.into_iter()
        .filter_map(|table| {
            let kind = relkind_to_table_kind(table.relkind);
            if !table_kind_enabled(&kind, opts) {
                return None;
            }

            Some(Table {
                kind,
                ..Table::new(&table.name)
            })
        })
        .collect()
}

fn table_kind_enabled(kind: &TableKind, opts: &IntrospectOptions) -> bool {
    match kind {
        TableKind::View => opts.include_views,
        TableKind::MaterializedView => opts.include_materialized_views,
        TableKind::ForeignTable => opts.include_foreign_tables,
        _ => true,
    }
}

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<Column> {
    raw.into_iter()
        .map(|col| Column {
            name: col.name,
            data_type: col.data_type,
            is_nullable: col.is_nullable,
            default: col.default,
        })
        .collect()
}

pub fn map_primary_key(raw: Option<RawKey>) -> Option<Constraint> {
    raw.map(|pk| {
        Constraint::PrimaryKey(PrimaryKey {
            name: Some(pk.name),
            columns: pk.columns,
        })
    })
}

pub fn map_unique_constraints(raw: Vec<RawKey>) -> Vec<Constraint> {
    raw.into_iter()
        .map(|uc| {
            Constraint::Unique(UniqueConstraint {
                name: Some(uc.name),
                columns: uc.columns,
            })
        })
        .collect()
}

pub fn map_foreign_keys(raw: Vec<RawForeignKey>) -> Vec<Constraint> {
    raw.into_iter()
        .map(|fk| {
            Constraint::ForeignKey(ForeignKey {
                name: fk.name,
                columns: fk.columns,
                referenced_schema: fk.referenced_schema,
                referenced_table: fk.referenced_table,
                referenced_columns: fk.referenced_columns,
                on_update: fk_action_from_code(fk.on_update_code),
                on_delete: fk_action_from_code(fk.on_delete_code),
            })
        })
        .collect()
}

pub fn map_indexes(raw: Vec<RawIndex>) -> Vec<Index> {
    raw.into_iter()
        .map(|idx| Index {
            name: idx.name,
            is_unique: idx.is_unique,
            is_primary: idx.is_primary,
            definition: idx.definition,
        })
        .collect()
}

pub fn sort_constraints(constraints: &mut [Constraint]) {
    constraints.sort_by(|left, right| constraint_key(left).cmp(&constraint_key(right)));
}

fn constraint_key(constraint: &Constraint) -> (u8, String, String) {
    match constraint {
        Constraint::PrimaryKey(pk) => {
            (0, pk.name.clone().unwrap_or_default(), pk.columns.join("|"))
        }
        Constraint::Unique(unique) => (
            1,
            unique.name.clone().unwrap_or_default(),
            unique.columns.join("|"),
        ),
        Constraint::Check(check) => (2, check.name.clone(), check.expression.clone()),
        Constraint::ForeignKey(fk) => (3, fk.name.clone(), fk.columns.join("|")),
    }
}
