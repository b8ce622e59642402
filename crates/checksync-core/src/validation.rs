use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::Constraint;
use crate::declare::CheckManifest;
use crate::error::{Error, Result};
use crate::registry::SchemaComparisonContext;
use crate::schema::DatabaseSchema;

/// Validate internal consistency of a database schema.
///
/// This checks:
/// - duplicate schemas/tables/columns
/// - primary key, unique, and foreign key columns exist
/// - foreign key targets exist
pub fn validate_schema(schema: &DatabaseSchema) -> Result<()> {
    let mut catalog: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
    let mut namespaces = BTreeSet::new();

    for db_schema in &schema.schemas {
        if !namespaces.insert(db_schema.name.clone()) {
            return Err(Error::InvalidSchema(format!(
                "duplicate schema name: {}",
                db_schema.name
            )));
        }

        for table in &db_schema.tables {
            let key = (db_schema.name.clone(), table.name.clone());
            if catalog.contains_key(&key) {
                return Err(Error::InvalidSchema(format!(
                    "duplicate table name: {}.{}",
                    db_schema.name, table.name
                )));
            }

            let mut columns = BTreeSet::new();
            for column in &table.columns {
                if !columns.insert(column.name.clone()) {
                    return Err(Error::InvalidSchema(format!(
                        "duplicate column name: {}.{}.{}",
                        db_schema.name, table.name, column.name
                    )));
                }
            }
            catalog.insert(key, columns);
        }
    }

    for (table_ref, table) in schema.tables() {
        let columns = catalog
            .get(&(table_ref.schema.clone(), table_ref.table.clone()))
            .ok_or_else(|| Error::InvalidSchema(format!("missing table in catalog: {table_ref}")))?;
        let missing = |kind: &str, column: &str| {
            Error::InvalidSchema(format!("{kind} column not found: {table_ref}.{column}"))
        };

        for constraint in &table.constraints {
            match constraint {
                Constraint::PrimaryKey(pk) => {
                    if let Some(column) = pk.columns.iter().find(|c| !columns.contains(*c)) {
                        return Err(missing("primary key", column.as_str()));
                    }
                }
                Constraint::Unique(unique) => {
                    if let Some(column) = unique.columns.iter().find(|c| !columns.contains(*c)) {
                        return Err(missing("unique", column.as_str()));
                    }
                }
                Constraint::ForeignKey(fk) => {
                    if let Some(column) = fk.columns.iter().find(|c| !columns.contains(*c)) {
                        return Err(missing("foreign key", column.as_str()));
                    }

                    let ref_columns = catalog
                        .get(&(fk.referenced_schema.clone(), fk.referenced_table.clone()))
                        .ok_or_else(|| {
                            Error::InvalidSchema(format!(
                                "referenced table not found: {}.{}",
                                fk.referenced_schema, fk.referenced_table
                            ))
                        })?;

                    if let Some(column) = fk
                        .referenced_columns
                        .iter()
                        .find(|c| !ref_columns.contains(*c))
                    {
                        return Err(Error::InvalidSchema(format!(
                            "referenced column not found: {}.{}.{}",
                            fk.referenced_schema, fk.referenced_table, column
                        )));
                    }
                }
                Constraint::Check(_) => {}
            }
        }
    }

    Ok(())
}

/// Every manifest table must exist in the target schema.
pub fn validate_manifest_tables(target: &DatabaseSchema, manifest: &CheckManifest) -> Result<()> {
    for table_ref in manifest.tables() {
        let Some(table) = target.table(table_ref) else {
            return Err(Error::Configuration(format!(
                "check manifest references unknown table {table_ref}"
            )));
        };
        if !table.accepts_checks() {
            return Err(Error::Configuration(format!(
                "check manifest references {table_ref}, which cannot carry CHECK constraints"
            )));
        }
    }
    Ok(())
}

/// Every column a declared spec reads must exist on its table.
pub fn validate_declared_checks(
    target: &DatabaseSchema,
    ctx: &SchemaComparisonContext,
) -> Result<()> {
    for table_ref in ctx.declared_tables() {
        let table = target.table(table_ref).ok_or_else(|| {
            Error::Configuration(format!("checks declared on unknown table {table_ref}"))
        })?;

        for spec in ctx.declared_specs(table_ref) {
            if let Some(column) = spec.columns().into_iter().find(|c| table.column(c).is_none()) {
                return Err(Error::Configuration(format!(
                    "{} on {table_ref} references unknown column {column}",
                    spec.name()
                )));
            }
        }
    }
    Ok(())
}
