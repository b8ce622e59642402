use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constraints::{CheckConstraint, Constraint, ForeignKey, Index, PrimaryKey};

/// Top-level schema snapshot for a database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Contract version for this schema format.
    pub schema_version: String,
    /// Database engine identifier (e.g. `postgres`).
    pub engine: String,
    /// Database name when available.
    #[serde(default)]
    pub database: Option<String>,
    /// Namespaces captured from the database.
    pub schemas: Vec<Schema>,
}

impl DatabaseSchema {
    /// Empty snapshot for `engine` at the current contract version.
    pub fn empty(engine: &str) -> Self {
        Self {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            engine: engine.to_string(),
            database: None,
            schemas: Vec::new(),
        }
    }

    /// Iterate over every table together with its qualified reference.
    pub fn tables(&self) -> impl Iterator<Item = (TableRef, &Table)> {
        self.schemas.iter().flat_map(|schema| {
            schema
                .tables
                .iter()
                .map(move |table| (TableRef::new(&schema.name, &table.name), table))
        })
    }

    pub fn table(&self, table_ref: &TableRef) -> Option<&Table> {
        self.schemas
            .iter()
            .find(|schema| schema.name == table_ref.schema)
            .and_then(|schema| schema.tables.iter().find(|t| t.name == table_ref.table))
    }

    pub fn table_mut(&mut self, table_ref: &TableRef) -> Option<&mut Table> {
        self.schemas
            .iter_mut()
            .find(|schema| schema.name == table_ref.schema)
            .and_then(|schema| schema.tables.iter_mut().find(|t| t.name == table_ref.table))
    }
}

/// A Postgres namespace containing tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

/// A table-like object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    #[serde(default)]
    pub kind: TableKind,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TableKind::Table,
            columns: Vec::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::PrimaryKey(pk) => Some(pk),
            _ => None,
        })
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    pub fn check_constraints(&self) -> impl Iterator<Item = &CheckConstraint> {
        self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::Check(check) => Some(check),
            _ => None,
        })
    }

    /// Only ordinary and partitioned tables carry CHECK constraints we manage.
    pub fn accepts_checks(&self) -> bool {
        matches!(self.kind, TableKind::Table | TableKind::PartitionedTable)
    }
}

/// Kind of table represented in the catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
    Other(String),
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Formatted type as Postgres prints it (e.g. `character varying(255)`).
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub is_nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// Schema-qualified table reference used as the registry key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: &str, table: &str) -> Self {
        Self {
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}
