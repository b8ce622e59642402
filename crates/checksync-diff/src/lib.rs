//! Schema comparison and migration rendering.
//!
//! [`compare_schemas`] runs the structural diff and then the CHECK constraint
//! diff for every table; [`render_schema_diff`] turns the result into an
//! ordered batch of idempotent statements.

pub mod comparator;
pub mod platform;

pub use comparator::{Change, CheckDiff, SchemaDiff, TableDiff, compare_schemas};
pub use platform::{
    append_checks_sql, append_diff_checks_sql, render_schema_diff, to_migration_sql,
};
