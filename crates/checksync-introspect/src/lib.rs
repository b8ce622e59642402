//! Database introspection adapters.

pub mod adapter;
pub mod checks;
pub mod options;
pub mod postgres;

pub use adapter::Adapter;
pub use checks::{annotate_schema, checks_from_schema, group_checks, introspect_checks};
pub use options::IntrospectOptions;
pub use postgres::{PostgresAdapter, introspect_postgres, introspect_postgres_with_options};

pub use checksync_core::{ChecksByTable, DatabaseSchema};
