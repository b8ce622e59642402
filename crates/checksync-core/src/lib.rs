//! Core contracts for checksync.
//!
//! This crate defines the declarative CHECK constraint model, the normalizer,
//! the per-run comparison context, and the schema snapshot types shared by the
//! introspection, diff, and CLI crates.

pub mod constraints;
pub mod declare;
pub mod error;
pub mod graph;
pub mod normalize;
pub mod redaction;
pub mod registry;
pub mod schema;
pub mod spec;
pub mod validation;

pub use constraints::{
    CheckConstraint, Constraint, FkAction, ForeignKey, Index, PrimaryKey, UniqueConstraint,
};
pub use declare::{CheckDeclarer, CheckManifest};
pub use error::{Error, Result};
pub use graph::creation_order;
pub use normalize::{
    canonical_expression, is_canonical_name, normalize_constraint_name, normalize_identifier,
    normalize_value_list, strip_type_casts,
};
pub use redaction::{RedactedConnection, redact_connection_string};
pub use registry::{ChecksByTable, ExpressionMap, SchemaComparisonContext};
pub use schema::{Column, DatabaseSchema, Schema, Table, TableKind, TableRef};
pub use spec::{CheckSpec, DroppedCheck, EnumCheck, EnumValue, EnumValues, SoftXorCheck};
pub use validation::{validate_declared_checks, validate_manifest_tables, validate_schema};

/// Current schema contract version for `schema.json` artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
