//! Dialect-specific SQL rendering for checksync.
//!
//! A dialect turns [`CheckSpec`](checksync_core::CheckSpec) values into
//! predicate text and guarded DDL, knows how to ask its catalog for existing
//! CHECK constraints, and renders the structural statements the platform
//! layer emits around them.

pub mod evaluate;
pub mod generator;
pub mod postgres;

pub use evaluate::{CheckContext, CheckOutcome, SqlValue, evaluate_check};
pub use generator::{CheckGenerator, Dialect, IntrospectedCheck, RawCheckRow, StructureGenerator};
pub use postgres::{PostgresGenerator, quote_ident, quote_literal};
