//! Per-run storage for declared and introspected CHECK constraints.

use indexmap::IndexMap;

use crate::declare::CheckDeclarer;
use crate::error::{Error, Result};
use crate::normalize::is_canonical_name;
use crate::schema::{DatabaseSchema, TableRef};
use crate::spec::CheckSpec;

/// Constraint name -> raw predicate text, in catalog order.
pub type ExpressionMap = IndexMap<String, String>;

/// Introspected expressions grouped by table.
pub type ChecksByTable = IndexMap<TableRef, ExpressionMap>;

/// Declared (desired) and introspected (existing) CHECK constraints for one
/// generation run.
///
/// Create one per run and pass it down the call chain. Nothing in here
/// outlives the run.
#[derive(Debug, Default)]
pub struct SchemaComparisonContext {
    declared: IndexMap<TableRef, IndexMap<String, CheckSpec>>,
    existing: ChecksByTable,
}

impl SchemaComparisonContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a desired spec for `table`, keyed by its canonical name.
    ///
    /// Re-declaring a name replaces the earlier spec in place. Tombstones and
    /// specs that fail validation are rejected.
    pub fn append_declared_spec(&mut self, table: &TableRef, spec: CheckSpec) -> Result<()> {
        if spec.is_tombstone() {
            return Err(Error::ContractViolation(format!(
                "tombstone {} cannot be declared on {table}",
                spec.name()
            )));
        }
        spec.validate()?;

        let name = spec.name().to_string();
        let specs = self.declared.entry(table.clone()).or_default();
        if specs.insert(name.clone(), spec).is_some() {
            tracing::debug!(event = "check_redeclared", table = %table, name = %name);
        }
        Ok(())
    }

    /// Declared specs for `table` in declaration order.
    pub fn declared_specs(&self, table: &TableRef) -> Vec<&CheckSpec> {
        self.declared
            .get(table)
            .map(|specs| specs.values().collect())
            .unwrap_or_default()
    }

    /// Tables with at least one declared spec.
    pub fn declared_tables(&self) -> impl Iterator<Item = &TableRef> {
        self.declared
            .iter()
            .filter(|(_, specs)| !specs.is_empty())
            .map(|(table, _)| table)
    }

    /// Rebuild the declared side by invoking `declarer` once per table of the
    /// target schema. Returns the number of specs collected.
    pub fn collect_declared(
        &mut self,
        target: &DatabaseSchema,
        declarer: &dyn CheckDeclarer,
    ) -> Result<usize> {
        self.declared.clear();

        let mut total = 0;
        for (table_ref, table) in target.tables() {
            if !table.accepts_checks() {
                continue;
            }

            let mut specs = Vec::new();
            declarer.declare_checks(&table_ref, &mut specs)?;
            total += specs.len();
            for spec in specs {
                self.append_declared_spec(&table_ref, spec)?;
            }
        }

        tracing::debug!(event = "declared_checks_collected", count = total);
        Ok(total)
    }

    /// Replace the entire existing side with a fresh introspection result.
    ///
    /// Every name must already be canonical; unmanaged names are filtered by
    /// the dialect row mapper before they get here.
    pub fn register_introspected_expressions(&mut self, checks: ChecksByTable) -> Result<()> {
        for (table, expressions) in &checks {
            if let Some(name) = expressions.keys().find(|name| !is_canonical_name(name)) {
                return Err(Error::ContractViolation(format!(
                    "introspected constraint {name:?} on {table} is not canonical"
                )));
            }
        }

        let count: usize = checks.values().map(IndexMap::len).sum();
        self.existing = checks;
        tracing::debug!(event = "introspected_checks_registered", count = count);
        Ok(())
    }

    /// Introspected expressions for `table`, if any were found.
    pub fn introspected_expressions(&self, table: &TableRef) -> Option<&ExpressionMap> {
        self.existing.get(table).filter(|map| !map.is_empty())
    }
}
