use checksync_core::{CheckSpec, Column, ForeignKey, Index, Result, Table, TableRef};

/// One row of the dialect's CHECK constraint catalog query, as returned by
/// the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCheckRow {
    pub schema_name: String,
    pub table_name: String,
    pub constraint_name: String,
    /// Definition text as the catalog prints it, dialect quirks included.
    pub definition: String,
}

/// A managed CHECK constraint read back from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntrospectedCheck {
    pub table: TableRef,
    pub name: String,
    /// Bare predicate, without the `CHECK` keyword or dialect suffixes.
    pub expression: String,
}

/// Renders CHECK predicates and the DDL that converges them.
pub trait CheckGenerator {
    /// Dialect identifier (e.g. `postgres`).
    fn dialect(&self) -> &'static str;

    /// Predicate text for `spec`. Tombstones have no predicate and fail with
    /// a contract violation.
    fn build_expression_sql(&self, spec: &CheckSpec) -> Result<String>;

    /// Statement adding `spec` to `table`, guarded so it is a no-op when a
    /// constraint with the same name already exists.
    fn build_add_check_sql(&self, table: &TableRef, spec: &CheckSpec) -> Result<String>;

    /// Statement removing the named constraint, a no-op when it is absent.
    fn build_drop_check_sql(&self, table: &TableRef, name: &str) -> String;

    /// Single catalog query listing every CHECK constraint.
    fn build_introspection_sql(&self) -> &'static str;

    /// Strip dialect quirks from a catalog row. Returns `None` for
    /// constraints this tool does not manage.
    fn map_introspection_row(&self, row: RawCheckRow) -> Option<IntrospectedCheck>;
}

/// Renders the structural statements a schema diff carries.
pub trait StructureGenerator {
    /// `CREATE TABLE` with columns, primary key and unique constraints.
    /// Foreign keys and CHECK constraints are emitted separately.
    fn create_table_sql(&self, table_ref: &TableRef, table: &Table) -> String;
    fn drop_table_sql(&self, table: &TableRef) -> String;
    fn add_column_sql(&self, table: &TableRef, column: &Column) -> String;
    fn drop_column_sql(&self, table: &TableRef, column: &str) -> String;
    fn alter_column_type_sql(&self, table: &TableRef, column: &str, data_type: &str) -> String;
    fn alter_column_nullable_sql(&self, table: &TableRef, column: &str, nullable: bool) -> String;
    fn alter_column_default_sql(
        &self,
        table: &TableRef,
        column: &str,
        default: Option<&str>,
    ) -> String;
    fn add_index_sql(&self, table: &TableRef, index: &Index) -> String;
    fn drop_index_sql(&self, table: &TableRef, name: &str) -> String;
    fn add_foreign_key_sql(&self, table: &TableRef, fk: &ForeignKey) -> String;
    fn drop_foreign_key_sql(&self, table: &TableRef, name: &str) -> String;
}

/// A complete SQL dialect.
pub trait Dialect: CheckGenerator + StructureGenerator {}

impl<T> Dialect for T where T: CheckGenerator + StructureGenerator {}

/// Remove parentheses that wrap the whole of `sql`, repeatedly.
///
/// `((a) OR (b))` becomes `(a) OR (b)`; `(a) OR (b)` is left alone because its
/// first parenthesis closes before the end. Parentheses inside single-quoted
/// literals are ignored.
pub(crate) fn strip_wrapping_parens(sql: &str) -> &str {
    let mut current = sql.trim();
    while current.starts_with('(') && closing_paren(current) == Some(current.len() - 1) {
        current = current[1..current.len() - 1].trim();
    }
    current
}

/// Byte offset of the parenthesis closing the one at offset 0.
fn closing_paren(sql: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_literal = false;
    for (offset, c) in sql.char_indices() {
        match c {
            '\'' => in_literal = !in_literal,
            '(' if !in_literal => depth += 1,
            ')' if !in_literal => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}
