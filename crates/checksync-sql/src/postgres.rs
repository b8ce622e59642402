//! PostgreSQL dialect.

use checksync_core::{
    CheckSpec, Column, Constraint, EnumValues, Error, ForeignKey, Index, Result, Table, TableRef,
    is_canonical_name,
};

use crate::generator::{
    CheckGenerator, IntrospectedCheck, RawCheckRow, StructureGenerator, strip_wrapping_parens,
};

const INTROSPECT_CHECKS_SQL: &str = r#"
SELECT
  nsp.nspname::text AS schema_name,
  rel.relname::text AS table_name,
  con.conname::text AS constraint_name,
  pg_get_constraintdef(con.oid, true) AS definition
FROM pg_constraint con
JOIN pg_class rel ON rel.oid = con.conrelid
JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace
WHERE con.contype = 'c'
  AND nsp.nspname NOT IN ('pg_catalog', 'information_schema', 'pg_toast')
  AND nsp.nspname NOT LIKE 'pg_temp_%'
  AND nsp.nspname NOT LIKE 'pg_toast_temp_%'
ORDER BY nsp.nspname, rel.relname, con.conname
"#;

const DOLLAR_TAG: &str = "checksync";

/// PostgreSQL implementation of [`CheckGenerator`] and [`StructureGenerator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGenerator;

impl PostgresGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.table))
}

fn quoted_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Pick a dollar-quote tag that does not occur in `body`.
fn dollar_tag(body: &str) -> String {
    let mut tag = format!("${DOLLAR_TAG}$");
    let mut suffix = 0u32;
    while body.contains(&tag) {
        suffix += 1;
        tag = format!("${DOLLAR_TAG}{suffix}$");
    }
    tag
}

fn strip_keyword_prefix<'a>(sql: &'a str, keyword: &str) -> &'a str {
    match sql.get(..keyword.len()) {
        Some(head) if head.eq_ignore_ascii_case(keyword) => sql[keyword.len()..].trim_start(),
        _ => sql,
    }
}

fn strip_keyword_suffix<'a>(sql: &'a str, keyword: &str) -> &'a str {
    let Some(split) = sql.len().checked_sub(keyword.len()) else {
        return sql;
    };
    match sql.get(split..) {
        Some(tail) if tail.eq_ignore_ascii_case(keyword) => sql[..split].trim_end(),
        _ => sql,
    }
}

impl CheckGenerator for PostgresGenerator {
    fn dialect(&self) -> &'static str {
        "postgres"
    }

    fn build_expression_sql(&self, spec: &CheckSpec) -> Result<String> {
        match spec {
            CheckSpec::Enum(check) => {
                let items = match check.values() {
                    EnumValues::Text(values) => values
                        .iter()
                        .map(|value| format!("{}::text", quote_literal(value)))
                        .collect::<Vec<_>>(),
                    EnumValues::Int(values) => {
                        values.iter().map(ToString::to_string).collect::<Vec<_>>()
                    }
                };
                Ok(format!(
                    "{} = ANY(ARRAY[{}])",
                    quote_ident(check.column()),
                    items.join(",")
                ))
            }
            CheckSpec::SoftXor(check) => {
                let columns = check
                    .columns()
                    .iter()
                    .map(|column| quote_ident(column))
                    .collect::<Vec<_>>();
                Ok(format!("num_nonnulls({}) <= 1", columns.join(",")))
            }
            CheckSpec::Dropped(_) => Err(Error::ContractViolation(format!(
                "tombstone {} has no predicate to render",
                spec.name()
            ))),
        }
    }

    fn build_add_check_sql(&self, table: &TableRef, spec: &CheckSpec) -> Result<String> {
        let expression = self.build_expression_sql(spec)?;
        Ok(guarded_add_constraint(
            table,
            spec.name(),
            &format!("CHECK ({expression})"),
        ))
    }

    fn build_drop_check_sql(&self, table: &TableRef, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            qualified(table),
            quote_ident(name)
        )
    }

    fn build_introspection_sql(&self) -> &'static str {
        INTROSPECT_CHECKS_SQL
    }

    fn map_introspection_row(&self, row: RawCheckRow) -> Option<IntrospectedCheck> {
        if !is_canonical_name(&row.constraint_name) {
            tracing::debug!(
                event = "unmanaged_check_skipped",
                schema = %row.schema_name,
                table = %row.table_name,
                name = %row.constraint_name
            );
            return None;
        }

        let definition = row.definition.trim();
        let definition = strip_keyword_prefix(definition, "CHECK");
        let definition = strip_keyword_suffix(definition, "NOT VALID");
        let expression = strip_wrapping_parens(definition).to_string();

        Some(IntrospectedCheck {
            table: TableRef::new(&row.schema_name, &row.table_name),
            name: row.constraint_name,
            expression,
        })
    }
}

impl StructureGenerator for PostgresGenerator {
    fn create_table_sql(&self, table_ref: &TableRef, table: &Table) -> String {
        let mut lines: Vec<String> = table.columns.iter().map(column_definition).collect();

        if let Some(pk) = table.primary_key() {
            let constraint = pk
                .name
                .as_deref()
                .map(|name| format!("CONSTRAINT {} ", quote_ident(name)))
                .unwrap_or_default();
            lines.push(format!("{constraint}PRIMARY KEY ({})", quoted_list(&pk.columns)));
        }

        for constraint in &table.constraints {
            if let Constraint::Unique(unique) = constraint {
                let prefix = unique
                    .name
                    .as_deref()
                    .map(|name| format!("CONSTRAINT {} ", quote_ident(name)))
                    .unwrap_or_default();
                lines.push(format!("{prefix}UNIQUE ({})", quoted_list(&unique.columns)));
            }
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
            qualified(table_ref),
            lines.join(",\n  ")
        )
    }

    fn drop_table_sql(&self, table: &TableRef) -> String {
        format!("DROP TABLE IF EXISTS {};", qualified(table))
    }

    fn add_column_sql(&self, table: &TableRef, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {};",
            qualified(table),
            column_definition(column)
        )
    }

    fn drop_column_sql(&self, table: &TableRef, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
            qualified(table),
            quote_ident(column)
        )
    }

    fn alter_column_type_sql(&self, table: &TableRef, column: &str, data_type: &str) -> String {
        let ident = quote_ident(column);
        format!(
            "ALTER TABLE {} ALTER COLUMN {ident} TYPE {data_type} USING {ident}::{data_type};",
            qualified(table)
        )
    }

    fn alter_column_nullable_sql(&self, table: &TableRef, column: &str, nullable: bool) -> String {
        let action = if nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {action};",
            qualified(table),
            quote_ident(column)
        )
    }

    fn alter_column_default_sql(
        &self,
        table: &TableRef,
        column: &str,
        default: Option<&str>,
    ) -> String {
        let action = match default {
            Some(default) => format!("SET DEFAULT {default}"),
            None => "DROP DEFAULT".to_string(),
        };
        format!(
            "ALTER TABLE {} ALTER COLUMN {} {action};",
            qualified(table),
            quote_ident(column)
        )
    }

    fn add_index_sql(&self, _table: &TableRef, index: &Index) -> String {
        let definition = index.definition.trim().trim_end_matches(';');
        let guarded = if let Some(rest) = definition.strip_prefix("CREATE UNIQUE INDEX ") {
            format!("CREATE UNIQUE INDEX IF NOT EXISTS {rest}")
        } else if let Some(rest) = definition.strip_prefix("CREATE INDEX ") {
            format!("CREATE INDEX IF NOT EXISTS {rest}")
        } else {
            definition.to_string()
        };
        format!("{guarded};")
    }

    fn drop_index_sql(&self, table: &TableRef, name: &str) -> String {
        format!(
            "DROP INDEX IF EXISTS {}.{};",
            quote_ident(&table.schema),
            quote_ident(name)
        )
    }

    fn add_foreign_key_sql(&self, table: &TableRef, fk: &ForeignKey) -> String {
        let definition = format!(
            "FOREIGN KEY ({}) REFERENCES {}.{} ({}) ON UPDATE {} ON DELETE {}",
            quoted_list(&fk.columns),
            quote_ident(&fk.referenced_schema),
            quote_ident(&fk.referenced_table),
            quoted_list(&fk.referenced_columns),
            fk.on_update.as_sql(),
            fk.on_delete.as_sql()
        );
        guarded_add_constraint(table, &fk.name, &definition)
    }

    fn drop_foreign_key_sql(&self, table: &TableRef, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            qualified(table),
            quote_ident(name)
        )
    }
}

/// `ALTER TABLE .. ADD CONSTRAINT` inside a `DO` block that skips the add
/// when `pg_constraint` already holds `name` on `table`.
fn guarded_add_constraint(table: &TableRef, name: &str, definition: &str) -> String {
    let body = format!(
        "BEGIN\n  IF NOT EXISTS (\n    SELECT 1\n    FROM pg_constraint con\n    \
         JOIN pg_class rel ON rel.oid = con.conrelid\n    \
         JOIN pg_namespace nsp ON nsp.oid = rel.relnamespace\n    \
         WHERE nsp.nspname = {schema}\n      AND rel.relname = {table_name}\n      \
         AND con.conname = {name_literal}\n  ) THEN\n    \
         ALTER TABLE {qualified} ADD CONSTRAINT {ident} {definition};\n  \
         END IF;\nEND\n",
        schema = quote_literal(&table.schema),
        table_name = quote_literal(&table.table),
        name_literal = quote_literal(name),
        qualified = qualified(table),
        ident = quote_ident(name),
    );
    let tag = dollar_tag(&body);
    format!("DO {tag}\n{body}{tag};")
}

fn column_definition(column: &Column) -> String {
    let mut definition = format!("{} {}", quote_ident(&column.name), column.data_type);
    if !column.is_nullable {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        definition.push_str(" DEFAULT ");
        definition.push_str(default);
    }
    definition
}
