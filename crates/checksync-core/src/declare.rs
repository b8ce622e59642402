//! The declare-constraints hook and its TOML-backed implementation.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::normalize::normalize_identifier;
use crate::schema::TableRef;
use crate::spec::{CheckSpec, EnumValue};

/// Supplies the desired CHECK constraints for a table.
///
/// Invoked once per table while target schema metadata is assembled; push
/// zero or more specs into `out`.
pub trait CheckDeclarer {
    fn declare_checks(&self, table: &TableRef, out: &mut Vec<CheckSpec>) -> Result<()>;
}

impl<F> CheckDeclarer for F
where
    F: Fn(&TableRef, &mut Vec<CheckSpec>) -> Result<()>,
{
    fn declare_checks(&self, table: &TableRef, out: &mut Vec<CheckSpec>) -> Result<()> {
        self(table, out)
    }
}

/// Check declarations read from a TOML manifest.
///
/// ```toml
/// [[table]]
/// schema = "public"
/// name = "invoice"
///
/// [[table.check]]
/// kind = "enum"
/// name = "CHK_INVOICE_STATUS"
/// column = "status"
/// values = ["DRAFT", "ISSUED", "PAID"]
///
/// [[table.check]]
/// kind = "soft_xor"
/// name = "CHK_INVOICE_PARTY"
/// columns = ["customer_id", "supplier_id"]
/// ```
#[derive(Debug, Clone, Default)]
pub struct CheckManifest {
    tables: IndexMap<TableRef, Vec<CheckSpec>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default, rename = "table")]
    tables: Vec<RawTable>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTable {
    #[serde(default = "default_schema")]
    schema: String,
    name: String,
    #[serde(default, rename = "check")]
    checks: Vec<RawCheck>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawCheck {
    Enum {
        name: String,
        column: String,
        values: Vec<EnumValue>,
    },
    SoftXor {
        name: String,
        columns: Vec<String>,
    },
}

fn default_schema() -> String {
    "public".to_string()
}

impl CheckManifest {
    /// Parse a manifest, validating every declaration.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let raw: RawManifest = toml::from_str(source)
            .map_err(|err| Error::Configuration(format!("invalid check manifest: {err}")))?;

        let mut manifest = Self::default();
        for table in raw.tables {
            let table_ref = TableRef::new(
                &normalize_identifier(&table.schema)?,
                &normalize_identifier(&table.name)?,
            );
            // Keep the entry even when it lists no checks: an empty table
            // entry is how a caller asks for every managed check to go.
            manifest.tables.entry(table_ref.clone()).or_default();
            for check in table.checks {
                let spec = match check {
                    RawCheck::Enum {
                        name,
                        column,
                        values,
                    } => CheckSpec::enumeration(&name, &column, values),
                    RawCheck::SoftXor { name, columns } => CheckSpec::soft_xor(&name, columns),
                }
                .map_err(|err| match err {
                    Error::Configuration(message) => {
                        Error::Configuration(format!("{table_ref}: {message}"))
                    }
                    other => other,
                })?;
                manifest.push(&table_ref, spec);
            }
        }

        Ok(manifest)
    }

    /// Load and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|err| {
            Error::Configuration(format!("reading check manifest {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    pub fn push(&mut self, table: &TableRef, spec: CheckSpec) {
        self.tables.entry(table.clone()).or_default().push(spec);
    }

    /// Tables mentioned by the manifest, in file order.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.keys()
    }

    pub fn spec_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

impl CheckDeclarer for CheckManifest {
    fn declare_checks(&self, table: &TableRef, out: &mut Vec<CheckSpec>) -> Result<()> {
        if let Some(specs) = self.tables.get(table) {
            out.extend(specs.iter().cloned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
        [[table]]
        name = "invoice"

        [[table.check]]
        kind = "enum"
        name = "chk_invoice_status"
        column = "status"
        values = ["DRAFT", "ISSUED"]

        [[table.check]]
        kind = "soft_xor"
        name = "CHK_INVOICE_PARTY"
        columns = ["customer_id", "supplier_id"]

        [[table]]
        schema = "billing"
        name = "line_item"

        [[table.check]]
        kind = "enum"
        name = "CHK_LINE_QTY"
        column = "qty"
        values = [1, 2, 3]
    "#;

    #[test]
    fn parses_manifest_in_file_order() {
        let manifest = CheckManifest::from_toml_str(MANIFEST).expect("valid manifest");
        let tables: Vec<String> = manifest.tables().map(ToString::to_string).collect();
        assert_eq!(tables, vec!["public.invoice", "billing.line_item"]);
        assert_eq!(manifest.spec_count(), 3);

        let mut out = Vec::new();
        manifest
            .declare_checks(&TableRef::new("public", "invoice"), &mut out)
            .unwrap();
        let names: Vec<&str> = out.iter().map(CheckSpec::name).collect();
        assert_eq!(names, vec!["CHK_INVOICE_STATUS", "CHK_INVOICE_PARTY"]);
    }

    #[test]
    fn rejects_mixed_value_types() {
        let source = r#"
            [[table]]
            name = "invoice"

            [[table.check]]
            kind = "enum"
            name = "CHK_X"
            column = "status"
            values = ["a", 1]
        "#;
        let err = CheckManifest::from_toml_str(source).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("public.invoice"));
    }

    #[test]
    fn rejects_unknown_kinds() {
        let source = r#"
            [[table]]
            name = "invoice"

            [[table.check]]
            kind = "regex"
            name = "CHK_X"
        "#;
        assert!(matches!(
            CheckManifest::from_toml_str(source),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn empty_table_entry_is_kept() {
        let manifest = CheckManifest::from_toml_str("[[table]]\nname = \"invoice\"\n").unwrap();
        assert_eq!(manifest.tables().count(), 1);
        assert_eq!(manifest.spec_count(), 0);
    }
}
