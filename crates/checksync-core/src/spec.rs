//! Declarative CHECK constraint model.
//!
//! [`CheckSpec`] is a closed set of constraint kinds. Every constructor runs
//! the normalizer, so a spec obtained through this API is always canonical.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalize::{
    is_canonical_name, normalize_constraint_name, normalize_identifier, normalize_value_list,
};

/// A single scalar accepted in an enum value list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnumValue {
    Int(i64),
    Text(String),
}

impl From<&str> for EnumValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EnumValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for EnumValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for EnumValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

/// A normalized, non-empty, type-homogeneous enum value list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "items", rename_all = "snake_case")]
pub enum EnumValues {
    Text(Vec<String>),
    Int(Vec<i64>),
}

impl EnumValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(values) => values.len(),
            Self::Int(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// "`column`'s value must be one of `values`."
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnumCheck {
    name: String,
    column: String,
    values: EnumValues,
}

impl EnumCheck {
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn values(&self) -> &EnumValues {
        &self.values
    }

    pub fn is_string_typed(&self) -> bool {
        matches!(self.values, EnumValues::Text(_))
    }
}

/// "At most one of `columns` is non-null."
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SoftXorCheck {
    name: String,
    columns: Vec<String>,
}

impl SoftXorCheck {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Tombstone: the constraint with this name must be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedCheck {
    name: String,
}

/// Declared or derived CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckSpec {
    Enum(EnumCheck),
    SoftXor(SoftXorCheck),
    Dropped(DroppedCheck),
}

impl CheckSpec {
    /// Build an enum check. Fails on an invalid name or column, or on an
    /// empty or mixed-type value list.
    pub fn enumeration<I, V>(name: &str, column: &str, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<EnumValue>,
    {
        let raw: Vec<EnumValue> = values.into_iter().map(Into::into).collect();
        Ok(Self::Enum(EnumCheck {
            name: normalize_constraint_name(name)?,
            column: normalize_identifier(column)?,
            values: normalize_value_list(&raw)?,
        }))
    }

    /// Build a soft-xor check over two or more distinct columns.
    pub fn soft_xor<I, S>(name: &str, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = normalize_constraint_name(name)?;
        let columns = columns
            .into_iter()
            .map(|column| normalize_identifier(column.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        if columns.len() < 2 {
            return Err(Error::Configuration(format!(
                "soft-xor check {name} needs at least two columns, got {}",
                columns.len()
            )));
        }

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = columns.iter().find(|column| !seen.insert(column.as_str())) {
            return Err(Error::Configuration(format!(
                "soft-xor check {name} lists column {duplicate} more than once"
            )));
        }

        Ok(Self::SoftXor(SoftXorCheck { name, columns }))
    }

    /// Build a removal tombstone.
    pub fn dropped(name: &str) -> Result<Self> {
        Ok(Self::Dropped(DroppedCheck {
            name: normalize_constraint_name(name)?,
        }))
    }

    /// Canonical constraint name.
    pub fn name(&self) -> &str {
        match self {
            Self::Enum(check) => &check.name,
            Self::SoftXor(check) => &check.name,
            Self::Dropped(check) => &check.name,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Dropped(_))
    }

    /// A tombstone carrying this spec's name.
    pub fn tombstone(&self) -> Self {
        Self::Dropped(DroppedCheck {
            name: self.name().to_string(),
        })
    }

    /// Tombstone for an already-canonical name, as read back from the catalog.
    pub fn tombstone_for(name: &str) -> Result<Self> {
        if !is_canonical_name(name) {
            return Err(Error::ContractViolation(format!(
                "tombstone name {name:?} is not canonical"
            )));
        }
        Ok(Self::Dropped(DroppedCheck {
            name: name.to_string(),
        }))
    }

    /// Columns the predicate reads. Empty for tombstones.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Enum(check) => vec![check.column.as_str()],
            Self::SoftXor(check) => check.columns.iter().map(String::as_str).collect(),
            Self::Dropped(_) => Vec::new(),
        }
    }

    /// Re-check every structural invariant.
    ///
    /// Specs built through the constructors always pass; this guards the
    /// registry boundary against values assembled any other way.
    pub fn validate(&self) -> Result<()> {
        let violation = |message: String| Err(Error::ContractViolation(message));

        if !is_canonical_name(self.name()) {
            return violation(format!("constraint name {:?} is not canonical", self.name()));
        }

        match self {
            Self::Enum(check) => {
                if normalize_identifier(&check.column).ok().as_deref() != Some(check.column.as_str())
                {
                    return violation(format!(
                        "{}: column {:?} is not canonical",
                        check.name, check.column
                    ));
                }
                if check.values.is_empty() {
                    return violation(format!("{}: enum value list is empty", check.name));
                }
            }
            Self::SoftXor(check) => {
                let distinct: BTreeSet<&str> = check.columns.iter().map(String::as_str).collect();
                if check.columns.len() < 2 || distinct.len() != check.columns.len() {
                    return violation(format!(
                        "{}: soft-xor needs two or more distinct columns",
                        check.name
                    ));
                }
            }
            Self::Dropped(_) => {}
        }

        Ok(())
    }
}
