//! Versioned table schemas.
//!
//! A [`TableSchema`] is the ordered list of columns of a persisted table plus
//! a version counter. It is stored inside the table node, so opening a table
//! never needs to inspect rows to learn its layout. Adding columns produces a
//! new schema with the next version; existing columns never change type.

use std::fmt;

use cuds_core::{AttributeValue, Cuba, DataContainer, ScalarKind, ValueType};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Name of the coordinate column of lattice tables.
pub const NAME_COLUMN: &str = "NAME";

/// Identifier of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnName {
    /// The lattice coordinate column.
    Name,
    /// Entity id, stored as two 64-bit halves.
    Uid,
    /// Position of a point or particle.
    Coordinates,
    /// Ids of the entities an element or bond refers to, zero padded.
    Members,
    /// Number of valid ids in [`ColumnName::Members`].
    MemberCount,
    /// Length, area or volume of a mesh element.
    Measure,
    /// An attribute column.
    Key(Cuba),
}

impl ColumnName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => NAME_COLUMN,
            Self::Uid => "UID",
            Self::Coordinates => "COORDINATES",
            Self::Members => "MEMBERS",
            Self::MemberCount => "MEMBER_COUNT",
            Self::Measure => "MEASURE",
            Self::Key(key) => key.name(),
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: ColumnName,
    pub value_type: ValueType,
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: ColumnName, value_type: ValueType) -> Self {
        Self { name, value_type }
    }
}

/// Ordered, versioned column layout of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    version: u32,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    /// Version 1 of a schema with the given columns.
    #[must_use]
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self {
            version: 1,
            columns,
        }
    }

    /// Initial schema of a lattice table: only the `NAME` column, holding
    /// `dimensions` 32-bit integers.
    #[must_use]
    pub fn lattice(dimensions: usize) -> Self {
        Self::new(vec![ColumnDef::new(
            ColumnName::Name,
            ValueType::vector(ScalarKind::Int32, dimensions),
        )])
    }

    /// Fixed schema reserving one column per CUBA key at its canonical type,
    /// in key index order.
    #[must_use]
    pub fn all_keys() -> Self {
        Self::new(
            Cuba::ALL
                .iter()
                .map(|&key| ColumnDef::new(ColumnName::Key(key), key.canonical_type()))
                .collect(),
        )
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// The definition of `name`, if the schema has that column.
    #[must_use]
    pub fn column(&self, name: ColumnName) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Position of `name` among all columns.
    #[must_use]
    pub fn position(&self, name: ColumnName) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Attribute keys in column order.
    pub fn keys(&self) -> impl Iterator<Item = Cuba> + '_ {
        self.columns.iter().filter_map(|c| match c.name {
            ColumnName::Key(key) => Some(key),
            _ => None,
        })
    }

    /// Presence bit of `key`: its position among attribute columns.
    #[must_use]
    pub fn presence_bit(&self, key: Cuba) -> Option<u32> {
        self.keys()
            .position(|k| k == key)
            .and_then(|p| u32::try_from(p).ok())
    }

    /// Number of attribute columns.
    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.keys().count()
    }

    /// Columns that must be added before the listed keys of `data` can be
    /// written.
    ///
    /// New columns take the type of the value seen now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaConflict`] if a key already has a column
    /// of a different type.
    pub fn missing_columns(
        &self,
        data: &DataContainer,
        keys: &[Cuba],
    ) -> StoreResult<Vec<ColumnDef>> {
        let mut missing: Vec<ColumnDef> = Vec::new();
        for &key in keys {
            let Some(value) = data.value(key) else {
                continue;
            };
            let name = ColumnName::Key(key);
            match self.column(name) {
                Some(def) => check_type(def, value)?,
                None if missing.iter().all(|c| c.name != name) => {
                    missing.push(ColumnDef::new(name, value.value_type()));
                }
                None => {}
            }
        }
        Ok(missing)
    }

    /// The next schema version with `added` appended.
    #[must_use]
    pub fn extended(&self, added: &[ColumnDef]) -> Self {
        let mut columns = self.columns.clone();
        columns.extend_from_slice(added);
        Self {
            version: self.version + 1,
            columns,
        }
    }
}

/// Check that `value` matches the type of column `def`.
///
/// # Errors
///
/// Returns [`StoreError::SchemaConflict`] on mismatch.
pub fn check_type(def: &ColumnDef, value: &AttributeValue) -> StoreResult<()> {
    let found = value.value_type();
    if found == def.value_type {
        Ok(())
    } else {
        Err(StoreError::SchemaConflict {
            column: def.name.to_string(),
            expected: def.value_type,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_schema_has_only_name() {
        let schema = TableSchema::lattice(3);
        assert_eq!(schema.version(), 1);
        assert_eq!(schema.columns().len(), 1);
        assert_eq!(schema.attribute_count(), 0);
        assert_eq!(
            schema.column(ColumnName::Name).unwrap().value_type,
            ValueType::vector(ScalarKind::Int32, 3)
        );
    }

    #[test]
    fn test_missing_columns_use_first_value_type() {
        let schema = TableSchema::lattice(2);
        let mut data = DataContainer::new();
        data.insert(Cuba::Velocity, [1.0, 2.0]);
        data.insert(Cuba::ChemicalSpecie, "H2O");

        let missing = schema
            .missing_columns(&data, &[Cuba::Velocity, Cuba::ChemicalSpecie, Cuba::Mass])
            .unwrap();
        assert_eq!(
            missing,
            vec![
                ColumnDef::new(
                    ColumnName::Key(Cuba::Velocity),
                    ValueType::vector(ScalarKind::Float64, 2)
                ),
                ColumnDef::new(
                    ColumnName::Key(Cuba::ChemicalSpecie),
                    ValueType::scalar(ScalarKind::Str)
                ),
            ]
        );
    }

    #[test]
    fn test_extended_bumps_version_and_keeps_order() {
        let schema = TableSchema::lattice(2);
        let next = schema.extended(&[
            ColumnDef::new(
                ColumnName::Key(Cuba::Density),
                ValueType::scalar(ScalarKind::Float64),
            ),
            ColumnDef::new(
                ColumnName::Key(Cuba::Label),
                ValueType::scalar(ScalarKind::Int32),
            ),
        ]);
        assert_eq!(next.version(), 2);
        assert_eq!(next.position(ColumnName::Name), Some(0));
        assert_eq!(next.presence_bit(Cuba::Density), Some(0));
        assert_eq!(next.presence_bit(Cuba::Label), Some(1));
        assert_eq!(next.presence_bit(Cuba::Mass), None);
    }

    #[test]
    fn test_conflicting_type_is_rejected() {
        let schema = TableSchema::lattice(2).extended(&[ColumnDef::new(
            ColumnName::Key(Cuba::Density),
            ValueType::scalar(ScalarKind::Float64),
        )]);
        let mut data = DataContainer::new();
        data.insert(Cuba::Density, 3);
        let err = schema.missing_columns(&data, &[Cuba::Density]).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));
    }

    #[test]
    fn test_all_keys_schema() {
        let schema = TableSchema::all_keys();
        assert_eq!(schema.attribute_count(), Cuba::COUNT);
        for &key in Cuba::ALL {
            assert_eq!(schema.presence_bit(key), u32::try_from(key.index()).ok());
        }
    }
}
