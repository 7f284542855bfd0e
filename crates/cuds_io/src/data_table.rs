//! Append-only table of attribute containers.
//!
//! Unlike lattice tables, a [`DataContainerTable`] never migrates: its schema
//! reserves one column per CUBA key at the key's canonical type, and the
//! presence mask is 64 bits wide from the start, with bit `b` belonging to
//! the key of index `b`.

use cuds_core::{CudsError, DataContainer};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::lattice::{MASK_NODE, TABLE_NODE};
use crate::mask::{MaskWidth, PresenceMask};
use crate::path::NodePath;
use crate::schema::{ColumnName, TableSchema};
use crate::store::{StoreHandle, StoredNode};
use crate::table::{Table, check_cell};

/// Handle to a persisted data container table.
#[derive(Debug, Clone)]
pub struct DataContainerTable {
    store: StoreHandle,
    name: String,
    table_path: NodePath,
    mask_path: NodePath,
}

impl DataContainerTable {
    /// Open the table in `group`, creating an empty one if needed.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn create_or_open(store: &StoreHandle, group: &NodePath) -> StoreResult<Self> {
        let table = Self {
            store: store.clone(),
            name: group.name().unwrap_or_default().to_string(),
            table_path: group.join(TABLE_NODE),
            mask_path: group.join(MASK_NODE),
        };
        if store.has_node(&table.table_path)? {
            debug!(table = %table.name, "opened data container table");
            return Ok(table);
        }
        store.with(|s| {
            s.create_group(group)?;
            s.create_node(
                &table.table_path,
                &StoredNode::Table(Table::new(TableSchema::all_keys(), 0)),
            )?;
            s.create_node(
                &table.mask_path,
                &StoredNode::Mask(PresenceMask::zeroed(MaskWidth::W64, 0)),
            )
        })?;
        info!(table = %table.name, "created data container table");
        Ok(table)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append `container` as a new row and return its index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaConflict`] if a value does not have its
    /// key's canonical type, or [`StoreError::StringTooLong`]. Nothing is
    /// written in either case.
    pub fn append(&mut self, container: &DataContainer) -> StoreResult<usize> {
        let mut table = self.store.read_table(&self.table_path)?;
        let mut mask = self.store.read_mask(&self.mask_path)?;

        let bits = presence_bits(table.schema(), container)?;
        let row = table.push_row();
        for (key, value) in container.iter() {
            table.write(row, ColumnName::Key(key), value)?;
        }
        mask.push(bits)?;

        self.store
            .flush_node(&self.table_path, &StoredNode::Table(table))?;
        self.store.flush_node(&self.mask_path, &StoredNode::Mask(mask))?;
        debug!(table = %self.name, row, keys = container.len(), "appended row");
        Ok(row)
    }

    /// Read back the container stored at `row`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error past the last row.
    pub fn get(&self, row: usize) -> StoreResult<DataContainer> {
        let table = self.store.read_table(&self.table_path)?;
        let mask = self.store.read_mask(&self.mask_path)?;
        container_at(&table, &mask, row)
    }

    /// Number of rows.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.store.read_mask(&self.mask_path)?.len())
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate over all rows of a snapshot taken now.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter(&self) -> StoreResult<impl Iterator<Item = StoreResult<DataContainer>>> {
        let table = self.store.read_table(&self.table_path)?;
        let mask = self.store.read_mask(&self.mask_path)?;
        Ok((0..mask.len()).map(move |row| container_at(&table, &mask, row)))
    }
}

/// Check every value of `container` against its reserved column and return
/// the presence bits of its keys.
pub(crate) fn presence_bits(schema: &TableSchema, container: &DataContainer) -> StoreResult<u64> {
    let mut bits = 0u64;
    for (key, value) in container.iter() {
        let def = schema
            .column(ColumnName::Key(key))
            .ok_or_else(|| StoreError::Corrupt(format!("no column for {key}")))?;
        check_cell(def, value)?;
        bits |= 1 << key.index();
    }
    Ok(bits)
}

/// The container stored at `row` of a table with one reserved column per key.
pub(crate) fn container_at(
    table: &Table,
    mask: &PresenceMask,
    row: usize,
) -> StoreResult<DataContainer> {
    let bits = mask
        .get(row)
        .ok_or_else(|| CudsError::not_found("row", row))?;
    let mut data = DataContainer::new();
    for key in table.schema().keys() {
        if bits & (1 << key.index()) != 0 {
            data.insert(key, table.read(row, ColumnName::Key(key))?);
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use cuds_core::{AttributeValue, Cuba};

    use super::*;
    use crate::store::MemoryStore;

    fn table() -> DataContainerTable {
        let store = StoreHandle::new(MemoryStore::new());
        DataContainerTable::create_or_open(&store, &NodePath::parse("/data_container/params"))
            .unwrap()
    }

    #[test]
    fn test_append_and_get() {
        let mut table = table();
        let mut first = DataContainer::new();
        first.insert(Cuba::Velocity, [1.0, 2.0, 3.0]);
        first.insert(Cuba::NumberOfTimeSteps, 100i64);
        let mut second = DataContainer::new();
        second.insert(Cuba::ChemicalSpecie, "Na+");

        assert_eq!(table.append(&first).unwrap(), 0);
        assert_eq!(table.append(&second).unwrap(), 1);
        assert_eq!(table.len().unwrap(), 2);
        assert_eq!(table.get(0).unwrap(), first);
        assert_eq!(table.get(1).unwrap(), second);
    }

    #[test]
    fn test_empty_container_is_a_row() {
        let mut table = table();
        assert!(table.is_empty().unwrap());
        assert_eq!(table.append(&DataContainer::new()).unwrap(), 0);
        assert!(table.get(0).unwrap().is_empty());
    }

    #[test]
    fn test_last_key_uses_high_bit() {
        let mut table = table();
        let last = *Cuba::ALL.last().unwrap();
        let mut data = DataContainer::new();
        data.insert(last, 0.25);
        table.append(&data).unwrap();
        assert_eq!(
            table.get(0).unwrap().get(last).unwrap(),
            &AttributeValue::Float64(0.25)
        );
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let mut table = table();
        let mut data = DataContainer::new();
        data.insert(Cuba::Density, 1.0);
        data.insert(Cuba::Velocity, [1.0, 2.0]);

        let err = table.append(&data).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));
        assert_eq!(table.len().unwrap(), 0);
    }

    #[test]
    fn test_get_past_end() {
        let table = table();
        assert!(matches!(
            table.get(0),
            Err(StoreError::Model(CudsError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_iter_in_row_order() {
        let mut table = table();
        for label in 0..3 {
            let mut data = DataContainer::new();
            data.insert(Cuba::Label, label);
            table.append(&data).unwrap();
        }
        let labels: Vec<i64> = table
            .iter()
            .unwrap()
            .map(|c| c.unwrap().get(Cuba::Label).unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(labels, vec![0, 1, 2]);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let store = StoreHandle::new(MemoryStore::new());
        let group = NodePath::parse("/data_container/params");
        let mut table = DataContainerTable::create_or_open(&store, &group).unwrap();
        let mut data = DataContainer::new();
        data.insert(Cuba::Status, 2);
        table.append(&data).unwrap();

        let reopened = DataContainerTable::create_or_open(&store, &group).unwrap();
        assert_eq!(reopened.get(0).unwrap(), data);
    }
}
