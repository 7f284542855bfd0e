//! Persistent lattice engine.
//!
//! A [`FileLattice`] keeps one lattice in a store group holding two nodes:
//!
//! - `table`: one row per lattice node in row-major order. Column `NAME`
//!   holds the node coordinate; every attribute key ever written has its own
//!   column, typed by the first value seen for it. The table also carries the
//!   lattice metadata attributes `type`, `base_vect`, `size` and `origin`.
//! - `mask`: one presence bitfield per row. Bit `b` is set once the `b`-th
//!   attribute column (counting from the first column after `NAME`) has been
//!   written for that row.
//!
//! Writing a key that has no column yet migrates the table: a new table with
//! the extended schema is written under a temporary name, the old table is
//! removed and the new one renamed into place. The mask is widened the same
//! way when the attribute column count outgrows it. A temporary node found
//! when a lattice is opened means an earlier migration was interrupted, and
//! the engine refuses to guess which copy is authoritative.

use cuds_core::{AttributeValue, Cuba, CudsError, DataContainer};
use cuds_model::lattice::position;
use cuds_model::{Lattice, LatticeNode, LatticeType, RowMajor};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::mask::{MaskWidth, PresenceMask};
use crate::path::NodePath;
use crate::schema::{ColumnDef, ColumnName, TableSchema};
use crate::store::{StoreHandle, StoredNode};
use crate::table::{AttrValue, Table, check_cell};

/// Name of the table node inside a lattice group.
pub const TABLE_NODE: &str = "table";
/// Name of the presence mask node inside a lattice group.
pub const MASK_NODE: &str = "mask";

pub const ATTR_TYPE: &str = "type";
pub const ATTR_BASE_VECT: &str = "base_vect";
pub const ATTR_SIZE: &str = "size";
pub const ATTR_ORIGIN: &str = "origin";

/// Handle to a lattice persisted in a store.
///
/// Metadata is read once when the handle is created. Node data always goes
/// through the store, so clones of a handle stay consistent with each other.
#[derive(Debug, Clone)]
pub struct FileLattice {
    store: StoreHandle,
    name: String,
    table_path: NodePath,
    mask_path: NodePath,
    lattice_type: LatticeType,
    base_vect: Vec<f64>,
    origin: Vec<f64>,
    layout: RowMajor,
}

impl FileLattice {
    /// Open the lattice stored in `group`, or create it from the metadata of
    /// `lattice` if the group holds no table yet.
    ///
    /// Only metadata is taken from `lattice`; node data is not copied.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StaleArtifact`] if a temporary node is present,
    /// or any store error.
    pub fn create_or_open(
        store: &StoreHandle,
        group: &NodePath,
        lattice: &Lattice,
    ) -> StoreResult<Self> {
        if store.has_node(&group.join(TABLE_NODE))? {
            return Self::open(store, group);
        }
        check_stale(store, group)?;

        let layout = lattice.layout().clone();
        let mut table = Table::new(TableSchema::lattice(layout.dimensions()), layout.len());
        for (row, coord) in layout.coords().enumerate() {
            table.write(row, ColumnName::Name, &AttributeValue::Int32Vec(coord))?;
        }
        table.set_attr(ATTR_TYPE, AttrValue::Text(lattice.lattice_type().name().to_string()));
        table.set_attr(ATTR_BASE_VECT, AttrValue::Floats(lattice.base_vect().to_vec()));
        table.set_attr(
            ATTR_SIZE,
            AttrValue::Ints(lattice.size().iter().map(|&s| s as i64).collect()),
        );
        table.set_attr(ATTR_ORIGIN, AttrValue::Floats(lattice.origin().to_vec()));
        let mask = PresenceMask::zeroed(MaskWidth::W8, layout.len());

        let engine = Self {
            store: store.clone(),
            name: group_name(group),
            table_path: group.join(TABLE_NODE),
            mask_path: group.join(MASK_NODE),
            lattice_type: lattice.lattice_type(),
            base_vect: lattice.base_vect().to_vec(),
            origin: lattice.origin().to_vec(),
            layout,
        };
        store.with(|s| {
            s.create_group(group)?;
            s.create_node(&engine.table_path, &StoredNode::Table(table))?;
            s.create_node(&engine.mask_path, &StoredNode::Mask(mask))
        })?;
        info!(lattice = %engine.name, rows = engine.layout.len(), "created lattice table");
        Ok(engine)
    }

    /// Open an existing lattice group.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StaleArtifact`] if a temporary node is present,
    /// [`StoreError::MissingNode`] if the group holds no table, and
    /// [`StoreError::Corrupt`] if the metadata or mask does not match the
    /// table.
    pub fn open(store: &StoreHandle, group: &NodePath) -> StoreResult<Self> {
        check_stale(store, group)?;
        let name = group_name(group);
        let table_path = group.join(TABLE_NODE);
        let mask_path = group.join(MASK_NODE);
        let table = store.read_table(&table_path)?;
        let mask = store.read_mask(&mask_path)?;

        let corrupt = |what: &str| StoreError::Corrupt(format!("lattice {name}: {what}"));
        let lattice_type: LatticeType = table
            .attr(ATTR_TYPE)
            .and_then(AttrValue::as_text)
            .ok_or_else(|| corrupt("missing type"))?
            .parse()?;
        let base_vect = table
            .attr(ATTR_BASE_VECT)
            .and_then(AttrValue::as_floats)
            .ok_or_else(|| corrupt("missing base_vect"))?
            .to_vec();
        let origin = table
            .attr(ATTR_ORIGIN)
            .and_then(AttrValue::as_floats)
            .ok_or_else(|| corrupt("missing origin"))?
            .to_vec();
        let size = table
            .attr(ATTR_SIZE)
            .and_then(AttrValue::as_ints)
            .ok_or_else(|| corrupt("missing size"))?
            .iter()
            .map(|&s| usize::try_from(s).map_err(|_| corrupt("negative size")))
            .collect::<StoreResult<Vec<usize>>>()?;

        if base_vect.len() != size.len() || origin.len() != size.len() {
            return Err(corrupt("metadata dimensions do not match size"));
        }
        let layout = RowMajor::new(&size).map_err(|e| corrupt(&e.to_string()))?;
        if layout.len() != table.len() || layout.len() != mask.len() {
            return Err(corrupt("row count does not match size"));
        }
        debug!(
            lattice = %name,
            version = table.schema().version(),
            width = mask.width().bits(),
            "opened lattice table"
        );
        Ok(Self {
            store: store.clone(),
            name,
            table_path,
            mask_path,
            lattice_type,
            base_vect,
            origin,
            layout,
        })
    }

    // -- Metadata --

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn lattice_type(&self) -> LatticeType {
        self.lattice_type
    }

    #[must_use]
    pub fn base_vect(&self) -> &[f64] {
        &self.base_vect
    }

    #[must_use]
    pub fn size(&self) -> &[usize] {
        self.layout.size()
    }

    #[must_use]
    pub fn origin(&self) -> &[f64] {
        &self.origin
    }

    /// The current table schema.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn schema(&self) -> StoreResult<TableSchema> {
        Ok(self.read_table()?.schema().clone())
    }

    /// The current presence mask width.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn mask_width(&self) -> StoreResult<MaskWidth> {
        Ok(self.read_mask()?.width())
    }

    // -- Addressing --

    /// Table row of `coord`.
    ///
    /// # Errors
    ///
    /// Returns an `OutOfRange` model error outside the lattice.
    pub fn row_index(&self, coord: &[i32]) -> StoreResult<usize> {
        Ok(self.layout.row_index(coord)?)
    }

    /// Coordinate stored in `row`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error past the last row.
    pub fn coord_from_row(&self, row: usize) -> StoreResult<Vec<i32>> {
        self.layout
            .coord_from_row(row)
            .ok_or_else(|| CudsError::not_found("row", row).into())
    }

    /// Position in space of `coord`.
    ///
    /// # Errors
    ///
    /// Returns a `Dimension` model error if `coord` does not have one
    /// component per axis.
    pub fn get_coordinate(&self, coord: &[i32]) -> StoreResult<Vec<f64>> {
        Ok(position(&self.origin, &self.base_vect, coord)?)
    }

    // -- Node access --

    /// Read the node at `coord`. Only keys whose presence bit is set are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns an `OutOfRange` model error outside the lattice, or any store
    /// error.
    pub fn get_node(&self, coord: &[i32]) -> StoreResult<LatticeNode> {
        let row = self.layout.row_index(coord)?;
        let table = self.read_table()?;
        let mask = self.read_mask()?;
        node_at(&table, &mask, row, coord.to_vec())
    }

    /// Write the data of `node`.
    ///
    /// `keywords` restricts the write to the listed keys; keys the node does
    /// not carry are skipped. Unknown keys first migrate the table, and the
    /// mask is widened when needed. Both nodes are flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaConflict`] or [`StoreError::StringTooLong`]
    /// if a value does not fit its column (nothing is written in that case),
    /// [`StoreError::StaleArtifact`] if a migration finds a temporary node,
    /// or an `OutOfRange` model error outside the lattice.
    pub fn update_node(&mut self, node: &LatticeNode, keywords: Option<&[Cuba]>) -> StoreResult<()> {
        self.update_nodes(std::slice::from_ref(node), keywords)
    }

    /// Write the data of many nodes at once.
    ///
    /// Behaves like calling [`update_node`](Self::update_node) for each node,
    /// except that the table is migrated at most once and both nodes are
    /// flushed once at the end. Every node is checked before anything is
    /// written, so a failing batch leaves the stored lattice untouched.
    ///
    /// # Errors
    ///
    /// See [`update_node`](Self::update_node). A type conflict between two
    /// nodes of the batch that introduce the same key is a
    /// [`StoreError::SchemaConflict`].
    pub fn update_nodes(
        &mut self,
        nodes: &[LatticeNode],
        keywords: Option<&[Cuba]>,
    ) -> StoreResult<()> {
        let mut writes = Vec::with_capacity(nodes.len());
        for node in nodes {
            let row = self.layout.row_index(&node.id)?;
            let keys: Vec<Cuba> = match keywords {
                Some(keys) => keys.iter().copied().filter(|&k| node.data.contains(k)).collect(),
                None => node.data.keys().collect(),
            };
            if !keys.is_empty() {
                writes.push((row, &node.data, keys));
            }
        }
        if writes.is_empty() {
            return Ok(());
        }

        let mut table = self.read_table()?;
        let mut added: Vec<ColumnDef> = Vec::new();
        let mut target = table.schema().clone();
        for (_, data, keys) in &writes {
            let missing = target.missing_columns(data, keys)?;
            if !missing.is_empty() {
                added.extend(missing);
                target = table.schema().extended(&added);
            }
        }
        for (_, data, keys) in &writes {
            validate(data, keys, &target)?;
        }
        if !added.is_empty() {
            table = self.migrate_table(&table, &added)?;
        }

        let mut mask = self.read_mask()?;
        let width = mask.width().fitting(table.schema().attribute_count())?;
        if width != mask.width() {
            mask = self.widen_mask(&mask, width)?;
        }

        for (row, data, keys) in &writes {
            for &key in keys {
                let Some(value) = data.value(key) else {
                    continue;
                };
                let bit = table.schema().presence_bit(key).ok_or_else(|| {
                    StoreError::Corrupt(format!("lattice {}: no column for {key}", self.name))
                })?;
                table.write(*row, ColumnName::Key(key), value)?;
                mask.set(*row, bit)?;
            }
        }
        self.store
            .flush_node(&self.table_path, &StoredNode::Table(table))?;
        self.store.flush_node(&self.mask_path, &StoredNode::Mask(mask))?;
        debug!(lattice = %self.name, nodes = writes.len(), "updated nodes");
        Ok(())
    }

    /// Same as [`update_node`](Self::update_node): every row exists from
    /// creation on.
    ///
    /// # Errors
    ///
    /// See [`update_node`](Self::update_node).
    pub fn add_node(&mut self, node: &LatticeNode, keywords: Option<&[Cuba]>) -> StoreResult<()> {
        self.update_node(node, keywords)
    }

    /// Iterate over stored nodes.
    ///
    /// With `None`, yields every node with at least one presence bit set, in
    /// row order. With `Some(coords)`, yields exactly those coordinates in
    /// the given order, including nodes that were never written.
    ///
    /// The iterator works on a snapshot taken now and decodes nodes as it
    /// goes.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_nodes(&self, coords: Option<&[Vec<i32>]>) -> StoreResult<FileLatticeNodes> {
        let source = match coords {
            Some(coords) => NodeSource::Coords(coords.to_vec().into_iter()),
            None => NodeSource::Occupied { next: 0 },
        };
        Ok(FileLatticeNodes {
            table: self.read_table()?,
            mask: self.read_mask()?,
            layout: self.layout.clone(),
            source,
        })
    }

    /// Read the whole lattice back into memory.
    ///
    /// # Errors
    ///
    /// Propagates store and model errors.
    pub fn load(&self) -> StoreResult<Lattice> {
        let mut lattice = Lattice::new(
            self.name.clone(),
            self.lattice_type,
            self.base_vect.clone(),
            self.layout.size().to_vec(),
            self.origin.clone(),
        )?;
        for node in self.iter_nodes(None)? {
            lattice.update_node(&node?)?;
        }
        Ok(lattice)
    }

    /// Make pending writes durable.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn flush(&self) -> StoreResult<()> {
        self.store.with(|s| s.flush())
    }

    // -- Internals --

    fn read_table(&self) -> StoreResult<Table> {
        self.store.read_table(&self.table_path)
    }

    fn read_mask(&self) -> StoreResult<PresenceMask> {
        self.store.read_mask(&self.mask_path)
    }

    fn migrate_table(&self, table: &Table, added: &[ColumnDef]) -> StoreResult<Table> {
        let migrated = table.migrated(table.schema().extended(added))?;
        self.store
            .replace_node(&self.table_path, &StoredNode::Table(migrated.clone()))
            .inspect_err(warn_stale)?;
        info!(
            lattice = %self.name,
            version = migrated.schema().version(),
            added = added.len(),
            "migrated lattice schema"
        );
        Ok(migrated)
    }

    fn widen_mask(&self, mask: &PresenceMask, width: MaskWidth) -> StoreResult<PresenceMask> {
        let widened = mask.resized(width);
        self.store
            .replace_node(&self.mask_path, &StoredNode::Mask(widened.clone()))
            .inspect_err(warn_stale)?;
        info!(lattice = %self.name, width = width.bits(), "widened presence mask");
        Ok(widened)
    }
}

/// Lazy iterator over nodes of a [`FileLattice`] snapshot.
#[derive(Debug, Clone)]
pub struct FileLatticeNodes {
    table: Table,
    mask: PresenceMask,
    layout: RowMajor,
    source: NodeSource,
}

#[derive(Debug, Clone)]
enum NodeSource {
    Occupied { next: usize },
    Coords(std::vec::IntoIter<Vec<i32>>),
}

impl Iterator for FileLatticeNodes {
    type Item = StoreResult<LatticeNode>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            NodeSource::Occupied { next } => {
                while *next < self.mask.len() {
                    let row = *next;
                    *next += 1;
                    if self.mask.get(row).is_some_and(|bits| bits != 0) {
                        let id = self.layout.coord_from_row(row)?;
                        return Some(node_at(&self.table, &self.mask, row, id));
                    }
                }
                None
            }
            NodeSource::Coords(coords) => {
                let coord = coords.next()?;
                Some(
                    self.layout
                        .row_index(&coord)
                        .map_err(StoreError::from)
                        .and_then(|row| node_at(&self.table, &self.mask, row, coord)),
                )
            }
        }
    }
}

fn node_at(table: &Table, mask: &PresenceMask, row: usize, id: Vec<i32>) -> StoreResult<LatticeNode> {
    let mut data = DataContainer::new();
    for (bit, key) in table.schema().keys().enumerate() {
        if u32::try_from(bit).is_ok_and(|b| mask.is_set(row, b)) {
            data.insert(key, table.read(row, ColumnName::Key(key))?);
        }
    }
    Ok(LatticeNode { id, data })
}

/// Check every selected value against its column in `schema`, which already
/// includes the columns about to be added, before anything is written.
fn validate(data: &DataContainer, keys: &[Cuba], schema: &TableSchema) -> StoreResult<()> {
    for &key in keys {
        let Some(value) = data.value(key) else {
            continue;
        };
        if let Some(def) = schema.column(ColumnName::Key(key)) {
            check_cell(def, value)?;
        }
    }
    Ok(())
}

fn check_stale(store: &StoreHandle, group: &NodePath) -> StoreResult<()> {
    for node in [TABLE_NODE, MASK_NODE] {
        let tmp = group.join(node).temporary();
        if store.has_node(&tmp)? {
            let err = StoreError::StaleArtifact(tmp);
            warn_stale(&err);
            return Err(err);
        }
    }
    Ok(())
}

fn warn_stale(err: &StoreError) {
    if let StoreError::StaleArtifact(path) = err {
        warn!(%path, "found temporary node from an interrupted migration");
    }
}

fn group_name(group: &NodePath) -> String {
    group.name().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use cuds_model::{make_cubic_lattice, make_square_lattice};

    use super::*;
    use crate::config::StoreConfig;
    use crate::fs::FileStore;
    use crate::store::MemoryStore;

    fn group() -> NodePath {
        NodePath::parse("/lattice/grid")
    }

    fn engine(size: [usize; 2]) -> (StoreHandle, FileLattice) {
        let store = StoreHandle::new(MemoryStore::new());
        let lattice = make_square_lattice("grid", 0.5, size, [1.0, 2.0]).unwrap();
        let engine = FileLattice::create_or_open(&store, &group(), &lattice).unwrap();
        (store, engine)
    }

    fn node(coord: [i32; 2], key: Cuba, value: impl Into<AttributeValue>) -> LatticeNode {
        let mut node = LatticeNode::new(coord);
        node.data.insert(key, value);
        node
    }

    #[test]
    fn test_create_writes_name_column_and_metadata() {
        let (store, engine) = engine([2, 3]);
        let table = store.read_table(&group().join(TABLE_NODE)).unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(table.schema().columns().len(), 1);
        assert_eq!(
            table.read(4, ColumnName::Name).unwrap(),
            AttributeValue::Int32Vec(vec![1, 1])
        );
        assert_eq!(table.attr(ATTR_TYPE).and_then(AttrValue::as_text), Some("Square"));
        assert_eq!(engine.mask_width().unwrap(), MaskWidth::W8);
        assert_eq!(engine.lattice_type(), LatticeType::Square);
    }

    #[test]
    fn test_reopen_restores_metadata_and_schema() {
        let (store, mut engine) = engine([3, 3]);
        engine
            .update_node(&node([1, 2], Cuba::Density, 1.5), None)
            .unwrap();

        let reopened = FileLattice::open(&store, &group()).unwrap();
        assert_eq!(reopened.size(), &[3, 3]);
        assert_eq!(reopened.base_vect(), &[0.5, 0.5]);
        assert_eq!(reopened.origin(), &[1.0, 2.0]);
        assert_eq!(reopened.schema().unwrap(), engine.schema().unwrap());
        assert_eq!(
            reopened.get_node(&[1, 2]).unwrap().data.get(Cuba::Density).unwrap(),
            &AttributeValue::Float64(1.5)
        );
    }

    #[test]
    fn test_row_index_bijection() {
        let (_, engine) = engine([4, 5]);
        for row in 0..20 {
            let coord = engine.coord_from_row(row).unwrap();
            assert_eq!(engine.row_index(&coord).unwrap(), row);
        }
        assert!(engine.coord_from_row(20).is_err());
    }

    #[test]
    fn test_presence_is_per_node() {
        let (_, mut engine) = engine([3, 3]);
        engine
            .update_node(&node([0, 1], Cuba::Temperature, 300.0), None)
            .unwrap();

        assert!(engine.get_node(&[0, 1]).unwrap().data.contains(Cuba::Temperature));
        assert!(engine.get_node(&[1, 0]).unwrap().data.is_empty());
    }

    #[test]
    fn test_zero_value_is_present() {
        let (_, mut engine) = engine([2, 2]);
        engine.update_node(&node([0, 0], Cuba::Label, 0), None).unwrap();
        assert_eq!(
            engine.get_node(&[0, 0]).unwrap().data.get(Cuba::Label).unwrap(),
            &AttributeValue::Int32(0)
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let (store, mut engine) = engine([2, 2]);
        let n = node([1, 1], Cuba::Pressure, 2.0);
        engine.update_node(&n, None).unwrap();
        let table = store.read_table(&group().join(TABLE_NODE)).unwrap();
        let mask = store.read_mask(&group().join(MASK_NODE)).unwrap();

        engine.update_node(&n, None).unwrap();
        assert_eq!(store.read_table(&group().join(TABLE_NODE)).unwrap(), table);
        assert_eq!(store.read_mask(&group().join(MASK_NODE)).unwrap(), mask);
    }

    #[test]
    fn test_migration_preserves_existing_data() {
        let (_, mut engine) = engine([3, 3]);
        engine
            .update_node(&node([0, 0], Cuba::Density, 1.0), None)
            .unwrap();
        engine.update_node(&node([2, 1], Cuba::Label, 7), None).unwrap();
        let before = engine.schema().unwrap();

        engine
            .update_node(&node([1, 1], Cuba::Velocity, [0.5, -0.5]), None)
            .unwrap();
        let after = engine.schema().unwrap();
        assert_eq!(after.version(), before.version() + 1);
        assert_eq!(&after.columns()[..before.columns().len()], before.columns());

        let first = engine.get_node(&[0, 0]).unwrap().data;
        assert_eq!(first.len(), 1);
        assert_eq!(first.get(Cuba::Density).unwrap(), &AttributeValue::Float64(1.0));
        let second = engine.get_node(&[2, 1]).unwrap().data;
        assert_eq!(second.len(), 1);
        assert_eq!(second.get(Cuba::Label).unwrap(), &AttributeValue::Int32(7));
        let third = engine.get_node(&[1, 1]).unwrap().data;
        assert_eq!(third.len(), 1);
        assert!(third.contains(Cuba::Velocity));
    }

    #[test]
    fn test_mask_widens_past_eight_columns() {
        let (_, mut engine) = engine([2, 2]);
        let keys = [
            Cuba::Density,
            Cuba::Mass,
            Cuba::Pressure,
            Cuba::Temperature,
            Cuba::Radius,
            Cuba::Volume,
            Cuba::Concentration,
            Cuba::OrderParameter,
        ];
        let mut first = LatticeNode::new([0, 0]);
        for (i, &key) in keys.iter().enumerate() {
            first.data.insert(key, i as f64);
        }
        engine.update_node(&first, None).unwrap();
        assert_eq!(engine.mask_width().unwrap(), MaskWidth::W8);

        engine.update_node(&node([1, 0], Cuba::Label, 3), None).unwrap();
        assert_eq!(engine.mask_width().unwrap(), MaskWidth::W16);
        assert_eq!(engine.get_node(&[0, 0]).unwrap().data, first.data);
        assert_eq!(engine.get_node(&[1, 0]).unwrap().data.len(), 1);
    }

    #[test]
    fn test_keywords_restrict_the_write() {
        let (_, mut engine) = engine([2, 2]);
        let mut n = LatticeNode::new([0, 1]);
        n.data.insert(Cuba::Density, 1.0);
        n.data.insert(Cuba::Mass, 2.0);

        engine
            .update_node(&n, Some(&[Cuba::Mass, Cuba::Temperature]))
            .unwrap();
        let stored = engine.get_node(&[0, 1]).unwrap().data;
        assert!(stored.contains(Cuba::Mass));
        assert!(!stored.contains(Cuba::Density));
        assert_eq!(engine.schema().unwrap().attribute_count(), 1);
    }

    #[test]
    fn test_add_node_matches_update_node() {
        let (_, mut engine) = engine([2, 2]);
        engine
            .add_node(&node([1, 0], Cuba::Status, 1), None)
            .unwrap();
        assert!(engine.get_node(&[1, 0]).unwrap().data.contains(Cuba::Status));
    }

    #[test]
    fn test_iter_nodes_skips_unwritten_rows() {
        let (_, mut engine) = engine([3, 3]);
        engine
            .update_node(&node([2, 2], Cuba::Density, 1.0), None)
            .unwrap();
        engine
            .update_node(&node([0, 0], Cuba::Density, 1.0), None)
            .unwrap();

        let ids: Vec<Vec<i32>> = engine
            .iter_nodes(None)
            .unwrap()
            .map(|n| n.unwrap().id)
            .collect();
        assert_eq!(ids, vec![vec![0, 0], vec![2, 2]]);
    }

    #[test]
    fn test_iter_nodes_by_coordinates() {
        let (_, mut engine) = engine([3, 3]);
        engine
            .update_node(&node([1, 1], Cuba::Density, 4.0), None)
            .unwrap();

        let coords = vec![vec![1, 1], vec![0, 2], vec![5, 5]];
        let nodes: Vec<_> = engine.iter_nodes(Some(&coords)).unwrap().collect();
        assert_eq!(nodes.len(), 3);
        assert!(nodes[0].as_ref().unwrap().data.contains(Cuba::Density));
        assert!(nodes[1].as_ref().unwrap().data.is_empty());
        assert!(matches!(
            nodes[2],
            Err(StoreError::Model(CudsError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_iter_nodes_is_restartable() {
        let (_, mut engine) = engine([2, 2]);
        engine.update_node(&node([0, 1], Cuba::Label, 1), None).unwrap();
        let iter = engine.iter_nodes(None).unwrap();
        assert_eq!(iter.clone().count(), 1);
        assert_eq!(iter.count(), 1);
        assert_eq!(engine.iter_nodes(None).unwrap().count(), 1);
    }

    #[test]
    fn test_conflicting_type_writes_nothing() {
        let (_, mut engine) = engine([2, 2]);
        engine
            .update_node(&node([0, 0], Cuba::Density, 1.0), None)
            .unwrap();

        let mut bad = node([1, 1], Cuba::Density, 5);
        bad.data.insert(Cuba::Label, 2);
        let err = engine.update_node(&bad, None).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));
        assert!(engine.get_node(&[1, 1]).unwrap().data.is_empty());
        assert_eq!(engine.schema().unwrap().attribute_count(), 1);
    }

    #[test]
    fn test_long_string_writes_nothing() {
        let (_, mut engine) = engine([2, 2]);
        let bad = node([0, 0], Cuba::ChemicalSpecie, "much too long for a cell");
        let err = engine.update_node(&bad, None).unwrap_err();
        assert!(matches!(err, StoreError::StringTooLong { .. }));
        assert_eq!(engine.schema().unwrap().attribute_count(), 0);
    }

    #[test]
    fn test_out_of_range() {
        let (_, mut engine) = engine([3, 3]);
        assert!(matches!(
            engine.get_node(&[3, 0]),
            Err(StoreError::Model(CudsError::OutOfRange { .. }))
        ));
        assert!(matches!(
            engine.update_node(&node([-1, 0], Cuba::Density, 1.0), None),
            Err(StoreError::Model(CudsError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_open_refuses_stale_artifact() {
        let (store, _) = engine([2, 2]);
        let tmp = group().join(TABLE_NODE).temporary();
        let leftover = store.read_table(&group().join(TABLE_NODE)).unwrap();
        store.create_node(&tmp, &StoredNode::Table(leftover)).unwrap();

        let err = FileLattice::open(&store, &group()).unwrap_err();
        assert!(matches!(err, StoreError::StaleArtifact(_)));
    }

    #[test]
    fn test_migration_refuses_stale_artifact() {
        let (store, mut engine) = engine([2, 2]);
        let tmp = group().join(TABLE_NODE).temporary();
        let leftover = store.read_table(&group().join(TABLE_NODE)).unwrap();
        store.create_node(&tmp, &StoredNode::Table(leftover)).unwrap();

        let err = engine
            .update_node(&node([0, 0], Cuba::Density, 1.0), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleArtifact(_)));
        assert_eq!(engine.schema().unwrap().attribute_count(), 0);
    }

    #[test]
    fn test_closed_store() {
        let (store, engine) = engine([2, 2]);
        store.close().unwrap();
        assert!(matches!(engine.get_node(&[0, 0]), Err(StoreError::Closed)));
    }

    #[test]
    fn test_get_coordinate() {
        let (_, engine) = engine([4, 4]);
        assert_eq!(engine.get_coordinate(&[2, 3]).unwrap(), vec![2.0, 3.5]);
        assert!(matches!(
            engine.get_coordinate(&[2]),
            Err(StoreError::Model(CudsError::Dimension { expected: 2, found: 1 }))
        ));
    }

    #[test]
    fn test_update_nodes_migrates_once() {
        let (_, mut engine) = engine([3, 3]);
        let nodes = vec![
            node([0, 0], Cuba::Density, 1.0),
            node([1, 1], Cuba::Label, 7),
            node([2, 2], Cuba::ChemicalSpecie, "helium"),
        ];
        engine.update_nodes(&nodes, None).unwrap();

        let schema = engine.schema().unwrap();
        assert_eq!(schema.version(), 2);
        assert_eq!(schema.attribute_count(), 3);
        for n in &nodes {
            assert_eq!(&engine.get_node(&n.id).unwrap(), n);
        }
        assert_eq!(engine.iter_nodes(None).unwrap().count(), 3);
    }

    #[test]
    fn test_update_nodes_rejects_whole_batch() {
        let (_, mut engine) = engine([3, 3]);
        let nodes = vec![
            node([0, 0], Cuba::Density, 1.0),
            node([0, 1], Cuba::Label, 2),
            node([0, 2], Cuba::Density, 3),
        ];
        let err = engine.update_nodes(&nodes, None).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));

        let nodes = vec![
            node([0, 0], Cuba::Density, 1.0),
            node([1, 0], Cuba::ChemicalSpecie, "twenty bytes of text"),
        ];
        let err = engine.update_nodes(&nodes, None).unwrap_err();
        assert!(matches!(err, StoreError::StringTooLong { .. }));

        let nodes = vec![node([0, 0], Cuba::Density, 1.0), node([5, 0], Cuba::Density, 2.0)];
        assert!(engine.update_nodes(&nodes, None).is_err());

        assert_eq!(engine.schema().unwrap().attribute_count(), 0);
        assert_eq!(engine.iter_nodes(None).unwrap().count(), 0);
    }

    #[test]
    fn test_open_rejects_unaddressable_size() {
        let (store, _) = engine([2, 2]);
        let path = group().join(TABLE_NODE);
        let mut table = store.read_table(&path).unwrap();
        table.set_attr(ATTR_SIZE, AttrValue::Ints(vec![i64::MAX, i64::MAX]));
        store.flush_node(&path, &StoredNode::Table(table)).unwrap();

        let err = FileLattice::open(&store, &group()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_open_rejects_mismatched_metadata() {
        let (store, _) = engine([2, 2]);
        let path = group().join(TABLE_NODE);
        let mut table = store.read_table(&path).unwrap();
        table.set_attr(ATTR_ORIGIN, AttrValue::Floats(vec![0.0]));
        store.flush_node(&path, &StoredNode::Table(table)).unwrap();

        let err = FileLattice::open(&store, &group()).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_load_label_roundtrip() {
        let store = StoreHandle::new(MemoryStore::new());
        let lattice = make_square_lattice("labels", 0.1, [10, 10], [0.0, 0.0]).unwrap();
        let mut engine = FileLattice::create_or_open(
            &store,
            &NodePath::parse("/lattice/labels"),
            &lattice,
        )
        .unwrap();
        for i in 0..10 {
            engine.update_node(&node([i, i], Cuba::Label, i), None).unwrap();
        }

        let coords: Vec<Vec<i32>> = (0..10).map(|i| vec![i, i]).collect();
        let sum: i64 = engine
            .iter_nodes(Some(&coords))
            .unwrap()
            .filter_map(|n| n.unwrap().data.get(Cuba::Label).ok()?.as_i64())
            .sum();
        assert_eq!(sum, 45);

        let loaded = engine.load().unwrap();
        assert_eq!(loaded.lattice_type(), LatticeType::Square);
        assert_eq!(
            loaded.get_node(&[9, 9]).unwrap().data.get(Cuba::Label).unwrap(),
            &AttributeValue::Int32(9)
        );
        assert!(loaded.get_node(&[0, 1]).unwrap().data.is_empty());
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let lattice = make_cubic_lattice("cube", 1.0, [2, 2, 2], [0.0; 3]).unwrap();
        let group = NodePath::parse("/lattice/cube");
        {
            let store = StoreHandle::new(FileStore::open(dir.path(), &StoreConfig::default()).unwrap());
            let mut engine = FileLattice::create_or_open(&store, &group, &lattice).unwrap();
            let mut n = LatticeNode::new([1, 0, 1]);
            n.data.insert(Cuba::ChemicalSpecie, "argon");
            n.data.insert(Cuba::Velocity, [1.0, 0.0, -1.0]);
            engine.update_node(&n, None).unwrap();
            store.close().unwrap();
        }

        let store = StoreHandle::new(FileStore::open(dir.path(), &StoreConfig::default()).unwrap());
        let engine = FileLattice::create_or_open(&store, &group, &lattice).unwrap();
        let data = engine.get_node(&[1, 0, 1]).unwrap().data;
        assert_eq!(data.get(Cuba::ChemicalSpecie).unwrap(), &AttributeValue::from("argon"));
        assert_eq!(
            data.get(Cuba::Velocity).unwrap(),
            &AttributeValue::Float64Vec(vec![1.0, 0.0, -1.0])
        );
        assert_eq!(engine.iter_nodes(None).unwrap().count(), 1);
    }
}
