//! Id-keyed entity tables.
//!
//! An [`EntityTable`] keeps entities addressed by [`Uuid`] (mesh points and
//! elements, particles, bonds) as rows of a fixed-schema table. The schema
//! is the `UID` column, then the columns the entity kind declares, then one
//! reserved column per CUBA key at its canonical type. The presence mask
//! next to the table is 64 bits wide and bit `b` belongs to the key of index
//! `b`, as in a [`DataContainerTable`](crate::DataContainerTable).
//!
//! Rows keep insertion order and removal shifts later rows down. Every call
//! checks its whole batch first, then writes it and flushes both nodes once.

use std::collections::{HashMap, HashSet};

use cuds_core::{AttributeValue, CudsError, DataContainer, ScalarKind, ValueType};
use cuds_model::DVec3;
use tracing::debug;
use uuid::Uuid;

use crate::data_table::{container_at, presence_bits};
use crate::error::{StoreError, StoreResult};
use crate::mask::{MaskWidth, PresenceMask};
use crate::path::NodePath;
use crate::schema::{ColumnDef, ColumnName, TableSchema};
use crate::store::{StoreHandle, StoredNode};
use crate::table::{Table, check_cell};

/// Most ids a single bond or mesh element can reference.
pub const MAX_MEMBERS: usize = 20;

pub const UID: ColumnDef = ColumnDef {
    name: ColumnName::Uid,
    value_type: ValueType::vector(ScalarKind::Int64, 2),
};

pub const COORDINATES: ColumnDef = ColumnDef {
    name: ColumnName::Coordinates,
    value_type: ValueType::vector(ScalarKind::Float64, 3),
};

pub const MEMBERS: ColumnDef = ColumnDef {
    name: ColumnName::Members,
    value_type: ValueType::vector(ScalarKind::Int64, 2 * MAX_MEMBERS),
};

pub const MEMBER_COUNT: ColumnDef = ColumnDef {
    name: ColumnName::MemberCount,
    value_type: ValueType::scalar(ScalarKind::Int32),
};

pub const MEASURE: ColumnDef = ColumnDef {
    name: ColumnName::Measure,
    value_type: ValueType::scalar(ScalarKind::Float64),
};

/// One stored entity: its id, the values of the declared columns in
/// declaration order, and its attribute data.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRow {
    pub id: Uuid,
    pub fields: Vec<AttributeValue>,
    pub data: DataContainer,
}

impl EntityRow {
    #[must_use]
    pub fn new(id: Uuid, fields: Vec<AttributeValue>, data: DataContainer) -> Self {
        Self { id, fields, data }
    }
}

/// Handle to one id-keyed table and its presence mask.
#[derive(Debug, Clone)]
pub struct EntityTable {
    store: StoreHandle,
    kind: &'static str,
    table_path: NodePath,
    mask_path: NodePath,
    fields: Vec<ColumnDef>,
}

impl EntityTable {
    /// Open the table stored as `node` in `group`, or create it empty.
    ///
    /// `kind` names the entities in errors and logs. `fields` are the
    /// columns stored between `UID` and the attribute columns.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] if an existing table was written with
    /// other columns, or any store error.
    pub fn create_or_open(
        store: &StoreHandle,
        group: &NodePath,
        node: &str,
        kind: &'static str,
        fields: &[ColumnDef],
    ) -> StoreResult<Self> {
        let table = Self {
            store: store.clone(),
            kind,
            table_path: group.join(node),
            mask_path: group.join(&format!("{node}_mask")),
            fields: fields.to_vec(),
        };
        let schema = entity_schema(fields);
        if store.has_node(&table.table_path)? {
            let stored = store.read_table(&table.table_path)?;
            if stored.schema().columns() != schema.columns() {
                return Err(StoreError::Corrupt(format!(
                    "{} table at {} has unexpected columns",
                    kind, table.table_path
                )));
            }
            return Ok(table);
        }
        store.with(|s| {
            s.create_group(group)?;
            s.create_node(&table.table_path, &StoredNode::Table(Table::new(schema, 0)))?;
            s.create_node(
                &table.mask_path,
                &StoredNode::Mask(PresenceMask::zeroed(MaskWidth::W64, 0)),
            )
        })?;
        debug!(kind, path = %table.table_path, "created entity table");
        Ok(table)
    }

    /// Number of stored entities.
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

    /// Returns `true` if an entity with `id` is stored.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn contains(&self, id: Uuid) -> StoreResult<bool> {
        Ok(row_index(&self.read_table()?)?.contains_key(&id))
    }

    /// Ids of all stored entities in row order.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn ids(&self) -> StoreResult<Vec<Uuid>> {
        let table = self.read_table()?;
        (0..table.len())
            .map(|row| decode_uid(&table.read(row, ColumnName::Uid)?))
            .collect()
    }

    /// Read the entity with `id`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such entity is stored.
    pub fn get(&self, id: Uuid) -> StoreResult<EntityRow> {
        let table = self.read_table()?;
        let row = *row_index(&table)?
            .get(&id)
            .ok_or_else(|| CudsError::not_found(self.kind, id))?;
        row_at(&table, &self.read_mask()?, row, &self.fields)
    }

    /// Append `rows` in order.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if an id is already stored or
    /// repeats within `rows`, or any error a value raises against its
    /// column. Nothing is written unless every row passes.
    pub fn insert(&mut self, rows: &[EntityRow]) -> StoreResult<()> {
        let mut table = self.read_table()?;
        let mut mask = self.read_mask()?;
        let bits = self.plan_insert(&table, rows)?;

        for (entity, bits) in rows.iter().zip(bits) {
            let row = table.push_row();
            table.write(row, ColumnName::Uid, &encode_uid(entity.id))?;
            self.write_row(&mut table, row, entity)?;
            mask.push(bits)?;
        }
        self.flush(table, mask)?;
        debug!(kind = self.kind, count = rows.len(), "inserted entities");
        Ok(())
    }

    /// Run the checks of [`insert`](Self::insert) without writing.
    ///
    /// # Errors
    ///
    /// The errors `insert` would return.
    pub fn check_insert(&self, rows: &[EntityRow]) -> StoreResult<()> {
        self.plan_insert(&self.read_table()?, rows)?;
        Ok(())
    }

    /// Overwrite stored entities. Attribute data is replaced as a whole:
    /// keys missing from the new data are no longer present.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored, or any error
    /// a value raises against its column. Nothing is written unless every
    /// row passes.
    pub fn update(&mut self, rows: &[EntityRow]) -> StoreResult<()> {
        let mut table = self.read_table()?;
        let mut mask = self.read_mask()?;
        let writes = self.plan_update(&table, rows)?;

        for (entity, (row, bits)) in rows.iter().zip(writes) {
            self.write_row(&mut table, row, entity)?;
            mask.replace(row, bits)?;
        }
        self.flush(table, mask)?;
        debug!(kind = self.kind, count = rows.len(), "updated entities");
        Ok(())
    }

    /// Run the checks of [`update`](Self::update) without writing.
    ///
    /// # Errors
    ///
    /// The errors `update` would return.
    pub fn check_update(&self, rows: &[EntityRow]) -> StoreResult<()> {
        self.plan_update(&self.read_table()?, rows)?;
        Ok(())
    }

    /// Remove the entities with `ids`, keeping the order of the others.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored. Nothing is
    /// removed in that case.
    pub fn remove(&mut self, ids: &[Uuid]) -> StoreResult<()> {
        let mut table = self.read_table()?;
        let mut mask = self.read_mask()?;
        let index = row_index(&table)?;

        let mut rows = ids
            .iter()
            .map(|id| {
                index
                    .get(id)
                    .copied()
                    .ok_or_else(|| CudsError::not_found(self.kind, id))
            })
            .collect::<Result<Vec<usize>, _>>()?;
        rows.sort_unstable();
        rows.dedup();

        for &row in rows.iter().rev() {
            table.remove_row(row)?;
            mask.remove(row)?;
        }
        self.flush(table, mask)?;
        debug!(kind = self.kind, count = rows.len(), "removed entities");
        Ok(())
    }

    /// Iterate over stored entities.
    ///
    /// With `None`, yields every entity in row order. With `Some(ids)`,
    /// yields those entities in the given order and `Err(NotFound)` for an
    /// id that is not stored. The iterator works on a snapshot taken now.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter(&self, ids: Option<&[Uuid]>) -> StoreResult<EntityRows> {
        let table = self.read_table()?;
        let source = match ids {
            Some(ids) => Source::Ids {
                index: row_index(&table)?,
                ids: ids.to_vec().into_iter(),
            },
            None => Source::All { next: 0 },
        };
        Ok(EntityRows {
            mask: self.read_mask()?,
            table,
            fields: self.fields.clone(),
            kind: self.kind,
            source,
        })
    }

    // -- Internals --

    fn read_table(&self) -> StoreResult<Table> {
        self.store.read_table(&self.table_path)
    }

    fn read_mask(&self) -> StoreResult<PresenceMask> {
        self.store.read_mask(&self.mask_path)
    }

    /// Presence bits of each row of an insert batch.
    fn plan_insert(&self, table: &Table, rows: &[EntityRow]) -> StoreResult<Vec<u64>> {
        let index = row_index(table)?;
        let mut seen = HashSet::with_capacity(rows.len());
        rows.iter()
            .map(|entity| -> StoreResult<u64> {
                if index.contains_key(&entity.id) || !seen.insert(entity.id) {
                    return Err(CudsError::duplicate(self.kind, entity.id).into());
                }
                self.check(table.schema(), entity)
            })
            .collect()
    }

    /// Target row and presence bits of each row of an update batch.
    fn plan_update(&self, table: &Table, rows: &[EntityRow]) -> StoreResult<Vec<(usize, u64)>> {
        let index = row_index(table)?;
        rows.iter()
            .map(|entity| -> StoreResult<(usize, u64)> {
                let row = *index
                    .get(&entity.id)
                    .ok_or_else(|| CudsError::not_found(self.kind, entity.id))?;
                Ok((row, self.check(table.schema(), entity)?))
            })
            .collect()
    }

    /// Validate `entity` against the table and return its presence bits.
    fn check(&self, schema: &TableSchema, entity: &EntityRow) -> StoreResult<u64> {
        if entity.fields.len() != self.fields.len() {
            return Err(CudsError::Dimension {
                expected: self.fields.len(),
                found: entity.fields.len(),
            }
            .into());
        }
        for (def, value) in self.fields.iter().zip(&entity.fields) {
            check_cell(def, value)?;
        }
        presence_bits(schema, &entity.data)
    }

    fn write_row(&self, table: &mut Table, row: usize, entity: &EntityRow) -> StoreResult<()> {
        for (def, value) in self.fields.iter().zip(&entity.fields) {
            table.write(row, def.name, value)?;
        }
        for (key, value) in entity.data.iter() {
            table.write(row, ColumnName::Key(key), value)?;
        }
        Ok(())
    }

    fn flush(&self, table: Table, mask: PresenceMask) -> StoreResult<()> {
        self.store
            .flush_node(&self.table_path, &StoredNode::Table(table))?;
        self.store.flush_node(&self.mask_path, &StoredNode::Mask(mask))
    }
}

/// Lazy iterator over the rows of an [`EntityTable`] snapshot.
#[derive(Debug, Clone)]
pub struct EntityRows {
    table: Table,
    mask: PresenceMask,
    fields: Vec<ColumnDef>,
    kind: &'static str,
    source: Source,
}

#[derive(Debug, Clone)]
enum Source {
    All { next: usize },
    Ids {
        index: HashMap<Uuid, usize>,
        ids: std::vec::IntoIter<Uuid>,
    },
}

impl Iterator for EntityRows {
    type Item = StoreResult<EntityRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match &mut self.source {
            Source::All { next } => {
                if *next >= self.table.len() {
                    return None;
                }
                *next += 1;
                *next - 1
            }
            Source::Ids { index, ids } => {
                let id = ids.next()?;
                match index.get(&id) {
                    Some(&row) => row,
                    None => return Some(Err(CudsError::not_found(self.kind, id).into())),
                }
            }
        };
        Some(row_at(&self.table, &self.mask, row, &self.fields))
    }
}

/// `UID`, then `fields`, then every CUBA key in index order.
#[must_use]
pub fn entity_schema(fields: &[ColumnDef]) -> TableSchema {
    let mut columns = vec![UID];
    columns.extend_from_slice(fields);
    columns.extend_from_slice(TableSchema::all_keys().columns());
    TableSchema::new(columns)
}

fn row_at(
    table: &Table,
    mask: &PresenceMask,
    row: usize,
    fields: &[ColumnDef],
) -> StoreResult<EntityRow> {
    let id = decode_uid(&table.read(row, ColumnName::Uid)?)?;
    let fields = fields
        .iter()
        .map(|def| table.read(row, def.name))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(EntityRow {
        id,
        fields,
        data: container_at(table, mask, row)?,
    })
}

fn row_index(table: &Table) -> StoreResult<HashMap<Uuid, usize>> {
    (0..table.len())
        .map(|row| Ok((decode_uid(&table.read(row, ColumnName::Uid)?)?, row)))
        .collect()
}

// -- Id encoding --
//
// A UUID is stored as its two big-endian 64-bit halves, each reinterpreted
// as a signed integer.

fn signed(half: u64) -> i64 {
    i64::from_ne_bytes(half.to_ne_bytes())
}

fn unsigned(half: i64) -> u64 {
    u64::from_ne_bytes(half.to_ne_bytes())
}

/// The `UID` cell of `id`.
#[must_use]
pub fn encode_uid(id: Uuid) -> AttributeValue {
    let (high, low) = id.as_u64_pair();
    AttributeValue::Int64Vec(vec![signed(high), signed(low)])
}

/// The id stored in a `UID` cell.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] for a cell of another shape.
pub fn decode_uid(value: &AttributeValue) -> StoreResult<Uuid> {
    match value {
        AttributeValue::Int64Vec(halves) => match halves.as_slice() {
            &[high, low] => Ok(Uuid::from_u64_pair(unsigned(high), unsigned(low))),
            _ => Err(StoreError::Corrupt(format!("uid of {} halves", halves.len()))),
        },
        other => Err(StoreError::Corrupt(format!(
            "uid stored as {}",
            other.value_type()
        ))),
    }
}

/// The `MEMBERS` and `MEMBER_COUNT` cells of a reference list.
///
/// # Errors
///
/// Returns [`StoreError::TooManyMembers`] past [`MAX_MEMBERS`] ids.
pub fn encode_members(
    kind: &'static str,
    ids: &[Uuid],
) -> StoreResult<(AttributeValue, AttributeValue)> {
    let too_many = || StoreError::TooManyMembers {
        kind,
        count: ids.len(),
        max: MAX_MEMBERS,
    };
    if ids.len() > MAX_MEMBERS {
        return Err(too_many());
    }
    let mut halves = vec![0; 2 * MAX_MEMBERS];
    for (slot, id) in halves.chunks_exact_mut(2).zip(ids) {
        let (high, low) = id.as_u64_pair();
        slot[0] = signed(high);
        slot[1] = signed(low);
    }
    let count = i32::try_from(ids.len()).map_err(|_| too_many())?;
    Ok((
        AttributeValue::Int64Vec(halves),
        AttributeValue::Int32(count),
    ))
}

/// The ids stored in a pair of `MEMBERS` and `MEMBER_COUNT` cells.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if the cells are malformed.
pub fn decode_members(members: &AttributeValue, count: &AttributeValue) -> StoreResult<Vec<Uuid>> {
    let (AttributeValue::Int64Vec(halves), AttributeValue::Int32(count)) = (members, count) else {
        return Err(StoreError::Corrupt("malformed member columns".to_string()));
    };
    let count = usize::try_from(*count)
        .ok()
        .filter(|&n| 2 * n <= halves.len())
        .ok_or_else(|| StoreError::Corrupt(format!("member count {count}")))?;
    Ok(halves
        .chunks_exact(2)
        .take(count)
        .map(|pair| Uuid::from_u64_pair(unsigned(pair[0]), unsigned(pair[1])))
        .collect())
}

/// The `COORDINATES` cell of a position.
#[must_use]
pub fn encode_coordinates(position: DVec3) -> AttributeValue {
    AttributeValue::Float64Vec(position.to_array().to_vec())
}

/// The position stored in a `COORDINATES` cell.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] for a cell of another shape.
pub fn decode_coordinates(value: &AttributeValue) -> StoreResult<DVec3> {
    match value {
        AttributeValue::Float64Vec(v) => match v.as_slice() {
            &[x, y, z] => Ok(DVec3::new(x, y, z)),
            _ => Err(StoreError::Corrupt(format!("{} coordinates", v.len()))),
        },
        other => Err(StoreError::Corrupt(format!(
            "coordinates stored as {}",
            other.value_type()
        ))),
    }
}
