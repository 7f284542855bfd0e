//! Columnar tables.
//!
//! A [`Table`] stores a fixed number of rows in struct-of-arrays layout: one
//! [`Column`] per schema entry. Each column keeps its cells as raw
//! little-endian bytes, `item_size` bytes per row, laid out contiguously.
//! Strings occupy a fixed [`STR_WIDTH`]-byte slot, zero padded. Trailing
//! zero bytes are padding, so strings containing NUL are rejected on write.
//!
//! Tables also carry a small map of out-of-band attributes (lattice metadata)
//! that is not tied to any row.

use std::collections::BTreeMap;

use cuds_core::{AttributeValue, CudsError, ScalarKind};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnDef, ColumnName, TableSchema, check_type};

/// Byte width of a persisted string.
pub const STR_WIDTH: usize = 16;

/// Size in bytes of one element of `kind`.
#[must_use]
pub const fn element_size(kind: ScalarKind) -> usize {
    match kind {
        ScalarKind::Int32 => 4,
        ScalarKind::Int64 | ScalarKind::Float64 => 8,
        ScalarKind::Str => STR_WIDTH,
    }
}

/// A single column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Name and value type of the column.
    pub def: ColumnDef,
    /// Size of a single cell in bytes.
    pub item_size: usize,
    /// Raw cell storage. Length is always `item_size * rows`.
    pub data: Vec<u8>,
}

impl Column {
    /// A column of `rows` zero-filled cells.
    #[must_use]
    pub fn zeroed(def: ColumnDef, rows: usize) -> Self {
        let item_size = element_size(def.value_type.kind) * def.value_type.element_count();
        Self {
            def,
            item_size,
            data: vec![0; item_size * rows],
        }
    }

    /// Number of cells stored.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.item_size == 0 {
            return 0;
        }
        self.data.len() / self.item_size
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw bytes of the cell at `row`.
    #[must_use]
    pub fn get_raw(&self, row: usize) -> Option<&[u8]> {
        let start = row * self.item_size;
        self.data.get(start..start + self.item_size)
    }

    fn get_raw_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        let start = row * self.item_size;
        self.data.get_mut(start..start + self.item_size)
    }

    /// Append one zero-filled cell.
    pub fn push_zeroed(&mut self) {
        self.data.resize(self.data.len() + self.item_size, 0);
    }

    /// Overwrite the cell at `row` with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaConflict`], [`StoreError::StringTooLong`]
    /// or [`StoreError::NulInString`] if the value does not fit the column,
    /// or a `NotFound` model error if the row does not exist.
    pub fn write(&mut self, row: usize, value: &AttributeValue) -> StoreResult<()> {
        let bytes = encode_cell(&self.def, value)?;
        let slot = self
            .get_raw_mut(row)
            .ok_or_else(|| CudsError::not_found("row", row))?;
        slot.copy_from_slice(&bytes);
        Ok(())
    }

    /// Decode the cell at `row`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if the row does not exist, or
    /// [`StoreError::Corrupt`] if a string cell is not valid UTF-8.
    pub fn read(&self, row: usize) -> StoreResult<AttributeValue> {
        let bytes = self
            .get_raw(row)
            .ok_or_else(|| CudsError::not_found("row", row))?;
        decode_cell(&self.def, bytes)
    }
}

/// Check that `value` can be written into a column described by `def`.
///
/// # Errors
///
/// Same as [`Column::write`], minus the row lookup.
pub fn check_cell(def: &ColumnDef, value: &AttributeValue) -> StoreResult<()> {
    encode_cell(def, value).map(|_| ())
}

fn encode_cell(def: &ColumnDef, value: &AttributeValue) -> StoreResult<Vec<u8>> {
    check_type(def, value)?;
    let bytes = match value {
        AttributeValue::Int32(v) => v.to_le_bytes().to_vec(),
        AttributeValue::Int64(v) => v.to_le_bytes().to_vec(),
        AttributeValue::Float64(v) => v.to_le_bytes().to_vec(),
        AttributeValue::Str(s) => encode_str(def, s)?.to_vec(),
        AttributeValue::Int32Vec(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttributeValue::Int64Vec(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttributeValue::Float64Vec(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
        AttributeValue::StrVec(v) => {
            let mut out = Vec::with_capacity(v.len() * STR_WIDTH);
            for s in v {
                out.extend_from_slice(&encode_str(def, s)?);
            }
            out
        }
    };
    Ok(bytes)
}

fn encode_str(def: &ColumnDef, s: &str) -> StoreResult<[u8; STR_WIDTH]> {
    if s.len() > STR_WIDTH {
        return Err(StoreError::StringTooLong {
            column: def.name.to_string(),
            len: s.len(),
            max: STR_WIDTH,
        });
    }
    if s.contains('\0') {
        return Err(StoreError::NulInString {
            column: def.name.to_string(),
        });
    }
    let mut out = [0; STR_WIDTH];
    out[..s.len()].copy_from_slice(s.as_bytes());
    Ok(out)
}

fn decode_cell(def: &ColumnDef, bytes: &[u8]) -> StoreResult<AttributeValue> {
    let kind = def.value_type.kind;
    let mut chunks = bytes.chunks_exact(element_size(kind));
    let value = match (kind, def.value_type.is_vector()) {
        (ScalarKind::Int32, false) => {
            AttributeValue::Int32(first(&mut chunks, i32::from_le_bytes))
        }
        (ScalarKind::Int64, false) => {
            AttributeValue::Int64(first(&mut chunks, i64::from_le_bytes))
        }
        (ScalarKind::Float64, false) => {
            AttributeValue::Float64(first(&mut chunks, f64::from_le_bytes))
        }
        (ScalarKind::Str, false) => {
            AttributeValue::Str(decode_str(def, chunks.next().unwrap_or_default())?)
        }
        (ScalarKind::Int32, true) => {
            AttributeValue::Int32Vec(chunks.map(|c| i32::from_le_bytes(le(c))).collect())
        }
        (ScalarKind::Int64, true) => {
            AttributeValue::Int64Vec(chunks.map(|c| i64::from_le_bytes(le(c))).collect())
        }
        (ScalarKind::Float64, true) => {
            AttributeValue::Float64Vec(chunks.map(|c| f64::from_le_bytes(le(c))).collect())
        }
        (ScalarKind::Str, true) => AttributeValue::StrVec(
            chunks
                .map(|c| decode_str(def, c))
                .collect::<StoreResult<_>>()?,
        ),
    };
    Ok(value)
}

fn first<T, const N: usize>(
    chunks: &mut std::slice::ChunksExact<'_, u8>,
    from_le: fn([u8; N]) -> T,
) -> T {
    from_le(chunks.next().map(le).unwrap_or([0; N]))
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn decode_str(def: &ColumnDef, bytes: &[u8]) -> StoreResult<String> {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|e| StoreError::Corrupt(format!("column {}: {e}", def.name)))
}

/// An out-of-band table attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Text(String),
    Floats(Vec<f64>),
    Ints(Vec<i64>),
}

impl AttrValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Floats(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Ints(v) => Some(v),
            _ => None,
        }
    }
}

/// A columnar table with a stored schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: usize,
    /// One column per schema entry, in schema order.
    columns: Vec<Column>,
    #[serde(default)]
    attrs: BTreeMap<String, AttrValue>,
}

impl Table {
    /// A table of `rows` zero-filled rows.
    #[must_use]
    pub fn new(schema: TableSchema, rows: usize) -> Self {
        let columns = schema
            .columns()
            .iter()
            .map(|&def| Column::zeroed(def, rows))
            .collect();
        Self {
            schema,
            rows,
            columns,
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    #[must_use]
    pub fn column(&self, name: ColumnName) -> Option<&Column> {
        self.columns.iter().find(|c| c.def.name == name)
    }

    fn column_mut(&mut self, name: ColumnName) -> StoreResult<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.def.name == name)
            .ok_or_else(|| StoreError::Corrupt(format!("table has no column {name}")))
    }

    /// Remove `row`, shifting every later row down by one.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if the row does not exist.
    pub fn remove_row(&mut self, row: usize) -> StoreResult<()> {
        if row >= self.rows {
            return Err(CudsError::not_found("row", row).into());
        }
        for column in &mut self.columns {
            let start = row * column.item_size;
            column.data.drain(start..start + column.item_size);
        }
        self.rows -= 1;
        Ok(())
    }

    /// Append a zero-filled row and return its index.
    pub fn push_row(&mut self) -> usize {
        for column in &mut self.columns {
            column.push_zeroed();
        }
        self.rows += 1;
        self.rows - 1
    }

    /// Write `value` into column `name` of `row`.
    ///
    /// # Errors
    ///
    /// Fails if the column is missing or the value does not fit it; see
    /// [`Column::write`].
    pub fn write(
        &mut self,
        row: usize,
        name: ColumnName,
        value: &AttributeValue,
    ) -> StoreResult<()> {
        self.column_mut(name)?.write(row, value)
    }

    /// Read column `name` of `row`.
    ///
    /// # Errors
    ///
    /// Fails if the column or row is missing; see [`Column::read`].
    pub fn read(&self, row: usize, name: ColumnName) -> StoreResult<AttributeValue> {
        self.column(name)
            .ok_or_else(|| StoreError::Corrupt(format!("table has no column {name}")))?
            .read(row)
    }

    /// Out-of-band attributes.
    #[must_use]
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: AttrValue) {
        self.attrs.insert(name.into(), value);
    }

    /// A copy of this table laid out by `schema`.
    ///
    /// Columns present in both are copied verbatim, new columns are zero
    /// filled, and attributes are carried over. Row order is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SchemaConflict`] if `schema` retypes an existing
    /// column.
    pub fn migrated(&self, schema: TableSchema) -> StoreResult<Self> {
        let mut columns = Vec::with_capacity(schema.columns().len());
        for def in schema.columns() {
            let column = match self.column(def.name) {
                Some(existing) if existing.def == *def => existing.clone(),
                Some(existing) => {
                    return Err(StoreError::SchemaConflict {
                        column: def.name.to_string(),
                        expected: existing.def.value_type,
                        found: def.value_type,
                    });
                }
                None => Column::zeroed(*def, self.rows),
            };
            columns.push(column);
        }
        Ok(Self {
            schema,
            rows: self.rows,
            columns,
            attrs: self.attrs.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use cuds_core::{Cuba, ValueType};

    use super::*;

    fn density() -> ColumnDef {
        ColumnDef::new(
            ColumnName::Key(Cuba::Density),
            ValueType::scalar(ScalarKind::Float64),
        )
    }

    #[test]
    fn test_column_write_and_read() {
        let mut col = Column::zeroed(density(), 3);
        assert_eq!(col.len(), 3);
        col.write(1, &AttributeValue::Float64(2.5)).unwrap();
        assert_eq!(col.read(1).unwrap(), AttributeValue::Float64(2.5));
        assert_eq!(col.read(0).unwrap(), AttributeValue::Float64(0.0));
        assert!(col.read(3).is_err());
    }

    #[test]
    fn test_column_rejects_other_type() {
        let mut col = Column::zeroed(density(), 1);
        let err = col.write(0, &AttributeValue::Int32(1)).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));
    }

    #[test]
    fn test_vector_cells() {
        let def = ColumnDef::new(ColumnName::Name, ValueType::vector(ScalarKind::Int32, 2));
        let mut col = Column::zeroed(def, 2);
        assert_eq!(col.item_size, 8);
        col.write(1, &AttributeValue::Int32Vec(vec![4, -7])).unwrap();
        assert_eq!(col.read(1).unwrap(), AttributeValue::Int32Vec(vec![4, -7]));

        let err = col.write(0, &AttributeValue::Int32Vec(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(err, StoreError::SchemaConflict { .. }));
    }

    #[test]
    fn test_string_cells() {
        let def = ColumnDef::new(
            ColumnName::Key(Cuba::ChemicalSpecie),
            ValueType::scalar(ScalarKind::Str),
        );
        let mut col = Column::zeroed(def, 1);
        col.write(0, &AttributeValue::from("argon")).unwrap();
        assert_eq!(col.read(0).unwrap(), AttributeValue::from("argon"));

        let long = "a string longer than sixteen bytes";
        let err = col.write(0, &AttributeValue::from(long)).unwrap_err();
        assert!(matches!(err, StoreError::StringTooLong { max: STR_WIDTH, .. }));
        assert_eq!(col.read(0).unwrap(), AttributeValue::from("argon"));
    }

    #[test]
    fn test_string_with_nul_is_rejected() {
        let def = ColumnDef::new(
            ColumnName::Key(Cuba::ChemicalSpecie),
            ValueType::scalar(ScalarKind::Str),
        );
        let mut col = Column::zeroed(def, 1);
        col.write(0, &AttributeValue::from("ne")).unwrap();

        let err = col.write(0, &AttributeValue::from("a\0")).unwrap_err();
        assert!(matches!(err, StoreError::NulInString { .. }));
        let err = check_cell(&def, &AttributeValue::from("\0b")).unwrap_err();
        assert!(matches!(err, StoreError::NulInString { .. }));
        assert_eq!(col.read(0).unwrap(), AttributeValue::from("ne"));
    }

    #[test]
    fn test_remove_row_shifts_later_rows() {
        let mut table = Table::new(TableSchema::new(vec![density()]), 3);
        let key = ColumnName::Key(Cuba::Density);
        for row in 0..3 {
            table
                .write(row, key, &AttributeValue::Float64(row as f64))
                .unwrap();
        }

        table.remove_row(1).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.read(0, key).unwrap(), AttributeValue::Float64(0.0));
        assert_eq!(table.read(1, key).unwrap(), AttributeValue::Float64(2.0));
        assert!(table.remove_row(2).is_err());
    }

    #[test]
    fn test_push_row() {
        let mut table = Table::new(TableSchema::new(vec![density()]), 0);
        assert!(table.is_empty());
        let row = table.push_row();
        assert_eq!(row, 0);
        table
            .write(row, ColumnName::Key(Cuba::Density), &AttributeValue::Float64(1.0))
            .unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_migrated_keeps_rows_and_attrs() {
        let schema = TableSchema::lattice(1);
        let mut table = Table::new(schema.clone(), 2);
        table
            .write(1, ColumnName::Name, &AttributeValue::Int32Vec(vec![1]))
            .unwrap();
        table.set_attr("type", AttrValue::Text("Cubic".to_string()));

        let next = table.migrated(schema.extended(&[density()])).unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next.schema().version(), 2);
        assert_eq!(
            next.read(1, ColumnName::Name).unwrap(),
            AttributeValue::Int32Vec(vec![1])
        );
        assert_eq!(
            next.read(1, ColumnName::Key(Cuba::Density)).unwrap(),
            AttributeValue::Float64(0.0)
        );
        assert_eq!(next.attr("type").and_then(AttrValue::as_text), Some("Cubic"));
    }
}
