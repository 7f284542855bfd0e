//! Regular N-dimensional lattices.
//!
//! A [`Lattice`] stores one [`DataContainer`] per node, densely, in row-major
//! order. The mapping between integer coordinates and dense rows is the
//! [`RowMajor`] layout, shared with the persistence layer so that a lattice
//! and its persisted table always agree on row order.

use std::fmt;
use std::str::FromStr;

use cuds_core::{CudsError, CudsResult, DataContainer};
use serde::{Deserialize, Serialize};

/// Geometric family of a lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LatticeType {
    Cubic,
    Square,
    Rectangular,
    Hexagonal,
    OrthorombicP,
}

impl LatticeType {
    /// Persisted name of the lattice type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cubic => "Cubic",
            Self::Square => "Square",
            Self::Rectangular => "Rectangular",
            Self::Hexagonal => "Hexagonal",
            Self::OrthorombicP => "OrthorombicP",
        }
    }
}

impl fmt::Display for LatticeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LatticeType {
    type Err = CudsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cubic" => Ok(Self::Cubic),
            "Square" => Ok(Self::Square),
            "Rectangular" => Ok(Self::Rectangular),
            "Hexagonal" => Ok(Self::Hexagonal),
            "OrthorombicP" => Ok(Self::OrthorombicP),
            other => Err(CudsError::not_found("lattice type", other)),
        }
    }
}

/// Row-major mapping between N-dimensional coordinates and dense rows.
///
/// The last axis varies fastest. `row_index` and `coord_from_row` are exact
/// inverses on `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMajor {
    size: Vec<usize>,
    strides: Vec<usize>,
    len: usize,
}

impl RowMajor {
    /// Build the layout of a grid with the given extent per axis.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::TooLarge`] if the row count overflows `usize` or
    /// an axis has more positions than an `i32` coordinate can address.
    pub fn new(size: &[usize]) -> CudsResult<Self> {
        let too_large = || CudsError::TooLarge {
            size: size.to_vec(),
        };
        if size
            .iter()
            .any(|&extent| i32::try_from(extent.saturating_sub(1)).is_err())
        {
            return Err(too_large());
        }
        let mut strides = vec![1_usize; size.len()];
        for axis in (0..size.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1]
                .checked_mul(size[axis + 1])
                .ok_or_else(too_large)?;
        }
        let len = size
            .iter()
            .try_fold(1_usize, |acc, &extent| acc.checked_mul(extent))
            .ok_or_else(too_large)?;
        Ok(Self {
            size: size.to_vec(),
            strides,
            len,
        })
    }

    /// Extent per axis.
    #[must_use]
    pub fn size(&self) -> &[usize] {
        &self.size
    }

    /// Number of axes.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.size.len()
    }

    /// Total number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense row of `coord`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::Dimension`] if `coord` has the wrong number of
    /// axes and [`CudsError::OutOfRange`] if any component is negative or not
    /// below the extent of its axis.
    pub fn row_index(&self, coord: &[i32]) -> CudsResult<usize> {
        if coord.len() != self.size.len() {
            return Err(CudsError::Dimension {
                expected: self.size.len(),
                found: coord.len(),
            });
        }
        let mut row = 0;
        for ((&c, &extent), &stride) in coord.iter().zip(&self.size).zip(&self.strides) {
            let c = usize::try_from(c)
                .ok()
                .filter(|&c| c < extent)
                .ok_or_else(|| CudsError::OutOfRange {
                    coord: coord.to_vec(),
                    size: self.size.clone(),
                })?;
            row += c * stride;
        }
        Ok(row)
    }

    /// Coordinate stored at `row`, or `None` past the last row.
    #[must_use]
    pub fn coord_from_row(&self, row: usize) -> Option<Vec<i32>> {
        if row >= self.len() {
            return None;
        }
        self.size
            .iter()
            .zip(&self.strides)
            .map(|(&extent, &stride)| i32::try_from((row / stride) % extent).ok())
            .collect()
    }

    /// Every coordinate of the grid in row order.
    pub fn coords(&self) -> impl Iterator<Item = Vec<i32>> + '_ {
        (0..self.len()).filter_map(|row| self.coord_from_row(row))
    }
}

/// A node of a lattice: its coordinate and attribute data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeNode {
    /// Integer coordinate of the node.
    pub id: Vec<i32>,
    pub data: DataContainer,
}

impl LatticeNode {
    /// A node at `id` with no data.
    #[must_use]
    pub fn new(id: impl Into<Vec<i32>>) -> Self {
        Self {
            id: id.into(),
            data: DataContainer::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: DataContainer) -> Self {
        self.data = data;
        self
    }
}

/// An in-memory lattice with dense node data.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    name: String,
    lattice_type: LatticeType,
    base_vect: Vec<f64>,
    origin: Vec<f64>,
    layout: RowMajor,
    nodes: Vec<DataContainer>,
}

impl Lattice {
    /// Create a lattice with empty node data.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::Dimension`] if `base_vect` or `origin` do not have
    /// one component per axis of `size`, and [`CudsError::TooLarge`] for a size
    /// whose rows cannot be addressed.
    pub fn new(
        name: impl Into<String>,
        lattice_type: LatticeType,
        base_vect: Vec<f64>,
        size: Vec<usize>,
        origin: Vec<f64>,
    ) -> CudsResult<Self> {
        for found in [base_vect.len(), origin.len()] {
            if found != size.len() {
                return Err(CudsError::Dimension {
                    expected: size.len(),
                    found,
                });
            }
        }
        Self::build(name.into(), lattice_type, base_vect, &size, origin)
    }

    fn build(
        name: String,
        lattice_type: LatticeType,
        base_vect: Vec<f64>,
        size: &[usize],
        origin: Vec<f64>,
    ) -> CudsResult<Self> {
        let layout = RowMajor::new(size)?;
        let nodes = vec![DataContainer::new(); layout.len()];
        Ok(Self {
            name,
            lattice_type,
            base_vect,
            origin,
            layout,
            nodes,
        })
    }

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

    /// The coordinate layout of this lattice.
    #[must_use]
    pub fn layout(&self) -> &RowMajor {
        &self.layout
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get a copy of the node at `coord`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::OutOfRange`] or [`CudsError::Dimension`] for an
    /// invalid coordinate.
    pub fn get_node(&self, coord: &[i32]) -> CudsResult<LatticeNode> {
        let row = self.layout.row_index(coord)?;
        Ok(LatticeNode {
            id: coord.to_vec(),
            data: self.nodes[row].clone(),
        })
    }

    /// Replace the data of the node at `node.id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::OutOfRange`] or [`CudsError::Dimension`] for an
    /// invalid coordinate.
    pub fn update_node(&mut self, node: &LatticeNode) -> CudsResult<()> {
        let row = self.layout.row_index(&node.id)?;
        self.nodes[row] = node.data.clone();
        Ok(())
    }

    /// Iterate over copies of every node in row order, or of the nodes at
    /// `coords` in the given order.
    #[must_use]
    pub fn iter_nodes<'a>(&'a self, coords: Option<&'a [Vec<i32>]>) -> LatticeNodes<'a> {
        let source = match coords {
            Some(coords) => NodeSource::Coords(coords.iter()),
            None => NodeSource::Rows(0..self.nodes.len()),
        };
        LatticeNodes {
            lattice: self,
            source,
        }
    }

    /// Position in space of the node at `coord`: `origin + base_vect * coord`
    /// component-wise.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::Dimension`] if `coord` does not have one
    /// component per axis.
    pub fn get_coordinate(&self, coord: &[i32]) -> CudsResult<Vec<f64>> {
        position(&self.origin, &self.base_vect, coord)
    }
}

/// Lazy iterator over copies of lattice nodes.
#[derive(Debug, Clone)]
pub struct LatticeNodes<'a> {
    lattice: &'a Lattice,
    source: NodeSource<'a>,
}

#[derive(Debug, Clone)]
enum NodeSource<'a> {
    Rows(std::ops::Range<usize>),
    Coords(std::slice::Iter<'a, Vec<i32>>),
}

impl Iterator for LatticeNodes<'_> {
    type Item = CudsResult<LatticeNode>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            NodeSource::Rows(rows) => {
                let row = rows.next()?;
                let id = self.lattice.layout.coord_from_row(row)?;
                Some(Ok(LatticeNode {
                    id,
                    data: self.lattice.nodes[row].clone(),
                }))
            }
            NodeSource::Coords(coords) => coords.next().map(|c| self.lattice.get_node(c)),
        }
    }
}

/// `origin + base_vect * coord` component-wise, for any lattice geometry.
///
/// # Errors
///
/// Returns [`CudsError::Dimension`] if `coord` and `origin` differ in length.
pub fn position(origin: &[f64], base_vect: &[f64], coord: &[i32]) -> CudsResult<Vec<f64>> {
    if coord.len() != origin.len() {
        return Err(CudsError::Dimension {
            expected: origin.len(),
            found: coord.len(),
        });
    }
    Ok(origin
        .iter()
        .zip(base_vect)
        .zip(coord)
        .map(|((&o, &b), &c)| o + b * f64::from(c))
        .collect())
}

// -- Factories --
//
// Each factory fails with `CudsError::TooLarge` for a size whose rows cannot
// be addressed.

/// A 2D hexagonal lattice with spacing `h`.
pub fn make_hexagonal_lattice(
    name: &str,
    h: f64,
    size: [usize; 2],
    origin: [f64; 2],
) -> CudsResult<Lattice> {
    let base_vect = vec![0.5 * h, 0.5 * 3.0_f64.sqrt() * h];
    Lattice::build(
        name.to_string(),
        LatticeType::Hexagonal,
        base_vect,
        &size,
        origin.to_vec(),
    )
}

/// A 2D square lattice with spacing `h`.
pub fn make_square_lattice(
    name: &str,
    h: f64,
    size: [usize; 2],
    origin: [f64; 2],
) -> CudsResult<Lattice> {
    Lattice::build(
        name.to_string(),
        LatticeType::Square,
        vec![h, h],
        &size,
        origin.to_vec(),
    )
}

/// A 2D rectangular lattice with spacings `h`.
pub fn make_rectangular_lattice(
    name: &str,
    h: [f64; 2],
    size: [usize; 2],
    origin: [f64; 2],
) -> CudsResult<Lattice> {
    Lattice::build(
        name.to_string(),
        LatticeType::Rectangular,
        h.to_vec(),
        &size,
        origin.to_vec(),
    )
}

/// A 3D cubic lattice with spacing `h`.
pub fn make_cubic_lattice(
    name: &str,
    h: f64,
    size: [usize; 3],
    origin: [f64; 3],
) -> CudsResult<Lattice> {
    Lattice::build(
        name.to_string(),
        LatticeType::Cubic,
        vec![h, h, h],
        &size,
        origin.to_vec(),
    )
}

/// A 3D primitive orthorhombic lattice with spacings `h`.
pub fn make_orthorombicp_lattice(
    name: &str,
    h: [f64; 3],
    size: [usize; 3],
    origin: [f64; 3],
) -> CudsResult<Lattice> {
    Lattice::build(
        name.to_string(),
        LatticeType::OrthorombicP,
        h.to_vec(),
        &size,
        origin.to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use cuds_core::{AttributeValue, Cuba};

    use super::*;

    #[test]
    fn test_row_index_bijection() {
        let layout = RowMajor::new(&[3, 4, 2]).unwrap();
        assert_eq!(layout.len(), 24);
        for row in 0..layout.len() {
            let coord = layout.coord_from_row(row).unwrap();
            assert_eq!(layout.row_index(&coord).unwrap(), row);
        }
        assert_eq!(layout.coord_from_row(24), None);
    }

    #[test]
    fn test_last_axis_fastest() {
        let layout = RowMajor::new(&[2, 3]).unwrap();
        assert_eq!(layout.row_index(&[0, 1]).unwrap(), 1);
        assert_eq!(layout.row_index(&[1, 0]).unwrap(), 3);
    }

    #[test]
    fn test_row_index_out_of_range() {
        let layout = RowMajor::new(&[3, 3]).unwrap();
        assert!(matches!(
            layout.row_index(&[3, 0]),
            Err(CudsError::OutOfRange { .. })
        ));
        assert!(matches!(
            layout.row_index(&[-1, 0]),
            Err(CudsError::OutOfRange { .. })
        ));
        assert!(matches!(
            layout.row_index(&[0]),
            Err(CudsError::Dimension { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_hexagonal_base_vect() {
        let lattice = make_hexagonal_lattice("hex", 0.1, [5, 4], [0.0, 0.0]).unwrap();
        assert_eq!(lattice.lattice_type(), LatticeType::Hexagonal);
        assert_eq!(lattice.base_vect()[0], 0.05);
        assert!((lattice.base_vect()[1] - 0.5 * 3.0_f64.sqrt() * 0.1).abs() < 1e-12);
        assert_eq!(lattice.node_count(), 20);
    }

    #[test]
    fn test_factory_types() {
        assert_eq!(
            make_square_lattice("s", 1.0, [2, 2], [0.0; 2]).unwrap().lattice_type(),
            LatticeType::Square
        );
        assert_eq!(
            make_rectangular_lattice("r", [1.0, 2.0], [2, 2], [0.0; 2])
                .unwrap()
                .base_vect(),
            &[1.0, 2.0]
        );
        assert_eq!(
            make_cubic_lattice("c", 0.5, [2, 2, 2], [0.0; 3]).unwrap().base_vect(),
            &[0.5, 0.5, 0.5]
        );
        assert_eq!(
            make_orthorombicp_lattice("o", [1.0, 2.0, 3.0], [1, 2, 3], [0.0; 3])
                .unwrap()
                .size(),
            &[1, 2, 3]
        );
    }

    #[test]
    fn test_new_checks_dimensions() {
        let err = Lattice::new(
            "bad",
            LatticeType::Cubic,
            vec![1.0, 1.0],
            vec![2, 2, 2],
            vec![0.0; 3],
        )
        .unwrap_err();
        assert_eq!(err, CudsError::Dimension { expected: 3, found: 2 });
    }

    #[test]
    fn test_get_coordinate() {
        let lattice = make_rectangular_lattice("r", [0.5, 2.0], [4, 4], [1.0, -1.0]).unwrap();
        assert_eq!(lattice.get_coordinate(&[2, 3]).unwrap(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_get_coordinate_checks_dimensions() {
        let lattice = make_cubic_lattice("c", 1.0, [2, 2, 2], [0.0; 3]).unwrap();
        assert_eq!(
            lattice.get_coordinate(&[1, 1]).unwrap_err(),
            CudsError::Dimension { expected: 3, found: 2 }
        );
        assert!(lattice.get_coordinate(&[1, 1, 1, 1]).is_err());
    }

    #[test]
    fn test_layout_rejects_overflowing_size() {
        let err = RowMajor::new(&[usize::MAX / 2, 3]).unwrap_err();
        assert!(matches!(err, CudsError::TooLarge { .. }));
        assert!(RowMajor::new(&[1 << 20, 1 << 20, 1 << 30]).is_err());
        let too_wide = usize::try_from(i64::from(i32::MAX) + 2).unwrap();
        assert!(RowMajor::new(&[too_wide]).is_err());
        assert!(RowMajor::new(&[0, 5]).unwrap().is_empty());
    }

    #[test]
    fn test_factory_rejects_overflowing_size() {
        let err = make_square_lattice("huge", 1.0, [usize::MAX, 2], [0.0; 2]).unwrap_err();
        assert!(matches!(err, CudsError::TooLarge { .. }));
    }

    #[test]
    fn test_label_roundtrip() {
        let mut lattice = make_square_lattice("sq", 0.1, [10, 10], [0.0, 0.0]).unwrap();
        for i in 0..10 {
            let mut node = lattice.get_node(&[i, i]).unwrap();
            node.data.insert(Cuba::Label, i);
            lattice.update_node(&node).unwrap();
        }

        let coords: Vec<Vec<i32>> = (0..10).map(|i| vec![i, i]).collect();
        let sum: i32 = lattice
            .iter_nodes(Some(&coords))
            .map(|node| match node.unwrap().data.get(Cuba::Label).unwrap() {
                AttributeValue::Int32(v) => *v,
                other => panic!("unexpected {other:?}"),
            })
            .sum();
        assert_eq!(sum, 45);
    }

    #[test]
    fn test_iter_all_nodes_in_row_order() {
        let lattice = make_square_lattice("sq", 1.0, [2, 2], [0.0, 0.0]).unwrap();
        let ids: Vec<Vec<i32>> = lattice.iter_nodes(None).map(|n| n.unwrap().id).collect();
        assert_eq!(ids, vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]]);
    }

    #[test]
    fn test_get_node_returns_copy() {
        let mut lattice = make_square_lattice("sq", 1.0, [2, 2], [0.0, 0.0]).unwrap();
        let mut node = lattice.get_node(&[1, 1]).unwrap();
        node.data.insert(Cuba::Density, 2.0);
        assert!(lattice.get_node(&[1, 1]).unwrap().data.is_empty());

        lattice.update_node(&node).unwrap();
        assert!(lattice.get_node(&[1, 1]).unwrap().data.contains(Cuba::Density));
    }

    #[test]
    fn test_lattice_type_parse() {
        assert_eq!("OrthorombicP".parse::<LatticeType>().unwrap(), LatticeType::OrthorombicP);
        assert!("Triclinic".parse::<LatticeType>().is_err());
    }
}
