//! Persistent unstructured meshes.
//!
//! A [`FileMesh`] keeps one mesh in a store group. Points live in `points`
//! (coordinates plus current data) and `points_past` (past data). Each
//! element kind has a table holding the ids of its points and its measure,
//! and a `<kind>_shared` table holding its shared data.
//!
//! Elements store point ids, not point values: reading an element resolves
//! its points against the point tables at that time.

use std::collections::{HashMap, HashSet};

use cuds_core::{AttributeValue, CudsError, DataContainer};
use cuds_model::{Cell, Edge, EntityKind, Face, Mesh, MeshElement, Point};
use tracing::info;
use uuid::Uuid;

use crate::entity_table::{
    COORDINATES, EntityRow, EntityTable, MEASURE, MEMBER_COUNT, MEMBERS, decode_coordinates,
    decode_members, encode_coordinates, encode_members,
};
use crate::error::{StoreError, StoreResult};
use crate::path::NodePath;
use crate::store::StoreHandle;

/// Handle to a mesh persisted in a store.
#[derive(Debug, Clone)]
pub struct FileMesh {
    name: String,
    points: PointTables,
    edges: ElementTables,
    faces: ElementTables,
    cells: ElementTables,
}

impl FileMesh {
    /// Open the mesh stored in `group`, creating empty tables for any that
    /// are missing.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn create_or_open(store: &StoreHandle, group: &NodePath) -> StoreResult<Self> {
        Ok(Self {
            name: group.name().unwrap_or_default().to_string(),
            points: PointTables::create_or_open(store, group)?,
            edges: ElementTables::create_or_open(store, group, "edges", EntityKind::Edge)?,
            faces: ElementTables::create_or_open(store, group, "faces", EntityKind::Face)?,
            cells: ElementTables::create_or_open(store, group, "cells", EntityKind::Cell)?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // -- Points --

    /// Add copies of `points`.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if an id is already stored or
    /// repeats in the batch. Nothing is written in that case.
    pub fn add_points(&mut self, points: &[Point]) -> StoreResult<()> {
        self.points.insert(points.iter())
    }

    /// # Errors
    ///
    /// See [`add_points`](Self::add_points).
    pub fn add_point(&mut self, point: &Point) -> StoreResult<()> {
        self.add_points(std::slice::from_ref(point))
    }

    /// Overwrite stored points, current and past data included.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored.
    pub fn update_points(&mut self, points: &[Point]) -> StoreResult<()> {
        self.points.update(points)
    }

    /// # Errors
    ///
    /// See [`update_points`](Self::update_points).
    pub fn update_point(&mut self, point: &Point) -> StoreResult<()> {
        self.update_points(std::slice::from_ref(point))
    }

    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such point is stored.
    pub fn get_point(&self, id: Uuid) -> StoreResult<Point> {
        self.points.get(id)
    }

    /// Iterate over stored points, or over those in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_points(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Point>> + use<>> {
        self.points.iter(ids)
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn point_count(&self) -> StoreResult<usize> {
        self.points.main.len()
    }

    // -- Elements --

    /// Add copies of `edges` and register the points they reference that
    /// are not stored yet.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if an edge id is already stored,
    /// or [`StoreError::TooManyMembers`] for an edge over too many points.
    /// Nothing is written in either case.
    pub fn add_edges(&mut self, edges: &[Edge]) -> StoreResult<()> {
        self.edges.insert(&mut self.points, edges)
    }

    /// # Errors
    ///
    /// See [`add_edges`](Self::add_edges).
    pub fn add_edge(&mut self, edge: &Edge) -> StoreResult<()> {
        self.add_edges(std::slice::from_ref(edge))
    }

    /// Add copies of `faces`, registering unknown points.
    ///
    /// # Errors
    ///
    /// See [`add_edges`](Self::add_edges).
    pub fn add_faces(&mut self, faces: &[Face]) -> StoreResult<()> {
        self.faces.insert(&mut self.points, faces)
    }

    /// # Errors
    ///
    /// See [`add_edges`](Self::add_edges).
    pub fn add_face(&mut self, face: &Face) -> StoreResult<()> {
        self.add_faces(std::slice::from_ref(face))
    }

    /// Add copies of `cells`, registering unknown points.
    ///
    /// # Errors
    ///
    /// See [`add_edges`](Self::add_edges).
    pub fn add_cells(&mut self, cells: &[Cell]) -> StoreResult<()> {
        self.cells.insert(&mut self.points, cells)
    }

    /// # Errors
    ///
    /// See [`add_edges`](Self::add_edges).
    pub fn add_cell(&mut self, cell: &Cell) -> StoreResult<()> {
        self.add_cells(std::slice::from_ref(cell))
    }

    /// Overwrite stored edges. The referenced points must already be stored
    /// and are not updated.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an edge or one of its points is
    /// not stored. Nothing is written in that case.
    pub fn update_edges(&mut self, edges: &[Edge]) -> StoreResult<()> {
        self.edges.update(&self.points, edges)
    }

    /// # Errors
    ///
    /// See [`update_edges`](Self::update_edges).
    pub fn update_edge(&mut self, edge: &Edge) -> StoreResult<()> {
        self.update_edges(std::slice::from_ref(edge))
    }

    /// # Errors
    ///
    /// See [`update_edges`](Self::update_edges).
    pub fn update_faces(&mut self, faces: &[Face]) -> StoreResult<()> {
        self.faces.update(&self.points, faces)
    }

    /// # Errors
    ///
    /// See [`update_edges`](Self::update_edges).
    pub fn update_face(&mut self, face: &Face) -> StoreResult<()> {
        self.update_faces(std::slice::from_ref(face))
    }

    /// # Errors
    ///
    /// See [`update_edges`](Self::update_edges).
    pub fn update_cells(&mut self, cells: &[Cell]) -> StoreResult<()> {
        self.cells.update(&self.points, cells)
    }

    /// # Errors
    ///
    /// See [`update_edges`](Self::update_edges).
    pub fn update_cell(&mut self, cell: &Cell) -> StoreResult<()> {
        self.update_cells(std::slice::from_ref(cell))
    }

    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such edge is stored.
    pub fn get_edge(&self, id: Uuid) -> StoreResult<Edge> {
        self.edges.get(&self.points, id)
    }

    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such face is stored.
    pub fn get_face(&self, id: Uuid) -> StoreResult<Face> {
        self.faces.get(&self.points, id)
    }

    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such cell is stored.
    pub fn get_cell(&self, id: Uuid) -> StoreResult<Cell> {
        self.cells.get(&self.points, id)
    }

    /// Iterate over stored edges, or over those in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_edges(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Edge>> + use<>> {
        self.edges.iter(&self.points, ids)
    }

    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_faces(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Face>> + use<>> {
        self.faces.iter(&self.points, ids)
    }

    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_cells(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Cell>> + use<>> {
        self.cells.iter(&self.points, ids)
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_edges(&self) -> StoreResult<bool> {
        Ok(!self.edges.main.is_empty()?)
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_faces(&self) -> StoreResult<bool> {
        Ok(!self.faces.main.is_empty()?)
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_cells(&self) -> StoreResult<bool> {
        Ok(!self.cells.main.is_empty()?)
    }

    // -- Whole mesh --

    /// Write every entity of `mesh`, one batch per table.
    ///
    /// # Errors
    ///
    /// See [`add_points`](Self::add_points) and [`add_edges`](Self::add_edges).
    pub fn copy_from(&mut self, mesh: &Mesh) -> StoreResult<()> {
        let points = mesh.iter_points(None).collect::<Result<Vec<_>, _>>()?;
        let edges = mesh.iter_edges(None).collect::<Result<Vec<_>, _>>()?;
        let faces = mesh.iter_faces(None).collect::<Result<Vec<_>, _>>()?;
        let cells = mesh.iter_cells(None).collect::<Result<Vec<_>, _>>()?;
        self.add_points(&points)?;
        self.add_edges(&edges)?;
        self.add_faces(&faces)?;
        self.add_cells(&cells)?;
        info!(
            mesh = %self.name,
            points = points.len(),
            edges = edges.len(),
            faces = faces.len(),
            cells = cells.len(),
            "copied mesh"
        );
        Ok(())
    }

    /// Read the whole mesh back into memory.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn load(&self) -> StoreResult<Mesh> {
        let mut mesh = Mesh::new();
        for point in self.iter_points(None)? {
            mesh.add_point(&point?)?;
        }
        for edge in self.iter_edges(None)? {
            mesh.add_edge(&edge?)?;
        }
        for face in self.iter_faces(None)? {
            mesh.add_face(&face?)?;
        }
        for cell in self.iter_cells(None)? {
            mesh.add_cell(&cell?)?;
        }
        Ok(mesh)
    }
}

/// Element kinds stored as point ids plus a measure.
trait StoredElement: MeshElement {
    fn measure(&self) -> f64;
    fn data(&self) -> &DataContainer;
    fn shared_data(&self) -> &DataContainer;
    fn assemble(
        id: Uuid,
        points: Vec<Point>,
        measure: f64,
        data: DataContainer,
        shared_data: DataContainer,
    ) -> Self;
}

macro_rules! stored_element {
    ($ty:ident, $measure:ident) => {
        impl StoredElement for $ty {
            fn measure(&self) -> f64 {
                self.$measure
            }

            fn data(&self) -> &DataContainer {
                &self.data
            }

            fn shared_data(&self) -> &DataContainer {
                &self.shared_data
            }

            fn assemble(
                id: Uuid,
                points: Vec<Point>,
                measure: f64,
                data: DataContainer,
                shared_data: DataContainer,
            ) -> Self {
                Self {
                    id,
                    points,
                    data,
                    shared_data,
                    $measure: measure,
                }
            }
        }
    };
}

stored_element!(Edge, length);
stored_element!(Face, area);
stored_element!(Cell, volume);

#[derive(Debug, Clone)]
struct PointTables {
    main: EntityTable,
    past: EntityTable,
}

impl PointTables {
    fn create_or_open(store: &StoreHandle, group: &NodePath) -> StoreResult<Self> {
        let kind = EntityKind::Point.name();
        Ok(Self {
            main: EntityTable::create_or_open(store, group, "points", kind, &[COORDINATES])?,
            past: EntityTable::create_or_open(store, group, "points_past", kind, &[])?,
        })
    }

    fn insert<'a>(&mut self, points: impl Iterator<Item = &'a Point>) -> StoreResult<()> {
        let (main, past): (Vec<_>, Vec<_>) = points.map(point_rows).unzip();
        self.main.check_insert(&main)?;
        self.past.check_insert(&past)?;
        self.main.insert(&main)?;
        self.past.insert(&past)
    }

    fn update(&mut self, points: &[Point]) -> StoreResult<()> {
        let (main, past): (Vec<_>, Vec<_>) = points.iter().map(point_rows).unzip();
        self.main.check_update(&main)?;
        self.past.check_update(&past)?;
        self.main.update(&main)?;
        self.past.update(&past)
    }

    fn get(&self, id: Uuid) -> StoreResult<Point> {
        point_from_rows(self.main.get(id)?, self.past.get(id)?)
    }

    fn iter(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Point>> + use<>> {
        let past = self.past.iter(ids)?;
        Ok(self
            .main
            .iter(ids)?
            .zip(past)
            .map(|(main, past)| point_from_rows(main?, past?)))
    }

    /// Every stored point by id.
    fn snapshot(&self) -> StoreResult<HashMap<Uuid, Point>> {
        self.iter(None)?
            .map(|point| point.map(|p| (p.id, p)))
            .collect()
    }

    /// Ids of stored points as a set.
    fn known(&self) -> StoreResult<HashSet<Uuid>> {
        Ok(self.main.ids()?.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
struct ElementTables {
    main: EntityTable,
    shared: EntityTable,
}

impl ElementTables {
    fn create_or_open(
        store: &StoreHandle,
        group: &NodePath,
        node: &str,
        kind: EntityKind,
    ) -> StoreResult<Self> {
        let name = kind.name();
        Ok(Self {
            main: EntityTable::create_or_open(
                store,
                group,
                node,
                name,
                &[MEMBERS, MEMBER_COUNT, MEASURE],
            )?,
            shared: EntityTable::create_or_open(store, group, &format!("{node}_shared"), name, &[])?,
        })
    }

    fn insert<E: StoredElement>(
        &mut self,
        points: &mut PointTables,
        elements: &[E],
    ) -> StoreResult<()> {
        let (main, shared) = element_rows(elements)?;
        self.main.check_insert(&main)?;
        self.shared.check_insert(&shared)?;

        let known = points.known()?;
        let mut queued = HashSet::new();
        let fresh = elements
            .iter()
            .flat_map(MeshElement::points)
            .filter(|p| !known.contains(&p.id) && queued.insert(p.id));
        points.insert(fresh)?;

        self.main.insert(&main)?;
        self.shared.insert(&shared)
    }

    fn update<E: StoredElement>(&mut self, points: &PointTables, elements: &[E]) -> StoreResult<()> {
        let known = points.known()?;
        if let Some(missing) = elements
            .iter()
            .flat_map(MeshElement::points)
            .find(|p| !known.contains(&p.id))
        {
            return Err(CudsError::not_found(EntityKind::Point.name(), missing.id).into());
        }
        let (main, shared) = element_rows(elements)?;
        self.main.check_update(&main)?;
        self.shared.check_update(&shared)?;
        self.main.update(&main)?;
        self.shared.update(&shared)
    }

    fn get<E: StoredElement>(&self, points: &PointTables, id: Uuid) -> StoreResult<E> {
        element_from_rows(self.main.get(id)?, self.shared.get(id)?, |id| points.get(id))
    }

    fn iter<E: StoredElement>(
        &self,
        points: &PointTables,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<E>> + use<E>> {
        let points = points.snapshot()?;
        let shared = self.shared.iter(ids)?;
        Ok(self
            .main
            .iter(ids)?
            .zip(shared)
            .map(move |(main, shared)| {
                element_from_rows::<E>(main?, shared?, |id| {
                    points
                        .get(&id)
                        .cloned()
                        .ok_or_else(|| CudsError::not_found(EntityKind::Point.name(), id).into())
                })
            }))
    }
}

fn point_rows(point: &Point) -> (EntityRow, EntityRow) {
    (
        EntityRow::new(
            point.id,
            vec![encode_coordinates(point.coordinates)],
            point.data.clone(),
        ),
        EntityRow::new(point.id, Vec::new(), point.past_data.clone()),
    )
}

fn point_from_rows(main: EntityRow, past: EntityRow) -> StoreResult<Point> {
    same_id(&main, &past)?;
    let [coordinates] = main.fields.as_slice() else {
        return Err(StoreError::Corrupt(format!("point {} has no coordinates", main.id)));
    };
    let mut point = Point::with_id(main.id, decode_coordinates(coordinates)?).with_data(main.data);
    point.past_data = past.data;
    Ok(point)
}

fn element_rows<E: StoredElement>(elements: &[E]) -> StoreResult<(Vec<EntityRow>, Vec<EntityRow>)> {
    let kind = E::KIND.name();
    let mut main = Vec::with_capacity(elements.len());
    let mut shared = Vec::with_capacity(elements.len());
    for element in elements {
        let ids: Vec<Uuid> = element.points().iter().map(|p| p.id).collect();
        let (members, count) = encode_members(kind, &ids)?;
        main.push(EntityRow::new(
            element.id(),
            vec![members, count, AttributeValue::Float64(element.measure())],
            element.data().clone(),
        ));
        shared.push(EntityRow::new(
            element.id(),
            Vec::new(),
            element.shared_data().clone(),
        ));
    }
    Ok((main, shared))
}

fn element_from_rows<E: StoredElement>(
    main: EntityRow,
    shared: EntityRow,
    resolve: impl Fn(Uuid) -> StoreResult<Point>,
) -> StoreResult<E> {
    same_id(&main, &shared)?;
    let [members, count, AttributeValue::Float64(measure)] = main.fields.as_slice() else {
        return Err(StoreError::Corrupt(format!(
            "{} {} has malformed columns",
            E::KIND,
            main.id
        )));
    };
    let points = decode_members(members, count)?
        .into_iter()
        .map(resolve)
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(E::assemble(main.id, points, *measure, main.data, shared.data))
}

/// Rows of companion tables are written together and must line up.
fn same_id(a: &EntityRow, b: &EntityRow) -> StoreResult<()> {
    if a.id == b.id {
        Ok(())
    } else {
        Err(StoreError::Corrupt(format!(
            "companion rows {} and {} are out of step",
            a.id, b.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use cuds_core::Cuba;
    use cuds_model::DVec3;

    use super::*;
    use crate::store::MemoryStore;

    fn mesh() -> FileMesh {
        let store = StoreHandle::new(MemoryStore::new());
        FileMesh::create_or_open(&store, &NodePath::parse("/mesh/grid")).unwrap()
    }

    fn point(x: f64) -> Point {
        let mut p = Point::new(DVec3::new(x, 0.0, 0.0));
        p.data.insert(Cuba::Temperature, x);
        p.past_data.insert(Cuba::Temperature, x - 1.0);
        p
    }

    #[test]
    fn test_add_and_get_points() {
        let mut m = mesh();
        let ps = vec![point(0.0), point(1.0)];
        m.add_points(&ps).unwrap();

        assert_eq!(m.point_count().unwrap(), 2);
        assert_eq!(m.get_point(ps[1].id).unwrap(), ps[1]);
        assert!(matches!(
            m.add_point(&ps[0]),
            Err(StoreError::Model(CudsError::DuplicateId { kind: "point", .. }))
        ));
    }

    #[test]
    fn test_update_point_replaces_both_containers() {
        let mut m = mesh();
        let mut p = point(1.0);
        m.add_point(&p).unwrap();

        p.coordinates = DVec3::new(3.0, 2.0, 1.0);
        p.data = DataContainer::new();
        p.past_data.insert(Cuba::Pressure, 5.0);
        m.update_point(&p).unwrap();
        assert_eq!(m.get_point(p.id).unwrap(), p);
        assert!(m.update_point(&point(9.0)).is_err());
    }

    #[test]
    fn test_add_edge_registers_unknown_points() {
        let mut m = mesh();
        let known = point(0.0);
        m.add_point(&known).unwrap();

        let mut edge = Edge::new(vec![known.clone(), point(1.0)], 1.0);
        edge.data.insert(Cuba::Label, 2);
        edge.shared_data.insert(Cuba::Mass, 0.5);
        m.add_edge(&edge).unwrap();

        assert_eq!(m.point_count().unwrap(), 2);
        assert_eq!(m.get_edge(edge.id).unwrap(), edge);
        assert!(m.has_edges().unwrap());
        assert!(!m.has_faces().unwrap());
        assert!(!m.has_cells().unwrap());
    }

    #[test]
    fn test_add_face_with_duplicate_id_writes_nothing() {
        let mut m = mesh();
        let face = Face::new(vec![point(0.0), point(1.0), point(2.0)], 0.5);
        m.add_face(&face).unwrap();

        let again = Face {
            points: vec![point(5.0)],
            ..face.clone()
        };
        assert!(matches!(
            m.add_face(&again),
            Err(StoreError::Model(CudsError::DuplicateId { kind: "face", .. }))
        ));
        assert_eq!(m.point_count().unwrap(), 3);
    }

    #[test]
    fn test_oversized_cell_writes_nothing() {
        let mut m = mesh();
        let cell = Cell::new((0..21).map(|i| point(f64::from(i))).collect(), 1.0);
        assert!(matches!(
            m.add_cell(&cell),
            Err(StoreError::TooManyMembers { kind: "cell", .. })
        ));
        assert_eq!(m.point_count().unwrap(), 0);
        assert!(!m.has_cells().unwrap());
    }

    #[test]
    fn test_update_element_with_unknown_point_fails() {
        let mut m = mesh();
        let mut edge = Edge::new(vec![point(0.0), point(1.0)], 1.0);
        m.add_edge(&edge).unwrap();

        let stray = point(7.0);
        edge.points.push(stray.clone());
        let err = m.update_edge(&edge).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Model(CudsError::NotFound { kind: "point", id }) if id == stray.id.to_string()
        ));
        assert_eq!(m.get_edge(edge.id).unwrap().points.len(), 2);
        assert_eq!(m.point_count().unwrap(), 2);
    }

    #[test]
    fn test_update_cell_keeps_points() {
        let mut m = mesh();
        let ps: Vec<Point> = (0..4).map(|i| point(f64::from(i))).collect();
        let mut cell = Cell::new(ps.clone(), 1.0);
        m.add_cell(&cell).unwrap();

        cell.volume = 2.0;
        cell.points.truncate(3);
        cell.points[0].data.insert(Cuba::Temperature, 99.0);
        cell.data.insert(Cuba::Pressure, 1.0);
        m.update_cell(&cell).unwrap();

        let stored = m.get_cell(cell.id).unwrap();
        assert_eq!(stored.volume, 2.0);
        assert_eq!(stored.points, ps[..3].to_vec());
        assert_eq!(stored.data, cell.data);
    }

    #[test]
    fn test_elements_resolve_current_points() {
        let mut m = mesh();
        let mut p = point(0.0);
        let edge = Edge::new(vec![p.clone(), point(1.0)], 1.0);
        m.add_edge(&edge).unwrap();

        p.coordinates = DVec3::new(0.0, 4.0, 0.0);
        m.update_point(&p).unwrap();
        assert_eq!(m.get_edge(edge.id).unwrap().points[0], p);
    }

    #[test]
    fn test_iter_elements_by_ids() {
        let mut m = mesh();
        let faces: Vec<Face> = (0..3)
            .map(|i| Face::new(vec![point(f64::from(i))], f64::from(i)))
            .collect();
        m.add_faces(&faces).unwrap();

        let ids = [faces[2].id, faces[0].id];
        let got: Vec<Face> = m
            .iter_faces(Some(&ids))
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(got, vec![faces[2].clone(), faces[0].clone()]);
        assert_eq!(m.iter_faces(None).unwrap().count(), 3);

        let missing = [Uuid::new_v4()];
        assert!(m.iter_faces(Some(&missing)).unwrap().next().unwrap().is_err());
    }

    #[test]
    fn test_copy_and_load() {
        let mut source = Mesh::new();
        let ps: Vec<Point> = (0..4).map(|i| point(f64::from(i))).collect();
        source.add_point(&ps[0]).unwrap();
        source
            .add_edge(&Edge::new(vec![ps[0].clone(), ps[1].clone()], 1.0))
            .unwrap();
        source
            .add_face(&Face::new(vec![ps[0].clone(), ps[1].clone(), ps[2].clone()], 0.5))
            .unwrap();
        let mut cell = Cell::new(ps.clone(), 0.25);
        cell.shared_data.insert(Cuba::Label, 1);
        source.add_cell(&cell).unwrap();

        let mut m = mesh();
        m.copy_from(&source).unwrap();
        assert_eq!(m.point_count().unwrap(), 4);
        assert_eq!(m.load().unwrap(), source);
    }
}
