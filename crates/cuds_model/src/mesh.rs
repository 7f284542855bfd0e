//! Unstructured mesh storage.
//!
//! A [`Mesh`] owns four independent id → entity maps. Elements ([`Edge`],
//! [`Face`], [`Cell`]) embed the [`Point`]s they are built from; adding an
//! element registers each of its points that the mesh does not know yet.
//! Updating an element never touches the stored points; point content is
//! updated through [`Mesh::update_point`] only.

use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use cuds_core::{CudsError, CudsResult, DataContainer};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point in space with attached data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Unique point id.
    pub id: Uuid,
    /// Position of the point.
    pub coordinates: DVec3,
    /// Current attribute data.
    pub data: DataContainer,
    /// Attribute data from previous simulation steps.
    pub past_data: DataContainer,
}

impl Point {
    /// Create a point with a fresh random id and empty data.
    #[must_use]
    pub fn new(coordinates: DVec3) -> Self {
        Self::with_id(Uuid::new_v4(), coordinates)
    }

    /// Create a point with an explicit id and empty data.
    #[must_use]
    pub fn with_id(id: Uuid, coordinates: DVec3) -> Self {
        Self {
            id,
            coordinates,
            data: DataContainer::new(),
            past_data: DataContainer::new(),
        }
    }

    /// Replace the current data.
    #[must_use]
    pub fn with_data(mut self, data: DataContainer) -> Self {
        self.data = data;
        self
    }
}

/// A 1D element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub points: Vec<Point>,
    pub data: DataContainer,
    /// Data shared by a group of elements.
    pub shared_data: DataContainer,
    pub length: f64,
}

/// A 2D element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub id: Uuid,
    pub points: Vec<Point>,
    pub data: DataContainer,
    /// Data shared by a group of elements.
    pub shared_data: DataContainer,
    pub area: f64,
}

/// A 3D element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub id: Uuid,
    pub points: Vec<Point>,
    pub data: DataContainer,
    /// Data shared by a group of elements.
    pub shared_data: DataContainer,
    pub volume: f64,
}

impl Edge {
    /// Create an edge with a fresh id over the given points.
    #[must_use]
    pub fn new(points: Vec<Point>, length: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            data: DataContainer::new(),
            shared_data: DataContainer::new(),
            length,
        }
    }
}

impl Face {
    /// Create a face with a fresh id over the given points.
    #[must_use]
    pub fn new(points: Vec<Point>, area: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            data: DataContainer::new(),
            shared_data: DataContainer::new(),
            area,
        }
    }
}

impl Cell {
    /// Create a cell with a fresh id over the given points.
    #[must_use]
    pub fn new(points: Vec<Point>, volume: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            points,
            data: DataContainer::new(),
            shared_data: DataContainer::new(),
            volume,
        }
    }
}

/// The four entity kinds a mesh stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Point,
    Edge,
    Face,
    Cell,
}

impl EntityKind {
    /// Lower-case kind name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Edge => "edge",
            Self::Face => "face",
            Self::Cell => "cell",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common behaviour of stored mesh entities.
pub trait MeshElement: Clone {
    /// The kind this type is stored as.
    const KIND: EntityKind;

    /// The entity id.
    fn id(&self) -> Uuid;

    /// Points referenced by the entity. Empty for points themselves.
    fn points(&self) -> &[Point] {
        &[]
    }
}

impl MeshElement for Point {
    const KIND: EntityKind = EntityKind::Point;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl MeshElement for Edge {
    const KIND: EntityKind = EntityKind::Edge;

    fn id(&self) -> Uuid {
        self.id
    }

    fn points(&self) -> &[Point] {
        &self.points
    }
}

impl MeshElement for Face {
    const KIND: EntityKind = EntityKind::Face;

    fn id(&self) -> Uuid {
        self.id
    }

    fn points(&self) -> &[Point] {
        &self.points
    }
}

impl MeshElement for Cell {
    const KIND: EntityKind = EntityKind::Cell;

    fn id(&self) -> Uuid {
        self.id
    }

    fn points(&self) -> &[Point] {
        &self.points
    }
}

/// Any mesh entity, for callers that dispatch on kind at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MeshEntity {
    Point(Point),
    Edge(Edge),
    Face(Face),
    Cell(Cell),
}

impl MeshEntity {
    /// The kind of the wrapped entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Point(_) => EntityKind::Point,
            Self::Edge(_) => EntityKind::Edge,
            Self::Face(_) => EntityKind::Face,
            Self::Cell(_) => EntityKind::Cell,
        }
    }

    /// The id of the wrapped entity.
    #[must_use]
    pub fn id(&self) -> Uuid {
        match self {
            Self::Point(p) => p.id,
            Self::Edge(e) => e.id,
            Self::Face(f) => f.id,
            Self::Cell(c) => c.id,
        }
    }
}

impl From<Point> for MeshEntity {
    fn from(p: Point) -> Self {
        Self::Point(p)
    }
}

impl From<Edge> for MeshEntity {
    fn from(e: Edge) -> Self {
        Self::Edge(e)
    }
}

impl From<Face> for MeshEntity {
    fn from(f: Face) -> Self {
        Self::Face(f)
    }
}

impl From<Cell> for MeshEntity {
    fn from(c: Cell) -> Self {
        Self::Cell(c)
    }
}

/// An unstructured mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    points: BTreeMap<Uuid, Point>,
    edges: BTreeMap<Uuid, Edge>,
    faces: BTreeMap<Uuid, Face>,
    cells: BTreeMap<Uuid, Cell>,
}

impl Mesh {
    /// Create an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- Lookup --

    /// Get a copy of the point with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such point exists.
    pub fn get_point(&self, id: Uuid) -> CudsResult<Point> {
        lookup(&self.points, id)
    }

    /// Get a copy of the edge with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such edge exists.
    pub fn get_edge(&self, id: Uuid) -> CudsResult<Edge> {
        lookup(&self.edges, id)
    }

    /// Get a copy of the face with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such face exists.
    pub fn get_face(&self, id: Uuid) -> CudsResult<Face> {
        lookup(&self.faces, id)
    }

    /// Get a copy of the cell with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such cell exists.
    pub fn get_cell(&self, id: Uuid) -> CudsResult<Cell> {
        lookup(&self.cells, id)
    }

    // -- Insertion --

    /// Add a copy of `point`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_point(&mut self, point: &Point) -> CudsResult<()> {
        insert_new(&mut self.points, point)
    }

    /// Add a copy of `edge` and register its unknown points.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_edge(&mut self, edge: &Edge) -> CudsResult<()> {
        insert_new(&mut self.edges, edge)?;
        register_points(&mut self.points, edge.points());
        Ok(())
    }

    /// Add a copy of `face` and register its unknown points.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_face(&mut self, face: &Face) -> CudsResult<()> {
        insert_new(&mut self.faces, face)?;
        register_points(&mut self.points, face.points());
        Ok(())
    }

    /// Add a copy of `cell` and register its unknown points.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_cell(&mut self, cell: &Cell) -> CudsResult<()> {
        insert_new(&mut self.cells, cell)?;
        register_points(&mut self.points, cell.points());
        Ok(())
    }

    // -- Update --

    /// Overwrite the stored point with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered.
    pub fn update_point(&mut self, point: &Point) -> CudsResult<()> {
        replace(&mut self.points, point)
    }

    /// Overwrite the stored edge with the same id. Referenced points are not
    /// updated.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered or if
    /// it references a point the mesh does not hold.
    pub fn update_edge(&mut self, edge: &Edge) -> CudsResult<()> {
        check_points(&self.points, edge.points())?;
        replace(&mut self.edges, edge)
    }

    /// Overwrite the stored face with the same id. Referenced points are not
    /// updated.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered or if
    /// it references a point the mesh does not hold.
    pub fn update_face(&mut self, face: &Face) -> CudsResult<()> {
        check_points(&self.points, face.points())?;
        replace(&mut self.faces, face)
    }

    /// Overwrite the stored cell with the same id. Referenced points are not
    /// updated.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered or if
    /// it references a point the mesh does not hold.
    pub fn update_cell(&mut self, cell: &Cell) -> CudsResult<()> {
        check_points(&self.points, cell.points())?;
        replace(&mut self.cells, cell)
    }

    // -- Runtime dispatch --

    /// Add an entity that must be of kind `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::WrongType`] if `entity` is of another kind, or
    /// any error of the matching `add_*` method.
    pub fn add(&mut self, expected: EntityKind, entity: &MeshEntity) -> CudsResult<()> {
        check_kind(expected, entity)?;
        match entity {
            MeshEntity::Point(p) => self.add_point(p),
            MeshEntity::Edge(e) => self.add_edge(e),
            MeshEntity::Face(f) => self.add_face(f),
            MeshEntity::Cell(c) => self.add_cell(c),
        }
    }

    /// Update an entity that must be of kind `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::WrongType`] if `entity` is of another kind, or
    /// any error of the matching `update_*` method.
    pub fn update(&mut self, expected: EntityKind, entity: &MeshEntity) -> CudsResult<()> {
        check_kind(expected, entity)?;
        match entity {
            MeshEntity::Point(p) => self.update_point(p),
            MeshEntity::Edge(e) => self.update_edge(e),
            MeshEntity::Face(f) => self.update_face(f),
            MeshEntity::Cell(c) => self.update_cell(c),
        }
    }

    // -- Iteration --

    /// Iterate over copies of all points, or of the points in `ids` in the
    /// given order.
    #[must_use]
    pub fn iter_points<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Entities<'a, Point> {
        Entities::new(&self.points, ids)
    }

    /// Iterate over copies of all edges, or of the edges in `ids`.
    #[must_use]
    pub fn iter_edges<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Entities<'a, Edge> {
        Entities::new(&self.edges, ids)
    }

    /// Iterate over copies of all faces, or of the faces in `ids`.
    #[must_use]
    pub fn iter_faces<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Entities<'a, Face> {
        Entities::new(&self.faces, ids)
    }

    /// Iterate over copies of all cells, or of the cells in `ids`.
    #[must_use]
    pub fn iter_cells<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Entities<'a, Cell> {
        Entities::new(&self.cells, ids)
    }

    // -- Queries --

    /// Returns `true` if the mesh holds at least one edge.
    #[must_use]
    pub fn has_edges(&self) -> bool {
        !self.edges.is_empty()
    }

    /// Returns `true` if the mesh holds at least one face.
    #[must_use]
    pub fn has_faces(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Returns `true` if the mesh holds at least one cell.
    #[must_use]
    pub fn has_cells(&self) -> bool {
        !self.cells.is_empty()
    }

    /// Number of registered points.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}

/// Lazy iterator over copies of mesh entities.
///
/// Yields `Err(NotFound)` for a requested id that is not registered and
/// continues with the next one.
#[derive(Debug, Clone)]
pub struct Entities<'a, E> {
    map: &'a BTreeMap<Uuid, E>,
    source: Source<'a, E>,
}

#[derive(Debug, Clone)]
enum Source<'a, E> {
    All(btree_map::Values<'a, Uuid, E>),
    Ids(std::slice::Iter<'a, Uuid>),
}

impl<'a, E> Entities<'a, E> {
    fn new(map: &'a BTreeMap<Uuid, E>, ids: Option<&'a [Uuid]>) -> Self {
        let source = match ids {
            Some(ids) => Source::Ids(ids.iter()),
            None => Source::All(map.values()),
        };
        Self { map, source }
    }
}

impl<E: MeshElement> Iterator for Entities<'_, E> {
    type Item = CudsResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::All(values) => values.next().cloned().map(Ok),
            Source::Ids(ids) => ids.next().map(|&id| lookup(self.map, id)),
        }
    }
}

fn lookup<E: MeshElement>(map: &BTreeMap<Uuid, E>, id: Uuid) -> CudsResult<E> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| CudsError::not_found(E::KIND.name(), id))
}

fn insert_new<E: MeshElement>(map: &mut BTreeMap<Uuid, E>, entity: &E) -> CudsResult<()> {
    match map.entry(entity.id()) {
        btree_map::Entry::Occupied(_) => Err(CudsError::duplicate(E::KIND.name(), entity.id())),
        btree_map::Entry::Vacant(slot) => {
            slot.insert(entity.clone());
            Ok(())
        }
    }
}

fn replace<E: MeshElement>(map: &mut BTreeMap<Uuid, E>, entity: &E) -> CudsResult<()> {
    let stored = map
        .get_mut(&entity.id())
        .ok_or_else(|| CudsError::not_found(E::KIND.name(), entity.id()))?;
    *stored = entity.clone();
    Ok(())
}

fn check_points(points: &BTreeMap<Uuid, Point>, referenced: &[Point]) -> CudsResult<()> {
    match referenced.iter().find(|p| !points.contains_key(&p.id)) {
        Some(missing) => Err(CudsError::not_found(EntityKind::Point.name(), missing.id)),
        None => Ok(()),
    }
}

fn register_points(points: &mut BTreeMap<Uuid, Point>, referenced: &[Point]) {
    for point in referenced {
        points.entry(point.id).or_insert_with(|| point.clone());
    }
}

fn check_kind(expected: EntityKind, entity: &MeshEntity) -> CudsResult<()> {
    if entity.kind() == expected {
        Ok(())
    } else {
        Err(CudsError::WrongType {
            expected: expected.name(),
            found: entity.kind().name(),
        })
    }
}
