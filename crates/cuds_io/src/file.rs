//! The CUDS file: named lattices, meshes, particle containers and data
//! container tables in one store.
//!
//! A [`CudsFile`] bootstraps four top-level groups (`lattice`, `mesh`,
//! `particle_container`, `data_container`) and hands out engines bound to
//! sub-groups named after
//! the entity they hold. Engines are bound lazily on the first `get_*` and
//! cached; every handle returned shares the file's [`StoreHandle`], so
//! closing the file closes them all.

use std::collections::BTreeMap;
use std::path::Path;

use cuds_core::{CudsError, CudsResult};
use cuds_model::{Lattice, Mesh, ParticleContainer};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::data_table::DataContainerTable;
use crate::error::StoreResult;
use crate::fs::FileStore;
use crate::lattice::FileLattice;
use crate::mesh::FileMesh;
use crate::particles::FileParticleContainer;
use crate::path::{NodePath, TEMP_PREFIX};
use crate::store::{Store, StoreHandle};

pub const LATTICE_GROUP: &str = "lattice";
pub const MESH_GROUP: &str = "mesh";
pub const PARTICLE_CONTAINER_GROUP: &str = "particle_container";
pub const DATA_CONTAINER_GROUP: &str = "data_container";

const GROUPS: [&str; 4] = [
    LATTICE_GROUP,
    MESH_GROUP,
    PARTICLE_CONTAINER_GROUP,
    DATA_CONTAINER_GROUP,
];

/// An open CUDS file.
#[derive(Debug)]
pub struct CudsFile {
    store: StoreHandle,
    config: StoreConfig,
    lattices: BTreeMap<String, FileLattice>,
    meshes: BTreeMap<String, FileMesh>,
    particle_containers: BTreeMap<String, FileParticleContainer>,
    data_tables: BTreeMap<String, DataContainerTable>,
}

impl CudsFile {
    /// Open a directory-backed file at `root`.
    ///
    /// # Errors
    ///
    /// Propagates I/O and store errors.
    pub fn open(root: impl AsRef<Path>, config: StoreConfig) -> StoreResult<Self> {
        let store = FileStore::open(root, &config)?;
        Self::with_store(store, config)
    }

    /// Open a file over any store.
    ///
    /// The store is taken as-is; `config.mode` only affects backends that
    /// are opened from a location, such as [`CudsFile::open`].
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn with_store(store: impl Store + 'static, config: StoreConfig) -> StoreResult<Self> {
        let store = StoreHandle::new(store);
        store.with(|s| {
            for group in GROUPS {
                s.create_group(&NodePath::root().join(group))?;
            }
            Ok(())
        })?;
        info!(mode = ?config.mode, "opened cuds file");
        Ok(Self {
            store,
            config,
            lattices: BTreeMap::new(),
            meshes: BTreeMap::new(),
            particle_containers: BTreeMap::new(),
            data_tables: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The shared store handle.
    #[must_use]
    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    // -- Lattices --

    /// Persist `lattice` under its own name, copying every node that
    /// carries data in one batch.
    ///
    /// If the copy fails the new group is removed again, so the file holds
    /// either the whole lattice or nothing under that name.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if a lattice of that name exists,
    /// `InvalidKey` for a name that cannot be stored, or any store error.
    pub fn add_lattice(&mut self, lattice: &Lattice) -> StoreResult<FileLattice> {
        let group = entity_group(LATTICE_GROUP, lattice.name())?;
        if self.store.has_node(&group)? {
            return Err(CudsError::duplicate("lattice", lattice.name()).into());
        }
        let nodes = lattice
            .iter_nodes(None)
            .filter(|node| !matches!(node, Ok(n) if n.data.is_empty()))
            .collect::<CudsResult<Vec<_>>>()?;
        let engine = self.populate(&group, |store| {
            let mut engine = FileLattice::create_or_open(store, &group, lattice)?;
            engine.update_nodes(&nodes, None)?;
            Ok(engine)
        })?;
        info!(lattice = %lattice.name(), nodes = nodes.len(), "added lattice");
        self.lattices
            .insert(lattice.name().to_string(), engine.clone());
        Ok(engine)
    }

    /// The engine of the lattice called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such lattice, or any
    /// error from opening it.
    pub fn get_lattice(&mut self, name: &str) -> StoreResult<FileLattice> {
        if let Some(engine) = self.lattices.get(name) {
            return Ok(engine.clone());
        }
        let group = entity_group(LATTICE_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("lattice", name).into());
        }
        let engine = FileLattice::open(&self.store, &group)?;
        debug!(lattice = %name, "bound lattice engine");
        self.lattices.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Remove the lattice called `name` with all its data.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such lattice.
    pub fn delete_lattice(&mut self, name: &str) -> StoreResult<()> {
        let group = entity_group(LATTICE_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("lattice", name).into());
        }
        self.store.with(|s| s.remove_node(&group))?;
        self.lattices.remove(name);
        info!(lattice = %name, "deleted lattice");
        Ok(())
    }

    /// Names of all stored lattices, sorted.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn lattice_names(&self) -> StoreResult<Vec<String>> {
        self.children(LATTICE_GROUP)
    }

    // -- Meshes --

    /// Persist a copy of `mesh` under `name`.
    ///
    /// If the copy fails the new group is removed again.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if a mesh of that name exists,
    /// `InvalidKey` for a name that cannot be stored, or any store error.
    pub fn add_mesh(&mut self, name: &str, mesh: &Mesh) -> StoreResult<FileMesh> {
        let group = entity_group(MESH_GROUP, name)?;
        if self.store.has_node(&group)? {
            return Err(CudsError::duplicate("mesh", name).into());
        }
        let engine = self.populate(&group, |store| {
            let mut engine = FileMesh::create_or_open(store, &group)?;
            engine.copy_from(mesh)?;
            Ok(engine)
        })?;
        info!(mesh = %name, "added mesh");
        self.meshes.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// The engine of the mesh called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such mesh.
    pub fn get_mesh(&mut self, name: &str) -> StoreResult<FileMesh> {
        if let Some(engine) = self.meshes.get(name) {
            return Ok(engine.clone());
        }
        let group = entity_group(MESH_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("mesh", name).into());
        }
        let engine = FileMesh::create_or_open(&self.store, &group)?;
        debug!(mesh = %name, "bound mesh engine");
        self.meshes.insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Remove the mesh called `name` with all its entities.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such mesh.
    pub fn delete_mesh(&mut self, name: &str) -> StoreResult<()> {
        self.remove_group(MESH_GROUP, "mesh", name)?;
        self.meshes.remove(name);
        Ok(())
    }

    /// Names of all stored meshes, sorted.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn mesh_names(&self) -> StoreResult<Vec<String>> {
        self.children(MESH_GROUP)
    }

    // -- Particle containers --

    /// Persist a copy of `pc` under its own name.
    ///
    /// If the copy fails the new group is removed again.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if a container of that name
    /// exists, `InvalidKey` for a name that cannot be stored, or any store
    /// error.
    pub fn add_particle_container(
        &mut self,
        pc: &ParticleContainer,
    ) -> StoreResult<FileParticleContainer> {
        let group = entity_group(PARTICLE_CONTAINER_GROUP, pc.name())?;
        if self.store.has_node(&group)? {
            return Err(CudsError::duplicate("particle container", pc.name()).into());
        }
        let engine = self.populate(&group, |store| {
            let mut engine = FileParticleContainer::create_or_open(store, &group)?;
            engine.copy_from(pc)?;
            Ok(engine)
        })?;
        info!(container = %pc.name(), "added particle container");
        self.particle_containers
            .insert(pc.name().to_string(), engine.clone());
        Ok(engine)
    }

    /// The engine of the particle container called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such container.
    pub fn get_particle_container(&mut self, name: &str) -> StoreResult<FileParticleContainer> {
        if let Some(engine) = self.particle_containers.get(name) {
            return Ok(engine.clone());
        }
        let group = entity_group(PARTICLE_CONTAINER_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("particle container", name).into());
        }
        let engine = FileParticleContainer::create_or_open(&self.store, &group)?;
        debug!(container = %name, "bound particle container engine");
        self.particle_containers
            .insert(name.to_string(), engine.clone());
        Ok(engine)
    }

    /// Remove the particle container called `name`. Engines bound to it fail
    /// afterwards.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such container.
    pub fn delete_particle_container(&mut self, name: &str) -> StoreResult<()> {
        self.remove_group(PARTICLE_CONTAINER_GROUP, "particle container", name)?;
        self.particle_containers.remove(name);
        Ok(())
    }

    /// Names of all stored particle containers, sorted.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn particle_container_names(&self) -> StoreResult<Vec<String>> {
        self.children(PARTICLE_CONTAINER_GROUP)
    }

    /// Iterate over the engines of all particle containers in name order, or
    /// of those in `names` in the given order.
    ///
    /// A name that is not stored yields a `NotFound` error.
    ///
    /// # Errors
    ///
    /// Propagates store errors from listing the containers.
    pub fn iter_particle_containers<'a>(
        &'a mut self,
        names: Option<&[&str]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<FileParticleContainer>> + use<'a>> {
        let names: Vec<String> = match names {
            Some(names) => names.iter().map(|n| (*n).to_string()).collect(),
            None => self.particle_container_names()?,
        };
        Ok(names
            .into_iter()
            .map(move |name| self.get_particle_container(&name)))
    }

    // -- Data container tables --

    /// Create an empty data container table called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if the table exists.
    pub fn add_data_table(&mut self, name: &str) -> StoreResult<DataContainerTable> {
        let group = entity_group(DATA_CONTAINER_GROUP, name)?;
        if self.store.has_node(&group)? {
            return Err(CudsError::duplicate("data container table", name).into());
        }
        let table = DataContainerTable::create_or_open(&self.store, &group)?;
        self.data_tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// The data container table called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such table.
    pub fn get_data_table(&mut self, name: &str) -> StoreResult<DataContainerTable> {
        if let Some(table) = self.data_tables.get(name) {
            return Ok(table.clone());
        }
        let group = entity_group(DATA_CONTAINER_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("data container table", name).into());
        }
        let table = DataContainerTable::create_or_open(&self.store, &group)?;
        self.data_tables.insert(name.to_string(), table.clone());
        Ok(table)
    }

    /// Remove the data container table called `name`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if there is no such table.
    pub fn delete_data_table(&mut self, name: &str) -> StoreResult<()> {
        let group = entity_group(DATA_CONTAINER_GROUP, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found("data container table", name).into());
        }
        self.store.with(|s| s.remove_node(&group))?;
        self.data_tables.remove(name);
        info!(table = %name, "deleted data container table");
        Ok(())
    }

    /// Names of all data container tables, sorted.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn data_table_names(&self) -> StoreResult<Vec<String>> {
        self.children(DATA_CONTAINER_GROUP)
    }

    // -- Lifecycle --

    /// Make all pending writes durable.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn flush(&self) -> StoreResult<()> {
        self.store.with(|s| s.flush())
    }

    /// Flush and close the file. Engines obtained from it fail with
    /// `Closed` afterwards.
    ///
    /// # Errors
    ///
    /// Propagates the final flush error.
    pub fn close(self) -> StoreResult<()> {
        self.store.close()
    }

    /// Run `fill` to create and populate `group`, removing whatever it left
    /// behind if it fails.
    fn populate<T>(
        &self,
        group: &NodePath,
        fill: impl FnOnce(&StoreHandle) -> StoreResult<T>,
    ) -> StoreResult<T> {
        fill(&self.store).inspect_err(|err| {
            let removed = self.store.with(|s| {
                if s.has_node(group)? {
                    s.remove_node(group)?;
                }
                Ok(())
            });
            match removed {
                Ok(()) => warn!(%group, error = %err, "discarded partially written group"),
                Err(cleanup) => warn!(%group, error = %cleanup, "could not remove partial group"),
            }
        })
    }

    fn remove_group(&self, root: &str, kind: &'static str, name: &str) -> StoreResult<()> {
        let group = entity_group(root, name)?;
        if !self.store.has_node(&group)? {
            return Err(CudsError::not_found(kind, name).into());
        }
        self.store.with(|s| s.remove_node(&group))?;
        info!(%kind, %name, "deleted group");
        Ok(())
    }

    fn children(&self, group: &str) -> StoreResult<Vec<String>> {
        let path = NodePath::root().join(group);
        let names = self.store.with(|s| s.children(&path))?;
        Ok(names
            .into_iter()
            .filter(|n| !n.starts_with(TEMP_PREFIX))
            .collect())
    }
}

fn entity_group(root: &str, name: &str) -> StoreResult<NodePath> {
    if name.is_empty() || name.contains('/') || name.starts_with(TEMP_PREFIX) {
        return Err(CudsError::InvalidKey(name.to_string()).into());
    }
    Ok(NodePath::root().join(root).join(name))
}
