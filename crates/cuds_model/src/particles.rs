//! Particle containers.
//!
//! A [`ParticleContainer`] owns two id → entity maps: [`Particle`]s and the
//! [`Bond`]s between them. Bonds hold particle ids, not particle values, and
//! the container does not check that those ids resolve.

use std::collections::BTreeMap;
use std::collections::btree_map;

use cuds_core::{CudsError, CudsResult, DataContainer};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A point-like particle with attached data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: Uuid,
    pub coordinates: DVec3,
    pub data: DataContainer,
}

impl Particle {
    /// Create a particle with a fresh random id and empty data.
    #[must_use]
    pub fn new(coordinates: DVec3) -> Self {
        Self::with_id(Uuid::new_v4(), coordinates)
    }

    #[must_use]
    pub fn with_id(id: Uuid, coordinates: DVec3) -> Self {
        Self {
            id,
            coordinates,
            data: DataContainer::new(),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: DataContainer) -> Self {
        self.data = data;
        self
    }
}

/// A bond between one or more particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bond {
    pub id: Uuid,
    particles: Vec<Uuid>,
    pub data: DataContainer,
}

impl Bond {
    /// Create a bond with a fresh random id over `particles`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::InvalidEntity`] if `particles` is empty.
    pub fn new(particles: Vec<Uuid>) -> CudsResult<Self> {
        Self::with_id(Uuid::new_v4(), particles)
    }

    /// Create a bond with an explicit id.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::InvalidEntity`] if `particles` is empty.
    pub fn with_id(id: Uuid, particles: Vec<Uuid>) -> CudsResult<Self> {
        let mut bond = Self {
            id,
            particles: Vec::new(),
            data: DataContainer::new(),
        };
        bond.set_particles(particles)?;
        Ok(bond)
    }

    #[must_use]
    pub fn with_data(mut self, data: DataContainer) -> Self {
        self.data = data;
        self
    }

    /// Ids of the bonded particles, in bond order.
    #[must_use]
    pub fn particles(&self) -> &[Uuid] {
        &self.particles
    }

    /// Replace the bonded particles.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::InvalidEntity`] if `particles` is empty; the
    /// bond is left unchanged.
    pub fn set_particles(&mut self, particles: Vec<Uuid>) -> CudsResult<()> {
        if particles.is_empty() {
            return Err(CudsError::InvalidEntity {
                kind: "bond",
                reason: "a bond needs at least one particle",
            });
        }
        self.particles = particles;
        Ok(())
    }
}

/// Entities a [`ParticleContainer`] stores by id.
pub trait ContainerItem: Clone {
    /// Kind name used in error messages.
    const KIND: &'static str;

    fn id(&self) -> Uuid;
}

impl ContainerItem for Particle {
    const KIND: &'static str = "particle";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl ContainerItem for Bond {
    const KIND: &'static str = "bond";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A named collection of particles and bonds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleContainer {
    name: String,
    particles: BTreeMap<Uuid, Particle>,
    bonds: BTreeMap<Uuid, Bond>,
    /// Data describing the container as a whole.
    pub data: DataContainer,
}

impl ParticleContainer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // -- Particles --

    /// Add a copy of `particle`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_particle(&mut self, particle: &Particle) -> CudsResult<()> {
        insert_new(&mut self.particles, particle)
    }

    /// Overwrite the stored particle with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered.
    pub fn update_particle(&mut self, particle: &Particle) -> CudsResult<()> {
        replace(&mut self.particles, particle)
    }

    /// Get a copy of the particle with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such particle exists.
    pub fn get_particle(&self, id: Uuid) -> CudsResult<Particle> {
        lookup(&self.particles, id)
    }

    /// Remove the particle with `id`. Bonds referring to it are kept.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such particle exists.
    pub fn remove_particle(&mut self, id: Uuid) -> CudsResult<()> {
        remove(&mut self.particles, id)
    }

    #[must_use]
    pub fn has_particle(&self, id: Uuid) -> bool {
        self.particles.contains_key(&id)
    }

    /// Iterate over copies of all particles, or of those in `ids` in the
    /// given order.
    #[must_use]
    pub fn iter_particles<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Items<'a, Particle> {
        Items::new(&self.particles, ids)
    }

    #[must_use]
    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    // -- Bonds --

    /// Add a copy of `bond`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::DuplicateId`] if the id is already registered.
    pub fn add_bond(&mut self, bond: &Bond) -> CudsResult<()> {
        insert_new(&mut self.bonds, bond)
    }

    /// Overwrite the stored bond with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if the id is not registered.
    pub fn update_bond(&mut self, bond: &Bond) -> CudsResult<()> {
        replace(&mut self.bonds, bond)
    }

    /// Get a copy of the bond with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such bond exists.
    pub fn get_bond(&self, id: Uuid) -> CudsResult<Bond> {
        lookup(&self.bonds, id)
    }

    /// Remove the bond with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::NotFound`] if no such bond exists.
    pub fn remove_bond(&mut self, id: Uuid) -> CudsResult<()> {
        remove(&mut self.bonds, id)
    }

    #[must_use]
    pub fn has_bond(&self, id: Uuid) -> bool {
        self.bonds.contains_key(&id)
    }

    /// Iterate over copies of all bonds, or of those in `ids`.
    #[must_use]
    pub fn iter_bonds<'a>(&'a self, ids: Option<&'a [Uuid]>) -> Items<'a, Bond> {
        Items::new(&self.bonds, ids)
    }

    #[must_use]
    pub fn bond_count(&self) -> usize {
        self.bonds.len()
    }
}

/// Lazy iterator over copies of particles or bonds.
///
/// Yields `Err(NotFound)` for a requested id that is not registered and
/// continues with the next one.
#[derive(Debug, Clone)]
pub struct Items<'a, E> {
    map: &'a BTreeMap<Uuid, E>,
    source: Source<'a, E>,
}

#[derive(Debug, Clone)]
enum Source<'a, E> {
    All(btree_map::Values<'a, Uuid, E>),
    Ids(std::slice::Iter<'a, Uuid>),
}

impl<'a, E> Items<'a, E> {
    fn new(map: &'a BTreeMap<Uuid, E>, ids: Option<&'a [Uuid]>) -> Self {
        let source = match ids {
            Some(ids) => Source::Ids(ids.iter()),
            None => Source::All(map.values()),
        };
        Self { map, source }
    }
}

impl<E: ContainerItem> Iterator for Items<'_, E> {
    type Item = CudsResult<E>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::All(values) => values.next().cloned().map(Ok),
            Source::Ids(ids) => ids.next().map(|&id| lookup(self.map, id)),
        }
    }
}

fn lookup<E: ContainerItem>(map: &BTreeMap<Uuid, E>, id: Uuid) -> CudsResult<E> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| CudsError::not_found(E::KIND, id))
}

fn insert_new<E: ContainerItem>(map: &mut BTreeMap<Uuid, E>, entity: &E) -> CudsResult<()> {
    match map.entry(entity.id()) {
        btree_map::Entry::Occupied(_) => Err(CudsError::duplicate(E::KIND, entity.id())),
        btree_map::Entry::Vacant(slot) => {
            slot.insert(entity.clone());
            Ok(())
        }
    }
}

fn replace<E: ContainerItem>(map: &mut BTreeMap<Uuid, E>, entity: &E) -> CudsResult<()> {
    let stored = map
        .get_mut(&entity.id())
        .ok_or_else(|| CudsError::not_found(E::KIND, entity.id()))?;
    *stored = entity.clone();
    Ok(())
}

fn remove<E: ContainerItem>(map: &mut BTreeMap<Uuid, E>, id: Uuid) -> CudsResult<()> {
    map.remove(&id)
        .map(|_| ())
        .ok_or_else(|| CudsError::not_found(E::KIND, id))
}
