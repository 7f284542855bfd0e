//! Persistent particle containers.
//!
//! A [`FileParticleContainer`] keeps one particle container in a store group
//! as three [`EntityTable`]s: `particles` (coordinates plus data), `bonds`
//! (the bonded particle ids plus data) and `data`, which holds at most one
//! row with the data of the container itself.

use cuds_core::DataContainer;
use cuds_model::{Bond, Particle, ParticleContainer};
use tracing::info;
use uuid::Uuid;

use crate::entity_table::{
    COORDINATES, EntityRow, EntityTable, MEMBER_COUNT, MEMBERS, decode_coordinates,
    decode_members, encode_coordinates, encode_members,
};
use crate::error::{StoreError, StoreResult};
use crate::path::NodePath;
use crate::store::StoreHandle;

const PARTICLES_NODE: &str = "particles";
const BONDS_NODE: &str = "bonds";
const DATA_NODE: &str = "data";

/// Handle to a particle container persisted in a store.
#[derive(Debug, Clone)]
pub struct FileParticleContainer {
    name: String,
    particles: EntityTable,
    bonds: EntityTable,
    data: EntityTable,
}

impl FileParticleContainer {
    /// Open the container stored in `group`, creating empty tables for any
    /// that are missing.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn create_or_open(store: &StoreHandle, group: &NodePath) -> StoreResult<Self> {
        Ok(Self {
            name: group.name().unwrap_or_default().to_string(),
            particles: EntityTable::create_or_open(
                store,
                group,
                PARTICLES_NODE,
                "particle",
                &[COORDINATES],
            )?,
            bonds: EntityTable::create_or_open(
                store,
                group,
                BONDS_NODE,
                "bond",
                &[MEMBERS, MEMBER_COUNT],
            )?,
            data: EntityTable::create_or_open(store, group, DATA_NODE, "container data", &[])?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Data of the container as a whole.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn data(&self) -> StoreResult<DataContainer> {
        match self.data.iter(None)?.next() {
            Some(row) => Ok(row?.data),
            None => Ok(DataContainer::new()),
        }
    }

    /// Replace the data of the container as a whole.
    ///
    /// # Errors
    ///
    /// Fails if a value does not have its key's canonical type.
    pub fn set_data(&mut self, data: &DataContainer) -> StoreResult<()> {
        let row = EntityRow::new(Uuid::nil(), Vec::new(), data.clone());
        if self.data.contains(Uuid::nil())? {
            self.data.update(&[row])
        } else {
            self.data.insert(&[row])
        }
    }

    // -- Particles --

    /// Add copies of `particles` in order.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if an id is already stored or
    /// repeats in the batch. Nothing is written in that case.
    pub fn add_particles(&mut self, particles: &[Particle]) -> StoreResult<()> {
        let rows: Vec<EntityRow> = particles.iter().map(particle_row).collect();
        self.particles.insert(&rows)
    }

    /// # Errors
    ///
    /// See [`add_particles`](Self::add_particles).
    pub fn add_particle(&mut self, particle: &Particle) -> StoreResult<()> {
        self.add_particles(std::slice::from_ref(particle))
    }

    /// Overwrite stored particles with the same ids.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored. Nothing is
    /// written in that case.
    pub fn update_particles(&mut self, particles: &[Particle]) -> StoreResult<()> {
        let rows: Vec<EntityRow> = particles.iter().map(particle_row).collect();
        self.particles.update(&rows)
    }

    /// # Errors
    ///
    /// See [`update_particles`](Self::update_particles).
    pub fn update_particle(&mut self, particle: &Particle) -> StoreResult<()> {
        self.update_particles(std::slice::from_ref(particle))
    }

    /// Read the particle with `id`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such particle is stored.
    pub fn get_particle(&self, id: Uuid) -> StoreResult<Particle> {
        particle_from_row(self.particles.get(id)?)
    }

    /// Remove the particles with `ids`. Bonds referring to them are kept.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored.
    pub fn remove_particles(&mut self, ids: &[Uuid]) -> StoreResult<()> {
        self.particles.remove(ids)
    }

    /// # Errors
    ///
    /// See [`remove_particles`](Self::remove_particles).
    pub fn remove_particle(&mut self, id: Uuid) -> StoreResult<()> {
        self.remove_particles(&[id])
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_particle(&self, id: Uuid) -> StoreResult<bool> {
        self.particles.contains(id)
    }

    /// Iterate over stored particles in insertion order, or over those in
    /// `ids` in the given order.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_particles(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Particle>> + use<>> {
        Ok(self
            .particles
            .iter(ids)?
            .map(|row| row.and_then(particle_from_row)))
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn count_particles(&self) -> StoreResult<usize> {
        self.particles.len()
    }

    // -- Bonds --

    /// Add copies of `bonds` in order.
    ///
    /// # Errors
    ///
    /// Returns a `DuplicateId` model error if an id is already stored or
    /// repeats in the batch, or [`StoreError::TooManyMembers`] for a bond
    /// over too many particles. Nothing is written in either case.
    pub fn add_bonds(&mut self, bonds: &[Bond]) -> StoreResult<()> {
        let rows = bonds.iter().map(bond_row).collect::<StoreResult<Vec<_>>>()?;
        self.bonds.insert(&rows)
    }

    /// # Errors
    ///
    /// See [`add_bonds`](Self::add_bonds).
    pub fn add_bond(&mut self, bond: &Bond) -> StoreResult<()> {
        self.add_bonds(std::slice::from_ref(bond))
    }

    /// Overwrite stored bonds with the same ids.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored.
    pub fn update_bonds(&mut self, bonds: &[Bond]) -> StoreResult<()> {
        let rows = bonds.iter().map(bond_row).collect::<StoreResult<Vec<_>>>()?;
        self.bonds.update(&rows)
    }

    /// # Errors
    ///
    /// See [`update_bonds`](Self::update_bonds).
    pub fn update_bond(&mut self, bond: &Bond) -> StoreResult<()> {
        self.update_bonds(std::slice::from_ref(bond))
    }

    /// Read the bond with `id`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if no such bond is stored.
    pub fn get_bond(&self, id: Uuid) -> StoreResult<Bond> {
        bond_from_row(self.bonds.get(id)?)
    }

    /// Remove the bonds with `ids`.
    ///
    /// # Errors
    ///
    /// Returns a `NotFound` model error if an id is not stored.
    pub fn remove_bonds(&mut self, ids: &[Uuid]) -> StoreResult<()> {
        self.bonds.remove(ids)
    }

    /// # Errors
    ///
    /// See [`remove_bonds`](Self::remove_bonds).
    pub fn remove_bond(&mut self, id: Uuid) -> StoreResult<()> {
        self.remove_bonds(&[id])
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_bond(&self, id: Uuid) -> StoreResult<bool> {
        self.bonds.contains(id)
    }

    /// Iterate over stored bonds, or over those in `ids`.
    ///
    /// # Errors
    ///
    /// Propagates store errors from taking the snapshot.
    pub fn iter_bonds(
        &self,
        ids: Option<&[Uuid]>,
    ) -> StoreResult<impl Iterator<Item = StoreResult<Bond>> + use<>> {
        Ok(self.bonds.iter(ids)?.map(|row| row.and_then(bond_from_row)))
    }

    /// # Errors
    ///
    /// Propagates store errors.
    pub fn count_bonds(&self) -> StoreResult<usize> {
        self.bonds.len()
    }

    // -- Whole container --

    /// Write every particle, bond and the container data of `pc`, one batch
    /// per table.
    ///
    /// # Errors
    ///
    /// See [`add_particles`](Self::add_particles) and
    /// [`add_bonds`](Self::add_bonds).
    pub fn copy_from(&mut self, pc: &ParticleContainer) -> StoreResult<()> {
        let particles = pc.iter_particles(None).collect::<Result<Vec<_>, _>>()?;
        let bonds = pc.iter_bonds(None).collect::<Result<Vec<_>, _>>()?;
        self.add_particles(&particles)?;
        self.add_bonds(&bonds)?;
        if !pc.data.is_empty() {
            self.set_data(&pc.data)?;
        }
        info!(
            container = %self.name,
            particles = particles.len(),
            bonds = bonds.len(),
            "copied particle container"
        );
        Ok(())
    }

    /// Read the whole container back into memory.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn load(&self) -> StoreResult<ParticleContainer> {
        let mut pc = ParticleContainer::new(self.name.clone());
        for particle in self.iter_particles(None)? {
            pc.add_particle(&particle?)?;
        }
        for bond in self.iter_bonds(None)? {
            pc.add_bond(&bond?)?;
        }
        pc.data = self.data()?;
        Ok(pc)
    }
}

fn particle_row(particle: &Particle) -> EntityRow {
    EntityRow::new(
        particle.id,
        vec![encode_coordinates(particle.coordinates)],
        particle.data.clone(),
    )
}

fn particle_from_row(row: EntityRow) -> StoreResult<Particle> {
    let [coordinates] = row.fields.as_slice() else {
        return Err(StoreError::Corrupt(format!("particle {} has no coordinates", row.id)));
    };
    let coordinates = decode_coordinates(coordinates)?;
    Ok(Particle::with_id(row.id, coordinates).with_data(row.data))
}

fn bond_row(bond: &Bond) -> StoreResult<EntityRow> {
    let (members, count) = encode_members("bond", bond.particles())?;
    Ok(EntityRow::new(bond.id, vec![members, count], bond.data.clone()))
}

fn bond_from_row(row: EntityRow) -> StoreResult<Bond> {
    let [members, count] = row.fields.as_slice() else {
        return Err(StoreError::Corrupt(format!("bond {} has no member columns", row.id)));
    };
    let particles = decode_members(members, count)?;
    Ok(Bond::with_id(row.id, particles)?.with_data(row.data))
}
