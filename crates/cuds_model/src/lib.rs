//! # cuds_model
//!
//! In-memory representations of CUDS simulation data.
//!
//! This crate provides:
//!
//! - [`mesh`] — unstructured meshes: [`Point`], [`Edge`], [`Face`], [`Cell`]
//!   and the owning [`Mesh`].
//! - [`lattice`] — regular N-dimensional grids: [`LatticeNode`], [`Lattice`],
//!   the [`RowMajor`] coordinate layout and the canonical lattice factories.
//! - [`particles`] — [`Particle`]s, the [`Bond`]s between them and the owning
//!   [`ParticleContainer`].
//!
//! Every query returns an owned copy and every mutation replaces the stored
//! value, so callers never alias data held by a container.

pub mod lattice;
pub mod mesh;
pub mod particles;

// Re-export glam's double-precision vector used for point coordinates.
pub use glam::DVec3;

pub use lattice::{
    Lattice, LatticeNode, LatticeNodes, LatticeType, RowMajor, make_cubic_lattice,
    make_hexagonal_lattice, make_orthorombicp_lattice, make_rectangular_lattice,
    make_square_lattice,
};
pub use mesh::{Cell, Edge, Entities, EntityKind, Face, Mesh, MeshElement, MeshEntity, Point};
pub use particles::{Bond, ContainerItem, Items, Particle, ParticleContainer};
