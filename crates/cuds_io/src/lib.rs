//! # cuds_io
//!
//! Columnar persistence for CUDS lattices, meshes, particle containers and
//! data containers.
//!
//! This crate provides:
//!
//! - [`Store`] — the hierarchical group/node storage primitives, with a
//!   directory-backed [`FileStore`] and an in-process [`MemoryStore`], shared
//!   through a closable [`StoreHandle`].
//! - [`Table`] / [`TableSchema`] / [`PresenceMask`] — the columnar row model:
//!   typed columns, a versioned schema stored with the table, and one
//!   presence bitfield per row.
//! - [`FileLattice`] — a lattice persisted as a table whose schema grows as
//!   new attribute keys are written.
//! - [`EntityTable`] — a fixed-schema table of entities addressed by id,
//!   the building block of [`FileMesh`] and [`FileParticleContainer`].
//! - [`DataContainerTable`] — an append-only, fixed-schema table of
//!   attribute containers.
//! - [`CudsFile`] — named lattices, meshes, particle containers and data
//!   container tables in one store.
//!
//! Every mutating call flushes the affected nodes before it returns.

pub mod codec;
pub mod config;
pub mod data_table;
pub mod entity_table;
pub mod error;
pub mod file;
pub mod fs;
pub mod lattice;
pub mod mask;
pub mod mesh;
pub mod particles;
pub mod path;
pub mod schema;
pub mod store;
pub mod table;

pub use config::{OpenMode, StoreConfig};
pub use data_table::DataContainerTable;
pub use entity_table::{EntityRow, EntityRows, EntityTable, MAX_MEMBERS};
pub use error::{StoreError, StoreResult};
pub use file::CudsFile;
pub use fs::FileStore;
pub use lattice::{FileLattice, FileLatticeNodes};
pub use mask::{MaskWidth, PresenceMask};
pub use mesh::FileMesh;
pub use particles::FileParticleContainer;
pub use path::NodePath;
pub use schema::{ColumnDef, ColumnName, TableSchema};
pub use store::{MemoryStore, Store, StoreHandle, StoredNode};
pub use table::{AttrValue, Column, Table};
