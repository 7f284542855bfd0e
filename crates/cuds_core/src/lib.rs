//! # cuds_core
//!
//! The attribute vocabulary shared by every CUDS entity.
//!
//! This crate provides:
//!
//! - [`Cuba`] — the closed enumeration of physical/engineering quantity keys.
//! - [`AttributeValue`] / [`ValueType`] — the scalar, vector, and short-string
//!   values a key can carry, and their type descriptors.
//! - [`DataContainer`] — the restricted `Cuba → value` mapping attached to
//!   points, elements, lattice nodes, and table rows.
//! - [`CudsError`] — the model-level error taxonomy.

pub mod cuba;
pub mod data_container;
pub mod error;
pub mod value;

pub use cuba::Cuba;
pub use data_container::DataContainer;
pub use error::{CudsError, CudsResult};
pub use value::{AttributeValue, ScalarKind, ValueType};
