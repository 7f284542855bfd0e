//! Model-level error types.

use crate::cuba::Cuba;

/// Convenience alias for results carrying a [`CudsError`].
pub type CudsResult<T> = Result<T, CudsError>;

/// Errors raised by the in-memory data model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CudsError {
    /// Lookup by id or coordinate found no matching entity.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"point"` or `"lattice"`.
        kind: &'static str,
        /// Display form of the missing id.
        id: String,
    },

    /// An entity with the same id is already registered.
    #[error("{kind} {id} already exists")]
    DuplicateId {
        /// Entity kind, e.g. `"edge"`.
        kind: &'static str,
        /// Display form of the colliding id.
        id: String,
    },

    /// A value does not match the expected entity kind.
    #[error("wrong type: expected {expected}, got {found}")]
    WrongType {
        /// The kind the operation expected.
        expected: &'static str,
        /// The kind that was supplied.
        found: &'static str,
    },

    /// An attribute key name outside the CUBA enumeration.
    #[error("invalid CUBA key: {0:?}")]
    InvalidKey(String),

    /// A container was asked for a key it does not hold.
    #[error("key {0} not present")]
    KeyNotPresent(Cuba),

    /// A lattice coordinate outside the declared lattice size.
    #[error("coordinate {coord:?} is outside lattice size {size:?}")]
    OutOfRange {
        /// The offending coordinate.
        coord: Vec<i32>,
        /// The lattice size it was checked against.
        size: Vec<usize>,
    },

    /// Lattice vectors or coordinates of inconsistent dimensionality.
    #[error("dimension mismatch: expected {expected}, got {found}")]
    Dimension { expected: usize, found: usize },

    /// A lattice size whose rows cannot be addressed.
    #[error("lattice size {size:?} is too large to address")]
    TooLarge { size: Vec<usize> },

    /// An entity that violates a structural rule of its kind.
    #[error("invalid {kind}: {reason}")]
    InvalidEntity {
        kind: &'static str,
        reason: &'static str,
    },
}

impl CudsError {
    /// Build a [`CudsError::NotFound`] from any displayable id.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Build a [`CudsError::DuplicateId`] from any displayable id.
    #[must_use]
    pub fn duplicate(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::DuplicateId {
            kind,
            id: id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = CudsError::not_found("point", 42);
        assert_eq!(err.to_string(), "point 42 not found");
    }

    #[test]
    fn test_out_of_range_message() {
        let err = CudsError::OutOfRange {
            coord: vec![3, 0],
            size: vec![3, 3],
        };
        assert!(err.to_string().contains("[3, 0]"));
    }
}
