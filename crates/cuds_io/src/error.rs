//! Storage-layer error types.

use cuds_core::{CudsError, ValueType};

use crate::path::NodePath;

/// Convenience alias for results carrying a [`StoreError`].
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or writing persisted CUDS data.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A data-model error (lookup, range or key validation).
    #[error(transparent)]
    Model(#[from] CudsError),

    /// Filesystem error from a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode a node to MessagePack.
    #[error("failed to encode node: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Failed to decode a node from MessagePack.
    #[error("failed to decode node: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The store was closed; no further operation is possible.
    #[error("store is closed")]
    Closed,

    /// A temporary node left behind by an interrupted migration.
    #[error("stale temporary artifact at {0}; refusing to proceed")]
    StaleArtifact(NodePath),

    /// No group or node exists at the path.
    #[error("no node at {0}")]
    MissingNode(NodePath),

    /// A group or node already exists at the path.
    #[error("node {0} already exists")]
    NodeExists(NodePath),

    /// The node at the path is not of the expected kind.
    #[error("node {path} is not a {expected}")]
    UnexpectedNode {
        path: NodePath,
        expected: &'static str,
    },

    /// A value does not match the type its column was created with.
    #[error("column {column} holds {expected}, got {found}")]
    SchemaConflict {
        column: String,
        expected: ValueType,
        found: ValueType,
    },

    /// A string does not fit its fixed-width column slot.
    #[error("string of {len} bytes does not fit column {column} (max {max})")]
    StringTooLong {
        column: String,
        len: usize,
        max: usize,
    },

    /// A string holds a NUL byte, which the zero padding of its slot would
    /// swallow on read.
    #[error("string written to column {column} contains a NUL byte")]
    NulInString { column: String },

    /// An element references more members than its fixed-width slot holds.
    #[error("{kind} references {count} members (max {max})")]
    TooManyMembers {
        kind: &'static str,
        count: usize,
        max: usize,
    },

    /// More attribute columns than the widest presence mask can track.
    #[error("{columns} attribute columns exceed the 64-bit presence mask")]
    MaskOverflow { columns: usize },

    /// Persisted data is internally inconsistent.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use cuds_core::ScalarKind;

    use super::*;

    #[test]
    fn test_model_errors_pass_through() {
        let err = StoreError::from(CudsError::not_found("lattice", "foo"));
        assert_eq!(err.to_string(), "lattice foo not found");
    }

    #[test]
    fn test_schema_conflict_message() {
        let err = StoreError::SchemaConflict {
            column: "DENSITY".to_string(),
            expected: ValueType::scalar(ScalarKind::Float64),
            found: ValueType::vector(ScalarKind::Float64, 3),
        };
        assert_eq!(err.to_string(), "column DENSITY holds float64, got float64[3]");
    }
}
