//! MessagePack codec helpers.
//!
//! Every persisted node (tables and presence masks) is encoded with
//! `rmp-serde`. Structs are written as maps so that fields added later can be
//! defaulted when older nodes are read back.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    rmp_serde::to_vec_named(value).map_err(StoreError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`StoreError::Decode`] if deserialisation fails.
pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, StoreError> {
    rmp_serde::from_slice(bytes).map_err(StoreError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Header {
        version: u32,
        name: String,
    }

    #[derive(Debug, PartialEq, serde::Deserialize)]
    struct HeaderV2 {
        version: u32,
        name: String,
        #[serde(default)]
        comment: Option<String>,
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let header = Header {
            version: 3,
            name: "lattice".to_string(),
        };
        let bytes = encode(&header).unwrap();
        let restored: Header = decode(&bytes).unwrap();
        assert_eq!(header, restored);
    }

    #[test]
    fn test_new_fields_default_on_old_data() {
        let bytes = encode(&Header {
            version: 1,
            name: "old".to_string(),
        })
        .unwrap();
        let restored: HeaderV2 = decode(&bytes).unwrap();
        assert_eq!(restored.version, 1);
        assert_eq!(restored.name, "old");
        assert_eq!(restored.comment, None);
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let result: Result<Header, _> = decode(&[0xFF, 0xFF]);
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }
}
