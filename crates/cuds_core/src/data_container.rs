//! The [`DataContainer`] attribute map.
//!
//! A container maps [`Cuba`] keys to [`AttributeValue`]s. Only keys of the
//! closed enumeration can be stored: the typed API cannot express anything
//! else, and the name-based API rejects unknown names with
//! [`CudsError::InvalidKey`].
//!
//! Containers are plain values. Cloning is deep and two containers never
//! share storage. Iteration follows key index order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cuba::Cuba;
use crate::error::{CudsError, CudsResult};
use crate::value::AttributeValue;

/// A restricted mapping from CUBA keys to attribute values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataContainer {
    values: BTreeMap<Cuba, AttributeValue>,
}

impl DataContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::KeyNotPresent`] if the key has no value.
    pub fn get(&self, key: Cuba) -> CudsResult<&AttributeValue> {
        self.values.get(&key).ok_or(CudsError::KeyNotPresent(key))
    }

    /// Get the value stored under `key`, if any.
    #[must_use]
    pub fn value(&self, key: Cuba) -> Option<&AttributeValue> {
        self.values.get(&key)
    }

    /// Store a value under `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: Cuba,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.values.insert(key, value.into())
    }

    /// Store a value under the key named `name` (`"DENSITY"` or
    /// `"CUBA.DENSITY"`).
    ///
    /// # Errors
    ///
    /// Returns [`CudsError::InvalidKey`] if `name` is not a CUBA key.
    pub fn insert_named(
        &mut self,
        name: &str,
        value: impl Into<AttributeValue>,
    ) -> CudsResult<Option<AttributeValue>> {
        let key: Cuba = name.parse()?;
        Ok(self.insert(key, value))
    }

    /// Remove and return the value stored under `key`.
    pub fn remove(&mut self, key: Cuba) -> Option<AttributeValue> {
        self.values.remove(&key)
    }

    /// Returns `true` if a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: Cuba) -> bool {
        self.values.contains_key(&key)
    }

    /// The keys that carry a value.
    pub fn keys(&self) -> impl Iterator<Item = Cuba> + '_ {
        self.values.keys().copied()
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Cuba, &AttributeValue)> {
        self.values.iter().map(|(&k, v)| (k, v))
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no key carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A copy holding only the listed keys that are present here.
    #[must_use]
    pub fn select(&self, keys: &[Cuba]) -> Self {
        keys.iter()
            .filter_map(|&k| self.values.get(&k).map(|v| (k, v.clone())))
            .collect()
    }
}

impl FromIterator<(Cuba, AttributeValue)> for DataContainer {
    fn from_iter<I: IntoIterator<Item = (Cuba, AttributeValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl Extend<(Cuba, AttributeValue)> for DataContainer {
    fn extend<I: IntoIterator<Item = (Cuba, AttributeValue)>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

impl<'a> IntoIterator for &'a DataContainer {
    type Item = (&'a Cuba, &'a AttributeValue);
    type IntoIter = std::collections::btree_map::Iter<'a, Cuba, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut data = DataContainer::new();
        data.insert(Cuba::Density, 1.5);
        assert_eq!(data.get(Cuba::Density).unwrap(), &AttributeValue::Float64(1.5));
        assert!(data.contains(Cuba::Density));
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn test_get_missing_key() {
        let data = DataContainer::new();
        assert_eq!(
            data.get(Cuba::Mass).unwrap_err(),
            CudsError::KeyNotPresent(Cuba::Mass)
        );
    }

    #[test]
    fn test_insert_named_rejects_unknown_key() {
        let mut data = DataContainer::new();
        let err = data.insert_named("FOO", 1.0).unwrap_err();
        assert_eq!(err, CudsError::InvalidKey("FOO".to_string()));
        assert!(data.is_empty());

        data.insert_named("CUBA.LABEL", 4).unwrap();
        assert_eq!(data.get(Cuba::Label).unwrap(), &AttributeValue::Int32(4));
    }

    #[test]
    fn test_clone_does_not_alias() {
        let mut original = DataContainer::new();
        original.insert(Cuba::Velocity, [0.2, -0.1]);
        let mut copy = original.clone();
        copy.insert(Cuba::Velocity, [1.0, 1.0]);

        assert_eq!(
            original.get(Cuba::Velocity).unwrap(),
            &AttributeValue::Float64Vec(vec![0.2, -0.1])
        );
        assert_ne!(original, copy);
    }

    #[test]
    fn test_keys_follow_index_order() {
        let mut data = DataContainer::new();
        data.insert(Cuba::Temperature, 300.0);
        data.insert(Cuba::Direction, [1.0, 0.0, 0.0]);
        data.insert(Cuba::Label, 2);
        let keys: Vec<_> = data.keys().collect();
        assert_eq!(keys, vec![Cuba::Direction, Cuba::Label, Cuba::Temperature]);
    }

    #[test]
    fn test_select() {
        let mut data = DataContainer::new();
        data.insert(Cuba::Mass, 2.0);
        data.insert(Cuba::Radius, 0.5);
        let picked = data.select(&[Cuba::Mass, Cuba::Pressure]);
        assert_eq!(picked.len(), 1);
        assert!(picked.contains(Cuba::Mass));
    }
}
