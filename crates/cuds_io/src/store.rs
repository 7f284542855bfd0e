//! Storage primitives.
//!
//! A [`Store`] is a tree of groups and nodes addressed by [`NodePath`].
//! Groups only contain children; nodes hold a [`StoredNode`] (a table or a
//! presence mask). Engines talk to a store through a shared [`StoreHandle`],
//! which can be closed once for everyone holding it.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec;
use crate::error::{StoreError, StoreResult};
use crate::mask::PresenceMask;
use crate::path::NodePath;
use crate::table::Table;

/// Content of a leaf node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredNode {
    Table(Table),
    Mask(PresenceMask),
}

impl StoredNode {
    /// Unwrap a table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnexpectedNode`] for any other node kind.
    pub fn into_table(self, path: &NodePath) -> StoreResult<Table> {
        match self {
            Self::Table(table) => Ok(table),
            Self::Mask(_) => Err(StoreError::UnexpectedNode {
                path: path.clone(),
                expected: "table",
            }),
        }
    }

    /// Unwrap a presence mask.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnexpectedNode`] for any other node kind.
    pub fn into_mask(self, path: &NodePath) -> StoreResult<PresenceMask> {
        match self {
            Self::Mask(mask) => Ok(mask),
            Self::Table(_) => Err(StoreError::UnexpectedNode {
                path: path.clone(),
                expected: "mask",
            }),
        }
    }
}

/// Hierarchical storage backend.
///
/// All methods are synchronous. `create_node` and `flush_node` make the node
/// durable before returning.
pub trait Store: fmt::Debug {
    /// Returns `true` if a group or node exists at `path`.
    fn has_node(&self, path: &NodePath) -> StoreResult<bool>;

    /// Create a group (and any missing ancestors). Existing groups are kept.
    fn create_group(&mut self, path: &NodePath) -> StoreResult<()>;

    /// Create a new node.
    ///
    /// Fails with [`StoreError::NodeExists`] if `path` is taken.
    fn create_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()>;

    /// Read a node.
    ///
    /// Fails with [`StoreError::MissingNode`] if there is no node at `path`.
    fn read_node(&self, path: &NodePath) -> StoreResult<StoredNode>;

    /// Overwrite an existing node.
    ///
    /// Fails with [`StoreError::MissingNode`] if there is no node at `path`.
    fn flush_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()>;

    /// Remove a group with everything below it, or a node.
    fn remove_node(&mut self, path: &NodePath) -> StoreResult<()>;

    /// Move a group or node. The target must not exist.
    fn rename_node(&mut self, from: &NodePath, to: &NodePath) -> StoreResult<()>;

    /// Names of the direct children of a group, sorted.
    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>>;

    /// Make all pending writes durable.
    fn flush(&mut self) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
enum Entry {
    Group,
    Node(Vec<u8>),
}

/// In-process store keeping encoded nodes in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<NodePath, Entry>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn create_ancestors(&mut self, path: &NodePath) {
        let mut current = path.parent();
        while let Some(p) = current {
            if p.is_root() {
                break;
            }
            current = p.parent();
            self.entries.entry(p).or_insert(Entry::Group);
        }
    }

    fn subtree(&self, path: &NodePath) -> Vec<NodePath> {
        self.entries
            .range(path.clone()..)
            .take_while(|(p, _)| p.starts_with(path))
            .map(|(p, _)| p.clone())
            .collect()
    }
}

impl Store for MemoryStore {
    fn has_node(&self, path: &NodePath) -> StoreResult<bool> {
        Ok(path.is_root() || self.entries.contains_key(path))
    }

    fn create_group(&mut self, path: &NodePath) -> StoreResult<()> {
        if path.is_root() {
            return Ok(());
        }
        match self.entries.get(path) {
            Some(Entry::Group) => Ok(()),
            Some(Entry::Node(_)) => Err(StoreError::NodeExists(path.clone())),
            None => {
                self.create_ancestors(path);
                self.entries.insert(path.clone(), Entry::Group);
                Ok(())
            }
        }
    }

    fn create_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        if self.has_node(path)? {
            return Err(StoreError::NodeExists(path.clone()));
        }
        let bytes = codec::encode(node)?;
        self.create_ancestors(path);
        self.entries.insert(path.clone(), Entry::Node(bytes));
        Ok(())
    }

    fn read_node(&self, path: &NodePath) -> StoreResult<StoredNode> {
        match self.entries.get(path) {
            Some(Entry::Node(bytes)) => codec::decode(bytes),
            _ => Err(StoreError::MissingNode(path.clone())),
        }
    }

    fn flush_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        let bytes = codec::encode(node)?;
        match self.entries.get_mut(path) {
            Some(Entry::Node(stored)) => {
                *stored = bytes;
                Ok(())
            }
            _ => Err(StoreError::MissingNode(path.clone())),
        }
    }

    fn remove_node(&mut self, path: &NodePath) -> StoreResult<()> {
        let doomed = self.subtree(path);
        if doomed.is_empty() {
            return Err(StoreError::MissingNode(path.clone()));
        }
        for p in doomed {
            self.entries.remove(&p);
        }
        Ok(())
    }

    fn rename_node(&mut self, from: &NodePath, to: &NodePath) -> StoreResult<()> {
        if self.has_node(to)? {
            return Err(StoreError::NodeExists(to.clone()));
        }
        let moved = self.subtree(from);
        if moved.is_empty() {
            return Err(StoreError::MissingNode(from.clone()));
        }
        self.create_ancestors(to);
        for old in moved {
            if let (Some(entry), Some(new)) = (self.entries.remove(&old), old.rebase(from, to)) {
                self.entries.insert(new, entry);
            }
        }
        Ok(())
    }

    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>> {
        if !self.has_node(path)? {
            return Err(StoreError::MissingNode(path.clone()));
        }
        let depth = path.segments().len() + 1;
        Ok(self
            .subtree(path)
            .iter()
            .filter(|p| p.segments().len() == depth)
            .filter_map(|p| p.name().map(str::to_string))
            .collect())
    }

    fn flush(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// Shared, closable handle to a store.
///
/// Clones share the same store. After [`StoreHandle::close`] every clone
/// fails with [`StoreError::Closed`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    inner: Rc<RefCell<Option<Box<dyn Store>>>>,
}

impl StoreHandle {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Some(Box::new(store)))),
        }
    }

    /// Run `f` against the open store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] after [`close`](Self::close), otherwise
    /// whatever `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Store) -> StoreResult<R>) -> StoreResult<R> {
        let mut guard = self.inner.borrow_mut();
        let store = guard.as_mut().ok_or(StoreError::Closed)?;
        f(store.as_mut())
    }

    /// Returns `true` once the store has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().is_none()
    }

    /// Flush and release the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Closed`] if already closed, or the flush error.
    /// The store is released either way.
    pub fn close(&self) -> StoreResult<()> {
        let mut store = self.inner.borrow_mut().take().ok_or(StoreError::Closed)?;
        store.flush()?;
        info!("store closed");
        Ok(())
    }

    // -- Typed helpers --

    /// See [`Store::has_node`].
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn has_node(&self, path: &NodePath) -> StoreResult<bool> {
        self.with(|s| s.has_node(path))
    }

    /// Read the table at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the node is missing or is not a table.
    pub fn read_table(&self, path: &NodePath) -> StoreResult<Table> {
        self.with(|s| s.read_node(path))?.into_table(path)
    }

    /// Read the presence mask at `path`.
    ///
    /// # Errors
    ///
    /// Fails if the node is missing or is not a mask.
    pub fn read_mask(&self, path: &NodePath) -> StoreResult<PresenceMask> {
        self.with(|s| s.read_node(path))?.into_mask(path)
    }

    /// Overwrite an existing node.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn flush_node(&self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        debug!(%path, "flushing node");
        self.with(|s| s.flush_node(path, node))
    }

    /// Create a node.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub fn create_node(&self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        self.with(|s| s.create_node(path, node))
    }

    /// Replace the node at `path` without ever leaving two live copies under
    /// its name: `node` is written to the temporary sibling, the old node is
    /// removed, then the temporary is renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StaleArtifact`] if the temporary sibling already
    /// exists, or any store error.
    pub fn replace_node(&self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        let tmp = path.temporary();
        self.with(|s| {
            if s.has_node(&tmp)? {
                return Err(StoreError::StaleArtifact(tmp.clone()));
            }
            s.create_node(&tmp, node)?;
            s.remove_node(path)?;
            s.rename_node(&tmp, path)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::mask::MaskWidth;

    use super::*;

    fn mask_node() -> StoredNode {
        StoredNode::Mask(PresenceMask::zeroed(MaskWidth::W8, 2))
    }

    #[test]
    fn test_create_and_read() {
        let mut store = MemoryStore::new();
        let path = NodePath::parse("/lattice/foo/mask");
        store.create_node(&path, &mask_node()).unwrap();

        assert!(store.has_node(&NodePath::parse("/lattice/foo")).unwrap());
        assert_eq!(store.read_node(&path).unwrap(), mask_node());
        assert!(matches!(
            store.create_node(&path, &mask_node()),
            Err(StoreError::NodeExists(_))
        ));
    }

    #[test]
    fn test_children_are_direct_and_sorted() {
        let mut store = MemoryStore::new();
        store.create_group(&NodePath::parse("/lattice/b")).unwrap();
        store.create_group(&NodePath::parse("/lattice/a")).unwrap();
        store
            .create_node(&NodePath::parse("/lattice/a/table"), &mask_node())
            .unwrap();

        let names = store.children(&NodePath::parse("/lattice")).unwrap();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.children(&NodePath::root()).unwrap(), vec!["lattice"]);
    }

    #[test]
    fn test_remove_is_recursive() {
        let mut store = MemoryStore::new();
        let group = NodePath::parse("/lattice/foo");
        store.create_node(&group.join("table"), &mask_node()).unwrap();
        store.create_node(&group.join("mask"), &mask_node()).unwrap();

        store.remove_node(&group).unwrap();
        assert!(!store.has_node(&group.join("table")).unwrap());
        assert!(matches!(
            store.remove_node(&group),
            Err(StoreError::MissingNode(_))
        ));
    }

    #[test]
    fn test_remove_does_not_touch_siblings_with_common_prefix() {
        let mut store = MemoryStore::new();
        store.create_group(&NodePath::parse("/lattice/foo")).unwrap();
        store.create_group(&NodePath::parse("/lattice/foobar")).unwrap();
        store.remove_node(&NodePath::parse("/lattice/foo")).unwrap();
        assert!(store.has_node(&NodePath::parse("/lattice/foobar")).unwrap());
    }

    #[test]
    fn test_rename_moves_subtree() {
        let mut store = MemoryStore::new();
        let from = NodePath::parse("/data/~t");
        let to = NodePath::parse("/data/t");
        store.create_node(&from, &mask_node()).unwrap();

        store.rename_node(&from, &to).unwrap();
        assert!(!store.has_node(&from).unwrap());
        assert_eq!(store.read_node(&to).unwrap(), mask_node());
    }

    #[test]
    fn test_handle_fails_after_close() {
        let handle = StoreHandle::new(MemoryStore::new());
        let other = handle.clone();
        handle.close().unwrap();

        assert!(other.is_closed());
        assert!(matches!(
            other.has_node(&NodePath::root()),
            Err(StoreError::Closed)
        ));
        assert!(matches!(handle.close(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_replace_node() {
        let handle = StoreHandle::new(MemoryStore::new());
        let path = NodePath::parse("/g/mask");
        handle.create_node(&path, &mask_node()).unwrap();

        let wide = StoredNode::Mask(PresenceMask::zeroed(MaskWidth::W16, 2));
        handle.replace_node(&path, &wide).unwrap();
        assert_eq!(handle.read_mask(&path).unwrap().width(), MaskWidth::W16);
        assert!(!handle.has_node(&path.temporary()).unwrap());
    }

    #[test]
    fn test_replace_node_refuses_stale_artifact() {
        let handle = StoreHandle::new(MemoryStore::new());
        let path = NodePath::parse("/g/mask");
        handle.create_node(&path, &mask_node()).unwrap();
        handle.create_node(&path.temporary(), &mask_node()).unwrap();

        let err = handle.replace_node(&path, &mask_node()).unwrap_err();
        assert!(matches!(err, StoreError::StaleArtifact(_)));
        assert_eq!(handle.read_mask(&path).unwrap().width(), MaskWidth::W8);
    }
}
