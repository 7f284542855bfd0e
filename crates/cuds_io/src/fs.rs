//! Directory-backed store.
//!
//! Groups are directories and nodes are MessagePack files named
//! `<name>.node`. A node is written to a sibling `.partial` file first and
//! renamed into place, so a reader never sees a half-written node.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec;
use crate::config::{OpenMode, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::path::NodePath;
use crate::store::{Store, StoredNode};

const NODE_EXT: &str = "node";
const PARTIAL_EXT: &str = "partial";

/// A store rooted at a directory.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    sync_writes: bool,
}

impl FileStore {
    /// Open the store at `root`, creating the directory if needed.
    ///
    /// [`OpenMode::Create`] discards any existing content.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be prepared.
    pub fn open(root: impl AsRef<Path>, config: &StoreConfig) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        if config.mode == OpenMode::Create && root.exists() {
            fs::remove_dir_all(&root)?;
        }
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), mode = ?config.mode, "opened file store");
        Ok(Self {
            root,
            sync_writes: config.sync_writes,
        })
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn group_dir(&self, path: &NodePath) -> PathBuf {
        let mut dir = self.root.clone();
        dir.extend(path.segments());
        dir
    }

    fn node_file(&self, path: &NodePath) -> PathBuf {
        with_suffix(self.group_dir(path), NODE_EXT)
    }

    fn write_file(&self, file: &Path, node: &StoredNode) -> StoreResult<()> {
        let bytes = codec::encode(node)?;
        let partial = with_suffix(file.to_path_buf(), PARTIAL_EXT);
        if let Some(parent) = partial.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&partial)?;
        out.write_all(&bytes)?;
        if self.sync_writes {
            out.sync_all()?;
        }
        drop(out);
        fs::rename(&partial, file)?;
        debug!(file = %file.display(), bytes = bytes.len(), "wrote node");
        Ok(())
    }

    /// Resolve `path` to the filesystem entry holding it.
    fn locate(&self, path: &NodePath) -> Option<PathBuf> {
        let dir = self.group_dir(path);
        if dir.is_dir() {
            return Some(dir);
        }
        let file = self.node_file(path);
        file.is_file().then_some(file)
    }
}

// Appends rather than replaces, so names containing dots survive.
fn with_suffix(path: PathBuf, ext: &str) -> PathBuf {
    let mut raw = path.into_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

impl Store for FileStore {
    fn has_node(&self, path: &NodePath) -> StoreResult<bool> {
        Ok(path.is_root() || self.locate(path).is_some())
    }

    fn create_group(&mut self, path: &NodePath) -> StoreResult<()> {
        if self.node_file(path).is_file() && !path.is_root() {
            return Err(StoreError::NodeExists(path.clone()));
        }
        fs::create_dir_all(self.group_dir(path))?;
        Ok(())
    }

    fn create_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        if self.has_node(path)? {
            return Err(StoreError::NodeExists(path.clone()));
        }
        self.write_file(&self.node_file(path), node)
    }

    fn read_node(&self, path: &NodePath) -> StoreResult<StoredNode> {
        match fs::read(self.node_file(path)) {
            Ok(bytes) => codec::decode(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::MissingNode(path.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn flush_node(&mut self, path: &NodePath, node: &StoredNode) -> StoreResult<()> {
        let file = self.node_file(path);
        if !file.is_file() {
            return Err(StoreError::MissingNode(path.clone()));
        }
        self.write_file(&file, node)
    }

    fn remove_node(&mut self, path: &NodePath) -> StoreResult<()> {
        let entry = self
            .locate(path)
            .ok_or_else(|| StoreError::MissingNode(path.clone()))?;
        if entry.is_dir() {
            fs::remove_dir_all(entry)?;
        } else {
            fs::remove_file(entry)?;
        }
        Ok(())
    }

    fn rename_node(&mut self, from: &NodePath, to: &NodePath) -> StoreResult<()> {
        if self.has_node(to)? {
            return Err(StoreError::NodeExists(to.clone()));
        }
        let source = self
            .locate(from)
            .ok_or_else(|| StoreError::MissingNode(from.clone()))?;
        let target = if source.is_dir() {
            self.group_dir(to)
        } else {
            self.node_file(to)
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(source, target)?;
        Ok(())
    }

    fn children(&self, path: &NodePath) -> StoreResult<Vec<String>> {
        let dir = self.group_dir(path);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingNode(path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry_path = entry?.path();
            let name = if entry_path.is_dir() {
                entry_path.file_name()
            } else if entry_path.extension().is_some_and(|ext| ext == NODE_EXT) {
                entry_path.file_stem()
            } else {
                None
            };
            if let Some(name) = name.and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn flush(&mut self) -> StoreResult<()> {
        // Node writes complete before returning; nothing is buffered here.
        Ok(())
    }
}
