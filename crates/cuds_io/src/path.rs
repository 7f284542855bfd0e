//! Hierarchical node paths inside a store.
//!
//! A [`NodePath`] is a sequence of name segments rendered as `/a/b/c`. The
//! root path has no segments. Segments starting with [`TEMP_PREFIX`] are
//! reserved for temporary nodes created during migrations.

use std::fmt;

/// Prefix reserved for temporary node names.
pub const TEMP_PREFIX: char = '~';

/// An absolute path to a group or node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// The root group.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a `/`-separated path. Empty segments are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// A child path.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }

    /// The parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.segments.split_last()?;
        Some(Self {
            segments: init.to_vec(),
        })
    }

    /// The last segment, or `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns `true` if `self` equals `ancestor` or lies below it.
    #[must_use]
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// Replace the `from` prefix of this path with `to`.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        let rest = self.segments.strip_prefix(from.segments.as_slice())?;
        let mut segments = to.segments.clone();
        segments.extend(rest.iter().cloned());
        Some(Self { segments })
    }

    /// The sibling temporary path used while rebuilding this node.
    #[must_use]
    pub fn temporary(&self) -> Self {
        match self.parent() {
            Some(parent) => {
                let name = self.name().unwrap_or_default();
                parent.join(&format!("{TEMP_PREFIX}{name}"))
            }
            None => self.clone(),
        }
    }

    /// Returns `true` if the last segment is a temporary name.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.name().is_some_and(|n| n.starts_with(TEMP_PREFIX))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = NodePath::parse("/lattice//foo/table");
        assert_eq!(path.segments().len(), 3);
        assert_eq!(path.to_string(), "/lattice/foo/table");
        assert_eq!(NodePath::root().to_string(), "/");
    }

    #[test]
    fn test_parent_and_name() {
        let path = NodePath::parse("/lattice/foo");
        assert_eq!(path.name(), Some("foo"));
        assert_eq!(path.parent(), Some(NodePath::parse("/lattice")));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn test_temporary() {
        let path = NodePath::parse("/lattice/foo/table");
        let tmp = path.temporary();
        assert_eq!(tmp.to_string(), "/lattice/foo/~table");
        assert!(tmp.is_temporary());
        assert!(!path.is_temporary());
    }

    #[test]
    fn test_rebase() {
        let from = NodePath::parse("/a/~b");
        let to = NodePath::parse("/a/b");
        let child = NodePath::parse("/a/~b/c");
        assert_eq!(child.rebase(&from, &to), Some(NodePath::parse("/a/b/c")));
        assert!(child.starts_with(&from));
        assert_eq!(NodePath::parse("/x").rebase(&from, &to), None);
    }
}
