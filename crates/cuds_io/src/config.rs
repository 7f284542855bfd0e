//! Store configuration.

use tracing::warn;

/// Environment variable that overrides [`StoreConfig::sync_writes`].
pub const SYNC_WRITES_ENV: &str = "CUDS_SYNC_WRITES";

/// How a backing store is opened.
///
/// There is no read-only mode: every engine operation may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Start from an empty store, discarding any existing content.
    Create,
    /// Keep existing content and add to it.
    #[default]
    Append,
}

/// Configuration for opening a backing store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Open mode.
    pub mode: OpenMode,
    /// Call `fsync` after every node write (file-backed stores only).
    pub sync_writes: bool,
}

impl StoreConfig {
    /// Create a config with the given mode and no per-write sync.
    #[must_use]
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            sync_writes: false,
        }
    }

    /// Build a config from `mode` and the [`SYNC_WRITES_ENV`] environment
    /// variable (`1`/`true`/`yes` enable syncing).
    #[must_use]
    pub fn from_env(mode: OpenMode) -> Self {
        let sync_writes = match std::env::var(SYNC_WRITES_ENV) {
            Ok(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "ignoring unrecognised {SYNC_WRITES_ENV}");
                false
            }),
            Err(_) => false,
        };
        Self::new(mode).with_sync_writes(sync_writes)
    }

    /// Override the open mode.
    #[must_use]
    pub fn with_mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable `fsync` after every node write.
    #[must_use]
    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.mode, OpenMode::Append);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_builders() {
        let config = StoreConfig::new(OpenMode::Append)
            .with_mode(OpenMode::Create)
            .with_sync_writes(true);
        assert_eq!(config.mode, OpenMode::Create);
        assert!(config.sync_writes);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
