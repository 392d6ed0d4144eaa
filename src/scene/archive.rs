//! Archive openers.
//!
//! The on-disk archive format is opaque to the expander; an
//! [`ArchiveOpener`] turns a file path into a validated [`SceneGraph`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::SceneGraph;
use crate::util::{Error, Result};

/// Opens scene archives.
pub trait ArchiveOpener: Send + Sync {
    /// Read the archive at `path`.
    fn open(&self, path: &Path) -> Result<SceneGraph>;
}

impl<T: ArchiveOpener + ?Sized> ArchiveOpener for Arc<T> {
    fn open(&self, path: &Path) -> Result<SceneGraph> {
        (**self).open(path)
    }
}

fn open_error(path: &Path, reason: impl ToString) -> Error {
    Error::ArchiveOpen {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

impl SceneGraph {
    /// Parse a JSON scene dump.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write a JSON scene dump to `path`.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Reads JSON scene dumps.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonArchiveOpener;

impl ArchiveOpener for JsonArchiveOpener {
    fn open(&self, path: &Path) -> Result<SceneGraph> {
        debug!(path = %path.display(), "Open JSON archive");
        let text = fs::read_to_string(path).map_err(|e| open_error(path, e))?;
        SceneGraph::from_json(&text).map_err(|e| open_error(path, e))
    }
}

/// Serves scenes registered in memory and counts opens.
#[derive(Debug, Default)]
pub struct MemoryOpener {
    scenes: RwLock<HashMap<PathBuf, SceneGraph>>,
    opens: AtomicUsize,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `graph` under `path`, replacing any previous scene.
    pub fn insert(&self, path: impl Into<PathBuf>, graph: SceneGraph) {
        self.scenes.write().insert(path.into(), graph);
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with_scene(self, path: impl Into<PathBuf>, graph: SceneGraph) -> Self {
        self.insert(path, graph);
        self
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }
}

impl ArchiveOpener for MemoryOpener {
    fn open(&self, path: &Path) -> Result<SceneGraph> {
        let graph = self
            .scenes
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| open_error(path, "no such scene"))?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneBuilder;
    use crate::geom::XformSchema;

    #[test]
    fn test_memory_opener() {
        let mut b = SceneBuilder::new();
        b.transform("/", "a", XformSchema::default()).unwrap();
        let opener = MemoryOpener::new().with_scene("scene.abc", b.build().unwrap());

        let g = opener.open(Path::new("scene.abc")).unwrap();
        assert!(g.find("/a").is_some());
        assert_eq!(opener.open_count(), 1);

        let err = opener.open(Path::new("missing.abc")).unwrap_err();
        assert!(matches!(err, Error::ArchiveOpen { .. }));
        assert_eq!(opener.open_count(), 1);
    }

    #[test]
    fn test_json_opener_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        match JsonArchiveOpener.open(&path) {
            Err(Error::ArchiveOpen { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
