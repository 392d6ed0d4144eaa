//! Reference-counted cache of opened scenes.
//!
//! Callers opening the same `(path, filter)` pair share one parsed
//! [`SceneGraph`] and the [`MasterTable`] of geometry built from it. A
//! [`SceneHandle`] holds one reference; dropping the last handle evicts the
//! entry.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{ArchiveOpener, SceneFilter, SceneGraph};
use crate::expand::MasterTable;
use crate::util::Result;

/// Cache key: archive path plus object-path filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SceneKey {
    pub path: PathBuf,
    pub filter: SceneFilter,
}

impl fmt::Display for SceneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path.display(), self.filter)
    }
}

struct CacheEntry {
    scene: Arc<SceneGraph>,
    masters: Arc<MasterTable>,
    refs: usize,
}

struct CacheInner {
    opener: Box<dyn ArchiveOpener>,
    entries: Mutex<HashMap<SceneKey, CacheEntry>>,
}

impl CacheInner {
    fn release(&self, key: &SceneKey) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.refs = entry.refs.saturating_sub(1);
        if entry.refs == 0 {
            entries.remove(key);
            debug!(key = %key, "Scene released");
        }
    }
}

/// Shared scene cache. Cloning shares the same table.
#[derive(Clone)]
pub struct SceneHandleCache {
    inner: Arc<CacheInner>,
}

impl SceneHandleCache {
    pub fn new(opener: impl ArchiveOpener + 'static) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                opener: Box::new(opener),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get a handle on the scene at `path` restricted by `filter`.
    ///
    /// The first request opens (and filters) the archive; later requests
    /// for the same key share it. The table lock is held while opening so
    /// a key is never opened twice concurrently.
    pub fn acquire(&self, path: impl AsRef<Path>, filter: &SceneFilter) -> Result<SceneHandle> {
        let key = SceneKey {
            path: path.as_ref().to_path_buf(),
            filter: filter.clone(),
        };

        let mut entries = self.inner.entries.lock();
        let (scene, masters) = match entries.get_mut(&key) {
            Some(entry) => {
                entry.refs += 1;
                (Arc::clone(&entry.scene), Arc::clone(&entry.masters))
            }
            None => {
                let graph = self.inner.opener.open(&key.path)?;
                graph.validate()?;
                let graph = graph.filtered(filter)?;
                info!(key = %key, nodes = graph.len(), "Scene opened");
                let scene = Arc::new(graph);
                let masters = Arc::new(MasterTable::new());
                entries.insert(
                    key.clone(),
                    CacheEntry {
                        scene: Arc::clone(&scene),
                        masters: Arc::clone(&masters),
                        refs: 1,
                    },
                );
                (scene, masters)
            }
        };
        drop(entries);

        Ok(SceneHandle {
            key,
            scene,
            masters,
            cache: Arc::clone(&self.inner),
        })
    }

    /// Outstanding references for a key (0 if not cached).
    pub fn ref_count(&self, path: impl AsRef<Path>, filter: &SceneFilter) -> usize {
        let key = SceneKey {
            path: path.as_ref().to_path_buf(),
            filter: filter.clone(),
        };
        self.inner.entries.lock().get(&key).map_or(0, |e| e.refs)
    }

    /// Number of cached scenes.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for SceneHandleCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneHandleCache")
            .field("len", &self.len())
            .finish()
    }
}

/// One reference to a cached scene.
pub struct SceneHandle {
    key: SceneKey,
    scene: Arc<SceneGraph>,
    masters: Arc<MasterTable>,
    cache: Arc<CacheInner>,
}

impl SceneHandle {
    pub fn key(&self) -> &SceneKey {
        &self.key
    }

    /// Shared scene graph.
    pub fn scene(&self) -> &Arc<SceneGraph> {
        &self.scene
    }

    /// Master geometry shared by every holder of this scene.
    pub fn masters(&self) -> &Arc<MasterTable> {
        &self.masters
    }
}

impl Deref for SceneHandle {
    type Target = SceneGraph;

    fn deref(&self) -> &SceneGraph {
        &self.scene
    }
}

impl Clone for SceneHandle {
    fn clone(&self) -> Self {
        if let Some(entry) = self.cache.entries.lock().get_mut(&self.key) {
            entry.refs += 1;
        }
        Self {
            key: self.key.clone(),
            scene: Arc::clone(&self.scene),
            masters: Arc::clone(&self.masters),
            cache: Arc::clone(&self.cache),
        }
    }
}

impl Drop for SceneHandle {
    fn drop(&mut self) {
        self.cache.release(&self.key);
    }
}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneHandle").field("key", &self.key).finish()
    }
}
