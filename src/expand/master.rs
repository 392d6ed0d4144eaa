//! Build-once cache for shared (master) geometry.
//!
//! The first caller asking for a key claims it and receives a
//! [`BuildTicket`]; everyone else asking for the same key blocks on the
//! entry's condition variable until the ticket publishes. The table lock is
//! only held to look up or insert an entry, never while building.
//!
//! A ticket always publishes: [`BuildTicket::finish`] stores the result or
//! the error, and dropping an unfinished ticket (early return, panic)
//! stores a failure. Failures are cached like successes, so each key is
//! built at most once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::util::{Error, Result};

/// Observable state of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterBuildState {
    Unbuilt,
    Building,
    Built,
    Failed(String),
}

enum Slot<V> {
    Building { owner: ThreadId },
    Built(Arc<V>),
    Failed(String),
}

struct Entry<V> {
    slot: Mutex<Slot<V>>,
    ready: Condvar,
}

impl<V> Entry<V> {
    fn publish(&self, slot: Slot<V>) {
        *self.slot.lock() = slot;
        self.ready.notify_all();
    }
}

/// Outcome of [`MasterBuildCache::acquire`].
pub enum Acquired<V> {
    /// The caller claimed the key and must build it.
    Build(BuildTicket<V>),
    /// Already built (possibly after waiting for another caller).
    Ready(Arc<V>),
}

/// Per-key build-once table.
pub struct MasterBuildCache<V> {
    entries: Mutex<HashMap<String, Arc<Entry<V>>>>,
    builds: AtomicUsize,
}

impl<V> Default for MasterBuildCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }
}

impl<V> MasterBuildCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` or wait for the result of whoever claimed it.
    ///
    /// Returns `Error::BuildFailed` if the builder failed and
    /// `Error::ReentrantBuild` if the calling thread is the one building it.
    pub fn acquire(&self, key: &str) -> Result<Acquired<V>> {
        let me = thread::current().id();

        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(key) {
                Some(entry) => Arc::clone(entry),
                None => {
                    let entry = Arc::new(Entry {
                        slot: Mutex::new(Slot::Building { owner: me }),
                        ready: Condvar::new(),
                    });
                    entries.insert(key.to_string(), Arc::clone(&entry));
                    self.builds.fetch_add(1, Ordering::Relaxed);
                    debug!(key, "Claim master build");
                    return Ok(Acquired::Build(BuildTicket {
                        key: key.to_string(),
                        entry,
                        published: false,
                    }));
                }
            }
        };

        let mut slot = entry.slot.lock();
        loop {
            match &*slot {
                Slot::Built(value) => return Ok(Acquired::Ready(Arc::clone(value))),
                Slot::Failed(reason) => {
                    return Err(Error::BuildFailed {
                        key: key.to_string(),
                        reason: reason.clone(),
                    })
                }
                Slot::Building { owner } if *owner == me => {
                    return Err(Error::ReentrantBuild(key.to_string()));
                }
                Slot::Building { .. } => {}
            }
            trace!(key, "Wait for master build");
            entry.ready.wait(&mut slot);
        }
    }

    /// Return the cached value for `key`, running `build` if nobody has yet.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.acquire(key)? {
            Acquired::Ready(value) => Ok(value),
            Acquired::Build(ticket) => ticket.finish(build()),
        }
    }

    pub fn state(&self, key: &str) -> MasterBuildState {
        let Some(entry) = self.entries.lock().get(key).cloned() else {
            return MasterBuildState::Unbuilt;
        };
        let slot = entry.slot.lock();
        match &*slot {
            Slot::Building { .. } => MasterBuildState::Building,
            Slot::Built(_) => MasterBuildState::Built,
            Slot::Failed(reason) => MasterBuildState::Failed(reason.clone()),
        }
    }

    /// Number of builds claimed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> fmt::Debug for MasterBuildCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterBuildCache")
            .field("len", &self.len())
            .field("builds", &self.build_count())
            .finish()
    }
}

/// Claim on a key. Publishes exactly once, on `finish` or on drop.
pub struct BuildTicket<V> {
    key: String,
    entry: Arc<Entry<V>>,
    published: bool,
}

impl<V> BuildTicket<V> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the build result and wake all waiters.
    pub fn finish(mut self, result: Result<V>) -> Result<Arc<V>> {
        self.published = true;
        match result {
            Ok(value) => {
                let value = Arc::new(value);
                self.entry.publish(Slot::Built(Arc::clone(&value)));
                debug!(key = %self.key, "Master built");
                Ok(value)
            }
            Err(e) => {
                self.entry.publish(Slot::Failed(e.to_string()));
                warn!(key = %self.key, error = %e, "Master build failed");
                Err(e)
            }
        }
    }
}

impl<V> Drop for BuildTicket<V> {
    fn drop(&mut self) {
        if !self.published {
            warn!(key = %self.key, "Master builder exited without publishing");
            self.entry
                .publish(Slot::Failed("builder exited without publishing".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_concurrent_callers_build_once() {
        let cache = MasterBuildCache::<Vec<u32>>::new();
        let side_effects = AtomicUsize::new(0);

        let results: Vec<Arc<Vec<u32>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        cache
                            .get_or_build("/master/shape", || {
                                side_effects.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(30));
                                Ok(vec![1, 2, 3])
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(side_effects.load(Ordering::SeqCst), 1);
        assert_eq!(cache.build_count(), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
        assert_eq!(cache.state("/master/shape"), MasterBuildState::Built);
    }

    #[test]
    fn test_failure_is_cached() {
        let cache = MasterBuildCache::<u32>::new();
        let err = cache
            .get_or_build("k", || Err(Error::no_geometry("k", "empty")))
            .unwrap_err();
        assert!(err.is_no_geometry());

        let again = cache.get_or_build("k", || Ok(1)).unwrap_err();
        assert!(matches!(again, Error::BuildFailed { .. }));
        assert_eq!(cache.build_count(), 1);
    }

    #[test]
    fn test_dropped_ticket_wakes_waiters() {
        let cache = MasterBuildCache::<u32>::new();
        let Acquired::Build(ticket) = cache.acquire("k").unwrap() else {
            panic!("first caller must build");
        };
        assert_eq!(cache.state("k"), MasterBuildState::Building);

        thread::scope(|s| {
            let waiter = s.spawn(|| cache.acquire("k").map(|_| ()));
            thread::sleep(Duration::from_millis(20));
            drop(ticket);
            let res = waiter.join().unwrap();
            assert!(matches!(res, Err(Error::BuildFailed { .. })));
        });
        assert!(matches!(cache.state("k"), MasterBuildState::Failed(_)));
    }

    #[test]
    fn test_reentrant_request_errors() {
        let cache = MasterBuildCache::<u32>::new();
        let res = cache.get_or_build("k", || match cache.acquire("k") {
            Err(e) => Err(e),
            Ok(_) => Ok(0),
        });
        assert!(matches!(res, Err(Error::ReentrantBuild(_))));
        assert_eq!(cache.state("k"), MasterBuildState::Failed("Re-entrant build request for k".into()));
    }
}
