//! Object-path include/exclude filters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Include/exclude wildcard patterns over absolute object paths.
///
/// Each field holds whitespace-separated patterns where `*` matches any
/// run of characters (including `/`). An empty include list keeps
/// everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneFilter {
    pub include: String,
    pub exclude: String,
}

impl SceneFilter {
    pub fn new(include: impl Into<String>, exclude: impl Into<String>) -> Self {
        Self {
            include: include.into(),
            exclude: exclude.into(),
        }
    }

    /// True if the filter keeps every path.
    pub fn is_empty(&self) -> bool {
        self.include.trim().is_empty() && self.exclude.trim().is_empty()
    }

    /// True if at least one include pattern is set.
    pub fn has_include(&self) -> bool {
        self.include.split_whitespace().next().is_some()
    }

    /// `path` matches an include pattern.
    pub fn includes(&self, path: &str) -> bool {
        self.include.split_whitespace().any(|p| wildcard_match(p, path))
    }

    /// `path` matches an exclude pattern.
    pub fn excludes(&self, path: &str) -> bool {
        self.exclude.split_whitespace().any(|p| wildcard_match(p, path))
    }

    /// Whether `path` itself passes the filter.
    ///
    /// Only the path is tested. [`SceneGraph::filtered`](super::SceneGraph::filtered)
    /// extends both lists over subtrees.
    pub fn matches(&self, path: &str) -> bool {
        (!self.has_include() || self.includes(path)) && !self.excludes(path)
    }
}

impl fmt::Display for SceneFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+[{}] -[{}]", self.include.trim(), self.exclude.trim())
    }
}

/// Glob match supporting `*` only.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((sp, st)) = star {
            // Let the last star swallow one more character.
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}
