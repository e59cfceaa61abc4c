//! Repository path type and the canonical entry ordering (§3, component 1).
//!
//! A path is a `/`-separated sequence of non-empty components. The empty
//! path denotes the implicit repository root. Directories and files with
//! the same prefix must still sort deterministically, so comparison is
//! defined on `(path, is_dir)` pairs rather than on the path alone:
//! directories sort as if suffixed with `/`.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path component is empty")]
    EmptyComponent,
    #[error("path component is '.' or '..'")]
    DotComponent,
    #[error("path contains a backslash")]
    Backslash,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoPath(String);

impl RepoPath {
    pub const ROOT: &'static str = "";

    /// Parse and validate a repository-relative path.
    ///
    /// # Errors
    /// Returns [`PathError`] if any component is empty, is `.`/`..`, or the
    /// path contains a backslash.
    pub fn parse(s: impl Into<String>) -> Result<Self, PathError> {
        let s = s.into();
        if s.contains('\\') {
            return Err(PathError::Backslash);
        }
        if s.is_empty() {
            return Ok(Self(s));
        }
        for component in s.split('/') {
            if component.is_empty() {
                return Err(PathError::EmptyComponent);
            }
            if component == "." || component == ".." {
                return Err(PathError::DotComponent);
            }
        }
        Ok(Self(s))
    }

    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Join a single additional component onto this path.
    ///
    /// # Errors
    /// Returns [`PathError`] if `component` is itself invalid as a path
    /// component (empty, `.`/`..`, or containing a backslash).
    pub fn join(&self, component: &str) -> Result<Self, PathError> {
        if component.is_empty() {
            return Err(PathError::EmptyComponent);
        }
        if component == "." || component == ".." {
            return Err(PathError::DotComponent);
        }
        if component.contains('\\') || component.contains('/') {
            return Err(PathError::Backslash);
        }
        if self.is_root() {
            Ok(Self(component.to_string()))
        } else {
            Ok(Self(format!("{}/{component}", self.0)))
        }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Every ancestor of this path, nearest first, ending at (but not
    /// including) the root.
    #[must_use]
    pub fn ancestors(&self) -> Vec<Self> {
        let mut out = Vec::new();
        let mut cur = self.parent();
        while let Some(p) = cur {
            if p.is_root() {
                break;
            }
            cur = p.parent();
            out.push(p);
        }
        out
    }

    /// Strip a leading path-prefix, returning `None` if `self` is not
    /// under `prefix`.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &RepoPath) -> Option<RepoPath> {
        if prefix.is_root() {
            return Some(self.clone());
        }
        let prefixed = format!("{}/", prefix.0);
        if self.0 == prefix.0 {
            Some(RepoPath::root())
        } else if let Some(rest) = self.0.strip_prefix(&prefixed) {
            RepoPath::parse(rest).ok()
        } else {
            None
        }
    }

    /// Prepend a path-prefix onto this path.
    #[must_use]
    pub fn with_prefix(&self, prefix: &RepoPath) -> RepoPath {
        if prefix.is_root() {
            self.clone()
        } else if self.is_root() {
            prefix.clone()
        } else {
            RepoPath(format!("{}/{}", prefix.0, self.0))
        }
    }

    /// The sort key used by [`compare_entries`]: directories sort as if
    /// suffixed with `/`.
    #[must_use]
    pub(crate) fn sort_key(&self, is_dir: bool) -> String {
        if is_dir && !self.0.is_empty() {
            format!("{}/", self.0)
        } else {
            self.0.clone()
        }
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The canonical total order over revision entries (§3, §4.6): files sort
/// before `<path>/` for any directory sharing the prefix.
#[must_use]
pub fn compare_entries(a: &RepoPath, a_is_dir: bool, b: &RepoPath, b_is_dir: bool) -> Ordering {
    a.sort_key(a_is_dir).cmp(&b.sort_key(b_is_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_components() {
        assert_eq!(RepoPath::parse("a//b").unwrap_err(), PathError::EmptyComponent);
        assert_eq!(RepoPath::parse("a/./b").unwrap_err(), PathError::DotComponent);
        assert_eq!(RepoPath::parse("a/../b").unwrap_err(), PathError::DotComponent);
        assert_eq!(RepoPath::parse("a\\b").unwrap_err(), PathError::Backslash);
    }

    #[test]
    fn root_is_empty() {
        let root = RepoPath::parse("").unwrap();
        assert!(root.is_root());
        assert!(root.parent().is_none());
    }

    #[test]
    fn join_and_parent_round_trip() {
        let a = RepoPath::root().join("a").unwrap().join("b").unwrap();
        assert_eq!(a.as_str(), "a/b");
        assert_eq!(a.parent().unwrap().as_str(), "a");
    }

    #[test]
    fn directories_sort_after_same_prefix_files() {
        let file = RepoPath::parse("a").unwrap();
        let dir = RepoPath::parse("a").unwrap();
        // "a" (file) < "a/" (dir as prefix of "a/b")
        assert_eq!(compare_entries(&file, false, &dir, true), Ordering::Less);

        let under = RepoPath::parse("a/b").unwrap();
        assert_eq!(compare_entries(&dir, true, &under, false), Ordering::Less);
    }

    #[test]
    fn strip_and_with_prefix_round_trip() {
        let prefix = RepoPath::parse("look/here").unwrap();
        let full = RepoPath::parse("look/here/b.txt").unwrap();
        let stripped = full.strip_prefix(&prefix).unwrap();
        assert_eq!(stripped.as_str(), "b.txt");
        assert_eq!(stripped.with_prefix(&prefix), full);

        let outside = RepoPath::parse("other/b.txt").unwrap();
        assert!(outside.strip_prefix(&prefix).is_none());
    }

    #[test]
    fn ancestors_lists_nearest_first() {
        let p = RepoPath::parse("a/b/c").unwrap();
        let anc: Vec<String> = p.ancestors().into_iter().map(|p| p.0).collect();
        assert_eq!(anc, vec!["a/b".to_string(), "a".to_string()]);
    }
}
