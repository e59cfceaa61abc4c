//! Directory-relative ignore-file stack (§4.7, design note (d)).
//!
//! Each directory may carry its own `.clingignore` and `.gitignore`; both
//! are folded into one matcher for that directory and pushed onto a stack
//! as the walker descends. A later (deeper) match always overrides an
//! earlier one, matching git's own precedence rule.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::Match;

const IGNORE_FILE_NAMES: [&str; 2] = [".clingignore", ".gitignore"];

pub struct IgnoreStack {
    levels: Vec<Gitignore>,
}

impl Default for IgnoreStack {
    fn default() -> Self {
        Self::new()
    }
}

impl IgnoreStack {
    #[must_use]
    pub fn new() -> Self {
        Self { levels: Vec::new() }
    }

    /// Build the matcher for `dir` from any ignore files it directly
    /// contains and push it onto the stack.
    pub fn push_dir(&mut self, dir: &Path) {
        let mut builder = GitignoreBuilder::new(dir);
        for name in IGNORE_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                // A malformed pattern in one file shouldn't hide the rest
                // of the stack; skip it rather than abort the scan.
                let _ = builder.add(candidate);
            }
        }
        let gitignore = builder.build().unwrap_or_else(|_| GitignoreBuilder::new(dir).build().expect("empty builder always builds"));
        self.levels.push(gitignore);
    }

    pub fn pop_dir(&mut self) {
        self.levels.pop();
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Whether `path` (absolute or relative to the root the stack was
    /// built from) is ignored, folding all pushed levels root-to-leaf.
    #[must_use]
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let mut decision = Match::None;
        for level in &self.levels {
            match level.matched(path, is_dir) {
                Match::None => {}
                m => decision = m,
            }
        }
        decision.is_ignore()
    }
}
