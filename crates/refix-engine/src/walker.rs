//! Directory traversal with filename glob filters.
//!
//! This module provides [`FileWalker`], which uses the `ignore` crate to walk
//! a directory tree and `globset` to select files by name (e.g. `*.prefab`).
//!
//! # Features
//!
//! - Enumerates every file: `.gitignore` and hidden-file filtering are off,
//!   because asset trees are routinely gitignored in part
//! - Matches filters against the file name only, not the full path
//! - Yields paths in a stable order (sorted by file name per directory), so
//!   first-occurrence-wins indexing is reproducible across runs
//! - Converts paths to UTF-8 [`Utf8PathBuf`](camino::Utf8PathBuf)
//!
//! # Examples
//!
//! ```ignore
//! use refix_engine::FileWalker;
//! use camino::Utf8Path;
//!
//! let walker = FileWalker::new(Utf8Path::new("Assets"))?.with_patterns(&["*.prefab"])?;
//! for path in walker.collect_paths()? {
//!     println!("Found: {path}");
//! }
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use refix_core::ConfigError;

use crate::error::ScanError;

/// A file walker that discovers files matching a set of name globs.
///
/// # Design
///
/// The walker uses a "collect-then-parallelize" pattern:
/// 1. Walker collects all paths first (single-threaded, I/O bound)
/// 2. Paths are then processed in parallel with rayon
///
/// Each file is visited once, so a file matching several filters is still
/// listed once and no two workers ever share a path.
#[derive(Debug)]
pub struct FileWalker {
    /// The root directory to walk.
    root: Utf8PathBuf,
    /// Filename filters. An empty set matches every file.
    patterns: GlobSet,
    /// Whether to follow symbolic links.
    follow_links: bool,
}

impl FileWalker {
    /// Creates a new file walker for the given root directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDirectory`] (as [`ScanError::Config`])
    /// if the root path doesn't exist or isn't a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, ScanError> {
        if !root.is_dir() {
            return Err(ConfigError::MissingDirectory(root.to_owned()).into());
        }

        Ok(Self {
            root: root.to_owned(),
            patterns: GlobSet::empty(),
            follow_links: false,
        })
    }

    /// Restricts the walk to files whose name matches any of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if a pattern is not a valid glob.
    pub fn with_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|e| {
                ConfigError::invalid_option(format!("filter '{pattern}'"), e.to_string())
            })?;
            builder.add(glob);
        }
        self.patterns = builder
            .build()
            .map_err(|e| ConfigError::invalid_option("filters", e.to_string()))?;
        Ok(self)
    }

    /// Configures whether to follow symbolic links.
    ///
    /// By default, symbolic links are not followed.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Collects all matching file paths in the directory tree.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Walk`] if directory traversal fails.
    /// Returns [`ScanError::NonUtf8Path`] if a non-UTF-8 path is encountered.
    pub fn collect_paths(&self) -> Result<Vec<Utf8PathBuf>, ScanError> {
        let mut paths = Vec::new();

        for result in self.build_walker() {
            let entry = result?;

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            let utf8_path =
                Utf8Path::from_path(path).ok_or_else(|| ScanError::NonUtf8Path(path.to_owned()))?;

            if !self.matches(utf8_path) {
                continue;
            }

            paths.push(utf8_path.to_owned());
        }

        Ok(paths)
    }

    /// Builds the ignore walker with configured settings.
    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            // Enumerate everything, including hidden and gitignored files
            .standard_filters(false)
            .follow_links(self.follow_links)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build()
    }

    /// Checks a path's file name against the filters.
    fn matches(&self, path: &Utf8Path) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        path.file_name()
            .is_some_and(|name| self.patterns.is_match(name))
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}
