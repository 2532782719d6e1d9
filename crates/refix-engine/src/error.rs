//! Error types for the refix-engine crate.
//!
//! This module provides the [`ScanError`] type for errors that can occur
//! while indexing descriptors and rewriting documents.

use camino::Utf8PathBuf;
use refix_core::ConfigError;

/// Errors that can occur during indexing and rewriting.
///
/// # Error Recovery Strategy
///
/// - **Configuration errors** ([`ScanError::Config`]): Fatal - the run stops
///   before any document is touched
/// - **Walker errors** ([`ScanError::Walk`]): Fatal - propagate immediately
/// - **Read errors** ([`ScanError::Read`]): Log warning, skip document, continue run
/// - **Write errors** ([`ScanError::Write`]): Log warning, skip document, continue run
///
/// # Examples
///
/// ```
/// use refix_engine::ScanError;
///
/// fn handle_error(err: ScanError) {
///     match err {
///         ScanError::Config(e) => eprintln!("Config error: {e}"),
///         ScanError::Walk(e) => eprintln!("Walk error: {e}"),
///         ScanError::Read { path, .. } => eprintln!("Read error: {path}"),
///         ScanError::Write { path, .. } => eprintln!("Write error: {path}"),
///         ScanError::NonUtf8Path(p) => eprintln!("Invalid path: {}", p.display()),
///         ScanError::ThreadPool(e) => eprintln!("Worker pool error: {e}"),
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Invalid configuration, including missing directories.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failed to walk a directory.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// Failed to read a document, descriptor, or script module.
    #[error("failed to read file {path}: {source}")]
    Read {
        /// The path of the file that couldn't be read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write or swap a rewritten document into place.
    #[error("failed to write file {path}: {source}")]
    Write {
        /// The path of the document that couldn't be replaced.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The bounded worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ScanError {
    /// Creates a new [`ScanError::Read`] error.
    #[inline]
    pub fn read(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`ScanError::Write`] error.
    #[inline]
    pub fn write(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error is recoverable (the run can continue
    /// with the remaining documents).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Read { .. } | Self::Write { .. })
    }

    /// Returns `true` if this error is fatal (the run should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns the file path associated with this error, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Utf8PathBuf> {
        match self {
            Self::Read { path, .. } | Self::Write { path, .. } => Some(path),
            Self::Config(ConfigError::MissingDirectory(path)) => Some(path),
            Self::Config(_) | Self::Walk(_) | Self::NonUtf8Path(_) | Self::ThreadPool(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_scan_error_read() {
        let err = ScanError::read(
            "Assets/Player.prefab",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("Assets/Player.prefab"));
        assert!(err.to_string().contains("Assets/Player.prefab"));
    }

    #[test]
    fn test_scan_error_write() {
        let err = ScanError::write(
            "Assets/Level.unity",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_recoverable());
        assert_eq!(err.path().map(|p| p.as_str()), Some("Assets/Level.unity"));
    }

    #[test]
    fn test_scan_error_missing_directory_is_fatal() {
        let err = ScanError::from(ConfigError::MissingDirectory(Utf8PathBuf::from("/asm/Gameplay")));
        assert!(err.is_fatal());
        assert_eq!(err.path().map(|p| p.as_str()), Some("/asm/Gameplay"));
        insta::assert_snapshot!(err.to_string(), @"missing required directory: /asm/Gameplay");
    }

    #[test]
    fn test_scan_error_non_utf8() {
        use std::path::PathBuf;
        let err = ScanError::NonUtf8Path(PathBuf::from("test"));
        assert!(err.is_fatal());
        assert!(err.path().is_none());
    }
}
