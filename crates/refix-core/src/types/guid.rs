//! Content hash identifiers.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The opaque content hash half of a script reference.
///
/// Equality is exact string equality; no case or whitespace normalization
/// is ever applied. Implements [`Borrow<str>`] so maps keyed by `Guid`
/// can be queried with a plain `&str` taken from a document line.
///
/// # Examples
///
/// ```
/// use refix_core::Guid;
///
/// let guid = Guid::new("f70555f144d8491a825f0804e09c671c");
/// assert_eq!(guid.as_str(), "f70555f144d8491a825f0804e09c671c");
/// assert_ne!(guid, Guid::new("F70555F144D8491A825F0804E09C671C"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    /// Creates a new guid from any string-like value.
    #[inline]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the guid text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Guid {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Guid {
    #[inline]
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Guid {
    #[inline]
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
