//! Numeric script type identifiers.
//!
//! The engine identifies a script type inside a compiled assembly by a 32-bit
//! value derived from the type's namespace and name. [`FileId::compute`]
//! reproduces that derivation bit-for-bit:
//!
//! 1. Build the bytes `"s\0\0\0" + namespace + name` (UTF-8).
//! 2. Take the MD4 digest of those bytes.
//! 3. Read the first four digest bytes as a little-endian `u32` and
//!    reinterpret the bits as `i32`.
//!
//! MD4 is used for format compatibility only. It is not collision resistant
//! and must never be used for anything security related.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use md4::{Digest, Md4};
use serde::{Deserialize, Serialize};

/// Preamble the engine prepends before hashing a type name.
const HASH_PREAMBLE: &[u8] = b"s\0\0\0";

/// The numeric half of a script reference (`fileID` in serialized documents).
///
/// Uses a newtype pattern for type safety - prevents accidentally mixing a
/// raw integer with a resolved identifier.
///
/// # Examples
///
/// ```
/// use refix_core::FileId;
///
/// let id = FileId::compute("UnityEngine.UI", "Image");
/// assert_eq!(id, FileId::new(-765806418));
/// assert_eq!(id.to_string(), "-765806418");
/// assert_eq!("-765806418".parse::<FileId>(), Ok(id));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i32);

impl FileId {
    /// Creates a new file ID from an `i32` value.
    #[inline]
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Returns the inner `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Derives the file ID of the type `name` declared in `namespace`.
    ///
    /// An empty `namespace` is the global namespace and is hashed as-is;
    /// no normalization is applied to either argument.
    ///
    /// # Examples
    ///
    /// ```
    /// use refix_core::FileId;
    ///
    /// assert_eq!(FileId::compute("UnityEngine.UI", "Text").as_i32(), 708705254);
    /// assert_eq!(FileId::compute("", "PlayerController").as_i32(), 961855446);
    /// ```
    #[must_use]
    pub fn compute(namespace: &str, name: &str) -> Self {
        let mut hasher = Md4::new();
        hasher.update(HASH_PREAMBLE);
        hasher.update(namespace.as_bytes());
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        Self(i32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}

impl From<i32> for FileId {
    #[inline]
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<FileId> for i32 {
    #[inline]
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl FromStr for FileId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<i32>().map(Self)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
