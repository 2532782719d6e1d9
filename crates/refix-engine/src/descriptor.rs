//! Descriptor index: which old guids point at which script modules.
//!
//! Each configured [`AssemblyBinding`] names a directory of `.meta`
//! descriptors left behind after scripts were moved into a compiled assembly.
//! Every descriptor declares the guid its script used to have:
//!
//! ```text
//! fileFormatVersion: 2
//! guid: 4f1c2a9e0d7b4c3a8e6f5d4c3b2a1908
//! MonoImporter:
//! ```
//!
//! [`DescriptorIndex::build`] maps each such guid to the descriptor's path and
//! the binding's replacement guid. The index is built sequentially, once, and
//! is read-only afterwards.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use refix_core::{AssemblyBinding, Guid};
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::walker::FileWalker;

/// Extension of descriptor files, including the dot.
pub const DESCRIPTOR_SUFFIX: &str = ".meta";

/// Filename filter selecting descriptor files.
const DESCRIPTOR_PATTERN: &str = "*.meta";

#[allow(clippy::expect_used)]
static GUID_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^guid: (.*)$").expect("valid descriptor guid pattern"));

/// Where an old guid now points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The descriptor that declared the old guid.
    pub descriptor: Utf8PathBuf,
    /// The guid of the assembly the script now lives in.
    pub guid: Guid,
}

impl Binding {
    /// Returns the script module described by this binding's descriptor.
    ///
    /// By convention the module sits beside its descriptor under the same
    /// name without the `.meta` suffix (`Player.cs.meta` -> `Player.cs`).
    #[must_use]
    pub fn module_path(&self) -> &Utf8Path {
        self.descriptor
            .as_str()
            .strip_suffix(DESCRIPTOR_SUFFIX)
            .map_or(self.descriptor.as_path(), Utf8Path::new)
    }
}

/// Old guid -> [`Binding`], first occurrence wins.
///
/// # Examples
///
/// ```ignore
/// use refix_engine::DescriptorIndex;
///
/// let index = DescriptorIndex::build(rules.assembly_bindings(), false)?;
/// if let Some(binding) = index.get("4f1c2a9e0d7b4c3a8e6f5d4c3b2a1908") {
///     println!("{} -> {}", binding.module_path(), binding.guid);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DescriptorIndex {
    bindings: FxHashMap<Guid, Binding>,
}

impl DescriptorIndex {
    /// Creates an empty index.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans every binding directory, in order, and indexes its descriptors.
    ///
    /// Descriptors that cannot be read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if a binding directory does not exist,
    /// and [`ScanError::Walk`] if traversal fails.
    pub fn build(bindings: &[AssemblyBinding], follow_links: bool) -> Result<Self, ScanError> {
        let mut index = Self::new();

        for binding in bindings {
            let walker = FileWalker::new(&binding.directory)?
                .with_patterns(&[DESCRIPTOR_PATTERN])?
                .with_follow_links(follow_links);
            let descriptors = walker.collect_paths()?;

            info!(
                directory = %binding.directory,
                descriptors = descriptors.len(),
                guid = %binding.guid,
                "Scanning assembly binding"
            );

            for descriptor in descriptors {
                match read_descriptor_guid(&descriptor) {
                    Ok(Some(guid)) => {
                        if !index.insert(guid.clone(), descriptor.clone(), binding.guid.clone()) {
                            debug!(guid = %guid, descriptor = %descriptor, "Duplicate guid ignored");
                        }
                    }
                    Ok(None) => debug!(descriptor = %descriptor, "Descriptor declares no guid"),
                    Err(e) => warn!(descriptor = %descriptor, error = %e, "Skipping unreadable descriptor"),
                }
            }
        }

        info!(bindings = index.len(), "Descriptor index built");
        Ok(index)
    }

    /// Binds `old` unless it is already bound.
    ///
    /// Returns `false` if `old` was already present; the existing binding is kept.
    pub fn insert(&mut self, old: Guid, descriptor: Utf8PathBuf, guid: Guid) -> bool {
        if self.bindings.contains_key(&old) {
            return false;
        }
        self.bindings.insert(old, Binding { descriptor, guid });
        true
    }

    /// Returns the binding for `guid`, if any.
    #[inline]
    #[must_use]
    pub fn get(&self, guid: &str) -> Option<&Binding> {
        self.bindings.get(guid)
    }

    /// Returns the number of bound guids.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is bound.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Returns the guid declared by the first `guid: ` line of a descriptor.
fn read_descriptor_guid(path: &Utf8Path) -> Result<Option<Guid>, ScanError> {
    let file = File::open(path.as_std_path()).map_err(|e| ScanError::read(path, e))?;

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| ScanError::read(path, e))?;
        if let Some(caps) = GUID_LINE.captures(&line) {
            return Ok(Some(Guid::from(&caps[1])));
        }
    }

    Ok(None)
}
