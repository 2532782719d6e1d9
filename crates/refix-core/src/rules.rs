//! Replacement rules parsed from the configuration tables.
//!
//! [`RuleSet`] turns the raw string rows of a [`Config`] into typed lookup
//! structures:
//!
//! | Table | Row | Lookup |
//! |-------|-----|--------|
//! | `AssemblyBindings` | `[directory, replacementGuid]` | ordered list |
//! | `ScriptReplacements` | `[oldGuid, newGuid, newFileId]` | map by old guid, first row wins |
//! | `GuidReplacements` | `[oldGuid, newGuid]` | ordered list |
//!
//! A rule set is built once, before any document is processed, and is
//! read-only afterwards.

use camino::Utf8PathBuf;
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::error::ConfigError;
use crate::types::{FileId, Guid};

/// A directory of descriptors whose scripts now live under `guid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyBinding {
    /// Directory scanned recursively for `.meta` descriptors.
    pub directory: Utf8PathBuf,
    /// Replacement guid for every descriptor found under `directory`.
    pub guid: Guid,
}

/// An explicit override for one script reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptReplacement<'a> {
    /// The guid written in place of the old one.
    pub guid: &'a Guid,
    /// The file ID written in place of the old one.
    pub file_id: FileId,
}

/// An unconditional substring replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidReplacement {
    /// Text searched for on every line.
    pub from: Guid,
    /// Text written in its place.
    pub to: Guid,
}

/// The parsed replacement tables.
///
/// # Examples
///
/// ```
/// use refix_core::{Config, FileId, RuleSet};
///
/// let mut config = Config::default();
/// config.script_replacements = vec![vec!["abc".into(), "def".into(), "42".into()]];
///
/// let rules = RuleSet::from_config(&config)?;
/// let replacement = rules.script_replacement("abc").unwrap();
/// assert_eq!(replacement.guid.as_str(), "def");
/// assert_eq!(replacement.file_id, FileId::new(42));
/// # Ok::<(), refix_core::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    assembly_bindings: Vec<AssemblyBinding>,
    script_replacements: FxHashMap<Guid, (Guid, FileId)>,
    guid_replacements: Vec<GuidReplacement>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the three tables of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the table and row if a
    /// row has the wrong number of fields, an empty guid, or a file ID that
    /// is not a 32-bit integer.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::parse(
            &config.assembly_bindings,
            &config.guid_replacements,
            &config.script_replacements,
        )
    }

    /// Parses raw table rows.
    ///
    /// # Errors
    ///
    /// See [`from_config`](Self::from_config).
    pub fn parse(
        assembly_bindings: &[Vec<String>],
        guid_replacements: &[Vec<String>],
        script_replacements: &[Vec<String>],
    ) -> Result<Self, ConfigError> {
        let mut rules = Self::new();

        for (index, row) in assembly_bindings.iter().enumerate() {
            let [directory, guid] = fields::<2>("AssemblyBindings", index, row)?;
            rules.assembly_bindings.push(AssemblyBinding {
                directory: Utf8PathBuf::from(directory),
                guid: Guid::from(guid),
            });
        }

        for (index, row) in script_replacements.iter().enumerate() {
            let [from, to, file_id] = fields::<3>("ScriptReplacements", index, row)?;
            let file_id = file_id.parse::<FileId>().map_err(|e| {
                ConfigError::invalid_option(
                    format!("ScriptReplacements[{index}]"),
                    format!("file ID '{file_id}' is not a 32-bit integer: {e}"),
                )
            })?;
            rules.insert_script_replacement(Guid::from(from), Guid::from(to), file_id);
        }

        for (index, row) in guid_replacements.iter().enumerate() {
            let [from, to] = fields::<2>("GuidReplacements", index, row)?;
            rules.guid_replacements.push(GuidReplacement {
                from: Guid::from(from),
                to: Guid::from(to),
            });
        }

        Ok(rules)
    }

    /// Adds an explicit override unless one already exists for `from`.
    ///
    /// Returns `false` if the key was already present; the earlier row wins.
    pub fn insert_script_replacement(&mut self, from: Guid, to: Guid, file_id: FileId) -> bool {
        if self.script_replacements.contains_key(&from) {
            return false;
        }
        self.script_replacements.insert(from, (to, file_id));
        true
    }

    /// Returns the explicit override for `guid`, if any.
    #[must_use]
    pub fn script_replacement(&self, guid: &str) -> Option<ScriptReplacement<'_>> {
        self.script_replacements
            .get(guid)
            .map(|(to, file_id)| ScriptReplacement {
                guid: to,
                file_id: *file_id,
            })
    }

    /// Returns the binding directories in configuration order.
    #[inline]
    #[must_use]
    pub fn assembly_bindings(&self) -> &[AssemblyBinding] {
        &self.assembly_bindings
    }

    /// Returns the unconditional replacements in configuration order.
    #[inline]
    #[must_use]
    pub fn guid_replacements(&self) -> &[GuidReplacement] {
        &self.guid_replacements
    }

    /// Returns the number of explicit overrides.
    #[inline]
    #[must_use]
    pub fn script_replacement_count(&self) -> usize {
        self.script_replacements.len()
    }
}

/// Splits a row into exactly `N` non-empty fields.
fn fields<'a, const N: usize>(
    table: &str,
    index: usize,
    row: &'a [String],
) -> Result<[&'a str; N], ConfigError> {
    let option = || format!("{table}[{index}]");

    if row.len() != N {
        return Err(ConfigError::invalid_option(
            option(),
            format!("expected {N} fields, found {}", row.len()),
        ));
    }

    let mut out = [""; N];
    for (slot, field) in out.iter_mut().zip(row) {
        if field.is_empty() {
            return Err(ConfigError::invalid_option(option(), "fields must not be empty"));
        }
        *slot = field.as_str();
    }
    Ok(out)
}
