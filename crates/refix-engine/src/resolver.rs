//! Script module resolution: source file -> [`FileId`].
//!
//! A script's file ID is derived from its namespace and class name, so
//! resolving a module means finding those two declarations in its source.
//! This is a line scan, not a parse:
//!
//! - `namespace <name>` at the start of a line declares the namespace; a later
//!   namespace line replaces an earlier one until the module is resolved
//! - the first `class <Identifier>` anywhere on a line declares the type
//!
//! Scanning stops as soon as both are known. A module with a class but no
//! namespace resolves in the global (empty) namespace; a module with no class
//! does not resolve.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::RwLock;
use refix_core::FileId;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::ScanError;

#[allow(clippy::expect_used)]
static NAMESPACE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^namespace (.*)$").expect("valid namespace pattern"));

#[allow(clippy::expect_used)]
static CLASS_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid class pattern")
});

/// A declaration found while scanning a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    /// `namespace Game.Actors`
    Namespace(String),
    /// `public class Player : MonoBehaviour`
    Type(String),
}

/// Lazily yields the declarations of a module, line by line.
///
/// A line declaring both a namespace and a class yields the namespace first.
///
/// # Examples
///
/// ```
/// use refix_engine::{declarations, Declaration};
///
/// let source = "using UnityEngine;\nnamespace Game {\n    public class Player : MonoBehaviour\n";
/// let found: Vec<_> = declarations(source.as_bytes()).collect::<Result<_, _>>().unwrap();
/// assert_eq!(
///     found,
///     vec![
///         Declaration::Namespace("Game".to_owned()),
///         Declaration::Type("Player".to_owned()),
///     ]
/// );
/// ```
pub fn declarations<R: BufRead>(reader: R) -> Declarations<R> {
    Declarations {
        reader,
        buf: Vec::new(),
        pending: None,
    }
}

/// Iterator returned by [`declarations`].
///
/// Lines are decoded lossily, so bytes that are not UTF-8 (a Latin-1 header
/// comment, say) do not stop the scan.
#[derive(Debug)]
pub struct Declarations<R> {
    reader: R,
    buf: Vec<u8>,
    pending: Option<Declaration>,
}

impl<R: BufRead> Iterator for Declarations<R> {
    type Item = io::Result<Declaration>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(pending) = self.pending.take() {
            return Some(Ok(pending));
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }

            let decoded = String::from_utf8_lossy(&self.buf);
            let line = decoded.trim_end_matches(['\n', '\r']);

            let namespace = namespace_of(line);
            let type_name = CLASS_DECLARATION
                .captures(line)
                .map(|caps| Declaration::Type(caps[1].to_owned()));

            match (namespace, type_name) {
                (Some(namespace), type_name) => {
                    self.pending = type_name;
                    return Some(Ok(namespace));
                }
                (None, Some(type_name)) => return Some(Ok(type_name)),
                (None, None) => {}
            }
        }
    }
}

/// Extracts the namespace declared on `line`, if any.
///
/// Trailing `{` (block-scoped) and `;` (file-scoped) are not part of the name.
fn namespace_of(line: &str) -> Option<Declaration> {
    let caps = NAMESPACE_LINE.captures(line)?;
    let name = caps[1]
        .trim_end()
        .trim_end_matches(['{', ';'])
        .trim_end();

    if name.is_empty() {
        return None;
    }
    Some(Declaration::Namespace(name.to_owned()))
}

/// Resolves the file ID of the first class declared in `reader`.
///
/// # Errors
///
/// Returns any I/O error raised while reading lines.
///
/// # Examples
///
/// ```
/// use refix_core::FileId;
/// use refix_engine::resolve_source;
///
/// let source = "namespace UnityEngine.UI\n{\n    public class Image : MaskableGraphic\n";
/// assert_eq!(resolve_source(source.as_bytes())?, Some(FileId::new(-765806418)));
/// assert_eq!(resolve_source("// nothing here\n".as_bytes())?, None);
/// # Ok::<(), std::io::Error>(())
/// ```
pub fn resolve_source<R: BufRead>(reader: R) -> io::Result<Option<FileId>> {
    let mut namespace: Option<String> = None;
    let mut type_name: Option<String> = None;

    for declaration in declarations(reader) {
        match declaration? {
            Declaration::Namespace(name) => namespace = Some(name),
            Declaration::Type(name) => {
                type_name.get_or_insert(name);
            }
        }

        if let (Some(namespace), Some(type_name)) = (&namespace, &type_name) {
            return Ok(Some(FileId::compute(namespace, type_name)));
        }
    }

    Ok(type_name.map(|name| FileId::compute("", &name)))
}

/// Resolves script modules to file IDs, remembering each module's result.
///
/// Resolution is a pure function of the module's contents, so the memo does
/// not affect output: a document rewritten alongside others gets exactly the
/// IDs it would get alone.
///
/// # Thread Safety
///
/// `ModuleResolver` is both `Send` and `Sync`. Workers share one resolver;
/// the memo lock is held only for the map lookup or insert, never while a
/// module is being read. Read failures are not remembered.
#[derive(Debug, Default)]
pub struct ModuleResolver {
    resolved: RwLock<FxHashMap<Utf8PathBuf, Option<FileId>>>,
}

impl ModuleResolver {
    /// Creates a resolver with an empty memo.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves the module at `path`.
    ///
    /// Returns `Ok(None)` if the module declares no class.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Read`] if the module cannot be opened or read.
    pub fn resolve(&self, path: &Utf8Path) -> Result<Option<FileId>, ScanError> {
        if let Some(known) = self.resolved.read().get(path) {
            return Ok(*known);
        }

        let file = File::open(path.as_std_path()).map_err(|e| ScanError::read(path, e))?;
        let file_id = resolve_source(BufReader::new(file)).map_err(|e| ScanError::read(path, e))?;
        debug!(module = %path, file_id = ?file_id, "Resolved module");

        self.resolved
            .write()
            .entry(path.to_owned())
            .or_insert(file_id);
        Ok(file_id)
    }

    /// Returns the number of modules resolved so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.read().len()
    }

    /// Returns `true` if no module has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.read().is_empty()
    }
}
