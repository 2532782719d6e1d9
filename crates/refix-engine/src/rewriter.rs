//! Line-by-line repair of script references in serialized documents.
//!
//! A reference line names a script by `fileID` and `guid`:
//!
//! ```text
//!   m_Script: {fileID: 11500000, guid: 4f1c2a9e0d7b4c3a8e6f5d4c3b2a1908, type: 3}
//! ```
//!
//! For each line of a document, in order:
//!
//! 1. If it is a reference line whose guid has an explicit script
//!    replacement, the captured id and guid are replaced with the rule's.
//!    Otherwise, if the guid is bound in the [`DescriptorIndex`], the id is
//!    replaced with the bound module's resolved [`FileId`] and the guid with
//!    the binding's guid.
//! 2. Every guid replacement is then applied, as a plain substring
//!    replacement, to every line.
//!
//! Line terminators are copied through untouched, so a document that needs
//! no change is byte-identical to its input. Lines that are not valid UTF-8
//! get the same treatment on their raw bytes.

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use memchr::memmem;
use refix_core::{FileId, Guid, RuleSet};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, error, warn};

use crate::descriptor::DescriptorIndex;
use crate::error::ScanError;
use crate::resolver::ModuleResolver;

/// Suffix of the transient backup used when an atomic rename is unavailable.
pub const BACKUP_SUFFIX: &str = ".old";

const REFERENCE_PATTERN: &str = r"^\s*m_Script: \{fileID: (\d+), guid: ([^,]*),";

#[allow(clippy::expect_used)]
static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REFERENCE_PATTERN).expect("valid reference pattern"));

#[allow(clippy::expect_used)]
static RAW_REFERENCE: LazyLock<regex::bytes::Regex> = LazyLock::new(|| {
    regex::bytes::Regex::new(REFERENCE_PATTERN).expect("valid reference pattern")
});

/// Whether a rewrite replaces the document or only reports on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RewriteMode {
    /// Replace each changed document in place.
    #[default]
    Apply,
    /// Stream each document through the same logic without writing anything.
    Check,
}

/// Result of rewriting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// At least one line changed (or would change, under [`RewriteMode::Check`]).
    Rewritten {
        /// Number of changed lines.
        changed_lines: u64,
    },
    /// No line changed; the document was not touched.
    Unchanged,
}

impl RewriteOutcome {
    const fn from_changed(changed_lines: u64) -> Self {
        if changed_lines == 0 {
            Self::Unchanged
        } else {
            Self::Rewritten { changed_lines }
        }
    }

    /// Returns the number of changed lines.
    #[must_use]
    pub const fn changed_lines(&self) -> u64 {
        match self {
            Self::Rewritten { changed_lines } => *changed_lines,
            Self::Unchanged => 0,
        }
    }
}

/// Rewrites documents against shared, read-only lookup tables.
///
/// A rewriter borrows everything it reads, so one instance is shared by
/// every worker of a run.
///
/// # Examples
///
/// ```
/// use refix_core::RuleSet;
/// use refix_engine::{DescriptorIndex, DocumentRewriter, ModuleResolver};
///
/// let row = vec!["abc".to_owned(), "def".to_owned(), "42".to_owned()];
/// let rules = RuleSet::parse(&[], &[], &[row])?;
/// let index = DescriptorIndex::new();
/// let resolver = ModuleResolver::new();
/// let rewriter = DocumentRewriter::new(&index, &rules, &resolver);
///
/// let line = rewriter.rewrite_line("  m_Script: {fileID: 11500000, guid: abc, type: 3}")?;
/// assert_eq!(line, "  m_Script: {fileID: 42, guid: def, type: 3}");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy)]
pub struct DocumentRewriter<'a> {
    index: &'a DescriptorIndex,
    rules: &'a RuleSet,
    resolver: &'a ModuleResolver,
}

impl<'a> DocumentRewriter<'a> {
    /// Creates a rewriter over the given tables.
    #[must_use]
    pub const fn new(
        index: &'a DescriptorIndex,
        rules: &'a RuleSet,
        resolver: &'a ModuleResolver,
    ) -> Self {
        Self {
            index,
            rules,
            resolver,
        }
    }

    /// Rewrites a single line, without its terminator.
    ///
    /// Returns the line borrowed when nothing applies.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Read`] if a bound script module cannot be read.
    pub fn rewrite_line<'l>(&self, line: &'l str) -> Result<Cow<'l, str>, ScanError> {
        let mut out = Cow::Borrowed(line);

        let reference = REFERENCE
            .captures(line)
            .and_then(|caps| Some((caps.get(1)?, caps.get(2)?)));

        if let Some((id, guid)) = reference {
            if let Some((file_id, new_guid)) = self.target(guid.as_str())? {
                let mut replaced = String::with_capacity(line.len() + 16);
                replaced.push_str(&line[..id.start()]);
                match file_id {
                    Some(file_id) => replaced.push_str(&file_id.to_string()),
                    None => replaced.push_str(id.as_str()),
                }
                replaced.push_str(&line[id.end()..guid.start()]);
                replaced.push_str(new_guid.as_str());
                replaced.push_str(&line[guid.end()..]);
                out = Cow::Owned(replaced);
            }
        }

        for replacement in self.rules.guid_replacements() {
            if out.contains(replacement.from.as_str()) {
                let replaced = out.replace(replacement.from.as_str(), replacement.to.as_str());
                out = Cow::Owned(replaced);
            }
        }

        Ok(out)
    }

    /// Rewrites a line that is not valid UTF-8, without its terminator.
    ///
    /// Same steps as [`rewrite_line`](Self::rewrite_line), matched on bytes.
    /// A reference whose guid is not UTF-8 matches no rule.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Read`] if a bound script module cannot be read.
    pub fn rewrite_raw_line<'l>(&self, line: &'l [u8]) -> Result<Cow<'l, [u8]>, ScanError> {
        let mut out = Cow::Borrowed(line);

        let reference = RAW_REFERENCE
            .captures(line)
            .and_then(|caps| Some((caps.get(1)?, caps.get(2)?)))
            .and_then(|(id, guid)| Some((id, guid, std::str::from_utf8(guid.as_bytes()).ok()?)));

        if let Some((id, guid, old)) = reference {
            if let Some((file_id, new_guid)) = self.target(old)? {
                let mut replaced = Vec::with_capacity(line.len() + 16);
                replaced.extend_from_slice(&line[..id.start()]);
                match file_id {
                    Some(file_id) => replaced.extend_from_slice(file_id.to_string().as_bytes()),
                    None => replaced.extend_from_slice(id.as_bytes()),
                }
                replaced.extend_from_slice(&line[id.end()..guid.start()]);
                replaced.extend_from_slice(new_guid.as_str().as_bytes());
                replaced.extend_from_slice(&line[guid.end()..]);
                out = Cow::Owned(replaced);
            }
        }

        for replacement in self.rules.guid_replacements() {
            let from = replacement.from.as_str().as_bytes();
            if let Some(replaced) = replace_bytes(&out, from, replacement.to.as_str().as_bytes()) {
                out = Cow::Owned(replaced);
            }
        }

        Ok(out)
    }

    /// Looks up the new `(fileID, guid)` for a referenced guid.
    ///
    /// An explicit replacement shadows a binding for the same guid. A bound
    /// module that declares no class yields `None` for the file ID.
    fn target(&self, old: &str) -> Result<Option<(Option<FileId>, &'a Guid)>, ScanError> {
        if let Some(explicit) = self.rules.script_replacement(old) {
            return Ok(Some((Some(explicit.file_id), explicit.guid)));
        }

        let Some(binding) = self.index.get(old) else {
            return Ok(None);
        };

        let module = binding.module_path();
        let file_id = self.resolver.resolve(module)?;
        if file_id.is_none() {
            warn!(module = %module, guid = old, "No class declared in module, keeping fileID");
        }
        Ok(Some((file_id, &binding.guid)))
    }

    /// Streams `reader` through [`rewrite_line`](Self::rewrite_line) into `writer`.
    ///
    /// `source` names the document in errors. Lines that are not valid UTF-8
    /// go through [`rewrite_raw_line`](Self::rewrite_raw_line). Returns the
    /// number of changed lines.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Read`] if the document or a bound module cannot be
    /// read, and [`ScanError::Write`] if `writer` fails.
    pub fn rewrite_stream<R: BufRead, W: Write>(
        &self,
        source: &Utf8Path,
        mut reader: R,
        mut writer: W,
    ) -> Result<u64, ScanError> {
        let mut buf = Vec::new();
        let mut changed = 0;

        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| ScanError::read(source, e))?;
            if n == 0 {
                break;
            }

            let (body, terminator) = split_terminator(&buf);
            let rewritten = match std::str::from_utf8(body) {
                Ok(text) => match self.rewrite_line(text)? {
                    Cow::Borrowed(_) => Cow::Borrowed(body),
                    Cow::Owned(text) => Cow::Owned(text.into_bytes()),
                },
                Err(_) => {
                    debug!(document = %source, "Line is not valid UTF-8, matching raw bytes");
                    self.rewrite_raw_line(body)?
                }
            };
            if *rewritten != *body {
                changed += 1;
            }

            writer
                .write_all(&rewritten)
                .and_then(|()| writer.write_all(terminator))
                .map_err(|e| ScanError::write(source, e))?;
        }

        writer.flush().map_err(|e| ScanError::write(source, e))?;
        Ok(changed)
    }

    /// Rewrites the document at `path`.
    ///
    /// Under [`RewriteMode::Apply`] the rewritten text goes to a temporary
    /// file beside the document, which replaces the document only if a line
    /// changed. On any error the document is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Read`] or [`ScanError::Write`]; both are
    /// recoverable.
    pub fn rewrite(&self, path: &Utf8Path, mode: RewriteMode) -> Result<RewriteOutcome, ScanError> {
        let file = File::open(path.as_std_path()).map_err(|e| ScanError::read(path, e))?;
        let reader = BufReader::new(file);

        let outcome = match mode {
            RewriteMode::Check => {
                RewriteOutcome::from_changed(self.rewrite_stream(path, reader, io::sink())?)
            }
            RewriteMode::Apply => {
                let mut temp = tempfile::Builder::new()
                    .prefix(".refix-")
                    .tempfile_in(parent_dir(path))
                    .map_err(|e| ScanError::write(path, e))?;

                let changed =
                    self.rewrite_stream(path, reader, BufWriter::new(temp.as_file_mut()))?;
                if changed > 0 {
                    replace_atomically(temp, path)?;
                }
                RewriteOutcome::from_changed(changed)
            }
        };

        debug!(document = %path, mode = ?mode, outcome = ?outcome, "Document processed");
        Ok(outcome)
    }
}

/// Splits a line read with its terminator into `(body, terminator)`.
fn split_terminator(line: &[u8]) -> (&[u8], &[u8]) {
    let body_len = line
        .strip_suffix(b"\r\n")
        .or_else(|| line.strip_suffix(b"\n"))
        .map_or(line.len(), <[u8]>::len);
    line.split_at(body_len)
}

/// Replaces every occurrence of `from` in `haystack`; `None` if there is none.
fn replace_bytes(haystack: &[u8], from: &[u8], to: &[u8]) -> Option<Vec<u8>> {
    let mut matches = memmem::find_iter(haystack, from).peekable();
    matches.peek()?;

    let mut out = Vec::with_capacity(haystack.len());
    let mut last = 0;
    for start in matches {
        out.extend_from_slice(&haystack[last..start]);
        out.extend_from_slice(to);
        last = start + from.len();
    }
    out.extend_from_slice(&haystack[last..]);
    Some(out)
}

/// Directory the temporary file is created in; `.` for a bare file name.
fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

// ============================================================================
// Swap
// ============================================================================

/// Moves `temp` over `target`, keeping the target's permissions.
///
/// The rename is atomic: readers see the old document or the new one, never
/// a mix. If the rename is refused, falls back to [`replace_via_backup`].
fn replace_atomically(temp: NamedTempFile, target: &Utf8Path) -> Result<(), ScanError> {
    let write_err = |e| ScanError::write(target, e);

    let permissions = fs::metadata(target.as_std_path()).map_err(write_err)?.permissions();
    temp.as_file().set_permissions(permissions).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;

    match temp.persist(target.as_std_path()) {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(document = %target, error = %e.error, "Atomic rename failed, copying through backup");
            // `e.file` still owns the temporary and removes it on drop.
            replace_via_backup(e.file.path(), target)
        }
    }
}

/// Copies `temp` over `target`, restoring `target` from a backup on failure.
///
/// Refuses to run if `<target>.old` already exists.
fn replace_via_backup(temp: &Path, target: &Utf8Path) -> Result<(), ScanError> {
    let backup = Utf8PathBuf::from(format!("{target}{BACKUP_SUFFIX}"));
    // Never clobber an existing file at the backup path.
    let mut backup_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(backup.as_std_path())
        .map_err(|e| ScanError::write(target, e))?;
    let mut guard = BackupGuard {
        path: &backup,
        keep: false,
    };
    File::open(target.as_std_path())
        .and_then(|mut original| io::copy(&mut original, &mut backup_file))
        .and_then(|_| fs::metadata(target.as_std_path()))
        .and_then(|metadata| backup_file.set_permissions(metadata.permissions()))
        .and_then(|()| backup_file.sync_all())
        .map_err(|e| ScanError::write(target, e))?;
    drop(backup_file);

    if let Err(e) = fs::copy(temp, target.as_std_path()) {
        if let Err(restore) = fs::copy(backup.as_std_path(), target.as_std_path()) {
            error!(
                document = %target,
                backup = %backup,
                error = %restore,
                "Failed to restore document, keeping backup"
            );
            guard.keep = true;
        }
        return Err(ScanError::write(target, e));
    }

    Ok(())
}

/// Removes the backup when dropped, unless it is the only intact copy.
struct BackupGuard<'p> {
    path: &'p Utf8Path,
    keep: bool,
}

impl Drop for BackupGuard<'_> {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_file(self.path.as_std_path()) {
            warn!(backup = %self.path, error = %e, "Failed to remove backup");
        }
    }
}
