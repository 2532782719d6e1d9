//! Descriptor indexing and parallel script reference rewriting.
//!
//! This crate is the engine behind the `refix` CLI. It repairs the script
//! references of serialized scene and prefab documents after the scripts
//! they point at were moved into a compiled assembly.
//!
//! # Overview
//!
//! The main entry point is [`Remapper`], which combines:
//!
//! - [`DescriptorIndex`]: old guid -> (descriptor, replacement guid), from `.meta` files
//! - [`ModuleResolver`]: script module -> [`FileId`](refix_core::FileId), memoized
//! - [`DocumentRewriter`]: per-line substitution and atomic replacement
//! - [`FileWalker`]: sorted directory traversal with filename globs
//! - [`RewriteStats`]: atomic statistics shared by workers
//!
//! # Example
//!
//! ```ignore
//! use refix_core::Config;
//! use refix_engine::{Remapper, RewriteMode};
//!
//! let config = Config::load("appsettings.json".into())?;
//! let remapper = Remapper::new(config)?;
//!
//! let result = remapper.run(RewriteMode::Apply)?;
//! println!("Rewrote {} of {} documents", result.stats.rewritten, result.stats.total);
//! for (path, error) in &result.errors {
//!     eprintln!("{path}: {error}");
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Remapper::new (sequential, fatal errors only)
//!     │
//!     ├── Config::validate
//!     ├── RuleSet::from_config
//!     ├── DescriptorIndex::build ── FileWalker (*.meta per binding)
//!     └── FileWalker (PrefabsPath, AssetTypes)
//!
//! Remapper::run (parallel, per-document errors)
//!     │
//!     ├── FileWalker::collect_paths
//!     └── par_iter ── DocumentRewriter::rewrite
//!                         ├── ModuleResolver (RwLock memo)
//!                         └── tempfile + persist
//! ```
//!
//! # Concurrency
//!
//! Everything built by [`Remapper::new`] is read-only during a run, except
//! the resolver memo, whose entries are a pure function of the module text.
//! Each worker owns one document at a time; no two workers share a path.

#![deny(clippy::all)]
#![warn(missing_docs)]

mod descriptor;
mod error;
mod resolver;
mod rewriter;
mod stats;
mod walker;

pub use descriptor::{Binding, DESCRIPTOR_SUFFIX, DescriptorIndex};
pub use error::ScanError;
pub use resolver::{Declaration, Declarations, ModuleResolver, declarations, resolve_source};
pub use rewriter::{BACKUP_SUFFIX, DocumentRewriter, RewriteMode, RewriteOutcome};
pub use stats::{RewriteStats, StatsSnapshot};
pub use walker::FileWalker;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use refix_core::{Config, RuleSet};
use tracing::{info, warn};

/// Result of a run.
///
/// Contains statistics, the changed documents and the per-document errors,
/// each in document order.
#[derive(Debug)]
pub struct RunResult {
    /// Statistics snapshot from the run.
    pub stats: StatsSnapshot,
    /// Documents that changed (or would change, under [`RewriteMode::Check`]),
    /// each with its number of changed lines.
    pub changed: Vec<(Utf8PathBuf, u64)>,
    /// Documents that failed, each with its error. Failed documents are
    /// left as they were.
    pub errors: Vec<(Utf8PathBuf, ScanError)>,
}

/// Repairs script references across a document tree.
///
/// Construction performs every check that can fail for the run as a whole;
/// once a `Remapper` exists, [`run`](Self::run) only reports per-document
/// errors (plus a failure to walk the tree or build the worker pool).
///
/// # Examples
///
/// ```ignore
/// use refix_core::Config;
/// use refix_engine::{Remapper, RewriteMode};
///
/// let mut config = Config::default();
/// config.prefabs_path = "Assets".into();
/// config.guid_replacements = vec![vec!["oldguid".into(), "newguid".into()]];
///
/// let remapper = Remapper::new(config)?;
/// let dry_run = remapper.run(RewriteMode::Check)?;
/// println!("{} documents would change", dry_run.stats.rewritten);
/// ```
#[derive(Debug)]
pub struct Remapper {
    /// Validated configuration.
    config: Config,
    /// Parsed replacement tables.
    rules: RuleSet,
    /// Old guid -> binding, from the assembly binding directories.
    index: DescriptorIndex,
    /// Module resolution memo shared by all workers.
    resolver: ModuleResolver,
    /// Walker over `PrefabsPath`, filtered by `AssetTypes`.
    documents: FileWalker,
}

impl Remapper {
    /// Builds every lookup table for a run.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] for invalid options, malformed table
    /// rows, or a missing `PrefabsPath` or binding directory, and
    /// [`ScanError::Walk`] if a binding directory cannot be traversed.
    /// No document has been opened when an error is returned.
    pub fn new(config: Config) -> Result<Self, ScanError> {
        config.validate()?;
        let rules = RuleSet::from_config(&config)?;

        info!(
            bindings = rules.assembly_bindings().len(),
            script_replacements = rules.script_replacement_count(),
            guid_replacements = rules.guid_replacements().len(),
            "Parsed replacement rules"
        );

        let index = DescriptorIndex::build(rules.assembly_bindings(), config.follow_links)?;
        let documents = FileWalker::new(&config.prefabs_path)?
            .with_patterns(&config.asset_types)?
            .with_follow_links(config.follow_links);

        Ok(Self {
            config,
            rules,
            index,
            resolver: ModuleResolver::new(),
            documents,
        })
    }

    /// Rewrites every document under `PrefabsPath`.
    ///
    /// Documents are processed in parallel with rayon, inside a pool of
    /// `MaxParallelJobs` threads when that option is set. A failing document
    /// is recorded in [`RunResult::errors`] and does not affect the others.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Walk`] or [`ScanError::NonUtf8Path`] if the
    /// document tree cannot be enumerated, and [`ScanError::ThreadPool`] if
    /// the bounded pool cannot be created. Both happen before any document
    /// is opened.
    pub fn run(&self, mode: RewriteMode) -> Result<RunResult, ScanError> {
        let paths = self.documents.collect_paths()?;
        info!(
            root = %self.documents.root(),
            count = paths.len(),
            mode = ?mode,
            "Collected documents"
        );

        let stats = RewriteStats::new();
        let rewriter = DocumentRewriter::new(&self.index, &self.rules, &self.resolver);

        let rewrite_all = || -> Vec<(Utf8PathBuf, Result<RewriteOutcome, ScanError>)> {
            paths
                .par_iter()
                .map(|path| {
                    let outcome = rewriter.rewrite(path, mode);
                    match &outcome {
                        Ok(RewriteOutcome::Rewritten { changed_lines }) => {
                            stats.record_rewritten(*changed_lines);
                        }
                        Ok(RewriteOutcome::Unchanged) => stats.record_unchanged(),
                        Err(e) => {
                            stats.record_failed();
                            warn!(document = %path, error = %e, "Failed to rewrite document");
                        }
                    }
                    (path.clone(), outcome)
                })
                .collect()
        };

        let outcomes = match self.config.max_parallel_jobs {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .thread_name(|index| format!("refix-worker-{index}"))
                .build()?
                .install(rewrite_all),
            None => rewrite_all(),
        };

        let mut changed = Vec::new();
        let mut errors = Vec::new();
        for (path, outcome) in outcomes {
            match outcome {
                Ok(RewriteOutcome::Rewritten { changed_lines }) => changed.push((path, changed_lines)),
                Ok(RewriteOutcome::Unchanged) => {}
                Err(e) => errors.push((path, e)),
            }
        }

        let stats = stats.snapshot();
        info!(
            total = stats.total,
            rewritten = stats.rewritten,
            unchanged = stats.unchanged,
            failed = stats.failed,
            lines_changed = stats.lines_changed,
            "Run completed"
        );

        Ok(RunResult {
            stats,
            changed,
            errors,
        })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the parsed replacement tables.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the descriptor index.
    #[must_use]
    pub const fn index(&self) -> &DescriptorIndex {
        &self.index
    }

    /// Returns the document root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.documents.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refix_core::{ConfigError, FileId};
    use std::fs;
    use tempfile::TempDir;

    const OLD: &str = "4f1c2a9e0d7b4c3a8e6f5d4c3b2a1908";
    const ASSEMBLY: &str = "ffffffffffffffffffffffffffffffff";

    fn write(root: &Utf8Path, relative: &str, contents: &str) -> Utf8PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, contents).expect("write file");
        path
    }

    fn reference(file_id: &str, guid: &str) -> String {
        format!("  m_Script: {{fileID: {file_id}, guid: {guid}, type: 3}}\n")
    }

    /// A project with one bound module (`OLD` -> `Game.Actors.Player`) and
    /// one unconditional replacement (`zzz` -> `yyy`).
    fn project(dir: &TempDir) -> Config {
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        write(
            root,
            "Decompiled/Actors/Player.cs",
            "namespace Game.Actors\n{\n    public class Player : MonoBehaviour\n",
        );
        write(
            root,
            "Decompiled/Actors/Player.cs.meta",
            &format!("fileFormatVersion: 2\nguid: {OLD}\n"),
        );

        Config {
            prefabs_path: root.join("Assets"),
            assembly_bindings: vec![vec![root.join("Decompiled").into_string(), ASSEMBLY.to_owned()]],
            guid_replacements: vec![vec!["zzz".to_owned(), "yyy".to_owned()]],
            script_replacements: vec![vec!["abc".to_owned(), "def".to_owned(), "42".to_owned()]],
            ..Config::default()
        }
    }

    #[test]
    fn test_run_rewrites_documents() {
        let dir = TempDir::new().expect("temp dir");
        let config = project(&dir);
        let assets = config.prefabs_path.clone();
        let player = write(&assets, "Player.prefab", &reference("11500000", OLD));
        let override_ = write(&assets, "UI/Menu.unity", &reference("11500000", "abc"));
        let texture = write(&assets, "Data.asset", "  m_Texture: {fileID: 2800000, guid: zzz, type: 3}\n");
        let untouched = write(&assets, "Plain.prefab", "--- !u!1 &1\nGameObject:\n");
        let ignored = write(&assets, "Notes.txt", &reference("11500000", OLD));

        let result = Remapper::new(config)
            .expect("remapper")
            .run(RewriteMode::Apply)
            .expect("run");

        assert!(result.errors.is_empty());
        assert_eq!(result.stats.total, 4);
        assert_eq!(result.stats.rewritten, 3);
        assert_eq!(result.stats.unchanged, 1);

        let player_id = FileId::compute("Game.Actors", "Player");
        assert_eq!(
            fs::read_to_string(&player).expect("read"),
            reference(&player_id.to_string(), ASSEMBLY)
        );
        assert_eq!(fs::read_to_string(&override_).expect("read"), reference("42", "def"));
        assert!(fs::read_to_string(&texture).expect("read").contains("guid: yyy"));
        assert_eq!(
            fs::read_to_string(&untouched).expect("read"),
            "--- !u!1 &1\nGameObject:\n"
        );
        assert_eq!(
            fs::read_to_string(&ignored).expect("read"),
            reference("11500000", OLD)
        );
    }

    #[test]
    fn test_check_mode_touches_nothing() {
        let dir = TempDir::new().expect("temp dir");
        let config = project(&dir);
        let player = write(&config.prefabs_path, "Player.prefab", &reference("1", OLD));

        let result = Remapper::new(config)
            .expect("remapper")
            .run(RewriteMode::Check)
            .expect("run");

        assert_eq!(result.stats.rewritten, 1);
        assert_eq!(result.stats.lines_changed, 1);
        assert_eq!(result.changed, vec![(player.clone(), 1)]);
        assert_eq!(fs::read_to_string(&player).expect("read"), reference("1", OLD));
    }

    #[test]
    fn test_missing_binding_directory_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = project(&dir);
        let player = write(&config.prefabs_path, "Player.prefab", "guid: zzz\n");
        config
            .assembly_bindings
            .push(vec!["/nonexistent/Decompiled".to_owned(), ASSEMBLY.to_owned()]);

        let err = Remapper::new(config).expect_err("missing directory");
        assert!(matches!(
            &err,
            ScanError::Config(ConfigError::MissingDirectory(path)) if path.as_str() == "/nonexistent/Decompiled"
        ));
        assert_eq!(fs::read_to_string(&player).expect("read"), "guid: zzz\n");
    }

    #[test]
    fn test_missing_prefabs_path_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let config = project(&dir);

        let err = Remapper::new(config).expect_err("Assets was never created");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_rule_is_fatal() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = project(&dir);
        fs::create_dir_all(&config.prefabs_path).expect("assets");
        config.script_replacements.push(vec!["only-two".to_owned(), "fields".to_owned()]);

        let err = Remapper::new(config).expect_err("bad row");
        insta::assert_snapshot!(
            err.to_string(),
            @"invalid configuration option 'ScriptReplacements[1]': expected 3 fields, found 2"
        );
    }

    #[test]
    fn test_failed_document_is_isolated() {
        let dir = TempDir::new().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("utf8");
        let mut config = project(&dir);
        write(root, "Broken/Gone.cs.meta", "guid: gone\n");
        config
            .assembly_bindings
            .push(vec![root.join("Broken").into_string(), ASSEMBLY.to_owned()]);

        let broken = write(&config.prefabs_path, "A.prefab", &reference("1", "gone"));
        let fine = write(&config.prefabs_path, "B.prefab", &reference("1", "abc"));

        let result = Remapper::new(config)
            .expect("remapper")
            .run(RewriteMode::Apply)
            .expect("run");

        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.stats.rewritten, 1);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].0, broken);
        assert!(result.errors[0].1.is_recoverable());
        assert_eq!(fs::read_to_string(&broken).expect("read"), reference("1", "gone"));
        assert_eq!(fs::read_to_string(&fine).expect("read"), reference("42", "def"));
    }

    #[test]
    fn test_bounded_pool_matches_single_rewrites() {
        let dir = TempDir::new().expect("temp dir");
        let mut config = project(&dir);
        config.max_parallel_jobs = Some(3);

        let batch = config.prefabs_path.join("batch");
        let single = config.prefabs_path.join("single");
        for i in 0..24 {
            let guid = match i % 3 {
                0 => OLD,
                1 => "abc",
                _ => "zzz",
            };
            let contents = format!("--- !u!114 &{i}\n{}m_Name: doc{i}\n", reference(&i.to_string(), guid));
            write(&batch, &format!("doc{i:02}.prefab"), &contents);
            write(&single, &format!("doc{i:02}.prefab"), &contents);
        }

        let batch_config = Config {
            prefabs_path: batch.clone(),
            ..config.clone()
        };
        let result = Remapper::new(batch_config)
            .expect("remapper")
            .run(RewriteMode::Apply)
            .expect("run");
        assert_eq!(result.stats.total, 24);
        assert!(result.errors.is_empty());

        let remapper = Remapper::new(Config {
            prefabs_path: single.clone(),
            ..config
        })
        .expect("remapper");
        let resolver = ModuleResolver::new();
        let rewriter = DocumentRewriter::new(remapper.index(), remapper.rules(), &resolver);
        for i in 0..24 {
            let name = format!("doc{i:02}.prefab");
            rewriter
                .rewrite(&single.join(&name), RewriteMode::Apply)
                .expect("single rewrite");
            assert_eq!(
                fs::read_to_string(batch.join(&name)).expect("batch"),
                fs::read_to_string(single.join(&name)).expect("single"),
                "{name}"
            );
        }
    }
}
