//! CLI entry point for the refix tool.
//!
//! This binary repairs the script references of serialized scene and prefab
//! documents after their scripts were moved into a compiled assembly.
//!
//! # Usage
//!
//! ```bash
//! refix [OPTIONS] <COMMAND>
//!
//! # Rewrite every document under PrefabsPath
//! refix run --config appsettings.json
//!
//! # Dry run: list the documents that would change
//! refix check --prefabs-path /project/Assets
//!
//! # Machine-readable summary
//! refix run --format json > report.json
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::fmt::Write as _;
use std::io::Write;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::WrapErr;
use refix_core::{Config, DEFAULT_CONFIG_FILE};
use refix_engine::{Remapper, RewriteMode, RunResult, StatsSnapshot};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Repairs script references (`fileID` + `guid`) in scene and prefab documents.
///
/// Reads its rules from a JSON configuration file, then rewrites every
/// matching document under `PrefabsPath` in parallel.
#[derive(Parser)]
#[command(name = "refix", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to the JSON configuration file.
    #[arg(short, long, global = true, env = "REFIX_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: Utf8PathBuf,

    /// Root directory scanned for documents (overrides `PrefabsPath`).
    #[arg(long, global = true, env = "REFIX_PREFABS_PATH")]
    prefabs_path: Option<Utf8PathBuf>,

    /// Number of documents rewritten concurrently (overrides `MaxParallelJobs`).
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Summary format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Rewrite every matching document in place.
    Run,

    /// Report which documents would change, without writing anything.
    Check,
}

impl Commands {
    const fn mode(&self) -> RewriteMode {
        match self {
            Self::Run => RewriteMode::Apply,
            Self::Check => RewriteMode::Check,
        }
    }
}

/// Summary output format.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary.
    Text,
    /// JSON report.
    Json,
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so that stdout carries only the summary.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(level)
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file and applies command-line overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = Config::load(&cli.config)
        .wrap_err_with(|| format!("Failed to load configuration from {}", cli.config))?;

    if let Some(path) = &cli.prefabs_path {
        config.prefabs_path.clone_from(path);
    }
    if cli.jobs.is_some() {
        config.max_parallel_jobs = cli.jobs;
    }

    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATION
// =============================================================================

/// Runs the remapper and reports the outcome.
///
/// Per-document failures are listed on stderr but do not fail the command.
///
/// # Errors
///
/// Returns an error if the run cannot start (invalid configuration, missing
/// directory) or the summary cannot be written.
fn run(config: Config, mode: RewriteMode, format: OutputFormat) -> color_eyre::Result<()> {
    let started = Instant::now();
    info!(prefabs_path = %config.prefabs_path, mode = ?mode, "Starting run");

    let remapper = Remapper::new(config).wrap_err("Failed to prepare run")?;
    let result = remapper.run(mode).wrap_err("Run aborted")?;

    let content = match format {
        OutputFormat::Text => render_text(mode, &result),
        OutputFormat::Json => render_json(mode, &result)?,
    };

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write!(handle, "{content}")?;

    if !result.errors.is_empty() {
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        writeln!(handle)?;
        writeln!(handle, "Errors ({}):", result.errors.len())?;
        for (path, error) in &result.errors {
            writeln!(handle, "  {path} - {error}")?;
        }
    }

    info!(elapsed = ?started.elapsed(), "Finished");
    Ok(())
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Label used for a mode in summaries.
const fn mode_label(mode: RewriteMode) -> &'static str {
    match mode {
        RewriteMode::Apply => "run",
        RewriteMode::Check => "check",
    }
}

/// Renders the human-readable summary.
fn render_text(mode: RewriteMode, result: &RunResult) -> String {
    let title = match mode {
        RewriteMode::Apply => "Rewrite Summary",
        RewriteMode::Check => "Check Summary (dry run)",
    };
    let stats = &result.stats;

    let mut output = String::new();
    let _ = writeln!(output, "{title}");
    let _ = writeln!(output, "{}", "=".repeat(title.len()));
    let _ = writeln!(output);
    push_row(&mut output, "Documents scanned:", stats.total);
    push_row(&mut output, "  Changed:", stats.rewritten);
    push_row(&mut output, "  Unchanged:", stats.unchanged);
    push_row(&mut output, "  Failed:", stats.failed);
    push_row(&mut output, "Lines changed:", stats.lines_changed);

    if matches!(mode, RewriteMode::Check) && !result.changed.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Would change ({}):", result.changed.len());
        for (path, lines) in &result.changed {
            let unit = if *lines == 1 { "line" } else { "lines" };
            let _ = writeln!(output, "  {path} ({lines} {unit})");
        }
    }

    output
}

fn push_row(output: &mut String, label: &str, value: u64) {
    let _ = writeln!(output, "{label:<20}{value}");
}

/// Renders the JSON report.
fn render_json(mode: RewriteMode, result: &RunResult) -> color_eyre::Result<String> {
    #[derive(Serialize)]
    struct Changed<'a> {
        path: &'a Utf8Path,
        lines: u64,
    }

    #[derive(Serialize)]
    struct Failed<'a> {
        path: &'a Utf8Path,
        error: String,
    }

    #[derive(Serialize)]
    struct Report<'a> {
        mode: &'static str,
        stats: &'a StatsSnapshot,
        changed: Vec<Changed<'a>>,
        errors: Vec<Failed<'a>>,
    }

    let report = Report {
        mode: mode_label(mode),
        stats: &result.stats,
        changed: result
            .changed
            .iter()
            .map(|(path, lines)| Changed {
                path,
                lines: *lines,
            })
            .collect(),
        errors: result
            .errors
            .iter()
            .map(|(path, error)| Failed {
                path,
                error: error.to_string(),
            })
            .collect(),
    };

    let mut json = serde_json::to_string_pretty(&report)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))?;
    json.push('\n');
    Ok(json)
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Load configuration and run
    let config = build_config(&cli)?;
    run(config, cli.command.mode(), cli.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use refix_engine::ScanError;
    use std::io;

    fn sample() -> RunResult {
        RunResult {
            stats: StatsSnapshot {
                total: 3,
                rewritten: 1,
                unchanged: 1,
                failed: 1,
                lines_changed: 2,
            },
            changed: vec![(Utf8PathBuf::from("Assets/Player.prefab"), 2)],
            errors: vec![(
                Utf8PathBuf::from("Assets/Broken.prefab"),
                ScanError::read(
                    "Scripts/Gone.cs",
                    io::Error::new(io::ErrorKind::NotFound, "not found"),
                ),
            )],
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["refix", "check"]).expect("parse");
        assert!(matches!(cli.command, Commands::Check));
        assert_eq!(cli.command.mode(), RewriteMode::Check);
        assert!(cli.prefabs_path.is_none());
        assert!(cli.jobs.is_none());
        assert!(matches!(cli.format, OutputFormat::Text));
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "refix",
            "run",
            "--config",
            "rules.json",
            "-j",
            "4",
            "--prefabs-path",
            "Assets",
            "--format",
            "json",
        ])
        .expect("parse");
        assert_eq!(cli.command.mode(), RewriteMode::Apply);
        assert_eq!(cli.config.as_str(), "rules.json");
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.prefabs_path.as_ref().map(|p| p.as_str()), Some("Assets"));
        assert!(matches!(cli.format, OutputFormat::Json));
    }

    #[test]
    fn test_render_text_run() {
        insta::assert_snapshot!(render_text(RewriteMode::Apply, &sample()), @r"
        Rewrite Summary
        ===============

        Documents scanned:  3
          Changed:          1
          Unchanged:        1
          Failed:           1
        Lines changed:      2
        ");
    }

    #[test]
    fn test_render_text_check_lists_documents() {
        insta::assert_snapshot!(render_text(RewriteMode::Check, &sample()), @r"
        Check Summary (dry run)
        =======================

        Documents scanned:  3
          Changed:          1
          Unchanged:        1
          Failed:           1
        Lines changed:      2

        Would change (1):
          Assets/Player.prefab (2 lines)
        ");
    }

    #[test]
    fn test_render_json() {
        let json = render_json(RewriteMode::Check, &sample()).expect("render");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");

        assert_eq!(value["mode"], "check");
        assert_eq!(value["stats"]["total"], 3);
        assert_eq!(value["stats"]["lines_changed"], 2);
        assert_eq!(value["changed"][0]["path"], "Assets/Player.prefab");
        assert_eq!(value["changed"][0]["lines"], 2);
        assert_eq!(value["errors"][0]["path"], "Assets/Broken.prefab");
        assert_eq!(
            value["errors"][0]["error"],
            "failed to read file Scripts/Gone.cs: not found"
        );
    }

    #[test]
    fn test_build_config_missing_file() {
        let cli = Cli::try_parse_from(["refix", "run", "-c", "/nonexistent/appsettings.json"])
            .expect("parse");
        let err = build_config(&cli).expect_err("missing file");
        assert!(err.to_string().contains("/nonexistent/appsettings.json"));
    }
}
