//! The `pyrite` CLI (spec §6 "Command line"): analyze a project, print
//! diagnostics, exit with the matching code.
//!
//! Grounded on the teacher's `clap`-derived `tug` binary (`src/bin/tug.rs`):
//! the same `#[derive(Parser)]` style and workspace-relative-path handling,
//! generalized from a subcommand tree (`analyze-impact`, `run`) to pyrite's
//! single-action flag set, since analyzing and reporting is pyrite's only
//! CLI verb.

use std::path::PathBuf;

use clap::Parser;
use pyrite_core::config::{Options, PythonPlatform};
use pyrite_core::workspace::{discover_python_files, FileFilter};
use pyrite_core::{ExitCode, PyriteError};

use crate::output::Summary;
use crate::program::Program;

#[derive(Parser, Debug)]
#[command(name = "pyrite")]
#[command(version, about = "A Python static type checker core", long_about = None)]
pub struct Cli {
    /// Files or directories to analyze (default: the project root).
    pub files: Vec<PathBuf>,

    /// Project root directory (default: current directory).
    #[arg(long)]
    pub project: Option<PathBuf>,

    /// Directory containing typeshed stubs, overriding the bundled copy.
    #[arg(long = "typeshed-path")]
    pub typeshed_path: Option<PathBuf>,

    /// Path to a virtual environment to resolve third-party imports against.
    #[arg(long = "venv-path")]
    pub venv_path: Option<PathBuf>,

    /// Additional import search path.
    #[arg(long = "pythonpath")]
    pub pythonpath: Option<PathBuf>,

    /// Python version to assume, e.g. `3.11`.
    #[arg(long = "pythonversion")]
    pub pythonversion: Option<String>,

    /// Platform to assume for conditional-import narrowing.
    #[arg(long = "pythonplatform", value_enum)]
    pub pythonplatform: Option<CliPlatform>,

    /// Re-analyze on every file change instead of exiting after one pass.
    #[arg(long)]
    pub watch: bool,

    /// Emit the diagnostic summary as JSON instead of text.
    #[arg(long)]
    pub outputjson: bool,

    /// Report the type-completeness score of one importable module.
    #[arg(long = "verifytypes")]
    pub verifytypes: Option<String>,

    /// Treat the project as a library (enables completeness reporting).
    #[arg(long)]
    pub lib: bool,

    /// Emit a type stub for one importable module instead of analyzing.
    #[arg(long = "createstub")]
    pub createstub: Option<String>,

    /// Run as an MCP server over stdio instead of analyzing once and exiting
    /// (spec §6's "editor-facing surface", not part of the pyright-derived
    /// flag set above — pyrite's own addition for editor/agent integration).
    #[cfg(feature = "mcp")]
    #[arg(long)]
    pub mcp: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliPlatform {
    Linux,
    Darwin,
    Windows,
    All,
}

impl From<CliPlatform> for PythonPlatform {
    fn from(value: CliPlatform) -> Self {
        match value {
            CliPlatform::Linux => PythonPlatform::Linux,
            CliPlatform::Darwin => PythonPlatform::Darwin,
            CliPlatform::Windows => PythonPlatform::Windows,
            CliPlatform::All => PythonPlatform::All,
        }
    }
}

/// Runs one analysis pass for `cli` and returns the rendered report plus the
/// exit code spec §6 assigns it. Never panics on a missing project: that is
/// a usage error (exit 2), not an internal error.
pub fn run(cli: &Cli) -> Result<(String, ExitCode), PyriteError> {
    let project_root = match &cli.project {
        Some(root) => root.clone(),
        None => std::env::current_dir().map_err(|source| PyriteError::FileRead {
            path: ".".to_string(),
            source,
        })?,
    };
    if !project_root.is_dir() {
        return Err(PyriteError::UsageError {
            message: format!("project root {} is not a directory", project_root.display()),
        });
    }

    let mut options = Options::default();
    options.venv_path = cli.venv_path.clone();
    options.python_path = cli.pythonpath.clone();
    options.typeshed_path = cli.typeshed_path.clone();
    if let Some(version) = &cli.pythonversion {
        options.python_version = Some(version.clone());
    }
    options.python_platform = cli.pythonplatform.map(Into::into);

    let targets = if cli.files.is_empty() {
        let filter = FileFilter::build(&options.include, &options.exclude, &options.ignore)?;
        let discovered: Vec<PathBuf> = discover_python_files(&project_root, &filter)
            .into_iter()
            .map(|relative| project_root.join(relative))
            .collect();
        tracing::info!("discovered {} file(s) under {}", discovered.len(), project_root.display());
        discovered
    } else {
        cli.files.clone()
    };

    let mut program = Program::new();
    program.set_options(options);
    program.set_tracked_files(&targets)?;
    let mut passes = 0;
    while program.analyze(64) {
        passes += 1;
    }
    tracing::debug!("analysis converged after {passes} work-list pass(es)");

    let mut reports = Vec::with_capacity(targets.len());
    for path in &targets {
        let content = program.get_source_file(path).unwrap_or_default().to_string();
        let diagnostics = program.get_diagnostics(path)?;
        reports.push((path.display().to_string(), content, diagnostics));
    }
    let summary = Summary::build(reports);

    let rendered = if cli.outputjson { summary.to_json() } else { summary.to_text() };
    let code = if summary.has_errors() { ExitCode::ErrorsFound } else { ExitCode::NoErrors };
    Ok((rendered, code))
}
