//! Configuration file model and loader (spec §6 "Configuration file").
//!
//! Grounded on the teacher's `workspace::SnapshotConfig` JSON-driven
//! configuration pattern, generalized from workspace-snapshot filtering to
//! the full `reportX` rule table and execution-environment list spec.md
//! requires.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostic::Severity;
use crate::error::PyriteError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PythonPlatform {
    Linux,
    Darwin,
    Windows,
    All,
}

impl Default for PythonPlatform {
    fn default() -> Self {
        PythonPlatform::All
    }
}

/// `"3.7"` .. `"3.12"`, parsed into a comparable `(major, minor)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PythonVersion {
    pub major: u8,
    pub minor: u8,
}

impl PythonVersion {
    pub const LATEST: PythonVersion = PythonVersion { major: 3, minor: 12 };

    pub fn parse(s: &str) -> Option<PythonVersion> {
        let (major, minor) = s.split_once('.')?;
        Some(PythonVersion {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }

    pub fn supports_walrus(self) -> bool {
        self >= PythonVersion { major: 3, minor: 8 }
    }

    pub fn supports_positional_only_params(self) -> bool {
        self >= PythonVersion { major: 3, minor: 8 }
    }

    pub fn supports_pep604_union(self) -> bool {
        self >= PythonVersion { major: 3, minor: 10 }
    }

    pub fn supports_match_statement(self) -> bool {
        self >= PythonVersion { major: 3, minor: 10 }
    }
}

impl Default for PythonVersion {
    fn default() -> Self {
        PythonVersion::LATEST
    }
}

/// A root directory with its own Python version, platform, and
/// import-search-path list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub root: PathBuf,
    pub python_version: Option<PythonVersion>,
    pub python_platform: Option<PythonPlatform>,
    #[serde(default)]
    pub extra_paths: Vec<PathBuf>,
}

/// The full `reportX` rule table: diagnostic rule name → severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleTable {
    #[serde(flatten)]
    rules: BTreeMap<String, String>,
}

impl RuleTable {
    pub fn severity_of(&self, rule: &str, default: Severity) -> Severity {
        self.rules
            .get(rule)
            .and_then(|s| Severity::from_rule_setting(s))
            .unwrap_or(default)
    }

    pub fn set(&mut self, rule: impl Into<String>, severity: &str) {
        self.rules.insert(rule.into(), severity.to_string());
    }

    /// Apply the basic preset: every `reportX` in `rules` not already
    /// overridden by `basic` defaults to `"warning"`. Strict preset callers
    /// should instead call [`RuleTable::apply_strict_defaults`].
    pub fn apply_basic_defaults(&mut self, defaults: &[(&str, &str)]) {
        for (rule, severity) in defaults {
            self.rules.entry((*rule).to_string()).or_insert_with(|| severity.to_string());
        }
    }

    pub fn apply_strict_defaults(&mut self, rules: &[&str]) {
        for rule in rules {
            self.rules.insert((*rule).to_string(), "error".to_string());
        }
    }
}

/// The full configuration document, deserialized from a project's JSON
/// config file (spec §6 "Configuration file").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub ignore: Vec<String>,
    pub venv_path: Option<PathBuf>,
    pub python_path: Option<PathBuf>,
    pub typeshed_path: Option<PathBuf>,
    pub typings_path: Option<PathBuf>,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub python_platform: Option<PythonPlatform>,
    #[serde(default)]
    pub execution_environments: Vec<ExecutionEnvironment>,
    #[serde(default)]
    pub strict: Vec<String>,
    #[serde(default)]
    pub use_library_code_for_types: bool,
    #[serde(flatten)]
    pub rules: RuleTable,
}

impl Options {
    /// Load and expand `${workspaceFolder}` placeholders relative to `root`.
    pub fn load(path: &Path, root: &Path) -> Result<Options, PyriteError> {
        let text = std::fs::read_to_string(path).map_err(|source| PyriteError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        let mut options: Options =
            serde_json::from_str(&text).map_err(|e| PyriteError::ConfigError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        options.expand_workspace_folder(root);
        Ok(options)
    }

    fn expand_workspace_folder(&mut self, root: &Path) {
        let expand = |p: &Path| -> PathBuf {
            let s = p.to_string_lossy();
            if s.contains("${workspaceFolder}") {
                PathBuf::from(s.replace("${workspaceFolder}", &root.to_string_lossy()))
            } else {
                p.to_path_buf()
            }
        };
        self.venv_path = self.venv_path.take().map(|p| expand(&p));
        self.python_path = self.python_path.take().map(|p| expand(&p));
        self.typeshed_path = self.typeshed_path.take().map(|p| expand(&p));
        self.typings_path = self.typings_path.take().map(|p| expand(&p));
        for env in &mut self.execution_environments {
            env.root = expand(&env.root);
            env.extra_paths = env.extra_paths.iter().map(|p| expand(p)).collect();
        }
    }

    pub fn resolved_python_version(&self) -> PythonVersion {
        self.python_version
            .as_deref()
            .and_then(PythonVersion::parse)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_version_ordering_gates_walrus() {
        assert!(!PythonVersion::parse("3.7").unwrap().supports_walrus());
        assert!(PythonVersion::parse("3.8").unwrap().supports_walrus());
    }

    #[test]
    fn pep604_union_requires_3_10() {
        assert!(!PythonVersion::parse("3.9").unwrap().supports_pep604_union());
        assert!(PythonVersion::parse("3.10").unwrap().supports_pep604_union());
    }

    #[test]
    fn rule_table_falls_back_to_default_severity() {
        let table = RuleTable::default();
        assert_eq!(table.severity_of("reportMissingImports", Severity::Error), Severity::Error);
    }

    #[test]
    fn rule_table_none_suppresses() {
        let mut table = RuleTable::default();
        table.set("reportUnusedImport", "none");
        assert_eq!(table.severity_of("reportUnusedImport", Severity::Warning), Severity::None);
    }

    #[test]
    fn workspace_folder_expansion() {
        let json = r#"{"typeshedPath": "${workspaceFolder}/typeshed"}"#;
        let mut options: Options = serde_json::from_str(json).unwrap();
        options.expand_workspace_folder(Path::new("/proj"));
        assert_eq!(options.typeshed_path, Some(PathBuf::from("/proj/typeshed")));
    }
}
