//! Workspace file discovery: glob include/exclude/ignore patterns over a
//! project root (spec §6 "Configuration file": `include`, `exclude`,
//! `ignore`).
//!
//! Grounded on the teacher's `workspace::should_exclude` default-directory
//! filtering and `files::collect_python_files_filtered` walk, generalized
//! from a fixed exclude list to user-supplied glob patterns via `globset`.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::PyriteError;

const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".venv",
    "venv",
    "env",
    "build",
    "dist",
    ".tox",
    ".nox",
    "node_modules",
];

fn is_default_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(c, std::path::Component::Normal(name) if DEFAULT_EXCLUDE_DIRS.contains(&name.to_string_lossy().as_ref()))
    })
}

/// Compiled include/exclude/ignore glob sets for one project.
pub struct FileFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl FileFilter {
    pub fn build(
        include: &[String],
        exclude: &[String],
        ignore: &[String],
    ) -> Result<FileFilter, PyriteError> {
        let include_set = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        let mut exclude_patterns = exclude.to_vec();
        exclude_patterns.extend(ignore.iter().cloned());
        let exclude_set = build_globset(&exclude_patterns)?;
        Ok(FileFilter {
            include: include_set,
            exclude: exclude_set,
        })
    }

    pub fn matches(&self, relative_path: &Path) -> bool {
        if is_default_excluded(relative_path) {
            return false;
        }
        if self.exclude.is_match(relative_path) {
            return false;
        }
        match &self.include {
            Some(set) => set.is_match(relative_path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, PyriteError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| PyriteError::ConfigError {
            path: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| PyriteError::ConfigError {
        path: "<glob set>".into(),
        message: e.to_string(),
    })
}

/// Walk `root` collecting `.py`/`.pyi` files that pass `filter`, returning
/// paths relative to `root` in deterministic (sorted) order.
pub fn discover_python_files(root: &Path, filter: &FileFilter) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_python = matches!(path.extension().and_then(|e| e.to_str()), Some("py") | Some("pyi"));
        if !is_python {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if filter.matches(relative) {
            found.push(relative.to_path_buf());
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn excludes_default_dirs() {
        assert!(is_default_excluded(Path::new("a/.venv/pkg.py")));
        assert!(!is_default_excluded(Path::new("a/src/pkg.py")));
    }

    #[test]
    fn discover_honors_include_and_exclude() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("tests")).unwrap();
        fs::write(dir.path().join("src/a.py"), "").unwrap();
        fs::write(dir.path().join("tests/test_a.py"), "").unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let filter = FileFilter::build(&["src/**".to_string()], &[], &[]).unwrap();
        let files = discover_python_files(dir.path(), &filter);
        assert_eq!(files, vec![PathBuf::from("src/a.py")]);
    }

    #[test]
    fn discover_all_python_when_no_include_patterns() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "").unwrap();
        fs::write(dir.path().join("b.pyi"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();

        let filter = FileFilter::build(&[], &[], &[]).unwrap();
        let files = discover_python_files(dir.path(), &filter);
        assert_eq!(files, vec![PathBuf::from("a.py"), PathBuf::from("b.pyi")]);
    }
}
