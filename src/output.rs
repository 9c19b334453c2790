//! Diagnostic rendering: human-readable text (the CLI's default) and the
//! `--outputjson` machine-readable form (spec §6 "Command line").
//!
//! Grounded on the teacher's `output.rs` pattern of one `serde`-derived
//! response struct per command plus a human-readable renderer alongside it;
//! generalized from rename-command responses to per-file diagnostic lists.

use pyrite_core::text::SourceIndex;
use pyrite_core::{Diagnostic, Severity};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FileReport {
    pub path: String,
    pub diagnostics: Vec<DiagnosticReport>,
}

#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub severity: Severity,
    pub code: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub files: Vec<FileReport>,
    pub error_count: usize,
    pub warning_count: usize,
    pub information_count: usize,
}

impl Summary {
    pub fn build(files: Vec<(String, String, Vec<Diagnostic>)>) -> Summary {
        let mut error_count = 0;
        let mut warning_count = 0;
        let mut information_count = 0;
        let mut reports = Vec::with_capacity(files.len());
        for (path, content, diagnostics) in files {
            let index = SourceIndex::new(&content);
            let mut entries = Vec::with_capacity(diagnostics.len());
            for d in diagnostics {
                match d.severity {
                    Severity::Error => error_count += 1,
                    Severity::Warning => warning_count += 1,
                    Severity::Information => information_count += 1,
                    Severity::None => {}
                }
                let (line, column) = index.offset_to_position(d.range.start);
                entries.push(DiagnosticReport {
                    severity: d.severity,
                    code: d.code,
                    line,
                    column,
                    message: d.message,
                });
            }
            reports.push(FileReport { path, diagnostics: entries });
        }
        Summary { files: reports, error_count, warning_count, information_count }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Pyright-style `path:line:col - severity: message (code)` lines, one
    /// per diagnostic, followed by a summary count.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            for d in &file.diagnostics {
                out.push_str(&format!(
                    "{}:{}:{} - {}: {} ({})\n",
                    file.path,
                    d.line,
                    d.column,
                    severity_label(d.severity),
                    d.message,
                    d.code
                ));
            }
        }
        out.push_str(&format!(
            "{} error{}, {} warning{}, {} information\n",
            self.error_count,
            plural(self.error_count),
            self.warning_count,
            plural(self.warning_count),
            self.information_count,
        ));
        out
    }
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Information => "information",
        Severity::None => "none",
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::Span;

    #[test]
    fn summary_counts_by_severity() {
        let diags = vec![
            Diagnostic::new(Severity::Error, "e", Span::new(0, 1), "bad"),
            Diagnostic::new(Severity::Warning, "w", Span::new(0, 1), "meh"),
        ];
        let summary = Summary::build(vec![("a.py".to_string(), "x\n".to_string(), diags)]);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.warning_count, 1);
        assert!(summary.has_errors());
    }

    #[test]
    fn text_output_includes_code_and_position() {
        let diags = vec![Diagnostic::new(Severity::Error, "reportX", Span::new(2, 3), "oops")];
        let summary = Summary::build(vec![("a.py".to_string(), "ab\n".to_string(), diags)]);
        let text = summary.to_text();
        assert!(text.contains("a.py:1:3"));
        assert!(text.contains("reportX"));
    }
}
