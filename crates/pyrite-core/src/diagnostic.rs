//! Diagnostics: severity-classified, range-tagged messages with optional fix
//! actions (spec §3 "Diagnostic sink", §6 "Diagnostic").

use serde::{Deserialize, Serialize};

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Information,
    Warning,
    Error,
}

impl Severity {
    pub fn from_rule_setting(s: &str) -> Option<Severity> {
        match s {
            "none" => Some(Severity::None),
            "information" => Some(Severity::Information),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }

    pub fn is_suppressed(self) -> bool {
        matches!(self, Severity::None)
    }
}

/// A related diagnostic location, e.g. "base class declared here".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedInfo {
    pub file: String,
    pub range: Span,
    pub message: String,
}

/// A suggested fix action. Two concrete variants are defined by spec §6;
/// both carry only the data needed to re-derive the edit, never the edit
/// text itself, so a stale cached diagnostic cannot apply a stale edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DiagnosticAction {
    CreateTypeStub { module_name: String },
    AddMissingOptional { type_node_offset: u32 },
}

/// A single diagnostic produced by the tokeniser, parser, binder, or type
/// evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable string identifying the diagnostic rule, e.g.
    /// `"reportOptionalSubscript"` or `"possiblyUnbound"`.
    pub code: String,
    pub range: Span,
    pub message: String,
    pub related: Vec<RelatedInfo>,
    pub actions: Vec<DiagnosticAction>,
}

impl Diagnostic {
    pub fn new(severity: Severity, code: impl Into<String>, range: Span, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            code: code.into(),
            range,
            message: message.into(),
            related: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_related(mut self, related: RelatedInfo) -> Self {
        self.related.push(related);
        self
    }

    pub fn with_action(mut self, action: DiagnosticAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// An append-only collector of diagnostics for a single analysis pass.
///
/// A sink never drops a diagnostic on `push`; suppression by rule severity
/// (spec §7: `"none"` suppresses a diagnostic entirely) happens at push time
/// via [`DiagnosticSink::push_with_severity`] so suppressed rules never even
/// allocate a message, but an already-`Severity::None` diagnostic built
/// elsewhere is also dropped defensively.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity.is_suppressed() {
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Push a diagnostic only if `severity` (looked up from the rule table)
    /// is not `"none"`.
    pub fn push_with_severity(
        &mut self,
        severity: Severity,
        code: impl Into<String>,
        range: Span,
        message: impl Into<String>,
    ) {
        if severity.is_suppressed() {
            return;
        }
        self.push(Diagnostic::new(severity, code, range, message));
    }

    /// Diagnostics ordered by start offset, per spec §4.6
    /// "`get_diagnostics` ... return them in order by start offset".
    pub fn sorted(&self) -> Vec<Diagnostic> {
        let mut out = self.diagnostics.clone();
        out.sort_by_key(|d| d.range.start);
        out
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn extend(&mut self, other: DiagnosticSink) {
        for d in other.diagnostics {
            self.push(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_severity_is_suppressed_on_push() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(Severity::None, "x", Span::new(0, 1), "msg"));
        assert!(sink.is_empty());
    }

    #[test]
    fn sorted_orders_by_start_offset() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(Severity::Error, "b", Span::new(10, 11), "second"));
        sink.push(Diagnostic::new(Severity::Error, "a", Span::new(0, 1), "first"));
        let sorted = sink.sorted();
        assert_eq!(sorted[0].message, "first");
        assert_eq!(sorted[1].message, "second");
    }

    #[test]
    fn has_errors_ignores_warnings() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(Severity::Warning, "w", Span::new(0, 1), "warn"));
        assert!(!sink.has_errors());
        sink.push(Diagnostic::new(Severity::Error, "e", Span::new(0, 1), "err"));
        assert!(sink.has_errors());
    }
}
