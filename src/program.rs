//! The `Program` facade (spec §4.6): owns every tracked source file, orders
//! analysis work, and answers the editor-facing queries in spec §6.
//!
//! Grounded on the teacher's `WorkspaceSnapshot` (`workspace.rs`) for "own a
//! path-keyed map of file state" and `session.rs` for the long-lived,
//! `&mut`-driven analysis session shape; generalized from a snapshot of file
//! contents taken once per command into a live, incrementally re-analysed
//! set of files with a per-file dirty flag and a cooperative work queue.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pyrite_core::config::Options;
use pyrite_core::{Diagnostic, DiagnosticSink, FileId, PyriteError, Severity, Span};
use pyrite_cst::{parse_module, Arena, NodeId, NodeKind, ParseError, ParseOptions};
use pyrite_python::{bind_module, check_bindings, BindResult, BuiltinClasses, TypeEvaluator};
use pyrite_python::{DeclarationKind, ScopeId, SymbolId};

/// One declaration site returned by [`Program::get_declarations_for_name`]
/// and [`Program::resolve_alias`] (spec §6).
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarationInfo {
    pub kind: DeclarationKind,
    pub span: Span,
}

/// A function or method signature at a call site (spec §6
/// `get_signature_info`).
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureInfo {
    pub label: String,
    pub active_parameter: Option<usize>,
}

/// One file's parsed-and-bound state, kept until invalidated by an edit or a
/// watch event.
struct SourceFile {
    path: PathBuf,
    content: String,
    /// Bumped on every `update_file`; guards the "never parsed twice for the
    /// same version" invariant (spec §4.6).
    version: u64,
    arena: Arena,
    root: NodeId,
    parse_errors: Vec<ParseError>,
    bind: BindResult,
    diagnostics: Option<DiagnosticSink>,
    dirty: bool,
}

/// Owns the program's tracked files and configuration; the sole entry point
/// the CLI and MCP front doors drive (spec §4.6).
pub struct Program {
    files: HashMap<FileId, SourceFile>,
    paths: HashMap<PathBuf, FileId>,
    tracked: Vec<FileId>,
    next_file_id: u32,
    options: Options,
    builtins: BuiltinClasses,
    cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            files: HashMap::new(),
            paths: HashMap::new(),
            tracked: Vec::new(),
            next_file_id: 0,
            options: Options::default(),
            // Left empty until a typeshed stub loader populates it; see
            // `pyrite_python::evaluator::BuiltinClasses`.
            builtins: BuiltinClasses::default(),
            cancelled: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// A handle callers can flip to request cooperative cancellation (spec
    /// §5: "a cancellation token is passed through every transitive call").
    pub fn cancellation_handle(&self) -> std::sync::Arc<std::sync::atomic::AtomicBool> {
        self.cancelled.clone()
    }

    pub fn set_options(&mut self, options: Options) {
        // Every cached type answer may depend on the Python version, the
        // platform, or the rule table — reparsing is unnecessary (the token
        // stream doesn't depend on configuration) but all diagnostics and
        // evaluator state must be recomputed.
        self.options = options;
        for file in self.files.values_mut() {
            file.diagnostics = None;
            file.dirty = true;
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The set of files analysed eagerly (spec §4.6). Files referenced only
    /// through imports are loaded lazily by the resolver and never enter
    /// this tracked set.
    pub fn set_tracked_files(&mut self, paths: &[PathBuf]) -> Result<(), PyriteError> {
        self.tracked.clear();
        for path in paths {
            let id = self.load_file(path)?;
            self.tracked.push(id);
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<FileId, PyriteError> {
        let content = std::fs::read_to_string(path).map_err(|source| PyriteError::FileRead {
            path: path.display().to_string(),
            source,
        })?;
        Ok(self.update_file(path, content))
    }

    /// Inserts or replaces `path`'s content, bumping its version and marking
    /// it dirty. A version is never reused, so a cache entry keyed on a
    /// stale `(FileId, version)` pair fails instead of answering wrong.
    pub fn update_file(&mut self, path: &Path, content: String) -> FileId {
        if let Some(&id) = self.paths.get(path) {
            let file = self.files.get_mut(&id).expect("path index out of sync");
            file.version += 1;
            file.content = content;
            file.dirty = true;
            file.diagnostics = None;
            tracing::debug!("updated {} to version {}", path.display(), file.version);
            return id;
        }
        tracing::debug!("tracking {}", path.display());
        let id = FileId::new(self.next_file_id);
        self.next_file_id += 1;
        self.paths.insert(path.to_path_buf(), id);
        self.files.insert(
            id,
            SourceFile {
                path: path.to_path_buf(),
                content,
                version: 0,
                arena: Arena::new(),
                root: NodeId::NONE,
                parse_errors: Vec::new(),
                bind: BindResult {
                    symbols: pyrite_python::SymbolTable::new(),
                    flow: pyrite_python::FlowGraph::new(),
                    module_scope: pyrite_python::ScopeId(0),
                    flow_at: HashMap::new(),
                },
                diagnostics: None,
                dirty: true,
            },
        );
        id
    }

    pub fn remove_file(&mut self, path: &Path) {
        if let Some(id) = self.paths.remove(path) {
            self.files.remove(&id);
            self.tracked.retain(|&t| t != id);
            tracing::debug!("untracked {}", path.display());
        }
    }

    pub fn get_source_file(&self, path: &Path) -> Option<&str> {
        self.paths.get(path).and_then(|id| self.files.get(id)).map(|f| f.content.as_str())
    }

    fn file_id(&self, path: &Path) -> Option<FileId> {
        self.paths.get(path).copied()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Performs one slice of work — parsing, binding, and diagnosing up to
    /// `budget` dirty files — and reports whether more remains (spec §4.6).
    /// Files are visited tracked-first, then by path, matching spec §5's
    /// ordering guarantee.
    pub fn analyze(&mut self, budget: usize) -> bool {
        let mut order: Vec<FileId> = self.tracked.clone();
        let mut rest: Vec<FileId> = self.files.keys().copied().filter(|id| !order.contains(id)).collect();
        rest.sort_by_key(|id| self.files[id].path.clone());
        order.extend(rest);

        let mut done = 0;
        for id in order {
            if done >= budget || self.is_cancelled() {
                return true;
            }
            let needs_work = match self.files.get(&id) {
                Some(f) => f.dirty || f.diagnostics.is_none(),
                None => false,
            };
            if !needs_work {
                continue;
            }
            self.analyze_one(id);
            done += 1;
        }
        self.files.values().any(|f| f.dirty || f.diagnostics.is_none())
    }

    fn analyze_one(&mut self, id: FileId) {
        let python_version = self.options.resolved_python_version();
        let undefined_severity =
            self.options.rules.severity_of("reportUndefinedVariable", Severity::Error);
        let unbound_severity =
            self.options.rules.severity_of("reportPossiblyUnbound", Severity::Warning);

        let file = self.files.get_mut(&id).expect("analyze_one called on unknown file");
        if file.dirty {
            tracing::debug!("reparsing {} (version {})", file.path.display(), file.version);
            let parsed = parse_module(&file.content, &ParseOptions { python_version });
            file.arena = parsed.arena;
            file.root = parsed.root;
            file.parse_errors = parsed.errors;
            file.bind = bind_module(&file.arena, file.root);
            file.dirty = false;
        }

        let mut sink = DiagnosticSink::new();
        for err in &file.parse_errors {
            tracing::warn!("{}: {}", file.path.display(), err);
            sink.push(Diagnostic::new(Severity::Error, "reportGeneralTypeIssues", err.span, err.to_string()));
        }
        check_bindings(
            &file.arena,
            &file.bind,
            None,
            undefined_severity,
            unbound_severity,
            &mut sink,
        );
        file.diagnostics = Some(sink);
    }

    /// Force-computes diagnostics for `path`, re-running only what is dirty
    /// (spec §4.6). Returns them ordered by start offset.
    pub fn get_diagnostics(&mut self, path: &Path) -> Result<Vec<Diagnostic>, PyriteError> {
        let id = self.file_id(path).ok_or_else(|| PyriteError::FileRead {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not tracked"),
        })?;
        if self.files[&id].dirty || self.files[&id].diagnostics.is_none() {
            self.analyze_one(id);
        }
        Ok(self.files[&id].diagnostics.as_ref().expect("just computed").sorted())
    }

    /// `get_type(path, offset)` (spec §6): the static type of the smallest
    /// expression node containing `offset`, or `None` outside any expression.
    pub fn get_type(&mut self, path: &Path, offset: u32) -> Option<String> {
        let id = self.file_id(path)?;
        if self.files[&id].dirty {
            self.analyze_one(id);
        }
        let file = self.files.get(&id)?;
        let node = smallest_node_containing(&file.arena, file.root, offset)?;
        let mut evaluator = TypeEvaluator::new(
            &file.arena,
            &file.bind.symbols,
            &file.bind.flow,
            &file.bind.flow_at,
            self.builtins,
            None,
        );
        Some(format!("{:?}", evaluator.type_of(node)))
    }

    /// `get_declarations_for_name(path, position)` (spec §6): every
    /// declaration of the symbol referenced at `offset`, or an empty vector
    /// if `offset` isn't on a name or the name has no local binding (e.g. a
    /// builtin).
    pub fn get_declarations_for_name(&mut self, path: &Path, offset: u32) -> Vec<DeclarationInfo> {
        let Some((_, symbol_id)) = self.resolve_name_at(path, offset) else {
            return Vec::new();
        };
        let id = self.file_id(path).expect("resolve_name_at found a file");
        let file = &self.files[&id];
        file.bind
            .symbols
            .symbol(symbol_id)
            .declarations
            .iter()
            .map(|d| DeclarationInfo { kind: d.kind, span: d.span })
            .collect()
    }

    /// `resolve_alias(decl)` (spec §6 / spec.md §4.5 "Alias resolution"):
    /// starting from the declaration at `offset`, follow `name = other_name`
    /// re-export chains to their origin. Limited to bindings visible in this
    /// file's own symbol table — cross-file alias chains need the file index
    /// a multi-file `Program` would own, not yet built (see DESIGN.md).
    pub fn resolve_alias(&mut self, path: &Path, offset: u32) -> Option<DeclarationInfo> {
        let (scope, symbol_id) = self.resolve_name_at(path, offset)?;
        let id = self.file_id(path)?;
        let file = &self.files[&id];
        let mut current = symbol_id;
        let mut visited = std::collections::HashSet::new();
        loop {
            if !visited.insert(current) {
                break;
            }
            let symbol = file.bind.symbols.symbol(current);
            let Some(last) = symbol.declarations.last() else { break };
            if !matches!(last.kind, DeclarationKind::Import | DeclarationKind::ImportFrom) {
                break;
            }
            let NodeKind::Name { text } = &file.arena.get(last.node).kind else { break };
            match file.bind.symbols.resolve(scope, text, None) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        file.bind
            .symbols
            .symbol(current)
            .declarations
            .last()
            .map(|d| DeclarationInfo { kind: d.kind, span: d.span })
    }

    /// `get_completion_suggestions(path, position, similarity)` (spec §6):
    /// names visible from the enclosing scope chain whose prefix matches
    /// `prefix` case-insensitively, nearest scope first, alphabetised within
    /// a scope.
    pub fn get_completion_suggestions(&mut self, path: &Path, offset: u32, prefix: &str) -> Vec<String> {
        let id = match self.file_id(path) {
            Some(id) => id,
            None => return Vec::new(),
        };
        if self.files[&id].dirty {
            self.analyze_one(id);
        }
        let file = &self.files[&id];
        let Some(node) = smallest_node_containing(&file.arena, file.root, offset) else {
            return Vec::new();
        };
        let Some(mut scope) = enclosing_scope(&file.arena, &file.bind.symbols, node) else {
            return Vec::new();
        };
        let lower_prefix = prefix.to_lowercase();
        let mut names = Vec::new();
        let mut seen = std::collections::HashSet::new();
        loop {
            let scope_data = file.bind.symbols.scope(scope);
            let mut in_scope: Vec<&String> = scope_data
                .symbols
                .keys()
                .filter(|n| n.to_lowercase().starts_with(&lower_prefix) && seen.insert((*n).clone()))
                .collect();
            in_scope.sort();
            names.extend(in_scope.into_iter().cloned());
            match scope_data.parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        names
    }

    /// `get_signature_info(path, position)` (spec §6): the signature of the
    /// function being called at `offset`, if `offset` lies inside a `Call`
    /// node's argument list.
    pub fn get_signature_info(&mut self, path: &Path, offset: u32) -> Option<SignatureInfo> {
        let id = self.file_id(path)?;
        if self.files[&id].dirty {
            self.analyze_one(id);
        }
        let file = self.files.get(&id)?;
        let mut node = smallest_node_containing(&file.arena, file.root, offset)?;
        let call = loop {
            if let NodeKind::Call { .. } = &file.arena.get(node).kind {
                break node;
            }
            let parent = file.arena.parent(node);
            if parent == node {
                return None;
            }
            node = parent;
        };
        let NodeKind::Call { func, args, .. } = &file.arena.get(call).kind else { return None };
        let active_parameter = args.iter().position(|&a| {
            let span = file.arena.get(a).span;
            offset >= span.start && offset <= span.end
        });
        let mut evaluator = TypeEvaluator::new(
            &file.arena,
            &file.bind.symbols,
            &file.bind.flow,
            &file.bind.flow_at,
            self.builtins,
            None,
        );
        let label = match evaluator.type_of(*func) {
            pyrite_python::Type::Function(f) => format_signature(&f),
            other => format!("{other:?}"),
        };
        Some(SignatureInfo { label, active_parameter })
    }

    /// `find_references(path, position, include_declaration)` (spec §6):
    /// every `Name` node in the file resolving to the same symbol as the one
    /// at `offset`, limited to this file since cross-file reference tracking
    /// needs the multi-file index a full `Program` would own.
    pub fn find_references(&mut self, path: &Path, offset: u32, include_declaration: bool) -> Vec<Span> {
        let Some((_, symbol_id)) = self.resolve_name_at(path, offset) else {
            return Vec::new();
        };
        let id = self.file_id(path).expect("resolve_name_at found a file");
        let file = &self.files[&id];
        let mut spans = Vec::new();
        collect_name_references(&file.arena, &file.bind.symbols, file.root, symbol_id, None, &mut spans);
        if include_declaration {
            for d in &file.bind.symbols.symbol(symbol_id).declarations {
                if !spans.contains(&d.span) {
                    spans.push(d.span);
                }
            }
        }
        spans.sort_by_key(|s| s.start);
        spans
    }

    /// Resolves the `Name` node at `offset` to its enclosing scope and
    /// symbol, analysing the file first if needed. Shared by the
    /// declaration/alias/reference queries above.
    fn resolve_name_at(&mut self, path: &Path, offset: u32) -> Option<(ScopeId, SymbolId)> {
        let id = self.file_id(path)?;
        if self.files[&id].dirty {
            self.analyze_one(id);
        }
        let file = self.files.get(&id)?;
        let node = smallest_node_containing(&file.arena, file.root, offset)?;
        let NodeKind::Name { text } = &file.arena.get(node).kind else { return None };
        let scope = enclosing_scope(&file.arena, &file.bind.symbols, node)?;
        let symbol_id = file.bind.symbols.resolve(scope, text, None)?;
        Some((scope, symbol_id))
    }

    pub fn tracked_paths(&self) -> impl Iterator<Item = &Path> {
        self.tracked.iter().filter_map(|id| self.files.get(id)).map(|f| f.path.as_path())
    }
}

fn smallest_node_containing(arena: &Arena, node: NodeId, offset: u32) -> Option<NodeId> {
    if node.is_none() {
        return None;
    }
    let span = arena.get(node).span;
    if offset < span.start || offset >= span.end {
        return None;
    }
    for child in arena.children(node) {
        if let Some(found) = smallest_node_containing(arena, child, offset) {
            return Some(found);
        }
    }
    Some(node)
}

/// The innermost scope whose own node contains `node`, by walking up the
/// arena's parent chain and checking each ancestor against every scope's
/// recorded node. Mirrors `pyrite_python::diagnostics`'s private helper of
/// the same shape.
fn enclosing_scope(arena: &Arena, symbols: &pyrite_python::SymbolTable, node: NodeId) -> Option<ScopeId> {
    let mut best: Option<(ScopeId, usize)> = None;
    for (scope_id, scope) in symbols.scopes() {
        if is_ancestor_or_self(arena, scope.node, node) {
            let depth = depth_of(arena, scope.node);
            let replace = match best {
                Some((_, best_depth)) => depth > best_depth,
                None => true,
            };
            if replace {
                best = Some((scope_id, depth));
            }
        }
    }
    best.map(|(id, _)| id)
}

fn is_ancestor_or_self(arena: &Arena, ancestor: NodeId, node: NodeId) -> bool {
    let mut current = node;
    loop {
        if current == ancestor {
            return true;
        }
        if current.is_none() {
            return false;
        }
        let parent = arena.parent(current);
        if parent == current {
            return false;
        }
        current = parent;
    }
}

fn depth_of(arena: &Arena, node: NodeId) -> usize {
    let mut depth = 0;
    let mut current = node;
    while !current.is_none() {
        let parent = arena.parent(current);
        if parent == current {
            break;
        }
        current = parent;
        depth += 1;
    }
    depth
}

fn format_signature(f: &pyrite_python::FunctionType) -> String {
    let params: Vec<String> = f
        .params
        .iter()
        .map(|p| match p.kind {
            pyrite_python::types::ParamKind::VarArg => format!("*{}", p.name),
            pyrite_python::types::ParamKind::VarKwarg => format!("**{}", p.name),
            _ => p.name.clone(),
        })
        .collect();
    format!("{}({})", f.name, params.join(", "))
}

fn collect_name_references(
    arena: &Arena,
    symbols: &pyrite_python::SymbolTable,
    node: NodeId,
    target: SymbolId,
    builtins: Option<ScopeId>,
    out: &mut Vec<Span>,
) {
    if node.is_none() {
        return;
    }
    if let NodeKind::Name { text } = &arena.get(node).kind {
        if let Some(scope) = enclosing_scope(arena, symbols, node) {
            if symbols.resolve(scope, text, builtins) == Some(target) {
                out.push(arena.get(node).span);
            }
        }
    }
    for child in arena.children(node) {
        collect_name_references(arena, symbols, child, target, builtins, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_diagnostics_reports_possibly_unbound() {
        let mut program = Program::new();
        let path = PathBuf::from("g.py");
        program.update_file(&path, "def g(b):\n    if b:\n        x = 1\n    return x\n".to_string());
        let diags = program.get_diagnostics(&path).unwrap();
        assert!(diags.iter().any(|d| d.code == "reportPossiblyUnbound"));
    }

    #[test]
    fn analyze_is_idempotent_once_no_work_remains() {
        let mut program = Program::new();
        let path = PathBuf::from("a.py");
        program.update_file(&path, "x = 1\n".to_string());
        while program.analyze(1) {}
        let before = program.get_diagnostics(&path).unwrap();
        assert!(!program.analyze(10));
        let after = program.get_diagnostics(&path).unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[test]
    fn unknown_path_is_a_file_read_error() {
        let mut program = Program::new();
        let err = program.get_diagnostics(Path::new("missing.py")).unwrap_err();
        assert_eq!(err.exit_code(), pyrite_core::ExitCode::IoOrConfigError);
    }
}
