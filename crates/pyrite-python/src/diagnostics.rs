//! Semantic diagnostics (spec §7 item 2) computed from one file's bind
//! result: undefined names and possibly-unbound locals. Grounded on the
//! teacher's `analyzer.rs` reference-resolution walk for "which names does
//! this file use", generalized from "resolve one name for a rename" into
//! "classify every name reference's binding state" — flow-sensitive
//! definite-assignment (spec §8 scenario S6) is new, since the rename tool
//! never needed to know whether a name was *reachable* unbound, only where
//! it was declared.

use std::collections::{HashMap, HashSet};

use pyrite_core::{DiagnosticSink, Severity};
use pyrite_cst::{Arena, NodeId, NodeKind};

use crate::binder::BindResult;
use crate::flow::{FlowGraph, FlowNode, FlowNodeId};
use crate::symbol::{DeclarationKind, ScopeId, SymbolId, SymbolTable};

/// Runs the undefined-name and possibly-unbound passes over `bind` and
/// pushes their findings into `sink`. `undefined_severity` /
/// `unbound_severity` come from the project's rule table
/// (`reportUndefinedVariable`, `reportPossiblyUnbound`) so `"none"` can
/// suppress either pass without the caller special-casing it.
pub fn check_bindings(
    arena: &Arena,
    bind: &BindResult,
    builtins_scope: Option<ScopeId>,
    undefined_severity: Severity,
    unbound_severity: Severity,
    sink: &mut DiagnosticSink,
) {
    if undefined_severity.is_suppressed() && unbound_severity.is_suppressed() {
        return;
    }
    let mut checker = Checker {
        arena,
        symbols: &bind.symbols,
        flow: &bind.flow,
        flow_at: &bind.flow_at,
        builtins_scope,
        unbound_cache: HashMap::new(),
    };
    for (&stmt, &flow_id) in &bind.flow_at {
        checker.visit_statement(stmt, flow_id, undefined_severity, unbound_severity, sink);
    }
}

struct Checker<'a> {
    arena: &'a Arena,
    symbols: &'a SymbolTable,
    flow: &'a FlowGraph,
    #[allow(dead_code)]
    flow_at: &'a HashMap<NodeId, FlowNodeId>,
    builtins_scope: Option<ScopeId>,
    unbound_cache: HashMap<(FlowNodeId, SymbolId), bool>,
}

impl<'a> Checker<'a> {
    /// Walks the statement's own subtree (not into nested function/class
    /// bodies, which are recorded as their own entries in `flow_at` and
    /// visited independently) collecting `Name` reference sites.
    fn visit_statement(
        &mut self,
        stmt: NodeId,
        flow_id: FlowNodeId,
        undefined_severity: Severity,
        unbound_severity: Severity,
        sink: &mut DiagnosticSink,
    ) {
        let mut targets = HashSet::new();
        collect_targets(self.arena, stmt, &mut targets);
        let scope = self.enclosing_scope(stmt);
        let Some(scope) = scope else { return };

        self.visit_expr(stmt, &targets, scope, flow_id, undefined_severity, unbound_severity, sink);
    }

    fn visit_expr(
        &mut self,
        node: NodeId,
        targets: &HashSet<NodeId>,
        scope: ScopeId,
        flow_id: FlowNodeId,
        undefined_severity: Severity,
        unbound_severity: Severity,
        sink: &mut DiagnosticSink,
    ) {
        if node.is_none() {
            return;
        }
        let kind = self.arena.get(node).kind.clone();
        if let NodeKind::Name { text } = &kind {
            if !targets.contains(&node) {
                self.check_name(node, text, scope, flow_id, undefined_severity, unbound_severity, sink);
            }
        }
        // Every statement inside a nested block (`body`/`or_else`/`handlers`/
        // `finally_body`) is bound by its own call to `bind_statement` and so
        // owns its own `flow_at` entry, visited independently from the
        // top-level loop in `check_bindings`; recursing into those lists
        // here would double-check them against the wrong (outer) flow node.
        // Only each compound statement's own header expressions, and each
        // def's enclosing-scope-visible parts (decorators, defaults,
        // annotations, base classes), are walked here.
        let children: Vec<NodeId> = match &kind {
            NodeKind::FunctionDef { params, return_annotation, type_params, decorators, .. } => {
                let mut out = vec![*return_annotation];
                out.extend(params.iter().copied());
                out.extend(type_params.iter().copied());
                out.extend(decorators.iter().copied());
                out
            }
            NodeKind::ClassDef { bases, keywords, type_params, decorators, .. } => {
                let mut out = Vec::new();
                out.extend(bases.iter().copied());
                out.extend(keywords.iter().copied());
                out.extend(type_params.iter().copied());
                out.extend(decorators.iter().copied());
                out
            }
            NodeKind::Lambda { params, .. } => params.clone(),
            // The parameter's own name is a binding, not a reference.
            NodeKind::Parameter { annotation, default, .. } => vec![*annotation, *default],
            NodeKind::If { test, .. } | NodeKind::While { test, .. } => vec![*test],
            // `target` is a fresh binding each iteration, not a reference.
            NodeKind::For { iter, .. } => vec![*iter],
            NodeKind::Try { handlers, .. } => handlers.clone(),
            NodeKind::ExceptHandler { exc_type, .. } => vec![*exc_type],
            NodeKind::With { items, .. } => items.clone(),
            NodeKind::WithItem { context_expr, .. } => vec![*context_expr],
            NodeKind::Global { .. } | NodeKind::Nonlocal { .. } | NodeKind::Import { .. } => Vec::new(),
            NodeKind::ImportFrom { .. } => Vec::new(),
            _ => self.arena.children(node),
        };
        for child in children {
            self.visit_expr(child, targets, scope, flow_id, undefined_severity, unbound_severity, sink);
        }
    }

    fn check_name(
        &mut self,
        node: NodeId,
        text: &str,
        scope: ScopeId,
        flow_id: FlowNodeId,
        undefined_severity: Severity,
        unbound_severity: Severity,
        sink: &mut DiagnosticSink,
    ) {
        let Some(symbol_id) = self.symbols.resolve(scope, text, self.builtins_scope) else {
            if !undefined_severity.is_suppressed() {
                sink.push_with_severity(
                    undefined_severity,
                    "reportUndefinedVariable",
                    self.arena.get(node).span,
                    format!("\"{text}\" is not defined"),
                );
            }
            return;
        };
        if unbound_severity.is_suppressed() {
            return;
        }
        let symbol = self.symbols.symbol(symbol_id);
        // Only plain local bindings can be observed unbound; parameters,
        // functions, classes, and imports are bound for the symbol's entire
        // owning scope the moment it is entered.
        let locally_bound = symbol.declarations.iter().any(|d| {
            matches!(
                d.kind,
                DeclarationKind::Variable
                    | DeclarationKind::For
                    | DeclarationKind::With
                    | DeclarationKind::ExceptHandler
            )
        });
        if !locally_bound || symbol.scope != scope {
            return;
        }
        if !self.assigned_on_all_paths(flow_id, symbol_id, text) {
            sink.push_with_severity(
                unbound_severity,
                "reportPossiblyUnbound",
                self.arena.get(node).span,
                format!("\"{text}\" is possibly unbound"),
            );
        }
    }

    /// True if every path reaching `flow_id` passes through an assignment to
    /// `name` before reaching `Start` (spec §8 scenario S6).
    fn assigned_on_all_paths(&mut self, flow_id: FlowNodeId, symbol: SymbolId, name: &str) -> bool {
        if let Some(&cached) = self.unbound_cache.get(&(flow_id, symbol)) {
            return cached;
        }
        // Break cycles (loop back-edges) optimistically: a path that loops
        // back without itself assigning is covered by the non-looping
        // antecedents of the same `Label`.
        self.unbound_cache.insert((flow_id, symbol), true);
        let node = self.flow.get(flow_id).clone();
        let result = match node {
            FlowNode::Start => false,
            FlowNode::Unreachable => true,
            FlowNode::Label { antecedents } => {
                !antecedents.is_empty()
                    && antecedents.iter().all(|a| self.assigned_on_all_paths(*a, symbol, name))
            }
            FlowNode::Assignment { antecedent, target, .. } => {
                target_binds(self.arena, target, name) || self.assigned_on_all_paths(antecedent, symbol, name)
            }
            FlowNode::Branch { antecedent, .. }
            | FlowNode::WildcardImport { antecedent, .. }
            | FlowNode::FalseNeverCondition { antecedent, .. }
            | FlowNode::TrueNeverCondition { antecedent, .. }
            | FlowNode::Call { antecedent, .. }
            | FlowNode::PostContextManager { antecedent, .. }
            | FlowNode::PostFinally { antecedent, .. } => {
                self.assigned_on_all_paths(antecedent, symbol, name)
            }
        };
        self.unbound_cache.insert((flow_id, symbol), result);
        result
    }

    fn enclosing_scope(&self, node: NodeId) -> Option<ScopeId> {
        let mut best: Option<(ScopeId, usize)> = None;
        for (scope_id, scope) in self.symbols.scopes() {
            if is_ancestor_or_self(self.arena, scope.node, node) {
                let depth = depth_of(self.arena, scope.node);
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

fn target_binds(arena: &Arena, target: NodeId, name: &str) -> bool {
    match &arena.get(target).kind {
        NodeKind::Name { text } => text == name,
        NodeKind::Tuple { elements } | NodeKind::List { elements } => {
            elements.iter().any(|e| target_binds(arena, *e, name))
        }
        NodeKind::Starred { value } => target_binds(arena, *value, name),
        _ => false,
    }
}

/// Collects the `Name` nodes that are assignment *targets* within `stmt`
/// (its own targets only — nested statements record themselves separately
/// in `flow_at` and are walked independently), so [`Checker::visit_expr`]
/// doesn't flag a fresh binding's left-hand side as a reference.
fn collect_targets(arena: &Arena, stmt: NodeId, out: &mut HashSet<NodeId>) {
    match &arena.get(stmt).kind {
        NodeKind::Assignment { targets, .. } => {
            for &t in targets {
                collect_target_names(arena, t, out);
            }
        }
        NodeKind::AugAssign { target, .. } => collect_target_names(arena, *target, out),
        _ => {}
    }
}

fn collect_target_names(arena: &Arena, target: NodeId, out: &mut HashSet<NodeId>) {
    match &arena.get(target).kind {
        NodeKind::Name { .. } => {
            out.insert(target);
        }
        NodeKind::Tuple { elements } | NodeKind::List { elements } => {
            for &e in elements {
                collect_target_names(arena, e, out);
            }
        }
        NodeKind::Starred { value } => collect_target_names(arena, *value, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_module;
    use pyrite_core::Diagnostic;
    use pyrite_cst::{parse_module, ParseOptions};

    fn check(source: &str) -> Vec<Diagnostic> {
        let parsed = parse_module(source, &ParseOptions::default());
        let bind = bind_module(&parsed.arena, parsed.root);
        let mut sink = DiagnosticSink::new();
        check_bindings(&parsed.arena, &bind, None, Severity::Warning, Severity::Error, &mut sink);
        sink.sorted()
    }

    #[test]
    fn conditionally_assigned_name_is_possibly_unbound_on_return() {
        let diags = check("def g(b):\n    if b:\n        x = 1\n    return x\n");
        assert!(diags.iter().any(|d| d.code == "reportPossiblyUnbound"));
    }

    #[test]
    fn unconditionally_assigned_name_is_not_flagged() {
        let diags = check("def g():\n    x = 1\n    return x\n");
        assert!(diags.iter().all(|d| d.code != "reportPossiblyUnbound"));
    }

    #[test]
    fn assignment_on_every_branch_is_not_flagged() {
        let diags = check("def g(b):\n    if b:\n        x = 1\n    else:\n        x = 2\n    return x\n");
        assert!(diags.iter().all(|d| d.code != "reportPossiblyUnbound"));
    }
}
