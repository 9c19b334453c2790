//! Builds one file's scope tree and flow graph in a single tree walk (spec
//! §4.4). Grounded on the teacher's `analyzer.rs` scope-construction walk,
//! generalized from "build lazily at the first reference to a name" into
//! "build eagerly for the whole file", and extended with the flow graph the
//! teacher never needed (see `flow.rs`).

use pyrite_cst::{Arena, NodeId, NodeKind};

use crate::flow::{FlowGraph, FlowNode, FlowNodeId};
use crate::symbol::{Declaration, DeclarationKind, ScopeId, ScopeKind, SymbolTable};

pub struct BindResult {
    pub symbols: SymbolTable,
    pub flow: FlowGraph,
    pub module_scope: ScopeId,
    /// The flow node reached at the point each node was bound, keyed by the
    /// node whose evaluation the evaluator narrows against (e.g. a `Name`
    /// reference, or the body of an `if`).
    pub flow_at: std::collections::HashMap<NodeId, FlowNodeId>,
}

pub fn bind_module(arena: &Arena, root: NodeId) -> BindResult {
    let mut binder = Binder {
        arena,
        symbols: SymbolTable::new(),
        flow: FlowGraph::new(),
        flow_at: std::collections::HashMap::new(),
    };
    let module_scope = binder.symbols.new_scope(ScopeKind::Module, None, root);
    let start = binder.flow.start();
    let NodeKind::Module { body } = &arena.get(root).kind else {
        panic!("bind_module called on a non-Module root");
    };
    let body = body.clone();
    binder.bind_block(module_scope, &body, start);
    BindResult {
        symbols: binder.symbols,
        flow: binder.flow,
        module_scope,
        flow_at: binder.flow_at,
    }
}

struct Binder<'a> {
    arena: &'a Arena,
    symbols: SymbolTable,
    flow: FlowGraph,
    flow_at: std::collections::HashMap<NodeId, FlowNodeId>,
}

impl<'a> Binder<'a> {
    fn name_text(&self, id: NodeId) -> Option<String> {
        if id.is_none() {
            return None;
        }
        match &self.arena.get(id).kind {
            NodeKind::Name { text } => Some(text.clone()),
            _ => None,
        }
    }

    fn declare(&mut self, scope: ScopeId, name_node: NodeId, kind: DeclarationKind) {
        let Some(name) = self.name_text(name_node) else { return };
        let span = self.arena.get(name_node).span;
        self.symbols.declare(scope, &name, Declaration { kind, node: name_node, span });
    }

    /// Declares every `Name` leaf reachable under `target` — covers bare
    /// names, tuple/list unpacking, and starred targets in one pass.
    fn declare_target(&mut self, scope: ScopeId, target: NodeId, kind: DeclarationKind) {
        if target.is_none() {
            return;
        }
        match self.arena.get(target).kind.clone() {
            NodeKind::Name { .. } => self.declare(scope, target, kind),
            NodeKind::Tuple { elements } | NodeKind::List { elements } => {
                for el in elements {
                    self.declare_target(scope, el, kind);
                }
            }
            NodeKind::Starred { value } => self.declare_target(scope, value, kind),
            // Attribute/subscript targets (`self.x = ...`, `d[k] = ...`) bind
            // nothing new into scope.
            _ => {}
        }
    }

    fn bind_block(&mut self, scope: ScopeId, stmts: &[NodeId], mut flow: FlowNodeId) -> FlowNodeId {
        for &stmt in stmts {
            flow = self.bind_statement(scope, stmt, flow);
        }
        flow
    }

    fn bind_statement(&mut self, scope: ScopeId, id: NodeId, flow: FlowNodeId) -> FlowNodeId {
        self.flow_at.insert(id, flow);
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::FunctionDef { name, params, body, decorators, type_params, .. } => {
                self.declare(scope, name, DeclarationKind::Function);
                let func_scope = self.symbols.new_scope(ScopeKind::Function, Some(scope), id);
                for tp in &type_params {
                    if let NodeKind::TypeParam { name, .. } = self.arena.get(*tp).kind.clone() {
                        self.declare(func_scope, name, DeclarationKind::TypeParameter);
                    }
                }
                for param in &params {
                    if let NodeKind::Parameter { name, .. } = self.arena.get(*param).kind.clone() {
                        self.declare(func_scope, name, DeclarationKind::Parameter);
                    }
                }
                for dec in &decorators {
                    self.bind_expr(scope, *dec);
                }
                let body_start = self.flow.start();
                self.bind_block(func_scope, &body, body_start);
                flow
            }
            NodeKind::Lambda { params, body } => {
                let lam_scope = self.symbols.new_scope(ScopeKind::Lambda, Some(scope), id);
                for param in &params {
                    if let NodeKind::Parameter { name, .. } = self.arena.get(*param).kind.clone() {
                        self.declare(lam_scope, name, DeclarationKind::Parameter);
                    }
                }
                self.bind_expr(lam_scope, body);
                flow
            }
            NodeKind::ClassDef { name, bases, keywords, body, decorators, type_params } => {
                self.declare(scope, name, DeclarationKind::Class);
                for b in &bases {
                    self.bind_expr(scope, *b);
                }
                for kw in &keywords {
                    self.bind_expr(scope, *kw);
                }
                for dec in &decorators {
                    self.bind_expr(scope, *dec);
                }
                let class_scope = self.symbols.new_scope(ScopeKind::Class, Some(scope), id);
                for tp in &type_params {
                    if let NodeKind::TypeParam { name, .. } = self.arena.get(*tp).kind.clone() {
                        self.declare(class_scope, name, DeclarationKind::TypeParameter);
                    }
                }
                let body_start = self.flow.start();
                self.bind_block(class_scope, &body, body_start);
                flow
            }
            NodeKind::Assignment { targets, value, annotation } => {
                self.bind_expr(scope, value);
                self.bind_expr(scope, annotation);
                for t in &targets {
                    self.declare_target(scope, *t, DeclarationKind::Variable);
                    self.bind_expr(scope, *t);
                }
                self.flow.push(FlowNode::Assignment { antecedent: flow, target: targets.first().copied().unwrap_or(NodeId::NONE), value })
            }
            NodeKind::AugAssign { target, value, .. } => {
                self.bind_expr(scope, value);
                self.declare_target(scope, target, DeclarationKind::Variable);
                self.bind_expr(scope, target);
                self.flow.push(FlowNode::Assignment { antecedent: flow, target, value })
            }
            NodeKind::If { test, body, or_else } => {
                self.bind_expr(scope, test);
                let true_branch = self.flow.push(FlowNode::Branch { antecedent: flow, test, is_positive: true });
                let false_branch = self.flow.push(FlowNode::Branch { antecedent: flow, test, is_positive: false });
                let after_true = self.bind_block(scope, &body, true_branch);
                let after_false = self.bind_block(scope, &or_else, false_branch);
                self.flow.push(FlowNode::Label { antecedents: vec![after_true, after_false] })
            }
            NodeKind::While { test, body, or_else } => {
                self.bind_expr(scope, test);
                let enter = self.flow.push(FlowNode::Branch { antecedent: flow, test, is_positive: true });
                let after_body = self.bind_block(scope, &body, enter);
                let loop_join = self.flow.push(FlowNode::Label { antecedents: vec![flow, after_body] });
                let exit = self.flow.push(FlowNode::Branch { antecedent: loop_join, test, is_positive: false });
                let after_else = self.bind_block(scope, &or_else, exit);
                after_else
            }
            NodeKind::For { target, iter, body, or_else, .. } => {
                self.bind_expr(scope, iter);
                self.declare_target(scope, target, DeclarationKind::For);
                self.bind_expr(scope, target);
                let enter = self.flow.push(FlowNode::Assignment { antecedent: flow, target, value: iter });
                let after_body = self.bind_block(scope, &body, enter);
                let loop_join = self.flow.push(FlowNode::Label { antecedents: vec![enter, after_body] });
                self.bind_block(scope, &or_else, loop_join)
            }
            NodeKind::Try { body, handlers, or_else, finally_body, .. } => {
                let after_body = self.bind_block(scope, &body, flow);
                let mut handler_ends = Vec::new();
                for h in &handlers {
                    if let NodeKind::ExceptHandler { exc_type, name, body } = self.arena.get(*h).kind.clone() {
                        self.bind_expr(scope, exc_type);
                        if !name.is_none() {
                            self.declare(scope, name, DeclarationKind::ExceptHandler);
                        }
                        handler_ends.push(self.bind_block(scope, &body, flow));
                    }
                }
                let after_else = self.bind_block(scope, &or_else, after_body);
                let mut joined = vec![after_else];
                joined.extend(handler_ends);
                let join = self.flow.push(FlowNode::Label { antecedents: joined });
                let try_node = id;
                let after_finally = self.bind_block(scope, &finally_body, join);
                self.flow.push(FlowNode::PostFinally { antecedent: after_finally, try_stmt: try_node })
            }
            NodeKind::With { items, body, .. } => {
                let mut cur = flow;
                for item in &items {
                    if let NodeKind::WithItem { context_expr, optional_vars } = self.arena.get(*item).kind.clone() {
                        self.bind_expr(scope, context_expr);
                        if !optional_vars.is_none() {
                            self.declare_target(scope, optional_vars, DeclarationKind::With);
                            self.bind_expr(scope, optional_vars);
                        }
                        cur = self.flow.push(FlowNode::PostContextManager { antecedent: cur, with_item: *item });
                    }
                }
                self.bind_block(scope, &body, cur)
            }
            NodeKind::ImportAlias { .. } => flow,
            NodeKind::Import { names } => {
                for n in &names {
                    if let NodeKind::ImportAlias { path, asname } = self.arena.get(*n).kind.clone() {
                        let bound = if asname.is_none() { path } else { asname };
                        self.declare(scope, bound, DeclarationKind::Import);
                    }
                }
                self.flow.push(FlowNode::Assignment { antecedent: flow, target: NodeId::NONE, value: id })
            }
            NodeKind::ImportFrom { names, is_star, .. } => {
                if is_star {
                    return self.flow.push(FlowNode::WildcardImport { antecedent: flow, import: id });
                }
                for n in &names {
                    if let NodeKind::ImportAlias { path, asname } = self.arena.get(*n).kind.clone() {
                        let bound = if asname.is_none() { path } else { asname };
                        self.declare(scope, bound, DeclarationKind::ImportFrom);
                    }
                }
                self.flow.push(FlowNode::Assignment { antecedent: flow, target: NodeId::NONE, value: id })
            }
            NodeKind::TypeAliasStatement { name, value, .. } => {
                self.declare(scope, name, DeclarationKind::TypeAlias);
                self.bind_expr(scope, value);
                flow
            }
            NodeKind::Global { names } => {
                for n in &names {
                    if let Some(text) = self.name_text(*n) {
                        self.symbols.scope_mut(scope).globals.push(text);
                    }
                }
                flow
            }
            NodeKind::Nonlocal { names } => {
                for n in &names {
                    if let Some(text) = self.name_text(*n) {
                        self.symbols.scope_mut(scope).nonlocals.push(text);
                    }
                }
                flow
            }
            NodeKind::Return { value } | NodeKind::ExprStatement { expr: value } => {
                self.bind_expr(scope, value);
                flow
            }
            NodeKind::Raise { exc, cause } => {
                self.bind_expr(scope, exc);
                self.bind_expr(scope, cause);
                self.flow.push(FlowNode::Unreachable)
            }
            NodeKind::Delete { targets } => {
                for t in &targets {
                    self.bind_expr(scope, *t);
                }
                flow
            }
            NodeKind::Assert { test, msg } => {
                self.bind_expr(scope, test);
                self.bind_expr(scope, msg);
                self.flow.push(FlowNode::Branch { antecedent: flow, test, is_positive: true })
            }
            NodeKind::Match { subject, cases } => {
                self.bind_expr(scope, subject);
                let mut ends = Vec::new();
                for c in &cases {
                    if let NodeKind::MatchCase { guard, body, .. } = self.arena.get(*c).kind.clone() {
                        self.bind_expr(scope, guard);
                        ends.push(self.bind_block(scope, &body, flow));
                    }
                }
                ends.push(flow);
                self.flow.push(FlowNode::Label { antecedents: ends })
            }
            NodeKind::Pass | NodeKind::Break | NodeKind::Continue => flow,
            _ => flow,
        }
    }

    /// Binds the expressions nested under `id` purely for reference
    /// resolution (walrus assignments, comprehension scopes) — it does not
    /// advance the flow graph, since expression evaluation order within a
    /// statement rarely affects narrowing at the statement boundary.
    fn bind_expr(&mut self, scope: ScopeId, id: NodeId) {
        if id.is_none() {
            return;
        }
        let kind = self.arena.get(id).kind.clone();
        match kind {
            NodeKind::NamedExpr { target, value } => {
                self.bind_expr(scope, value);
                self.declare_target(scope, target, DeclarationKind::Variable);
            }
            NodeKind::Comprehension { element, key, clauses, .. } => {
                let comp_scope = self.symbols.new_scope(ScopeKind::Comprehension, Some(scope), id);
                for clause in &clauses {
                    if let NodeKind::ComprehensionFor { target, iter, ifs, .. } = self.arena.get(*clause).kind.clone() {
                        self.bind_expr(scope, iter);
                        self.declare_target(comp_scope, target, DeclarationKind::Variable);
                        for if_clause in ifs {
                            self.bind_expr(comp_scope, if_clause);
                        }
                    }
                }
                self.bind_expr(comp_scope, element);
                self.bind_expr(comp_scope, key);
            }
            NodeKind::Lambda { .. } => {
                self.bind_statement(scope, id, self.flow.start());
            }
            _ => {
                for child in self.arena.children(id) {
                    self.bind_expr(scope, child);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_cst::{parse_module, ParseOptions};

    #[test]
    fn binds_module_level_assignment() {
        let r = parse_module("x = 1\n", &ParseOptions::default());
        let bound = bind_module(&r.arena, r.root);
        let sym = bound.symbols.resolve(bound.module_scope, "x", None);
        assert!(sym.is_some());
    }

    #[test]
    fn function_parameters_shadow_module_scope() {
        let r = parse_module("x = 1\ndef f(x):\n    return x\n", &ParseOptions::default());
        let bound = bind_module(&r.arena, r.root);
        let NodeKind::Module { body } = &r.arena.get(r.root).kind else { panic!() };
        let func_id = body[1];
        let func_scope = bound
            .symbols
            .scopes()
            .find(|(_, s)| s.node == func_id)
            .map(|(id, _)| id)
            .unwrap();
        let sym = bound.symbols.resolve(func_scope, "x", None).unwrap();
        assert_eq!(bound.symbols.symbol(sym).declarations[0].kind, DeclarationKind::Parameter);
    }

    #[test]
    fn import_binds_the_asname() {
        let r = parse_module("import numpy as np\n", &ParseOptions::default());
        let bound = bind_module(&r.arena, r.root);
        assert!(bound.symbols.resolve(bound.module_scope, "np", None).is_some());
        assert!(bound.symbols.resolve(bound.module_scope, "numpy", None).is_none());
    }
}
