//! The parse tree: a flat arena of [`Node`]s addressed by [`NodeId`], rather
//! than an owned tree of boxed nodes. Restructured from the whitespace-
//! preserving CST this crate is grounded on into the index-addressed shape
//! described in `/DESIGN.md` — cheap to share across the binder and type
//! evaluator without lifetime gymnastics, and cheap to re-parent during
//! error recovery.

use pyrite_core::Span;

use crate::token::{NumberLiteral, Operator, StringLiteral};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Every production the parser can emit (spec §3 "Parse node"). Statement and
/// expression kinds are kept in one flat enum — the arena does not need a
/// sum-of-two-trees split, and a single `NodeKind` makes `Visitor` dispatch a
/// single match.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Module {
        body: Vec<NodeId>,
    },

    // --- Statements ---
    ClassDef {
        name: NodeId,
        bases: Vec<NodeId>,
        keywords: Vec<NodeId>,
        type_params: Vec<NodeId>,
        decorators: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    FunctionDef {
        name: NodeId,
        is_async: bool,
        params: Vec<NodeId>,
        return_annotation: NodeId,
        type_params: Vec<NodeId>,
        decorators: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Lambda {
        params: Vec<NodeId>,
        body: NodeId,
    },
    Parameter {
        name: NodeId,
        annotation: NodeId,
        default: NodeId,
        kind: ParamKind,
    },
    Decorator {
        expr: NodeId,
    },
    Assignment {
        targets: Vec<NodeId>,
        value: NodeId,
        annotation: NodeId,
    },
    AugAssign {
        target: NodeId,
        op: Operator,
        value: NodeId,
    },
    If {
        test: NodeId,
        body: Vec<NodeId>,
        or_else: Vec<NodeId>,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
        or_else: Vec<NodeId>,
    },
    For {
        is_async: bool,
        target: NodeId,
        iter: NodeId,
        body: Vec<NodeId>,
        or_else: Vec<NodeId>,
    },
    Try {
        body: Vec<NodeId>,
        handlers: Vec<NodeId>,
        or_else: Vec<NodeId>,
        finally_body: Vec<NodeId>,
        is_star: bool,
    },
    ExceptHandler {
        exc_type: NodeId,
        name: NodeId,
        body: Vec<NodeId>,
    },
    With {
        is_async: bool,
        items: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    WithItem {
        context_expr: NodeId,
        optional_vars: NodeId,
    },
    Return {
        value: NodeId,
    },
    Raise {
        exc: NodeId,
        cause: NodeId,
    },
    Yield {
        value: NodeId,
        is_from: bool,
    },
    Global {
        names: Vec<NodeId>,
    },
    Nonlocal {
        names: Vec<NodeId>,
    },
    Import {
        names: Vec<NodeId>,
    },
    ImportAlias {
        /// Dotted module path, stored as dot-joined text on the leaf.
        path: NodeId,
        asname: NodeId,
    },
    ImportFrom {
        module: NodeId,
        names: Vec<NodeId>,
        level: u32,
        is_star: bool,
    },
    Pass,
    Break,
    Continue,
    Delete {
        targets: Vec<NodeId>,
    },
    Assert {
        test: NodeId,
        msg: NodeId,
    },
    ExprStatement {
        expr: NodeId,
    },
    Match {
        subject: NodeId,
        cases: Vec<NodeId>,
    },
    MatchCase {
        pattern: NodeId,
        guard: NodeId,
        body: Vec<NodeId>,
    },
    TypeAliasStatement {
        name: NodeId,
        type_params: Vec<NodeId>,
        value: NodeId,
    },
    TypeParam {
        name: NodeId,
        bound: NodeId,
    },

    // --- Expressions ---
    Name {
        text: String,
    },
    Number(NumberLiteral),
    StringList {
        parts: Vec<NodeId>,
    },
    StringLeaf(StringLiteral),
    FString {
        parts: Vec<NodeId>,
    },
    FStringExpr {
        expr: NodeId,
        conversion: Option<char>,
        format_spec: Option<String>,
    },
    Ellipsis,
    NoneLit,
    BoolLit(bool),
    Tuple {
        elements: Vec<NodeId>,
    },
    List {
        elements: Vec<NodeId>,
    },
    Set {
        elements: Vec<NodeId>,
    },
    Dict {
        keys: Vec<NodeId>,
        values: Vec<NodeId>,
    },
    Starred {
        value: NodeId,
    },
    DictUnpack {
        value: NodeId,
    },
    Comprehension {
        kind: ComprehensionKind,
        element: NodeId,
        key: NodeId,
        clauses: Vec<NodeId>,
    },
    ComprehensionFor {
        is_async: bool,
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
    },
    Call {
        func: NodeId,
        args: Vec<NodeId>,
    },
    Argument {
        name: NodeId,
        value: NodeId,
        is_star: bool,
        is_double_star: bool,
    },
    Attribute {
        value: NodeId,
        attr: NodeId,
    },
    Subscript {
        value: NodeId,
        index: NodeId,
    },
    Slice {
        lower: NodeId,
        upper: NodeId,
        step: NodeId,
    },
    UnaryOp {
        op: Operator,
        operand: NodeId,
    },
    BinaryOp {
        left: NodeId,
        op: Operator,
        right: NodeId,
    },
    BoolOp {
        is_and: bool,
        values: Vec<NodeId>,
    },
    Compare {
        left: NodeId,
        ops: Vec<Operator>,
        comparators: Vec<NodeId>,
    },
    Ternary {
        test: NodeId,
        body: NodeId,
        or_else: NodeId,
    },
    NamedExpr {
        target: NodeId,
        value: NodeId,
    },
    Await {
        value: NodeId,
    },

    // --- Patterns (match statement) ---
    PatternCapture {
        name: NodeId,
    },
    PatternWildcard,
    PatternValue {
        value: NodeId,
    },
    PatternClass {
        cls: NodeId,
        positional: Vec<NodeId>,
        keyword_names: Vec<NodeId>,
        keyword_patterns: Vec<NodeId>,
    },
    PatternSequence {
        elements: Vec<NodeId>,
    },
    PatternMapping {
        keys: Vec<NodeId>,
        patterns: Vec<NodeId>,
        rest: NodeId,
    },
    PatternOr {
        alternatives: Vec<NodeId>,
    },
    PatternAs {
        pattern: NodeId,
        name: NodeId,
    },

    /// A placeholder left where parsing could not recover a valid
    /// production; the parser always returns a complete tree (spec §4.2).
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Positional,
    PositionalOnlyMarker,
    KeywordOnlyMarker,
    VarArgs,
    KwArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub parent: NodeId,
}

/// The owning arena for one parsed module. Indices are stable for the
/// lifetime of the arena: the parser never removes nodes, only appends and
/// (in the second pass) rewrites `parent` links.
#[derive(Debug, Default, Clone)]
pub struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena { nodes: Vec::new() }
    }

    pub fn push(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span, parent: NodeId::NONE });
        id
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: NodeId) -> NodeId {
        self.get(id).parent
    }

    pub fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.get_mut(id).parent = parent;
    }

    /// Direct children of `id`, in source order. Used by the second
    /// parent-fixing pass and by the binder's tree walk.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        children_of(&self.get(id).kind)
    }

    /// Walks the whole arena fixing `parent` links from each node's declared
    /// children (spec §4.2: "a second traversal fixes parent links"). The
    /// single-pass recursive-descent parser builds children bottom-up, before
    /// the parent id is known, so this runs once after the full tree exists.
    pub fn fix_parent_links(&mut self, root: NodeId) {
        let kids = self.children(root);
        for child in kids {
            self.set_parent(child, root);
            self.fix_parent_links(child);
        }
    }
}

fn children_of(kind: &NodeKind) -> Vec<NodeId> {
    use NodeKind::*;
    let mut out = Vec::new();
    macro_rules! one {
        ($n:expr) => {
            if !$n.is_none() {
                out.push($n);
            }
        };
    }
    macro_rules! many {
        ($n:expr) => {
            out.extend($n.iter().copied())
        };
    }
    match kind {
        Module { body } => many!(body),
        ClassDef { name, bases, keywords, type_params, decorators, body } => {
            one!(*name);
            many!(bases);
            many!(keywords);
            many!(type_params);
            many!(decorators);
            many!(body);
        }
        FunctionDef { name, params, return_annotation, type_params, decorators, body, .. } => {
            one!(*name);
            many!(params);
            one!(*return_annotation);
            many!(type_params);
            many!(decorators);
            many!(body);
        }
        Lambda { params, body } => {
            many!(params);
            one!(*body);
        }
        Parameter { name, annotation, default, .. } => {
            one!(*name);
            one!(*annotation);
            one!(*default);
        }
        Decorator { expr } => one!(*expr),
        Assignment { targets, value, annotation } => {
            many!(targets);
            one!(*value);
            one!(*annotation);
        }
        AugAssign { target, value, .. } => {
            one!(*target);
            one!(*value);
        }
        If { test, body, or_else } => {
            one!(*test);
            many!(body);
            many!(or_else);
        }
        While { test, body, or_else } => {
            one!(*test);
            many!(body);
            many!(or_else);
        }
        For { target, iter, body, or_else, .. } => {
            one!(*target);
            one!(*iter);
            many!(body);
            many!(or_else);
        }
        Try { body, handlers, or_else, finally_body, .. } => {
            many!(body);
            many!(handlers);
            many!(or_else);
            many!(finally_body);
        }
        ExceptHandler { exc_type, name, body } => {
            one!(*exc_type);
            one!(*name);
            many!(body);
        }
        With { items, body, .. } => {
            many!(items);
            many!(body);
        }
        WithItem { context_expr, optional_vars } => {
            one!(*context_expr);
            one!(*optional_vars);
        }
        Return { value } => one!(*value),
        Raise { exc, cause } => {
            one!(*exc);
            one!(*cause);
        }
        Yield { value, .. } => one!(*value),
        Global { names } => many!(names),
        Nonlocal { names } => many!(names),
        Import { names } => many!(names),
        ImportAlias { path, asname } => {
            one!(*path);
            one!(*asname);
        }
        ImportFrom { module, names, .. } => {
            one!(*module);
            many!(names);
        }
        Pass | Break | Continue => {}
        Delete { targets } => many!(targets),
        Assert { test, msg } => {
            one!(*test);
            one!(*msg);
        }
        ExprStatement { expr } => one!(*expr),
        Match { subject, cases } => {
            one!(*subject);
            many!(cases);
        }
        MatchCase { pattern, guard, body } => {
            one!(*pattern);
            one!(*guard);
            many!(body);
        }
        TypeAliasStatement { name, type_params, value } => {
            one!(*name);
            many!(type_params);
            one!(*value);
        }
        TypeParam { name, bound } => {
            one!(*name);
            one!(*bound);
        }
        Name { .. } | Number(_) | StringLeaf(_) | Ellipsis | NoneLit | BoolLit(_)
        | PatternWildcard | Error { .. } => {}
        StringList { parts } => many!(parts),
        FString { parts } => many!(parts),
        FStringExpr { expr, .. } => one!(*expr),
        Tuple { elements } | List { elements } | Set { elements } => many!(elements),
        Dict { keys, values } => {
            many!(keys);
            many!(values);
        }
        Starred { value } => one!(*value),
        DictUnpack { value } => one!(*value),
        Comprehension { element, key, clauses, .. } => {
            one!(*element);
            one!(*key);
            many!(clauses);
        }
        ComprehensionFor { target, iter, ifs, .. } => {
            one!(*target);
            one!(*iter);
            many!(ifs);
        }
        Call { func, args } => {
            one!(*func);
            many!(args);
        }
        Argument { name, value, .. } => {
            one!(*name);
            one!(*value);
        }
        Attribute { value, attr } => {
            one!(*value);
            one!(*attr);
        }
        Subscript { value, index } => {
            one!(*value);
            one!(*index);
        }
        Slice { lower, upper, step } => {
            one!(*lower);
            one!(*upper);
            one!(*step);
        }
        UnaryOp { operand, .. } => one!(*operand),
        BinaryOp { left, right, .. } => {
            one!(*left);
            one!(*right);
        }
        BoolOp { values, .. } => many!(values),
        Compare { left, comparators, .. } => {
            one!(*left);
            many!(comparators);
        }
        Ternary { test, body, or_else } => {
            one!(*test);
            one!(*body);
            one!(*or_else);
        }
        NamedExpr { target, value } => {
            one!(*target);
            one!(*value);
        }
        Await { value } => one!(*value),
        PatternCapture { name } => one!(*name),
        PatternValue { value } => one!(*value),
        PatternClass { cls, positional, keyword_names, keyword_patterns } => {
            one!(*cls);
            many!(positional);
            many!(keyword_names);
            many!(keyword_patterns);
        }
        PatternSequence { elements } => many!(elements),
        PatternMapping { keys, patterns, rest } => {
            many!(keys);
            many!(patterns);
            one!(*rest);
        }
        PatternOr { alternatives } => many!(alternatives),
        PatternAs { pattern, name } => {
            one!(*pattern);
            one!(*name);
        }
    }
    out
}
