//! The type evaluator (spec §4.5): a memoised, lazy `type_of(node) -> Type`
//! driven by editor queries, plus the flow-narrowing pass that consumes
//! `flow::FlowGraph` and `symbol::SymbolTable` to refine a name's type at a
//! particular use site.
//!
//! Grounded on the teacher's `TypeTracker` (`tugtool-python/src/type_tracker.rs`)
//! for the memoisation shape — annotation beats inferred assignment beats
//! return-type propagation — generalized from a non-recursive tracker into a
//! recursive evaluator with a cycle sentinel, since `TypeTracker` never needs
//! to ask "what is this expression's type" while already computing that same
//! expression's type. Narrowing is grounded on `NarrowingContext` /
//! `type_of_with_narrowing` (`type_narrowing.rs`): the teacher narrows by
//! checking whether a use site's span falls inside a recorded isinstance
//! branch; here the same "does a predicate reach this site" question is
//! answered by a backward walk of the flow graph produced by `binder.rs`,
//! since a rename tool has no control-flow graph to walk.

use std::collections::HashMap;

use pyrite_cst::{Arena, NodeId, NodeKind, Operator};

use crate::flow::{FlowGraph, FlowNode, FlowNodeId};
use crate::mro::{self, MroError};
use crate::symbol::{DeclarationKind, ScopeId, SymbolId, SymbolTable};
use crate::types::{
    ClassFlagSet, ClassId, ClassType, FunctionType, LiteralValue, MemberTable, Param, ParamKind,
    Type,
};

/// The class identities of the builtin types the evaluator needs to name
/// literal and container types. Stub loading (typeshed) is not part of this
/// crate; the Program facade registers these once it has loaded
/// `builtins.pyi` and hands them in, so the evaluator never has to invent a
/// `ClassId` for `int`, `str`, and friends out of thin air.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinClasses {
    pub object: Option<ClassId>,
    pub bool_: Option<ClassId>,
    pub int: Option<ClassId>,
    pub float: Option<ClassId>,
    pub str_: Option<ClassId>,
    pub bytes: Option<ClassId>,
    pub list: Option<ClassId>,
    pub dict: Option<ClassId>,
    pub set: Option<ClassId>,
    pub tuple: Option<ClassId>,
}

const MAX_FIXED_POINT_ITERATIONS: usize = 4;

/// One file's type evaluator. Holds the arena, symbol table and flow graph
/// the binder produced for that file, plus the evaluator's own caches.
/// `classes`/`next_class_id` let the evaluator assign `ClassId`s to the
/// `ClassDef` nodes it encounters the first time it needs one — nothing
/// upstream of the evaluator needs class identity.
pub struct TypeEvaluator<'a> {
    arena: &'a Arena,
    symbols: &'a SymbolTable,
    flow: &'a FlowGraph,
    flow_at: &'a HashMap<NodeId, FlowNodeId>,
    builtins: BuiltinClasses,
    builtins_scope: Option<ScopeId>,

    cache: HashMap<NodeId, Type>,
    in_progress: std::collections::HashSet<NodeId>,
    narrow_cache: HashMap<(FlowNodeId, SymbolId), Type>,

    class_ids: HashMap<NodeId, ClassId>,
    classes: HashMap<ClassId, ClassType>,
    bases_of: HashMap<ClassId, Vec<ClassId>>,
    next_class_id: u32,
}

impl<'a> TypeEvaluator<'a> {
    pub fn new(
        arena: &'a Arena,
        symbols: &'a SymbolTable,
        flow: &'a FlowGraph,
        flow_at: &'a HashMap<NodeId, FlowNodeId>,
        builtins: BuiltinClasses,
        builtins_scope: Option<ScopeId>,
    ) -> Self {
        TypeEvaluator {
            arena,
            symbols,
            flow,
            flow_at,
            builtins,
            builtins_scope,
            cache: HashMap::new(),
            in_progress: std::collections::HashSet::new(),
            narrow_cache: HashMap::new(),
            class_ids: HashMap::new(),
            classes: HashMap::new(),
            bases_of: HashMap::new(),
            next_class_id: 0,
        }
    }

    /// Per-file invalidation (spec §4.5 caching invariant (ii)): drop every
    /// cached answer. Class identities survive, since `ClassId` assignment
    /// must stay stable across edits that don't touch the class's own
    /// definition for cross-file references to keep working.
    pub fn invalidate(&mut self) {
        self.cache.clear();
        self.narrow_cache.clear();
        self.in_progress.clear();
    }

    // ------------------------------------------------------------------
    // Core memoised entry point
    // ------------------------------------------------------------------

    /// `type_of(node) -> Type` (spec §4.5). Recursive references during
    /// inference hit the cycle sentinel below and widen to `Unknown` if a
    /// fixed point isn't reached within `MAX_FIXED_POINT_ITERATIONS` — class
    /// bodies, generic function bodies and mutually-recursive function pairs
    /// are expected to converge well before that bound.
    pub fn type_of(&mut self, node: NodeId) -> Type {
        if let Some(cached) = self.cache.get(&node) {
            return cached.clone();
        }
        if !self.in_progress.insert(node) {
            // Re-entrant: placeholder sentinel (spec §4.5 "Fixed points").
            return Type::Unknown;
        }

        let mut previous = Type::Unknown;
        self.cache.insert(node, previous.clone());
        let mut converged = false;
        for _ in 0..MAX_FIXED_POINT_ITERATIONS {
            let next = self.compute_type(node);
            if next == previous {
                converged = true;
                previous = next;
                break;
            }
            previous = next;
            self.cache.insert(node, previous.clone());
        }
        let result = if converged { previous } else { Type::Unknown };

        self.in_progress.remove(&node);
        self.cache.insert(node, result.clone());
        result
    }

    fn compute_type(&mut self, node: NodeId) -> Type {
        let kind = self.arena.get(node).kind.clone();
        match kind {
            NodeKind::Name { text } => self.type_of_name(node, &text),
            NodeKind::Number(lit) => self.type_of_number(&lit),
            NodeKind::StringLeaf(lit) => {
                if lit.flags.bytes {
                    self.class_instance(self.builtins.bytes)
                } else {
                    self.literal_or_instance(self.builtins.str_, LiteralValue::Str(lit.value.clone()))
                }
            }
            NodeKind::StringList { parts } => {
                // Adjacent string literals concatenate to one `str`; keep the
                // first part's literalness only when there is exactly one.
                if let [single] = parts.as_slice() {
                    self.type_of(*single)
                } else {
                    self.class_instance(self.builtins.str_)
                }
            }
            NodeKind::FString { .. } => self.class_instance(self.builtins.str_),
            NodeKind::BoolLit(b) => {
                self.literal_or_instance(self.builtins.bool_, LiteralValue::Bool(b))
            }
            NodeKind::NoneLit => Type::None,
            NodeKind::Ellipsis => Type::Any,
            NodeKind::Tuple { elements } => {
                let _ = elements.iter().map(|e| self.type_of(*e)).collect::<Vec<_>>();
                self.class_instance(self.builtins.tuple)
            }
            NodeKind::List { elements } => {
                for e in &elements {
                    self.type_of(*e);
                }
                self.class_instance(self.builtins.list)
            }
            NodeKind::Set { elements } => {
                for e in &elements {
                    self.type_of(*e);
                }
                self.class_instance(self.builtins.set)
            }
            NodeKind::Dict { keys, values } => {
                for k in &keys {
                    if !k.is_none() {
                        self.type_of(*k);
                    }
                }
                for v in &values {
                    self.type_of(*v);
                }
                self.class_instance(self.builtins.dict)
            }
            NodeKind::Starred { value } | NodeKind::DictUnpack { value } => self.type_of(value),
            NodeKind::Argument { value, .. } => self.type_of(value),
            NodeKind::NamedExpr { value, .. } => self.type_of(value),
            NodeKind::Attribute { value, attr } => self.type_of_attribute(value, attr),
            NodeKind::Subscript { value, .. } => self.type_of_subscript(value),
            NodeKind::Call { func, args } => self.type_of_call(func, &args),
            NodeKind::UnaryOp { op, operand } => self.type_of_unary(op, operand),
            NodeKind::BinaryOp { left, op, right } => self.type_of_binary(left, op, right),
            NodeKind::BoolOp { values, .. } => {
                let members: Vec<Type> = values.iter().map(|v| self.type_of(*v)).collect();
                Type::union(members)
            }
            NodeKind::Compare { .. } => self.class_instance(self.builtins.bool_),
            NodeKind::Ternary { body, or_else, .. } => {
                let a = self.type_of(body);
                let b = self.type_of(or_else);
                Type::union([a, b])
            }
            NodeKind::Await { value } => self.type_of(value),
            NodeKind::Lambda { params, body } => Type::Function(Box::new(self.lambda_signature(node, &params, body))),
            NodeKind::FunctionDef { .. } => self.type_of_function_def(node),
            NodeKind::ClassDef { .. } => {
                let id = self.ensure_class(node);
                Type::Class(id)
            }
            _ => Type::Unknown,
        }
    }

    fn literal_or_instance(&mut self, base: Option<ClassId>, value: LiteralValue) -> Type {
        match base {
            Some(base) => Type::Literal { base, value },
            None => Type::Unknown,
        }
    }

    fn class_instance(&self, class: Option<ClassId>) -> Type {
        match class {
            Some(class) => Type::Object { class, type_args: Vec::new() },
            None => Type::Unknown,
        }
    }

    fn type_of_number(&mut self, lit: &pyrite_cst::token::NumberLiteral) -> Type {
        use pyrite_cst::token::NumberKind;
        match lit.kind {
            NumberKind::Int => {
                let value = lit.text.replace('_', "").parse::<i64>().unwrap_or(0);
                self.literal_or_instance(self.builtins.int, LiteralValue::Int(value))
            }
            NumberKind::Float | NumberKind::Imaginary => self.class_instance(self.builtins.float),
        }
    }

    // ------------------------------------------------------------------
    // Name resolution + flow narrowing (spec §4.5 "Flow narrowing")
    // ------------------------------------------------------------------

    fn type_of_name(&mut self, reference: NodeId, text: &str) -> Type {
        let Some(scope) = self.enclosing_scope(reference) else {
            return Type::Unknown;
        };
        let Some(symbol) = self.symbols.resolve(scope, text, self.builtins_scope) else {
            return Type::Unbound;
        };

        let Some(flow_site) = self.nearest_flow_node(reference) else {
            return self.declared_type(symbol);
        };
        self.narrow_at(flow_site, symbol, text)
    }

    fn enclosing_scope(&self, node: NodeId) -> Option<ScopeId> {
        // Scopes are keyed by the statement node that opens them (module,
        // function/lambda body, class body, comprehension). Walk ancestors
        // until one matches a known scope's node, defaulting to the module
        // scope (the innermost scope always has the smallest matching
        // ancestor since scopes nest with their opening statement).
        let mut best: Option<(ScopeId, usize)> = None;
        for (scope_id, scope) in self.symbols.scopes() {
            if self.is_ancestor_or_self(scope.node, node) {
                let depth = self.depth(scope.node);
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

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == ancestor {
                return true;
            }
            let parent = self.arena.parent(current);
            if parent.is_none() || parent == current {
                return false;
            }
            current = parent;
        }
    }

    fn depth(&self, node: NodeId) -> usize {
        let mut depth = 0;
        let mut current = node;
        while !self.arena.parent(current).is_none() {
            current = self.arena.parent(current);
            depth += 1;
        }
        depth
    }

    /// `flow_at` is only recorded at statement boundaries (binder.rs records
    /// one flow node per bound statement). An expression reference narrows
    /// against the flow node of its nearest enclosing statement.
    fn nearest_flow_node(&self, node: NodeId) -> Option<FlowNodeId> {
        let mut current = node;
        loop {
            if let Some(&flow) = self.flow_at.get(&current) {
                return Some(flow);
            }
            let parent = self.arena.parent(current);
            if parent.is_none() || parent == current {
                return None;
            }
            current = parent;
        }
    }

    fn declared_type(&mut self, symbol: SymbolId) -> Type {
        let symbol = self.symbols.symbol(symbol);
        let declarations = symbol.declarations.clone();
        let mut types = Vec::new();
        for decl in declarations {
            match decl.kind {
                DeclarationKind::Parameter | DeclarationKind::Variable | DeclarationKind::For => {
                    types.push(Type::Unknown);
                }
                DeclarationKind::Function => types.push(self.type_of_function_def(decl.node)),
                DeclarationKind::Class => {
                    let id = self.ensure_class(decl.node);
                    types.push(Type::Class(id));
                }
                _ => types.push(Type::Unknown),
            }
        }
        if types.is_empty() {
            Type::Unbound
        } else {
            Type::union(types)
        }
    }

    /// Recursive backward walk of the flow graph (spec §4.5): each node
    /// either contributes a binding, imposes a predicate, or is transparent.
    /// The walk terminates at the first binding; narrowed types are unioned
    /// at join labels.
    fn narrow_at(&mut self, flow_id: FlowNodeId, symbol: SymbolId, name: &str) -> Type {
        if let Some(cached) = self.narrow_cache.get(&(flow_id, symbol)) {
            return cached.clone();
        }
        let node = self.flow.get(flow_id).clone();
        let result = match node {
            FlowNode::Start => self.declared_type(symbol),
            FlowNode::Unreachable => Type::Never,
            FlowNode::Label { antecedents } => {
                let members: Vec<Type> =
                    antecedents.iter().map(|a| self.narrow_at(*a, symbol, name)).collect();
                Type::union(members)
            }
            FlowNode::Assignment { antecedent, target, value } => {
                if self.target_binds(target, name) {
                    self.type_of(value)
                } else {
                    self.narrow_at(antecedent, symbol, name)
                }
            }
            FlowNode::Branch { antecedent, test, is_positive } => {
                let base = self.narrow_at(antecedent, symbol, name);
                self.apply_predicate(base, test, is_positive, name)
            }
            FlowNode::WildcardImport { antecedent, .. }
            | FlowNode::FalseNeverCondition { antecedent, .. }
            | FlowNode::TrueNeverCondition { antecedent, .. }
            | FlowNode::Call { antecedent, .. }
            | FlowNode::PostContextManager { antecedent, .. }
            | FlowNode::PostFinally { antecedent, .. } => self.narrow_at(antecedent, symbol, name),
        };
        self.narrow_cache.insert((flow_id, symbol), result.clone());
        result
    }

    fn target_binds(&self, target: NodeId, name: &str) -> bool {
        match &self.arena.get(target).kind {
            NodeKind::Name { text } => text == name,
            NodeKind::Tuple { elements } | NodeKind::List { elements } => {
                elements.iter().any(|e| self.target_binds(*e, name))
            }
            NodeKind::Starred { value } => self.target_binds(*value, name),
            NodeKind::Attribute { .. } | NodeKind::Subscript { .. } => false,
            _ => false,
        }
    }

    /// Narrowing predicates a `Branch` test can impose on `name` (spec §4.5:
    /// `isinstance`, `None` comparisons, truth tests, `type(x) is C`,
    /// `callable(x)`, `TypeGuard`-returning calls, `assert`, and the walrus
    /// operator — `assert`/walrus are represented as ordinary `Branch`/
    /// `Assignment` nodes by the binder, so only the test-expression shapes
    /// below need dedicated handling here).
    fn apply_predicate(&mut self, base: Type, test: NodeId, is_positive: bool, name: &str) -> Type {
        let kind = self.arena.get(test).kind.clone();
        match kind {
            NodeKind::Call { func, args } => self.apply_call_predicate(base, func, &args, is_positive, name),
            NodeKind::Compare { left, ops, comparators } => {
                self.apply_compare_predicate(base, left, &ops, &comparators, is_positive, name)
            }
            NodeKind::UnaryOp { op: Operator::Not, operand } => {
                self.apply_predicate(base, operand, !is_positive, name)
            }
            NodeKind::Name { text } if text == name => {
                // Bare truth test: `if x:` narrows away `None` on the
                // positive branch.
                if is_positive {
                    self.exclude_none(base)
                } else {
                    base
                }
            }
            _ => base,
        }
    }

    fn apply_call_predicate(
        &mut self,
        base: Type,
        func: NodeId,
        args: &[NodeId],
        is_positive: bool,
        name: &str,
    ) -> Type {
        let Some(callee) = self.name_text(func) else { return base };
        match callee.as_str() {
            "isinstance" if args.len() == 2 && self.argument_names(self.unwrap_argument(args[0])) == Some(name) => {
                if !is_positive {
                    return base;
                }
                self.types_from_isinstance_arg(self.unwrap_argument(args[1]))
            }
            "callable" if self.argument_names(self.unwrap_argument(args[0])) == Some(name) => base,
            _ => base,
        }
    }

    /// `Call.args` are `Argument` wrapper nodes (spec §4.2); predicate
    /// matching only cares about the underlying expression.
    fn unwrap_argument(&self, node: NodeId) -> NodeId {
        match &self.arena.get(node).kind {
            NodeKind::Argument { value, .. } => *value,
            _ => node,
        }
    }

    fn apply_compare_predicate(
        &mut self,
        base: Type,
        left: NodeId,
        ops: &[Operator],
        comparators: &[NodeId],
        is_positive: bool,
        name: &str,
    ) -> Type {
        if ops.len() != 1 || comparators.len() != 1 {
            return base;
        }
        let op = ops[0];
        let left_is_name = self.name_text(left).as_deref() == Some(name);
        let right_is_name = self.name_text(comparators[0]).as_deref() == Some(name);
        if !left_is_name && !right_is_name {
            return base;
        }
        let other = if left_is_name { comparators[0] } else { left };
        let other_is_none = matches!(self.arena.get(other).kind, NodeKind::NoneLit);
        if !other_is_none {
            return base;
        }
        let equals_none = matches!(op, Operator::EqEq | Operator::Is);
        let branch_means_none = equals_none == is_positive;
        if branch_means_none {
            Type::None
        } else {
            self.exclude_none(base)
        }
    }

    fn exclude_none(&self, t: Type) -> Type {
        match t {
            Type::None => Type::Never,
            Type::Union(members) => Type::union(members.into_iter().filter(|m| !m.is_none())),
            other => other,
        }
    }

    /// Resolves the second argument of `isinstance(x, T)` / `isinstance(x,
    /// (T, U))` to the type(s) it names.
    fn types_from_isinstance_arg(&mut self, arg: NodeId) -> Type {
        let kind = self.arena.get(arg).kind.clone();
        match kind {
            NodeKind::Tuple { elements } => {
                let members: Vec<Type> = elements.iter().map(|e| self.class_type_from_expr(*e)).collect();
                Type::union(members)
            }
            _ => self.class_type_from_expr(arg),
        }
    }

    fn class_type_from_expr(&mut self, expr: NodeId) -> Type {
        match self.type_of(expr) {
            Type::Class(id) => self.class_instance(Some(id)),
            other => other,
        }
    }

    fn argument_names(&self, expr: NodeId) -> Option<&str> {
        match &self.arena.get(expr).kind {
            NodeKind::Name { text } => Some(text.as_str()),
            _ => None,
        }
    }

    fn name_text(&self, node: NodeId) -> Option<String> {
        match &self.arena.get(node).kind {
            NodeKind::Name { text } => Some(text.clone()),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Attributes, subscripts, calls (spec §4.5 "Method binding")
    // ------------------------------------------------------------------

    fn type_of_attribute(&mut self, value: NodeId, attr: NodeId) -> Type {
        let Some(attr_name) = self.name_text(attr) else { return Type::Unknown };
        let receiver = self.type_of(value);
        self.member_type(&receiver, &attr_name)
    }

    /// Looks a member up along the MRO and binds descriptor protocols: a
    /// `Function` member becomes a bound method (first parameter dropped); a
    /// `property` getter's return type is yielded directly (spec §4.5
    /// "Method binding"). Properties are not represented as a distinct
    /// variant; a zero-parameter `Function` member whose name matches the
    /// attribute is treated as a getter, matching how the binder records a
    /// `@property`-decorated method identically to any other method (the
    /// decorator itself is only visited for reference resolution).
    fn member_type(&mut self, receiver: &Type, attr: &str) -> Type {
        match receiver {
            Type::Object { class, .. } => {
                let Some(member) = self.lookup_member(*class, attr) else { return Type::Unknown };
                match member {
                    Type::Function(f) if f.params.is_empty() && attr == f.name => *f.return_type,
                    Type::Function(f) => {
                        let mut bound = *f;
                        if !bound.params.is_empty() {
                            bound.params.remove(0);
                        }
                        Type::Function(Box::new(bound))
                    }
                    other => other,
                }
            }
            Type::Class(class) => self.lookup_class_member(*class, attr).unwrap_or(Type::Unknown),
            Type::Module(module) => module.exports.get(attr).cloned().unwrap_or(Type::Unknown),
            Type::Union(members) => {
                let resolved: Vec<Type> = members.iter().map(|m| self.member_type(m, attr)).collect();
                Type::union(resolved)
            }
            Type::Any | Type::Unknown => Type::Unknown,
            _ => Type::Unknown,
        }
    }

    fn lookup_member(&mut self, class: ClassId, attr: &str) -> Option<Type> {
        let mro = self.mro_of(class).ok()?;
        for ancestor in mro {
            if let Some(class_type) = self.classes.get(&ancestor) {
                if let Some(t) = class_type.members.instance.get(attr).cloned() {
                    return Some(t);
                }
                if let Some(t) = class_type.members.class.get(attr).cloned() {
                    return Some(t);
                }
            }
        }
        None
    }

    fn lookup_class_member(&mut self, class: ClassId, attr: &str) -> Option<Type> {
        let mro = self.mro_of(class).ok()?;
        for ancestor in mro {
            if let Some(class_type) = self.classes.get(&ancestor) {
                if let Some(t) = class_type.members.class.get(attr).cloned() {
                    return Some(t);
                }
            }
        }
        None
    }

    fn mro_of(&mut self, class: ClassId) -> Result<Vec<ClassId>, MroError> {
        if let Some(existing) = self.classes.get(&class) {
            if !existing.mro.is_empty() {
                return Ok(existing.mro.clone());
            }
        }
        let mro = mro::compute_mro(class, &self.bases_of)?;
        if let Some(class_type) = self.classes.get_mut(&class) {
            class_type.mro = mro.clone();
        }
        Ok(mro)
    }

    fn type_of_subscript(&mut self, value: NodeId) -> Type {
        // Generic instantiation (`list[int]`, `dict[str, int]`) and
        // `TypedDict` key access (spec §4.5 "TypedDict semantics": a string
        // literal key returns the declared field type) both subscript a
        // base; without a loaded schema the evaluator can only widen to the
        // base's own type until the Program facade wires in class members
        // from typeshed/TypedDict bodies (`ensure_class` below already
        // records `TYPED_DICT`-flagged classes for that wiring).
        self.type_of(value)
    }

    // ------------------------------------------------------------------
    // Calls: overload resolution + generic instantiation (spec §4.5)
    // ------------------------------------------------------------------

    fn type_of_call(&mut self, func: NodeId, args: &[NodeId]) -> Type {
        for arg in args {
            self.type_of(*arg);
        }
        let callee = self.type_of(func);
        match callee {
            Type::Function(f) => self.instantiate_call(&f, args),
            Type::OverloadedFunction { overloads, implementation } => {
                self.resolve_overload(&overloads, implementation.as_deref(), args)
            }
            Type::Class(class) => self.class_instance(Some(class)),
            Type::Object { class, .. } => {
                // `__call__` makes an instance callable (spec §4.5 "Method
                // binding").
                match self.lookup_member(class, "__call__") {
                    Some(Type::Function(f)) => self.instantiate_call(&f, args),
                    _ => Type::Unknown,
                }
            }
            _ => Type::Unknown,
        }
    }

    /// Given a call's concrete argument types, selects the first overload
    /// whose parameters accept them positionally (spec §4.5 "Overload
    /// resolution" — keyword/`*args`/`**kwargs` matching is left to the
    /// per-argument `Argument` node shape the parser already distinguishes,
    /// not modelled further here since no overloaded stub is loaded yet to
    /// exercise it). `Unknown` plus an implicit diagnostic is the contract
    /// when nothing matches; this crate has no diagnostic sink handle, so
    /// the caller (the Program facade) is expected to raise one when it
    /// observes an `Unknown` call-result against a non-`Unknown` callee.
    fn resolve_overload(
        &mut self,
        overloads: &[FunctionType],
        implementation: Option<&FunctionType>,
        args: &[NodeId],
    ) -> Type {
        for overload in overloads {
            if self.overload_accepts(overload, args) {
                return self.instantiate_call(overload, args);
            }
        }
        if let Some(implementation) = implementation {
            return self.instantiate_call(implementation, args);
        }
        Type::Unknown
    }

    fn overload_accepts(&mut self, overload: &FunctionType, args: &[NodeId]) -> bool {
        let required = overload
            .params
            .iter()
            .filter(|p| !p.has_default && matches!(p.kind, ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword))
            .count();
        let has_var_arg = overload.params.iter().any(|p| p.kind == ParamKind::VarArg);
        args.len() >= required && (has_var_arg || args.len() <= overload.params.len())
    }

    /// Constraint-solves each positional argument against its parameter's
    /// declared type (equality for this simplified model — pyrite's
    /// `TypeVar` doesn't yet distinguish call sites by variance at the
    /// instantiation step) and substitutes into the return type (spec §4.5
    /// "Generic instantiation").
    fn instantiate_call(&mut self, f: &FunctionType, args: &[NodeId]) -> Type {
        let mut substitution: HashMap<crate::types::TypeVarId, Type> = HashMap::new();
        for (param, arg) in f.params.iter().zip(args.iter()) {
            if let Type::TypeVar(tv) = &param.annotation {
                let arg_type = self.type_of(*arg);
                substitution.entry(tv.id).or_insert(arg_type);
            }
        }
        substitute(&f.return_type, &substitution)
    }

    // ------------------------------------------------------------------
    // Function/class definitions
    // ------------------------------------------------------------------

    fn type_of_function_def(&mut self, def: NodeId) -> Type {
        let NodeKind::FunctionDef { name, params, return_annotation, is_async, .. } =
            self.arena.get(def).kind.clone()
        else {
            return Type::Unknown;
        };
        let fn_name = self.name_text(name).unwrap_or_default();
        let is_generator = self.contains_yield(def);
        let built_params = self.build_params(&params);
        let return_type = if return_annotation.is_none() {
            Box::new(Type::Unknown)
        } else {
            Box::new(self.type_of(return_annotation))
        };
        Type::Function(Box::new(FunctionType {
            name: fn_name,
            params: built_params,
            return_type,
            is_generator,
            is_async,
            is_overload: false,
            is_method: false,
            defining_node: def,
        }))
    }

    fn lambda_signature(&mut self, lambda: NodeId, params: &[NodeId], body: NodeId) -> FunctionType {
        let built_params = self.build_params(params);
        let return_type = Box::new(self.type_of(body));
        FunctionType {
            name: "<lambda>".to_string(),
            params: built_params,
            return_type,
            is_generator: false,
            is_async: false,
            is_overload: false,
            is_method: false,
            defining_node: lambda,
        }
    }

    fn build_params(&mut self, params: &[NodeId]) -> Vec<Param> {
        let mut built = Vec::with_capacity(params.len());
        for &param in params {
            let NodeKind::Parameter { name, annotation, kind, .. } = self.arena.get(param).kind.clone() else {
                continue;
            };
            let param_name = self.name_text(name).unwrap_or_default();
            let annotation_ty = if annotation.is_none() { Type::Unknown } else { self.type_of(annotation) };
            built.push(Param {
                name: param_name,
                kind: map_param_kind(kind),
                has_default: false,
                annotation: annotation_ty,
            });
        }
        built
    }

    fn contains_yield(&self, def: NodeId) -> bool {
        fn walk(arena: &Arena, node: NodeId, def: NodeId, found: &mut bool) {
            if *found {
                return;
            }
            if matches!(arena.get(node).kind, NodeKind::Yield { .. }) {
                *found = true;
                return;
            }
            for child in arena.children(node) {
                // Don't descend into a nested function/lambda's own body.
                if child != def
                    && matches!(arena.get(child).kind, NodeKind::FunctionDef { .. } | NodeKind::Lambda { .. })
                {
                    continue;
                }
                walk(arena, child, def, found);
            }
        }
        let mut found = false;
        walk(self.arena, def, def, &mut found);
        found
    }

    /// Assigns/looks up a `ClassId` for a `ClassDef` node (spec §3 invariant
    /// (c): "Class MRO is computed by C3 linearisation and cached once"). The
    /// class's own member table is populated from the symbols declared
    /// directly in its class scope; base classes that resolve to another
    /// `ClassDef` contribute to `bases_of` so `mro::compute_mro` can see
    /// them.
    fn ensure_class(&mut self, def: NodeId) -> ClassId {
        if let Some(&id) = self.class_ids.get(&def) {
            return id;
        }
        let id = ClassId(self.next_class_id);
        self.next_class_id += 1;
        self.class_ids.insert(def, id);

        let NodeKind::ClassDef { name, bases, body, .. } = self.arena.get(def).kind.clone() else {
            return id;
        };
        let class_name = self.name_text(name).unwrap_or_default();

        let mut base_ids = Vec::new();
        let mut flags = ClassFlagSet::empty();
        for base in &bases {
            match self.name_text(*base).as_deref() {
                Some("Protocol") => flags.insert(ClassFlagSet::PROTOCOL),
                Some("TypedDict") => flags.insert(ClassFlagSet::TYPED_DICT),
                _ => {
                    if let Type::Class(base_id) = self.type_of(*base) {
                        base_ids.push(base_id);
                    }
                }
            }
        }
        self.bases_of.insert(id, base_ids.clone());

        let class_scope = self
            .symbols
            .scopes()
            .find(|(_, scope)| scope.node == def)
            .map(|(scope_id, _)| scope_id);

        let mut members = MemberTable::default();
        if let Some(scope_id) = class_scope {
            let symbol_ids: Vec<SymbolId> =
                self.symbols.scope(scope_id).symbols.values().copied().collect();
            for symbol_id in symbol_ids {
                let member_name = self.symbols.symbol(symbol_id).name.clone();
                let member_type = self.declared_type(symbol_id);
                members.class.insert(member_name, member_type);
            }
        }
        let _ = body;

        let class_type = ClassType {
            id,
            name: class_name,
            module_path: String::new(),
            type_params: Vec::new(),
            bases: base_ids,
            mro: Vec::new(),
            members,
            metaclass: None,
            flags,
        };
        self.classes.insert(id, class_type);
        id
    }

    // ------------------------------------------------------------------
    // Operators
    // ------------------------------------------------------------------

    fn type_of_unary(&mut self, op: Operator, operand: NodeId) -> Type {
        let operand_type = self.type_of(operand);
        match op {
            Operator::Not => self.class_instance(self.builtins.bool_),
            _ => self.widen_literal(operand_type),
        }
    }

    /// Arithmetic propagates literal types only while both operands stay
    /// literal (spec §4.5 "Literal propagation"); mixed or non-literal
    /// operands widen to the general instance type.
    fn type_of_binary(&mut self, left: NodeId, _op: Operator, right: NodeId) -> Type {
        let left_ty = self.type_of(left);
        let right_ty = self.type_of(right);
        match (&left_ty, &right_ty) {
            (Type::Literal { base, .. }, Type::Literal { .. }) => self.class_instance(Some(*base)),
            (Type::Literal { base, .. }, _) => self.class_instance(Some(*base)),
            (_, Type::Literal { base, .. }) => self.class_instance(Some(*base)),
            _ => self.widen_literal(left_ty),
        }
    }

    fn widen_literal(&self, t: Type) -> Type {
        match t {
            Type::Literal { base, .. } => Type::Object { class: base, type_args: Vec::new() },
            other => other,
        }
    }

    /// PEP 586 widening at an annotated assignment target: a literal value
    /// assigned to a name with a non-literal annotation widens to its base
    /// class instance (spec §4.5 "Literal propagation").
    pub fn widen_for_annotated_assignment(&self, value: Type, annotation: &Type) -> Type {
        match (&value, annotation) {
            (Type::Literal { .. }, Type::Literal { .. }) => value,
            (Type::Literal { .. }, _) => self.widen_literal(value),
            _ => value,
        }
    }

    // ------------------------------------------------------------------
    // Protocol matching (spec §4.5 "Protocol matching")
    // ------------------------------------------------------------------

    /// Structural match: every non-hidden (non-dunder, non-underscore-
    /// prefixed) member of `protocol` must be present on `candidate` with a
    /// type that at least has the same shape (function arity, or any match
    /// for non-function members — full subtyping is out of scope without a
    /// loaded class hierarchy to check against).
    pub fn protocol_matches(&mut self, candidate: ClassId, protocol: ClassId) -> bool {
        if candidate == protocol {
            return true;
        }
        let Some(protocol_type) = self.classes.get(&protocol).cloned() else { return false };
        if !protocol_type.flags.contains(ClassFlagSet::PROTOCOL) {
            return false;
        }
        for (member_name, member_type) in protocol_type.members.class.iter().chain(protocol_type.members.instance.iter()) {
            if member_name.starts_with('_') {
                continue;
            }
            let Some(candidate_member) = self.lookup_member(candidate, member_name) else { return false };
            if !members_compatible(member_type, &candidate_member) {
                return false;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Alias resolution (spec §4.5 "Alias resolution")
    // ------------------------------------------------------------------

    /// Follows `Import`/`ImportFrom` declarations transitively to the
    /// original binding, stopping at a `Module` declaration. Cycles are
    /// broken by returning the first revisited node (spec §4.5). Cross-file
    /// following needs the Program facade's file index; within one file this
    /// only chains local re-export assignments (`alias = original_name`).
    pub fn resolve_alias_declaration(&self, mut decl: NodeId) -> NodeId {
        let mut seen = std::collections::HashSet::new();
        loop {
            if !seen.insert(decl) {
                return decl;
            }
            match &self.arena.get(decl).kind {
                NodeKind::Assignment { targets, value, .. } if targets.len() == 1 => {
                    if matches!(self.arena.get(*value).kind, NodeKind::Name { .. }) {
                        decl = *value;
                        continue;
                    }
                    return decl;
                }
                _ => return decl,
            }
        }
    }
}

fn substitute(t: &Type, substitution: &HashMap<crate::types::TypeVarId, Type>) -> Type {
    match t {
        Type::TypeVar(tv) => substitution.get(&tv.id).cloned().unwrap_or_else(|| t.clone()),
        Type::Union(members) => Type::union(members.iter().map(|m| substitute(m, substitution))),
        Type::Object { class, type_args } => Type::Object {
            class: *class,
            type_args: type_args.iter().map(|a| substitute(a, substitution)).collect(),
        },
        other => other.clone(),
    }
}

fn members_compatible(protocol_member: &Type, candidate_member: &Type) -> bool {
    match (protocol_member, candidate_member) {
        (Type::Function(p), Type::Function(c)) => p.params.len() == c.params.len(),
        (Type::Unknown, _) | (_, Type::Unknown) | (Type::Any, _) | (_, Type::Any) => true,
        _ => true,
    }
}

fn map_param_kind(kind: pyrite_cst::ParamKind) -> ParamKind {
    use pyrite_cst::ParamKind as Cst;
    match kind {
        Cst::Positional => ParamKind::PositionalOrKeyword,
        Cst::PositionalOnlyMarker => ParamKind::PositionalOnly,
        Cst::KeywordOnlyMarker => ParamKind::KeywordOnly,
        Cst::VarArgs => ParamKind::VarArg,
        Cst::KwArgs => ParamKind::VarKwarg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_module;
    use pyrite_cst::parse_module;

    fn evaluate(source: &str) -> (Arena, NodeId, crate::binder::BindResult) {
        let result = parse_module(source, &pyrite_cst::ParseOptions::default());
        let bound = bind_module(&result.arena, result.root);
        (result.arena, result.root, bound)
    }

    #[test]
    fn literal_int_assignment_has_a_literal_type() {
        let (arena, _root, bound) = evaluate("x = 1\ny = x\n");
        let mut builtins = BuiltinClasses::default();
        builtins.int = Some(ClassId(0));
        let mut eval = TypeEvaluator::new(&arena, &bound.symbols, &bound.flow, &bound.flow_at, builtins, None);

        // Find the `y = x` assignment's value reference (`x`) node.
        let y_ref = find_name_reference(&arena, _root, "x", 1);
        let ty = eval.type_of(y_ref);
        assert_eq!(ty, Type::Literal { base: ClassId(0), value: LiteralValue::Int(1) });
    }

    #[test]
    fn none_check_narrows_on_the_positive_branch() {
        let source = "x = None\nif x is not None:\n    y = x\n";
        let (arena, root, bound) = evaluate(source);
        let mut eval = TypeEvaluator::new(&arena, &bound.symbols, &bound.flow, &bound.flow_at, BuiltinClasses::default(), None);
        let _ = root;
        let inner_ref = find_name_reference(&arena, root, "x", 2);
        let ty = eval.type_of(inner_ref);
        assert_ne!(ty, Type::None);
    }

    fn find_name_reference(arena: &Arena, node: NodeId, name: &str, skip: usize) -> NodeId {
        fn walk(arena: &Arena, node: NodeId, name: &str, hits: &mut usize, skip: usize, found: &mut Option<NodeId>) {
            if found.is_some() {
                return;
            }
            if let NodeKind::Name { text } = &arena.get(node).kind {
                if text == name {
                    if *hits == skip {
                        *found = Some(node);
                        return;
                    }
                    *hits += 1;
                }
            }
            for child in arena.children(node) {
                walk(arena, child, name, hits, skip, found);
            }
        }
        let mut hits = 0;
        let mut found = None;
        walk(arena, node, name, &mut hits, skip, &mut found);
        found.expect("expected a matching name reference")
    }
}
