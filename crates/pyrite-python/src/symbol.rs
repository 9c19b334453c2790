//! Scopes, symbols and declarations (spec §4.4 "Binder").
//!
//! Grounded on the teacher's `ScopeKind`/`Scope` pair and its LEGB
//! `resolve_reference` walk in `analyzer.rs`: that code resolves a name at a
//! single reference site for refactor safety. Here the same scope-kind
//! taxonomy and lookup order is generalized into an eagerly-built, per-file
//! scope tree that every name reference in the file can be bound to (rather
//! than resolved on demand for one rename target).

use std::collections::HashMap;

use pyrite_cst::NodeId;
use pyrite_core::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub node: NodeId,
    pub symbols: HashMap<String, SymbolId>,
    /// Names declared `global`/`nonlocal` within this scope, which skip the
    /// normal LEGB chain when resolved (spec §4.4 item about global/nonlocal).
    pub globals: Vec<String>,
    pub nonlocals: Vec<String>,
}

impl Scope {
    fn new(kind: ScopeKind, parent: Option<ScopeId>, node: NodeId) -> Scope {
        Scope {
            kind,
            parent,
            node,
            symbols: HashMap::new(),
            globals: Vec::new(),
            nonlocals: Vec::new(),
        }
    }
}

/// One binding site for a name. A symbol may have several declarations (a
/// function redefined under an `if TYPE_CHECKING:` branch, a variable
/// assigned in more than one place); the evaluator picks among them using
/// flow narrowing rather than the binder collapsing them up front.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub node: NodeId,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Variable,
    Parameter,
    Function,
    Class,
    Import,
    ImportFrom,
    TypeAlias,
    TypeParameter,
    For,
    With,
    ExceptHandler,
    Global,
    Nonlocal,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub scope: ScopeId,
    pub declarations: Vec<Declaration>,
    /// True for names starting with a single underscore at module scope, or
    /// names excluded by `__all__` — spec §4.4 item 5.
    pub is_private: bool,
}

/// Owns every scope and symbol produced for one file. `NodeId`s inside stay
/// relative to that file's `pyrite_cst::Arena`.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable { scopes: Vec::new(), symbols: Vec::new() }
    }

    pub fn new_scope(&mut self, kind: ScopeKind, parent: Option<ScopeId>, node: NodeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(kind, parent, node));
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    /// Finds or creates the symbol named `name` directly in `scope` (not
    /// walking outward — that's `resolve`'s job) and records a new
    /// declaration site for it.
    pub fn declare(&mut self, scope: ScopeId, name: &str, decl: Declaration) -> SymbolId {
        if let Some(&id) = self.scope(scope).symbols.get(name) {
            self.symbols[id.0 as usize].declarations.push(decl);
            return id;
        }
        let is_private = self.scope(scope).kind == ScopeKind::Module
            && name.starts_with('_')
            && !name.starts_with("__");
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol { name: name.to_string(), scope, declarations: vec![decl], is_private });
        self.scope_mut(scope).symbols.insert(name.to_string(), id);
        id
    }

    /// LEGB resolution (spec §4.4): Local, then Enclosing function scopes
    /// (class scopes are skipped — Python's closures never capture a class
    /// body), then Global (module scope), then Builtins (the caller
    /// supplies `builtins_scope` since typeshed's `builtins.pyi` lives in a
    /// different file).
    pub fn resolve(&self, from: ScopeId, name: &str, builtins: Option<ScopeId>) -> Option<SymbolId> {
        let mut current = Some(from);
        let mut first = true;
        while let Some(scope_id) = current {
            let scope = self.scope(scope_id);
            if first && scope.globals.contains(&name.to_string()) {
                return self.resolve_in_module_scope(name);
            }
            if !(scope.kind == ScopeKind::Class && !first) {
                if let Some(&id) = scope.symbols.get(name) {
                    return Some(id);
                }
            }
            first = false;
            current = scope.parent;
        }
        builtins.and_then(|b| self.scope(b).symbols.get(name).copied())
    }

    fn resolve_in_module_scope(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .find(|s| s.kind == ScopeKind::Module)
            .and_then(|s| s.symbols.get(name))
            .copied()
    }

    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes.iter().enumerate().map(|(i, s)| (ScopeId(i as u32), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_shadows_enclosing() {
        let mut table = SymbolTable::new();
        let module = table.new_scope(ScopeKind::Module, None, NodeId(0));
        let func = table.new_scope(ScopeKind::Function, Some(module), NodeId(1));
        table.declare(module, "x", Declaration { kind: DeclarationKind::Variable, node: NodeId(0), span: Span::new(0, 1) });
        table.declare(func, "x", Declaration { kind: DeclarationKind::Parameter, node: NodeId(1), span: Span::new(2, 3) });

        let resolved = table.resolve(func, "x", None).unwrap();
        assert_eq!(table.symbol(resolved).declarations[0].kind, DeclarationKind::Parameter);
    }

    #[test]
    fn class_scope_does_not_form_a_closure() {
        let mut table = SymbolTable::new();
        let module = table.new_scope(ScopeKind::Module, None, NodeId(0));
        let class = table.new_scope(ScopeKind::Class, Some(module), NodeId(1));
        let method = table.new_scope(ScopeKind::Function, Some(class), NodeId(2));
        table.declare(class, "helper", Declaration { kind: DeclarationKind::Variable, node: NodeId(1), span: Span::new(0, 1) });
        table.declare(module, "helper", Declaration { kind: DeclarationKind::Function, node: NodeId(0), span: Span::new(0, 1) });

        let resolved = table.resolve(method, "helper", None).unwrap();
        assert_eq!(table.symbol(resolved).scope, module);
    }

    #[test]
    fn global_statement_skips_to_module_scope() {
        let mut table = SymbolTable::new();
        let module = table.new_scope(ScopeKind::Module, None, NodeId(0));
        let func = table.new_scope(ScopeKind::Function, Some(module), NodeId(1));
        table.declare(module, "counter", Declaration { kind: DeclarationKind::Variable, node: NodeId(0), span: Span::new(0, 1) });
        table.scope_mut(func).globals.push("counter".to_string());

        let resolved = table.resolve(func, "counter", None).unwrap();
        assert_eq!(table.symbol(resolved).scope, module);
    }
}
