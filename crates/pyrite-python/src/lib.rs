//! Import resolution, binding, and lazy type evaluation for pyrite (spec
//! §4.3–§4.5). Grounded on the teacher's `tugtool-python` scope-resolution
//! and MRO machinery, generalized from single-rename bookkeeping into a full
//! binder and type evaluator — see `/DESIGN.md`.

pub mod binder;
pub mod diagnostics;
pub mod evaluator;
pub mod flow;
pub mod mro;
pub mod resolver;
pub mod symbol;
pub mod types;

pub use binder::{bind_module, BindResult};
pub use diagnostics::check_bindings;
pub use evaluator::{BuiltinClasses, TypeEvaluator};
pub use flow::{FlowGraph, FlowNode, FlowNodeId};
pub use mro::{compute_mro, MroError};
pub use resolver::{resolve_module, ImportResolution, ImportResolver, SearchPath};
pub use symbol::{
    Declaration, DeclarationKind, Scope, ScopeId, ScopeKind, Symbol, SymbolId, SymbolTable,
};
pub use types::{ClassId, ClassType, FunctionType, Type, TypeVarId};
