//! Named integration tests for the testable scenarios in spec.md §8.
//!
//! S1 (builtin completeness), S3 (optional subscript), and S4 (overload
//! resolution) need typeshed-loaded builtin/overloaded signatures that
//! aren't wired up yet (see `/DESIGN.md`, "Still to come") and S5 (import
//! sorting) is an autofix action outside this crate's scope; only S2 and S6
//! are exercised here, against the binder and evaluator as built.

use pyrite_cst::{parse_module, NodeKind, NodeId, Arena, ParseOptions};
use pyrite_python::binder::bind_module;
use pyrite_python::diagnostics::check_bindings;
use pyrite_python::evaluator::{BuiltinClasses, TypeEvaluator};
use pyrite_python::types::Type;
use pyrite_core::{DiagnosticSink, Severity};

fn find_name(arena: &Arena, node: NodeId, name: &str, skip: usize) -> NodeId {
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

/// S2 — Narrowing through isinstance. The spec's source narrows `x: object`
/// against the builtin `str`; without a loaded typeshed stub for `str` this
/// exercises the same `isinstance` narrowing machinery against a
/// locally-declared class instead, which is all the evaluator needs to
/// decide the branches.
#[test]
fn s2_narrowing_through_isinstance() {
    let source = "\
class Text:
    pass

def f(x):
    if isinstance(x, Text):
        y = x
    else:
        y = x
";
    let parsed = parse_module(source, &ParseOptions::default());
    let bound = bind_module(&parsed.arena, parsed.root);
    let mut eval = TypeEvaluator::new(
        &parsed.arena,
        &bound.symbols,
        &bound.flow,
        &bound.flow_at,
        BuiltinClasses::default(),
        None,
    );

    // "x" occurrences in source order: the parameter binding (0), the
    // `isinstance` call's own argument (1), then the True-branch (2) and
    // False-branch (3) references this test cares about.
    let true_branch_ref = find_name(&parsed.arena, parsed.root, "x", 2);
    let false_branch_ref = find_name(&parsed.arena, parsed.root, "x", 3);

    let narrowed = eval.type_of(true_branch_ref);
    let not_narrowed = eval.type_of(false_branch_ref);

    assert!(matches!(narrowed, Type::Object { .. }), "expected an instance type in the True branch, got {narrowed:?}");
    assert_ne!(narrowed, not_narrowed, "the True and False branches must narrow to different types");
}

/// S6 — Flow-sensitive definite assignment: a name assigned only inside one
/// arm of an `if` is possibly unbound at a `return` that follows it.
#[test]
fn s6_flow_sensitive_definite_assignment() {
    let source = "def g(b):\n    if b:\n        x = 1\n    return x\n";
    let parsed = parse_module(source, &ParseOptions::default());
    let bound = bind_module(&parsed.arena, parsed.root);
    let mut sink = DiagnosticSink::new();
    check_bindings(&parsed.arena, &bound, None, Severity::Warning, Severity::Error, &mut sink);

    let diagnostics = sink.sorted();
    let unbound: Vec<_> = diagnostics.iter().filter(|d| d.code == "reportPossiblyUnbound").collect();
    assert_eq!(unbound.len(), 1, "expected exactly one possibly-unbound diagnostic, got {diagnostics:?}");
    assert!(unbound[0].message.contains('x'));
}

/// The same assignment on every branch of the `if` must not be flagged —
/// the negative case spec.md §8 implies by contrast with S6.
#[test]
fn s6_negative_assignment_on_every_branch_is_not_flagged() {
    let source = "def g(b):\n    if b:\n        x = 1\n    else:\n        x = 2\n    return x\n";
    let parsed = parse_module(source, &ParseOptions::default());
    let bound = bind_module(&parsed.arena, parsed.root);
    let mut sink = DiagnosticSink::new();
    check_bindings(&parsed.arena, &bound, None, Severity::Warning, Severity::Error, &mut sink);

    assert!(sink.sorted().iter().all(|d| d.code != "reportPossiblyUnbound"));
}
