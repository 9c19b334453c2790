//! A hand-written replacement for the teacher's `paste!`-generated,
//! per-node-kind `Visitor`/`VisitResult` pair. The arena's single flat
//! `NodeKind` means one `visit_node`/`leave_node` pair is enough — there is
//! no per-kind method explosion to generate.

use crate::node::{Arena, NodeId, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisitResult {
    /// Continue traversal into this node's children.
    Continue,
    /// Skip this node's children, continue with siblings.
    SkipChildren,
    /// Stop the walk entirely; no further callbacks fire.
    Stop,
}

impl Default for VisitResult {
    fn default() -> VisitResult {
        VisitResult::Continue
    }
}

pub trait Visitor {
    fn visit_node(&mut self, arena: &Arena, id: NodeId) -> VisitResult {
        let _ = (arena, id);
        VisitResult::Continue
    }

    fn leave_node(&mut self, arena: &Arena, id: NodeId) {
        let _ = (arena, id);
    }
}

/// Depth-first pre-order walk, honoring [`VisitResult`]. Used by the binder
/// to build scopes and flow nodes in one pass, and by the consistency check
/// in tests (spec §4.2 "Testable property").
pub fn walk<V: Visitor>(visitor: &mut V, arena: &Arena, root: NodeId) -> VisitResult {
    match visitor.visit_node(arena, root) {
        VisitResult::Stop => return VisitResult::Stop,
        VisitResult::SkipChildren => {
            visitor.leave_node(arena, root);
            return VisitResult::Continue;
        }
        VisitResult::Continue => {}
    }
    for child in arena.children(root) {
        if walk(visitor, arena, child) == VisitResult::Stop {
            return VisitResult::Stop;
        }
    }
    visitor.leave_node(arena, root);
    VisitResult::Continue
}

/// Counts every node reachable from `root`, used by the arena/parent-link
/// consistency test to cross-check against `Arena::len`.
pub struct NodeCounter {
    pub count: usize,
}

impl Visitor for NodeCounter {
    fn visit_node(&mut self, _arena: &Arena, _id: NodeId) -> VisitResult {
        self.count += 1;
        VisitResult::Continue
    }
}

/// Collects every identifier introduced or referenced in `Name` leaves, in
/// visitation order. Useful for quick structural assertions in tests.
pub struct NameCollector {
    pub names: Vec<String>,
}

impl Visitor for NameCollector {
    fn visit_node(&mut self, arena: &Arena, id: NodeId) -> VisitResult {
        if let NodeKind::Name { text } = &arena.get(id).kind {
            self.names.push(text.clone());
        }
        VisitResult::Continue
    }
}
