//! The reverse-edge control-flow graph the evaluator narrows types against
//! (spec §4.4 "flow nodes"). New code: the teacher's `analyzer.rs` resolves
//! references without tracking control flow at all (a rename only needs to
//! know a name's *binding*, not which branch reached it). The general shape
//! — a flow node per antecedent, referenced instead of owned, reverse-edges
//! from each node back to what can reach it — follows the "use-def map"
//! substrate sketched in the reference pack's `red_knot_python_semantic`
//! material, adapted to this crate's idiom of plain structs plus
//! `thiserror`.

use pyrite_cst::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowNodeId(pub u32);

#[derive(Debug, Clone)]
pub enum FlowNode {
    Start,
    Unreachable,
    /// A join point: the label a `Branch` or loop back-edge targets.
    Label { antecedents: Vec<FlowNodeId> },
    /// `test` is truthy, narrowing applies down `if_true`'s successors only.
    Branch { antecedent: FlowNodeId, test: NodeId, is_positive: bool },
    Assignment { antecedent: FlowNodeId, target: NodeId, value: NodeId },
    WildcardImport { antecedent: FlowNodeId, import: NodeId },
    /// A condition the evaluator has proven always false — everything past
    /// it on this edge is unreachable (e.g. `if sys.version_info < (3, 0):`
    /// under a `python_version` that postdates it).
    FalseNeverCondition { antecedent: FlowNodeId, test: NodeId },
    /// The complement: a condition proven always true, so its "else" arm is
    /// unreachable.
    TrueNeverCondition { antecedent: FlowNodeId, test: NodeId },
    Call { antecedent: FlowNodeId, call: NodeId },
    PostContextManager { antecedent: FlowNodeId, with_item: NodeId },
    PostFinally { antecedent: FlowNodeId, try_stmt: NodeId },
}

/// One file's flow graph. Built by the binder alongside the scope tree;
/// consumed by the evaluator's narrowing pass (spec §4.5).
#[derive(Debug, Default)]
pub struct FlowGraph {
    nodes: Vec<FlowNode>,
}

impl FlowGraph {
    pub fn new() -> FlowGraph {
        let mut graph = FlowGraph { nodes: Vec::new() };
        graph.nodes.push(FlowNode::Start);
        graph
    }

    pub fn start(&self) -> FlowNodeId {
        FlowNodeId(0)
    }

    pub fn push(&mut self, node: FlowNode) -> FlowNodeId {
        let id = FlowNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: FlowNodeId) -> &FlowNode {
        &self.nodes[id.0 as usize]
    }

    /// Walks backward from `from`, calling `visit` on every flow node that
    /// can reach it, stopping descent past a node when `visit` returns
    /// `false`. Used by the evaluator to accumulate narrowing constraints
    /// along every path that reaches a reference (spec §4.5's "flow
    /// narrowing").
    pub fn walk_back(&self, from: FlowNodeId, mut visit: impl FnMut(FlowNodeId, &FlowNode) -> bool) {
        let mut stack = vec![from];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let node = self.get(id);
            if !visit(id, node) {
                continue;
            }
            for antecedent in antecedents_of(node) {
                stack.push(antecedent);
            }
        }
    }
}

fn antecedents_of(node: &FlowNode) -> Vec<FlowNodeId> {
    match node {
        FlowNode::Start | FlowNode::Unreachable => Vec::new(),
        FlowNode::Label { antecedents } => antecedents.clone(),
        FlowNode::Branch { antecedent, .. }
        | FlowNode::Assignment { antecedent, .. }
        | FlowNode::WildcardImport { antecedent, .. }
        | FlowNode::FalseNeverCondition { antecedent, .. }
        | FlowNode::TrueNeverCondition { antecedent, .. }
        | FlowNode::Call { antecedent, .. }
        | FlowNode::PostContextManager { antecedent, .. }
        | FlowNode::PostFinally { antecedent, .. } => vec![*antecedent],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_back_visits_every_antecedent_once() {
        let mut graph = FlowGraph::new();
        let start = graph.start();
        let assign = graph.push(FlowNode::Assignment { antecedent: start, target: NodeId(1), value: NodeId(2) });
        let branch_true = graph.push(FlowNode::Branch { antecedent: assign, test: NodeId(3), is_positive: true });
        let branch_false = graph.push(FlowNode::Branch { antecedent: assign, test: NodeId(3), is_positive: false });
        let join = graph.push(FlowNode::Label { antecedents: vec![branch_true, branch_false] });

        let mut visited = Vec::new();
        graph.walk_back(join, |id, _| {
            visited.push(id);
            true
        });
        assert!(visited.contains(&join));
        assert!(visited.contains(&branch_true));
        assert!(visited.contains(&branch_false));
        assert!(visited.contains(&assign));
        assert!(visited.contains(&start));
    }
}
