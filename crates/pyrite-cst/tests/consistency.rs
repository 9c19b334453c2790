//! Arena/parent-link consistency checks (spec §4.2 testable property:
//! "every node's span is contained within its parent's span, and every
//! node is reachable from the root exactly once").

use pyrite_cst::{parse_module, walk, NodeCounter, ParseOptions, Visitor, VisitResult};

struct SpanNesting {
    violations: Vec<String>,
}

impl Visitor for SpanNesting {
    fn visit_node(&mut self, arena: &pyrite_cst::Arena, id: pyrite_cst::NodeId) -> VisitResult {
        let node = arena.get(id);
        let parent = arena.parent(id);
        if !parent.is_none() {
            let parent_span = arena.get(parent).span;
            if node.span.start < parent_span.start || node.span.end > parent_span.end {
                self.violations.push(format!(
                    "node {:?} span {:?} escapes parent span {:?}",
                    id, node.span, parent_span
                ));
            }
        }
        VisitResult::Continue
    }
}

fn assert_consistent(source: &str) {
    let result = parse_module(source, &ParseOptions::default());
    assert!(result.errors.is_empty(), "unexpected parse errors: {:?}", result.errors);

    let mut counter = NodeCounter { count: 0 };
    walk(&mut counter, &result.arena, result.root);
    assert!(counter.count > 0);

    let mut nesting = SpanNesting { violations: Vec::new() };
    walk(&mut nesting, &result.arena, result.root);
    assert!(nesting.violations.is_empty(), "{:#?}", nesting.violations);
}

#[test]
fn module_level_statements_stay_nested() {
    assert_consistent(
        "import os\nfrom typing import Optional\n\n\nclass Point:\n    x: int\n    y: int\n\n    def distance(self, other: \"Point\") -> float:\n        dx = self.x - other.x\n        dy = self.y - other.y\n        return (dx * dx + dy * dy) ** 0.5\n",
    );
}

#[test]
fn control_flow_stays_nested() {
    assert_consistent(
        "def classify(n: int) -> str:\n    if n < 0:\n        return \"negative\"\n    elif n == 0:\n        return \"zero\"\n    else:\n        return \"positive\"\n",
    );
}

#[test]
fn comprehensions_and_fstrings_stay_nested() {
    assert_consistent(
        "names = ['a', 'b']\ngreeting = [f'hello {n}!' for n in names if n]\n",
    );
}

#[test]
fn try_except_finally_stays_nested() {
    assert_consistent(
        "def safe_div(a: int, b: int) -> int:\n    try:\n        return a // b\n    except ZeroDivisionError:\n        return 0\n    finally:\n        pass\n",
    );
}
