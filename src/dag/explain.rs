//! DAG rendering
//!
//! ```text
//! #2 m=share(Combinator[DIVIDE]) filter=matchAll groupBy=grandTotal
//! \-- #0 m=k1(Aggregator[SUM(k1)]) filter=matchAll groupBy=grandTotal
//! \-- #1 m=k1_all(Unfiltrator[-country]) filter=matchAll groupBy=grandTotal
//!     \-- !0
//! ```
//!
//! A vertex is printed in full the first time it is reached; later
//! references print `!id`.

use crate::dag::graph::{QueryDag, StepId};
use crate::dag::step::CubeQueryStep;
use std::collections::HashSet;
use std::fmt::Write;

impl QueryDag {
    /// Render the DAG as an indented tree
    pub fn explain(&self) -> String {
        self.explain_with(|_, _| None)
    }

    /// Render the DAG, appending an optional annotation to each vertex
    pub fn explain_with<F>(&self, annotate: F) -> String
    where
        F: Fn(StepId, &CubeQueryStep) -> Option<String>,
    {
        let mut out = String::new();
        let mut printed = HashSet::new();
        for &root in &self.roots {
            self.render(root, 0, &mut printed, &annotate, &mut out);
        }
        out
    }

    fn render<F>(&self, id: StepId, depth: usize, printed: &mut HashSet<StepId>, annotate: &F, out: &mut String)
    where
        F: Fn(StepId, &CubeQueryStep) -> Option<String>,
    {
        if depth > 0 {
            out.push_str(&"    ".repeat(depth - 1));
            out.push_str("\\-- ");
        }

        if !printed.insert(id) {
            let _ = writeln!(out, "!{}", id);
            return;
        }

        let step = &self.steps[id];
        let _ = write!(out, "#{} {}", id, step);
        if let Some(annotation) = annotate(id, step) {
            let _ = write!(out, " [{}]", annotation);
        }
        out.push('\n');

        for &child in &self.underlyings[id] {
            self.render(child, depth + 1, printed, annotate, out);
        }
    }
}
