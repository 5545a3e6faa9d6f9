//! Automaton-driven search over call paths.
//!
//! A call path is the sequence of display names along a chain of edges.
//! [`CallGraph::paths`] walks the graph depth-first from every node,
//! advancing an [`Automaton`] by one symbol per node entered; every prefix
//! that lands in a final state is reported. Failure states prune the walk,
//! and a node is visited at most once per path, which cuts cycles.

use rustc_hash::FxHashSet;

use crate::automata::Automaton;
use crate::sync::RcuGuard;

use super::store::CallGraph;

impl CallGraph {
    /// Returns every call path accepted by `automaton`.
    ///
    /// Edges are followed under the same policy as
    /// [`has_edge`](CallGraph::has_edge): calls always, references only
    /// when `ref_ok` and the target is defined. External nodes appear on
    /// paths only when `external_ok`.
    ///
    /// Paths are reported as sequences of display names; the search runs
    /// entirely inside the caller's reader region.
    pub fn paths<A: Automaton>(
        &self,
        region: &RcuGuard<'_>,
        automaton: &A,
        external_ok: bool,
        ref_ok: bool,
    ) -> Vec<Vec<String>> {
        let mut search = PathSearch {
            graph: self,
            region,
            external_ok,
            ref_ok,
            visited: FxHashSet::default(),
            path: Vec::new(),
            found: Vec::new(),
        };

        let roots: Vec<usize> = (0..self.node_count()).collect();
        search.visit(automaton, None, &roots, &automaton.initial());
        search.found
    }
}

struct PathSearch<'a, 'r> {
    graph: &'a CallGraph,
    region: &'a RcuGuard<'r>,
    external_ok: bool,
    ref_ok: bool,
    /// Nodes on the path currently being extended.
    visited: FxHashSet<usize>,
    path: Vec<String>,
    found: Vec<Vec<String>>,
}

impl PathSearch<'_, '_> {
    fn visit<A: Automaton>(
        &mut self,
        automaton: &A,
        caller: Option<usize>,
        targets: &[usize],
        state: &A::State,
    ) {
        for &target in targets {
            let Some(node) = self.graph.try_node(self.region, target) else {
                continue;
            };
            if self.visited.contains(&target) {
                continue;
            }
            if let Some(caller) = caller {
                if !self.graph.has_edge(self.region, caller, target, self.ref_ok) {
                    continue;
                }
            }
            if !self.external_ok && node.is_external() {
                continue;
            }

            let name = node.display_name();
            let next = automaton.advance(state, name);
            if automaton.is_failure(&next) {
                continue;
            }

            self.visited.insert(target);
            self.path.push(name.to_owned());
            if automaton.is_final(&next) {
                self.found.push(self.path.clone());
            }

            let callees: Vec<usize> = node
                .calls(self.region)
                .chain(node.refs(self.region))
                .collect();
            self.visit(automaton, Some(target), &callees, &next);

            self.path.pop();
            self.visited.remove(&target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::expr::Expr;
    use crate::graph::EdgeKind;
    use crate::sync::RcuThread;

    fn symbol(name: &str) -> Expr {
        let name = name.to_owned();
        Expr::One(Box::new(move |s: &str| s == name))
    }

    fn build_diamond() -> (RcuThread, CallGraph) {
        // a -> b -> d, a -> c -> d
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();
        for name in ["a", "b", "c", "d"] {
            let i = graph.add_external(&mut region, name);
            graph.set_defined(&mut region, i);
        }
        for (src, dest) in [("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")] {
            let s = graph.get_node(&region, src).unwrap();
            let d = graph.get_node(&region, dest).unwrap();
            graph.add_edge(&mut region, s, d, EdgeKind::Call);
        }
        drop(region);
        (rcu, graph)
    }

    #[test]
    fn test_exact_path() {
        let (rcu, graph) = build_diamond();
        let region = rcu.read_lock();

        let expr = Expr::Sequence(vec![symbol("a"), symbol("b"), symbol("d")]);
        let nfa = expr.compile();
        let paths = graph.paths(&region, &nfa, true, true);
        assert_eq!(paths, vec![vec!["a".to_string(), "b".into(), "d".into()]]);
    }

    #[test]
    fn test_wildcard_middle() {
        let (rcu, graph) = build_diamond();
        let region = rcu.read_lock();

        // a .* d: both branches of the diamond match.
        let any = Expr::Star(Box::new(Expr::One(Box::new(|_: &str| true))));
        let expr = Expr::Sequence(vec![symbol("a"), any, symbol("d")]);
        let nfa = expr.compile();
        let mut paths = graph.paths(&region, &nfa, true, true);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec!["a".to_string(), "b".into(), "d".into()],
                vec!["a".to_string(), "c".into(), "d".into()],
            ]
        );
    }

    #[test]
    fn test_external_nodes_pruned() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        let ext = graph.add_external(&mut region, "ext");
        graph.set_defined(&mut region, f);
        graph.add_edge(&mut region, f, ext, EdgeKind::Call);

        let expr = Expr::Sequence(vec![symbol("f"), symbol("ext")]);
        let with_external = graph.paths(&region, &expr.compile(), true, true);
        assert_eq!(with_external.len(), 1);

        let expr = Expr::Sequence(vec![symbol("f"), symbol("ext")]);
        let without = graph.paths(&region, &expr.compile(), false, true);
        assert!(without.is_empty());
    }

    #[test]
    fn test_cycles_terminate() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        let g = graph.add_external(&mut region, "g");
        graph.set_defined(&mut region, f);
        graph.set_defined(&mut region, g);
        graph.add_edge(&mut region, f, g, EdgeKind::Call);
        graph.add_edge(&mut region, g, f, EdgeKind::Call);

        let any = Expr::Star(Box::new(Expr::One(Box::new(|_: &str| true))));
        let expr = Expr::Sequence(vec![symbol("f"), any]);
        let paths = graph.paths(&region, &expr.compile(), true, true);
        // "f" and "f g"; the cycle back to f is cut.
        assert_eq!(paths.len(), 2);
    }
}
