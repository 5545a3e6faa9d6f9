//! Node matchers: the atoms of the search language.
//!
//! A matcher selects nodes of a [`CallGraph`], either by enumerating them
//! ([`nodes`](NodeMatcher::nodes)) or as a predicate over display names
//! ([`compile`](NodeMatcher::compile)). Matchers that depend on graph
//! state, such as labels and caller/callee closures, are materialized into
//! owned name sets at compile time, so the compiled predicate borrows
//! nothing and can be embedded into an automaton.

use rustc_hash::FxHashSet;

use crate::automata::Matcher;
use crate::graph::CallGraph;
use crate::sync::RcuGuard;

/// A selector over the nodes of a call graph.
#[derive(Debug)]
pub enum NodeMatcher {
    /// The node with exactly this name or alias.
    Name(String),
    /// Nodes whose display name contains a match of the pattern.
    Pattern(regex::Regex),
    /// Nodes carrying this label.
    Label(String),
    /// Nodes not selected by the inner matcher.
    Not(Box<NodeMatcher>),
    /// Nodes selected by every inner matcher. Empty selects all nodes.
    And(Vec<NodeMatcher>),
    /// Nodes selected by at least one inner matcher. Empty selects none.
    Or(Vec<NodeMatcher>),
    /// Direct callers of the selected nodes.
    Callers(Box<NodeMatcher>),
    /// Direct call targets of the selected nodes, externals excluded.
    Callees(Box<NodeMatcher>),
    /// The selected nodes and everything that transitively calls or
    /// references them.
    AllCallers(Box<NodeMatcher>),
    /// The selected nodes and everything they transitively call or
    /// reference.
    AllCallees(Box<NodeMatcher>),
}

impl NodeMatcher {
    /// Collapses single-element conjunctions and disjunctions and double
    /// negations.
    #[must_use]
    pub fn simplified(self) -> NodeMatcher {
        match self {
            NodeMatcher::And(mut atoms) if atoms.len() == 1 => {
                atoms.pop().expect("length checked").simplified()
            }
            NodeMatcher::Or(mut atoms) if atoms.len() == 1 => {
                atoms.pop().expect("length checked").simplified()
            }
            NodeMatcher::Not(inner) => match *inner {
                NodeMatcher::Not(nested) => nested.simplified(),
                other => NodeMatcher::Not(Box::new(other.simplified())),
            },
            other => other,
        }
    }

    /// Enumerates the display names selected by this matcher.
    #[must_use]
    pub fn nodes(&self, graph: &CallGraph, region: &RcuGuard<'_>) -> Vec<String> {
        match self {
            NodeMatcher::Name(name) => match graph.get_node(region, name) {
                Some(_) => vec![name.clone()],
                None => Vec::new(),
            },
            NodeMatcher::Pattern(pattern) => all_display_names(graph, region, true)
                .into_iter()
                .filter(|name| pattern.is_match(name))
                .collect(),
            NodeMatcher::Label(label) => graph
                .nodes_for_label(region, label)
                .filter_map(|i| graph.try_node(region, i))
                .map(|node| node.display_name().to_owned())
                .collect(),
            NodeMatcher::Not(inner) => {
                let excluded: FxHashSet<String> = inner.nodes(graph, region).into_iter().collect();
                all_display_names(graph, region, true)
                    .into_iter()
                    .filter(|name| !excluded.contains(name))
                    .collect()
            }
            NodeMatcher::And(atoms) => {
                let Some((first, rest)) = atoms.split_first() else {
                    return all_display_names(graph, region, true);
                };
                let mut selected: FxHashSet<String> =
                    first.nodes(graph, region).into_iter().collect();
                for atom in rest {
                    let other: FxHashSet<String> = atom.nodes(graph, region).into_iter().collect();
                    selected.retain(|name| other.contains(name));
                }
                selected.into_iter().collect()
            }
            NodeMatcher::Or(atoms) => {
                let mut selected: FxHashSet<String> = FxHashSet::default();
                for atom in atoms {
                    selected.extend(atom.nodes(graph, region));
                }
                selected.into_iter().collect()
            }
            NodeMatcher::Callers(inner) => {
                let mut selected: FxHashSet<String> = FxHashSet::default();
                for name in inner.nodes(graph, region) {
                    selected.extend(direct_callers(graph, region, &name));
                }
                selected.into_iter().collect()
            }
            NodeMatcher::Callees(inner) => {
                let mut selected: FxHashSet<String> = FxHashSet::default();
                for name in inner.nodes(graph, region) {
                    selected.extend(direct_callees(graph, region, &name));
                }
                selected.into_iter().collect()
            }
            NodeMatcher::AllCallers(inner) => {
                let mut selected: FxHashSet<String> = FxHashSet::default();
                for name in inner.nodes(graph, region) {
                    transitive(graph, region, &name, Direction::Callers, &mut selected);
                }
                selected.into_iter().collect()
            }
            NodeMatcher::AllCallees(inner) => {
                let mut selected: FxHashSet<String> = FxHashSet::default();
                for name in inner.nodes(graph, region) {
                    transitive(graph, region, &name, Direction::Callees, &mut selected);
                }
                selected.into_iter().collect()
            }
        }
    }

    /// Compiles the matcher into a self-contained predicate over display
    /// names.
    ///
    /// Graph-dependent matchers are resolved against the graph's state at
    /// compile time; the predicate does not observe later updates.
    #[must_use]
    pub fn compile(&self, graph: &CallGraph, region: &RcuGuard<'_>) -> Matcher {
        match self {
            NodeMatcher::Name(name) => {
                let name = name.clone();
                Box::new(move |symbol: &str| symbol == name)
            }
            NodeMatcher::Pattern(pattern) => {
                let pattern = pattern.clone();
                Box::new(move |symbol: &str| pattern.is_match(symbol))
            }
            NodeMatcher::Not(inner) => {
                let inner = inner.compile(graph, region);
                Box::new(move |symbol: &str| !inner(symbol))
            }
            NodeMatcher::And(atoms) => {
                let atoms: Vec<Matcher> =
                    atoms.iter().map(|atom| atom.compile(graph, region)).collect();
                Box::new(move |symbol: &str| atoms.iter().all(|atom| atom(symbol)))
            }
            NodeMatcher::Or(atoms) => {
                let atoms: Vec<Matcher> =
                    atoms.iter().map(|atom| atom.compile(graph, region)).collect();
                Box::new(move |symbol: &str| atoms.iter().any(|atom| atom(symbol)))
            }
            // Graph-dependent matchers become membership tests over a
            // snapshot taken now.
            _ => {
                let selected: FxHashSet<String> = self.nodes(graph, region).into_iter().collect();
                Box::new(move |symbol: &str| selected.contains(symbol))
            }
        }
    }
}

/// Display names of all published nodes.
fn all_display_names(graph: &CallGraph, region: &RcuGuard<'_>, external_ok: bool) -> Vec<String> {
    (0..graph.node_count())
        .filter_map(|i| graph.try_node(region, i))
        .filter(|node| external_ok || !node.is_external())
        .map(|node| node.display_name().to_owned())
        .collect()
}

/// Display names of the nodes that directly call `name`.
fn direct_callers(graph: &CallGraph, region: &RcuGuard<'_>, name: &str) -> Vec<String> {
    let Some(callee) = graph.get_node(region, name) else {
        return Vec::new();
    };
    graph
        .callers(region, callee)
        .filter(|&caller| graph.has_call_edge(region, caller, callee))
        .filter_map(|caller| graph.try_node(region, caller))
        .map(|node| node.display_name().to_owned())
        .collect()
}

/// Display names of the defined nodes `name` directly calls.
fn direct_callees(graph: &CallGraph, region: &RcuGuard<'_>, name: &str) -> Vec<String> {
    let Some(caller) = graph.get_node(region, name) else {
        return Vec::new();
    };
    graph
        .callees(region, caller)
        .filter_map(|callee| graph.try_node(region, callee))
        .filter(|node| !node.is_external())
        .map(|node| node.display_name().to_owned())
        .collect()
}

enum Direction {
    Callers,
    Callees,
}

/// Walks the graph from `name`, collecting display names of everything
/// reachable through callers or through calls and references, the start
/// node included.
fn transitive(
    graph: &CallGraph,
    region: &RcuGuard<'_>,
    name: &str,
    direction: Direction,
    selected: &mut FxHashSet<String>,
) {
    let Some(start) = graph.get_node(region, name) else {
        return;
    };
    let mut visited: FxHashSet<usize> = FxHashSet::default();
    let mut frontier = vec![start];
    while let Some(index) = frontier.pop() {
        if !visited.insert(index) {
            continue;
        }
        let Some(node) = graph.try_node(region, index) else {
            continue;
        };
        selected.insert(node.display_name().to_owned());
        match direction {
            Direction::Callers => frontier.extend(node.callers(region)),
            Direction::Callees => {
                frontier.extend(node.calls(region));
                frontier.extend(node.refs(region));
            }
        }
    }
}
