//! DOT rendering of a call graph.

use std::fmt::Write;

use crate::sync::RcuGuard;

use super::store::CallGraph;

/// Escapes a string for use inside a DOT double-quoted label.
#[must_use]
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "")
        .replace('\n', "\\n")
}

impl CallGraph {
    /// Renders the graph in DOT format.
    ///
    /// Nodes are labelled with their display name; external nodes are drawn
    /// dashed. Call edges are solid, reference edges dashed. The output can
    /// be fed straight to Graphviz.
    #[must_use]
    pub fn to_dot(&self, region: &RcuGuard<'_>, title: Option<&str>) -> String {
        let mut dot = String::new();

        dot.push_str("digraph callgraph {\n");
        if let Some(title) = title {
            let _ = writeln!(dot, "    label=\"{}\";", escape_dot(title));
        }
        dot.push_str("    node [shape=box, fontname=\"monospace\"];\n\n");

        let count = self.node_count();
        for i in 0..count {
            let Some(node) = self.try_node(region, i) else {
                continue;
            };
            let style = if node.is_external() {
                ", style=dashed"
            } else {
                ""
            };
            let _ = writeln!(
                dot,
                "    n{i} [label=\"{}\"{style}];",
                escape_dot(node.display_name())
            );
        }

        dot.push('\n');

        for i in 0..count {
            let Some(node) = self.try_node(region, i) else {
                continue;
            };
            for callee in node.calls(region) {
                let _ = writeln!(dot, "    n{i} -> n{callee};");
            }
            for target in node.refs(region) {
                let _ = writeln!(dot, "    n{i} -> n{target} [style=dashed];");
            }
        }

        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use crate::sync::RcuThread;

    #[test]
    fn test_escape_dot() {
        assert_eq!(escape_dot("plain"), "plain");
        assert_eq!(escape_dot("say \"hi\""), "say \\\"hi\\\"");
        assert_eq!(escape_dot("a\\b"), "a\\\\b");
        assert_eq!(escape_dot("one\r\ntwo"), "one\\ntwo");
    }

    #[test]
    fn test_dot_output_shape() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        let g = graph.add_external(&mut region, "g");
        graph.set_defined(&mut region, f);
        graph.add_edge(&mut region, f, g, EdgeKind::Call);

        let dot = graph.to_dot(&region, Some("demo"));
        assert!(dot.starts_with("digraph callgraph {"));
        assert!(dot.contains("label=\"demo\";"));
        assert!(dot.contains("n0 [label=\"f\"];"));
        // g is still external and drawn dashed.
        assert!(dot.contains("n1 [label=\"g\", style=dashed];"));
        assert!(dot.contains("n0 -> n1;"));
        assert!(dot.ends_with("}\n"));
    }
}
