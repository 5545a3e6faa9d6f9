//! The concurrent call-graph store.

use crate::collections::{AppendList, IndexList, IndexSet, Indices, StringMap};
use crate::sync::{synchronize_rcu, RcuCell, RcuGuard};

use super::node::{Location, Node};

/// Which kind of edge [`CallGraph::add_edge`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// A direct invocation.
    Call,
    /// A reference without a call, such as taking a function's address.
    Ref,
}

/// Behavioural knobs for a [`CallGraph`].
#[derive(Debug, Clone, Default)]
pub struct GraphConfig {
    /// When true, setting a display alias that disagrees with the alias a
    /// located node already carries is a fatal programming error instead of
    /// a no-op.
    pub strict_aliases: bool,
}

impl GraphConfig {
    /// The permissive default: conflicting alias writes are ignored.
    #[must_use]
    pub fn permissive() -> Self {
        GraphConfig {
            strict_aliases: false,
        }
    }

    /// Aborts on conflicting alias writes.
    #[must_use]
    pub fn strict() -> Self {
        GraphConfig {
            strict_aliases: true,
        }
    }
}

/// A call graph that many parser threads grow concurrently and a
/// single-threaded front-end later queries.
///
/// Nodes are addressed by dense indices that never change once assigned.
/// Four indices hang off the node table: canonical name, display alias,
/// defining file, and a label index that can be wiped wholesale with
/// [`reset_labels`](CallGraph::reset_labels).
///
/// Every operation must run inside a reader region on the calling thread's
/// [`RcuThread`](crate::sync::RcuThread) handle. Operations that insert
/// take the region mutably; lookups share it.
///
/// # Example
///
/// ```rust
/// use callscope::graph::{CallGraph, EdgeKind};
/// use callscope::sync::RcuThread;
///
/// let rcu = RcuThread::register();
/// let graph = CallGraph::new();
/// let mut region = rcu.read_lock();
///
/// let f = graph.add_external(&mut region, "f");
/// let g = graph.add_external(&mut region, "g");
/// graph.set_defined(&mut region, f);
/// graph.add_edge(&mut region, f, g, EdgeKind::Call);
///
/// assert!(graph.has_call_edge(&region, f, g));
/// ```
pub struct CallGraph {
    nodes: AppendList<Node>,
    by_name: StringMap<usize>,
    by_username: StringMap<usize>,
    by_file: StringMap<Box<IndexList>>,
    labels: RcuCell<StringMap<Box<IndexSet>>>,
    config: GraphConfig,
}

impl CallGraph {
    /// Creates an empty graph with the permissive configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates an empty graph with the given configuration.
    #[must_use]
    pub fn with_config(config: GraphConfig) -> Self {
        CallGraph {
            nodes: AppendList::new(),
            by_name: StringMap::new(),
            by_username: StringMap::new(),
            by_file: StringMap::new(),
            labels: RcuCell::new(Box::into_raw(Box::new(StringMap::new()))),
            config,
        }
    }

    /// Returns the index of the node named `name`, creating an external
    /// node if the graph has never seen the name.
    ///
    /// Display aliases are consulted before canonical names. Creation is
    /// idempotent: every caller racing on the same name gets the same
    /// index back. A losing racer's node record stays allocated but is
    /// never indexed; it is reclaimed when the graph is dropped.
    pub fn add_external(&self, region: &mut RcuGuard<'_>, name: &str) -> usize {
        if let Some(index) = self.by_username.get(region, name) {
            return index;
        }
        if let Some(index) = self.by_name.get(region, name) {
            return index;
        }

        let index = self.nodes.push(region, Box::new(Node::new(name)));
        self.by_name.add(region, name, index)
    }

    /// Marks the node as defined. Idempotent.
    pub fn set_defined(&self, region: &mut RcuGuard<'_>, index: usize) {
        self.node(region, index).set_defined();
    }

    /// Sets the node's display alias and indexes it.
    ///
    /// Once a node has a recorded location its alias is frozen: a
    /// disagreeing write is ignored (or fatal under
    /// [`GraphConfig::strict`]). Without a location, the first alias
    /// written wins; later aliases still become lookup keys for the node.
    pub fn set_username(&self, region: &mut RcuGuard<'_>, index: usize, username: &str) {
        let node = self.node(region, index);
        if node.location().is_some() {
            if self.config.strict_aliases {
                assert_eq!(
                    node.username(),
                    Some(username),
                    "conflicting alias for located node {index}"
                );
            }
            return;
        }
        node.set_username(username);
        self.by_username.add(region, username, index);
    }

    /// Records where the node is defined.
    ///
    /// Write-once: calls after the first are ignored. The winning call also
    /// appends the node to the per-file index.
    pub fn set_location(
        &self,
        region: &mut RcuGuard<'_>,
        index: usize,
        file: &str,
        line: Option<usize>,
    ) {
        let node = self.node(region, index);
        if node.set_location(file, line) {
            let nodes = self
                .by_file
                .add_with(region, file, || Box::new(IndexList::new()));
            nodes.push(region, index);
        }
    }

    /// Records an edge from `caller` to `callee`.
    ///
    /// Both directions are stored: the callee learns its caller, and the
    /// caller records the callee under calls or refs depending on `kind`.
    pub fn add_edge(&self, region: &mut RcuGuard<'_>, caller: usize, callee: usize, kind: EdgeKind) {
        self.node(region, callee).callers.insert(region, caller);
        let caller_node = self.node(region, caller);
        match kind {
            EdgeKind::Call => caller_node.calls.insert(region, callee),
            EdgeKind::Ref => caller_node.refs.insert(region, callee),
        };
    }

    /// Attaches `label` to the node.
    ///
    /// Must not race with [`reset_labels`](CallGraph::reset_labels).
    pub fn add_label(&self, region: &mut RcuGuard<'_>, index: usize, label: &str) {
        let labels = self.label_index();
        let nodes = labels.add_with(region, label, || Box::new(IndexSet::new()));
        nodes.insert(region, index);
    }

    /// Wipes the label index.
    ///
    /// The swap of the index is the linearisation point: a reader either
    /// sees the full old index or the empty new one, never a mixture. The
    /// old index is freed after a grace period, so in-flight readers finish
    /// safely. Must not be called from inside a reader region on the
    /// calling thread, and must not race with
    /// [`add_label`](CallGraph::add_label).
    pub fn reset_labels(&self) {
        let fresh = Box::into_raw(Box::new(StringMap::new()));
        let retired = self.labels.swap(fresh);
        synchronize_rcu();
        // SAFETY: the pointer came out of the cell exactly once, and no
        // reader region that could have observed it is still running.
        unsafe { drop(Box::from_raw(retired)) };
    }

    /// Number of nodes, including records still being published.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks a node up by display alias or canonical name.
    pub fn get_node(&self, region: &RcuGuard<'_>, name: &str) -> Option<usize> {
        self.by_username
            .get(region, name)
            .or_else(|| self.by_name.get(region, name))
    }

    /// Returns the node record at `index`.
    ///
    /// The reference stays valid until the graph is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `index` has never been returned by
    /// [`add_external`](CallGraph::add_external).
    pub fn node<'g>(&'g self, region: &RcuGuard<'_>, index: usize) -> &'g Node {
        match self.nodes.get(region, index) {
            Some(node) => node,
            None => panic!("node index {index} out of range"),
        }
    }

    /// Returns the node record at `index`, or `None` for an index that has
    /// been reserved but whose record is not published yet.
    pub fn try_node<'g>(&'g self, region: &RcuGuard<'_>, index: usize) -> Option<&'g Node> {
        self.nodes.get(region, index)
    }

    /// The canonical name of the node at `index`.
    pub fn name_of<'g>(&'g self, region: &RcuGuard<'_>, index: usize) -> &'g str {
        self.node(region, index).name()
    }

    /// The display alias of the node at `index`, if set.
    pub fn username_of<'g>(&'g self, region: &RcuGuard<'_>, index: usize) -> Option<&'g str> {
        self.node(region, index).username()
    }

    /// The source location of the node at `index`, if recorded.
    pub fn location_of<'g>(&'g self, region: &RcuGuard<'_>, index: usize) -> Option<&'g Location> {
        self.node(region, index).location()
    }

    /// True while the node at `index` has no observed definition.
    pub fn is_external(&self, region: &RcuGuard<'_>, index: usize) -> bool {
        self.node(region, index).is_external()
    }

    /// True if `src` calls `dest`, or references it and `ref_ok` allows
    /// references.
    ///
    /// A reference to an external node never counts: a cross-unit mention
    /// of an undefined symbol is not evidence of a call.
    pub fn has_edge(&self, region: &RcuGuard<'_>, src: usize, dest: usize, ref_ok: bool) -> bool {
        if self.node(region, src).calls.contains(region, dest) {
            return true;
        }
        if self.node(region, dest).is_external() {
            return false;
        }
        ref_ok && self.node(region, src).refs.contains(region, dest)
    }

    /// True if `src` directly calls `dest`.
    pub fn has_call_edge(&self, region: &RcuGuard<'_>, src: usize, dest: usize) -> bool {
        self.node(region, src).calls.contains(region, dest)
    }

    /// True if the node currently carries `label`.
    pub fn has_label(&self, region: &RcuGuard<'_>, index: usize, label: &str) -> bool {
        self.label_index()
            .get(region, label)
            .is_some_and(|nodes| nodes.contains(region, index))
    }

    /// Iterates over the indices of the nodes that call or reference
    /// `index`.
    pub fn callers<'a>(&'a self, region: &'a RcuGuard<'_>, index: usize) -> Indices<'a> {
        self.node(region, index).callers(region)
    }

    /// Iterates over the indices of the nodes `index` calls.
    pub fn callees<'a>(&'a self, region: &'a RcuGuard<'_>, index: usize) -> Indices<'a> {
        self.node(region, index).calls(region)
    }

    /// Iterates over the indices of the nodes `index` references without
    /// calling.
    pub fn refs<'a>(&'a self, region: &'a RcuGuard<'_>, index: usize) -> Indices<'a> {
        self.node(region, index).refs(region)
    }

    /// Iterates over the nodes defined in `file`, in definition order.
    /// Empty if the file is unknown.
    pub fn nodes_for_file<'a>(&'a self, region: &'a RcuGuard<'_>, file: &str) -> Indices<'a> {
        match self.by_file.get(region, file) {
            Some(nodes) => nodes.iter(region),
            None => Indices::empty(),
        }
    }

    /// Iterates over the nodes carrying `label`. Empty if the label is
    /// unknown.
    pub fn nodes_for_label<'a>(&'a self, region: &'a RcuGuard<'_>, label: &str) -> Indices<'a> {
        match self.label_index().get(region, label) {
            Some(nodes) => nodes.iter(region),
            None => Indices::empty(),
        }
    }

    /// Snapshot of the files currently known to the graph.
    #[must_use]
    pub fn all_files(&self, region: &RcuGuard<'_>) -> Vec<String> {
        self.by_file.keys(region).map(str::to_owned).collect()
    }

    /// Snapshot of the labels currently in use.
    #[must_use]
    pub fn all_labels(&self, region: &RcuGuard<'_>) -> Vec<String> {
        self.label_index()
            .keys(region)
            .map(str::to_owned)
            .collect()
    }

    /// The current label index.
    ///
    /// Callers must hold a reader region; the returned reference is valid
    /// until the region ends or the index is reset, whichever comes first.
    fn label_index(&self) -> &StringMap<Box<IndexSet>> {
        // SAFETY: the index swapped out by reset_labels is freed only
        // after a grace period, and every caller runs inside a region.
        unsafe { &*self.labels.load() }
    }
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CallGraph {
    fn drop(&mut self) {
        // SAFETY: exclusive access; the cell owns the label index.
        unsafe { drop(Box::from_raw(self.labels.load_owner())) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::RcuThread;

    #[test]
    fn test_add_external_is_idempotent() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        assert_eq!(graph.add_external(&mut region, "f"), f);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.get_node(&region, "f"), Some(f));
        assert_eq!(graph.get_node(&region, "g"), None);
    }

    #[test]
    fn test_alias_lookup_takes_precedence() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "s::f");
        graph.set_defined(&mut region, f);
        graph.set_username(&mut region, f, "S_f");

        assert_eq!(graph.add_external(&mut region, "S_f"), f);
        assert_eq!(graph.get_node(&region, "S_f"), Some(f));
        assert_eq!(graph.node(&region, f).display_name(), "S_f");
    }

    #[test]
    fn test_alias_frozen_after_location() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        graph.set_username(&mut region, f, "alias");
        graph.set_location(&mut region, f, "f.c", Some(3));
        graph.set_username(&mut region, f, "other");

        assert_eq!(graph.node(&region, f).username(), Some("alias"));
    }

    #[test]
    fn test_location_is_write_once() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        graph.set_location(&mut region, f, "one.c", Some(1));
        graph.set_location(&mut region, f, "two.c", Some(2));

        let location = graph.node(&region, f).location().unwrap();
        assert_eq!(location.file, "one.c");

        let in_one: Vec<usize> = graph.nodes_for_file(&region, "one.c").collect();
        assert_eq!(in_one, vec![f]);
        assert_eq!(graph.nodes_for_file(&region, "two.c").count(), 0);
    }

    #[test]
    fn test_edges_are_symmetric() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let f = graph.add_external(&mut region, "f");
        let g = graph.add_external(&mut region, "g");
        graph.set_defined(&mut region, f);
        graph.set_defined(&mut region, g);
        graph.add_edge(&mut region, f, g, EdgeKind::Call);

        assert_eq!(graph.callees(&region, f).collect::<Vec<_>>(), vec![g]);
        assert_eq!(graph.callers(&region, g).collect::<Vec<_>>(), vec![f]);
        assert!(graph.has_call_edge(&region, f, g));
        assert!(!graph.has_edge(&region, g, f, true));
    }

    #[test]
    fn test_refs_to_external_are_not_edges() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        let x = graph.add_external(&mut region, "x");
        graph.set_defined(&mut region, x);
        let y = graph.add_external(&mut region, "y");
        graph.add_edge(&mut region, x, y, EdgeKind::Ref);

        assert!(!graph.has_edge(&region, x, y, true));
        assert!(!graph.has_call_edge(&region, x, y));

        // Once the target is defined the reference becomes an edge.
        graph.set_defined(&mut region, y);
        assert!(graph.has_edge(&region, x, y, true));
        assert!(!graph.has_edge(&region, x, y, false));
    }

    #[test]
    fn test_labels_and_reset() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();

        let a = {
            let mut region = rcu.read_lock();
            let a = graph.add_external(&mut region, "a");
            graph.add_label(&mut region, a, "hot");
            assert!(graph.has_label(&region, a, "hot"));
            assert_eq!(graph.all_labels(&region), vec!["hot".to_string()]);
            a
        };

        graph.reset_labels();

        let mut region = rcu.read_lock();
        assert!(!graph.has_label(&region, a, "hot"));
        assert!(graph.all_labels(&region).is_empty());

        graph.add_label(&mut region, a, "hot");
        assert!(graph.has_label(&region, a, "hot"));
    }

    #[test]
    fn test_files_snapshot() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let mut region = rcu.read_lock();

        for (name, file) in [("f", "f.c"), ("g", "g.c"), ("h", "g.c")] {
            let i = graph.add_external(&mut region, name);
            graph.set_location(&mut region, i, file, None);
        }

        let mut files = graph.all_files(&region);
        files.sort_unstable();
        assert_eq!(files, vec!["f.c".to_string(), "g.c".to_string()]);
        assert_eq!(graph.nodes_for_file(&region, "g.c").count(), 2);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_unknown_index_is_fatal() {
        let rcu = RcuThread::register();
        let graph = CallGraph::new();
        let region = rcu.read_lock();
        let _ = graph.node(&region, 7);
    }
}
