//! A single function or function-pointer slot in the call graph.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use crate::collections::{Indices, IndexSet};
use crate::sync::RcuGuard;

/// Source position of a node's definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// File the definition was found in.
    pub file: String,
    /// Line within the file, when known.
    pub line: Option<usize>,
}

/// A function known to the graph.
///
/// A node starts out *external*: its name has been seen, but no definition.
/// Observing the definition clears the flag, and the flag never goes back.
/// The display alias and the source location are write-once; racing writers
/// of either are resolved first-come.
///
/// Edges are stored as node indices rather than references, on both sides:
/// a node knows who it calls, who it merely references, and who calls or
/// references it.
pub struct Node {
    name: String,
    username: OnceLock<String>,
    location: OnceLock<Location>,
    external: AtomicBool,
    pub(crate) callers: IndexSet,
    pub(crate) calls: IndexSet,
    pub(crate) refs: IndexSet,
}

impl Node {
    pub(crate) fn new(name: &str) -> Self {
        Node {
            name: name.to_owned(),
            username: OnceLock::new(),
            location: OnceLock::new(),
            external: AtomicBool::new(true),
            callers: IndexSet::new(),
            calls: IndexSet::new(),
            refs: IndexSet::new(),
        }
    }

    /// The canonical name, unique within the graph.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The display alias, if one has been set.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.get().map(String::as_str)
    }

    /// The display alias if set, else the canonical name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username().unwrap_or(&self.name)
    }

    /// The source location of the definition, if known.
    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.get()
    }

    /// True while no definition has been observed.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.external.load(Ordering::Relaxed)
    }

    pub(crate) fn set_defined(&self) {
        self.external.store(false, Ordering::Relaxed);
    }

    pub(crate) fn set_username(&self, username: &str) {
        let _ = self.username.set(username.to_owned());
    }

    /// Returns true if this call actually recorded the location.
    pub(crate) fn set_location(&self, file: &str, line: Option<usize>) -> bool {
        self.location
            .set(Location {
                file: file.to_owned(),
                line,
            })
            .is_ok()
    }

    /// Indices of the nodes that call or reference this node.
    pub fn callers<'a>(&'a self, region: &'a RcuGuard<'_>) -> Indices<'a> {
        self.callers.iter(region)
    }

    /// Indices of the nodes this node calls.
    pub fn calls<'a>(&'a self, region: &'a RcuGuard<'_>) -> Indices<'a> {
        self.calls.iter(region)
    }

    /// Indices of the nodes this node references without calling.
    pub fn refs<'a>(&'a self, region: &'a RcuGuard<'_>) -> Indices<'a> {
        self.refs.iter(region)
    }
}
