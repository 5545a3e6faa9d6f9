//! Convenient re-exports of the types most programs need.
//!
//! ```rust
//! use callscope::prelude::*;
//!
//! let rcu = RcuThread::register();
//! let graph = CallGraph::new();
//! let mut region = rcu.read_lock();
//! let i = graph.add_external(&mut region, "f");
//! graph.set_defined(&mut region, i);
//! assert!(!graph.node(&region, i).is_external());
//! ```

// ================================================================================================
// Core types and error handling
// ================================================================================================

/// The crate-wide error type.
pub use crate::error::Error;

/// The crate-wide result type.
pub use crate::error::Result;

// ================================================================================================
// The store
// ================================================================================================

/// The concurrent call-graph store.
pub use crate::graph::{CallGraph, EdgeKind, GraphConfig, Location, Node};

// ================================================================================================
// Reader regions
// ================================================================================================

/// Reader registration and scoped regions.
pub use crate::sync::{synchronize_rcu, RcuGuard, RcuThread};

// ================================================================================================
// Path search
// ================================================================================================

/// Automata and the path expression AST.
pub use crate::automata::{Automaton, Dfa, Expr, LazyDfa, Nfa};

/// Search expression parsing.
pub use crate::query::{parse_nodes, parse_path, NodeMatcher};
