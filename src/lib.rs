#![deny(missing_docs)]

//! # callscope
//!
//! A concurrent in-memory call-graph store. Parallel parser workers grow
//! the graph lock-free while registered reader threads run unsynchronized;
//! a single-threaded front-end later queries it, renders it as DOT, or
//! searches it with regular expressions over call paths.
//!
//! # Architecture
//!
//! The crate is layered leaf-first; each layer depends only on those below:
//!
//! - **Quiescence layer** ([`sync`]): a lightweight user-space RCU.
//!   Reader registration and scoped reader regions are wait-free; writers
//!   that reclaim storage wait for a grace period.
//! - **Container layer** ([`collections`]): an append-only concurrent
//!   array with reservation-based appends and doubling growth, and the
//!   lists, the index set and the string map built on it. Lookups are
//!   lock-free; inserts are lock-free outside of growth.
//! - **Graph layer** ([`graph`]): nodes addressed by stable dense
//!   indices, symmetric call/reference edges, name and alias indices, a
//!   per-file index, and a label index that can be wiped wholesale.
//! - **Query layer** ([`automata`], [`query`]): finite automata over call
//!   paths, a regular-expression AST, and parsers for the node and path
//!   search languages.
//!
//! # Concurrency model
//!
//! Every graph and container operation runs inside a scoped reader region
//! ([`sync::RcuGuard`]) on the calling thread's handle. Insertion paths
//! take the region mutably because growth briefly steps outside it;
//! lookups and iterators share it, and iterator lifetimes are tied to the
//! region by construction. The only blocking operations are storage
//! growth and [`graph::CallGraph::reset_labels`], both of which wait for
//! one grace period.
//!
//! # Example
//!
//! ```rust
//! use callscope::graph::{CallGraph, EdgeKind};
//! use callscope::sync::RcuThread;
//! use std::sync::Arc;
//!
//! let graph = Arc::new(CallGraph::new());
//!
//! // Parser workers add nodes and edges concurrently.
//! std::thread::scope(|scope| {
//!     for chunk in 0..4 {
//!         let graph = Arc::clone(&graph);
//!         scope.spawn(move || {
//!             let rcu = RcuThread::register();
//!             let mut region = rcu.read_lock();
//!             let caller = graph.add_external(&mut region, "dispatch");
//!             graph.set_defined(&mut region, caller);
//!             let callee = graph.add_external(&mut region, &format!("handler_{chunk}"));
//!             graph.add_edge(&mut region, caller, callee, EdgeKind::Call);
//!         });
//!     }
//! });
//!
//! // The front-end queries the finished graph.
//! let rcu = RcuThread::register();
//! let region = rcu.read_lock();
//! let dispatch = graph.get_node(&region, "dispatch").unwrap();
//! assert_eq!(graph.callees(&region, dispatch).count(), 4);
//! ```

pub mod automata;
pub mod collections;
mod error;
pub mod graph;
pub mod prelude;
pub mod query;
pub mod sync;

pub use error::{Error, Result};
pub use graph::{CallGraph, EdgeKind, Node};
