//! The search language over nodes and call paths.
//!
//! # Key Components
//!
//! - [`NodeMatcher`] - selectors over graph nodes
//! - [`parse_nodes`] - parser for node expressions
//! - [`parse_path`] - parser for path expressions, producing an
//!   [`Expr`](crate::automata::Expr) ready to compile into an automaton
//!
//! # Example
//!
//! ```rust
//! use callscope::graph::CallGraph;
//! use callscope::query::parse_nodes;
//! use callscope::sync::RcuThread;
//!
//! let rcu = RcuThread::register();
//! let graph = CallGraph::new();
//! let mut region = rcu.read_lock();
//! let i = graph.add_external(&mut region, "init");
//! graph.set_defined(&mut region, i);
//!
//! let matcher = parse_nodes("/^ini/")?;
//! assert_eq!(matcher.nodes(&graph, &region), vec!["init".to_string()]);
//! # Ok::<(), callscope::Error>(())
//! ```

mod parse;
mod pattern;

pub use parse::{parse_nodes, parse_path};
pub use pattern::NodeMatcher;
