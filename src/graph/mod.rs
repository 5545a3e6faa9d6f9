//! The call-graph store and its query surface.
//!
//! # Key Components
//!
//! - [`CallGraph`] - the concurrent store itself
//! - [`Node`] - one function or function-pointer slot
//! - [`EdgeKind`] - call edges versus reference edges
//! - [`GraphConfig`] - behavioural knobs
//!
//! Rendering ([`CallGraph::to_dot`]) and automaton-driven path search
//! ([`CallGraph::paths`]) live in submodules and attach to the store as
//! inherent methods.

mod dot;
mod node;
mod paths;
mod store;

pub use dot::escape_dot;
pub use node::{Location, Node};
pub use store::{CallGraph, EdgeKind, GraphConfig};
