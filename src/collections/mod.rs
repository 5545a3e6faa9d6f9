//! Concurrent containers built on the RCU quiescence primitive.
//!
//! Everything here follows one recipe: a flat slot array published through
//! a [`RcuCell`](crate::sync::RcuCell), reservation-based appends, doubling
//! growth behind a single-writer lock, and grace-period reclamation of
//! retired backings. The containers differ only in their slot layout and
//! probing discipline:
//!
//! - [`ConcurrentArray`] - the shared substrate and its [`Storage`] policy
//! - [`AppendList`] / [`IndexList`] - dense append-only storage
//! - [`IndexSet`] - open-addressed set of node indices
//! - [`StringMap`] - open-addressed string-keyed map, first writer wins
//!
//! All operations take a reader region argument; see
//! [`sync`](crate::sync) for the locking discipline.

pub mod array;
pub mod iter;
pub mod list;
pub mod map;
pub mod set;

pub use array::{ConcurrentArray, Storage, DEFAULT_CAPACITY};
pub use iter::Indices;
pub use list::{AppendList, IndexList};
pub use map::{MapValue, StringMap};
pub use set::{IndexSet, EMPTY};
