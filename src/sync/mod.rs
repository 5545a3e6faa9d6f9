//! Quiescence primitive and publish cell underlying the concurrent containers.
//!
//! # Key Components
//!
//! - [`RcuThread`] - per-thread reader registration
//! - [`RcuGuard`] - scoped reader region
//! - [`synchronize_rcu`] - grace-period barrier for storage-reclaiming writers
//! - [`RcuCell`] - atomic pointer cell with publish semantics

mod cell;
mod rcu;

pub use cell::RcuCell;
pub use rcu::{synchronize_rcu, RcuGuard, RcuThread};
