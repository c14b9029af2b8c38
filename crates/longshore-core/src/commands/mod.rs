//! Reconciliation driver: one fully-resolved desired state in, exactly one
//! node operation out, never overlapping.

pub mod context;
pub mod reconcile;

pub use context::DriverContext;
pub use reconcile::{destroy, install, start, status, stop, update};
