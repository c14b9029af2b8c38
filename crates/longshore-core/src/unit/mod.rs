//! Unit-of-work descriptions for managed services.

pub mod builder;
pub mod spec;

pub use builder::{broker_spec, poller_spec, unit_name, worker_spec};
pub use spec::UnitSpec;
