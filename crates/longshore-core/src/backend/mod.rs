//! Service backend abstraction over the OS service manager.

pub mod systemd;

pub use systemd::SystemdBackend;

use crate::unit::UnitSpec;

/// Contract for creating and driving named units on the local OS.
///
/// Implementations must be idempotent: `start` on a running unit, `stop` on
/// a stopped unit, and `destroy` of a nonexistent unit are all no-op
/// successes. The reconciliation core leans on this to make re-driving a
/// partially failed operation safe.
pub trait ServiceBackend {
    /// Write the unit definition for `unit_name`, replacing any existing one.
    fn create(&self, unit_name: &str, spec: &UnitSpec) -> anyhow::Result<()>;

    fn start(&self, unit_name: &str) -> anyhow::Result<()>;

    fn stop(&self, unit_name: &str) -> anyhow::Result<()>;

    /// Remove the unit definition. The unit is stopped first if needed.
    fn destroy(&self, unit_name: &str) -> anyhow::Result<()>;

    fn is_running(&self, unit_name: &str) -> bool;
}
