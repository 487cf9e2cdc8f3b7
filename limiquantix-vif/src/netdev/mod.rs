//! Platform-neutral network device operations.
//!
//! The VIF strategies only ever talk to a [`NetDevDriver`]. Exactly one
//! concrete driver is resolved per process with [`resolve_driver`] and then
//! injected into the [`VifDriver`](crate::vif::VifDriver).
//!
//! ```text
//! ┌───────────────────────────┐
//! │       NetDevDriver        │
//! │ exists / bridge / enslave │
//! └─────────────┬─────────────┘
//!               ▼
//! ┌───────────────────────────┐     ┌──────────────────┐
//! │       LinuxNetDev         │────▶│  DeviceProbe     │ (sysfs)
//! │        (brctl)            │────▶│  CommandExecutor │ (root)
//! └───────────────────────────┘     └──────────────────┘
//! ```

mod linux;

pub use linux::{LinuxNetDev, SysfsProbe};

use std::sync::Arc;

use tracing::info;

use crate::error::{Result, VifError};
use crate::exec::CommandExecutor;

/// Result of an operation that tolerates a benign race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    /// The host state was changed.
    Applied,
    /// The host was already in the requested state (already a member,
    /// already gone, already exists).
    AlreadySatisfied,
}

impl OpOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, OpOutcome::Applied)
    }
}

/// Answers whether a network device exists on the host.
pub trait DeviceProbe: Send + Sync {
    fn exists(&self, devname: &str) -> bool;
}

/// Low level network device driver.
pub trait NetDevDriver: Send + Sync {
    /// Does the device exist?
    fn exists(&self, devname: &str) -> bool;

    /// Create a Linux bridge.
    fn create_bridge(&self, brname: &str) -> Result<()>;

    /// Delete a Linux bridge. A missing bridge is [`OpOutcome::AlreadySatisfied`].
    fn delete_bridge(&self, brname: &str) -> Result<OpOutcome>;

    /// Enslave `devname` to `brname`.
    ///
    /// When `ignore_already_member` is set, "device is already a member of a
    /// bridge" is reported as [`OpOutcome::AlreadySatisfied`]; otherwise it is
    /// an error like any other failure.
    fn add_to_bridge(&self, brname: &str, devname: &str, ignore_already_member: bool) -> Result<OpOutcome>;

    /// Release `devname` from `brname`. A device that is gone or not a member
    /// is [`OpOutcome::AlreadySatisfied`].
    fn remove_from_bridge(&self, brname: &str, devname: &str) -> Result<OpOutcome>;
}

/// Resolve the netdev driver for the given OS name (as in `uname -s` or
/// `std::env::consts::OS`).
pub fn resolve_driver(
    os: &str,
    executor: Arc<dyn CommandExecutor>,
    probe: Arc<dyn DeviceProbe>,
) -> Result<Arc<dyn NetDevDriver>> {
    if os.eq_ignore_ascii_case("linux") {
        info!(os = %os, "Using Linux netdev driver");
        Ok(Arc::new(LinuxNetDev::new(executor, probe)))
    } else {
        Err(VifError::UnsupportedHost(os.to_string()))
    }
}

/// Resolve the netdev driver for the running host.
pub fn host_driver(
    executor: Arc<dyn CommandExecutor>,
    probe: Arc<dyn DeviceProbe>,
) -> Result<Arc<dyn NetDevDriver>> {
    resolve_driver(std::env::consts::OS, executor, probe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;

    #[test]
    fn test_resolve_linux() {
        let host = Arc::new(MockHost::new().with_device("eth0"));
        let driver = resolve_driver("Linux", host.clone(), host).unwrap();
        assert!(driver.exists("eth0"));
        assert!(!driver.exists("eth1"));
    }

    #[test]
    fn test_resolve_unsupported_host() {
        let host = Arc::new(MockHost::new());
        let err = resolve_driver("FreeBSD", host.clone(), host).err().unwrap();
        assert!(matches!(err, VifError::UnsupportedHost(ref os) if os == "FreeBSD"));
        assert!(err.is_configuration_error());
    }
}
