//! OVS (Open vSwitch) port manager.
//!
//! This module handles:
//! - Checking whether a port is already on a bridge
//! - Adding VIF devices to the integration bridge with the external_ids the
//!   OVS agent uses to bind them (iface-id, attached-mac, vm-uuid)
//! - Removing ports, tolerating ones that are already gone

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::netdev::OpOutcome;

/// Default `ovs-vsctl --timeout` in seconds.
pub const DEFAULT_OVS_VSCTL_TIMEOUT: u64 = 120;

/// OVS port manager.
#[derive(Clone)]
pub struct OvsPortManager {
    executor: Arc<dyn CommandExecutor>,
    /// Seconds `ovs-vsctl` waits for ovsdb before giving up
    timeout_secs: u64,
}

impl OvsPortManager {
    /// Create a new OVS port manager.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            timeout_secs: DEFAULT_OVS_VSCTL_TIMEOUT,
        }
    }

    /// Create a new OVS port manager with a custom ovsdb timeout.
    pub fn with_timeout(executor: Arc<dyn CommandExecutor>, timeout_secs: u64) -> Self {
        Self {
            executor,
            timeout_secs,
        }
    }

    fn vsctl(&self, args: &[&str]) -> Result<String> {
        let timeout = format!("--timeout={}", self.timeout_secs);
        let mut argv = vec!["ovs-vsctl", timeout.as_str()];
        argv.extend_from_slice(args);
        Ok(self.executor.execute(&argv, true, true)?.stdout)
    }

    /// Is `port` attached to `bridge`?
    pub fn port_exists(&self, bridge: &str, port: &str) -> Result<bool> {
        let stdout = self.vsctl(&["list-ports", bridge])?;
        Ok(stdout.lines().any(|line| line.trim() == port))
    }

    /// Attach `dev` to `bridge`, recording the VIF identity in external_ids.
    ///
    /// Skips the add when the port is already there.
    #[instrument(skip(self))]
    pub fn ensure_port(
        &self,
        bridge: &str,
        dev: &str,
        port_id: &str,
        mac: &str,
        owner_id: &str,
    ) -> Result<OpOutcome> {
        if self.port_exists(bridge, dev).map_err(|e| e.on_device(bridge))? {
            debug!(bridge = %bridge, port = %dev, "OVS port already exists");
            return Ok(OpOutcome::AlreadySatisfied);
        }

        let iface_id = format!("external-ids:iface-id={}", port_id);
        let attached_mac = format!("external-ids:attached-mac={}", mac);
        let vm_uuid = format!("external-ids:vm-uuid={}", owner_id);

        self.vsctl(&[
            "--", "--may-exist", "add-port", bridge, dev,
            "--", "set", "Interface", dev,
            &iface_id,
            "external-ids:iface-status=active",
            &attached_mac,
            &vm_uuid,
        ])
        .map_err(|e| e.on_device(dev))?;

        info!(bridge = %bridge, port = %dev, port_id = %port_id, "OVS port created");
        Ok(OpOutcome::Applied)
    }

    /// Detach `dev` from `bridge`. Missing ports are not an error.
    #[instrument(skip(self))]
    pub fn delete_port(&self, bridge: &str, dev: &str) -> Result<()> {
        self.vsctl(&["--", "--if-exists", "del-port", bridge, dev])
            .map_err(|e| e.on_device(dev))?;
        debug!(bridge = %bridge, port = %dev, "OVS port removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;

    #[test]
    fn test_ensure_port_sets_external_ids() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let ovs = OvsPortManager::new(host.clone());

        let outcome = ovs
            .ensure_port("br-int", "tap0", "port-123", "fa:16:3e:aa:bb:cc", "vm-456")
            .unwrap();
        assert_eq!(outcome, OpOutcome::Applied);

        let ids = host.ovs_external_ids("tap0");
        assert_eq!(ids.get("iface-id").map(String::as_str), Some("port-123"));
        assert_eq!(ids.get("iface-status").map(String::as_str), Some("active"));
        assert_eq!(ids.get("attached-mac").map(String::as_str), Some("fa:16:3e:aa:bb:cc"));
        assert_eq!(ids.get("vm-uuid").map(String::as_str), Some("vm-456"));
    }

    #[test]
    fn test_ensure_port_is_idempotent() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let ovs = OvsPortManager::with_timeout(host.clone(), 5);

        ovs.ensure_port("br-int", "tap0", "p", "m", "o").unwrap();
        let second = ovs.ensure_port("br-int", "tap0", "p", "m", "o").unwrap();
        assert_eq!(second, OpOutcome::AlreadySatisfied);

        let adds = host
            .commands()
            .iter()
            .filter(|c| c.contains("add-port"))
            .count();
        assert_eq!(adds, 1);
        assert!(host.commands().iter().all(|c| c.starts_with("ovs-vsctl --timeout=5")));
    }

    #[test]
    fn test_missing_bridge_is_device_error() {
        let host = Arc::new(MockHost::new());
        let ovs = OvsPortManager::new(host);
        let err = ovs.ensure_port("br-int", "tap0", "p", "m", "o").unwrap_err();
        assert_eq!(err.device(), Some("br-int"));
    }

    #[test]
    fn test_delete_missing_port() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let ovs = OvsPortManager::new(host);
        assert!(ovs.delete_port("br-int", "tap0").is_ok());
    }
}
