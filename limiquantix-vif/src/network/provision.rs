//! Host device provisioning: bridges, VLAN interfaces, veth pairs, tap
//! devices and OVS ports.
//!
//! Every `ensure_*` call checks for the target first and skips creation when
//! it is already there, so a plug can be replayed over partial state.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::ovs::OvsPortManager;
use crate::error::Result;
use crate::exec::CommandExecutor;
use crate::netdev::{NetDevDriver, OpOutcome};

/// Administrative state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the VLAN interface for tag `vlan`.
pub fn vlan_interface_name(vlan: u16) -> String {
    format!("vlan{}", vlan)
}

/// Creates and removes the host devices a VIF strategy needs.
#[derive(Clone)]
pub struct Provisioner {
    netdev: Arc<dyn NetDevDriver>,
    executor: Arc<dyn CommandExecutor>,
    ovs: OvsPortManager,
}

impl Provisioner {
    pub fn new(
        netdev: Arc<dyn NetDevDriver>,
        executor: Arc<dyn CommandExecutor>,
        ovs_timeout_secs: u64,
    ) -> Self {
        let ovs = OvsPortManager::with_timeout(executor.clone(), ovs_timeout_secs);
        Self {
            netdev,
            executor,
            ovs,
        }
    }

    pub fn netdev(&self) -> &Arc<dyn NetDevDriver> {
        &self.netdev
    }

    fn ip_link(&self, args: &[&str], device: &str) -> Result<()> {
        let mut argv = vec!["ip", "link"];
        argv.extend_from_slice(args);
        self.executor
            .execute(&argv, true, true)
            .map_err(|e| e.on_device(device))?;
        Ok(())
    }

    /// Create `bridge` if missing and bring it up, then enslave `iface`.
    ///
    /// An interface already on a bridge is left where it is.
    #[instrument(skip(self))]
    pub fn ensure_bridge(&self, bridge: &str, iface: Option<&str>) -> Result<OpOutcome> {
        let outcome = if self.netdev.exists(bridge) {
            debug!(bridge = %bridge, "Bridge already exists");
            OpOutcome::AlreadySatisfied
        } else {
            self.netdev.create_bridge(bridge)?;
            self.set_link_state(bridge, LinkState::Up)?;
            OpOutcome::Applied
        };

        if let Some(iface) = iface {
            self.set_link_state(iface, LinkState::Up)?;
            self.netdev.add_to_bridge(bridge, iface, true)?;
        }

        Ok(outcome)
    }

    /// Create VLAN interface `vlan<id>` on `iface` if missing and bring it up.
    ///
    /// Returns the VLAN interface name.
    #[instrument(skip(self))]
    pub fn ensure_vlan(&self, vlan: u16, iface: &str) -> Result<String> {
        let name = vlan_interface_name(vlan);
        if self.netdev.exists(&name) {
            debug!(interface = %name, "VLAN interface already exists");
            return Ok(name);
        }

        let id = vlan.to_string();
        self.ip_link(
            &["add", "link", iface, "name", &name, "type", "vlan", "id", &id],
            &name,
        )?;
        self.set_link_state(&name, LinkState::Up)?;
        info!(interface = %name, parent = %iface, vlan = vlan, "VLAN interface created");
        Ok(name)
    }

    /// Ensure a VLAN interface on `iface` and a bridge carrying it.
    ///
    /// Returns the VLAN interface name.
    pub fn ensure_vlan_bridge(&self, vlan: u16, bridge: &str, iface: &str) -> Result<String> {
        let vlan_iface = self.ensure_vlan(vlan, iface)?;
        self.ensure_bridge(bridge, Some(&vlan_iface))?;
        Ok(vlan_iface)
    }

    /// Create the veth pair `a`/`b`, both ends up and promiscuous.
    ///
    /// A lone leftover half of a previous pair is removed first.
    #[instrument(skip(self))]
    pub fn ensure_veth_pair(&self, a: &str, b: &str) -> Result<OpOutcome> {
        let (a_exists, b_exists) = (self.netdev.exists(a), self.netdev.exists(b));
        if a_exists && b_exists {
            debug!(veth = %a, peer = %b, "Veth pair already exists");
            return Ok(OpOutcome::AlreadySatisfied);
        }
        if a_exists {
            self.delete_link(a)?;
        }
        if b_exists {
            self.delete_link(b)?;
        }

        self.ip_link(&["add", a, "type", "veth", "peer", "name", b], a)?;
        for dev in [a, b] {
            self.set_link_state(dev, LinkState::Up)?;
            self.ip_link(&["set", dev, "promisc", "on"], dev)?;
        }

        info!(veth = %a, peer = %b, "Veth pair created");
        Ok(OpOutcome::Applied)
    }

    /// Create tap device `dev` if missing and bring it up.
    #[instrument(skip(self))]
    pub fn create_tap_dev(&self, dev: &str) -> Result<OpOutcome> {
        if self.netdev.exists(dev) {
            debug!(device = %dev, "Tap device already exists");
            return Ok(OpOutcome::AlreadySatisfied);
        }

        self.executor
            .execute(&["ip", "tuntap", "add", "dev", dev, "mode", "tap"], true, true)
            .map_err(|e| e.on_device(dev))?;
        self.set_link_state(dev, LinkState::Up)?;

        info!(device = %dev, "Tap device created");
        Ok(OpOutcome::Applied)
    }

    pub fn set_link_state(&self, dev: &str, state: LinkState) -> Result<()> {
        self.ip_link(&["set", dev, state.as_str()], dev)?;
        debug!(device = %dev, state = %state, "Link state set");
        Ok(())
    }

    /// Delete link `dev`. A missing link is [`OpOutcome::AlreadySatisfied`].
    #[instrument(skip(self))]
    pub fn delete_link(&self, dev: &str) -> Result<OpOutcome> {
        if !self.netdev.exists(dev) {
            debug!(device = %dev, "Link already gone");
            return Ok(OpOutcome::AlreadySatisfied);
        }
        self.ip_link(&["delete", dev], dev)?;
        info!(device = %dev, "Link deleted");
        Ok(OpOutcome::Applied)
    }

    /// Register `dev` on OVS bridge `bridge` for port `port_id`.
    pub fn ensure_ovs_port(
        &self,
        bridge: &str,
        dev: &str,
        port_id: &str,
        mac: &str,
        owner_id: &str,
    ) -> Result<OpOutcome> {
        self.ovs.ensure_port(bridge, dev, port_id, mac, owner_id)
    }

    /// Remove `dev` from OVS bridge `bridge` and delete the link.
    pub fn delete_ovs_port(&self, bridge: &str, dev: &str) -> Result<OpOutcome> {
        self.ovs.delete_port(bridge, dev)?;
        self.delete_link(dev)
    }
}
