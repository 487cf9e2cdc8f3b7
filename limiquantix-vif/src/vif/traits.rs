//! VIF backend trait definition.

use std::fmt;

use serde::Serialize;

use crate::descriptor::InterfaceDescriptor;
use crate::error::Result;
use crate::types::{Instance, Vif};

/// Concrete plugging strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Guest NIC on a Linux bridge
    LinuxBridge,
    /// Tap device registered directly on the OVS bridge
    OvsEthernet,
    /// Libvirt-managed OVS virtual port
    OvsBridge,
    /// Private Linux bridge + veth pair into OVS (for iptables filtering)
    OvsHybrid,
    /// 802.1Qbh direct attach
    Direct8021Qbh,
    /// 802.1Qbg direct attach
    Direct8021Qbg,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::LinuxBridge => "linux-bridge",
            StrategyKind::OvsEthernet => "ovs-ethernet",
            StrategyKind::OvsBridge => "ovs-bridge",
            StrategyKind::OvsHybrid => "ovs-hybrid",
            StrategyKind::Direct8021Qbh => "direct-8021qbh",
            StrategyKind::Direct8021Qbg => "direct-8021qbg",
        }
    }

    /// Every strategy, in registration order.
    pub fn all() -> [StrategyKind; 6] {
        [
            StrategyKind::LinuxBridge,
            StrategyKind::OvsEthernet,
            StrategyKind::OvsBridge,
            StrategyKind::OvsHybrid,
            StrategyKind::Direct8021Qbh,
            StrategyKind::Direct8021Qbg,
        ]
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// VIF backend trait - implemented by each plugging strategy.
///
/// The [`VifDriver`](super::VifDriver) selects a backend per VIF and routes
/// configure/plug/unplug to it. Plug and unplug of one backend are inverses
/// over host state.
pub trait VifBackend: Send + Sync {
    /// The strategy this backend implements.
    fn kind(&self) -> StrategyKind;

    /// Build the interface descriptor for the guest NIC.
    ///
    /// Pure: never touches the host.
    fn build_descriptor(&self, instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor>;

    /// Create the host devices the descriptor refers to.
    ///
    /// Must succeed when replayed over devices created by an earlier plug.
    fn plug(&self, instance: &Instance, vif: &Vif) -> Result<()>;

    /// Remove what `plug` created.
    ///
    /// Must not fail merely because a device is already gone.
    fn unplug(&self, instance: &Instance, vif: &Vif) -> Result<()>;
}
