//! # limiquantix VIF
//!
//! Virtual network interface plugging for VMs on a limiquantix node.
//!
//! For every guest NIC this crate produces an [`InterfaceDescriptor`] for the
//! domain XML and creates (or removes) the host devices that descriptor
//! relies on. Supported backends:
//! - **Linux bridge**
//! - **Open vSwitch**: native virtual port, hybrid (private Linux bridge +
//!   veth pair, for iptables filtering) or plain tap device
//! - **802.1Qbh** direct attach (802.1Qbg is declared but unsupported)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              VifDriver                  │
//! │   (configure, plug, unplug, unplug_all) │
//! └─────────────────────┬───────────────────┘
//!                       │ selects
//!                       ▼
//! ┌─────────────────────────────────────────┐     ┌──────────────┐
//! │         VifBackend strategies           │────▶│ ControlPlane │
//! └─────────────────────┬───────────────────┘     └──────────────┘
//!                       │
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌───────────────────┐     ┌───────────────────┐
//! │   NetDevDriver    │     │    Provisioner    │
//! │ (bridge, enslave) │     │ (veth, tap, OVS)  │
//! └─────────┬─────────┘     └─────────┬─────────┘
//!           └─────────────┬───────────┘
//!                         ▼
//!               ┌───────────────────┐
//!               │  CommandExecutor  │
//!               └───────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use limiquantix_vif::{MockHost, StaticControlPlane, VifConfig, VifDriver};
//!
//! let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
//! let driver = VifDriver::new(VifConfig::default(), host.netdev(), host.clone())?;
//!
//! let conn = StaticControlPlane::default();
//! let desc = driver.configure(&instance, &vif, &conn)?;
//! driver.plug(&instance, &vif, &conn)?;
//! println!("{}", desc.to_xml());
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod exec;
#[cfg(feature = "libvirt")]
pub mod libvirt;
pub mod mock;
pub mod netdev;
pub mod network;
pub mod traits;
pub mod types;
pub mod vif;
mod xml;

pub use config::{DriverMode, VifConfig, VirtType, DEFAULT_CONFIG_PATH};
pub use descriptor::{DirectMode, InterfaceDescriptor, NetType, Param};
pub use error::{Result, VifError};
pub use exec::{CommandExecutor, CommandOutput, SystemExecutor};
pub use mock::MockHost;
pub use netdev::{host_driver, resolve_driver, DeviceProbe, NetDevDriver, OpOutcome, SysfsProbe};
pub use network::{DeviceNames, LinkState, Provisioner};
pub use traits::{ControlPlane, StaticControlPlane, LIBVIRT_OVS_VPORT_VERSION};
pub use types::{BackendBinding, BackendKind, Instance, Network, PortMapping, RawPortMapping, Vif};
pub use vif::{
    select_ovs_strategy,
    LegacyDriver,
    StrategyKind,
    UnplugFailure,
    VifBackend,
    VifDriver,
};

#[cfg(feature = "libvirt")]
pub use libvirt::LibvirtControlPlane;
