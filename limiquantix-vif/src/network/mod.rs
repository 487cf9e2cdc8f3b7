//! Host-side network provisioning.
//!
//! - [`naming`]: deterministic device names derived from a port id
//! - [`ovs`]: Open vSwitch port management via `ovs-vsctl`
//! - [`provision`]: bridges, VLANs, veth pairs and tap devices

pub mod naming;
pub mod ovs;
pub mod provision;

pub use naming::{bridge_name, truncate_dev_name, veth_pair_names, vif_dev_name, DeviceNames, LINUX_DEV_LEN};
pub use ovs::{OvsPortManager, DEFAULT_OVS_VSCTL_TIMEOUT};
pub use provision::{vlan_interface_name, LinkState, Provisioner};
