//! Host device names derived from a VIF's port identifier.
//!
//! Every name here is a pure function of its inputs so that unplug can
//! recompute exactly the names plug created.

use serde::Serialize;

use crate::types::PortMapping;

/// Maximum length of a derived device name (kept below IFNAMSIZ).
pub const LINUX_DEV_LEN: usize = 14;

const BRIDGE_PREFIX: &str = "qbr";
const VETH_BRIDGE_PREFIX: &str = "qvb";
const VETH_OVS_PREFIX: &str = "qvo";
const NIC_PREFIX: &str = "nic";

/// Truncate a device name to [`LINUX_DEV_LEN`] characters.
pub fn truncate_dev_name(name: &str) -> String {
    name.chars().take(LINUX_DEV_LEN).collect()
}

/// Private per-VIF Linux bridge used by the hybrid OVS strategy.
pub fn bridge_name(port_id: &str) -> String {
    truncate_dev_name(&format!("{}{}", BRIDGE_PREFIX, port_id))
}

/// Veth pair names: (bridge side, OVS side).
pub fn veth_pair_names(port_id: &str) -> (String, String) {
    (
        truncate_dev_name(&format!("{}{}", VETH_BRIDGE_PREFIX, port_id)),
        truncate_dev_name(&format!("{}{}", VETH_OVS_PREFIX, port_id)),
    )
}

/// Guest-facing host device: the mapping's explicit name, else `nic<port id>`.
pub fn vif_dev_name(mapping: &PortMapping) -> String {
    mapping
        .devname
        .clone()
        .unwrap_or_else(|| truncate_dev_name(&format!("{}{}", NIC_PREFIX, mapping.port_id)))
}

/// All device names a VIF may touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceNames {
    pub vif_dev: String,
    pub bridge: String,
    pub veth_bridge_side: String,
    pub veth_ovs_side: String,
}

impl DeviceNames {
    pub fn for_mapping(mapping: &PortMapping) -> Self {
        let (veth_bridge_side, veth_ovs_side) = veth_pair_names(&mapping.port_id);
        Self {
            vif_dev: vif_dev_name(mapping),
            bridge: bridge_name(&mapping.port_id),
            veth_bridge_side,
            veth_ovs_side,
        }
    }
}
