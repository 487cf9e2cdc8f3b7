//! Interface descriptor handed to the domain-configuration layer.

use serde::{Deserialize, Serialize};

use crate::xml::InterfaceXmlBuilder;

/// How the guest NIC is connected on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    /// Pre-created tap device
    Ethernet,
    /// Linux or OVS bridge
    Bridge,
    /// macvtap on a physical device
    Direct,
}

impl NetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetType::Ethernet => "ethernet",
            NetType::Bridge => "bridge",
            NetType::Direct => "direct",
        }
    }
}

/// macvtap mode for direct attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectMode {
    Vepa,
    Bridge,
    Private,
    Passthrough,
}

impl DirectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectMode::Vepa => "vepa",
            DirectMode::Bridge => "bridge",
            DirectMode::Private => "private",
            DirectMode::Passthrough => "passthrough",
        }
    }
}

/// A named parameter (virtual port or traffic filter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: String,
}

impl Param {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Backend-specific interface configuration produced by `configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceDescriptor {
    pub net_type: NetType,
    pub mac_address: String,

    /// Guest NIC model (e.g. `virtio`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Hypervisor driver hint (e.g. `qemu`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_hint: Option<String>,
    /// Host-side device name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovs_port_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ovs_device_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_port_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub virtual_port_params: Vec<Param>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter_params: Vec<Param>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_mode: Option<DirectMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_device: Option<String>,
}

impl InterfaceDescriptor {
    /// Create a descriptor with only the connection type and MAC set.
    pub fn new(net_type: NetType, mac_address: impl Into<String>) -> Self {
        Self {
            net_type,
            mac_address: mac_address.into(),
            model: None,
            driver_hint: None,
            target_device: None,
            bridge_name: None,
            ovs_port_id: None,
            ovs_device_name: None,
            virtual_port_type: None,
            virtual_port_params: Vec::new(),
            filter_name: None,
            filter_params: Vec::new(),
            direct_mode: None,
            direct_device: None,
        }
    }

    pub fn with_target_device(mut self, dev: impl Into<String>) -> Self {
        self.target_device = Some(dev.into());
        self
    }

    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge_name = Some(bridge.into());
        self
    }

    /// Set the virtual port type and append its parameters.
    pub fn with_virtual_port(mut self, port_type: impl Into<String>, params: Vec<Param>) -> Self {
        self.virtual_port_type = Some(port_type.into());
        self.virtual_port_params.extend(params);
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, params: Vec<Param>) -> Self {
        self.filter_name = Some(name.into());
        self.filter_params = params;
        self
    }

    pub fn with_direct(mut self, device: impl Into<String>, mode: DirectMode) -> Self {
        self.direct_device = Some(device.into());
        self.direct_mode = Some(mode);
        self
    }

    /// Value of a virtual port parameter.
    pub fn virtual_port_param(&self, name: &str) -> Option<&str> {
        self.virtual_port_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Value of a traffic filter parameter.
    pub fn filter_param(&self, name: &str) -> Option<&str> {
        self.filter_params
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// Render the libvirt `<interface>` element.
    pub fn to_xml(&self) -> String {
        InterfaceXmlBuilder::new(self).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_omits_absent_fields() {
        let desc = InterfaceDescriptor::new(NetType::Bridge, "fa:16:3e:aa:bb:cc")
            .with_bridge("br100")
            .with_target_device("nicabcd1234");

        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "netType": "bridge",
                "macAddress": "fa:16:3e:aa:bb:cc",
                "targetDevice": "nicabcd1234",
                "bridgeName": "br100",
            })
        );
    }

    #[test]
    fn test_json_direct_fields() {
        let desc = InterfaceDescriptor::new(NetType::Direct, "fa:16:3e:aa:bb:cc")
            .with_direct("eth0", DirectMode::Private)
            .with_virtual_port("802.1Qbh", vec![Param::new("profileid", "prof-1")]);

        let value = serde_json::to_value(&desc).unwrap();
        assert_eq!(value["directMode"], "private");
        assert_eq!(value["directDevice"], "eth0");
        assert_eq!(value["virtualPortType"], "802.1Qbh");
        assert_eq!(value["virtualPortParams"][0]["name"], "profileid");
        assert_eq!(desc.virtual_port_param("profileid"), Some("prof-1"));
        assert_eq!(desc.virtual_port_param("typeid"), None);

        let back: InterfaceDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(back, desc);
    }
}
