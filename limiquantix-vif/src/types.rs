//! Data model: networks, port mappings and the VIFs built from them.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnetwork::{Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VifError};
use crate::network::naming::LINUX_DEV_LEN;

/// Logical network a VIF is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Network ID (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Human readable label (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Bridge the VIF lands on (Linux bridge or OVS integration bridge)
    pub bridge: String,
    /// Physical interface bridged into `bridge`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_interface: Option<String>,
    /// IPv4 subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<Ipv4Network>,
    /// IPv6 subnet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr_v6: Option<Ipv6Network>,
    /// Multi-host networks have their bridge managed elsewhere
    #[serde(default)]
    pub multi_host: bool,
    /// VLAN tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
}

impl Network {
    /// Create a network bound to the given bridge.
    pub fn new(bridge: impl Into<String>) -> Self {
        Self {
            id: None,
            label: None,
            bridge: bridge.into(),
            bridge_interface: None,
            cidr: None,
            cidr_v6: None,
            multi_host: false,
            vlan: None,
        }
    }
}

/// Host networking technology a VIF port is realized on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Linux bridge
    Bridge,
    /// Open vSwitch
    Ovs,
    /// 802.1Qbh direct attach
    Direct8021Qbh,
    /// 802.1Qbg direct attach
    Direct8021Qbg,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Bridge => "bridge",
            BackendKind::Ovs => "ovs",
            BackendKind::Direct8021Qbh => "802.1qbh",
            BackendKind::Direct8021Qbg => "802.1qbg",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = VifError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bridge" => Ok(BackendKind::Bridge),
            "ovs" => Ok(BackendKind::Ovs),
            "802.1qbh" | "direct-qbh" => Ok(BackendKind::Direct8021Qbh),
            "802.1qbg" | "direct-qbg" => Ok(BackendKind::Direct8021Qbg),
            _ => Err(VifError::UnknownBackendKind(s.to_string())),
        }
    }
}

/// Backend-specific part of a port mapping.
///
/// Fields only exist on the variant they are meaningful for, so a bridge
/// mapping can never carry virtual-port parameters and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendBinding {
    Bridge {
        should_create_bridge: bool,
        should_create_vlan: bool,
    },
    Ovs,
    Direct8021Qbh {
        phys_dev: String,
        profile_id: Option<String>,
    },
    Direct8021Qbg {
        phys_dev: String,
        manager_id: Option<String>,
        type_id: Option<String>,
        type_id_version: Option<String>,
        instance_id: Option<String>,
    },
}

impl BackendBinding {
    /// The backend kind this binding belongs to.
    pub fn kind(&self) -> BackendKind {
        match self {
            BackendBinding::Bridge { .. } => BackendKind::Bridge,
            BackendBinding::Ovs => BackendKind::Ovs,
            BackendBinding::Direct8021Qbh { .. } => BackendKind::Direct8021Qbh,
            BackendBinding::Direct8021Qbg { .. } => BackendKind::Direct8021Qbg,
        }
    }
}

/// Per-VIF port attributes.
///
/// Deserializes from the flat [`RawPortMapping`] form and is validated on the
/// way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortMapping", into = "RawPortMapping")]
pub struct PortMapping {
    /// Guest MAC address
    pub mac: String,
    /// Fixed IPs assigned to the port, primary first
    pub ips: Vec<IpAddr>,
    /// Backend port identifier (uuid)
    pub port_id: String,
    /// Explicit host device name
    pub devname: Option<String>,
    /// DHCP server for the port's subnet
    pub dhcp_server: Option<IpAddr>,
    /// IPv6 gateway, used as router-advertisement source
    pub gateway_v6: Option<IpAddr>,
    /// Backend kind and its fields
    pub backend: BackendBinding,
}

impl PortMapping {
    /// Create a mapping with no IPs and no optional fields.
    pub fn new(mac: impl Into<String>, port_id: impl Into<String>, backend: BackendBinding) -> Self {
        Self {
            mac: mac.into(),
            ips: Vec::new(),
            port_id: port_id.into(),
            devname: None,
            dhcp_server: None,
            gateway_v6: None,
            backend,
        }
    }

    /// Add a fixed IP.
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ips.push(ip);
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Whether plug should create the network bridge. Only bridge mappings can ask.
    pub fn should_create_bridge(&self) -> bool {
        matches!(self.backend, BackendBinding::Bridge { should_create_bridge: true, .. })
    }

    /// Whether plug should create a VLAN interface under the bridge.
    pub fn should_create_vlan(&self) -> bool {
        matches!(self.backend, BackendBinding::Bridge { should_create_vlan: true, .. })
    }

    /// Check field consistency. Called by the `RawPortMapping` conversion.
    pub fn validate(&self) -> Result<()> {
        if self.port_id.trim().is_empty() {
            return Err(VifError::InvalidMapping("port id must not be empty".to_string()));
        }
        if self.mac.trim().is_empty() {
            return Err(VifError::InvalidMapping(format!(
                "port {} has no MAC address",
                self.port_id
            )));
        }
        if let Some(dev) = &self.devname {
            if dev.is_empty() || dev.chars().count() > LINUX_DEV_LEN {
                return Err(VifError::InvalidMapping(format!(
                    "device name '{}' must be 1-{} characters",
                    dev, LINUX_DEV_LEN
                )));
            }
        }
        match &self.backend {
            BackendBinding::Direct8021Qbh { phys_dev, .. }
            | BackendBinding::Direct8021Qbg { phys_dev, .. }
                if phys_dev.is_empty() =>
            {
                Err(VifError::InvalidMapping(format!(
                    "{} port {} requires a physical device",
                    self.kind(),
                    self.port_id
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Loosely-typed wire form of a port mapping.
///
/// Every backend-specific field is optional here; converting into
/// [`PortMapping`] rejects combinations that disagree with `vif_type`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPortMapping {
    pub mac: String,
    #[serde(default)]
    pub ips: Vec<IpAddr>,
    #[serde(alias = "vif_uuid")]
    pub port_id: String,
    #[serde(default, alias = "vif_devname", skip_serializing_if = "Option::is_none")]
    pub devname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_server: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_v6: Option<IpAddr>,
    #[serde(default)]
    pub vif_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_create_bridge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_create_vlan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phys_dev: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vport_params: BTreeMap<String, String>,
}

const QBH_PARAMS: &[&str] = &["profileid"];
const QBG_PARAMS: &[&str] = &["managerid", "typeid", "typeidversion", "instanceid"];

impl RawPortMapping {
    fn reject_fields(&self, kind: BackendKind, bridge_flags: bool, direct_fields: bool) -> Result<()> {
        if bridge_flags && (self.should_create_bridge.is_some() || self.should_create_vlan.is_some()) {
            return Err(VifError::InvalidMapping(format!(
                "{} port {} must not set bridge/vlan creation flags",
                kind, self.port_id
            )));
        }
        if direct_fields && (self.phys_dev.is_some() || !self.vport_params.is_empty()) {
            return Err(VifError::InvalidMapping(format!(
                "{} port {} must not carry virtual-port fields",
                kind, self.port_id
            )));
        }
        Ok(())
    }

    fn check_vport_params(&self, kind: BackendKind, allowed: &[&str]) -> Result<()> {
        match self.vport_params.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(VifError::InvalidMapping(format!(
                "virtual-port parameter '{}' is not valid for {}",
                key, kind
            ))),
            None => Ok(()),
        }
    }

    fn phys_dev(&self, kind: BackendKind) -> Result<String> {
        self.phys_dev.clone().ok_or_else(|| {
            VifError::InvalidMapping(format!(
                "{} port {} requires a physical device",
                kind, self.port_id
            ))
        })
    }
}

impl TryFrom<RawPortMapping> for PortMapping {
    type Error = VifError;

    fn try_from(raw: RawPortMapping) -> Result<Self> {
        let kind: BackendKind = raw
            .vif_type
            .as_deref()
            .ok_or(VifError::MissingBackendKind)?
            .parse()?;

        let backend = match kind {
            BackendKind::Bridge => {
                raw.reject_fields(kind, false, true)?;
                BackendBinding::Bridge {
                    should_create_bridge: raw.should_create_bridge.unwrap_or(false),
                    should_create_vlan: raw.should_create_vlan.unwrap_or(false),
                }
            }
            BackendKind::Ovs => {
                raw.reject_fields(kind, true, true)?;
                BackendBinding::Ovs
            }
            BackendKind::Direct8021Qbh => {
                raw.reject_fields(kind, true, false)?;
                raw.check_vport_params(kind, QBH_PARAMS)?;
                BackendBinding::Direct8021Qbh {
                    phys_dev: raw.phys_dev(kind)?,
                    profile_id: raw.vport_params.get("profileid").cloned(),
                }
            }
            BackendKind::Direct8021Qbg => {
                raw.reject_fields(kind, true, false)?;
                raw.check_vport_params(kind, QBG_PARAMS)?;
                let param = |key: &str| raw.vport_params.get(key).cloned();
                BackendBinding::Direct8021Qbg {
                    phys_dev: raw.phys_dev(kind)?,
                    manager_id: param("managerid"),
                    type_id: param("typeid"),
                    type_id_version: param("typeidversion"),
                    instance_id: param("instanceid"),
                }
            }
        };

        let mapping = PortMapping {
            mac: raw.mac,
            ips: raw.ips,
            port_id: raw.port_id,
            devname: raw.devname,
            dhcp_server: raw.dhcp_server,
            gateway_v6: raw.gateway_v6,
            backend,
        };
        mapping.validate()?;
        Ok(mapping)
    }
}

impl From<PortMapping> for RawPortMapping {
    fn from(mapping: PortMapping) -> Self {
        let mut raw = RawPortMapping {
            mac: mapping.mac,
            ips: mapping.ips,
            port_id: mapping.port_id,
            devname: mapping.devname,
            dhcp_server: mapping.dhcp_server,
            gateway_v6: mapping.gateway_v6,
            vif_type: Some(mapping.backend.kind().as_str().to_string()),
            ..Default::default()
        };

        match mapping.backend {
            BackendBinding::Bridge { should_create_bridge, should_create_vlan } => {
                raw.should_create_bridge = Some(should_create_bridge);
                raw.should_create_vlan = Some(should_create_vlan);
            }
            BackendBinding::Ovs => {}
            BackendBinding::Direct8021Qbh { phys_dev, profile_id } => {
                raw.phys_dev = Some(phys_dev);
                if let Some(id) = profile_id {
                    raw.vport_params.insert("profileid".to_string(), id);
                }
            }
            BackendBinding::Direct8021Qbg {
                phys_dev,
                manager_id,
                type_id,
                type_id_version,
                instance_id,
            } => {
                raw.phys_dev = Some(phys_dev);
                let params = [
                    ("managerid", manager_id),
                    ("typeid", type_id),
                    ("typeidversion", type_id_version),
                    ("instanceid", instance_id),
                ];
                for (key, value) in params {
                    if let Some(value) = value {
                        raw.vport_params.insert(key.to_string(), value);
                    }
                }
            }
        }
        raw
    }
}

/// A virtual network interface: the network plus the port mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vif {
    pub network: Network,
    pub mapping: PortMapping,
}

impl Vif {
    pub fn new(network: Network, mapping: PortMapping) -> Self {
        Self { network, mapping }
    }
}

/// The VM owning a VIF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// VM UUID, recorded as the OVS port owner
    pub uuid: String,
    /// VM name, used in traffic filter names
    pub name: String,
}

impl Instance {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(vif_type: Option<&str>) -> RawPortMapping {
        RawPortMapping {
            mac: "fa:16:3e:aa:bb:cc".to_string(),
            port_id: "abcd1234".to_string(),
            vif_type: vif_type.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("bridge".parse::<BackendKind>().unwrap(), BackendKind::Bridge);
        assert_eq!("OVS".parse::<BackendKind>().unwrap(), BackendKind::Ovs);
        assert_eq!("802.1Qbh".parse::<BackendKind>().unwrap(), BackendKind::Direct8021Qbh);
        assert_eq!("direct-qbg".parse::<BackendKind>().unwrap(), BackendKind::Direct8021Qbg);
        assert!(matches!(
            "midonet".parse::<BackendKind>(),
            Err(VifError::UnknownBackendKind(k)) if k == "midonet"
        ));
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let err = PortMapping::try_from(raw(None)).unwrap_err();
        assert!(matches!(err, VifError::MissingBackendKind));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_bridge_mapping_flags() {
        let mut r = raw(Some("bridge"));
        r.should_create_bridge = Some(true);
        let mapping = PortMapping::try_from(r).unwrap();
        assert!(mapping.should_create_bridge());
        assert!(!mapping.should_create_vlan());
    }

    #[test]
    fn test_ovs_mapping_rejects_bridge_flags() {
        let mut r = raw(Some("ovs"));
        r.should_create_vlan = Some(true);
        assert!(matches!(PortMapping::try_from(r), Err(VifError::InvalidMapping(_))));
    }

    #[test]
    fn test_bridge_mapping_rejects_vport_params() {
        let mut r = raw(Some("bridge"));
        r.vport_params.insert("profileid".to_string(), "p1".to_string());
        assert!(matches!(PortMapping::try_from(r), Err(VifError::InvalidMapping(_))));
    }

    #[test]
    fn test_qbh_requires_phys_dev() {
        let r = raw(Some("802.1qbh"));
        assert!(matches!(PortMapping::try_from(r), Err(VifError::InvalidMapping(_))));

        let mut r = raw(Some("802.1qbh"));
        r.phys_dev = Some("eth0".to_string());
        r.vport_params.insert("profileid".to_string(), "prof-1".to_string());
        let mapping = PortMapping::try_from(r).unwrap();
        assert_eq!(
            mapping.backend,
            BackendBinding::Direct8021Qbh {
                phys_dev: "eth0".to_string(),
                profile_id: Some("prof-1".to_string()),
            }
        );
    }

    #[test]
    fn test_qbh_rejects_qbg_params() {
        let mut r = raw(Some("802.1qbh"));
        r.phys_dev = Some("eth0".to_string());
        r.vport_params.insert("managerid".to_string(), "1".to_string());
        assert!(matches!(PortMapping::try_from(r), Err(VifError::InvalidMapping(_))));
    }

    #[test]
    fn test_overlong_devname_is_rejected() {
        let mut r = raw(Some("ovs"));
        r.devname = Some("tap-way-too-long-name".to_string());
        assert!(matches!(PortMapping::try_from(r), Err(VifError::InvalidMapping(_))));
    }

    #[test]
    fn test_vif_yaml_parsing() {
        let yaml = r#"
network:
  bridge: br100
  bridge_interface: eth1
  cidr: 10.0.0.0/24
  vlan: 100
mapping:
  mac: "fa:16:3e:11:22:33"
  ips: ["10.0.0.5"]
  vif_uuid: "3f2a9c1e-0000-4000-8000-000000000001"
  dhcp_server: 10.0.0.1
  vif_type: bridge
  should_create_bridge: true
  should_create_vlan: true
"#;
        let vif: Vif = serde_yaml::from_str(yaml).expect("Failed to parse VIF");
        assert_eq!(vif.network.bridge, "br100");
        assert_eq!(vif.network.vlan, Some(100));
        assert_eq!(vif.mapping.port_id, "3f2a9c1e-0000-4000-8000-000000000001");
        assert!(vif.mapping.should_create_vlan());
        assert_eq!(vif.mapping.ips.len(), 1);
    }

    #[test]
    fn test_invalid_vif_yaml_fails_to_parse() {
        let yaml = r#"
network:
  bridge: br-int
mapping:
  mac: "fa:16:3e:11:22:33"
  port_id: "p1"
  vif_type: ovs
  phys_dev: eth0
"#;
        assert!(serde_yaml::from_str::<Vif>(yaml).is_err());
    }
}
