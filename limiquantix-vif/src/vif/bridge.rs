//! Linux bridge backend.

use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::{Ipv4Network, Ipv6Network};
use tracing::{debug, info, instrument};

use super::{base_descriptor, StrategyKind, VifBackend};
use crate::config::VifConfig;
use crate::descriptor::{InterfaceDescriptor, NetType, Param};
use crate::error::{Result, VifError};
use crate::network::{vif_dev_name, Provisioner};
use crate::types::{Instance, Vif};

/// Prefix of per-instance traffic filter names.
pub const FILTER_PREFIX: &str = "quantix-instance";

/// Traffic filter name for an instance NIC.
pub fn filter_name(instance_name: &str, mac: &str) -> String {
    format!("{}-{}-{}", FILTER_PREFIX, instance_name, mac.replace(':', ""))
}

/// Guest NIC on a Linux bridge.
pub struct LinuxBridgeBackend {
    config: Arc<VifConfig>,
    provisioner: Provisioner,
}

impl LinuxBridgeBackend {
    pub fn new(config: Arc<VifConfig>, provisioner: Provisioner) -> Self {
        Self {
            config,
            provisioner,
        }
    }

    /// Descriptor binding the VIF to `bridge`.
    ///
    /// The hybrid OVS backend reuses this with its private bridge.
    pub fn descriptor_on(&self, instance: &Instance, vif: &Vif, bridge: &str) -> InterfaceDescriptor {
        let mapping = &vif.mapping;
        let mut desc = base_descriptor(&self.config, NetType::Bridge, mapping)
            .with_bridge(bridge)
            .with_target_device(vif_dev_name(mapping));

        if self.config.firewall_required() {
            desc = desc.with_filter(
                filter_name(&instance.name, &mapping.mac),
                self.filter_params(vif),
            );
        }
        desc
    }

    fn filter_params(&self, vif: &Vif) -> Vec<Param> {
        let mapping = &vif.mapping;
        let mut params = Vec::new();

        if let Some(ip) = mapping.ips.first() {
            params.push(Param::new("IP", ip.to_string()));
        }
        if let Some(dhcp) = mapping.dhcp_server {
            params.push(Param::new("DHCPSERVER", dhcp.to_string()));
        }
        if self.config.use_ipv6 {
            if let Some(gw) = mapping.gateway_v6 {
                params.push(Param::new("RASERVER", ra_server(gw)));
            }
        }
        if self.config.allow_same_net_traffic {
            if let Some(cidr) = vif.network.cidr {
                params.extend(project_net_v4(cidr));
            }
            if self.config.use_ipv6 {
                if let Some(cidr) = vif.network.cidr_v6 {
                    params.extend(project_net_v6(cidr));
                }
            }
        }
        params
    }

    /// Interface bridged into the network bridge.
    fn bridge_interface(&self, vif: &Vif, vlan: bool) -> Option<String> {
        let configured = if vlan {
            &self.config.vlan_interface
        } else {
            &self.config.flat_interface
        };
        configured
            .clone()
            .or_else(|| vif.network.bridge_interface.clone())
    }
}

fn ra_server(gateway: IpAddr) -> String {
    format!("{}/128", gateway)
}

fn project_net_v4(cidr: Ipv4Network) -> [Param; 2] {
    [
        Param::new("PROJNET", cidr.network().to_string()),
        Param::new("PROJMASK", cidr.mask().to_string()),
    ]
}

fn project_net_v6(cidr: Ipv6Network) -> [Param; 2] {
    [
        Param::new("PROJNET6", cidr.network().to_string()),
        Param::new("PROJMASK6", cidr.prefix().to_string()),
    ]
}

impl VifBackend for LinuxBridgeBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LinuxBridge
    }

    fn build_descriptor(&self, instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor> {
        Ok(self.descriptor_on(instance, vif, &vif.network.bridge))
    }

    #[instrument(skip_all, fields(port_id = %vif.mapping.port_id, bridge = %vif.network.bridge))]
    fn plug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        let network = &vif.network;
        let mapping = &vif.mapping;

        if network.multi_host || !mapping.should_create_bridge() {
            debug!(multi_host = network.multi_host, "Bridge managed elsewhere, nothing to plug");
            return Ok(());
        }

        if mapping.should_create_vlan() {
            let vlan = network.vlan.ok_or_else(|| {
                VifError::InvalidMapping(format!(
                    "port {} asks for a VLAN but network has no VLAN id",
                    mapping.port_id
                ))
            })?;
            let iface = self.bridge_interface(vif, true).ok_or_else(|| {
                VifError::InvalidMapping(format!(
                    "port {} asks for a VLAN but no VLAN interface is configured",
                    mapping.port_id
                ))
            })?;
            info!(vlan = vlan, interface = %iface, "Ensuring VLAN bridge");
            self.provisioner.ensure_vlan_bridge(vlan, &network.bridge, &iface)?;
        } else {
            let iface = self.bridge_interface(vif, false);
            info!(interface = ?iface, "Ensuring bridge");
            self.provisioner.ensure_bridge(&network.bridge, iface.as_deref())?;
        }
        Ok(())
    }

    fn unplug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        debug!(port_id = %vif.mapping.port_id, "Linux bridge unplug is a no-op");
        Ok(())
    }
}
