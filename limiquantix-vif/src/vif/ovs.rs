//! Open vSwitch backends.
//!
//! ```text
//!  OvsEthernet        OvsBridge (native)        OvsHybrid
//!  ───────────        ──────────────────        ─────────
//!  guest              guest                     guest
//!    │ tap              │ tap (libvirt)           │ tap
//!    ▼                  ▼                         ▼
//!  br-int             br-int                    qbrXXX  (iptables here)
//!                                                 │ qvbXXX
//!                                                 │ veth
//!                                                 ▼ qvoXXX
//!                                               br-int
//! ```

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::bridge::LinuxBridgeBackend;
use super::{base_descriptor, StrategyKind, VifBackend};
use crate::config::VifConfig;
use crate::descriptor::{InterfaceDescriptor, NetType, Param};
use crate::error::Result;
use crate::network::{vif_dev_name, DeviceNames, LinkState, Provisioner};
use crate::types::{Instance, Vif};

/// Virtual port type of an OVS port managed by libvirt.
pub const OVS_VIRTUAL_PORT_TYPE: &str = "openvswitch";

/// Tap device plugged straight into the OVS bridge.
pub struct OvsEthernetBackend {
    config: Arc<VifConfig>,
    provisioner: Provisioner,
}

impl OvsEthernetBackend {
    pub fn new(config: Arc<VifConfig>, provisioner: Provisioner) -> Self {
        Self {
            config,
            provisioner,
        }
    }
}

impl VifBackend for OvsEthernetBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OvsEthernet
    }

    fn build_descriptor(&self, _instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor> {
        let mapping = &vif.mapping;
        let dev = vif_dev_name(mapping);
        let mut desc = base_descriptor(&self.config, NetType::Ethernet, mapping).with_target_device(&dev);
        desc.ovs_port_id = Some(mapping.port_id.clone());
        desc.ovs_device_name = Some(dev);
        Ok(desc)
    }

    #[instrument(skip_all, fields(port_id = %vif.mapping.port_id, bridge = %vif.network.bridge))]
    fn plug(&self, instance: &Instance, vif: &Vif) -> Result<()> {
        let dev = vif_dev_name(&vif.mapping);
        self.provisioner.create_tap_dev(&dev)?;
        self.provisioner.ensure_ovs_port(
            &vif.network.bridge,
            &dev,
            &vif.mapping.port_id,
            &vif.mapping.mac,
            &instance.uuid,
        )?;
        info!(device = %dev, "OVS ethernet VIF plugged");
        Ok(())
    }

    #[instrument(skip_all, fields(port_id = %vif.mapping.port_id, bridge = %vif.network.bridge))]
    fn unplug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        let dev = vif_dev_name(&vif.mapping);
        match self.provisioner.delete_ovs_port(&vif.network.bridge, &dev) {
            Ok(_) => info!(device = %dev, "OVS ethernet VIF unplugged"),
            Err(e) if e.is_device_error() => {
                warn!(device = %dev, error = %e, "Failed while unplugging vif");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// OVS port created and owned by libvirt (`<virtualport type='openvswitch'>`).
pub struct OvsBridgeBackend {
    config: Arc<VifConfig>,
}

impl OvsBridgeBackend {
    pub fn new(config: Arc<VifConfig>) -> Self {
        Self { config }
    }
}

impl VifBackend for OvsBridgeBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OvsBridge
    }

    fn build_descriptor(&self, _instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor> {
        let mapping = &vif.mapping;
        let dev = vif_dev_name(mapping);
        let mut desc = base_descriptor(&self.config, NetType::Bridge, mapping)
            .with_bridge(&vif.network.bridge)
            .with_target_device(&dev)
            .with_virtual_port(
                OVS_VIRTUAL_PORT_TYPE,
                vec![Param::new("interfaceid", &mapping.port_id)],
            );
        desc.ovs_port_id = Some(mapping.port_id.clone());
        desc.ovs_device_name = Some(dev);
        Ok(desc)
    }

    fn plug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        debug!(port_id = %vif.mapping.port_id, "Port is created by libvirt, nothing to plug");
        Ok(())
    }

    fn unplug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        debug!(port_id = %vif.mapping.port_id, "Port is removed by libvirt, nothing to unplug");
        Ok(())
    }
}

/// Private Linux bridge per VIF, joined to the OVS bridge with a veth pair so
/// iptables rules apply to the guest traffic.
pub struct OvsHybridBackend {
    bridge: Arc<LinuxBridgeBackend>,
    provisioner: Provisioner,
}

impl OvsHybridBackend {
    pub fn new(bridge: Arc<LinuxBridgeBackend>, provisioner: Provisioner) -> Self {
        Self {
            bridge,
            provisioner,
        }
    }

    /// Run one teardown step, logging instead of failing.
    fn teardown_step<T>(&self, step: &str, result: Result<T>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(step = %step, error = %e, "Failed while unplugging vif");
                false
            }
        }
    }
}

impl VifBackend for OvsHybridBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OvsHybrid
    }

    fn build_descriptor(&self, instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor> {
        let names = DeviceNames::for_mapping(&vif.mapping);
        Ok(self.bridge.descriptor_on(instance, vif, &names.bridge))
    }

    #[instrument(skip_all, fields(port_id = %vif.mapping.port_id, bridge = %vif.network.bridge))]
    fn plug(&self, instance: &Instance, vif: &Vif) -> Result<()> {
        let names = DeviceNames::for_mapping(&vif.mapping);
        let netdev = self.provisioner.netdev();

        if !netdev.exists(&names.bridge) {
            netdev.create_bridge(&names.bridge)?;
        }
        self.provisioner
            .ensure_veth_pair(&names.veth_bridge_side, &names.veth_ovs_side)?;
        self.provisioner.set_link_state(&names.bridge, LinkState::Up)?;
        netdev.add_to_bridge(&names.bridge, &names.veth_bridge_side, true)?;
        self.provisioner.ensure_ovs_port(
            &vif.network.bridge,
            &names.veth_ovs_side,
            &vif.mapping.port_id,
            &vif.mapping.mac,
            &instance.uuid,
        )?;

        info!(
            private_bridge = %names.bridge,
            veth = %names.veth_bridge_side,
            peer = %names.veth_ovs_side,
            "Hybrid OVS VIF plugged"
        );
        Ok(())
    }

    #[instrument(skip_all, fields(port_id = %vif.mapping.port_id, bridge = %vif.network.bridge))]
    fn unplug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        let names = DeviceNames::for_mapping(&vif.mapping);
        let netdev = self.provisioner.netdev();

        let mut clean = self.teardown_step(
            "detach veth",
            netdev.remove_from_bridge(&names.bridge, &names.veth_bridge_side),
        );

        if netdev.exists(&names.bridge) {
            clean &= self.teardown_step(
                "bridge down",
                self.provisioner.set_link_state(&names.bridge, LinkState::Down),
            );
            clean &= self.teardown_step("delete bridge", netdev.delete_bridge(&names.bridge));
        } else {
            debug!(private_bridge = %names.bridge, "Private bridge already gone");
        }

        clean &= self.teardown_step(
            "delete OVS port",
            self.provisioner
                .delete_ovs_port(&vif.network.bridge, &names.veth_ovs_side),
        );

        if clean {
            info!(private_bridge = %names.bridge, "Hybrid OVS VIF unplugged");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use crate::types::{BackendBinding, Network, PortMapping};

    fn provisioner(host: &Arc<MockHost>) -> Provisioner {
        Provisioner::new(host.netdev(), host.clone(), 120)
    }

    fn vif() -> Vif {
        Vif::new(
            Network::new("br-int"),
            PortMapping::new("fa:16:3e:aa:bb:cc", "abcd1234", BackendBinding::Ovs),
        )
    }

    fn instance() -> Instance {
        Instance::new("vm-uuid-1", "vm1")
    }

    fn hybrid(host: &Arc<MockHost>) -> OvsHybridBackend {
        let config = Arc::new(VifConfig::default());
        let prov = provisioner(host);
        OvsHybridBackend::new(
            Arc::new(LinuxBridgeBackend::new(config, prov.clone())),
            prov,
        )
    }

    #[test]
    fn test_native_descriptor() {
        let backend = OvsBridgeBackend::new(Arc::new(VifConfig::default()));
        let desc = backend.build_descriptor(&instance(), &vif()).unwrap();

        assert_eq!(desc.net_type, NetType::Bridge);
        assert_eq!(desc.bridge_name.as_deref(), Some("br-int"));
        assert_eq!(desc.virtual_port_type.as_deref(), Some("openvswitch"));
        assert_eq!(desc.virtual_port_param("interfaceid"), Some("abcd1234"));
        assert_eq!(desc.ovs_port_id.as_deref(), Some("abcd1234"));
        assert_eq!(desc.ovs_device_name.as_deref(), Some("nicabcd1234"));
        assert!(desc.filter_name.is_none());
    }

    #[test]
    fn test_ethernet_plug_unplug() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let backend = OvsEthernetBackend::new(Arc::new(VifConfig::default()), provisioner(&host));

        let desc = backend.build_descriptor(&instance(), &vif()).unwrap();
        assert_eq!(desc.net_type, NetType::Ethernet);
        assert_eq!(desc.target_device.as_deref(), Some("nicabcd1234"));

        backend.plug(&instance(), &vif()).unwrap();
        assert!(host.link("nicabcd1234").unwrap().up);
        assert_eq!(host.ovs_ports("br-int"), vec!["nicabcd1234".to_string()]);
        assert_eq!(
            host.ovs_external_ids("nicabcd1234").get("vm-uuid").map(String::as_str),
            Some("vm-uuid-1")
        );

        backend.unplug(&instance(), &vif()).unwrap();
        assert!(host.ovs_ports("br-int").is_empty());
        assert!(host.link("nicabcd1234").is_none());

        // Second unplug finds nothing to do
        backend.unplug(&instance(), &vif()).unwrap();
    }

    #[test]
    fn test_ethernet_unplug_swallows_device_errors() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let backend = OvsEthernetBackend::new(Arc::new(VifConfig::default()), provisioner(&host));
        host.fail_command("ovs-vsctl", "database connection failed (Connection refused)");

        assert!(backend.unplug(&instance(), &vif()).is_ok());
    }

    #[test]
    fn test_hybrid_descriptor_uses_private_bridge() {
        let host = Arc::new(MockHost::new());
        let desc = hybrid(&host).build_descriptor(&instance(), &vif()).unwrap();

        assert_eq!(desc.bridge_name.as_deref(), Some("qbrabcd1234"));
        assert_eq!(
            desc.filter_name.as_deref(),
            Some("quantix-instance-vm1-fa163eaabbcc")
        );
        assert!(desc.virtual_port_type.is_none());
    }

    #[test]
    fn test_hybrid_unplug_without_ovs_bridge() {
        let host = Arc::new(MockHost::new());
        let backend = hybrid(&host);
        host.netdev().create_bridge("qbrabcd1234").unwrap();

        // OVS bridge is gone: the port removal fails and is logged
        backend.unplug(&instance(), &vif()).unwrap();
        assert!(host.link("qbrabcd1234").is_none());
        assert!(host
            .commands()
            .iter()
            .any(|c| c.ends_with("--if-exists del-port br-int qvoabcd1234")));
    }

    #[test]
    fn test_hybrid_unplug_reverses_in_order() {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let backend = hybrid(&host);

        backend.plug(&instance(), &vif()).unwrap();
        host.clear_commands();
        backend.unplug(&instance(), &vif()).unwrap();

        assert_eq!(
            host.commands(),
            vec![
                "brctl delif qbrabcd1234 qvbabcd1234".to_string(),
                "ip link set qbrabcd1234 down".to_string(),
                "brctl delbr qbrabcd1234".to_string(),
                "ovs-vsctl --timeout=120 -- --if-exists del-port br-int qvoabcd1234".to_string(),
                "ip link delete qvoabcd1234".to_string(),
            ]
        );
        // Deleting the OVS side took its peer with it
        assert!(host.link("qvbabcd1234").is_none());
        assert!(host.link("qbrabcd1234").is_none());
    }
}
