//! VIF plugging strategies and the dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          VifDriver                              │
//! │  - Selects a strategy from the VIF's backend kind               │
//! │  - Consults the control-plane version for OVS                   │
//! └─────────────────────────┬───────────────────────────────────────┘
//!                           │
//!     ┌──────────────┬──────┴───────┬──────────────┬──────────────┐
//!     ▼              ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌──────────┐
//! │ Linux   │  │    OVS    │  │    OVS    │  │    OVS    │  │ 802.1Qbh │
//! │ Bridge  │◀─│  Hybrid   │  │  Native   │  │ Ethernet  │  │ 802.1Qbg │
//! └─────────┘  └───────────┘  └───────────┘  └───────────┘  └──────────┘
//! ```
//!
//! Unplug re-runs the same selection as plug. A VIF plugged under one
//! configuration or control-plane version and unplugged under another is
//! torn down by the other strategy.

mod bridge;
mod direct;
mod legacy;
mod ovs;
mod traits;

pub use bridge::*;
pub use direct::*;
pub use legacy::*;
pub use ovs::*;
pub use traits::*;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::config::{DriverMode, VifConfig, VirtType};
use crate::descriptor::{InterfaceDescriptor, NetType};
use crate::error::{Result, VifError};
use crate::exec::CommandExecutor;
use crate::netdev::NetDevDriver;
use crate::network::Provisioner;
use crate::traits::{ControlPlane, LIBVIRT_OVS_VPORT_VERSION};
use crate::types::{BackendKind, Instance, PortMapping, Vif};

/// OVS strategy for the given firewall requirement and control-plane version.
pub fn select_ovs_strategy(firewall_required: bool, lib_version: u64) -> StrategyKind {
    if firewall_required {
        StrategyKind::OvsHybrid
    } else if lib_version >= LIBVIRT_OVS_VPORT_VERSION {
        StrategyKind::OvsBridge
    } else {
        StrategyKind::OvsEthernet
    }
}

/// Descriptor with the guest frontend (MAC, NIC model, driver hint) filled in.
pub(crate) fn base_descriptor(config: &VifConfig, net_type: NetType, mapping: &PortMapping) -> InterfaceDescriptor {
    let mut desc = InterfaceDescriptor::new(net_type, &mapping.mac);

    if matches!(config.virt_type, VirtType::Kvm | VirtType::Qemu) && config.use_virtio_for_bridges {
        desc.model = Some("virtio".to_string());
        // vhost would otherwise be enabled for a plain QEMU guest
        if config.virt_type == VirtType::Qemu {
            desc.driver_hint = Some("qemu".to_string());
        }
    }
    desc
}

/// A VIF that `unplug_all` could not tear down.
#[derive(Debug)]
pub struct UnplugFailure {
    pub port_id: String,
    pub error: VifError,
}

/// VIF driver that routes each VIF to its plugging strategy.
pub struct VifDriver {
    config: Arc<VifConfig>,
    mode: DriverMode,
    backends: HashMap<StrategyKind, Arc<dyn VifBackend>>,
}

impl VifDriver {
    /// Create a driver with every strategy registered.
    pub fn new(
        config: VifConfig,
        netdev: Arc<dyn NetDevDriver>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        config.validate()?;
        let mode = config.driver_mode()?;
        let config = Arc::new(config);
        let provisioner = Provisioner::new(netdev, executor, config.ovs_vsctl_timeout_secs);

        let linux_bridge = Arc::new(LinuxBridgeBackend::new(config.clone(), provisioner.clone()));

        let mut backends: HashMap<StrategyKind, Arc<dyn VifBackend>> = HashMap::new();
        backends.insert(StrategyKind::LinuxBridge, linux_bridge.clone());
        backends.insert(
            StrategyKind::OvsEthernet,
            Arc::new(OvsEthernetBackend::new(config.clone(), provisioner.clone())),
        );
        backends.insert(StrategyKind::OvsBridge, Arc::new(OvsBridgeBackend::new(config.clone())));
        backends.insert(
            StrategyKind::OvsHybrid,
            Arc::new(OvsHybridBackend::new(linux_bridge, provisioner)),
        );
        backends.insert(
            StrategyKind::Direct8021Qbh,
            Arc::new(Direct8021QbhBackend::new(config.clone())),
        );
        backends.insert(StrategyKind::Direct8021Qbg, Arc::new(Direct8021QbgBackend::new()));

        if let DriverMode::Legacy(legacy) = mode {
            legacy.warn_deprecated();
        }

        info!(
            vif_driver = %config.vif_driver,
            firewall_driver = %config.firewall_driver,
            virt_type = %config.virt_type,
            "VIF driver initialized"
        );

        Ok(Self {
            config,
            mode,
            backends,
        })
    }

    pub fn config(&self) -> &VifConfig {
        &self.config
    }

    /// Get the backend for a strategy.
    fn get_backend(&self, kind: StrategyKind) -> Result<Arc<dyn VifBackend>> {
        self.backends
            .get(&kind)
            .cloned()
            .ok_or_else(|| VifError::Internal(format!("No backend registered for strategy {}", kind)))
    }

    /// Strategy `configure`/`plug`/`unplug` would use for `vif`.
    ///
    /// Only OVS mappings without a firewall query the control plane.
    pub fn select_strategy(&self, vif: &Vif, conn: &dyn ControlPlane) -> Result<StrategyKind> {
        if let DriverMode::Legacy(legacy) = self.mode {
            legacy.warn_deprecated();
            return Ok(legacy.strategy());
        }

        let strategy = match vif.mapping.kind() {
            BackendKind::Bridge => StrategyKind::LinuxBridge,
            BackendKind::Ovs => {
                if self.config.firewall_required() {
                    StrategyKind::OvsHybrid
                } else {
                    select_ovs_strategy(false, conn.lib_version()?)
                }
            }
            BackendKind::Direct8021Qbh => StrategyKind::Direct8021Qbh,
            BackendKind::Direct8021Qbg => StrategyKind::Direct8021Qbg,
        };

        debug!(
            port_id = %vif.mapping.port_id,
            vif_type = %vif.mapping.kind(),
            strategy = %strategy,
            "Selected VIF strategy"
        );
        Ok(strategy)
    }

    fn backend_for(&self, vif: &Vif, conn: &dyn ControlPlane) -> Result<Arc<dyn VifBackend>> {
        self.get_backend(self.select_strategy(vif, conn)?)
    }

    /// Build the interface descriptor for `vif`.
    #[instrument(skip_all, fields(instance = %instance.name, port_id = %vif.mapping.port_id))]
    pub fn configure(&self, instance: &Instance, vif: &Vif, conn: &dyn ControlPlane) -> Result<InterfaceDescriptor> {
        let backend = self.backend_for(vif, conn)?;
        let desc = backend.build_descriptor(instance, vif)?;
        debug!(strategy = %backend.kind(), net_type = %desc.net_type.as_str(), "VIF configured");
        Ok(desc)
    }

    /// Create the host devices for `vif`.
    #[instrument(skip_all, fields(instance = %instance.name, port_id = %vif.mapping.port_id))]
    pub fn plug(&self, instance: &Instance, vif: &Vif, conn: &dyn ControlPlane) -> Result<()> {
        let backend = self.backend_for(vif, conn)?;
        backend.plug(instance, vif)?;
        info!(strategy = %backend.kind(), "VIF plugged");
        Ok(())
    }

    /// Remove the host devices for `vif`.
    #[instrument(skip_all, fields(instance = %instance.name, port_id = %vif.mapping.port_id))]
    pub fn unplug(&self, instance: &Instance, vif: &Vif, conn: &dyn ControlPlane) -> Result<()> {
        let backend = self.backend_for(vif, conn)?;
        backend.unplug(instance, vif)?;
        info!(strategy = %backend.kind(), "VIF unplugged");
        Ok(())
    }

    /// Unplug every VIF of an instance, continuing past failures.
    #[instrument(skip_all, fields(instance = %instance.name, vifs = vifs.len()))]
    pub fn unplug_all(&self, instance: &Instance, vifs: &[Vif], conn: &dyn ControlPlane) -> Vec<UnplugFailure> {
        let mut failures = Vec::new();
        for vif in vifs {
            if let Err(error) = self.unplug(instance, vif, conn) {
                warn!(port_id = %vif.mapping.port_id, error = %error, "Failed to unplug VIF");
                failures.push(UnplugFailure {
                    port_id: vif.mapping.port_id.clone(),
                    error,
                });
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockHost;
    use crate::traits::StaticControlPlane;
    use crate::types::{BackendBinding, Network};

    /// Control plane whose version query always fails.
    struct FailingControlPlane;

    impl ControlPlane for FailingControlPlane {
        fn lib_version(&self) -> Result<u64> {
            Err(VifError::ControlPlane("not connected".to_string()))
        }
    }

    fn driver(config: VifConfig) -> (Arc<MockHost>, VifDriver) {
        let host = Arc::new(MockHost::new().with_ovs_bridge("br-int"));
        let driver = VifDriver::new(config, host.netdev(), host.clone()).unwrap();
        (host, driver)
    }

    fn noop_firewall() -> VifConfig {
        VifConfig {
            firewall_driver: "noop".to_string(),
            ..Default::default()
        }
    }

    fn vif(backend: BackendBinding) -> Vif {
        Vif::new(
            Network::new("br-int"),
            PortMapping::new("fa:16:3e:aa:bb:cc", "abcd1234", backend),
        )
    }

    fn instance() -> Instance {
        Instance::new("vm-uuid-1", "vm1")
    }

    #[test]
    fn test_ovs_decision_table() {
        let cases = [
            (true, 0, StrategyKind::OvsHybrid),
            (true, 9010, StrategyKind::OvsHybrid),
            (true, 9011, StrategyKind::OvsHybrid),
            (true, 8_000_000, StrategyKind::OvsHybrid),
            (false, 0, StrategyKind::OvsEthernet),
            (false, 9010, StrategyKind::OvsEthernet),
            (false, 9011, StrategyKind::OvsBridge),
            (false, 8_000_000, StrategyKind::OvsBridge),
        ];
        for (firewall, version, expected) in cases {
            assert_eq!(
                select_ovs_strategy(firewall, version),
                expected,
                "firewall={} version={}",
                firewall,
                version
            );
        }
    }

    #[test]
    fn test_select_strategy_for_ovs() {
        let (_, with_fw) = driver(VifConfig::default());
        let (_, without_fw) = driver(noop_firewall());
        let ovs = vif(BackendBinding::Ovs);

        // Firewall decides without asking the control plane
        assert_eq!(
            with_fw.select_strategy(&ovs, &FailingControlPlane).unwrap(),
            StrategyKind::OvsHybrid
        );
        assert_eq!(
            without_fw.select_strategy(&ovs, &StaticControlPlane::new(9011)).unwrap(),
            StrategyKind::OvsBridge
        );
        assert_eq!(
            without_fw.select_strategy(&ovs, &StaticControlPlane::new(9010)).unwrap(),
            StrategyKind::OvsEthernet
        );
        assert!(matches!(
            without_fw.select_strategy(&ovs, &FailingControlPlane),
            Err(VifError::ControlPlane(_))
        ));
    }

    #[test]
    fn test_select_strategy_for_other_kinds() {
        let (_, driver) = driver(VifConfig::default());
        let cases = [
            (
                BackendBinding::Bridge {
                    should_create_bridge: false,
                    should_create_vlan: false,
                },
                StrategyKind::LinuxBridge,
            ),
            (
                BackendBinding::Direct8021Qbh {
                    phys_dev: "eth0".to_string(),
                    profile_id: None,
                },
                StrategyKind::Direct8021Qbh,
            ),
            (
                BackendBinding::Direct8021Qbg {
                    phys_dev: "eth0".to_string(),
                    manager_id: None,
                    type_id: None,
                    type_id_version: None,
                    instance_id: None,
                },
                StrategyKind::Direct8021Qbg,
            ),
        ];
        for (backend, expected) in cases {
            assert_eq!(
                driver.select_strategy(&vif(backend), &FailingControlPlane).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_legacy_driver_pins_strategy() {
        let config = VifConfig {
            vif_driver: "LibvirtOpenVswitchDriver".to_string(),
            ..Default::default()
        };
        let (_, driver) = driver(config);
        let bridge = vif(BackendBinding::Bridge {
            should_create_bridge: false,
            should_create_vlan: false,
        });
        assert_eq!(
            driver.select_strategy(&bridge, &FailingControlPlane).unwrap(),
            StrategyKind::OvsEthernet
        );
    }

    #[test]
    fn test_every_strategy_is_registered() {
        let (_, driver) = driver(VifConfig::default());
        for kind in StrategyKind::all() {
            assert_eq!(driver.get_backend(kind).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let host = Arc::new(MockHost::new());
        let config = VifConfig {
            vif_driver: "NoSuchDriver".to_string(),
            ..Default::default()
        };
        let err = VifDriver::new(config, host.netdev(), host.clone()).err().unwrap();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_guest_frontend() {
        let mapping = PortMapping::new("fa:16:3e:aa:bb:cc", "p", BackendBinding::Ovs);

        let kvm = base_descriptor(&VifConfig::default(), NetType::Bridge, &mapping);
        assert_eq!(kvm.model.as_deref(), Some("virtio"));
        assert_eq!(kvm.driver_hint, None);

        let qemu = VifConfig {
            virt_type: VirtType::Qemu,
            ..Default::default()
        };
        let desc = base_descriptor(&qemu, NetType::Bridge, &mapping);
        assert_eq!(desc.model.as_deref(), Some("virtio"));
        assert_eq!(desc.driver_hint.as_deref(), Some("qemu"));

        let xen = VifConfig {
            virt_type: VirtType::Xen,
            ..Default::default()
        };
        let desc = base_descriptor(&xen, NetType::Bridge, &mapping);
        assert_eq!(desc.model, None);
        assert_eq!(desc.driver_hint, None);

        let no_virtio = VifConfig {
            use_virtio_for_bridges: false,
            virt_type: VirtType::Qemu,
            ..Default::default()
        };
        let desc = base_descriptor(&no_virtio, NetType::Bridge, &mapping);
        assert_eq!(desc.model, None);
        assert_eq!(desc.driver_hint, None);
    }

    #[test]
    fn test_configure_routes_to_strategy() {
        let (host, driver) = driver(noop_firewall());
        let desc = driver
            .configure(&instance(), &vif(BackendBinding::Ovs), &StaticControlPlane::new(9011))
            .unwrap();
        assert_eq!(desc.virtual_port_type.as_deref(), Some("openvswitch"));
        assert!(host.commands().is_empty());
    }

    #[test]
    fn test_unplug_all_continues_past_failures() {
        let (host, driver) = driver(VifConfig::default());
        let qbg = vif(BackendBinding::Direct8021Qbg {
            phys_dev: "eth0".to_string(),
            manager_id: None,
            type_id: None,
            type_id_version: None,
            instance_id: None,
        });
        let ovs = vif(BackendBinding::Ovs);
        let conn = StaticControlPlane::default();

        driver.plug(&instance(), &ovs, &conn).unwrap();
        let failures = driver.unplug_all(&instance(), &[qbg, ovs], &conn);

        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0].error, VifError::Unsupported(_)));
        assert!(host.link("qbrabcd1234").is_none());
        assert!(host.ovs_ports("br-int").is_empty());
    }
}
