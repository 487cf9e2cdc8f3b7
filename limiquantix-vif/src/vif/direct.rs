//! 802.1Qbh / 802.1Qbg direct-attach backends.
//!
//! The guest NIC is a macvtap on the physical device; the switch applies the
//! port profile, so there is nothing to create on the host.

use std::sync::Arc;

use tracing::debug;

use super::{base_descriptor, StrategyKind, VifBackend};
use crate::config::VifConfig;
use crate::descriptor::{DirectMode, InterfaceDescriptor, NetType, Param};
use crate::error::{Result, VifError};
use crate::types::{BackendBinding, BackendKind, Instance, Vif};

/// Virtual port type for 802.1Qbh port profiles.
pub const QBH_VIRTUAL_PORT_TYPE: &str = "802.1Qbh";

/// 802.1Qbh direct attach.
pub struct Direct8021QbhBackend {
    config: Arc<VifConfig>,
}

impl Direct8021QbhBackend {
    pub fn new(config: Arc<VifConfig>) -> Self {
        Self { config }
    }
}

impl VifBackend for Direct8021QbhBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct8021Qbh
    }

    fn build_descriptor(&self, _instance: &Instance, vif: &Vif) -> Result<InterfaceDescriptor> {
        let mapping = &vif.mapping;
        let BackendBinding::Direct8021Qbh { phys_dev, profile_id } = &mapping.backend else {
            return Err(VifError::InvalidMapping(format!(
                "port {} is {}, not {}",
                mapping.port_id,
                mapping.kind(),
                BackendKind::Direct8021Qbh
            )));
        };

        let params = profile_id
            .iter()
            .map(|id| Param::new("profileid", id))
            .collect();

        Ok(base_descriptor(&self.config, NetType::Direct, mapping)
            .with_direct(phys_dev, DirectMode::Private)
            .with_virtual_port(QBH_VIRTUAL_PORT_TYPE, params))
    }

    fn plug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        debug!(port_id = %vif.mapping.port_id, "802.1Qbh plug is a no-op");
        Ok(())
    }

    fn unplug(&self, _instance: &Instance, vif: &Vif) -> Result<()> {
        debug!(port_id = %vif.mapping.port_id, "802.1Qbh unplug is a no-op");
        Ok(())
    }
}

/// 802.1Qbg direct attach. Not implemented.
#[derive(Default)]
pub struct Direct8021QbgBackend;

impl Direct8021QbgBackend {
    pub fn new() -> Self {
        Self
    }

    fn unsupported<T>() -> Result<T> {
        Err(VifError::Unsupported(BackendKind::Direct8021Qbg.to_string()))
    }
}

impl VifBackend for Direct8021QbgBackend {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct8021Qbg
    }

    fn build_descriptor(&self, _instance: &Instance, _vif: &Vif) -> Result<InterfaceDescriptor> {
        Self::unsupported()
    }

    fn plug(&self, _instance: &Instance, _vif: &Vif) -> Result<()> {
        Self::unsupported()
    }

    fn unplug(&self, _instance: &Instance, _vif: &Vif) -> Result<()> {
        Self::unsupported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Network, PortMapping};

    fn qbh_vif(profile_id: Option<&str>) -> Vif {
        Vif::new(
            Network::new("br100"),
            PortMapping::new(
                "fa:16:3e:aa:bb:cc",
                "abcd1234",
                BackendBinding::Direct8021Qbh {
                    phys_dev: "eth0".to_string(),
                    profile_id: profile_id.map(str::to_string),
                },
            ),
        )
    }

    fn instance() -> Instance {
        Instance::new("vm-uuid-1", "vm1")
    }

    #[test]
    fn test_qbh_descriptor() {
        let backend = Direct8021QbhBackend::new(Arc::new(VifConfig::default()));
        let desc = backend
            .build_descriptor(&instance(), &qbh_vif(Some("prof-1")))
            .unwrap();

        assert_eq!(desc.net_type, NetType::Direct);
        assert_eq!(desc.direct_device.as_deref(), Some("eth0"));
        assert_eq!(desc.direct_mode, Some(DirectMode::Private));
        assert_eq!(desc.virtual_port_type.as_deref(), Some("802.1Qbh"));
        assert_eq!(desc.virtual_port_param("profileid"), Some("prof-1"));
        assert!(desc.bridge_name.is_none());
    }

    #[test]
    fn test_qbh_without_profile() {
        let backend = Direct8021QbhBackend::new(Arc::new(VifConfig::default()));
        let desc = backend.build_descriptor(&instance(), &qbh_vif(None)).unwrap();
        assert!(desc.virtual_port_params.is_empty());
        assert!(backend.plug(&instance(), &qbh_vif(None)).is_ok());
        assert!(backend.unplug(&instance(), &qbh_vif(None)).is_ok());
    }

    #[test]
    fn test_qbh_rejects_other_kinds() {
        let backend = Direct8021QbhBackend::new(Arc::new(VifConfig::default()));
        let vif = Vif::new(
            Network::new("br-int"),
            PortMapping::new("fa:16:3e:aa:bb:cc", "abcd1234", BackendBinding::Ovs),
        );
        assert!(matches!(
            backend.build_descriptor(&instance(), &vif),
            Err(VifError::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_qbg_is_unsupported() {
        let backend = Direct8021QbgBackend::new();
        let vif = qbh_vif(None);
        for result in [
            backend.build_descriptor(&instance(), &vif).map(|_| ()),
            backend.plug(&instance(), &vif),
            backend.unplug(&instance(), &vif),
        ] {
            let err = result.unwrap_err();
            assert!(matches!(err, VifError::Unsupported(ref k) if k == "802.1qbg"));
            assert!(err.is_configuration_error());
        }
    }
}
