//! VIF driver configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VifError};
use crate::netdev::SysfsProbe;
use crate::network::DEFAULT_OVS_VSCTL_TIMEOUT;
use crate::vif::LegacyDriver;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/vif.yaml";

/// Name of the generic (dispatching) VIF driver.
pub const GENERIC_VIF_DRIVER: &str = "generic";

/// Firewall driver names meaning "no host firewall", matched on the last
/// dotted segment.
const NOOP_FIREWALL_DRIVERS: &[&str] = &["noop", "NoopFirewallDriver"];

/// Hypervisor flavour of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VirtType {
    Kvm,
    Qemu,
    Xen,
    Lxc,
    Uml,
}

impl VirtType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VirtType::Kvm => "kvm",
            VirtType::Qemu => "qemu",
            VirtType::Xen => "xen",
            VirtType::Lxc => "lxc",
            VirtType::Uml => "uml",
        }
    }
}

impl fmt::Display for VirtType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which driver the `vif_driver` setting selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    /// Dispatch on each VIF's backend kind
    Generic,
    /// Deprecated driver pinned to one strategy
    Legacy(LegacyDriver),
}

/// VIF driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VifConfig {
    /// `generic` or a legacy driver name
    pub vif_driver: String,
    /// Host firewall driver; anything but the no-op driver requires filtering
    pub firewall_driver: String,
    pub virt_type: VirtType,
    /// Give KVM/QEMU guests a virtio NIC
    pub use_virtio_for_bridges: bool,
    pub use_ipv6: bool,
    /// Let instances on the same network talk to each other
    pub allow_same_net_traffic: bool,
    /// Interface carrying VLAN networks
    pub vlan_interface: Option<String>,
    /// Interface carrying flat networks
    pub flat_interface: Option<String>,
    /// Prefix for privileged commands
    pub root_helper: Vec<String>,
    pub ovs_vsctl_timeout_secs: u64,
    pub sysfs_root: PathBuf,
}

impl Default for VifConfig {
    fn default() -> Self {
        Self {
            vif_driver: GENERIC_VIF_DRIVER.to_string(),
            firewall_driver: "iptables".to_string(),
            virt_type: VirtType::Kvm,
            use_virtio_for_bridges: true,
            use_ipv6: false,
            allow_same_net_traffic: true,
            vlan_interface: None,
            flat_interface: None,
            root_helper: vec!["sudo".to_string()],
            ovs_vsctl_timeout_secs: DEFAULT_OVS_VSCTL_TIMEOUT,
            sysfs_root: PathBuf::from("/sys"),
        }
    }
}

impl VifConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VifError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: VifConfig = serde_yaml::from_str(content)
            .map_err(|e| VifError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the driver cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.driver_mode()?;
        if self.root_helper.iter().any(|part| part.trim().is_empty()) {
            return Err(VifError::Config(
                "root_helper must not contain empty entries".to_string(),
            ));
        }
        if self.ovs_vsctl_timeout_secs == 0 {
            return Err(VifError::Config(
                "ovs_vsctl_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve `vif_driver`.
    pub fn driver_mode(&self) -> Result<DriverMode> {
        if self.vif_driver.eq_ignore_ascii_case(GENERIC_VIF_DRIVER) {
            return Ok(DriverMode::Generic);
        }
        self.vif_driver
            .parse::<LegacyDriver>()
            .map(DriverMode::Legacy)
    }

    /// Does the configured firewall driver need traffic filtering on VIFs?
    pub fn firewall_required(&self) -> bool {
        let name = self
            .firewall_driver
            .rsplit('.')
            .next()
            .unwrap_or(&self.firewall_driver);
        !NOOP_FIREWALL_DRIVERS.contains(&name)
    }

    /// sysfs probe for the configured root.
    pub fn sysfs_probe(&self) -> SysfsProbe {
        SysfsProbe::new(&self.sysfs_root)
    }
}
