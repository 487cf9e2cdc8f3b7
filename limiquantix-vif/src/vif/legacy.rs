//! Deprecated driver names.
//!
//! Each legacy name pins one strategy regardless of the VIF's backend kind.
//! Using one logs a deprecation warning, once per name per process.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::warn;

use super::StrategyKind;
use crate::config::GENERIC_VIF_DRIVER;
use crate::error::VifError;

static WARNED: Lazy<Mutex<HashSet<LegacyDriver>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Deprecated VIF driver configured by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyDriver {
    LibvirtBridge,
    QuantumLinuxBridge,
    OpenVswitch,
    HybridOvsBridge,
    OpenVswitchVirtualPort,
}

impl LegacyDriver {
    pub fn all() -> [LegacyDriver; 5] {
        [
            LegacyDriver::LibvirtBridge,
            LegacyDriver::QuantumLinuxBridge,
            LegacyDriver::OpenVswitch,
            LegacyDriver::HybridOvsBridge,
            LegacyDriver::OpenVswitchVirtualPort,
        ]
    }

    /// Configured driver name.
    pub fn name(&self) -> &'static str {
        match self {
            LegacyDriver::LibvirtBridge => "LibvirtBridgeDriver",
            LegacyDriver::QuantumLinuxBridge => "QuantumLinuxBridgeVIFDriver",
            LegacyDriver::OpenVswitch => "LibvirtOpenVswitchDriver",
            LegacyDriver::HybridOvsBridge => "LibvirtHybridOVSBridgeDriver",
            LegacyDriver::OpenVswitchVirtualPort => "LibvirtOpenVswitchVirtualPortDriver",
        }
    }

    /// The strategy this name stands for.
    pub fn strategy(&self) -> StrategyKind {
        match self {
            LegacyDriver::LibvirtBridge | LegacyDriver::QuantumLinuxBridge => StrategyKind::LinuxBridge,
            LegacyDriver::OpenVswitch => StrategyKind::OvsEthernet,
            LegacyDriver::HybridOvsBridge => StrategyKind::OvsHybrid,
            LegacyDriver::OpenVswitchVirtualPort => StrategyKind::OvsBridge,
        }
    }

    /// Log the deprecation warning the first time this name is used.
    ///
    /// Returns whether the warning was emitted by this call.
    pub fn warn_deprecated(&self) -> bool {
        let first = match WARNED.lock() {
            Ok(mut warned) => warned.insert(*self),
            Err(poisoned) => poisoned.into_inner().insert(*self),
        };
        if first {
            warn!(
                driver = %self.name(),
                strategy = %self.strategy(),
                "VIF driver {} is deprecated, use vif_driver: {} instead",
                self.name(),
                GENERIC_VIF_DRIVER
            );
        }
        first
    }
}

impl fmt::Display for LegacyDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LegacyDriver {
    type Err = VifError;

    /// Accepts the bare class name or a dotted path ending in it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.rsplit('.').next().unwrap_or(s);
        LegacyDriver::all()
            .into_iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| VifError::Config(format!("Unknown vif_driver '{}'", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        let cases = [
            ("LibvirtBridgeDriver", StrategyKind::LinuxBridge),
            ("QuantumLinuxBridgeVIFDriver", StrategyKind::LinuxBridge),
            ("LibvirtOpenVswitchDriver", StrategyKind::OvsEthernet),
            ("LibvirtHybridOVSBridgeDriver", StrategyKind::OvsHybrid),
            ("LibvirtOpenVswitchVirtualPortDriver", StrategyKind::OvsBridge),
        ];
        for (name, strategy) in cases {
            let driver: LegacyDriver = name.parse().unwrap();
            assert_eq!(driver.strategy(), strategy);
            assert_eq!(driver.to_string(), name);
        }
    }

    #[test]
    fn test_dotted_path() {
        let driver: LegacyDriver = "nova.virt.libvirt.vif.LibvirtOpenVswitchDriver".parse().unwrap();
        assert_eq!(driver, LegacyDriver::OpenVswitch);
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            "LibvirtFancyDriver".parse::<LegacyDriver>(),
            Err(VifError::Config(_))
        ));
    }

    #[test]
    fn test_warns_once() {
        LegacyDriver::QuantumLinuxBridge.warn_deprecated();
        assert!(!LegacyDriver::QuantumLinuxBridge.warn_deprecated());
    }
}
