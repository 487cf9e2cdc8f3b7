//! Hypervisor control-plane abstraction.

use tracing::debug;

use crate::error::Result;

/// Libvirt version (as `major * 1_000_000 + minor * 1_000 + micro`) from
/// which OVS virtual ports can be expressed natively in domain XML.
pub const LIBVIRT_OVS_VPORT_VERSION: u64 = 9011;

/// Queryable view of the hypervisor control connection.
pub trait ControlPlane: Send + Sync {
    /// Library version of the control connection.
    fn lib_version(&self) -> Result<u64>;
}

/// Control plane reporting a fixed version. Used for tests and `--dev` runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticControlPlane {
    version: u64,
}

impl StaticControlPlane {
    pub fn new(version: u64) -> Self {
        Self { version }
    }
}

impl Default for StaticControlPlane {
    fn default() -> Self {
        Self::new(LIBVIRT_OVS_VPORT_VERSION)
    }
}

impl ControlPlane for StaticControlPlane {
    fn lib_version(&self) -> Result<u64> {
        debug!(version = self.version, "Static control plane version");
        Ok(self.version)
    }
}

/// Split a packed library version into `major.minor.micro`.
pub fn format_lib_version(version: u64) -> String {
    format!(
        "{}.{}.{}",
        version / 1_000_000,
        (version / 1_000) % 1_000,
        version % 1_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_control_plane() {
        assert_eq!(StaticControlPlane::new(8000).lib_version().unwrap(), 8000);
        assert_eq!(
            StaticControlPlane::default().lib_version().unwrap(),
            LIBVIRT_OVS_VPORT_VERSION
        );
    }

    #[test]
    fn test_format_lib_version() {
        assert_eq!(format_lib_version(LIBVIRT_OVS_VPORT_VERSION), "0.9.11");
        assert_eq!(format_lib_version(8_000_000), "8.0.0");
    }
}
