//! Control plane backed by a libvirt connection.

use tracing::{info, instrument};
use virt::connect::Connect;

use crate::error::{Result, VifError};
use crate::traits::{format_lib_version, ControlPlane};

/// Libvirt connection queried for its library version.
pub struct LibvirtControlPlane {
    uri: String,
    connection: Connect,
}

impl LibvirtControlPlane {
    /// Connect to libvirt at `uri` (e.g. `qemu:///system`).
    #[instrument]
    pub fn new(uri: &str) -> Result<Self> {
        info!(uri = %uri, "Connecting to libvirt");

        let connection = Connect::open(Some(uri))
            .map_err(|e| VifError::ControlPlane(format!("Failed to connect to {}: {}", uri, e)))?;

        info!("Connected to libvirt");

        Ok(Self {
            uri: uri.to_string(),
            connection,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl ControlPlane for LibvirtControlPlane {
    fn lib_version(&self) -> Result<u64> {
        let version = self
            .connection
            .get_lib_version()
            .map_err(|e| VifError::ControlPlane(e.to_string()))?;
        let version = u64::from(version);
        info!(uri = %self.uri, version = %format_lib_version(version), "Libvirt library version");
        Ok(version)
    }
}
