//! Configuration management for the VIF control tool.

use std::path::Path;

use anyhow::{Context, Result};
use limiquantix_vif::VifConfig;
use serde::Deserialize;

use crate::cli::Args;

/// Default libvirt connection URI.
pub const DEFAULT_LIBVIRT_URI: &str = "qemu:///system";

/// Main configuration structure.
///
/// The VIF driver settings sit at the top level so the same file can be
/// handed to `VifConfig::load`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// VIF driver configuration
    #[serde(flatten)]
    pub vif: VifConfig,
    /// Control plane connection configuration
    pub control_plane: ControlPlaneConfig,
}

/// Control plane connection configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Libvirt connection URI
    pub libvirt_uri: String,
    /// Fixed control-plane version (skips the libvirt query)
    pub lib_version: Option<u64>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            libvirt_uri: DEFAULT_LIBVIRT_URI.to_string(),
            lib_version: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?;

        Ok(config)
    }

    /// Load the configuration at `path` if the file exists.
    ///
    /// Only a missing file yields `None`; a file that cannot be read or
    /// parsed is an error.
    pub fn load_if_present<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.libvirt_uri {
            self.control_plane.libvirt_uri = uri.clone();
        }

        if let Some(version) = args.lib_version {
            self.control_plane.lib_version = Some(version);
        }

        if let Some(ref firewall) = args.firewall_driver {
            self.vif.firewall_driver = firewall.clone();
        }

        self
    }

    /// Check the merged configuration.
    pub fn validate(&self) -> Result<()> {
        self.vif.validate().context("Invalid VIF configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_load_flattened_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vif.yaml");
        std::fs::write(
            &path,
            r#"
firewall_driver: noop
ovs_vsctl_timeout_secs: 30
control_plane:
  lib_version: 9011
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.vif.firewall_driver, "noop");
        assert_eq!(config.vif.ovs_vsctl_timeout_secs, 30);
        assert_eq!(config.control_plane.lib_version, Some(9011));
        assert_eq!(config.control_plane.libvirt_uri, DEFAULT_LIBVIRT_URI);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::load("/nonexistent/vif.yaml").is_err());
    }

    #[test]
    fn test_load_if_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vif.yaml");
        assert!(Config::load_if_present(&path).unwrap().is_none());

        std::fs::write(&path, "firewall_driver: noop\n").unwrap();
        let config = Config::load_if_present(&path).unwrap().unwrap();
        assert!(!config.vif.firewall_required());
    }

    #[test]
    fn test_malformed_config_is_not_replaced_by_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vif.yaml");
        std::fs::write(&path, "firewall_driver: [noop]\n").unwrap();

        assert!(Config::load_if_present(&path).is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "limiquantix-vifctl",
            "--libvirt-uri",
            "qemu+ssh://node2/system",
            "--firewall-driver",
            "noop",
            "naming",
            "abcd1234",
        ])
        .unwrap();

        let config = Config::default().with_cli_overrides(&args);
        assert_eq!(config.control_plane.libvirt_uri, "qemu+ssh://node2/system");
        assert!(!config.vif.firewall_required());
        assert_eq!(config.control_plane.lib_version, None);
    }

    #[test]
    fn test_validate_rejects_unknown_driver() {
        let mut config = Config::default();
        config.vif.vif_driver = "SomeOtherDriver".to_string();
        assert!(config.validate().is_err());
    }
}
