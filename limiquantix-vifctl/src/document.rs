//! VIF documents: one VIF or a list, in YAML or JSON.

use std::path::Path;

use anyhow::{Context, Result};
use limiquantix_vif::{BackendKind, MockHost, Vif};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VifDocument {
    Many(Vec<Vif>),
    One(Box<Vif>),
}

/// Parse VIFs from YAML or JSON text.
pub fn parse_vifs(content: &str) -> Result<Vec<Vif>> {
    let doc: VifDocument = serde_yaml::from_str(content).context("Failed to parse VIF document")?;
    Ok(match doc {
        VifDocument::Many(vifs) => vifs,
        VifDocument::One(vif) => vec![*vif],
    })
}

/// Load VIFs from a file.
pub fn load_vifs<P: AsRef<Path>>(path: P) -> Result<Vec<Vif>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read VIF document: {}", path.display()))?;
    parse_vifs(&content).with_context(|| format!("Invalid VIF document: {}", path.display()))
}

/// In-memory host holding the bridges and uplinks `vifs` expect to exist.
pub fn dev_host(vifs: &[Vif]) -> MockHost {
    vifs.iter().fold(MockHost::new(), |host, vif| {
        let host = match vif.mapping.kind() {
            BackendKind::Ovs => host.with_ovs_bridge(&vif.network.bridge),
            _ => host,
        };
        match &vif.network.bridge_interface {
            Some(iface) => host.with_device(iface),
            None => host,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"
network:
  bridge: br-int
mapping:
  mac: "fa:16:3e:00:00:01"
  port_id: p1
  vif_type: ovs
"#;

    #[test]
    fn test_single_vif() {
        let vifs = parse_vifs(ONE).unwrap();
        assert_eq!(vifs.len(), 1);
        assert_eq!(vifs[0].mapping.port_id, "p1");
    }

    #[test]
    fn test_vif_list_as_json() {
        let json = r#"[
            {"network": {"bridge": "br100"},
             "mapping": {"mac": "fa:16:3e:00:00:02", "port_id": "p2", "vif_type": "bridge"}},
            {"network": {"bridge": "br-int"},
             "mapping": {"mac": "fa:16:3e:00:00:03", "port_id": "p3", "vif_type": "ovs"}}
        ]"#;
        let vifs = parse_vifs(json).unwrap();
        assert_eq!(vifs.len(), 2);
        assert_eq!(vifs[1].mapping.kind(), BackendKind::Ovs);
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let yaml = r#"
network:
  bridge: br-int
mapping:
  mac: "fa:16:3e:00:00:01"
  port_id: p1
"#;
        assert!(parse_vifs(yaml).is_err());
    }

    #[test]
    fn test_dev_host_seeds_bridges() {
        use limiquantix_vif::{CommandExecutor, DeviceProbe};

        let mut vifs = parse_vifs(ONE).unwrap();
        vifs[0].network.bridge_interface = Some("eth1".to_string());

        let host = dev_host(&vifs);
        assert!(host
            .execute(&["ovs-vsctl", "list-ports", "br-int"], true, true)
            .is_ok());
        assert!(host.exists("eth1"));
    }
}
