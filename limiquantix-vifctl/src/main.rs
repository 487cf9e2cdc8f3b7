//! # limiquantix VIF control
//!
//! Operator tool driving the VIF plugging core on a hypervisor host.
//!
//! ## Usage
//! ```bash
//! limiquantix-vifctl --instance-uuid $UUID --instance-name web-1 plug vifs.yaml
//! limiquantix-vifctl --dev --lib-version 9011 configure vifs.yaml --xml
//! limiquantix-vifctl naming 8e2f6d4c-1b7a-4f0e-9c3d-5a6b7c8d9e0f
//! ```

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use limiquantix_common::LogFormat;
use limiquantix_vif::{
    host_driver, BackendBinding, CommandExecutor, ControlPlane, DeviceNames, Instance,
    NetDevDriver, PortMapping, StaticControlPlane, SystemExecutor, Vif, VifDriver,
    DEFAULT_CONFIG_PATH,
};

mod cli;
mod config;
mod document;

use cli::{Args, Command};
use config::Config;

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let format = if args.log_json { LogFormat::Json } else { LogFormat::Text };
    limiquantix_common::init_logging(&args.log_level, format)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        dev = args.dev,
        "Starting limiquantix VIF control"
    );

    let config = load_config(&args)?;

    if let Err(e) = run(&args, config) {
        error!(error = %e, "Command failed");
        return Err(e);
    }
    Ok(())
}

/// Load the config file named on the command line, else the default one,
/// else built-in defaults when that file does not exist.
fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(config_path) => {
            let cfg = Config::load(config_path)?;
            info!(config_path = %config_path, "Configuration loaded");
            cfg
        }
        None => match Config::load_if_present(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Invalid config file {}", DEFAULT_CONFIG_PATH))?
        {
            Some(cfg) => {
                info!(config_path = %DEFAULT_CONFIG_PATH, "Configuration loaded from default location");
                cfg
            }
            None => {
                info!("No config file found, using CLI arguments and defaults");
                Config::default()
            }
        },
    }
    .with_cli_overrides(args);

    config.validate()?;
    Ok(config)
}

fn run(args: &Args, config: Config) -> Result<()> {
    let vifs_path = match &args.command {
        Command::Naming { port_id, devname } => return print_naming(port_id, devname.clone()),
        Command::Configure { vifs, .. } | Command::Plug { vifs } | Command::Unplug { vifs } => vifs,
    };

    let vifs = document::load_vifs(vifs_path)?;
    let instance = instance(args)?;
    let conn = control_plane(args, &config)?;
    let driver = vif_driver(args, config, &vifs)?;

    match &args.command {
        Command::Configure { xml, .. } => {
            let descriptors = vifs
                .iter()
                .map(|vif| driver.configure(&instance, vif, conn.as_ref()))
                .collect::<limiquantix_vif::Result<Vec<_>>>()?;

            if *xml {
                for desc in &descriptors {
                    print!("{}", desc.to_xml());
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&descriptors)?);
            }
        }
        Command::Plug { .. } => {
            for vif in &vifs {
                driver
                    .plug(&instance, vif, conn.as_ref())
                    .with_context(|| format!("Failed to plug port {}", vif.mapping.port_id))?;
            }
            info!(count = vifs.len(), instance = %instance.name, "VIFs plugged");
        }
        Command::Unplug { .. } => {
            let failures = driver.unplug_all(&instance, &vifs, conn.as_ref());
            if !failures.is_empty() {
                let ports: Vec<&str> = failures.iter().map(|f| f.port_id.as_str()).collect();
                bail!("Failed to unplug {} VIF(s): {}", failures.len(), ports.join(", "));
            }
            info!(count = vifs.len(), instance = %instance.name, "VIFs unplugged");
        }
        Command::Naming { .. } => {}
    }
    Ok(())
}

fn print_naming(port_id: &str, devname: Option<String>) -> Result<()> {
    let mut mapping = PortMapping::new("00:00:00:00:00:00", port_id, BackendBinding::Ovs);
    mapping.devname = devname;
    mapping.validate()?;

    println!("{}", serde_json::to_string_pretty(&DeviceNames::for_mapping(&mapping))?);
    Ok(())
}

fn instance(args: &Args) -> Result<Instance> {
    let uuid = match &args.instance_uuid {
        Some(uuid) => uuid::Uuid::parse_str(uuid)
            .with_context(|| format!("Invalid instance UUID '{}'", uuid))?,
        None if args.dev => {
            let uuid = uuid::Uuid::new_v4();
            warn!(instance_uuid = %uuid, "No instance UUID given, generated one");
            uuid
        }
        None => bail!("--instance-uuid is required"),
    };
    let name = args
        .instance_name
        .clone()
        .unwrap_or_else(|| format!("instance-{}", uuid.simple()));
    Ok(Instance::new(uuid.to_string(), name))
}

fn control_plane(args: &Args, config: &Config) -> Result<Box<dyn ControlPlane>> {
    if let Some(version) = config.control_plane.lib_version {
        info!(version = version, "Using static control-plane version");
        return Ok(Box::new(StaticControlPlane::new(version)));
    }
    if args.dev {
        return Ok(Box::new(StaticControlPlane::default()));
    }
    connect_libvirt(&config.control_plane.libvirt_uri)
}

#[cfg(feature = "libvirt")]
fn connect_libvirt(uri: &str) -> Result<Box<dyn ControlPlane>> {
    let conn = limiquantix_vif::LibvirtControlPlane::new(uri)?;
    info!(uri = %conn.uri(), "Using libvirt control plane");
    Ok(Box::new(conn))
}

#[cfg(not(feature = "libvirt"))]
fn connect_libvirt(uri: &str) -> Result<Box<dyn ControlPlane>> {
    Err(anyhow::anyhow!(
        "Cannot query libvirt at {}: built without the libvirt feature, pass --lib-version",
        uri
    ))
}

fn vif_driver(args: &Args, config: Config, vifs: &[Vif]) -> Result<VifDriver> {
    let (netdev, executor): (Arc<dyn NetDevDriver>, Arc<dyn CommandExecutor>) = if args.dev {
        info!("Development mode: using in-memory host");
        let host = Arc::new(document::dev_host(vifs));
        (host.netdev(), host)
    } else {
        let executor = Arc::new(SystemExecutor::with_root_helper(config.vif.root_helper.clone()));
        let probe = Arc::new(config.vif.sysfs_probe());
        (host_driver(executor.clone(), probe)?, executor)
    };

    Ok(VifDriver::new(config.vif, netdev, executor)?)
}
