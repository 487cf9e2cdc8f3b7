//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// limiquantix VIF control - plug and unplug VM network interfaces
#[derive(Parser, Debug)]
#[command(name = "limiquantix-vifctl")]
#[command(about = "limiquantix VIF control - plug and unplug VM network interfaces")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Libvirt connection URI (e.g., qemu:///system)
    #[arg(long)]
    pub libvirt_uri: Option<String>,

    /// Use a fixed control-plane version instead of asking libvirt
    #[arg(long)]
    pub lib_version: Option<u64>,

    /// Firewall driver (overrides the config file)
    #[arg(long)]
    pub firewall_driver: Option<String>,

    /// Enable development mode (in-memory host, nothing is changed)
    #[arg(long)]
    pub dev: bool,

    /// UUID of the VM owning the VIFs
    #[arg(long, env = "LIMIQUANTIX_INSTANCE_UUID")]
    pub instance_uuid: Option<String>,

    /// Name of the VM owning the VIFs
    #[arg(long, env = "LIMIQUANTIX_INSTANCE_NAME")]
    pub instance_name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the interface descriptor for each VIF
    Configure {
        /// VIF document (YAML or JSON; one VIF or a list)
        vifs: PathBuf,

        /// Print libvirt <interface> XML instead of JSON
        #[arg(long)]
        xml: bool,
    },

    /// Create the host devices for each VIF
    Plug {
        /// VIF document (YAML or JSON; one VIF or a list)
        vifs: PathBuf,
    },

    /// Remove the host devices for each VIF
    Unplug {
        /// VIF document (YAML or JSON; one VIF or a list)
        vifs: PathBuf,
    },

    /// Print the host device names derived from a port id
    Naming {
        /// Backend port id (uuid)
        port_id: String,

        /// Explicit guest-facing device name
        #[arg(long)]
        devname: Option<String>,
    },
}
