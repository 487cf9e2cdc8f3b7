//! Linux netdev driver (`brctl` + sysfs).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::{DeviceProbe, NetDevDriver, OpOutcome};
use crate::error::{Result, VifError};
use crate::exec::{render_command, CommandExecutor, CommandOutput};

/// Default sysfs mount point.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// brctl answers meaning the requested teardown already happened.
const ALREADY_GONE: &[&str] = &[
    "doesn't exist",
    "does not exist",
    "is not a slave",
    "No such device",
];

/// Device existence via `<sysfs>/class/net/<dev>`.
#[derive(Debug, Clone)]
pub struct SysfsProbe {
    root: PathBuf,
}

impl SysfsProbe {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn device_path(&self, devname: &str) -> PathBuf {
        self.root.join("class").join("net").join(devname)
    }
}

impl Default for SysfsProbe {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl DeviceProbe for SysfsProbe {
    fn exists(&self, devname: &str) -> bool {
        // A name containing a separator would escape class/net
        if devname.is_empty() || devname.contains('/') {
            return false;
        }
        Path::exists(&self.device_path(devname))
    }
}

/// Linux bridge driver.
pub struct LinuxNetDev {
    executor: Arc<dyn CommandExecutor>,
    probe: Arc<dyn DeviceProbe>,
}

impl LinuxNetDev {
    pub fn new(executor: Arc<dyn CommandExecutor>, probe: Arc<dyn DeviceProbe>) -> Self {
        Self { executor, probe }
    }

    fn brctl(&self, args: &[&str], check_exit_code: bool) -> Result<(Vec<String>, CommandOutput)> {
        let mut argv = vec!["brctl"];
        argv.extend_from_slice(args);
        let output = self.executor.execute(&argv, true, check_exit_code)?;
        Ok((argv.iter().map(|s| s.to_string()).collect(), output))
    }

    /// Map a tolerant teardown command to an outcome.
    fn teardown_outcome(argv: &[String], output: CommandOutput, device: &str) -> Result<OpOutcome> {
        if output.success() {
            return Ok(OpOutcome::Applied);
        }
        if ALREADY_GONE.iter().any(|m| output.stderr.contains(m)) {
            debug!(device = %device, stderr = %output.stderr.trim(), "Already torn down");
            return Ok(OpOutcome::AlreadySatisfied);
        }
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        Err(VifError::CommandFailed {
            command: render_command(&argv),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        }
        .on_device(device))
    }
}

impl NetDevDriver for LinuxNetDev {
    fn exists(&self, devname: &str) -> bool {
        self.probe.exists(devname)
    }

    #[instrument(skip(self))]
    fn create_bridge(&self, brname: &str) -> Result<()> {
        self.brctl(&["addbr", brname], true)
            .map_err(|e| e.on_device(brname))?;
        info!(bridge = %brname, "Bridge created");
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_bridge(&self, brname: &str) -> Result<OpOutcome> {
        let (argv, output) = self
            .brctl(&["delbr", brname], false)
            .map_err(|e| e.on_device(brname))?;
        let outcome = Self::teardown_outcome(&argv, output, brname)?;
        if outcome.is_applied() {
            info!(bridge = %brname, "Bridge deleted");
        }
        Ok(outcome)
    }

    #[instrument(skip(self))]
    fn add_to_bridge(&self, brname: &str, devname: &str, ignore_already_member: bool) -> Result<OpOutcome> {
        let (argv, output) = self
            .brctl(&["addif", brname, devname], false)
            .map_err(|e| e.on_device(devname))?;
        let stderr = output.stderr.trim();

        if output.success() && stderr.is_empty() {
            debug!(bridge = %brname, device = %devname, "Interface added to bridge");
            return Ok(OpOutcome::Applied);
        }

        let already_member = format!("device {} is already a member of a bridge", devname);
        if ignore_already_member && stderr.starts_with(&already_member) {
            debug!(
                bridge = %brname,
                device = %devname,
                "Interface already a member of a bridge"
            );
            return Ok(OpOutcome::AlreadySatisfied);
        }

        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        Err(VifError::CommandFailed {
            command: render_command(&argv),
            status: output.status,
            stderr: format!("Failed to add interface: {}", stderr),
        }
        .on_device(devname))
    }

    #[instrument(skip(self))]
    fn remove_from_bridge(&self, brname: &str, devname: &str) -> Result<OpOutcome> {
        let (argv, output) = self
            .brctl(&["delif", brname, devname], false)
            .map_err(|e| e.on_device(devname))?;
        Self::teardown_outcome(&argv, output, devname)
    }
}
