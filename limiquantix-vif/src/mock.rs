//! In-memory host network namespace for testing and development.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{Result, VifError};
use crate::exec::{check_output, render_command, CommandExecutor, CommandOutput};
use crate::netdev::{DeviceProbe, LinuxNetDev, NetDevDriver};

/// Kind of a simulated link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Physical,
    Bridge,
    Veth { peer: String },
    Tap,
    Vlan { parent: String, id: u16 },
}

/// A simulated network device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockLink {
    pub kind: LinkKind,
    pub up: bool,
    pub promisc: bool,
    /// Linux bridge this link is enslaved to
    pub master: Option<String>,
}

impl MockLink {
    fn new(kind: LinkKind) -> Self {
        Self {
            kind,
            up: false,
            promisc: false,
            master: None,
        }
    }
}

#[derive(Default)]
struct HostState {
    links: BTreeMap<String, MockLink>,
    /// OVS bridge -> ports
    ovs_bridges: BTreeMap<String, BTreeSet<String>>,
    /// OVS interface -> external_ids
    ovs_external_ids: BTreeMap<String, BTreeMap<String, String>>,
    /// Every command run, without root helper
    commands: Vec<String>,
    /// (command prefix, stderr) pairs that force a failure
    failures: Vec<(String, String)>,
}

/// Mock host for testing.
///
/// Interprets the `ip`, `brctl` and `ovs-vsctl` invocations this crate issues
/// against an in-memory namespace, answering with the same stderr text the
/// real tools print. Useful for:
/// - Unit and integration testing of plug/unplug sequences
/// - Running `limiquantix-vifctl --dev` on a workstation
pub struct MockHost {
    state: RwLock<HostState>,
}

type Answer = std::result::Result<String, String>;

impl MockHost {
    /// Create an empty host.
    pub fn new() -> Self {
        info!("Creating mock host network namespace");
        Self {
            state: RwLock::new(HostState::default()),
        }
    }

    /// Seed a physical device.
    pub fn with_device(self, name: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            let mut link = MockLink::new(LinkKind::Physical);
            link.up = true;
            state.links.insert(name.to_string(), link);
        }
        self
    }

    /// Seed an OVS bridge.
    pub fn with_ovs_bridge(self, name: &str) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.ovs_bridges.entry(name.to_string()).or_default();
        }
        self
    }

    /// Make every command starting with `prefix` fail with `stderr`.
    pub fn fail_command(&self, prefix: &str, stderr: &str) {
        if let Ok(mut state) = self.state.write() {
            state.failures.push((prefix.to_string(), stderr.to_string()));
        }
    }

    /// A netdev driver over this host, going through the Linux driver logic.
    pub fn netdev(self: &Arc<Self>) -> Arc<dyn NetDevDriver> {
        Arc::new(LinuxNetDev::new(self.clone(), self.clone()))
    }

    /// Commands run so far.
    pub fn commands(&self) -> Vec<String> {
        self.state.read().map(|s| s.commands.clone()).unwrap_or_default()
    }

    /// How many times exactly `command` was run.
    pub fn command_count(&self, command: &str) -> usize {
        self.commands().iter().filter(|c| c.as_str() == command).count()
    }

    /// Forget recorded commands.
    pub fn clear_commands(&self) {
        if let Ok(mut state) = self.state.write() {
            state.commands.clear();
        }
    }

    pub fn link(&self, name: &str) -> Option<MockLink> {
        self.state.read().ok().and_then(|s| s.links.get(name).cloned())
    }

    /// Members of a Linux bridge.
    pub fn bridge_members(&self, bridge: &str) -> Vec<String> {
        self.state
            .read()
            .map(|s| {
                s.links
                    .iter()
                    .filter(|(_, l)| l.master.as_deref() == Some(bridge))
                    .map(|(n, _)| n.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ports on an OVS bridge.
    pub fn ovs_ports(&self, bridge: &str) -> Vec<String> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.ovs_bridges.get(bridge).map(|p| p.iter().cloned().collect()))
            .unwrap_or_default()
    }

    /// external_ids recorded on an OVS interface.
    pub fn ovs_external_ids(&self, iface: &str) -> BTreeMap<String, String> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.ovs_external_ids.get(iface).cloned())
            .unwrap_or_default()
    }

    fn run(state: &mut HostState, argv: &[&str]) -> Answer {
        match argv {
            ["brctl", rest @ ..] => Self::brctl(state, rest),
            ["ip", "link", rest @ ..] => Self::ip_link(state, rest),
            ["ip", "tuntap", "add", "dev", dev, "mode", "tap"] => {
                if state.links.contains_key(*dev) {
                    return Err("ioctl(TUNSETIFF): Device or resource busy".to_string());
                }
                state.links.insert(dev.to_string(), MockLink::new(LinkKind::Tap));
                Ok(String::new())
            }
            ["ovs-vsctl", rest @ ..] => Self::ovs_vsctl(state, rest),
            _ => Err(format!("mock host: unsupported command '{}'", render_command(argv))),
        }
    }

    fn brctl(state: &mut HostState, args: &[&str]) -> Answer {
        match args {
            ["addbr", br] => {
                if state.links.contains_key(*br) {
                    return Err(format!(
                        "device {} already exists; can't create bridge with the same name",
                        br
                    ));
                }
                state.links.insert(br.to_string(), MockLink::new(LinkKind::Bridge));
                Ok(String::new())
            }
            ["delbr", br] => {
                match state.links.get(*br) {
                    Some(link) if link.kind == LinkKind::Bridge => {
                        if link.up {
                            return Err(format!("bridge {} is still up; can't delete it", br));
                        }
                    }
                    _ => return Err(format!("bridge {} doesn't exist; can't delete it", br)),
                }
                state.links.remove(*br);
                for link in state.links.values_mut() {
                    if link.master.as_deref() == Some(*br) {
                        link.master = None;
                    }
                }
                Ok(String::new())
            }
            ["addif", br, dev] => {
                if !matches!(state.links.get(*br), Some(l) if l.kind == LinkKind::Bridge) {
                    return Err(format!("bridge {} does not exist!", br));
                }
                let link = state
                    .links
                    .get_mut(*dev)
                    .ok_or_else(|| format!("interface {} does not exist!", dev))?;
                if link.master.is_some() {
                    return Err(format!(
                        "device {} is already a member of a bridge; can't enslave it to bridge {}.\n",
                        dev, br
                    ));
                }
                link.master = Some(br.to_string());
                Ok(String::new())
            }
            ["delif", br, dev] => {
                let link = state
                    .links
                    .get_mut(*dev)
                    .ok_or_else(|| format!("interface {} does not exist!", dev))?;
                if link.master.as_deref() != Some(*br) {
                    return Err(format!("device {} is not a slave of {}", dev, br));
                }
                link.master = None;
                Ok(String::new())
            }
            _ => Err(format!("mock host: unsupported brctl '{}'", args.join(" "))),
        }
    }

    fn ip_link(state: &mut HostState, args: &[&str]) -> Answer {
        fn missing(dev: &str) -> String {
            format!("Cannot find device \"{}\"", dev)
        }

        match args {
            ["add", a, "type", "veth", "peer", "name", b] => {
                if state.links.contains_key(*a) || state.links.contains_key(*b) {
                    return Err("RTNETLINK answers: File exists".to_string());
                }
                state.links.insert(a.to_string(), MockLink::new(LinkKind::Veth { peer: b.to_string() }));
                state.links.insert(b.to_string(), MockLink::new(LinkKind::Veth { peer: a.to_string() }));
                Ok(String::new())
            }
            ["add", "link", parent, "name", name, "type", "vlan", "id", id] => {
                if !state.links.contains_key(*parent) {
                    return Err(missing(parent));
                }
                if state.links.contains_key(*name) {
                    return Err("RTNETLINK answers: File exists".to_string());
                }
                let id: u16 = id.parse().map_err(|_| format!("invalid vlan id \"{}\"", id))?;
                state.links.insert(
                    name.to_string(),
                    MockLink::new(LinkKind::Vlan { parent: parent.to_string(), id }),
                );
                Ok(String::new())
            }
            ["set", dev, rest @ ..] => {
                let link = state.links.get_mut(*dev).ok_or_else(|| missing(dev))?;
                match rest {
                    ["up"] => link.up = true,
                    ["down"] => link.up = false,
                    ["promisc", "on"] => link.promisc = true,
                    ["promisc", "off"] => link.promisc = false,
                    _ => return Err(format!("mock host: unsupported ip link set '{}'", rest.join(" "))),
                }
                Ok(String::new())
            }
            ["delete", dev] | ["del", dev] => {
                let link = state.links.remove(*dev).ok_or_else(|| missing(dev))?;
                if let LinkKind::Veth { peer } = link.kind {
                    state.links.remove(&peer);
                }
                Ok(String::new())
            }
            _ => Err(format!("mock host: unsupported ip link '{}'", args.join(" "))),
        }
    }

    fn ovs_vsctl(state: &mut HostState, args: &[&str]) -> Answer {
        let args: Vec<&str> = args
            .iter()
            .copied()
            .filter(|a| !a.starts_with("--timeout"))
            .collect();

        let mut stdout = String::new();
        for group in args.split(|a| *a == "--").filter(|g| !g.is_empty()) {
            let flags: Vec<&str> = group.iter().copied().take_while(|a| a.starts_with("--")).collect();
            let command = &group[flags.len()..];
            let may_exist = flags.contains(&"--may-exist");
            let if_exists = flags.contains(&"--if-exists");

            match command {
                ["add-port", br, port] => {
                    if let Some((owner, _)) = state.ovs_bridges.iter().find(|(_, p)| p.contains(*port)) {
                        if may_exist {
                            continue;
                        }
                        return Err(format!(
                            "cannot create a port named {} because a port named {} already exists on bridge {}",
                            port, port, owner
                        ));
                    }
                    state
                        .ovs_bridges
                        .get_mut(*br)
                        .ok_or_else(|| format!("no bridge named {}", br))?
                        .insert(port.to_string());
                }
                ["del-port", br, port] => {
                    // --if-exists only covers the port, the bridge must exist
                    let ports = state
                        .ovs_bridges
                        .get_mut(*br)
                        .ok_or_else(|| format!("no bridge named {}", br))?;
                    if !ports.remove(*port) && !if_exists {
                        return Err(format!("no port named {}", port));
                    }
                    state.ovs_external_ids.remove(*port);
                }
                ["set", "Interface", iface, settings @ ..] => {
                    if !state.ovs_bridges.values().any(|p| p.contains(*iface)) {
                        return Err(format!("no row \"{}\" in table Interface", iface));
                    }
                    let ids = state.ovs_external_ids.entry(iface.to_string()).or_default();
                    for setting in settings {
                        if let Some((key, value)) = setting
                            .strip_prefix("external-ids:")
                            .or_else(|| setting.strip_prefix("external_ids:"))
                            .and_then(|kv| kv.split_once('='))
                        {
                            ids.insert(key.to_string(), value.to_string());
                        }
                    }
                }
                ["list-ports", br] => {
                    let ports = state
                        .ovs_bridges
                        .get(*br)
                        .ok_or_else(|| format!("no bridge named {}", br))?;
                    for port in ports {
                        stdout.push_str(port);
                        stdout.push('\n');
                    }
                }
                _ => return Err(format!("mock host: unsupported ovs-vsctl '{}'", command.join(" "))),
            }
        }
        Ok(stdout)
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for MockHost {
    fn execute(&self, argv: &[&str], _run_as_root: bool, check_exit_code: bool) -> Result<CommandOutput> {
        let mut state = self
            .state
            .write()
            .map_err(|_| VifError::Internal("Lock poisoned".to_string()))?;

        let command = render_command(argv);
        state.commands.push(command.clone());

        let injected = state
            .failures
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, stderr)| stderr.clone());

        let answer = match injected {
            Some(stderr) => Err(stderr),
            None => Self::run(&mut state, argv),
        };
        drop(state);

        let output = match answer {
            Ok(stdout) => CommandOutput {
                status: Some(0),
                stdout,
                stderr: String::new(),
            },
            Err(stderr) => {
                debug!(command = %command, stderr = %stderr, "Mock command failed");
                CommandOutput {
                    status: Some(1),
                    stdout: String::new(),
                    stderr,
                }
            }
        };
        check_output(argv, output, check_exit_code)
    }
}

impl DeviceProbe for MockHost {
    fn exists(&self, devname: &str) -> bool {
        self.state
            .read()
            .map(|s| s.links.contains_key(devname))
            .unwrap_or(false)
    }
}
