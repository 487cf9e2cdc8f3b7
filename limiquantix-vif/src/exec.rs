//! Process execution for host networking utilities.
//!
//! Every `ip`, `brctl` and `ovs-vsctl` invocation goes through a
//! [`CommandExecutor`], so tests can swap the real host for
//! [`MockHost`](crate::mock::MockHost).

use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Result, VifError};

/// Captured result of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit status (None if killed by a signal)
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Capability to run a command on the host.
pub trait CommandExecutor: Send + Sync {
    /// Run `argv`.
    ///
    /// With `run_as_root` the command is prefixed by the root helper. With
    /// `check_exit_code` a non-zero exit becomes [`VifError::CommandFailed`];
    /// without it the caller inspects the returned output.
    fn execute(&self, argv: &[&str], run_as_root: bool, check_exit_code: bool) -> Result<CommandOutput>;
}

/// Render an argv for logs and error messages.
pub fn render_command(argv: &[&str]) -> String {
    argv.join(" ")
}

/// Turn a non-zero exit into an error when the caller asked for it.
pub fn check_output(argv: &[&str], output: CommandOutput, check_exit_code: bool) -> Result<CommandOutput> {
    if check_exit_code && !output.success() {
        return Err(VifError::CommandFailed {
            command: render_command(argv),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output)
}

/// Executor running real processes through `std::process::Command`.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    /// Prefix for privileged commands (e.g. `["sudo"]`)
    root_helper: Vec<String>,
}

impl SystemExecutor {
    /// Create an executor using `sudo` as the root helper.
    pub fn new() -> Self {
        Self {
            root_helper: vec!["sudo".to_string()],
        }
    }

    /// Create an executor with a custom root helper. An empty helper runs
    /// privileged commands directly (the agent already runs as root).
    pub fn with_root_helper(root_helper: Vec<String>) -> Self {
        Self { root_helper }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for SystemExecutor {
    fn execute(&self, argv: &[&str], run_as_root: bool, check_exit_code: bool) -> Result<CommandOutput> {
        let mut full: Vec<&str> = Vec::with_capacity(argv.len() + self.root_helper.len());
        if run_as_root {
            full.extend(self.root_helper.iter().map(String::as_str));
        }
        full.extend_from_slice(argv);

        let (program, args) = full
            .split_first()
            .ok_or_else(|| VifError::Internal("empty command".to_string()))?;

        debug!(command = %render_command(&full), "Running command");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| VifError::SpawnFailed {
                command: render_command(&full),
                source: e,
            })?;

        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.success() {
            warn!(
                command = %render_command(&full),
                status = ?output.status,
                stderr = %output.stderr.trim(),
                "Command exited with non-zero status"
            );
        }

        check_output(&full, output, check_exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_output_passes_success() {
        let out = CommandOutput {
            status: Some(0),
            ..Default::default()
        };
        assert!(check_output(&["true"], out, true).is_ok());
    }

    #[test]
    fn test_check_output_rejects_failure_when_checked() {
        let out = CommandOutput {
            status: Some(2),
            stderr: "no such bridge\n".to_string(),
            ..Default::default()
        };
        let err = check_output(&["brctl", "delbr", "br9"], out.clone(), true).unwrap_err();
        match err {
            VifError::CommandFailed { command, status, stderr } => {
                assert_eq!(command, "brctl delbr br9");
                assert_eq!(status, Some(2));
                assert_eq!(stderr, "no such bridge");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Unchecked: handed back as-is
        let out = check_output(&["brctl", "delbr", "br9"], out, false).unwrap();
        assert_eq!(out.status, Some(2));
    }

    #[test]
    fn test_missing_binary_is_spawn_failure() {
        let exec = SystemExecutor::with_root_helper(vec![]);
        let err = exec
            .execute(&["limiquantix-definitely-not-a-binary"], true, true)
            .unwrap_err();
        assert!(matches!(err, VifError::SpawnFailed { .. }));
    }
}
