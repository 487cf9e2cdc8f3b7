//! Error types for VIF plugging.

use thiserror::Error;

/// Errors that can occur while configuring, plugging or unplugging a VIF.
#[derive(Error, Debug)]
pub enum VifError {
    /// The host OS has no netdev driver.
    #[error("netdev driver has not been ported to '{0}'")]
    UnsupportedHost(String),

    /// The port mapping does not declare a backend kind.
    #[error("vif_type parameter must be present for this vif driver")]
    MissingBackendKind,

    /// The port mapping declares a backend kind we do not know.
    #[error("Unexpected vif_type={0}")]
    UnknownBackendKind(String),

    /// The port mapping fields disagree with its backend kind.
    #[error("Invalid port mapping: {0}")]
    InvalidMapping(String),

    /// The backend is declared but not implemented.
    #[error("Backend {0} is not implemented")]
    Unsupported(String),

    /// Invalid driver configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The hypervisor control connection could not be queried.
    #[error("Failed to query control plane: {0}")]
    ControlPlane(String),

    /// A command exited with a non-zero status.
    #[error("Command `{command}` failed (exit status {status:?}): {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A command could not be launched at all.
    #[error("Failed to execute `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A device operation failed; wraps the underlying command error.
    #[error("Device operation on {device} failed: {source}")]
    DeviceOperation {
        device: String,
        #[source]
        source: Box<VifError>,
    },

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VifError {
    /// Annotate a command error with the device it was operating on.
    ///
    /// Configuration errors and already-annotated errors pass through untouched.
    pub fn on_device(self, device: &str) -> Self {
        match self {
            VifError::CommandFailed { .. } | VifError::SpawnFailed { .. } => {
                VifError::DeviceOperation {
                    device: device.to_string(),
                    source: Box::new(self),
                }
            }
            other => other,
        }
    }

    /// Fatal configuration problems that must not be retried.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            VifError::UnsupportedHost(_)
                | VifError::MissingBackendKind
                | VifError::UnknownBackendKind(_)
                | VifError::InvalidMapping(_)
                | VifError::Unsupported(_)
                | VifError::Config(_)
        )
    }

    /// Host device operation failures; the caller decides whether to retry.
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            VifError::CommandFailed { .. }
                | VifError::SpawnFailed { .. }
                | VifError::DeviceOperation { .. }
        )
    }

    /// The device named by a [`VifError::DeviceOperation`], if any.
    pub fn device(&self) -> Option<&str> {
        match self {
            VifError::DeviceOperation { device, .. } => Some(device),
            _ => None,
        }
    }
}

/// Result type alias for VIF operations.
pub type Result<T> = std::result::Result<T, VifError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_on_device_wraps_command_errors() {
        let err = VifError::CommandFailed {
            command: "brctl addbr br0".to_string(),
            status: Some(1),
            stderr: "boom".to_string(),
        }
        .on_device("br0");

        assert_eq!(err.device(), Some("br0"));
        assert!(err.is_device_error());
        assert!(!err.is_configuration_error());
        let msg = err.to_string();
        assert!(msg.contains("br0"));
        assert!(msg.contains("brctl addbr br0"));
    }

    #[test]
    fn test_on_device_keeps_configuration_errors() {
        let err = VifError::MissingBackendKind.on_device("br0");
        assert!(err.is_configuration_error());
        assert_eq!(err.device(), None);
    }
}
