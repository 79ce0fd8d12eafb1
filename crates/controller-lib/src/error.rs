//! Error kinds surfaced by controller components
//!
//! Every external touchpoint returns one of these so the cycle driver can
//! decide per kind whether to fall back, skip, or carry on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    /// Persisted state could not be read or decoded
    #[error("failed to read state from {path:?}: {reason}")]
    StateRead { path: PathBuf, reason: String },

    /// Persisted state could not be written
    #[error("failed to write state to {path:?}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metrics or placement snapshot could not be read
    #[error("failed to read snapshot {path:?}: {reason}")]
    SnapshotRead { path: PathBuf, reason: String },

    /// A snapshot or command output could not be parsed
    #[error("parse error in {context}: {reason}")]
    Parse { context: String, reason: String },

    /// An external command ran but reported failure
    #[error("{command} failed for node {node}: {reason}")]
    ExternalCommand {
        command: String,
        node: String,
        reason: String,
    },

    /// An external call exceeded its deadline
    #[error("{operation} for node {node} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        node: String,
        timeout: Duration,
    },

    /// Kubernetes API error
    #[error("kubernetes API error for node {node}: {source}")]
    Kube {
        node: String,
        #[source]
        source: kube::Error,
    },
}

impl ControllerError {
    pub fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        ControllerError::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-friendly name used as a metrics/log label
    pub fn kind(&self) -> &'static str {
        match self {
            ControllerError::StateRead { .. } => "state_read",
            ControllerError::StateWrite { .. } => "state_write",
            ControllerError::SnapshotRead { .. } => "snapshot_read",
            ControllerError::Parse { .. } => "parse",
            ControllerError::ExternalCommand { .. } => "external_command",
            ControllerError::Timeout { .. } => "timeout",
            ControllerError::Kube { .. } => "kube",
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
