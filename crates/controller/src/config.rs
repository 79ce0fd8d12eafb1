//! Controller configuration

use anyhow::{bail, Result};
use controller_lib::models::FleetMember;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file used when `CONTROLLER_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "controller.toml";

/// Controller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    /// Identifier attached to structured log records
    #[serde(default = "default_controller_id")]
    pub controller_id: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Pause between cycles in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Directory holding snapshots, smoothed state and CSV logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Node label key carrying the capacity label
    #[serde(default = "default_label_key")]
    pub label_key: String,

    /// Substrings identifying control-plane nodes
    #[serde(default = "default_control_plane_markers")]
    pub control_plane_markers: Vec<String>,

    /// Timeout for each label or power command in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Nodes under out-of-band power management
    #[serde(default)]
    pub fleet: Vec<FleetMember>,
}

fn default_controller_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "capacity-controller".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_poll_interval() -> u64 {
    60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_label_key() -> String {
    controller_lib::actuator::DEFAULT_LABEL_KEY.to_string()
}

fn default_control_plane_markers() -> Vec<String> {
    vec!["master".to_string()]
}

fn default_command_timeout() -> u64 {
    5
}

impl ControllerConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path = std::env::var("CONTROLLER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load configuration from `path` (optional) overlaid with `CONTROLLER_*`
    /// environment variables
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("CONTROLLER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("control_plane_markers")
                    .try_parsing(true),
            )
            .build()?;

        let config: ControllerConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than zero");
        }
        if self.command_timeout_secs == 0 {
            bail!("command_timeout_secs must be greater than zero");
        }
        if self.label_key.is_empty() {
            bail!("label_key must not be empty");
        }

        let mut seen = HashSet::new();
        for member in &self.fleet {
            if member.node_id.is_empty() {
                bail!("fleet entry with empty node_id");
            }
            if member.management_address.is_empty() {
                bail!("fleet node {} has no management_address", member.node_id);
            }
            if !seen.insert(member.node_id.as_str()) {
                bail!("fleet node {} is listed more than once", member.node_id);
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
